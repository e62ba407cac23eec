//! Shared fixtures for the router level tests

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    body::{Body, to_bytes},
    extract::connect_info::MockConnectInfo,
    http::{Method, Request, StatusCode},
};
use rcgen::{
    BasicConstraints, CertificateParams, CertificateRevocationListParams,
    CrlDistributionPoint, DistinguishedName, DnType, IsCa, Issuer, KeyIdMethod, KeyPair, KeyUsagePurpose,
    RevocationReason, RevokedCertParams, SerialNumber,
};
use rustls::pki_types::CertificateDer;
use serde_json::Value;
use time::{Duration, OffsetDateTime};
use tower::ServiceExt;

use authn_gateway::config::Config;
use authn_gateway::gateway::{AppState, TlsConnectInfo, create_router};
use authn_gateway::store::{InMemoryStore, Seed};

pub const SERVICE_TOKEN: &str = "management-secret";

/// Config for in-process tests: plain HTTP downstream, no TLS front end.
pub fn config() -> Config {
    let mut config = Config {
        service_token: SERVICE_TOKEN.to_string(),
        ..Config::default()
    };
    config.tls.enabled = false;
    config.retrieval.scheme = "http".to_string();
    config
}

pub struct App {
    pub state: Arc<AppState>,
    pub store: Arc<InMemoryStore>,
    peer: TlsConnectInfo,
}

impl App {
    pub fn new(config: Config, seed: Seed) -> Self {
        let store = Arc::new(InMemoryStore::with_seed(seed));
        let state = Arc::new(AppState::new(config, store.clone()).unwrap());
        Self {
            state,
            store,
            peer: TlsConnectInfo::anonymous(peer_addr()),
        }
    }

    /// Present `der` as the client certificate on every request.
    pub fn with_client_certificate(mut self, der: Vec<u8>) -> Self {
        self.peer = TlsConnectInfo::with_certificates(peer_addr(), vec![CertificateDer::from(der)]);
        self
    }

    fn router(&self) -> Router {
        create_router(Arc::clone(&self.state)).layer(MockConnectInfo(self.peer.clone()))
    }

    pub async fn send(&self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(body.map_or_else(Body::empty, |b| Body::from(b.to_string())))
            .unwrap();

        let response = self.router().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.send(Method::GET, uri, None).await
    }
}

/// Append the management key to `path`.
pub fn keyed(path: &str) -> String {
    format!("{path}?key={SERVICE_TOKEN}")
}

fn peer_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 50_000))
}

pub fn error_message(body: &Value) -> &str {
    body["error"]["message"].as_str().unwrap_or_default()
}

/// Throwaway CA issuing client certificates and CRLs.
pub struct Pki {
    issuer: Issuer<'static, KeyPair>,
}

impl Pki {
    pub fn new() -> Self {
        let key = KeyPair::generate().unwrap();
        let mut params = CertificateParams::default();
        let mut dn = DistinguishedName::new();
        dn.push(DnType::CommonName, "Integration Test CA");
        params.distinguished_name = dn;
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.key_usages = vec![KeyUsagePurpose::KeyCertSign, KeyUsagePurpose::CrlSign];
        params.self_signed(&key).unwrap();
        Self {
            issuer: Issuer::new(params, key),
        }
    }

    /// Client certificate with subject `C=TC, ST=TN, L=CITY, O=COMPANY`.
    pub fn client_cert(&self, serial: u64, crl_url: Option<String>, expired: bool) -> Vec<u8> {
        let key = KeyPair::generate().unwrap();
        let now = OffsetDateTime::now_utc();
        let mut params = CertificateParams::default();
        params.serial_number = Some(SerialNumber::from(serial));

        let mut dn = DistinguishedName::new();
        dn.push(DnType::CountryName, "TC");
        dn.push(DnType::StateOrProvinceName, "TN");
        dn.push(DnType::LocalityName, "CITY");
        dn.push(DnType::OrganizationName, "COMPANY");
        params.distinguished_name = dn;

        if expired {
            params.not_before = now - Duration::days(30);
            params.not_after = now - Duration::days(1);
        } else {
            params.not_before = now - Duration::days(1);
            params.not_after = now + Duration::days(30);
        }
        if let Some(url) = crl_url {
            params.crl_distribution_points = vec![CrlDistributionPoint { uris: vec![url] }];
        }

        params
            .signed_by(&key, &self.issuer)
            .unwrap()
            .der()
            .to_vec()
    }

    pub fn crl(&self, revoked: &[u64]) -> Vec<u8> {
        let now = OffsetDateTime::now_utc();
        let params = CertificateRevocationListParams {
            this_update: now - Duration::hours(1),
            next_update: now + Duration::days(7),
            crl_number: SerialNumber::from(1_u64),
            issuing_distribution_point: None,
            revoked_certs: revoked
                .iter()
                .map(|serial| RevokedCertParams {
                    serial_number: SerialNumber::from(*serial),
                    revocation_time: now - Duration::hours(2),
                    reason_code: Some(RevocationReason::KeyCompromise),
                    invalidity_date: None,
                })
                .collect(),
            key_identifier_method: KeyIdMethod::Sha256,
        };
        params
            .signed_by(&self.issuer)
            .unwrap()
            .der()
            .to_vec()
    }
}

/// Canonical DN of [`Pki::client_cert`].
pub const CLIENT_DN: &str = "O=COMPANY,L=CITY,ST=TN,C=TC";
