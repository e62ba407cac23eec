//! Certificate authentication: from a TLS peer certificate to a downstream
//! token.
//!
//! ```text
//! peer certificate
//!   → expiry → revocation            (skipped with verify_certificate: false)
//!   → service type → x509 allowed → host belongs
//!   → binding by DN → auth method → downstream token
//! ```
//!
//! Every step runs once; the first failure is returned unchanged.

use rustls::pki_types::CertificateDer;
use tracing::{info, warn};

use crate::auth_methods::{self, AuthMethodRegistry, DownstreamToken};
use crate::bindings;
use crate::config::Config;
use crate::mtls::{PeerCertificate, RevocationChecker};
use crate::service_types;
use crate::store::{Store, zulu_now};
use crate::{Error, Result};

/// Auth type of certificate bindings
pub const X509: &str = "x509";

/// Runs the certificate authentication flow.
#[derive(Debug, Clone)]
pub struct CertificateAuthenticator {
    verify_certificate: bool,
    revocation: RevocationChecker,
    http: reqwest::Client,
    scheme: String,
}

impl CertificateAuthenticator {
    /// Build the authenticator and its HTTP clients.
    ///
    /// # Errors
    ///
    /// Returns an error if an HTTP client cannot be built.
    pub fn new(config: &Config) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.retrieval.timeout)
            .danger_accept_invalid_certs(!config.retrieval.verify_ssl)
            .build()?;

        Ok(Self {
            verify_certificate: config.verify_certificate,
            revocation: RevocationChecker::new(&config.revocation)?,
            http,
            scheme: config.retrieval.scheme.clone(),
        })
    }

    /// Authenticate the leaf certificate of `peer_chain` against
    /// `service_type` / `host` and return the caller's downstream token.
    ///
    /// # Errors
    ///
    /// - `BadRequest` when no certificate was presented
    /// - `Forbidden` / `CrlUnreachable` from the certificate checks
    /// - `Unprocessable` when the service type does not accept `x509`
    /// - `NotFound` for an unknown service type, host, binding or auth method
    /// - `Internal` when the downstream retrieval fails
    pub async fn authenticate(
        &self,
        store: &dyn Store,
        registry: &AuthMethodRegistry,
        peer_chain: &[CertificateDer<'_>],
        service_type: &str,
        host: &str,
    ) -> Result<DownstreamToken> {
        let leaf = peer_chain
            .first()
            .ok_or_else(|| Error::BadRequest("No certificate provided".to_string()))?;
        let cert = PeerCertificate::from_der(leaf)?;

        if self.verify_certificate {
            cert.check_validity()?;
            self.revocation.check(&cert).await?;
        }

        let service_type = service_types::find_by_name(store, service_type).await?;
        service_type.supports_auth_type(X509)?;
        if !service_type.has_host(host) {
            return Err(Error::NotFound("Host".to_string()));
        }

        let dn = cert.distinguished_name();
        info!(
            dn = %dn,
            service_type = %service_type.name,
            host = %host,
            "Certificate request"
        );

        let binding =
            bindings::find_by_auth_id(store, &dn, &service_type.uuid, host, X509).await?;

        let auth_method = auth_methods::service::find(
            store,
            registry,
            &service_type.uuid,
            host,
            &service_type.auth_method,
        )
        .await?;

        let token = auth_method
            .retrieve_downstream_token(&binding, &self.http, &self.scheme)
            .await?;

        if let Err(e) = store.update_binding_last_auth(&binding.uuid, &zulu_now()).await {
            warn!(binding = %binding.name, error = %e, "Failed to record last authentication");
        }

        Ok(token)
    }
}
