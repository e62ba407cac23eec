//! Throwaway CA, client certificates and CRLs for unit tests.

use rcgen::{
    BasicConstraints, CertificateParams, CertificateRevocationListParams,
    CrlDistributionPoint, DistinguishedName, DnType, IsCa, Issuer, KeyIdMethod, KeyPair, KeyUsagePurpose,
    RevocationReason, RevokedCertParams, SerialNumber,
};
use time::{Duration, OffsetDateTime};

use super::certificate::PeerCertificate;

/// Self-signed CA able to sign leaf certificates and CRLs.
pub struct TestCa {
    issuer: Issuer<'static, KeyPair>,
}

impl TestCa {
    pub fn new() -> Self {
        let key = KeyPair::generate().unwrap();
        let mut params = CertificateParams::default();
        let mut dn = DistinguishedName::new();
        dn.push(DnType::CommonName, "Test Root CA");
        params.distinguished_name = dn;
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.key_usages = vec![
            KeyUsagePurpose::KeyCertSign,
            KeyUsagePurpose::CrlSign,
            KeyUsagePurpose::DigitalSignature,
        ];
        params.self_signed(&key).unwrap();
        Self {
            issuer: Issuer::new(params, key),
        }
    }

    pub fn leaf(&self, serial: u64) -> LeafBuilder<'_> {
        let now = OffsetDateTime::now_utc();
        LeafBuilder {
            ca: self,
            serial,
            subject: DistinguishedName::new(),
            crl_urls: Vec::new(),
            not_before: now - Duration::days(1),
            not_after: now + Duration::days(30),
        }
    }

    /// DER-encoded CRL listing `revoked` serials.
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

pub struct LeafBuilder<'a> {
    ca: &'a TestCa,
    serial: u64,
    subject: DistinguishedName,
    crl_urls: Vec<String>,
    not_before: OffsetDateTime,
    not_after: OffsetDateTime,
}

impl LeafBuilder<'_> {
    pub fn subject(mut self, ty: DnType, value: &str) -> Self {
        self.subject.push(ty, value);
        self
    }

    pub fn crl_url(mut self, url: impl Into<String>) -> Self {
        self.crl_urls.push(url.into());
        self
    }

    pub fn validity(mut self, not_before: OffsetDateTime, not_after: OffsetDateTime) -> Self {
        self.not_before = not_before;
        self.not_after = not_after;
        self
    }

    pub fn der(self) -> Vec<u8> {
        let key = KeyPair::generate().unwrap();
        let mut params = CertificateParams::default();
        params.serial_number = Some(SerialNumber::from(self.serial));
        params.distinguished_name = self.subject;
        params.not_before = self.not_before;
        params.not_after = self.not_after;
        if !self.crl_urls.is_empty() {
            params.crl_distribution_points = vec![CrlDistributionPoint {
                uris: self.crl_urls,
            }];
        }
        params
            .signed_by(&key, &self.ca.issuer)
            .unwrap()
            .der()
            .to_vec()
    }

    pub fn build(self) -> PeerCertificate {
        PeerCertificate::from_der(&self.der()).unwrap()
    }
}
