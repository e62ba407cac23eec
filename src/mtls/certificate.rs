//! Peer certificate parsing.
//!
//! Parses an X.509 DER-encoded client certificate once per request and keeps
//! only what the authentication pipeline needs: serial number, validity
//! window, the full subject attribute list (in encoding order, including
//! attribute types outside the usual CN/O/OU/L/ST/C set) and the URLs of its
//! CRL distribution points.

use chrono::{DateTime, Utc};
use x509_parser::certificate::X509Certificate;
use x509_parser::extensions::{DistributionPointName, GeneralName, ParsedExtension};
use x509_parser::num_bigint::BigUint;
use x509_parser::prelude::FromDer;
use x509_parser::time::ASN1Time;

use crate::{Error, Result};

// ─────────────────────────────────────────────────────────────────────────────
// Peer certificate
// ─────────────────────────────────────────────────────────────────────────────

/// One subject attribute (type OID + value) in the order it was encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectAttribute {
    /// Dotted attribute type OID, e.g. `2.5.4.3`
    pub oid: String,
    /// Attribute value
    pub value: String,
}

impl SubjectAttribute {
    /// Create an attribute from an OID string and value.
    pub fn new(oid: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            oid: oid.into(),
            value: value.into(),
        }
    }
}

/// Fields of a client certificate used during authentication.
#[derive(Debug, Clone)]
pub struct PeerCertificate {
    /// Certificate serial number
    pub serial: BigUint,
    /// Start of the validity window
    pub not_before: DateTime<Utc>,
    /// End of the validity window
    pub not_after: DateTime<Utc>,
    /// Subject attributes in encoding order
    pub subject_attributes: Vec<SubjectAttribute>,
    /// URLs listed in the CRL distribution points extension
    pub crl_distribution_points: Vec<String>,
}

impl PeerCertificate {
    /// Parse a DER-encoded certificate.
    ///
    /// # Errors
    ///
    /// Returns `Error::BadRequest` if the certificate cannot be parsed.
    pub fn from_der(der: &[u8]) -> Result<Self> {
        let (_, cert) = X509Certificate::from_der(der)
            .map_err(|e| Error::BadRequest(format!("Failed to parse client certificate: {e}")))?;

        let validity = cert.validity();

        Ok(Self {
            serial: cert.serial.clone(),
            not_before: to_utc(validity.not_before)?,
            not_after: to_utc(validity.not_after)?,
            subject_attributes: extract_subject_attributes(&cert),
            crl_distribution_points: extract_crl_distribution_points(&cert),
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Extraction helpers
// ─────────────────────────────────────────────────────────────────────────────

fn to_utc(time: ASN1Time) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp(time.timestamp(), 0)
        .ok_or_else(|| Error::BadRequest(format!("Certificate validity out of range: {time}")))
}

/// Flatten the subject RDN sequence into (type, value) pairs.
fn extract_subject_attributes(cert: &X509Certificate<'_>) -> Vec<SubjectAttribute> {
    cert.subject()
        .iter_rdn()
        .flat_map(|rdn| rdn.iter())
        .map(|attr| {
            let value = attr.as_str().map_or_else(
                |_| String::from_utf8_lossy(attr.as_slice()).into_owned(),
                str::to_owned,
            );
            SubjectAttribute::new(attr.attr_type().to_id_string(), value)
        })
        .collect()
}

/// Collect every URI full name from the CRL distribution points extension.
fn extract_crl_distribution_points(cert: &X509Certificate<'_>) -> Vec<String> {
    let mut urls = Vec::new();

    for ext in cert.extensions() {
        if let ParsedExtension::CRLDistributionPoints(points) = ext.parsed_extension() {
            for point in points.iter() {
                if let Some(DistributionPointName::FullName(names)) = &point.distribution_point {
                    for name in names {
                        if let GeneralName::URI(uri) = name {
                            urls.push((*uri).to_owned());
                        }
                    }
                }
            }
        }
    }

    urls
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
