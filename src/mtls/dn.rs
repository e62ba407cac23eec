//! Canonical distinguished-name string for a certificate subject.
//!
//! Bindings store the DN of the client certificate as a plain string, so the
//! string has to be built the same way every time:
//!
//! - the standard attributes (`CN`, `O`, `OU`, `L`, `ST`, `C`) come first, in
//!   reverse encoding order, the same way RFC 4514 prints an RDN sequence
//! - every other attribute type follows, also in reverse encoding order, and
//!   is printed with the generic `DC` key whatever its real type is
//!
//! Pairs are joined with `,` and no spaces: a subject encoded as
//! `C, ST, L, O, <v1>, <v2>` yields `O=..,L=..,ST=..,C=..,DC=v2,DC=v1`.

use super::certificate::{PeerCertificate, SubjectAttribute};

/// Key used for every attribute type outside the standard set
pub const NON_STANDARD_KEY: &str = "DC";

/// Short key of a standard attribute type OID.
fn standard_key(oid: &str) -> Option<&'static str> {
    match oid {
        "2.5.4.3" => Some("CN"),
        "2.5.4.6" => Some("C"),
        "2.5.4.7" => Some("L"),
        "2.5.4.8" => Some("ST"),
        "2.5.4.10" => Some("O"),
        "2.5.4.11" => Some("OU"),
        _ => None,
    }
}

/// Build the canonical DN string from subject attributes in encoding order.
#[must_use]
pub fn extract_dn(attributes: &[SubjectAttribute]) -> String {
    let mut standard = Vec::new();
    let mut extra = Vec::new();

    for attr in attributes.iter().rev() {
        match standard_key(&attr.oid) {
            Some(key) => standard.push(format!("{key}={}", attr.value)),
            None => extra.push(format!("{NON_STANDARD_KEY}={}", attr.value)),
        }
    }

    standard.extend(extra);
    standard.join(",")
}

impl PeerCertificate {
    /// Canonical DN string of this certificate's subject.
    #[must_use]
    pub fn distinguished_name(&self) -> String {
        extract_dn(&self.subject_attributes)
    }
}
