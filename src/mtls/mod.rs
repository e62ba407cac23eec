//! Client certificate handling.
//!
//! # Architecture
//!
//! ```text
//! TCP connection
//!   → TLS handshake  (rustls verifies the chain if a certificate is sent)
//!   → PeerCertificate parsed from the leaf DER
//!   → validity window check
//!   → RevocationChecker (CRL fetch-and-scan)
//!   → canonical DN string for binding lookup
//! ```
//!
//! # Modules
//!
//! - [`certificate`]: X.509 field extraction (`PeerCertificate`)
//! - [`dn`]: canonical distinguished-name string
//! - [`validity`]: expiry / not-yet-valid check
//! - [`revocation`]: concurrent CRL fetch-and-scan
//! - [`cert_manager`]: PEM loading and rustls server config

pub mod cert_manager;
pub mod certificate;
pub mod dn;
pub mod revocation;
pub mod validity;

#[cfg(test)]
pub(crate) mod test_pki;

pub use cert_manager::{build_tls_config, load_ca_dir, load_certs, load_private_key};
pub use certificate::{PeerCertificate, SubjectAttribute};
pub use dn::extract_dn;
pub use revocation::{RevocationChecker, partition};
