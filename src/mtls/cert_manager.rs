//! Certificate loading and rustls server config building.
//!
//! Provides:
//! - [`load_ca_dir`]: trust anchors from a directory of `*.pem` files
//! - [`load_certs`] / [`load_private_key`]: PEM file loading
//! - [`build_tls_config`]: a `rustls::ServerConfig` that requests, but does
//!   not require, a client certificate
//!
//! All certificate and key files are expected in **PEM format**.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rustls::client::danger::HandshakeSignatureValid;
use rustls::crypto::{CryptoProvider, WebPkiSupportedAlgorithms};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, UnixTime};
use rustls::server::WebPkiClientVerifier;
use rustls::server::danger::{ClientCertVerified, ClientCertVerifier};
use rustls::{DigitallySignedStruct, DistinguishedName, RootCertStore, ServerConfig, SignatureScheme};
use tracing::{debug, info};

use crate::config::TlsConfig;
use crate::{Error, Result};

// ─────────────────────────────────────────────────────────────────────────────
// Public: build TLS server config
// ─────────────────────────────────────────────────────────────────────────────

/// Build the HTTPS server config.
///
/// Client certificates are requested on every handshake. A client that sends
/// none still connects (the certificate endpoint answers 400 later). A client
/// that sends one must chain to a CA from `ca_dir`, unless
/// `trust_unknown_cas` is set, in which case any chain is accepted and only
/// the handshake signature is verified.
///
/// # Errors
///
/// Returns an error if any certificate, key or CA file cannot be read or
/// parsed, or if the rustls config cannot be built.
pub fn build_tls_config(config: &TlsConfig) -> Result<ServerConfig> {
    let provider = Arc::new(rustls::crypto::aws_lc_rs::default_provider());

    let server_certs = load_certs(Path::new(&config.server_cert))?;
    let server_key = load_private_key(Path::new(&config.server_key))?;

    let client_verifier: Arc<dyn ClientCertVerifier> = if config.trust_unknown_cas {
        Arc::new(AcceptAnyClientCert::new(&provider))
    } else {
        let roots = load_ca_dir(Path::new(&config.ca_dir))?;
        WebPkiClientVerifier::builder_with_provider(Arc::new(roots), Arc::clone(&provider))
            .allow_unauthenticated()
            .build()
            .map_err(|e| Error::Config(format!("Failed to build client verifier: {e}")))?
    };

    let mut tls_cfg = ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| Error::Config(format!("Invalid TLS protocol configuration: {e}")))?
        .with_client_cert_verifier(client_verifier)
        .with_single_cert(server_certs, server_key)
        .map_err(|e| Error::Config(format!("TLS config error (cert/key mismatch?): {e}")))?;

    tls_cfg.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];

    debug!(
        server_cert = %config.server_cert,
        ca_dir = %config.ca_dir,
        trust_unknown_cas = config.trust_unknown_cas,
        "TLS config built"
    );

    Ok(tls_cfg)
}

// ─────────────────────────────────────────────────────────────────────────────
// Public: PEM loading
// ─────────────────────────────────────────────────────────────────────────────

/// Build a trust store from every `*.pem` file directly under `dir`.
///
/// # Errors
///
/// Any unreadable or unparseable file is an error, as is a directory without
/// a single usable certificate.
pub fn load_ca_dir(dir: &Path) -> Result<RootCertStore> {
    info!(dir = %dir.display(), "Building the root CA chain");

    let entries = fs::read_dir(dir)
        .map_err(|e| Error::Config(format!("Cannot read CA directory '{}': {e}", dir.display())))?;

    let mut files: Vec<PathBuf> = entries
        .filter_map(std::result::Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "pem"))
        .collect();
    files.sort();

    let mut roots = RootCertStore::empty();
    for file in &files {
        for cert in load_certs(file)? {
            roots.add(cert).map_err(|e| {
                Error::Config(format!(
                    "Something went wrong while parsing certificate: {}: {e}",
                    file.display()
                ))
            })?;
        }
    }

    if roots.is_empty() {
        return Err(Error::Config(format!(
            "No CA certificates found in '{}'",
            dir.display()
        )));
    }

    info!(files = files.len(), anchors = roots.len(), "All certificates parsed successfully");
    Ok(roots)
}

/// Load all certificates from a PEM file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or contains no valid PEM
/// certificate blocks.
pub fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>> {
    let pem_data = read_file(path)?;
    let certs = rustls_pemfile::certs(&mut pem_data.as_slice())
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| {
            Error::Config(format!("Failed to parse certs from '{}': {e}", path.display()))
        })?;

    if certs.is_empty() {
        return Err(Error::Config(format!(
            "No certificates found in '{}'",
            path.display()
        )));
    }

    Ok(certs)
}

/// Load the first private key from a PEM file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or contains no private key.
pub fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>> {
    let pem_data = read_file(path)?;
    rustls_pemfile::private_key(&mut pem_data.as_slice())
        .map_err(|e| {
            Error::Config(format!(
                "Failed to parse private key from '{}': {e}",
                path.display()
            ))
        })?
        .ok_or_else(|| Error::Config(format!("No private key found in '{}'", path.display())))
}

fn read_file(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).map_err(|e| Error::Config(format!("Cannot read '{}': {e}", path.display())))
}

// ─────────────────────────────────────────────────────────────────────────────
// Accept-any client verifier
// ─────────────────────────────────────────────────────────────────────────────

/// Client verifier that accepts any certificate chain.
///
/// The handshake signature is still checked against the presented
/// certificate, so the client must hold the matching private key.
#[derive(Debug)]
pub struct AcceptAnyClientCert {
    algorithms: WebPkiSupportedAlgorithms,
}

impl AcceptAnyClientCert {
    /// Create a verifier using `provider`'s signature algorithms.
    #[must_use]
    pub fn new(provider: &CryptoProvider) -> Self {
        Self {
            algorithms: provider.signature_verification_algorithms,
        }
    }
}

impl ClientCertVerifier for AcceptAnyClientCert {
    fn offer_client_auth(&self) -> bool {
        true
    }

    fn client_auth_mandatory(&self) -> bool {
        false
    }

    fn root_hint_subjects(&self) -> &[DistinguishedName] {
        &[]
    }

    fn verify_client_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _now: UnixTime,
    ) -> std::result::Result<ClientCertVerified, rustls::Error> {
        Ok(ClientCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(message, cert, dss, &self.algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(message, cert, dss, &self.algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.algorithms.supported_schemes()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
