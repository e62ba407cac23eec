//! CRL-based revocation checking.
//!
//! Every CRL distribution point of the certificate is fetched concurrently.
//! Each downloaded revoked-serial list is split into chunks scanned by
//! blocking workers in parallel. The first worker that finds the serial
//! cancels a token shared by the whole check; every other worker looks at the
//! token before each comparison and stops early.
//!
//! ```text
//! check(cert)
//!   ├── DP 1: GET → decode → partition ─┬─ worker 0..k
//!   │                                   └─ worker k..n
//!   └── DP 2: GET → decode → partition ── worker 0..n
//! ```
//!
//! The first distribution point task to fail (revoked or unreachable)
//! decides the outcome. Remaining tasks are aborted when the check returns.
//! CRLs are never cached: every check downloads them again.

use std::ops::Range;
use std::sync::Arc;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use x509_parser::num_bigint::BigUint;
use x509_parser::prelude::FromDer;
use x509_parser::revocation_list::CertificateRevocationList;

use super::certificate::PeerCertificate;
use crate::config::RevocationConfig;
use crate::{Error, Result};

/// Message returned for a certificate without CRL distribution points
pub const NO_DISTRIBUTION_POINTS: &str =
    "Your certificate is invalid. No CRLDistributionPoints found on the certificate";

/// Message returned for a revoked certificate
pub const REVOKED: &str = "Your certificate has been revoked";

// ─────────────────────────────────────────────────────────────────────────────
// Checker
// ─────────────────────────────────────────────────────────────────────────────

/// Checks certificates against the CRLs they point to.
#[derive(Debug, Clone)]
pub struct RevocationChecker {
    client: reqwest::Client,
    workers: usize,
}

impl RevocationChecker {
    /// Build a checker with its own HTTP client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &RevocationConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.fetch_timeout)
            .build()?;

        Ok(Self {
            client,
            workers: config.scan_workers.max(1),
        })
    }

    /// Number of scan workers per distribution point.
    #[must_use]
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Check whether `cert` is listed in any of its CRLs.
    ///
    /// # Errors
    ///
    /// - `Error::Forbidden` if the certificate has no CRL distribution points
    ///   (no request is made) or its serial is listed as revoked
    /// - `Error::CrlUnreachable` if a CRL cannot be downloaded or decoded
    pub async fn check(&self, cert: &PeerCertificate) -> Result<()> {
        if cert.crl_distribution_points.is_empty() {
            return Err(Error::Forbidden(NO_DISTRIBUTION_POINTS.to_string()));
        }

        let found = CancellationToken::new();
        let target = Arc::new(cert.serial.clone());

        let mut points = JoinSet::new();
        for url in &cert.crl_distribution_points {
            let scan = PointScan {
                client: self.client.clone(),
                url: url.clone(),
                target: Arc::clone(&target),
                workers: self.workers,
                found: found.clone(),
            };
            points.spawn(scan.run());
        }

        while let Some(joined) = points.join_next().await {
            let outcome = joined
                .map_err(|e| Error::Internal(format!("CRL check task failed: {e}")))
                .and_then(|r| r);

            if let Err(err) = outcome {
                // Stop sibling scanners; dropping the set aborts pending fetches.
                found.cancel();
                points.abort_all();
                return Err(err);
            }
        }

        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// One distribution point
// ─────────────────────────────────────────────────────────────────────────────

struct PointScan {
    client: reqwest::Client,
    url: String,
    target: Arc<BigUint>,
    workers: usize,
    found: CancellationToken,
}

impl PointScan {
    async fn run(self) -> Result<()> {
        let serials = tokio::select! {
            () = self.found.cancelled() => return Ok(()),
            fetched = fetch_revoked_serials(&self.client, &self.url) => fetched?,
        };

        debug!(url = %self.url, revoked = serials.len(), "Scanning CRL");

        let serials = Arc::new(serials);
        let mut scanners = JoinSet::new();
        for range in partition(serials.len(), self.workers) {
            let serials = Arc::clone(&serials);
            let target = Arc::clone(&self.target);
            let found = self.found.clone();
            scanners.spawn_blocking(move || scan_chunk(&serials[range], &target, &found));
        }

        while let Some(joined) = scanners.join_next().await {
            match joined {
                Ok(true) => return Err(Error::Forbidden(REVOKED.to_string())),
                Ok(false) => {}
                Err(e) => return Err(Error::Internal(format!("CRL scan worker failed: {e}"))),
            }
        }

        Ok(())
    }
}

/// Download a CRL and return the serial numbers it lists.
async fn fetch_revoked_serials(client: &reqwest::Client, url: &str) -> Result<Vec<BigUint>> {
    let unreachable = |reason: &dyn std::fmt::Display| {
        warn!(url = %url, error = %reason, "CRL distribution point unusable");
        Error::CrlUnreachable(url.to_string())
    };

    let response = client
        .get(url)
        .send()
        .await
        .and_then(reqwest::Response::error_for_status)
        .map_err(|e| unreachable(&e))?;

    let body = response.bytes().await.map_err(|e| unreachable(&e))?;

    let (_, crl) = CertificateRevocationList::from_der(&body).map_err(|e| unreachable(&e))?;

    Ok(crl
        .iter_revoked_certificates()
        .map(|revoked| revoked.serial().clone())
        .collect())
}

// ─────────────────────────────────────────────────────────────────────────────
// Scanning
// ─────────────────────────────────────────────────────────────────────────────

/// Scan one chunk for `target`, giving up as soon as `found` is cancelled.
///
/// Returns `true` (and cancels `found`) when this chunk holds the serial.
fn scan_chunk(chunk: &[BigUint], target: &BigUint, found: &CancellationToken) -> bool {
    for serial in chunk {
        if found.is_cancelled() {
            return false;
        }
        if serial == target {
            found.cancel();
            return true;
        }
    }
    false
}

/// Split `0..len` into at most `workers` contiguous chunks.
///
/// Chunks are cut at `remaining / remaining_workers`. When that share would
/// drop below 2 elements, or only one worker is left, the rest of the list
/// goes to one final chunk. Every index is covered exactly once.
#[must_use]
pub fn partition(len: usize, workers: usize) -> Vec<Range<usize>> {
    let mut chunks = Vec::new();
    let mut start = 0;
    let mut remaining_workers = workers.max(1);

    while start < len {
        let remaining = len - start;
        let share = remaining / remaining_workers;

        if remaining_workers == 1 || share < 2 {
            chunks.push(start..len);
            break;
        }

        chunks.push(start..start + share);
        start += share;
        remaining_workers -= 1;
    }

    chunks
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
