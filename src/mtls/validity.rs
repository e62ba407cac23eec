//! Certificate validity window check.

use chrono::{DateTime, Utc};

use super::certificate::PeerCertificate;
use crate::{Error, Result};

impl PeerCertificate {
    /// Reject a certificate that is expired or not yet active at `now`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Forbidden` when `now` is outside the validity window.
    pub fn check_validity_at(&self, now: DateTime<Utc>) -> Result<()> {
        if now > self.not_after {
            return Err(Error::Forbidden("Your certificate has expired".to_string()));
        }
        if now < self.not_before {
            return Err(Error::Forbidden(
                "Your certificate is not active yet".to_string(),
            ));
        }
        Ok(())
    }

    /// [`check_validity_at`](Self::check_validity_at) against the current time.
    pub fn check_validity(&self) -> Result<()> {
        self.check_validity_at(Utc::now())
    }
}
