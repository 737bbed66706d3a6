//! Stateless password reset tokens.
//!
//! A token binds a user, the fingerprint of their credential at issuance and
//! an expiration instant. Nothing is stored server-side: changing the
//! password changes the fingerprint, which is enough to invalidate every
//! outstanding token.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::clock::{Clock, SystemClock};
use crate::crypto::MessageVerifier;
use crate::error::{Error, Result};
use crate::user::{Fingerprint, UserId};

/// Decoded content of a reset token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResetToken {
    #[serde(rename = "sub")]
    pub user_id: UserId,
    #[serde(rename = "fpr")]
    pub fingerprint: Fingerprint,
    #[serde(rename = "exp", with = "chrono::serde::ts_nanoseconds")]
    pub expires_at: DateTime<Utc>,
}

/// Issue and verify [`ResetToken`]s.
#[derive(Clone)]
pub struct TokenCodec {
    verifier: Arc<dyn MessageVerifier>,
    clock: Arc<dyn Clock>,
}

impl TokenCodec {
    /// Create a new [`TokenCodec`] using the system clock.
    pub fn new(verifier: Arc<dyn MessageVerifier>) -> Self {
        Self {
            verifier,
            clock: Arc::new(SystemClock),
        }
    }

    /// Replace the clock used for issuance and expiration checks.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Sign a token valid for `lifetime` from now.
    pub fn issue(
        &self,
        user_id: &UserId,
        fingerprint: &Fingerprint,
        lifetime: Duration,
    ) -> Result<String> {
        let lifetime = TimeDelta::from_std(lifetime).map_err(|_| Error::Lifetime)?;
        let expires_at = self
            .clock
            .now()
            .checked_add_signed(lifetime)
            .ok_or(Error::Lifetime)?;
        // `exp` is encoded in nanoseconds, which ends in 2262.
        if expires_at.timestamp_nanos_opt().is_none() {
            return Err(Error::Lifetime);
        }

        let payload = serde_json::to_vec(&ResetToken {
            user_id: user_id.clone(),
            fingerprint: fingerprint.clone(),
            expires_at,
        })?;

        Ok(self.verifier.generate(&payload))
    }

    /// Decode a token if it is authentic and not yet expired.
    ///
    /// Forged, malformed and expired tokens are indistinguishable: all of
    /// them yield `None`. Verification has no side effect, so the same token
    /// can be checked any number of times.
    pub fn verify(&self, token: &str) -> Option<ResetToken> {
        let token = self
            .verifier
            .verified(token)
            .and_then(|payload| {
                serde_json::from_slice::<ResetToken>(&payload).ok()
            })
            .filter(|token| token.expires_at > self.clock.now());

        if token.is_none() {
            tracing::debug!("password reset token rejected");
        }

        token
    }
}
