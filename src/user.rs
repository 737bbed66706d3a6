//! User identity as seen by the reset flow, and the store port behind it.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Opaque identifier of a user record.
#[derive(Debug, Default, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the same string as a string slice `&str`.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for UserId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

impl From<&str> for UserId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

/// Value derived from the stored credential.
///
/// Changes whenever the password changes, which invalidates every reset
/// token issued against the previous value.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Fingerprint").field(&"[REDACTED]").finish()
    }
}

impl From<&str> for Fingerprint {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

/// Snapshot of a user record returned by a [`CredentialStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub id: UserId,
    /// Normalized email address.
    pub email: String,
    pub fingerprint: Fingerprint,
    /// Whether sign-in is administratively blocked.
    pub locked: bool,
}

/// Trim and lowercase an email so lookups ignore case and padding.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Port for user credential persistence.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Find an account by its normalized email.
    async fn find_by_normalized_email(
        &self,
        email: &str,
    ) -> Result<Option<Account>>;

    /// Find an account whose current fingerprint is still `fingerprint`.
    async fn find_by_id_and_fingerprint(
        &self,
        id: &UserId,
        fingerprint: &Fingerprint,
    ) -> Result<Option<Account>>;

    /// Replace the stored credential.
    ///
    /// Returns the updated account, whose fingerprint differs from the
    /// previous one. Policy rejections are reported as
    /// [`crate::error::Error::Validation`].
    async fn update_password(
        &self,
        id: &UserId,
        password: &str,
    ) -> Result<Account>;
}
