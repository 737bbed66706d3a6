//! Error handler for autha-reset.

use thiserror::Error;
use validator::ValidationErrors;

pub type Result<T> = std::result::Result<T, Error>;

/// Enum representing every error surfaced by the crate.
///
/// Token verification failures are deliberately absent: they fold into
/// `None` at the codec boundary.
#[derive(Debug, Error)]
pub enum Error {
    #[error("validation error occurred")]
    Validation(#[from] ValidationErrors),

    #[error("cannot read configuration file")]
    Io(#[from] std::io::Error),
    #[error("invalid configuration file: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error("redirect url must be http(s) or an absolute path, got {0}")]
    RedirectUrl(String),

    #[error("cannot serialize reset token")]
    Serialize(#[from] serde_json::Error),
    #[error("token lifetime is out of range")]
    Lifetime,

    #[error("password hashing failed: {0}")]
    Hash(String),

    #[error("internal error, {details}")]
    Internal {
        details: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl Error {
    /// Wrap a collaborator failure.
    pub fn internal<E>(details: impl Into<String>, err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Internal {
            details: details.into(),
            source: Some(Box::new(err)),
        }
    }
}
