//! Password reset flow.
//!
//! Nothing is kept between steps: every call rebuilds its state from the
//! token it receives.
//!
//! ```text
//! create(email) ──> Requested
//! edit(token)   ──> Editable | Rejected
//! update(token) ──> Completed | Invalid | Rejected
//! ```

use std::fmt;
use std::sync::Arc;

use serde::Deserialize;
use validator::{Validate, ValidationError, ValidationErrors};

use crate::clock::Clock;
use crate::config::Configuration;
use crate::error::{Error, Result};
use crate::guard::SignInStatus;
use crate::mail::Mailer;
use crate::session::{self, SessionStore};
use crate::token::TokenCodec;
use crate::user::{Account, CredentialStore, normalize_email};

pub const NOTICE_REQUESTED: &str = "You will receive an email within the next few minutes. It contains instructions for changing your password.";
pub const FAILURE_INVALID_TOKEN: &str =
    "Please double check the URL or try submitting the form again.";
pub const FAILURE_BLANK_PASSWORD: &str = "Password can't be blank.";
pub const FAILURE_INVALID_PASSWORD: &str = "Password is invalid.";

/// New password submitted with a reset token.
#[derive(Deserialize, Validate)]
pub struct PasswordResetForm {
    #[validate(
        custom(function = "not_blank", message = "Password can't be blank."),
        length(max = 255, message = "Password is too long.")
    )]
    pub password: String,
}

impl PasswordResetForm {
    pub fn new(password: impl Into<String>) -> Self {
        Self {
            password: password.into(),
        }
    }
}

impl fmt::Debug for PasswordResetForm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PasswordResetForm")
            .field("password", &"[REDACTED]")
            .finish()
    }
}

fn not_blank(value: &str) -> std::result::Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new("blank"));
    }
    Ok(())
}

/// Where a reset attempt stands after a step.
#[derive(Debug)]
pub enum ResetState {
    /// Reset requested. Identical whether or not the email matched a user.
    Requested,
    /// Token accepted, the new password form can be shown.
    Editable { account: Account },
    /// New password refused, the form should be shown again.
    Invalid {
        account: Account,
        errors: ValidationErrors,
    },
    /// Token forged, malformed, expired or stale.
    Rejected,
    /// Password updated.
    Completed {
        account: Account,
        redirect_to: String,
        status: SignInStatus,
    },
}

impl ResetState {
    /// User-facing message for this state.
    pub fn flash(&self) -> Option<&'static str> {
        match self {
            Self::Requested => Some(NOTICE_REQUESTED),
            Self::Rejected => Some(FAILURE_INVALID_TOKEN),
            Self::Invalid { errors, .. } if is_blank(errors) => {
                Some(FAILURE_BLANK_PASSWORD)
            },
            Self::Invalid { .. } => Some(FAILURE_INVALID_PASSWORD),
            Self::Editable { .. } | Self::Completed { .. } => None,
        }
    }
}

fn is_blank(errors: &ValidationErrors) -> bool {
    errors
        .field_errors()
        .get("password")
        .is_some_and(|errors| errors.iter().any(|err| err.code == "blank"))
}

/// Orchestrates password resets.
pub struct PasswordReset {
    config: Arc<Configuration>,
    codec: TokenCodec,
    store: Arc<dyn CredentialStore>,
    mailer: Arc<dyn Mailer>,
    sessions: Arc<dyn SessionStore>,
}

impl PasswordReset {
    /// Create a new [`PasswordReset`].
    pub fn new(
        config: Arc<Configuration>,
        store: Arc<dyn CredentialStore>,
        mailer: Arc<dyn Mailer>,
        sessions: Arc<dyn SessionStore>,
    ) -> Self {
        let codec = TokenCodec::new(config.message_verifier());

        Self {
            config,
            codec,
            store,
            mailer,
            sessions,
        }
    }

    /// Replace the clock used to issue and check tokens.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.codec = self.codec.with_clock(clock);
        self
    }

    /// Request a reset link for `email`.
    ///
    /// Delivery runs on a detached task when called within a Tokio runtime,
    /// and is awaited otherwise. Either way its failure is only logged. The
    /// returned state never reveals whether the email belongs to a user.
    pub async fn create(&self, email: &str) -> Result<ResetState> {
        metrics::counter!("password_reset_requests_total").increment(1);

        if !self.config.allow_password_reset {
            tracing::debug!("password reset is disabled");
            return Ok(ResetState::Requested);
        }

        let email = normalize_email(email);
        let Some(account) = self.store.find_by_normalized_email(&email).await?
        else {
            tracing::debug!("password reset requested for unknown email");
            return Ok(ResetState::Requested);
        };

        let token = self.codec.issue(
            &account.id,
            &account.fingerprint,
            self.config.password_reset_time_limit(),
        )?;

        tracing::info!(user_id = %account.id, "password reset token issued");

        let delivery = deliver(Arc::clone(&self.mailer), account, token);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(delivery);
            },
            Err(_) => delivery.await,
        }

        Ok(ResetState::Requested)
    }

    /// Resolve the user a token was issued for.
    ///
    /// `None` when the token fails verification or the credential changed
    /// since issuance.
    pub async fn find_user_by_token(
        &self,
        token: &str,
    ) -> Result<Option<Account>> {
        if !self.config.allow_password_reset {
            return Ok(None);
        }

        let Some(claims) = self.codec.verify(token) else {
            return Ok(None);
        };

        self.store
            .find_by_id_and_fingerprint(&claims.user_id, &claims.fingerprint)
            .await
    }

    /// Check a token before showing the new password form.
    pub async fn edit(&self, token: &str) -> Result<ResetState> {
        match self.find_user_by_token(token).await? {
            Some(account) => Ok(ResetState::Editable { account }),
            None => Ok(self.rejected()),
        }
    }

    /// Replace the password of the token owner and sign them in.
    pub async fn update(
        &self,
        token: &str,
        form: &PasswordResetForm,
    ) -> Result<ResetState> {
        let Some(account) = self.find_user_by_token(token).await? else {
            return Ok(self.rejected());
        };

        if let Err(errors) = form.validate() {
            return Ok(ResetState::Invalid { account, errors });
        }

        let account =
            match self.store.update_password(&account.id, &form.password).await
            {
                Ok(updated) => updated,
                Err(Error::Validation(errors)) => {
                    return Ok(ResetState::Invalid { account, errors });
                },
                Err(err) => return Err(err),
            };

        tracing::info!(user_id = %account.id, "password reset completed");
        metrics::counter!("password_reset_completed_total").increment(1);

        let status = session::sign_in(
            &self.config.sign_in_guards(),
            self.sessions.as_ref(),
            account.clone(),
        )
        .await?;

        Ok(ResetState::Completed {
            account,
            redirect_to: self.config.redirect_url.clone(),
            status,
        })
    }

    fn rejected(&self) -> ResetState {
        metrics::counter!("password_reset_rejected_total").increment(1);
        ResetState::Rejected
    }
}

async fn deliver(mailer: Arc<dyn Mailer>, account: Account, token: String) {
    if let Err(err) = mailer.deliver_password_reset(&account, &token).await {
        tracing::warn!(
            error = %err,
            user_id = %account.id,
            "failed to deliver password reset email"
        );
    }
}
