//! Stateless password reset and sign-in guards for Autha.
//!
//! Reset tokens are signed, expiring and bound to a fingerprint of the
//! current credential, so no server-side state is needed to issue, check or
//! revoke them. Persistence, delivery and sessions are left to the host
//! application through the [`CredentialStore`], [`Mailer`] and
//! [`SessionStore`] ports.

#![forbid(unsafe_code)]

pub mod clock;
pub mod config;
pub mod crypto;
pub mod error;
pub mod guard;
pub mod mail;
pub mod memory;
pub mod password_reset;
pub mod session;
pub mod telemetry;
pub mod token;
pub mod user;

pub use config::{Configuration, configuration, configure};
pub use crypto::{HmacVerifier, MessageVerifier};
pub use error::{Error, Result};
pub use guard::{Guard, GuardChain, GuardError, SignInContext, SignInStatus};
pub use mail::Mailer;
pub use password_reset::{PasswordReset, PasswordResetForm, ResetState};
pub use session::SessionStore;
pub use token::{ResetToken, TokenCodec};
pub use user::{Account, CredentialStore, Fingerprint, UserId};
