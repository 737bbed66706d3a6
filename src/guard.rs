//! Sign-in guards.
//!
//! Guards run in configuration order around every sign-in. Each one
//! receives the current [`SignInContext`] and hands back the same context,
//! a denied one, or an error that aborts the chain. The first denial stops
//! the chain.

use std::fmt;
use std::sync::Arc;

use crate::user::Account;

/// Outcome of a sign-in attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignInStatus {
    Success,
    Failure { reason: String },
}

impl SignInStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

/// Sign-in attempt flowing through the guard chain.
#[derive(Debug, Clone)]
pub struct SignInContext {
    pub account: Account,
    pub status: SignInStatus,
}

impl SignInContext {
    /// Create a new successful [`SignInContext`].
    pub fn new(account: Account) -> Self {
        Self {
            account,
            status: SignInStatus::Success,
        }
    }

    /// Deny the sign-in.
    pub fn deny(mut self, reason: impl Into<String>) -> Self {
        self.status = SignInStatus::Failure {
            reason: reason.into(),
        };
        self
    }

    pub fn is_denied(&self) -> bool {
        !self.status.is_success()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GuardError {
    #[error("guard `{guard}` aborted sign-in: {details}")]
    Aborted { guard: String, details: String },
}

/// Authorization check run around sign-in.
///
/// Guards must not share mutable state: the same instance serves every
/// concurrent sign-in.
pub trait Guard: Send + Sync {
    /// Identifier shown in the configured guard stack.
    fn name(&self) -> &str;

    fn apply(&self, context: SignInContext) -> Result<SignInContext, GuardError>;
}

impl fmt::Debug for dyn Guard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Guard").field(&self.name()).finish()
    }
}

/// Deny sign-in to locked accounts.
#[derive(Debug, Default, Clone, Copy)]
pub struct LockedAccountGuard;

impl Guard for LockedAccountGuard {
    fn name(&self) -> &str {
        "locked_account"
    }

    fn apply(&self, context: SignInContext) -> Result<SignInContext, GuardError> {
        if context.account.locked {
            Ok(context.deny("Your account is locked."))
        } else {
            Ok(context)
        }
    }
}

/// Ordered guard stack.
#[derive(Debug, Clone, Default)]
pub struct GuardChain {
    guards: Vec<Arc<dyn Guard>>,
}

impl GuardChain {
    /// Create a new [`GuardChain`].
    pub fn new(guards: Vec<Arc<dyn Guard>>) -> Self {
        Self { guards }
    }

    pub fn len(&self) -> usize {
        self.guards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.guards.is_empty()
    }

    /// Run every guard in order, stopping at the first denial.
    pub fn run(
        &self,
        mut context: SignInContext,
    ) -> Result<SignInContext, GuardError> {
        for guard in &self.guards {
            context = guard.apply(context)?;

            if context.is_denied() {
                tracing::debug!(
                    guard = guard.name(),
                    user_id = %context.account.id,
                    "sign-in denied by guard"
                );
                metrics::counter!(
                    "sign_in_guard_denied_total",
                    "guard" => guard.name().to_owned()
                )
                .increment(1);
                break;
            }
        }

        Ok(context)
    }
}

impl From<Vec<Arc<dyn Guard>>> for GuardChain {
    fn from(guards: Vec<Arc<dyn Guard>>) -> Self {
        Self::new(guards)
    }
}
