//! Session establishment behind the guard chain.

use async_trait::async_trait;

use crate::error::Result;
use crate::guard::{GuardChain, SignInContext, SignInStatus};
use crate::user::Account;

const GUARD_ABORTED: &str = "Sign-in is temporarily unavailable.";

/// Port for session persistence.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Start an authenticated session for `account`.
    async fn establish(&self, account: &Account) -> Result<()>;
}

/// Run the guard chain and establish a session if every guard agrees.
///
/// A guard aborting the chain counts as a denial.
pub async fn sign_in(
    guards: &GuardChain,
    sessions: &dyn SessionStore,
    account: Account,
) -> Result<SignInStatus> {
    let context = match guards.run(SignInContext::new(account)) {
        Ok(context) => context,
        Err(err) => {
            tracing::error!(error = %err, "sign-in guard chain aborted");
            return Ok(SignInStatus::Failure {
                reason: GUARD_ABORTED.to_owned(),
            });
        },
    };

    if context.status.is_success() {
        sessions.establish(&context.account).await?;
        tracing::debug!(user_id = %context.account.id, "session established");
    }

    Ok(context.status)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::guard::{Guard, GuardError, LockedAccountGuard};
    use crate::memory::MemorySessions;
    use crate::user::{Fingerprint, UserId};

    struct Unavailable;

    impl Guard for Unavailable {
        fn name(&self) -> &str {
            "unavailable"
        }

        fn apply(
            &self,
            _: SignInContext,
        ) -> std::result::Result<SignInContext, GuardError> {
            Err(GuardError::Aborted {
                guard: "unavailable".into(),
                details: "rate limiter offline".into(),
            })
        }
    }

    fn account(locked: bool) -> Account {
        Account {
            id: UserId::from(9),
            email: "jane@example.com".into(),
            fingerprint: Fingerprint::from("fp"),
            locked,
        }
    }

    #[tokio::test]
    async fn test_sign_in_establishes_session() {
        let sessions = MemorySessions::default();
        let status = sign_in(&GuardChain::default(), &sessions, account(false))
            .await
            .unwrap();

        assert!(status.is_success());
        assert!(sessions.is_signed_in(&UserId::from(9)));
    }

    #[tokio::test]
    async fn test_denied_sign_in_has_no_session() {
        let sessions = MemorySessions::default();
        let guards = GuardChain::new(vec![Arc::new(LockedAccountGuard)]);
        let status = sign_in(&guards, &sessions, account(true)).await.unwrap();

        assert!(!status.is_success());
        assert!(!sessions.is_signed_in(&UserId::from(9)));
    }

    #[tokio::test]
    async fn test_aborted_chain_is_denial() {
        let sessions = MemorySessions::default();
        let guards = GuardChain::new(vec![Arc::new(Unavailable)]);
        let status = sign_in(&guards, &sessions, account(false)).await.unwrap();

        assert_eq!(
            status,
            SignInStatus::Failure {
                reason: GUARD_ABORTED.into()
            }
        );
        assert!(!sessions.is_signed_in(&UserId::from(9)));
    }
}
