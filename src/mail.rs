//! Out-of-band delivery of reset links.

use async_trait::async_trait;

use crate::error::Result;
use crate::user::Account;

/// Port for sending password reset emails.
///
/// Called from a detached task: the flow never waits on delivery nor
/// retries it. Failures are only logged.
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Send `token` to the owner of `account`.
    async fn deliver_password_reset(
        &self,
        account: &Account,
        token: &str,
    ) -> Result<()>;
}
