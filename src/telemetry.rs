//! Telemetry logic.
//! Support tracing and metrics.

use metrics::{Unit, describe_counter};
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info";

/// Install a global `fmt` subscriber filtered by `RUST_LOG`.
///
/// Fails if a global subscriber is already set.
pub fn init_tracing() -> Result<(), Box<dyn std::error::Error + Send + Sync>>
{
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
}

/// Register descriptions for every metric this crate emits.
///
/// Call after installing a metrics recorder.
pub fn describe_metrics() {
    describe_counter!(
        "password_reset_requests_total",
        Unit::Count,
        "Password reset requests, matching an account or not."
    );
    describe_counter!(
        "password_reset_rejected_total",
        Unit::Count,
        "Reset tokens refused as invalid, expired or stale."
    );
    describe_counter!(
        "password_reset_completed_total",
        Unit::Count,
        "Passwords replaced through a reset token."
    );
    describe_counter!(
        "sign_in_guard_denied_total",
        Unit::Count,
        "Sign-ins denied by a guard."
    );
}
