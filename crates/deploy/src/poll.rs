//! Bounded polling for post-conditions.
//!
//! A receipt only says a transaction was mined; the node answering reads may
//! not reflect it yet. Post-deploy checks therefore poll the contract's own
//! accessors until the expected value shows up or a deadline passes.

use std::{future::Future, time::Duration};

use tokio::time::Instant;

use crate::error::{DeployError, Result};

/// Default interval between two evaluations of a condition.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Default overall deadline for a condition.
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_millis(5000);

/// Interval and deadline of a poll loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            timeout: DEFAULT_POLL_TIMEOUT,
        }
    }
}

impl PollSettings {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }
}

/// Evaluate `condition` until it returns `Ok(true)` or `settings.timeout` elapses.
///
/// The condition is evaluated immediately, then every `settings.interval`. The
/// last evaluation happens exactly at the deadline. Errors from the condition
/// count as "not yet"; the most recent one is reported if the deadline passes.
///
/// # Returns
/// `Ok(())` once the condition holds, or [`DeployError::VerificationTimeout`].
pub async fn await_condition<F, Fut>(
    description: &str,
    settings: &PollSettings,
    mut condition: F,
) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool>>,
{
    let start = Instant::now();
    let mut last_error = None;

    loop {
        match condition().await {
            Ok(true) => {
                tracing::debug!(
                    condition = %description,
                    elapsed = ?start.elapsed(),
                    "Condition observed"
                );
                return Ok(());
            }
            Ok(false) => {
                tracing::trace!(condition = %description, "Condition not met yet, retrying...");
            }
            Err(e) => {
                tracing::trace!(condition = %description, error = %e, "Condition check failed, retrying...");
                last_error = Some(e.to_string());
            }
        }

        let elapsed = start.elapsed();
        if elapsed >= settings.timeout {
            return Err(DeployError::VerificationTimeout {
                condition: description.to_string(),
                timeout: settings.timeout,
                last_error,
            });
        }

        let remaining = settings.timeout - elapsed;
        tokio::time::sleep(settings.interval.min(remaining)).await;
    }
}
