//! Role store lookups with bounded retry.
//!
//! [`RoleStore`] is the persistence seam. [`RetryingRoleStore`] wraps any
//! store and absorbs transient failures: it retries with exponential backoff
//! up to `max_attempts`, and never lets the whole sequence (including an
//! in-flight query) run past `ceiling`. Anything it cannot absorb comes back
//! as [`StoreError::Fatal`].

use async_trait::async_trait;
use medislot_core::SubjectId;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, sleep, timeout_at};
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::user::UserRecord;

/// Persistence-backed lookup of user records.
#[async_trait]
pub trait RoleStore: Send + Sync {
    /// Finds the record for a subject.
    ///
    /// `Ok(None)` means the identity is valid but has not been synced yet.
    async fn find_by_subject(&self, subject: &SubjectId) -> Result<Option<UserRecord>, StoreError>;
}

/// Retry configuration for role store lookups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay before the first retry, in milliseconds. Doubles per retry.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Upper bound on a single backoff delay, in milliseconds.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Upper bound on the whole lookup, attempts and delays together.
    #[serde(default = "default_ceiling_ms")]
    pub ceiling_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    100
}

fn default_max_delay_ms() -> u64 {
    500
}

fn default_ceiling_ms() -> u64 {
    2_000
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            ceiling_ms: default_ceiling_ms(),
        }
    }
}

impl RetryPolicy {
    /// Returns the backoff delay after the given (1-based) failed attempt.
    #[must_use]
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(16);
        let delay = self.base_delay_ms.saturating_mul(1 << shift);
        Duration::from_millis(delay.min(self.max_delay_ms))
    }

    /// Returns the overall time budget for one lookup.
    #[must_use]
    pub fn ceiling(&self) -> Duration {
        Duration::from_millis(self.ceiling_ms)
    }

    fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

/// A role store decorator that retries transient failures.
#[derive(Clone)]
pub struct RetryingRoleStore {
    inner: Arc<dyn RoleStore>,
    policy: RetryPolicy,
}

impl RetryingRoleStore {
    /// Wraps a store with the given retry policy.
    #[must_use]
    pub fn new(inner: Arc<dyn RoleStore>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    /// Returns the retry policy.
    #[must_use]
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Looks up a subject, retrying transient failures within the policy.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Fatal`] for non-retryable failures, when
    /// attempts are exhausted, or when the ceiling is reached. Never returns
    /// [`StoreError::Transient`].
    pub async fn lookup(&self, subject: &SubjectId) -> Result<Option<UserRecord>, StoreError> {
        let max_attempts = self.policy.attempts();
        let deadline = Instant::now() + self.policy.ceiling();
        let mut attempt = 0;

        loop {
            attempt += 1;

            let outcome = timeout_at(deadline, self.inner.find_by_subject(subject))
                .await
                .map_err(|_| {
                    StoreError::fatal(format!(
                        "lookup exceeded {}ms ceiling on attempt {attempt}",
                        self.policy.ceiling_ms
                    ))
                })?;

            let reason = match outcome {
                Ok(found) => {
                    if attempt > 1 {
                        debug!(
                            attempt,
                            subject = %subject.redacted(),
                            "role store lookup recovered"
                        );
                    }
                    return Ok(found);
                }
                Err(StoreError::Transient { reason }) => reason,
                Err(fatal) => return Err(fatal),
            };

            if attempt >= max_attempts {
                return Err(StoreError::fatal(format!(
                    "retries exhausted after {attempt} attempts: {reason}"
                )));
            }

            let delay = self.policy.delay_after(attempt);
            if Instant::now() + delay >= deadline {
                return Err(StoreError::fatal(format!(
                    "retry ceiling of {}ms reached after {attempt} attempts: {reason}",
                    self.policy.ceiling_ms
                )));
            }

            warn!(
                attempt,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                subject = %subject.redacted(),
                reason = %reason,
                "transient role store failure, retrying"
            );
            sleep(delay).await;
        }
    }
}

#[async_trait]
impl RoleStore for RetryingRoleStore {
    async fn find_by_subject(&self, subject: &SubjectId) -> Result<Option<UserRecord>, StoreError> {
        self.lookup(subject).await
    }
}
