use std::{sync::Arc, time::Duration};

use super::UnsealStrategy;
use crate::{
    api::{SealApi, SealStatus},
    context::Context,
    errors::AuError,
};

pub const DEFAULT_MAX_ATTEMPTS: usize = 3;
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(10);

/// Decides whether a failed attempt is tried again and how long to wait first. Attempts are zero-based.
pub trait RetryPolicy: Send + Sync {
    fn should_retry(&self, err: &AuError, attempt: usize) -> bool;

    fn next_delay(&self, attempt: usize) -> Duration;

    fn max_attempts(&self) -> usize;
}

/// Exponential backoff: `base_delay * 2^attempt`, capped at `max_delay`. Only errors that classify
/// themselves as retryable are retried.
#[derive(Debug, Clone)]
pub struct DefaultRetryPolicy {
    max_attempts: usize,
    base_delay: Duration,
    max_delay: Duration,
}

impl Default for DefaultRetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS, DEFAULT_BASE_DELAY, DEFAULT_MAX_DELAY)
    }
}

impl DefaultRetryPolicy {
    pub fn new(max_attempts: usize, base_delay: Duration, max_delay: Duration) -> Self {
        Self { max_attempts, base_delay, max_delay }
    }
}

impl RetryPolicy for DefaultRetryPolicy {
    fn should_retry(&self, err: &AuError, attempt: usize) -> bool {
        if attempt + 1 >= self.max_attempts {
            return false;
        }
        err.is_retryable()
    }

    fn next_delay(&self, attempt: usize) -> Duration {
        let factor = 1u32 << attempt.min(30);
        self.base_delay.checked_mul(factor).map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }

    fn max_attempts(&self) -> usize {
        self.max_attempts
    }
}

/// Re-runs the inner strategy from scratch after each retryable failure. Every attempt validates again and
/// reads a fresh seal status.
#[derive(Clone)]
pub struct RetryStrategy {
    inner: Arc<UnsealStrategy>,
    policy: Arc<dyn RetryPolicy>,
}

impl RetryStrategy {
    pub fn new(inner: UnsealStrategy, policy: Arc<dyn RetryPolicy>) -> Self {
        Self { inner: Arc::new(inner), policy }
    }

    pub fn inner(&self) -> &UnsealStrategy {
        &self.inner
    }

    pub fn policy(&self) -> &Arc<dyn RetryPolicy> {
        &self.policy
    }

    pub async fn unseal(
        &self,
        ctx: &Context,
        client: &dyn SealApi,
        keys: &[String],
        threshold: usize,
    ) -> Result<SealStatus, AuError> {
        let started = std::time::Instant::now();
        let max_attempts = self.policy.max_attempts().max(1);
        let mut attempt = 0;

        loop {
            if let Some(reason) = ctx.done() {
                return Err(AuError::interrupted(reason, "unseal retry", ctx.timeout().unwrap_or_default(), started.elapsed()));
            }

            let err = match self.inner.unseal(ctx, client, keys, threshold).await {
                Ok(status) => return Ok(status),
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) => e,
            };

            let attempts = attempt + 1;
            if attempts >= max_attempts || err.is_validation_error() || !self.policy.should_retry(&err, attempt) {
                return Err(AuError::AttemptsFailed { operation: "unseal".into(), attempts, source: Box::new(err) });
            }

            let delay = self.policy.next_delay(attempt);
            log::warn!(
                "unseal attempt {}/{} for {} failed, retrying in {:?}: {}",
                attempts,
                max_attempts,
                client.address(),
                delay,
                err
            );

            ctx.sleep(delay).await.map_err(|reason| {
                AuError::interrupted(reason, "unseal retry", ctx.timeout().unwrap_or_default(), started.elapsed())
            })?;
            attempt += 1;
        }
    }
}
