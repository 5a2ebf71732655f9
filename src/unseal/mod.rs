//! Unseal strategies.
//!
//! A strategy takes a Vault endpoint from sealed to unsealed. The set is closed: [`DirectStrategy`] does the
//! work, [`RetryStrategy`] re-runs an inner strategy under a [`RetryPolicy`], and [`ParallelStrategy`] fans
//! an inner strategy out over many endpoints. Callers build the composition they want explicitly:
//!
//! ```no_run
//! use std::{sync::Arc, time::Duration};
//!
//! use vault_autounseal::{
//!     unseal::{retry::DefaultRetryPolicy, UnsealStrategy},
//!     validator::DefaultKeyValidator,
//! };
//!
//! let strategy = UnsealStrategy::direct(Arc::new(DefaultKeyValidator::new()), None)
//!     .with_retry(Arc::new(DefaultRetryPolicy::new(5, Duration::from_millis(500), Duration::from_secs(10))));
//! ```

use std::{future::Future, pin::Pin, sync::Arc, time::Duration};

use crate::{
    api::{SealApi, SealStatus},
    context::Context,
    errors::AuError,
    metrics::UnsealMetrics,
    validator::KeyValidator,
};

pub mod direct;
pub mod parallel;
pub mod retry;

pub use direct::DirectStrategy;
pub use parallel::{ParallelStrategy, UnsealTarget};
pub use retry::{DefaultRetryPolicy, RetryPolicy, RetryStrategy};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

#[derive(Clone)]
pub enum UnsealStrategy {
    Direct(DirectStrategy),
    Retry(RetryStrategy),
    Parallel(ParallelStrategy),
}

impl UnsealStrategy {
    pub fn direct(validator: Arc<dyn KeyValidator>, metrics: Option<Arc<dyn UnsealMetrics>>) -> Self {
        UnsealStrategy::Direct(DirectStrategy::new(validator, metrics))
    }

    pub fn with_retry(self, policy: Arc<dyn RetryPolicy>) -> Self {
        UnsealStrategy::Retry(RetryStrategy::new(self, policy))
    }

    pub fn with_parallelism(self, max_concurrency: usize) -> Self {
        UnsealStrategy::Parallel(ParallelStrategy::new(self, max_concurrency))
    }

    /// The composition a client uses when none is configured: direct, wrapped in exponential retry when more
    /// than one attempt is allowed.
    pub fn default_for(
        validator: Arc<dyn KeyValidator>,
        metrics: Option<Arc<dyn UnsealMetrics>>,
        max_retries: usize,
        retry_delay: Duration,
    ) -> Self {
        let strategy = Self::direct(validator, metrics);
        if max_retries > 1 {
            strategy.with_retry(Arc::new(DefaultRetryPolicy::new(max_retries, retry_delay, retry::DEFAULT_MAX_DELAY)))
        } else {
            strategy
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            UnsealStrategy::Direct(_) => "direct",
            UnsealStrategy::Retry(_) => "retry",
            UnsealStrategy::Parallel(_) => "parallel",
        }
    }

    pub fn unseal<'a>(
        &'a self,
        ctx: &'a Context,
        client: &'a dyn SealApi,
        keys: &'a [String],
        threshold: usize,
    ) -> BoxFuture<'a, Result<SealStatus, AuError>> {
        match self {
            UnsealStrategy::Direct(s) => Box::pin(s.unseal(ctx, client, keys, threshold)),
            UnsealStrategy::Retry(s) => Box::pin(s.unseal(ctx, client, keys, threshold)),
            UnsealStrategy::Parallel(s) => Box::pin(s.unseal(ctx, client, keys, threshold)),
        }
    }
}
