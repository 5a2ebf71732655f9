use std::{sync::Arc, time::Instant};

use tokio::{sync::Semaphore, task::JoinSet};
use zeroize::Zeroizing;

use super::UnsealStrategy;
use crate::{
    api::{SealApi, SealStatus},
    context::Context,
    errors::AuError,
};

pub const DEFAULT_MAX_CONCURRENCY: usize = 5;

/// One endpoint to unseal together with its key shares.
pub struct UnsealTarget {
    pub name: String,
    pub client: Arc<dyn SealApi>,
    pub keys: Zeroizing<Vec<String>>,
    pub threshold: usize,
}

/// Runs an inner strategy over many endpoints at once, with at most `max_concurrency` in flight. A single
/// endpoint is handed straight to the inner strategy.
#[derive(Clone)]
pub struct ParallelStrategy {
    inner: Arc<UnsealStrategy>,
    max_concurrency: usize,
}

impl ParallelStrategy {
    pub fn new(inner: UnsealStrategy, max_concurrency: usize) -> Self {
        let max_concurrency = if max_concurrency == 0 { DEFAULT_MAX_CONCURRENCY } else { max_concurrency };
        Self { inner: Arc::new(inner), max_concurrency }
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    pub async fn unseal(
        &self,
        ctx: &Context,
        client: &dyn SealApi,
        keys: &[String],
        threshold: usize,
    ) -> Result<SealStatus, AuError> {
        self.inner.unseal(ctx, client, keys, threshold).await
    }

    /// Unseals every target and returns `(name, result)` pairs in input order.
    pub async fn unseal_all(&self, ctx: &Context, targets: Vec<UnsealTarget>) -> Vec<(String, Result<SealStatus, AuError>)> {
        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let names: Vec<String> = targets.iter().map(|t| t.name.clone()).collect();
        let mut tasks = JoinSet::new();

        for (index, target) in targets.into_iter().enumerate() {
            let inner = self.inner.clone();
            let ctx = ctx.clone();
            let semaphore = semaphore.clone();

            tasks.spawn(async move {
                let queued = Instant::now();
                let result = match ctx.run(semaphore.acquire_owned()).await {
                    Err(reason) => Err(AuError::interrupted(
                        reason,
                        "unseal",
                        ctx.timeout().unwrap_or_default(),
                        queued.elapsed(),
                    )),
                    Ok(Err(e)) => Err(AuError::ErrOther(anyhow::anyhow!("unseal scheduling failed: {}", e))),
                    Ok(Ok(_permit)) => {
                        log::debug!("unsealing {} at {}", target.name, target.client.address());
                        inner.unseal(&ctx, target.client.as_ref(), &target.keys[..], target.threshold).await
                    }
                };
                (index, result)
            });
        }

        let mut results: Vec<Option<Result<SealStatus, AuError>>> = names.iter().map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, result)) => results[index] = Some(result),
                Err(e) => log::error!("unseal task failed: {}", e),
            }
        }

        names
            .into_iter()
            .zip(results)
            .map(|(name, result)| {
                let result = result.unwrap_or_else(|| {
                    Err(AuError::ErrOther(anyhow::anyhow!("unseal task for {} did not complete", name)))
                });
                (name, result)
            })
            .collect()
    }
}
