use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use crate::{
    api::{SealApi, SealStatus},
    context::{Context, ContextError},
    errors::{AuError, UnsealError, VaultError},
    metrics::UnsealMetrics,
    validator::KeyValidator,
};

/// Pause between two key submissions of one attempt.
pub const DEFAULT_SUBMIT_DELAY: Duration = Duration::from_millis(100);

/// Validates the keys, reads the seal status and submits at most `threshold` keys in order, stopping as soon
/// as Vault reports unsealed.
#[derive(Clone)]
pub struct DirectStrategy {
    validator: Arc<dyn KeyValidator>,
    metrics: Option<Arc<dyn UnsealMetrics>>,
    submit_delay: Duration,
}

impl DirectStrategy {
    pub fn new(validator: Arc<dyn KeyValidator>, metrics: Option<Arc<dyn UnsealMetrics>>) -> Self {
        Self { validator, metrics, submit_delay: DEFAULT_SUBMIT_DELAY }
    }

    pub fn with_submit_delay(mut self, submit_delay: Duration) -> Self {
        self.submit_delay = submit_delay;
        self
    }

    pub async fn unseal(
        &self,
        ctx: &Context,
        client: &dyn SealApi,
        keys: &[String],
        threshold: usize,
    ) -> Result<SealStatus, AuError> {
        let started = Instant::now();
        let endpoint = client.address();

        if let Err(e) = self.validator.validate_keys(keys, threshold) {
            return Err(AuError::context("validation failed", e));
        }

        let status = match client.get_seal_status(ctx).await {
            Ok(status) => status,
            Err(e) if e.is_cancelled() || matches!(e, AuError::ErrClientClosed | AuError::Vault(_)) => return Err(e),
            Err(e) => return Err(VaultError::new("get-seal-status", &endpoint, e, true).into()),
        };

        if !status.sealed {
            log::debug!("vault at {} is already unsealed", endpoint);
            self.record(&endpoint, true, started);
            return Ok(status);
        }

        let result = self.submit_keys(ctx, client, &endpoint, &keys[..threshold.min(keys.len())], started).await;
        self.record(&endpoint, matches!(&result, Ok(status) if !status.sealed), started);
        result
    }

    async fn submit_keys(
        &self,
        ctx: &Context,
        client: &dyn SealApi,
        endpoint: &str,
        keys: &[String],
        started: Instant,
    ) -> Result<SealStatus, AuError> {
        let mut last_status: Option<SealStatus> = None;

        for (index, key) in keys.iter().enumerate() {
            if index > 0 {
                ctx.sleep(self.submit_delay)
                    .await
                    .map_err(|reason| self.interrupted(ctx, reason, started))?;
            }
            if let Some(reason) = ctx.done() {
                return Err(self.interrupted(ctx, reason, started));
            }

            let status = match client.submit_single_key(ctx, key, index).await {
                Ok(status) => status,
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) => return Err(UnsealError::new(endpoint, index, e, last_status).into()),
            };

            log::debug!(
                "key {}/{} accepted by {}, progress {}/{}",
                index + 1,
                keys.len(),
                endpoint,
                status.progress,
                status.threshold
            );

            let sealed = status.sealed;
            last_status = Some(status);
            if !sealed {
                log::info!("vault at {} unsealed after {} key(s)", endpoint, index + 1);
                break;
            }
        }

        last_status.ok_or_else(|| AuError::ErrOther(anyhow::anyhow!("no unseal key was submitted to {}", endpoint)))
    }

    fn interrupted(&self, ctx: &Context, reason: ContextError, started: Instant) -> AuError {
        AuError::interrupted(reason, "unseal", ctx.timeout().unwrap_or_default(), started.elapsed())
    }

    fn record(&self, endpoint: &str, success: bool, started: Instant) {
        if let Some(metrics) = &self.metrics {
            metrics.record_unseal_attempt(endpoint, success, started.elapsed());
        }
    }
}
