use std::sync::{Arc, Mutex, PoisonError};

use prometheus_client::{encoding::text::encode, registry::Registry};

use crate::{errors::AuError, metrics::unseal_metrics::UnsealMetricsCollector};

pub const METRICS_PREFIX: &str = "vault_autounseal";

#[derive(Clone)]
pub struct MetricsManager {
    pub registry: Arc<Mutex<Registry>>,
    pub unseal_metrics: Arc<UnsealMetricsCollector>,
}

impl Default for MetricsManager {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsManager {
    pub fn new() -> Self {
        let mut registry = Registry::with_prefix(METRICS_PREFIX);
        let unseal_metrics = Arc::new(UnsealMetricsCollector::new(&mut registry));
        MetricsManager { registry: Arc::new(Mutex::new(registry)), unseal_metrics }
    }

    /// Renders every registered metric in the Prometheus text exposition format.
    pub fn encode(&self) -> Result<String, AuError> {
        let registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
        let mut buffer = String::new();
        encode(&mut buffer, &registry).map_err(|e| AuError::ErrOther(anyhow::anyhow!("failed to encode metrics: {}", e)))?;
        Ok(buffer)
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use super::*;
    use crate::metrics::UnsealMetrics;

    #[test]
    fn test_metrics_record_and_encode() {
        let manager = MetricsManager::new();
        let metrics = manager.unseal_metrics.clone();

        metrics.record_unseal_attempt("http://vault-0:8200", true, Duration::from_millis(120));
        metrics.record_unseal_attempt("http://vault-0:8200", false, Duration::from_millis(30));
        metrics.record_unseal_attempt("http://vault-0:8200", true, Duration::from_millis(80));
        metrics.record_seal_status_check("http://vault-0:8200", true, Duration::from_millis(5));
        metrics.record_health_check("http://vault-1:8200", false, Duration::from_millis(7));

        assert_eq!(metrics.unseal_attempts("http://vault-0:8200", true), 2);
        assert_eq!(metrics.unseal_attempts("http://vault-0:8200", false), 1);
        assert_eq!(metrics.seal_status_checks("http://vault-0:8200", true), 1);
        assert_eq!(metrics.health_checks("http://vault-1:8200", false), 1);

        let text = manager.encode().unwrap();
        assert!(text.contains("vault_autounseal_unseal_attempts_total"));
        assert!(text.contains(r#"endpoint="http://vault-0:8200",result="success""#));
        assert!(text.contains("vault_autounseal_unseal_duration_seconds_bucket"));
        assert!(text.contains("vault_autounseal_health_checks_total"));
    }
}
