//! The `vault_autounseal::metrics` module records unseal activity with Prometheus.
//!
//! Strategies and clients only see the [`UnsealMetrics`] sink. `manager` holds the Prometheus registry and
//! `unseal_metrics` the collector that implements the sink on top of it.

use std::time::Duration;

pub mod manager;
pub mod unseal_metrics;

pub use manager::MetricsManager;
pub use unseal_metrics::UnsealMetricsCollector;

/// Receives the outcome of every unseal attempt, health check and seal status check. Implementations must be
/// safe to call from many tasks at once.
pub trait UnsealMetrics: Send + Sync {
    fn record_unseal_attempt(&self, endpoint: &str, success: bool, duration: Duration);

    fn record_health_check(&self, endpoint: &str, success: bool, duration: Duration);

    fn record_seal_status_check(&self, endpoint: &str, success: bool, duration: Duration);
}
