use std::{fmt::Write, time::Duration};

use prometheus_client::{
    encoding::{EncodeLabelSet, EncodeLabelValue, LabelValueEncoder},
    metrics::{
        counter::Counter,
        family::Family,
        histogram::{exponential_buckets, Histogram},
    },
    registry::Registry,
};

use super::UnsealMetrics;

#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum MetricsResult {
    Success,
    Failure,
}

impl From<bool> for MetricsResult {
    fn from(success: bool) -> Self {
        if success {
            MetricsResult::Success
        } else {
            MetricsResult::Failure
        }
    }
}

impl EncodeLabelValue for MetricsResult {
    fn encode(&self, writer: &mut LabelValueEncoder<'_>) -> Result<(), std::fmt::Error> {
        match self {
            MetricsResult::Success => writer.write_str("success"),
            MetricsResult::Failure => writer.write_str("failure"),
        }
    }
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ResultLabel {
    pub endpoint: String,
    pub result: MetricsResult,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct EndpointLabel {
    pub endpoint: String,
}

#[derive(Clone)]
pub struct UnsealMetricsCollector {
    unseal_attempts: Family<ResultLabel, Counter>,
    unseal_duration: Family<EndpointLabel, Histogram>,
    seal_status_checks: Family<ResultLabel, Counter>,
    health_checks: Family<ResultLabel, Counter>,
    health_check_duration: Family<EndpointLabel, Histogram>,
}

impl UnsealMetricsCollector {
    pub fn new(registry: &mut Registry) -> Self {
        let unseal_attempts = Family::<ResultLabel, Counter>::default();
        let unseal_duration = Family::<EndpointLabel, Histogram>::new_with_constructor(|| {
            Histogram::new(exponential_buckets(0.005, 2.0, 12))
        });
        let seal_status_checks = Family::<ResultLabel, Counter>::default();
        let health_checks = Family::<ResultLabel, Counter>::default();
        let health_check_duration = Family::<EndpointLabel, Histogram>::new_with_constructor(|| {
            Histogram::new(exponential_buckets(0.005, 2.0, 12))
        });

        registry.register(
            "unseal_attempts",
            "Number of unseal attempts, labeled by endpoint and result",
            unseal_attempts.clone(),
        );
        registry.register(
            "unseal_duration_seconds",
            "Duration of unseal attempts, labeled by endpoint",
            unseal_duration.clone(),
        );
        registry.register(
            "seal_status_checks",
            "Number of seal status checks, labeled by endpoint and result",
            seal_status_checks.clone(),
        );
        registry.register(
            "health_checks",
            "Number of health checks, labeled by endpoint and result",
            health_checks.clone(),
        );
        registry.register(
            "health_check_duration_seconds",
            "Duration of health checks, labeled by endpoint",
            health_check_duration.clone(),
        );

        Self { unseal_attempts, unseal_duration, seal_status_checks, health_checks, health_check_duration }
    }

    pub fn unseal_attempts(&self, endpoint: &str, success: bool) -> u64 {
        self.unseal_attempts.get_or_create(&result_label(endpoint, success)).get()
    }

    pub fn seal_status_checks(&self, endpoint: &str, success: bool) -> u64 {
        self.seal_status_checks.get_or_create(&result_label(endpoint, success)).get()
    }

    pub fn health_checks(&self, endpoint: &str, success: bool) -> u64 {
        self.health_checks.get_or_create(&result_label(endpoint, success)).get()
    }
}

fn result_label(endpoint: &str, success: bool) -> ResultLabel {
    ResultLabel { endpoint: endpoint.to_string(), result: success.into() }
}

fn endpoint_label(endpoint: &str) -> EndpointLabel {
    EndpointLabel { endpoint: endpoint.to_string() }
}

impl UnsealMetrics for UnsealMetricsCollector {
    fn record_unseal_attempt(&self, endpoint: &str, success: bool, duration: Duration) {
        self.unseal_attempts.get_or_create(&result_label(endpoint, success)).inc();
        self.unseal_duration.get_or_create(&endpoint_label(endpoint)).observe(duration.as_secs_f64());
    }

    fn record_health_check(&self, endpoint: &str, success: bool, duration: Duration) {
        self.health_checks.get_or_create(&result_label(endpoint, success)).inc();
        self.health_check_duration.get_or_create(&endpoint_label(endpoint)).observe(duration.as_secs_f64());
    }

    fn record_seal_status_check(&self, endpoint: &str, success: bool, _duration: Duration) {
        self.seal_status_checks.get_or_create(&result_label(endpoint, success)).inc();
    }
}
