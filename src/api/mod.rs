//! The `vault_autounseal::api` module talks to the Vault system endpoints: seal status, unseal key
//! submission, initialization state and health.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{context::Context, errors::AuError};

pub mod client;
pub mod repository;
pub mod sys;
pub mod tls;

pub use client::{Client, ClientConfig};
pub use repository::ClientRepository;

/// Reply of `GET /v1/sys/seal-status` and `PUT /v1/sys/unseal`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealStatus {
    #[serde(default, rename = "type")]
    pub seal_type: String,
    #[serde(default)]
    pub initialized: bool,
    pub sealed: bool,
    #[serde(default, rename = "t")]
    pub threshold: usize,
    #[serde(default, rename = "n")]
    pub shares: usize,
    #[serde(default)]
    pub progress: usize,
    #[serde(default)]
    pub nonce: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub cluster_name: String,
    #[serde(default)]
    pub cluster_id: String,
    #[serde(default)]
    pub recovery_seal: bool,
    #[serde(default)]
    pub storage_type: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    #[serde(default)]
    pub initialized: bool,
    #[serde(default)]
    pub sealed: bool,
    #[serde(default)]
    pub standby: bool,
    #[serde(default)]
    pub performance_standby: bool,
    #[serde(default)]
    pub replication_performance_mode: String,
    #[serde(default)]
    pub replication_dr_mode: String,
    #[serde(default)]
    pub server_time_utc: u64,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub cluster_name: String,
    #[serde(default)]
    pub cluster_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitStatus {
    pub initialized: bool,
}

#[derive(Debug, Clone, Default)]
pub struct HttpResponse {
    pub method: String,
    pub url: String,
    pub response_status: u16,
    pub response_data: Option<Value>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.response_status)
    }

    /// The `errors` array Vault puts in failed replies.
    pub fn errors(&self) -> Vec<String> {
        self.response_data
            .as_ref()
            .and_then(|data| data.get("errors"))
            .and_then(Value::as_array)
            .map(|errors| errors.iter().map(|e| e.as_str().map_or_else(|| e.to_string(), str::to_string)).collect())
            .unwrap_or_default()
    }
}

/// What an unseal strategy needs from a Vault endpoint. Implemented by [`Client`] and by test doubles.
#[async_trait]
pub trait SealApi: Send + Sync {
    /// Endpoint identifier used in errors and metrics.
    fn address(&self) -> String;

    async fn get_seal_status(&self, ctx: &Context) -> Result<SealStatus, AuError>;

    /// Submits the base64 encoded key share found at `key_index` and returns the resulting seal status.
    async fn submit_single_key(&self, ctx: &Context, key: &str, key_index: usize) -> Result<SealStatus, AuError>;
}
