use derive_more::Deref;
use serde::Serialize;
use zeroize::Zeroizing;

use super::{Client, HttpResponse};
use crate::{context::Context, errors::AuError};

pub const SEAL_STATUS_PATH: &str = "/v1/sys/seal-status";
pub const UNSEAL_PATH: &str = "/v1/sys/unseal";
pub const HEALTH_PATH: &str = "/v1/sys/health";
pub const INIT_PATH: &str = "/v1/sys/init";

/// Makes `/v1/sys/health` answer 200 for sealed, standby and uninitialized nodes so their state can be read
/// instead of surfacing as a failed request.
const HEALTH_QUERY: &[(&str, &str)] = &[
    ("standbyok", "true"),
    ("perfstandbyok", "true"),
    ("sealedcode", "200"),
    ("uninitcode", "200"),
    ("drsecondarycode", "200"),
];

#[derive(Serialize)]
struct UnsealRequest<'a> {
    key: &'a str,
}

#[derive(Deref)]
pub struct Sys<'a> {
    #[deref]
    pub client: &'a Client,
}

impl Client {
    pub fn sys(&self) -> Sys {
        Sys { client: self }
    }
}

impl Sys<'_> {
    pub async fn seal_status(&self, ctx: &Context) -> Result<HttpResponse, AuError> {
        self.request(ctx, "seal-status", "GET", SEAL_STATUS_PATH, &[], None).await
    }

    /// Submits one decoded key share. The share travels hex encoded; every buffer holding it is wiped on drop.
    pub async fn unseal(&self, ctx: &Context, key: &[u8]) -> Result<HttpResponse, AuError> {
        let hex_key = Zeroizing::new(hex::encode(key));
        let body = Zeroizing::new(serde_json::to_vec(&UnsealRequest { key: hex_key.as_str() })?);

        self.request(ctx, "unseal-key-submit", "PUT", UNSEAL_PATH, &[], Some(body)).await
    }

    pub async fn health(&self, ctx: &Context) -> Result<HttpResponse, AuError> {
        self.request(ctx, "health-check", "GET", HEALTH_PATH, HEALTH_QUERY, None).await
    }

    pub async fn init_status(&self, ctx: &Context) -> Result<HttpResponse, AuError> {
        self.request(ctx, "init-status", "GET", INIT_PATH, &[], None).await
    }
}
