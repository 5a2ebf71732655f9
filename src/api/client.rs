use std::{
    sync::{Arc, PoisonError, RwLock, RwLockReadGuard},
    time::{Duration, Instant},
};

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use better_default::Default;
use serde::de::DeserializeOwned;
use serde_json::Value;
use ureq::AgentBuilder;
use zeroize::{Zeroize, Zeroizing};

use super::{
    tls::TLSConfigBuilder, HealthResponse, HttpResponse, InitStatus, SealApi, SealStatus,
};
use crate::{
    context::Context,
    errors::{AuError, AuthenticationError, ConnectionError, TimeoutError, ValidationError, VaultError},
    metrics::UnsealMetrics,
    unseal::UnsealStrategy,
    utils::generate_uuid,
    validator::{DefaultKeyValidator, KeyValidator, REDACTED},
};

pub const USER_AGENT: &str = concat!("vault-autounseal/", env!("CARGO_PKG_VERSION"));
pub const VAULT_TOKEN_HEADER: &str = "X-Vault-Token";
pub const MAX_URL_LENGTH: usize = 2048;
pub const MIN_TIMEOUT: Duration = Duration::from_millis(1);
pub const MAX_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
pub const MAX_IDLE_CONNECTIONS: usize = 20;
pub const MAX_IDLE_CONNECTIONS_PER_HOST: usize = 10;

#[derive(Default)]
pub struct ClientConfig {
    pub url: String,
    pub tls_skip_verify: bool,
    #[default(Duration::from_secs(30))]
    pub timeout: Duration,
    /// PEM bundle replacing the built-in web PKI roots.
    pub ca_cert_pem: Option<Vec<u8>>,
    pub token: Option<String>,
    pub validator: Option<Arc<dyn KeyValidator>>,
    pub strategy: Option<UnsealStrategy>,
    pub metrics: Option<Arc<dyn UnsealMetrics>>,
    #[default(3)]
    pub max_retries: i64,
    #[default(Duration::from_secs(1))]
    pub retry_delay: Duration,
}

impl ClientConfig {
    pub fn new(url: &str) -> Self {
        ClientConfig { url: url.to_string(), ..Default::default() }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.url.is_empty() {
            return Err(ValidationError::new("url", "", "url cannot be empty"));
        }
        if self.url.len() > MAX_URL_LENGTH {
            return Err(ValidationError::new(
                "url",
                format!("[{} chars]", self.url.len()),
                format!("url exceeds maximum length of {} characters", MAX_URL_LENGTH),
            ));
        }
        if !self.url.starts_with("http://") && !self.url.starts_with("https://") {
            return Err(ValidationError::new("url", &self.url, "url must use http:// or https:// scheme"));
        }
        if let Err(e) = url::Url::parse(&self.url) {
            return Err(ValidationError::new("url", &self.url, format!("url is malformed: {}", e)));
        }
        if self.timeout < MIN_TIMEOUT {
            return Err(ValidationError::new(
                "timeout",
                format!("{:?}", self.timeout),
                format!("timeout must be at least {:?}", MIN_TIMEOUT),
            ));
        }
        if self.max_retries < 0 {
            return Err(ValidationError::new(
                "max_retries",
                self.max_retries.to_string(),
                "max_retries cannot be negative",
            ));
        }
        Ok(())
    }
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("url", &self.url)
            .field("tls_skip_verify", &self.tls_skip_verify)
            .field("timeout", &self.timeout)
            .field("token", &self.token.as_ref().map(|_| REDACTED))
            .field("strategy", &self.strategy.as_ref().map(UnsealStrategy::name))
            .field("max_retries", &self.max_retries)
            .field("retry_delay", &self.retry_delay)
            .finish()
    }
}

struct ClientState {
    address: String,
    timeout: Duration,
    token: Zeroizing<String>,
    closed: bool,
}

/// Thread-safe handle to one Vault endpoint. Share it behind an `Arc`; every operation takes `&self`.
pub struct Client {
    state: RwLock<ClientState>,
    http_client: ureq::Agent,
    strategy: UnsealStrategy,
    metrics: Option<Arc<dyn UnsealMetrics>>,
    request_id: String,
}

impl Client {
    pub fn new(url: &str, tls_skip_verify: bool, timeout: Duration) -> Result<Self, AuError> {
        Self::with_config(ClientConfig { url: url.to_string(), tls_skip_verify, timeout, ..Default::default() })
    }

    pub fn with_config(config: ClientConfig) -> Result<Self, AuError> {
        config.validate()?;

        let tls_config = TLSConfigBuilder::new()
            .with_server_ca_pem(config.ca_cert_pem)
            .with_insecure(config.tls_skip_verify)
            .build()
            .map_err(|e| VaultError::new("tls-config", &config.url, e, false))?;

        let http_client = AgentBuilder::new()
            .timeout_connect(config.timeout.min(MAX_CONNECT_TIMEOUT))
            .timeout(config.timeout)
            .max_idle_connections(MAX_IDLE_CONNECTIONS)
            .max_idle_connections_per_host(MAX_IDLE_CONNECTIONS_PER_HOST)
            .user_agent(USER_AGENT)
            .tls_config(Arc::new(tls_config.client_config))
            .build();

        let validator = config.validator.unwrap_or_else(|| Arc::new(DefaultKeyValidator::new()));
        let strategy = match config.strategy {
            Some(strategy) => strategy,
            None => UnsealStrategy::default_for(
                validator,
                config.metrics.clone(),
                config.max_retries as usize,
                config.retry_delay,
            ),
        };

        let address = config.url.trim_end_matches('/').to_string();
        log::debug!("created vault client for {} using {} strategy", address, strategy.name());

        Ok(Client {
            state: RwLock::new(ClientState {
                address,
                timeout: config.timeout,
                token: Zeroizing::new(config.token.unwrap_or_default()),
                closed: false,
            }),
            http_client,
            strategy,
            metrics: config.metrics,
            request_id: format!("vault-autounseal-{}", generate_uuid()),
        })
    }

    fn read_state(&self) -> RwLockReadGuard<'_, ClientState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn ensure_open(&self) -> Result<(), AuError> {
        if self.read_state().closed {
            return Err(AuError::ErrClientClosed);
        }
        Ok(())
    }

    pub fn url(&self) -> String {
        self.read_state().address.clone()
    }

    pub fn timeout(&self) -> Duration {
        self.read_state().timeout
    }

    pub fn is_closed(&self) -> bool {
        self.read_state().closed
    }

    pub fn strategy(&self) -> &UnsealStrategy {
        &self.strategy
    }

    /// Marks the client closed and wipes its token. Safe to call more than once.
    pub fn close(&self) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if state.closed {
            return;
        }
        state.closed = true;
        state.token.zeroize();
        log::debug!("closed vault client for {}", state.address);
    }

    pub(crate) async fn request(
        &self,
        ctx: &Context,
        operation: &str,
        method: &str,
        path: &str,
        query: &[(&str, &str)],
        body: Option<Zeroizing<Vec<u8>>>,
    ) -> Result<HttpResponse, AuError> {
        let (url, timeout, token) = {
            let state = self.read_state();
            if state.closed {
                return Err(AuError::ErrClientClosed);
            }
            (format!("{}{}", state.address, path), state.timeout, state.token.clone())
        };
        log::debug!("request url: {}, method: {}", url, method);

        let agent = self.http_client.clone();
        let method = method.to_string();
        let query: Vec<(String, String)> = query.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        let request_id = self.request_id.clone();
        let started = Instant::now();

        // The blocking call is detached when the context ends first. `send` checks the context once more
        // right before the request goes out; a request already on the wire still reaches the server.
        let call_ctx = ctx.clone();
        let call_operation = operation.to_string();
        let call = tokio::task::spawn_blocking(move || {
            send(&call_ctx, &call_operation, &agent, &method, &url, &query, &request_id, &token, body)
        });

        let timed_out = || AuError::Timeout(TimeoutError { operation: operation.to_string(), timeout, elapsed: started.elapsed() });

        match ctx.run(call).await {
            Err(reason) => Err(AuError::interrupted(reason, operation, ctx.timeout().unwrap_or(timeout), started.elapsed())),
            Ok(Err(e)) => Err(AuError::ErrOther(anyhow::anyhow!("{} request aborted: {}", operation, e))),
            Ok(Ok(Err(AuError::Ureq { source }))) if is_io_timeout(source.as_ref()) => Err(timed_out()),
            Ok(Ok(Err(AuError::IO { source }))) if is_io_timeout(&source) => Err(timed_out()),
            Ok(Ok(Err(e @ AuError::Ureq { .. }))) => Err(ConnectionError::new(&self.url(), e, timeout, true).into()),
            Ok(Ok(result)) => result,
        }
    }

    /// Turns a non-2xx reply into an error. 401 and 403 become an [`AuthenticationError`].
    fn check_response(&self, resp: HttpResponse) -> Result<HttpResponse, AuError> {
        if resp.is_success() {
            return Ok(resp);
        }

        let cause = AuError::ResponseStatus { status: resp.response_status, errors: resp.errors() };
        if resp.response_status == 401 || resp.response_status == 403 {
            let method = if self.read_state().token.is_empty() { "none" } else { "token" };
            return Err(AuthenticationError { endpoint: self.url(), method: method.into(), cause: Box::new(cause) }.into());
        }
        Err(cause)
    }

    fn parse<T: DeserializeOwned>(&self, resp: HttpResponse) -> Result<T, AuError> {
        let resp = self.check_response(resp)?;
        Ok(serde_json::from_value(resp.response_data.unwrap_or(Value::Null))?)
    }

    /// Wraps a failure into a [`VaultError`] for `operation`. Caller cancellation and a closed client pass
    /// through unchanged.
    fn classify(&self, operation: &str, err: AuError, retryable: bool) -> AuError {
        match err {
            AuError::Cancelled { .. } | AuError::ErrClientClosed => err,
            _ => VaultError::new(operation, &self.url(), err, retryable).into(),
        }
    }

    pub async fn get_seal_status(&self, ctx: &Context) -> Result<SealStatus, AuError> {
        self.ensure_open()?;
        let started = Instant::now();

        let result = match self.sys().seal_status(ctx).await {
            Ok(resp) => self.parse::<SealStatus>(resp),
            Err(e) => Err(e),
        };

        if let Some(metrics) = &self.metrics {
            metrics.record_seal_status_check(&self.url(), result.is_ok(), started.elapsed());
        }
        result.map_err(|e| self.classify("get-seal-status", e, true))
    }

    pub async fn is_sealed(&self, ctx: &Context) -> Result<bool, AuError> {
        Ok(self.get_seal_status(ctx).await?.sealed)
    }

    /// Decodes and submits one key share. The decoded bytes are wiped before returning, whatever the outcome.
    pub async fn submit_single_key(&self, ctx: &Context, key: &str, key_index: usize) -> Result<SealStatus, AuError> {
        self.ensure_open()?;

        let mut decoded = match STANDARD.decode(key) {
            Ok(decoded) => Zeroizing::new(decoded),
            Err(e) => {
                let err = ValidationError::new("key", REDACTED, format!("invalid base64 encoding: {}", e));
                return Err(err.at_index(key_index).into());
            }
        };

        let result = self.sys().unseal(ctx, &decoded).await;
        decoded.zeroize();

        let result = match result {
            Ok(resp) => self.parse::<SealStatus>(resp),
            Err(e) => Err(e),
        };
        result.map_err(|e| {
            let retryable = matches!(e, AuError::Timeout(_));
            self.classify("submit-key", e, retryable)
        })
    }

    pub async fn is_initialized(&self, ctx: &Context) -> Result<bool, AuError> {
        self.ensure_open()?;

        let result = match self.sys().init_status(ctx).await {
            Ok(resp) => self.parse::<InitStatus>(resp),
            Err(e) => Err(e),
        };
        result.map(|init| init.initialized).map_err(|e| self.classify("is-initialized", e, true))
    }

    pub async fn health_check(&self, ctx: &Context) -> Result<HealthResponse, AuError> {
        self.ensure_open()?;
        let started = Instant::now();

        let result = match self.sys().health(ctx).await {
            Ok(resp) => self.parse::<HealthResponse>(resp),
            Err(e) => Err(e),
        };

        if let Some(metrics) = &self.metrics {
            metrics.record_health_check(&self.url(), result.is_ok(), started.elapsed());
        }
        result.map_err(|e| self.classify("health-check", e, true))
    }

    /// Brings the endpoint to the unsealed state with the configured strategy.
    pub async fn unseal(&self, ctx: &Context, keys: &[String], threshold: usize) -> Result<SealStatus, AuError> {
        self.ensure_open()?;
        self.strategy.unseal(ctx, self, keys, threshold).await
    }
}

#[async_trait]
impl SealApi for Client {
    fn address(&self) -> String {
        self.url()
    }

    async fn get_seal_status(&self, ctx: &Context) -> Result<SealStatus, AuError> {
        Client::get_seal_status(self, ctx).await
    }

    async fn submit_single_key(&self, ctx: &Context, key: &str, key_index: usize) -> Result<SealStatus, AuError> {
        Client::submit_single_key(self, ctx, key, key_index).await
    }
}

/// True when `err` or one of its sources is an I/O timeout, as raised by the agent's own timeouts.
fn is_io_timeout(err: &(dyn std::error::Error + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(e) = current {
        if let Some(io) = e.downcast_ref::<std::io::Error>() {
            if matches!(io.kind(), std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock) {
                return true;
            }
        }
        current = e.source();
    }
    false
}

#[allow(clippy::too_many_arguments)]
fn send(
    ctx: &Context,
    operation: &str,
    agent: &ureq::Agent,
    method: &str,
    url: &str,
    query: &[(String, String)],
    request_id: &str,
    token: &str,
    body: Option<Zeroizing<Vec<u8>>>,
) -> Result<HttpResponse, AuError> {
    let mut req = agent
        .request(method, url)
        .set("Accept", "application/json")
        .set("X-Content-Type-Options", "nosniff")
        .set("X-Frame-Options", "DENY")
        .set("X-Request-ID", request_id);

    for (key, value) in query {
        req = req.query(key, value);
    }
    if !token.is_empty() {
        req = req.set(VAULT_TOKEN_HEADER, token);
    }

    let mut ret = HttpResponse { method: method.to_string(), url: url.to_string(), ..Default::default() };

    if let Some(reason) = ctx.done() {
        return Err(AuError::interrupted(reason, operation, ctx.timeout().unwrap_or_default(), Duration::ZERO));
    }

    let response_result = match &body {
        Some(body) => req.set("Content-Type", "application/json").send_bytes(body),
        None => req.call(),
    };

    match response_result {
        Ok(response) => {
            ret.response_status = response.status();
            if ret.response_status == 204 {
                return Ok(ret);
            }
            let json: Value = response.into_json()?;
            ret.response_data = Some(json);
            Ok(ret)
        }
        Err(ureq::Error::Status(status, response)) => {
            ret.response_status = status;
            if let Ok(response_data) = response.into_json() {
                ret.response_data = Some(response_data);
            }
            Ok(ret)
        }
        Err(e) => {
            log::error!("Request failed: {}", e);
            Err(e.into())
        }
    }
}
