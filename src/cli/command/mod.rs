//! This module provides the commands of the vault-autounseal application: one-off `status`, `health` and
//! `unseal` calls against a single Vault address, and `run`, which keeps every configured instance unsealed.

use std::{fs, future::Future, path::PathBuf, time::Duration};

use clap::{Args, ValueEnum, ValueHint};
use sysexits::ExitCode;

use crate::{
    api::{Client, ClientConfig},
    context::Context,
    errors::AuError,
    EXIT_CODE_LOAD_CONFIG_FAILURE, EXIT_CODE_OK,
};

pub mod format;
pub mod health;
pub mod run;
pub mod status;
pub mod unseal;

pub use format::{Format, OutputOptions};

pub trait CommandExecutor {
    #[inline]
    fn execute(&mut self) -> ExitCode {
        match self.main() {
            Ok(_) => EXIT_CODE_OK,
            Err(e) => {
                eprintln!("Error: {}", e);
                exit_code(&e)
            }
        }
    }

    fn main(&self) -> Result<(), AuError>;
}

/// Maps a failure to the `sysexits` code an operator script can act on.
pub fn exit_code(err: &AuError) -> ExitCode {
    match err {
        AuError::Validation(_) => ExitCode::DataErr,
        AuError::Context { source, .. } | AuError::AttemptsFailed { source, .. } => exit_code(source),
        AuError::Unseal(e) => exit_code(&e.cause),
        AuError::Authentication(_) => ExitCode::NoPerm,
        AuError::Vault(e) => match e.cause.as_ref() {
            AuError::Authentication(_) => ExitCode::NoPerm,
            _ => ExitCode::Unavailable,
        },
        AuError::Connection(_) | AuError::ResponseStatus { .. } => ExitCode::Unavailable,
        AuError::Timeout(_) => ExitCode::TempFail,
        AuError::Cancelled { .. } => ExitCode::TempFail,
        AuError::ErrConfigPathInvalid
        | AuError::ErrConfigLoadFailed
        | AuError::ErrConfigInstanceNotFound
        | AuError::ErrConfigInstanceInvalid(..)
        | AuError::Hcl { .. }
        | AuError::Serde { .. } => EXIT_CODE_LOAD_CONFIG_FAILURE,
        AuError::IO { .. } => ExitCode::IoErr,
        _ => ExitCode::Software,
    }
}

#[derive(Args)]
#[group(required = false, multiple = true)]
pub struct HttpOptions {
    #[arg(
        long,
        next_line_help = true,
        value_name = "string",
        env = "VAULT_ADDR",
        default_value = "https://127.0.0.1:8200",
        long_help = r#"Address of the Vault server. This can also be specified via the VAULT_ADDR
environment variable."#
    )]
    pub address: String,

    #[arg(
        long,
        next_line_help = true,
        value_name = "string",
        value_hint = ValueHint::FilePath,
        env = "VAULT_CACERT",
        long_help = r#"Path on the local disk to a single PEM-encoded CA certificate to verify
the Vault server's SSL certificate. This can also be specified via the
VAULT_CACERT environment variable."#
    )]
    pub ca_cert: Option<PathBuf>,

    #[arg(
        long,
        next_line_help = true,
        env = "VAULT_SKIP_VERIFY",
        long_help = r#"Disable verification of TLS certificates. Using this option is highly
discouraged as it decreases the security of data transmissions to and
from the Vault server. The default is false. This can also be specified
via the VAULT_SKIP_VERIFY environment variable."#
    )]
    pub tls_skip_verify: bool,

    #[arg(
        long,
        next_line_help = true,
        value_name = "duration",
        default_value = "30s",
        value_parser = humantime::parse_duration,
        long_help = "Total timeout of every request sent to the Vault server, e.g. \"30s\" or \"500ms\"."
    )]
    pub timeout: Duration,

    #[arg(hide = true, required = false, env = "VAULT_TOKEN", default_value = "")]
    pub token: String,
}

impl HttpOptions {
    pub fn client_config(&self) -> Result<ClientConfig, AuError> {
        let ca_cert_pem = match &self.ca_cert {
            Some(path) => Some(fs::read(path)?),
            None => None,
        };
        let token = if self.token.is_empty() { None } else { Some(self.token.clone()) };

        Ok(ClientConfig {
            url: self.address.clone(),
            tls_skip_verify: self.tls_skip_verify,
            timeout: self.timeout,
            ca_cert_pem,
            token,
            ..ClientConfig::default()
        })
    }

    pub fn client(&self) -> Result<Client, AuError> {
        Client::with_config(self.client_config()?)
    }
}

#[derive(Args)]
#[group(required = false, multiple = true)]
pub struct CommandOptions {
    #[arg(
        long,
        next_line_help = true,
        value_name = "string",
        num_args = 0..=1,
        env = "VAULT_LOG_LEVEL",
        default_value_t = LogLevel::Warn,
        default_missing_value = "error",
        long_help = "Log verbosity level. This can also be specified via the VAULT_LOG_LEVEL environment variable.",
        value_enum
    )]
    pub log_level: LogLevel,
}

#[derive(ValueEnum, Copy, Clone, Debug, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Initializes `env_logger` with a filter such as `"info"` or `"vault_autounseal=debug"`.
pub fn init_logger(filters: &str) {
    let _ = env_logger::Builder::new().parse_filters(filters).format_timestamp_millis().try_init();
}

/// Runs `f` to completion on a fresh tokio runtime. The context handed to `f` is cancelled on Ctrl-C.
pub fn block_on<F, Fut, T>(f: F) -> Result<T, AuError>
where
    F: FnOnce(Context) -> Fut,
    Fut: Future<Output = Result<T, AuError>>,
{
    let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;

    runtime.block_on(async {
        let ctx = Context::new();
        let canceller = ctx.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                log::warn!("interrupt received, cancelling");
                canceller.cancel();
            }
        });

        f(ctx).await
    })
}
