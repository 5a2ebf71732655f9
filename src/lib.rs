//! This crate is the 'library' part of vault-autounseal, which keeps HashiCorp Vault servers unsealed.
//!
//! A sealed Vault serves nothing until a threshold number of Shamir key shares has been submitted. This
//! crate takes a list of base64 encoded shares and a threshold and brings a Vault endpoint to the unsealed
//! state:
//!
//! 1. the [`validator`] rejects malformed, degenerate and duplicate shares before any network call;
//! 2. an [`unseal`] strategy reads the seal status and submits shares one at a time until Vault reports
//!    unsealed, optionally wrapped in retry with exponential backoff, or fanned out over many endpoints;
//! 3. the [`api`] client talks to the Vault system endpoints and classifies every failure into the
//!    [`errors`] taxonomy, which tells the retry layer what is worth trying again.
//!
//! Every network operation takes a [`context::Context`] so callers can cancel or bound it in time.
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use vault_autounseal::{api::Client, context::Context};
//!
//! # async fn unseal(keys: Vec<String>) -> Result<(), vault_autounseal::errors::AuError> {
//! let client = Client::new("https://vault.example.com:8200", false, Duration::from_secs(30))?;
//! let ctx = Context::new().with_timeout(Duration::from_secs(120));
//! let status = client.unseal(&ctx, &keys, 3).await?;
//! assert!(!status.sealed);
//! # Ok(())
//! # }
//! ```
//!
//! The same machinery is available from the command line through the `vault-autounseal` binary, see
//! [`cli`].

pub mod api;
pub mod cli;
pub mod context;
pub mod errors;
pub mod metrics;
pub mod unseal;
pub mod utils;
pub mod validator;

#[cfg(test)]
pub mod test_utils;

/// Exit ok
pub const EXIT_CODE_OK: sysexits::ExitCode = sysexits::ExitCode::Ok;
/// Exit code when loading configuration from file fails
pub const EXIT_CODE_LOAD_CONFIG_FAILURE: sysexits::ExitCode = sysexits::ExitCode::Config;
/// Exit code when insufficient params are passed via CLI
pub const EXIT_CODE_INSUFFICIENT_PARAMS: sysexits::ExitCode = sysexits::ExitCode::Usage;

/// Build timestamp in UTC
pub const BUILD_TIME: &str = build_time::build_time_utc!();

/// vault_autounseal version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
