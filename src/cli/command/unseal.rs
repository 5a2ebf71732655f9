use std::{sync::Arc, time::Duration};

use clap::{ArgAction, Parser};
use derive_more::Deref;
use zeroize::Zeroize;

use crate::{
    api::Client,
    cli::command::{self, CommandExecutor},
    errors::AuError,
    validator::{DefaultKeyValidator, KeyValidator, StrictKeyValidator},
};

#[derive(Parser, Deref)]
#[command(
    author,
    version,
    about = r#"Unseals a Vault server with the given key shares. Keys are validated before anything is
sent, submitted one at a time, and submission stops as soon as the server reports unsealed.

Unseal with three shares read from the environment:

  $ VAULT_UNSEAL_KEYS=key1,key2,key3 vault-autounseal unseal --address=https://vault:8200"#
)]
pub struct Unseal {
    #[arg(
        long = "key",
        next_line_help = true,
        value_name = "base64",
        env = "VAULT_UNSEAL_KEYS",
        value_delimiter = ',',
        hide_env_values = true,
        action = ArgAction::Append,
        long_help = r#"Base64 encoded unseal key share. This can be specified multiple times, or via
the VAULT_UNSEAL_KEYS environment variable as a comma separated list."#
    )]
    keys: Vec<String>,

    #[arg(long, next_line_help = true, value_name = "int", default_value_t = 3, help = "Number of key shares required to unseal.")]
    threshold: usize,

    #[arg(
        long,
        next_line_help = true,
        value_name = "int",
        default_value_t = 3,
        allow_negative_numbers = true,
        help = "Maximum number of unseal attempts. 0 or 1 disables retrying."
    )]
    max_retries: i64,

    #[arg(
        long,
        next_line_help = true,
        value_name = "duration",
        default_value = "1s",
        value_parser = humantime::parse_duration,
        help = "Base delay of the exponential backoff between attempts."
    )]
    retry_delay: Duration,

    #[arg(
        long,
        next_line_help = true,
        value_name = "int",
        long_help = r#"Validate keys strictly: every key must decode to exactly this many bytes and may
not contain well-known placeholder words."#
    )]
    strict_key_length: Option<usize>,

    #[deref]
    #[command(flatten, next_help_heading = "HTTP Options")]
    http_options: command::HttpOptions,

    #[command(flatten, next_help_heading = "Output Options")]
    output: command::OutputOptions,
}

impl Drop for Unseal {
    fn drop(&mut self) {
        self.keys.zeroize();
    }
}

impl Unseal {
    fn validator(&self) -> Arc<dyn KeyValidator> {
        match self.strict_key_length {
            Some(len) => Arc::new(StrictKeyValidator::new(len)),
            None => Arc::new(DefaultKeyValidator::new()),
        }
    }
}

impl CommandExecutor for Unseal {
    fn main(&self) -> Result<(), AuError> {
        let mut config = self.client_config()?;
        config.validator = Some(self.validator());
        config.max_retries = self.max_retries;
        config.retry_delay = self.retry_delay;

        let client = Client::with_config(config)?;
        let keys = &self.keys;
        let threshold = self.threshold;

        let status = command::block_on(|ctx| async move {
            let ret = client.unseal(&ctx, keys, threshold).await;
            client.close();
            ret
        })?;

        if status.sealed {
            log::warn!("vault at {} is still sealed, progress {}/{}", self.address, status.progress, status.threshold);
        }
        self.output.print_value(&serde_json::to_value(&status)?)
    }
}

#[cfg(test)]
mod test {
    use clap::Parser;

    use super::*;

    #[test]
    fn test_unseal_args() {
        let cmd = Unseal::try_parse_from([
            "unseal",
            "--address=http://127.0.0.1:8200",
            "--key=AQIDBA==",
            "--key=BQYHCA==,CQoLDA==",
            "--threshold=2",
            "--max-retries=5",
            "--retry-delay=250ms",
            "--strict-key-length=4",
        ])
        .unwrap();

        assert_eq!(cmd.keys, vec!["AQIDBA==", "BQYHCA==", "CQoLDA=="]);
        assert_eq!(cmd.threshold, 2);
        assert_eq!(cmd.max_retries, 5);
        assert_eq!(cmd.retry_delay, Duration::from_millis(250));
        assert!(cmd.validator().validate_keys(&cmd.keys, 2).is_ok());
    }

    #[test]
    fn test_unseal_rejects_invalid_keys_before_connecting() {
        // nothing listens on port 9, the key is refused before any request is made
        let cmd = Unseal::try_parse_from(["unseal", "--address=http://127.0.0.1:9", "--key=not-base64!@#", "--threshold=1"])
            .unwrap();
        let err = cmd.main().unwrap_err();
        assert!(err.is_validation_error());
        assert_eq!(command::exit_code(&err), sysexits::ExitCode::DataErr);
    }
}
