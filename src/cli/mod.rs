//! The `vault_autounseal::cli` module is used to serve the vault-autounseal application.
//! This module accepts options from the command line and runs one of the unseal commands.

use clap::{Parser, Subcommand};
use sysexits::ExitCode;

use crate::{cli::command::CommandExecutor, EXIT_CODE_INSUFFICIENT_PARAMS, VERSION};

pub mod command;
pub mod config;

#[derive(Parser)]
#[command(
    name = "vault-autounseal",
    version = VERSION,
    disable_help_subcommand = true,
    about = "Keeps Vault servers unsealed by submitting validated key shares with retry and backoff."
)]
pub struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    Status(command::status::Status),
    Health(command::health::Health),
    Unseal(command::unseal::Unseal),
    Run(command::run::Run),
}

impl Commands {
    pub fn execute(&mut self) -> ExitCode {
        match self {
            Commands::Status(status) => status.execute(),
            Commands::Health(health) => health.execute(),
            Commands::Unseal(unseal) => unseal.execute(),
            Commands::Run(run) => run.execute(),
        }
    }
}

impl Cli {
    /// Do real jobs.
    #[inline]
    pub fn run(&mut self) -> ExitCode {
        if let Some(ref mut cmd) = &mut self.command {
            return cmd.execute();
        }

        EXIT_CODE_INSUFFICIENT_PARAMS
    }
}

#[cfg(test)]
mod test {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();

        let mut cli = Cli::try_parse_from(["vault-autounseal"]).unwrap();
        assert_eq!(cli.run(), EXIT_CODE_INSUFFICIENT_PARAMS);

        assert!(Cli::try_parse_from(["vault-autounseal", "run", "--config=/etc/autounseal.hcl", "--watch"]).is_ok());
        assert!(Cli::try_parse_from(["vault-autounseal", "run"]).is_err());
        assert!(Cli::try_parse_from(["vault-autounseal", "status", "--format=json"]).is_ok());
        assert!(Cli::try_parse_from(["vault-autounseal", "health", "--format=xml"]).is_err());
    }
}
