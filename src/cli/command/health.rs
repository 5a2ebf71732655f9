use clap::Parser;
use derive_more::Deref;

use crate::{
    cli::command::{self, CommandExecutor},
    errors::AuError,
};

#[derive(Parser, Deref)]
#[command(
    author,
    version,
    about = r#"Prints the health of a Vault server. Sealed, standby and uninitialized servers are
reported as such instead of failing the command."#
)]
pub struct Health {
    #[deref]
    #[command(flatten, next_help_heading = "HTTP Options")]
    http_options: command::HttpOptions,

    #[command(flatten, next_help_heading = "Output Options")]
    output: command::OutputOptions,
}

impl CommandExecutor for Health {
    fn main(&self) -> Result<(), AuError> {
        let client = self.client()?;
        let health = command::block_on(|ctx| async move { client.health_check(&ctx).await })?;
        self.output.print_value(&serde_json::to_value(&health)?)
    }
}
