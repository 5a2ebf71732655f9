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
    about = r#"Prints the seal status of a Vault server: whether it is sealed, the unseal progress
and the number of key shares required to unseal it."#
)]
pub struct Status {
    #[deref]
    #[command(flatten, next_help_heading = "HTTP Options")]
    http_options: command::HttpOptions,

    #[command(flatten, next_help_heading = "Output Options")]
    output: command::OutputOptions,
}

impl CommandExecutor for Status {
    fn main(&self) -> Result<(), AuError> {
        let client = self.client()?;
        let status = command::block_on(|ctx| async move { client.get_seal_status(&ctx).await })?;
        self.output.print_value(&serde_json::to_value(&status)?)
    }
}
