use clap::Parser;
use vault_autounseal::cli::Cli;

fn main() -> std::process::ExitCode {
    let mut cli = Cli::parse();
    cli.run().into()
}
