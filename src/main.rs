//! Spark Vault command-line client.

use clap::Parser;
use sparkvault::VaultError;

mod cli;
mod commands;
mod logging;

use crate::cli::Cli;
use crate::logging::init_logging;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbosity.tracing_level_filter(), cli.verbosity.is_present());

    let exit_code = match commands::run(&cli).await {
        Ok(()) => 0,
        Err(error) => {
            eprintln!("error: {}", describe(&error));
            1
        }
    };
    std::process::exit(exit_code);
}

/// Prefer the user-facing message of library errors.
fn describe(error: &anyhow::Error) -> String {
    match error.downcast_ref::<VaultError>() {
        Some(VaultError::PartialMigration { .. }) => format!("{:#}", error),
        Some(vault) => vault.user_message(),
        None => format!("{:#}", error),
    }
}
