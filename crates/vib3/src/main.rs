//! # VIB3 command line interface
//!
//! Transfers single files to and from an S3-compatible object storage
//! and orchestrates one-shot static site deployments.
//!
//! # Deployment providers
//!
//! `deploy web` dispatches to one of the [`providers`]:
//!
//! - `local` starts the project server as a foreground child process.
//! - `aws` provisions a public S3 bucket configured for static website hosting
//!   and uploads the assets directory into it.
//! - `oracle` and `digitalocean` only inspect the installed tooling and guide the user
//!   through a manual setup, optionally generating an application manifest.
//!
//! Successful deployments are recorded in the [`ledger`], while `deploy config`
//! manages a small key/value document, see [`settings`].
//!
//! # Persisted state
//!
//! Both the ledger and the settings documents live in the working directory
//! and are updated with a read-modify-write cycle. Writes are atomic, but concurrent
//! invocations against the same directory may lose updates.

#![deny(missing_docs)]
#![deny(clippy::missing_docs_in_private_items)]

use std::process::ExitCode;

use clap::Parser;
use commands::{Cli, Commands};
use common::{config::Config, logging};
use tracing::{error, info};
use transfer::TransferError;

/// CLI subcommands.
mod commands;

/// Atomic JSON document persistence.
mod document;

/// Deployment history.
mod ledger;

/// Application manifests handed off to provider CLIs.
mod manifest;

/// External process execution.
mod process;

/// Interactive confirmations.
mod prompt;

/// Deployment providers and their dispatcher.
mod providers;

/// Deployment key/value configuration.
mod settings;

/// Single file transfers with progress reporting.
mod transfer;

/// In-memory doubles of external collaborators.
#[cfg(test)]
mod testing;

/// Exit code reported when the user interrupts the command.
const INTERRUPTED: u8 = 130;

/// CLI entrypoint.
#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(error) => {
            let _ = error.print();

            return if error.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    tokio::select! {
        result = run(cli) => match result {
            Ok(()) => ExitCode::SUCCESS,
            Err(err) if cancelled(&err) => interrupted(),
            Err(err) => {
                error!(error = %err, "command failed");
                eprintln!("Error: {err}");
                ExitCode::FAILURE
            }
        },
        Ok(()) = tokio::signal::ctrl_c() => interrupted(),
    }
}

/// Report a user interrupt.
fn interrupted() -> ExitCode {
    println!("\nOperation cancelled by user");
    ExitCode::from(INTERRUPTED)
}

/// Check if the command failed because the user interrupted an interactive prompt.
fn cancelled(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<TransferError>(),
        Some(TransferError::Interrupted)
    )
}

/// Load configuration and run the selected subcommand.
async fn run(cli: Cli) -> Result<(), anyhow::Error> {
    let config = Config::new(cli.config_file)?;

    logging::init(&config);
    info!("configuration loaded");

    match cli.command {
        Commands::Upload(args) => commands::upload(args, &config).await?,
        Commands::Download(args) => commands::download(args, &config).await?,
        Commands::Deploy(args) => commands::deploy(args, &config).await?,
    }

    Ok(())
}
