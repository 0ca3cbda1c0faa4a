use std::{
    env::current_dir,
    io::{self, Write},
};

use common::{config::Config, s3::ConfiguredClient};
use derive_more::{Display, Error, From};

use crate::{
    commands::{ConfigAction, Deploy, DeployCommands, DeployConfig, Status, Web},
    document::DocumentError,
    ledger::Ledger,
    process::SystemRunner,
    providers::{self, DeployContext, DeployError, DeployOutcome},
    settings::SettingsStore,
};

/// `deploy` subcommand errors.
#[derive(Debug, Display, From, Error)]
pub(crate) enum DeployCommandError {
    /// IO-related error.
    Io(io::Error),

    /// Web deployment error.
    Deploy(DeployError),

    /// Unable to read or write a persisted document.
    Document(DocumentError),
}

/// Deployment management entrypoint.
pub(crate) async fn deploy(
    Deploy { command }: Deploy,
    config: &Config,
) -> Result<(), DeployCommandError> {
    let mut out = io::stdout();
    let ledger = Ledger::new(
        config.deploy.ledger_file.clone(),
        config.deploy.history_limit,
    );

    match command {
        DeployCommands::Web(Web {
            provider,
            env,
            port,
        }) => {
            let root = current_dir()?;
            let runner = SystemRunner::new(config.deploy.probe_timeout());

            let context = DeployContext {
                config: &config.deploy,
                root: &root,
                runner: &runner,
                ledger: &ledger,
            };

            let storage = &config.storage;

            let outcome = providers::dispatch(
                provider,
                env,
                port,
                &context,
                move || ConfiguredClient::new(storage, &storage.region),
                &storage.region,
                &mut out,
            )
            .await?;

            if let DeployOutcome::Skipped { reason } = outcome {
                writeln!(out, "Deployment skipped: {reason}")?;
            }
        }
        DeployCommands::Config(DeployConfig { action, key, value }) => {
            let store = SettingsStore::new(config.deploy.config_file.clone());

            manage_config(&store, action, key, value, &mut out)?;
        }
        DeployCommands::Status(Status { provider }) => ledger.report(provider, &mut out)?,
    }

    Ok(())
}

/// Run a single `deploy config` action.
///
/// Missing flags are reported to the user without failing the command.
fn manage_config(
    store: &SettingsStore,
    action: ConfigAction,
    key: Option<String>,
    value: Option<String>,
    out: &mut impl Write,
) -> Result<(), DocumentError> {
    let key = key.filter(|key| !key.is_empty());
    let value = value.filter(|value| !value.is_empty());

    match action {
        ConfigAction::Show => {
            let settings = store.load()?;

            if settings.is_empty() {
                writeln!(out, "No deployment configuration found.")?;
            } else {
                writeln!(out, "Deployment Configuration:")?;
                writeln!(out, "{}", serde_json::to_string_pretty(&settings)?)?;
            }
        }
        ConfigAction::Get => {
            let Some(key) = key else {
                writeln!(out, "Error: --key is required for get action")?;
                return Ok(());
            };

            match store.get(&key)? {
                Some(value) => writeln!(out, "{key}: {value}")?,
                None => writeln!(out, "Key '{key}' not found in configuration")?,
            }
        }
        ConfigAction::Set => {
            let (Some(key), Some(value)) = (key, value) else {
                writeln!(out, "Error: --key and --value are required for set action")?;
                return Ok(());
            };

            store.set(&key, &value)?;
            writeln!(out, "Set {key} = {value}")?;
        }
    }

    Ok(())
}
