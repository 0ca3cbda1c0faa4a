/// `deploy` subcommand.
mod deploy;

/// `download` subcommand.
mod download;

/// `upload` subcommand.
mod upload;

pub(crate) use deploy::deploy;
pub(crate) use download::download;
pub(crate) use upload::upload;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::providers::{Environment, Provider};

/// Port used by the local server when none was provided.
const DEFAULT_PORT: u16 = 3000;

/// CLI configuration.
#[derive(Parser)]
#[command(name = "vib3", version, about = "VIB3 Command Line Interface")]
pub(crate) struct Cli {
    /// Configuration file path.
    #[arg(short, long, global = true)]
    pub config_file: Option<PathBuf>,

    /// Selected subcommand.
    #[command(subcommand)]
    pub command: Commands,
}

/// Supported subcommands.
#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Upload a file to an S3 bucket.
    Upload(Upload),

    /// Download a file from an S3 bucket.
    Download(Download),

    /// Deploy the web application and manage deployments.
    Deploy(Deploy),
}

/// `upload` subcommand configuration.
#[derive(Args)]
pub struct Upload {
    /// Path to the file to upload.
    file: PathBuf,

    /// Destination bucket name.
    bucket: String,

    /// Object key, defaults to the file name.
    #[arg(short, long)]
    key: Option<String>,

    /// Storage region, defaults to the configured region.
    #[arg(short, long)]
    region: Option<String>,
}

/// `download` subcommand configuration.
#[derive(Args)]
pub struct Download {
    /// Source bucket name.
    bucket: String,

    /// Object key (file path inside of the bucket).
    key: String,

    /// Output file path, defaults to the key's base name.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Storage region, defaults to the configured region.
    #[arg(short, long)]
    region: Option<String>,
}

/// `deploy` subcommand configuration.
#[derive(Args)]
pub struct Deploy {
    /// Selected deployment subcommand.
    #[command(subcommand)]
    command: DeployCommands,
}

/// Supported deployment subcommands.
#[derive(Subcommand)]
pub(crate) enum DeployCommands {
    /// Deploy the web application to a provider.
    Web(Web),

    /// Manage deployment configuration.
    Config(DeployConfig),

    /// Show recorded deployments.
    Status(Status),
}

/// `deploy web` subcommand configuration.
#[derive(Args)]
pub struct Web {
    /// Provider to deploy to.
    #[arg(value_enum)]
    provider: Provider,

    /// Target environment.
    #[arg(short, long, value_enum, default_value_t = Environment::Dev)]
    env: Environment,

    /// Port of the local server.
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,
}

/// `deploy config` subcommand configuration.
#[derive(Args)]
pub struct DeployConfig {
    /// Configuration action.
    #[arg(value_enum)]
    action: ConfigAction,

    /// Configuration key, required by `get` and `set`.
    #[arg(short, long)]
    key: Option<String>,

    /// Configuration value, required by `set`.
    #[arg(short, long)]
    value: Option<String>,
}

/// Actions supported by `deploy config`.
#[derive(Clone, Copy, ValueEnum)]
pub(crate) enum ConfigAction {
    /// Print the whole configuration document.
    Show,

    /// Print a single value.
    Get,

    /// Insert or replace a single value.
    Set,
}

/// `deploy status` subcommand configuration.
#[derive(Args)]
pub struct Status {
    /// Only show deployments of this provider.
    #[arg(short, long, value_enum)]
    provider: Option<Provider>,
}
