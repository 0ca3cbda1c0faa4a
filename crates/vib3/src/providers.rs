//! # Deployment providers
//!
//! Each `deploy web` invocation is a fresh one-shot execution: the dispatcher
//! selects a provider strategy, runs its preflight checks and side effects,
//! and records successful deployments in the [`Ledger`].
//!
//! Nothing is rolled back on failure. In particular, a failed AWS step after
//! the bucket creation leaves the created bucket behind.

/// Object storage static website provider.
mod aws;

/// DigitalOcean App Platform guided setup.
mod digitalocean;

/// Local server provider.
mod local;

/// Oracle Cloud guided setup.
mod oracle;

use std::{
    fmt,
    future::Future,
    io,
    io::Write,
    path::{Path, PathBuf, StripPrefixError},
};

use clap::ValueEnum;
use common::{
    config,
    storage::{ObjectStore, StorageError},
};
use derive_more::{Display, Error, From};
use indicatif::ProgressBar;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::{
    document::DocumentError,
    ledger::{DeploymentRecord, Ledger},
    process::{ProcessError, ProcessRunner},
};

/// Supported deployment providers.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub(crate) enum Provider {
    /// AWS S3 static website hosting.
    Aws,

    /// Oracle Cloud.
    Oracle,

    /// DigitalOcean App Platform.
    #[value(name = "digitalocean")]
    DigitalOcean,

    /// Local server process.
    Local,
}

impl Provider {
    /// Provider name, as accepted on the command line.
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Provider::Aws => "aws",
            Provider::Oracle => "oracle",
            Provider::DigitalOcean => "digitalocean",
            Provider::Local => "local",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Deployment environments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub(crate) enum Environment {
    /// Development environment.
    Dev,

    /// Staging environment.
    Staging,

    /// Production environment.
    Prod,
}

impl Environment {
    /// Environment name, as accepted on the command line.
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Environment::Dev => "dev",
            Environment::Staging => "staging",
            Environment::Prod => "prod",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a single provider execution.
#[derive(Debug)]
pub(crate) enum DeployOutcome {
    /// Resources were provisioned and the deployment was recorded.
    Deployed(DeploymentRecord),

    /// Local server ran until it exited.
    Served,

    /// Nothing was provisioned, the user was guided through a manual setup instead.
    Skipped {
        /// Why the provider didn't deploy anything.
        reason: String,
    },
}

/// Shared state available to every provider.
pub(crate) struct DeployContext<'a, R> {
    /// Deployment configuration.
    pub config: &'a config::Deploy,

    /// Project root, against which all configured paths are resolved.
    pub root: &'a Path,

    /// External process runner.
    pub runner: &'a R,

    /// Deployment history.
    pub ledger: &'a Ledger,
}

/// `deploy web` errors.
#[derive(Debug, Display, From, Error)]
pub(crate) enum DeployError {
    /// IO-related error.
    Io(io::Error),

    /// External process error.
    Process(ProcessError),

    /// Unable to update the deployment history.
    #[display(fmt = "unable to record deployment: {}", _0)]
    Ledger(DocumentError),

    /// Object storage error.
    #[display(fmt = "AWS deployment failed: {}", _0)]
    Storage(StorageError),

    /// Unable to serialize an application manifest.
    #[display(fmt = "unable to write application manifest: {}", _0)]
    Manifest(serde_yaml::Error),

    /// Unable to traverse the assets directory.
    #[display(fmt = "unable to read assets: {}", _0)]
    WalkDir(walkdir::Error),

    /// Unable to strip assets directory prefix from path.
    StripPrefix(StripPrefixError),

    /// Required project file is missing.
    #[display(fmt = "{} not found in current directory", "_0.display()")]
    #[from(ignore)]
    MissingFile(#[error(ignore)] PathBuf),

    /// Runtime used to start the server is missing.
    #[display(fmt = "{} runtime is not installed", runtime)]
    #[from(ignore)]
    RuntimeUnavailable {
        /// Runtime binary name.
        runtime: String,
    },

    /// Provider CLI is missing.
    #[display(fmt = "{} is not installed", tool)]
    #[from(ignore)]
    ToolUnavailable {
        /// Human-readable tool name.
        tool: String,
    },

    /// Static assets directory is missing.
    #[display(fmt = "{} directory not found", "_0.display()")]
    #[from(ignore)]
    MissingAssets(#[error(ignore)] PathBuf),

    /// Dependency installation exited unsuccessfully.
    #[display(fmt = "unable to install dependencies with {}", package_manager)]
    #[from(ignore)]
    DependencyInstall {
        /// Package manager binary name.
        package_manager: String,
    },

    /// Local server exited unsuccessfully.
    #[display(fmt = "server exited with {}", status)]
    #[from(ignore)]
    ServerFailed {
        /// Exit status description.
        status: String,
    },
}

/// Deploy to the selected `provider`.
///
/// Object storage client is only created with `connect` for providers that need one,
/// bound to the provided `region`.
#[instrument(skip(context, connect, out), err)]
pub(crate) async fn dispatch<R, S, C, F>(
    provider: Provider,
    environment: Environment,
    port: u16,
    context: &DeployContext<'_, R>,
    connect: C,
    region: &str,
    out: &mut impl Write,
) -> Result<DeployOutcome, DeployError>
where
    R: ProcessRunner,
    S: ObjectStore,
    C: FnOnce() -> F,
    F: Future<Output = S>,
{
    writeln!(
        out,
        "Deploying web application to {provider} ({environment} environment)..."
    )?;

    let outcome = match provider {
        Provider::Local => local::deploy(context, port, out).await?,
        Provider::Aws => {
            let store = connect().await;
            let progress = ProgressBar::new(0);

            aws::deploy(context, &store, region, environment, &progress, out).await?
        }
        Provider::Oracle => oracle::deploy(context, environment, out).await?,
        Provider::DigitalOcean => digitalocean::deploy(context, environment, out).await?,
    };

    if let DeployOutcome::Deployed(record) = &outcome {
        context.ledger.append(record.clone())?;
        info!(%provider, %environment, "deployment recorded");
    }

    Ok(outcome)
}
