use std::io::Write;

use tracing::{debug, info, instrument};

use super::{DeployContext, DeployError, DeployOutcome};
use crate::process::{Invocation, Probe, ProcessRunner};

/// Start the project server in the foreground.
///
/// Dependencies are installed first if the project declares them
/// and they were never installed before.
#[instrument(skip(context, out), err)]
pub(super) async fn deploy<R: ProcessRunner>(
    context: &DeployContext<'_, R>,
    port: u16,
    out: &mut impl Write,
) -> Result<DeployOutcome, DeployError> {
    let config = context.config;

    if !context.root.join(&config.server_entry).is_file() {
        return Err(DeployError::MissingFile(config.server_entry.clone()));
    }

    match context.runner.probe(&config.runtime, &["--version"]).await? {
        Probe::Available { stdout } => debug!(version = stdout.trim(), "runtime found"),
        Probe::Failed { stderr } => {
            debug!(stderr = stderr.trim(), "runtime probe failed");

            return Err(DeployError::RuntimeUnavailable {
                runtime: config.runtime.clone(),
            });
        }
        Probe::Missing => {
            return Err(DeployError::RuntimeUnavailable {
                runtime: config.runtime.clone(),
            })
        }
    }

    writeln!(out, "Starting local server on port {port}...")?;

    if context.root.join(&config.package_manifest).is_file()
        && !context.root.join(&config.dependencies_dir).exists()
    {
        writeln!(out, "Installing dependencies...")?;
        out.flush()?;

        let install = Invocation::new(config.package_manager.as_str())
            .arg("install")
            .current_dir(context.root);

        if !context.runner.run(&install).await?.success() {
            return Err(DeployError::DependencyInstall {
                package_manager: config.package_manager.clone(),
            });
        }
    }

    writeln!(out, "Server starting at http://localhost:{port}")?;
    writeln!(out, "Press Ctrl+C to stop the server")?;
    out.flush()?;

    let server = Invocation::new(config.runtime.as_str())
        .arg(config.server_entry.to_string_lossy())
        .env("PORT", port.to_string())
        .current_dir(context.root);

    let completion = context.runner.run(&server).await?;

    if completion.interrupted() {
        info!(status = completion.describe(), "server interrupted");
    } else if !completion.success() {
        return Err(DeployError::ServerFailed {
            status: completion.describe(),
        });
    }

    Ok(DeployOutcome::Served)
}
