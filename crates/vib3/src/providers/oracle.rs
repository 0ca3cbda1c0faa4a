use std::io::Write;

use tracing::instrument;

use super::{DeployContext, DeployError, DeployOutcome, Environment};
use crate::process::ProcessRunner;

/// Oracle Cloud CLI installation guide.
const OCI_INSTALL_URL: &str = "https://docs.oracle.com/en-us/iaas/Content/API/SDKDocs/cliinstall.htm";

/// Guide the user through a manual Oracle Cloud deployment.
///
/// Nothing is provisioned, the installed CLI is only inspected.
#[instrument(skip(context, out), err)]
pub(super) async fn deploy<R: ProcessRunner>(
    context: &DeployContext<'_, R>,
    environment: Environment,
    out: &mut impl Write,
) -> Result<DeployOutcome, DeployError> {
    writeln!(out, "Deploying to Oracle Cloud ({environment})...")?;

    let cli = context
        .runner
        .probe(&context.config.oci_cli, &["--version"])
        .await?;

    if !cli.is_available() {
        writeln!(out, "OCI CLI not found. Please install Oracle Cloud CLI.")?;
        writeln!(out, "Visit: {OCI_INSTALL_URL}")?;

        return Ok(DeployOutcome::Skipped {
            reason: String::from("OCI CLI is not installed"),
        });
    }

    let assets_dir = context.config.assets_dir.display();

    writeln!(
        out,
        "Oracle Cloud deployment requires additional configuration."
    )?;
    writeln!(out, "Please ensure you have:")?;
    writeln!(out, "1. OCI CLI configured with your credentials")?;
    writeln!(out, "2. A compute instance or container registry set up")?;
    writeln!(out, "3. Appropriate security lists and networking configured")?;

    writeln!(out, "\nTo deploy manually:")?;
    writeln!(out, "1. Create an Object Storage bucket")?;
    writeln!(out, "2. Upload the {assets_dir}/ directory contents")?;
    writeln!(out, "3. Configure the bucket for static website hosting")?;
    writeln!(
        out,
        "4. Or deploy to a compute instance with the {} server",
        context.config.runtime
    )?;

    Ok(DeployOutcome::Skipped {
        reason: String::from("Oracle Cloud deployment has to be completed manually"),
    })
}
