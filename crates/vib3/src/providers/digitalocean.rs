use std::{fs, io::Write};

use tracing::{info, instrument};

use super::{DeployContext, DeployError, DeployOutcome, Environment};
use crate::{manifest::AppSpec, process::ProcessRunner};

/// DigitalOcean CLI installation guide.
const DOCTL_INSTALL_URL: &str = "https://docs.digitalocean.com/reference/doctl/how-to/install/";

/// Guide the user through a DigitalOcean App Platform deployment.
///
/// If `doctl` is installed and authenticated, an application spec is generated
/// for the user to apply. The platform API is never called directly.
#[instrument(skip(context, out), err)]
pub(super) async fn deploy<R: ProcessRunner>(
    context: &DeployContext<'_, R>,
    environment: Environment,
    out: &mut impl Write,
) -> Result<DeployOutcome, DeployError> {
    let config = context.config;

    writeln!(out, "Deploying to DigitalOcean ({environment})...")?;

    if !context
        .runner
        .probe(&config.doctl, &["version"])
        .await?
        .is_available()
    {
        writeln!(out, "DigitalOcean CLI (doctl) not found.")?;
        writeln!(out, "Please install it from: {DOCTL_INSTALL_URL}")?;
        writeln!(out, "\nAlternatively, you can deploy manually:")?;
        write_manual_setup(context, environment, out)?;

        return Ok(DeployOutcome::Skipped {
            reason: String::from("DigitalOcean CLI is not installed"),
        });
    }

    if !context
        .runner
        .probe(&config.doctl, &["account", "get"])
        .await?
        .is_available()
    {
        writeln!(out, "DigitalOcean CLI not authenticated.")?;
        writeln!(out, "Please run: doctl auth init")?;
        write_manual_setup(context, environment, out)?;

        return Ok(DeployOutcome::Skipped {
            reason: String::from("DigitalOcean CLI is not authenticated"),
        });
    }

    let spec_file = format!(".vib3-do-{environment}.yaml");
    let spec = AppSpec::new(config, environment).to_yaml()?;

    fs::write(context.root.join(&spec_file), spec)?;
    info!(%spec_file, "application spec created");

    writeln!(out, "Created app spec: {spec_file}")?;
    writeln!(out, "To deploy, run:")?;
    writeln!(out, "doctl apps create --spec {spec_file}")?;
    writeln!(out, "\nOr deploy with GitHub integration:")?;
    write_github_setup(context, out)?;

    Ok(DeployOutcome::Skipped {
        reason: format!("application spec {spec_file} has to be applied manually"),
    })
}

/// Write the manual App Platform setup runbook.
fn write_manual_setup<R>(
    context: &DeployContext<'_, R>,
    environment: Environment,
    out: &mut impl Write,
) -> Result<(), DeployError> {
    let config = context.config;
    let name = format!("{}-{environment}", config.bucket_prefix);
    let run_command = format!("{} {}", config.runtime, config.server_entry.display());

    writeln!(out, "\n=== DigitalOcean Setup Guide for VIB3 ({environment}) ===")?;

    writeln!(out, "\n1. CREATE ACCOUNTS & SETUP:")?;
    writeln!(out, "   • Sign up at https://digitalocean.com")?;
    writeln!(out, "   • Install doctl CLI: {DOCTL_INSTALL_URL}")?;
    writeln!(out, "   • Authenticate: doctl auth init")?;

    writeln!(out, "\n2. DEPLOY WEB APP (App Platform):")?;
    writeln!(out, "   • Go to https://cloud.digitalocean.com/apps")?;
    writeln!(out, "   • Click 'Create App'")?;
    writeln!(out, "   • Connect your GitHub repo")?;
    writeln!(out, "   • Configure:")?;
    writeln!(out, "     - Source: Root directory")?;
    writeln!(out, "     - Build Command: {} install", config.package_manager)?;
    writeln!(out, "     - Run Command: {run_command}")?;
    writeln!(out, "     - HTTP Port: {}", config.app_http_port)?;
    writeln!(out, "     - Environment: Node.js")?;
    writeln!(out, "   • Add static site:")?;
    writeln!(out, "     - Source: /{} directory", config.assets_dir.display())?;
    writeln!(out, "     - Build Command: (none)")?;

    writeln!(out, "\n3. SETUP SPACES (for video storage):")?;
    writeln!(out, "   • Go to https://cloud.digitalocean.com/spaces")?;
    writeln!(out, "   • Create Space:")?;
    writeln!(out, "     - Name: {name}-videos")?;
    writeln!(out, "     - Region: Choose closest to users")?;
    writeln!(out, "     - CDN: Enable")?;
    writeln!(out, "     - File Listing: Restricted")?;

    writeln!(out, "\n4. SETUP DATABASE:")?;
    writeln!(out, "   • Go to https://cloud.digitalocean.com/databases")?;
    writeln!(out, "   • Create Database:")?;
    writeln!(out, "     - Engine: PostgreSQL")?;
    writeln!(out, "     - Name: {name}-db")?;
    writeln!(out, "     - Size: Basic plan")?;

    writeln!(out, "\n5. ENVIRONMENT VARIABLES:")?;
    writeln!(out, "   Add these to your App Platform app:")?;
    writeln!(out, "   • NODE_ENV={environment}")?;
    writeln!(out, "   • DATABASE_URL=(from database connection)")?;
    writeln!(out, "   • DO_SPACES_KEY=(from API keys)")?;
    writeln!(out, "   • DO_SPACES_SECRET=(from API keys)")?;
    writeln!(out, "   • DO_SPACES_ENDPOINT=(from spaces)")?;
    writeln!(out, "   • DO_SPACES_BUCKET={name}-videos")?;

    writeln!(out, "\n6. DOMAIN SETUP:")?;
    writeln!(out, "   • Go to Networking > Domains")?;
    writeln!(out, "   • Add your domain")?;
    writeln!(out, "   • Point to your App Platform app")?;

    writeln!(out, "\n7. ESTIMATED MONTHLY COSTS:")?;
    writeln!(out, "   • App Platform: $12-25")?;
    writeln!(out, "   • Database: $15")?;
    writeln!(out, "   • Spaces: $5 (250GB)")?;
    writeln!(out, "   • Total: ~$30-45/month")?;

    writeln!(out, "\nOnce deployed, your app will be at:")?;
    writeln!(out, "   https://{name}-xxxxx.ondigitalocean.app")?;

    Ok(())
}

/// Write the GitHub integration checklist.
fn write_github_setup<R>(
    context: &DeployContext<'_, R>,
    out: &mut impl Write,
) -> Result<(), DeployError> {
    let config = context.config;

    writeln!(out, "\n=== GitHub Integration Setup ===")?;
    writeln!(out, "1. Push your code to GitHub")?;
    writeln!(out, "2. Go to https://cloud.digitalocean.com/apps")?;
    writeln!(out, "3. Create App from GitHub")?;
    writeln!(out, "4. Select the {} repository", config.app_repository)?;
    writeln!(out, "5. Configure build settings:")?;
    writeln!(out, "   • Build Command: {} install", config.package_manager)?;
    writeln!(
        out,
        "   • Run Command: {} {}",
        config.runtime,
        config.server_entry.display()
    )?;
    writeln!(out, "   • HTTP Port: {}", config.app_http_port)?;
    writeln!(out, "6. Add environment variables")?;
    writeln!(out, "7. Deploy!")?;

    Ok(())
}
