use std::{
    ffi::OsStr,
    io::Write,
    path::{Path, PathBuf},
};

use chrono::Utc;
use common::storage::ObjectStore;
use indicatif::ProgressBar;
use serde_json::json;
use tracing::{info, instrument, warn};
use walkdir::WalkDir;

use super::{DeployContext, DeployError, DeployOutcome, Environment, Provider};
use crate::{ledger::DeploymentRecord, process::ProcessRunner};

/// Content type of files without a known extension.
const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Publish the assets directory as a public static website bucket.
///
/// A new bucket is created for every deployment.
#[instrument(skip(context, store, progress, out), err)]
pub(super) async fn deploy<R, S>(
    context: &DeployContext<'_, R>,
    store: &S,
    region: &str,
    environment: Environment,
    progress: &ProgressBar,
    out: &mut impl Write,
) -> Result<DeployOutcome, DeployError>
where
    R: ProcessRunner,
    S: ObjectStore + ?Sized,
{
    let config = context.config;

    writeln!(out, "Deploying to AWS ({environment})...")?;

    if !context
        .runner
        .probe(&config.aws_cli, &["--version"])
        .await?
        .is_available()
    {
        return Err(DeployError::ToolUnavailable {
            tool: String::from("AWS CLI"),
        });
    }

    let assets_dir = context.root.join(&config.assets_dir);

    if !assets_dir.is_dir() {
        return Err(DeployError::MissingAssets(config.assets_dir.clone()));
    }

    let timestamp = Utc::now().timestamp();
    let bucket = format!("{}-{environment}-{timestamp}", config.bucket_prefix);

    writeln!(out, "Creating S3 bucket: {bucket}")?;

    store.create_bucket(&bucket, region).await?;
    store.allow_public_access(&bucket).await?;
    store
        .put_bucket_website(&bucket, &config.index_document, &config.error_document)
        .await?;
    store
        .put_bucket_policy(&bucket, &public_read_policy(&bucket))
        .await?;

    writeln!(out, "Uploading files to S3...")?;

    let files = collect_assets(&assets_dir, progress)?;
    progress.set_length(files.len() as u64);

    for (key, path) in &files {
        progress.set_message(key.clone());

        store
            .upload_file(&bucket, key, path, Some(content_type(path)), &mut |_: u64| {})
            .await?;

        writeln!(out, "  {key}")?;
        progress.inc(1);
    }

    progress.finish_and_clear();

    let url = format!("http://{bucket}.s3-website-{region}.amazonaws.com");

    writeln!(out, "\nDeployment successful!")?;
    writeln!(out, "Website URL: {url}")?;

    info!(%bucket, files = files.len(), "website published");

    Ok(DeployOutcome::Deployed(DeploymentRecord {
        provider: Provider::Aws,
        environment,
        url: Some(url),
        bucket: Some(bucket),
        region: Some(region.to_owned()),
        timestamp,
    }))
}

/// Bucket policy that allows anyone to read any object.
fn public_read_policy(bucket: &str) -> String {
    json!({
        "Version": "2012-10-17",
        "Statement": [{
            "Sid": "PublicReadGetObject",
            "Effect": "Allow",
            "Principal": "*",
            "Action": "s3:GetObject",
            "Resource": format!("arn:aws:s3:::{bucket}/*"),
        }],
    })
    .to_string()
}

/// Recursively collect files of the assets directory, together with their object keys.
///
/// Object keys always use `/` as a separator. Files with non-unicode paths are skipped.
fn collect_assets(
    assets_dir: &Path,
    progress: &ProgressBar,
) -> Result<Vec<(String, PathBuf)>, DeployError> {
    let mut files = Vec::new();
    let mut entries = WalkDir::new(assets_dir).sort_by_file_name().into_iter();

    while let Some(entry) = entries.next().transpose()? {
        if !entry.file_type().is_file() {
            continue;
        }

        let relative = entry.path().strip_prefix(assets_dir)?;

        let Some(components) = relative
            .components()
            .map(|component| component.as_os_str().to_str())
            .collect::<Option<Vec<_>>>()
        else {
            warn!(path = %entry.path().display(), "skipping non-unicode path");
            progress.println(format!(
                "File {} contains non-unicode symbols in path",
                entry.path().display()
            ));
            continue;
        };

        files.push((components.join("/"), entry.into_path()));
    }

    Ok(files)
}

/// Guess the content type of a website file from its extension.
fn content_type(path: &Path) -> &'static str {
    match path.extension().and_then(OsStr::to_str) {
        Some("html") => "text/html",
        Some("css") => "text/css",
        Some("js") => "application/javascript",
        _ => DEFAULT_CONTENT_TYPE,
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use common::{config::Deploy, storage::StorageError};

    use super::*;
    use crate::{
        ledger::Ledger,
        testing::{MemoryStore, ScriptedRunner},
    };

    fn website(root: &Path) {
        fs::create_dir_all(root.join("www/css")).unwrap();
        fs::write(root.join("www/index.html"), "<html></html>").unwrap();
        fs::write(root.join("www/css/site.css"), "body {}").unwrap();
        fs::write(root.join("www/app.js"), "main()").unwrap();
    }

    async fn publish(
        root: &Path,
        store: &MemoryStore,
        runner: &ScriptedRunner,
    ) -> (Result<DeployOutcome, DeployError>, String) {
        let config = Deploy::default();
        let ledger = Ledger::new(root.join(".vib3_deployments.json"), 5);
        let context = DeployContext {
            config: &config,
            root,
            runner,
            ledger: &ledger,
        };

        let mut out = Vec::new();
        let result = deploy(
            &context,
            store,
            "eu-west-1",
            Environment::Prod,
            &ProgressBar::hidden(),
            &mut out,
        )
        .await;

        (result, String::from_utf8(out).unwrap())
    }

    #[test]
    fn content_types() {
        assert_eq!(content_type(Path::new("index.html")), "text/html");
        assert_eq!(content_type(Path::new("a/site.css")), "text/css");
        assert_eq!(content_type(Path::new("app.js")), "application/javascript");
        assert_eq!(content_type(Path::new("logo.png")), DEFAULT_CONTENT_TYPE);
        assert_eq!(content_type(Path::new("LICENSE")), DEFAULT_CONTENT_TYPE);
    }

    #[test]
    fn policy_grants_public_read() {
        let policy: serde_json::Value =
            serde_json::from_str(&public_read_policy("vib3-dev-1")).unwrap();

        assert_eq!(policy["Version"], "2012-10-17");
        assert_eq!(policy["Statement"][0]["Action"], "s3:GetObject");
        assert_eq!(policy["Statement"][0]["Principal"], "*");
        assert_eq!(
            policy["Statement"][0]["Resource"],
            "arn:aws:s3:::vib3-dev-1/*"
        );
    }

    #[tokio::test]
    async fn publishes_website() {
        let dir = tempfile::tempdir().unwrap();
        website(dir.path());

        let store = MemoryStore::default();
        let runner = ScriptedRunner::default().installed("aws");

        let (result, out) = publish(dir.path(), &store, &runner).await;

        let DeployOutcome::Deployed(record) = result.unwrap() else {
            panic!("expected a deployment");
        };

        let bucket_name = record.bucket.clone().unwrap();
        assert!(bucket_name.starts_with("vib3-prod-"));
        assert_eq!(record.region.as_deref(), Some("eu-west-1"));
        assert_eq!(
            record.url,
            Some(format!(
                "http://{bucket_name}.s3-website-eu-west-1.amazonaws.com"
            ))
        );

        assert_eq!(
            store.calls(),
            [
                "create_bucket",
                "allow_public_access",
                "put_bucket_website",
                "put_bucket_policy",
                "upload_file",
                "upload_file",
                "upload_file",
            ]
        );

        let bucket = store.bucket(&bucket_name).unwrap();
        assert!(bucket.public);
        assert!(bucket
            .policy
            .unwrap()
            .contains(&format!("arn:aws:s3:::{bucket_name}/*")));
        assert_eq!(bucket.region.as_deref(), Some("eu-west-1"));
        assert_eq!(
            bucket.website,
            Some((String::from("index.html"), String::from("error.html")))
        );
        assert_eq!(
            bucket.objects.keys().collect::<Vec<_>>(),
            ["app.js", "css/site.css", "index.html"]
        );
        assert_eq!(
            bucket.content_types["css/site.css"].as_deref(),
            Some("text/css")
        );

        assert!(out.starts_with("Deploying to AWS (prod)...\n"));
        assert!(out.contains(&format!("Creating S3 bucket: {bucket_name}\n")));
        assert!(out.contains("\nDeployment successful!\nWebsite URL: http://"));
    }

    #[tokio::test]
    async fn failed_step_stops_deployment() {
        let dir = tempfile::tempdir().unwrap();
        website(dir.path());

        let store =
            MemoryStore::default().failing_nth("upload_file", 1, || StorageError::AccessDenied);
        let runner = ScriptedRunner::default().installed("aws");

        let (result, out) = publish(dir.path(), &store, &runner).await;

        assert_eq!(
            result.unwrap_err().to_string(),
            "AWS deployment failed: access denied"
        );
        assert_eq!(store.calls().len(), 6);
        assert_eq!(store.bucket_names().len(), 1);
        assert!(!out.contains("Deployment successful!"));
    }

    #[tokio::test]
    async fn missing_cli() {
        let dir = tempfile::tempdir().unwrap();
        website(dir.path());

        let store = MemoryStore::default();
        let (result, _) = publish(dir.path(), &store, &ScriptedRunner::default()).await;

        assert_eq!(result.unwrap_err().to_string(), "AWS CLI is not installed");
        assert!(store.calls().is_empty());
    }

    #[tokio::test]
    async fn missing_assets() {
        let dir = tempfile::tempdir().unwrap();

        let store = MemoryStore::default();
        let runner = ScriptedRunner::default().installed("aws");
        let (result, _) = publish(dir.path(), &store, &runner).await;

        assert_eq!(result.unwrap_err().to_string(), "www directory not found");
        assert!(store.calls().is_empty());
    }
}
