//! # Single file transfers
//!
//! Uploads and downloads a single object, reporting byte-level progress.
//!
//! Downloads are streamed into a temporary file next to the destination,
//! which is only moved into place once the whole object was received.

use std::{
    io::{self, Write},
    path::{Path, PathBuf},
};

use common::storage::{ObjectStore, StorageError, TransferProgress};
use derive_more::{Display, Error, From};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use tempfile::{NamedTempFile, PersistError};
use tokio::{fs, io::AsyncWriteExt};
use tracing::{debug, instrument};

use crate::prompt::Confirm;

/// Transfer errors.
#[derive(Debug, Display, From, Error)]
pub(crate) enum TransferError {
    /// IO-related error.
    Io(io::Error),

    /// Unable to move the downloaded file into place.
    #[display(fmt = "unable to save downloaded file: {}", _0)]
    Persist(PersistError),

    /// Local file doesn't exist.
    #[display(fmt = "File not found: {}", "_0.display()")]
    #[from(ignore)]
    NotFound(#[error(ignore)] PathBuf),

    /// Local path exists, but is not a regular file.
    #[display(fmt = "Not a file: {}", "_0.display()")]
    #[from(ignore)]
    NotAFile(#[error(ignore)] PathBuf),

    /// Object key has no base name to derive the output path from.
    #[display(fmt = "Key '{}' has no file name, please provide an output path", _0)]
    #[from(ignore)]
    InvalidKey(#[error(ignore)] String),

    /// Storage credentials are missing or were rejected.
    #[display(fmt = "AWS credentials not found. Please configure your AWS credentials.")]
    #[from(ignore)]
    Credentials,

    /// Bucket doesn't exist.
    #[display(fmt = "Bucket '{}' does not exist", _0)]
    #[from(ignore)]
    BucketNotFound(#[error(ignore)] String),

    /// Object doesn't exist.
    #[display(fmt = "Key '{}' does not exist in bucket '{}'", key, bucket)]
    #[from(ignore)]
    KeyNotFound {
        /// Bucket name.
        bucket: String,

        /// Object key.
        key: String,
    },

    /// Access to the resource was denied.
    #[display(fmt = "Access denied to {}", _0)]
    #[from(ignore)]
    AccessDenied(#[error(ignore)] String),

    /// Any other storage error.
    #[display(fmt = "S3 error: {}", _0)]
    #[from(ignore)]
    Storage(#[error(ignore)] String),

    /// User interrupted the transfer while being asked for confirmation.
    #[display(fmt = "Operation cancelled by user")]
    #[from(ignore)]
    Interrupted,
}

/// Validated single object transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct TransferRequest {
    /// Local file path, either the upload source or the download destination.
    pub local_path: PathBuf,

    /// Bucket name.
    pub bucket: String,

    /// Object key.
    pub key: String,
}

impl TransferRequest {
    /// Validate an upload of the file at `local_path`.
    ///
    /// Object key defaults to the file name.
    pub(crate) fn upload(
        local_path: PathBuf,
        bucket: String,
        key: Option<String>,
    ) -> Result<Self, TransferError> {
        match std::fs::metadata(&local_path) {
            Ok(metadata) if metadata.is_file() => {}
            Ok(_) => return Err(TransferError::NotAFile(local_path)),
            Err(error) if error.kind() == io::ErrorKind::NotFound => {
                return Err(TransferError::NotFound(local_path))
            }
            Err(error) => return Err(error.into()),
        }

        let key = match key {
            Some(key) => key,
            None => local_path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .ok_or_else(|| TransferError::NotAFile(local_path.clone()))?,
        };

        Ok(Self {
            local_path,
            bucket,
            key,
        })
    }

    /// Validate a download of the `key` object.
    ///
    /// Output path defaults to the key's base name.
    pub(crate) fn download(
        bucket: String,
        key: String,
        output: Option<PathBuf>,
    ) -> Result<Self, TransferError> {
        let local_path = match output {
            Some(output) => output,
            None => match key.rsplit('/').next() {
                Some(name) if !name.is_empty() => PathBuf::from(name),
                _ => return Err(TransferError::InvalidKey(key)),
            },
        };

        Ok(Self {
            local_path,
            bucket,
            key,
        })
    }

    /// Object location in the `s3://bucket/key` form.
    pub(crate) fn locator(&self) -> String {
        format!("s3://{}/{}", self.bucket, self.key)
    }

    /// Attach resource names to a storage error.
    fn storage_error(&self, error: StorageError, denied_resource: String) -> TransferError {
        match error {
            StorageError::Credentials => TransferError::Credentials,
            StorageError::NoSuchBucket => TransferError::BucketNotFound(self.bucket.clone()),
            StorageError::NoSuchKey => TransferError::KeyNotFound {
                bucket: self.bucket.clone(),
                key: self.key.clone(),
            },
            StorageError::AccessDenied => TransferError::AccessDenied(denied_resource),
            StorageError::Service(message) => TransferError::Storage(message),
            StorageError::Io(error) => TransferError::Io(error),
        }
    }
}

/// Result of a download attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DownloadOutcome {
    /// Object was saved, with the provided amount of bytes.
    Completed(u64),

    /// User declined to overwrite the existing destination.
    Cancelled,
}

/// Upload a file, returning the amount of uploaded bytes.
///
/// `make_progress` receives the total size of the transfer.
#[instrument(skip(store, out, make_progress), err)]
pub(crate) async fn upload<S, P>(
    store: &S,
    request: &TransferRequest,
    out: &mut impl Write,
    make_progress: impl FnOnce(u64) -> P,
) -> Result<u64, TransferError>
where
    S: ObjectStore + ?Sized,
    P: TransferProgress,
{
    let size = fs::metadata(&request.local_path).await?.len();

    writeln!(
        out,
        "Uploading {} ({} bytes) to {}",
        request.local_path.display(),
        group_digits(size),
        request.locator()
    )?;

    let mut progress = make_progress(size);

    store
        .upload_file(
            &request.bucket,
            &request.key,
            &request.local_path,
            None,
            &mut progress,
        )
        .await
        .map_err(|error| request.storage_error(error, format!("bucket '{}'", request.bucket)))?;

    drop(progress);

    writeln!(out, "Successfully uploaded to {}", request.locator())?;

    Ok(size)
}

/// Download an object.
///
/// An existing destination is only replaced if the user confirms it.
#[instrument(skip(store, prompt, out, make_progress), err)]
pub(crate) async fn download<S, P>(
    store: &S,
    request: &TransferRequest,
    prompt: &impl Confirm,
    out: &mut impl Write,
    make_progress: impl FnOnce(u64) -> P,
) -> Result<DownloadOutcome, TransferError>
where
    S: ObjectStore + ?Sized,
    P: TransferProgress,
{
    let destination = &request.local_path;

    if fs::try_exists(destination).await? {
        let question = format!("File '{}' already exists. Overwrite?", destination.display());

        let confirmed = prompt.confirm(&question).map_err(|error| match error.kind() {
            io::ErrorKind::Interrupted => TransferError::Interrupted,
            _ => TransferError::Io(error),
        })?;

        if !confirmed {
            writeln!(out, "Download cancelled.")?;
            return Ok(DownloadOutcome::Cancelled);
        }
    }

    let metadata = store
        .head_object(&request.bucket, &request.key)
        .await
        .map_err(|error| request.storage_error(error, request.locator()))?;

    writeln!(
        out,
        "Downloading {} ({} bytes) to {}",
        request.locator(),
        group_digits(metadata.size),
        destination.display()
    )?;

    let directory = match destination.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            fs::create_dir_all(parent).await?;
            parent
        }
        _ => Path::new("."),
    };

    let temp = NamedTempFile::new_in(directory)?;
    let mut file = fs::File::from_std(temp.as_file().try_clone()?);
    let mut progress = make_progress(metadata.size);

    let bytes = store
        .download(&request.bucket, &request.key, &mut file, &mut progress)
        .await
        .map_err(|error| request.storage_error(error, request.locator()))?;

    file.flush().await?;
    drop(file);
    drop(progress);

    temp.persist(destination)?;
    debug!(bytes, "download persisted");

    writeln!(out, "Successfully downloaded to {}", destination.display())?;

    Ok(DownloadOutcome::Completed(bytes))
}

/// Format an integer with `,` thousands separators.
pub(crate) fn group_digits(value: u64) -> String {
    let digits = value.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);

    for (idx, digit) in digits.chars().enumerate() {
        if idx > 0 && (digits.len() - idx) % 3 == 0 {
            grouped.push(',');
        }

        grouped.push(digit);
    }

    grouped
}

/// Render a single progress line.
fn progress_message(done: u64, total: u64) -> String {
    let percentage = if total == 0 {
        100.0
    } else {
        done as f64 * 100.0 / total as f64
    };

    format!(
        "Progress: {percentage:.1}% ({}/{} bytes)",
        group_digits(done),
        group_digits(total)
    )
}

/// Same-line progress indicator printed to the standard output.
pub(crate) struct ConsoleProgress {
    /// Underlying progress bar, which only renders its message.
    bar: ProgressBar,

    /// Bytes transferred so far.
    done: u64,

    /// Total transfer size.
    total: u64,
}

impl ConsoleProgress {
    /// Create new [`ConsoleProgress`] for a transfer of `total` bytes.
    pub(crate) fn new(total: u64) -> Self {
        let bar = ProgressBar::with_draw_target(Some(total), ProgressDrawTarget::stdout());
        bar.set_style(
            ProgressStyle::with_template("{msg}").unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        bar.set_message(progress_message(0, total));

        Self {
            bar,
            done: 0,
            total,
        }
    }
}

impl TransferProgress for ConsoleProgress {
    fn advance(&mut self, bytes: u64) {
        self.done = self.done.saturating_add(bytes);
        self.bar.set_position(self.done);
        self.bar.set_message(progress_message(self.done, self.total));
    }
}

impl Drop for ConsoleProgress {
    fn drop(&mut self) {
        self.bar.abandon();
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::Cell, fs};

    use super::*;
    use crate::testing::MemoryStore;

    /// [`Confirm`] implementation with a predefined answer.
    struct Answer(bool, Cell<usize>);

    impl Confirm for Answer {
        fn confirm(&self, _question: &str) -> io::Result<bool> {
            self.1.set(self.1.get() + 1);
            Ok(self.0)
        }
    }

    /// [`Confirm`] implementation interrupted by the user.
    struct Interrupt;

    impl Confirm for Interrupt {
        fn confirm(&self, _question: &str) -> io::Result<bool> {
            Err(io::ErrorKind::Interrupted.into())
        }
    }

    #[test]
    fn digits_are_grouped() {
        assert_eq!(group_digits(0), "0");
        assert_eq!(group_digits(999), "999");
        assert_eq!(group_digits(1024), "1,024");
        assert_eq!(group_digits(1_234_567), "1,234,567");
    }

    #[test]
    fn empty_transfers_are_complete() {
        assert_eq!(progress_message(0, 0), "Progress: 100.0% (0/0 bytes)");
        assert_eq!(
            progress_message(512, 2048),
            "Progress: 25.0% (512/2,048 bytes)"
        );
    }

    #[test]
    fn upload_key_defaults_to_file_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.txt");
        fs::write(&path, b"report").unwrap();

        let request = TransferRequest::upload(path, String::from("docs"), None).unwrap();

        assert_eq!(request.key, "report.txt");
        assert_eq!(request.locator(), "s3://docs/report.txt");
    }

    #[test]
    fn upload_rejects_missing_files_and_directories() {
        let dir = tempfile::tempdir().unwrap();

        assert!(matches!(
            TransferRequest::upload(dir.path().join("missing.txt"), String::from("docs"), None),
            Err(TransferError::NotFound(_))
        ));
        assert!(matches!(
            TransferRequest::upload(dir.path().to_path_buf(), String::from("docs"), None),
            Err(TransferError::NotAFile(_))
        ));
    }

    #[test]
    fn download_output_defaults_to_base_name() {
        let request =
            TransferRequest::download(String::from("docs"), String::from("a/b/report.txt"), None)
                .unwrap();

        assert_eq!(request.local_path, PathBuf::from("report.txt"));

        assert!(matches!(
            TransferRequest::download(String::from("docs"), String::from("a/b/"), None),
            Err(TransferError::InvalidKey(_))
        ));
    }

    #[tokio::test]
    async fn upload_reports_progress() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.txt");
        fs::write(&path, vec![7; 1024]).unwrap();

        let store = MemoryStore::default().with_bucket("docs");
        let request =
            TransferRequest::upload(path, String::from("docs"), Some(String::from("r.txt")))
                .unwrap();

        let mut out = Vec::new();
        let mut total = 0;
        let mut reported = 0u64;
        let counter = |bytes: u64| reported += bytes;

        let size = upload(&store, &request, &mut out, |size| {
            total = size;
            counter
        })
        .await
        .unwrap();

        assert_eq!(size, 1024);
        assert_eq!(total, 1024);
        assert_eq!(reported, 1024);
        assert_eq!(store.object("docs", "r.txt").unwrap(), vec![7; 1024]);

        let out = String::from_utf8(out).unwrap();
        assert!(out.contains("(1,024 bytes) to s3://docs/r.txt"));
        assert!(out.ends_with("Successfully uploaded to s3://docs/r.txt\n"));
    }

    #[tokio::test]
    async fn upload_into_missing_bucket() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.txt");
        fs::write(&path, b"report").unwrap();

        let store = MemoryStore::default();
        let request = TransferRequest::upload(path, String::from("docs"), None).unwrap();

        let error = upload(&store, &request, &mut Vec::new(), |_| |_: u64| {})
            .await
            .unwrap_err();

        assert_eq!(error.to_string(), "Bucket 'docs' does not exist");
    }

    #[tokio::test]
    async fn download_saves_object() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("nested/report.txt");

        let store = MemoryStore::default()
            .with_bucket("docs")
            .with_object("docs", "a/report.txt", b"hello world");
        let request =
            TransferRequest::download(String::from("docs"), String::from("a/report.txt"), Some(output.clone()))
                .unwrap();

        let prompt = Answer(false, Cell::new(0));
        let mut out = Vec::new();

        let outcome = download(&store, &request, &prompt, &mut out, |_| |_: u64| {})
            .await
            .unwrap();

        assert_eq!(outcome, DownloadOutcome::Completed(11));
        assert_eq!(fs::read(&output).unwrap(), b"hello world");
        assert_eq!(prompt.1.get(), 0);
        assert!(String::from_utf8(out)
            .unwrap()
            .contains("Downloading s3://docs/a/report.txt (11 bytes)"));
    }

    #[tokio::test]
    async fn declined_overwrite_keeps_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("report.txt");
        fs::write(&output, b"local").unwrap();

        let store = MemoryStore::default()
            .with_bucket("docs")
            .with_object("docs", "report.txt", b"remote");
        let request =
            TransferRequest::download(String::from("docs"), String::from("report.txt"), Some(output.clone()))
                .unwrap();

        let mut out = Vec::new();
        let outcome = download(
            &store,
            &request,
            &Answer(false, Cell::new(0)),
            &mut out,
            |_| |_: u64| {},
        )
        .await
        .unwrap();

        assert_eq!(outcome, DownloadOutcome::Cancelled);
        assert_eq!(out, b"Download cancelled.\n");
        assert_eq!(fs::read(&output).unwrap(), b"local");
        assert!(store.calls().is_empty());
    }

    #[tokio::test]
    async fn interrupted_confirmation_cancels_download() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("report.txt");
        fs::write(&output, b"local").unwrap();

        let store = MemoryStore::default()
            .with_bucket("docs")
            .with_object("docs", "report.txt", b"remote");
        let request = TransferRequest::download(
            String::from("docs"),
            String::from("report.txt"),
            Some(output.clone()),
        )
        .unwrap();

        let mut out = Vec::new();
        let error = download(&store, &request, &Interrupt, &mut out, |_| |_: u64| {})
            .await
            .unwrap_err();

        assert!(matches!(error, TransferError::Interrupted));
        assert!(out.is_empty());
        assert_eq!(fs::read(&output).unwrap(), b"local");
        assert!(store.calls().is_empty());
    }

    #[tokio::test]
    async fn missing_object_leaves_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("report.txt");

        let store = MemoryStore::default().with_bucket("docs");
        let request =
            TransferRequest::download(String::from("docs"), String::from("report.txt"), Some(output.clone()))
                .unwrap();

        let error = download(
            &store,
            &request,
            &Answer(true, Cell::new(0)),
            &mut Vec::new(),
            |_| |_: u64| {},
        )
        .await
        .unwrap_err();

        assert_eq!(
            error.to_string(),
            "Key 'report.txt' does not exist in bucket 'docs'"
        );
        assert!(!output.exists());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn missing_bucket_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("report.txt");

        let request = TransferRequest::download(
            String::from("archive"),
            String::from("report.txt"),
            Some(output.clone()),
        )
        .unwrap();

        let error = download(
            &MemoryStore::default(),
            &request,
            &Answer(true, Cell::new(0)),
            &mut Vec::new(),
            |_| |_: u64| {},
        )
        .await
        .unwrap_err();

        assert_eq!(error.to_string(), "Bucket 'archive' does not exist");
        assert!(!output.exists());
    }

    #[tokio::test]
    async fn access_denied_names_the_object() {
        let dir = tempfile::tempdir().unwrap();

        let store = MemoryStore::default()
            .with_bucket("docs")
            .with_object("docs", "report.txt", b"remote")
            .failing("head_object", || StorageError::AccessDenied);
        let request = TransferRequest::download(
            String::from("docs"),
            String::from("report.txt"),
            Some(dir.path().join("report.txt")),
        )
        .unwrap();

        let error = download(
            &store,
            &request,
            &Answer(true, Cell::new(0)),
            &mut Vec::new(),
            |_| |_: u64| {},
        )
        .await
        .unwrap_err();

        assert_eq!(error.to_string(), "Access denied to s3://docs/report.txt");
    }
}
