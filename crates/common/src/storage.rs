//! Object storage port.
//!
//! [`ObjectStore`] describes the subset of an S3-compatible service
//! that is needed to transfer single files and to publish static websites.
//! The AWS SDK implementation lives in the `s3` module, while tests
//! are free to provide in-memory implementations.

use std::{io, path::Path};

use async_trait::async_trait;
use derive_more::{Display, Error, From};
use tokio::io::AsyncWrite;

/// Errors reported by an [`ObjectStore`].
///
/// Implementations classify their native errors into these variants,
/// so that callers can attach the resource names they know about.
#[derive(Debug, Display, From, Error)]
pub enum StorageError {
    /// Credentials are missing or were rejected.
    #[display(fmt = "storage credentials not found or invalid")]
    #[from(ignore)]
    Credentials,

    /// Requested bucket does not exist.
    #[display(fmt = "bucket does not exist")]
    #[from(ignore)]
    NoSuchBucket,

    /// Requested object does not exist.
    #[display(fmt = "object does not exist")]
    #[from(ignore)]
    NoSuchKey,

    /// Access to the resource was denied.
    #[display(fmt = "access denied")]
    #[from(ignore)]
    AccessDenied,

    /// Any other service or transport error.
    #[display(fmt = "{}", _0)]
    #[from(ignore)]
    Service(#[error(ignore)] String),

    /// IO-related error.
    Io(io::Error),
}

/// Object metadata returned by [`ObjectStore::head_object`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectMetadata {
    /// Object size, in bytes.
    pub size: u64,
}

/// Byte-level transfer progress receiver.
///
/// Receives the amount of bytes transferred since the previous call.
pub trait TransferProgress: Send {
    /// Advance progress by `bytes`.
    fn advance(&mut self, bytes: u64);
}

impl<F> TransferProgress for F
where
    F: FnMut(u64) + Send,
{
    fn advance(&mut self, bytes: u64) {
        self(bytes)
    }
}

/// S3-compatible object storage operations.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Get metadata of an object without downloading it.
    async fn head_object(&self, bucket: &str, key: &str) -> Result<ObjectMetadata, StorageError>;

    /// Upload the file at `path` as the `key` object.
    async fn upload_file(
        &self,
        bucket: &str,
        key: &str,
        path: &Path,
        content_type: Option<&str>,
        progress: &mut dyn TransferProgress,
    ) -> Result<(), StorageError>;

    /// Stream the `key` object into `writer`, returning the amount of bytes written.
    async fn download(
        &self,
        bucket: &str,
        key: &str,
        writer: &mut (dyn AsyncWrite + Unpin + Send),
        progress: &mut dyn TransferProgress,
    ) -> Result<u64, StorageError>;

    /// Create a new bucket in the provided region.
    async fn create_bucket(&self, bucket: &str, region: &str) -> Result<(), StorageError>;

    /// Remove the public access block, which prevents public bucket policies.
    async fn allow_public_access(&self, bucket: &str) -> Result<(), StorageError>;

    /// Enable static website hosting.
    async fn put_bucket_website(
        &self,
        bucket: &str,
        index_document: &str,
        error_document: &str,
    ) -> Result<(), StorageError>;

    /// Attach a JSON-encoded bucket policy.
    async fn put_bucket_policy(&self, bucket: &str, policy: &str) -> Result<(), StorageError>;
}
