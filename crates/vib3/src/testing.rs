use std::{
    collections::{BTreeMap, BTreeSet},
    path::Path,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use common::storage::{ObjectMetadata, ObjectStore, StorageError, TransferProgress};
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::process::{Completion, Invocation, Probe, ProcessError, ProcessRunner};

/// Size of chunks reported by [`MemoryStore`] transfers.
const CHUNK_SIZE: usize = 256;

/// Bucket state kept by [`MemoryStore`].
#[derive(Debug, Clone, Default)]
pub(crate) struct MemoryBucket {
    /// Region the bucket was created in.
    pub region: Option<String>,

    /// Object bodies by key.
    pub objects: BTreeMap<String, Vec<u8>>,

    /// Content types objects were uploaded with.
    pub content_types: BTreeMap<String, Option<String>>,

    /// Index and error documents of the website configuration.
    pub website: Option<(String, String)>,

    /// Attached bucket policy.
    pub policy: Option<String>,

    /// Whether the public access block was removed.
    pub public: bool,
}

/// In-memory [`ObjectStore`] with optional injected failures.
///
/// Clones share the same state.
#[derive(Clone, Default)]
pub(crate) struct MemoryStore {
    /// Buckets by name.
    buckets: Arc<Mutex<BTreeMap<String, MemoryBucket>>>,

    /// Invoked operations.
    calls: Arc<Mutex<Vec<String>>>,

    /// Operation name, zero-based call index and the error to fail it with.
    failure: Option<(&'static str, usize, fn() -> StorageError)>,
}

impl MemoryStore {
    pub(crate) fn with_bucket(self, bucket: &str) -> Self {
        self.buckets
            .lock()
            .unwrap()
            .insert(bucket.to_owned(), MemoryBucket::default());
        self
    }

    pub(crate) fn with_object(self, bucket: &str, key: &str, body: &[u8]) -> Self {
        self.buckets
            .lock()
            .unwrap()
            .entry(bucket.to_owned())
            .or_default()
            .objects
            .insert(key.to_owned(), body.to_vec());
        self
    }

    /// Fail the first call of `operation`.
    pub(crate) fn failing(self, operation: &'static str, error: fn() -> StorageError) -> Self {
        self.failing_nth(operation, 0, error)
    }

    /// Fail the `nth` call of `operation`, counting from zero.
    pub(crate) fn failing_nth(
        mut self,
        operation: &'static str,
        nth: usize,
        error: fn() -> StorageError,
    ) -> Self {
        self.failure = Some((operation, nth, error));
        self
    }

    pub(crate) fn bucket(&self, bucket: &str) -> Option<MemoryBucket> {
        self.buckets.lock().unwrap().get(bucket).cloned()
    }

    pub(crate) fn object(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        self.bucket(bucket)?.objects.get(key).cloned()
    }

    pub(crate) fn bucket_names(&self) -> Vec<String> {
        self.buckets.lock().unwrap().keys().cloned().collect()
    }

    /// Names of all invoked operations, in order.
    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Record an operation call, failing it if scripted to.
    fn call(&self, operation: &'static str) -> Result<(), StorageError> {
        let mut calls = self.calls.lock().unwrap();
        let count = calls.iter().filter(|call| *call == operation).count();
        calls.push(operation.to_owned());

        match self.failure {
            Some((failing, nth, error)) if failing == operation && nth == count => Err(error()),
            _ => Ok(()),
        }
    }

    /// Run `f` against an existing bucket.
    fn with_existing<T>(
        &self,
        bucket: &str,
        f: impl FnOnce(&mut MemoryBucket) -> Result<T, StorageError>,
    ) -> Result<T, StorageError> {
        let mut buckets = self.buckets.lock().unwrap();
        let bucket = buckets.get_mut(bucket).ok_or(StorageError::NoSuchBucket)?;
        f(bucket)
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn head_object(&self, bucket: &str, key: &str) -> Result<ObjectMetadata, StorageError> {
        self.call("head_object")?;

        self.with_existing(bucket, |bucket| {
            let object = bucket.objects.get(key).ok_or(StorageError::NoSuchKey)?;

            Ok(ObjectMetadata {
                size: object.len() as u64,
            })
        })
    }

    async fn upload_file(
        &self,
        bucket: &str,
        key: &str,
        path: &Path,
        content_type: Option<&str>,
        progress: &mut dyn TransferProgress,
    ) -> Result<(), StorageError> {
        self.call("upload_file")?;

        let body = tokio::fs::read(path).await?;

        self.with_existing(bucket, |bucket| {
            bucket.objects.insert(key.to_owned(), body.clone());
            bucket
                .content_types
                .insert(key.to_owned(), content_type.map(str::to_owned));
            Ok(())
        })?;

        for chunk in body.chunks(CHUNK_SIZE) {
            progress.advance(chunk.len() as u64);
        }

        Ok(())
    }

    async fn download(
        &self,
        bucket: &str,
        key: &str,
        writer: &mut (dyn AsyncWrite + Unpin + Send),
        progress: &mut dyn TransferProgress,
    ) -> Result<u64, StorageError> {
        self.call("download")?;

        let body = self.with_existing(bucket, |bucket| {
            bucket
                .objects
                .get(key)
                .cloned()
                .ok_or(StorageError::NoSuchKey)
        })?;

        for chunk in body.chunks(CHUNK_SIZE) {
            writer.write_all(chunk).await?;
            progress.advance(chunk.len() as u64);
        }

        Ok(body.len() as u64)
    }

    async fn create_bucket(&self, bucket: &str, region: &str) -> Result<(), StorageError> {
        self.call("create_bucket")?;

        self.buckets.lock().unwrap().insert(
            bucket.to_owned(),
            MemoryBucket {
                region: Some(region.to_owned()),
                ..MemoryBucket::default()
            },
        );

        Ok(())
    }

    async fn allow_public_access(&self, bucket: &str) -> Result<(), StorageError> {
        self.call("allow_public_access")?;

        self.with_existing(bucket, |bucket| {
            bucket.public = true;
            Ok(())
        })
    }

    async fn put_bucket_website(
        &self,
        bucket: &str,
        index_document: &str,
        error_document: &str,
    ) -> Result<(), StorageError> {
        self.call("put_bucket_website")?;

        self.with_existing(bucket, |bucket| {
            bucket.website = Some((index_document.to_owned(), error_document.to_owned()));
            Ok(())
        })
    }

    async fn put_bucket_policy(&self, bucket: &str, policy: &str) -> Result<(), StorageError> {
        self.call("put_bucket_policy")?;

        self.with_existing(bucket, |bucket| {
            bucket.policy = Some(policy.to_owned());
            Ok(())
        })
    }
}

/// [`ProcessRunner`] with scripted probe and run results.
///
/// Programs are missing unless marked as installed.
#[derive(Default)]
pub(crate) struct ScriptedRunner {
    /// Programs present in `PATH`.
    installed: BTreeSet<String>,

    /// Probe command lines that exit unsuccessfully.
    failing: BTreeSet<String>,

    /// Exit codes of foreground processes by program, `None` if killed by a signal.
    exit_codes: BTreeMap<String, Option<i32>>,

    /// Probed command lines.
    probes: Mutex<Vec<String>>,

    /// Foreground process invocations.
    invocations: Mutex<Vec<Invocation>>,
}

impl ScriptedRunner {
    pub(crate) fn installed(mut self, program: &str) -> Self {
        self.installed.insert(program.to_owned());
        self
    }

    /// Make the probe with the provided command line exit unsuccessfully.
    pub(crate) fn failing(mut self, command_line: &str) -> Self {
        self.failing.insert(command_line.to_owned());
        self
    }

    pub(crate) fn exit_code(mut self, program: &str, code: i32) -> Self {
        self.exit_codes.insert(program.to_owned(), Some(code));
        self
    }

    /// Make foreground runs of `program` end with a signal.
    pub(crate) fn killed(mut self, program: &str) -> Self {
        self.exit_codes.insert(program.to_owned(), None);
        self
    }

    /// Command lines of all probes, in order.
    pub(crate) fn probes(&self) -> Vec<String> {
        self.probes.lock().unwrap().clone()
    }

    pub(crate) fn invocations(&self) -> Vec<Invocation> {
        self.invocations.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProcessRunner for ScriptedRunner {
    async fn probe(&self, program: &str, args: &[&str]) -> Result<Probe, ProcessError> {
        let command_line = std::iter::once(program)
            .chain(args.iter().copied())
            .collect::<Vec<_>>()
            .join(" ");

        self.probes.lock().unwrap().push(command_line.clone());

        if !self.installed.contains(program) {
            Ok(Probe::Missing)
        } else if self.failing.contains(&command_line) {
            Ok(Probe::Failed {
                stderr: String::from("scripted failure"),
            })
        } else {
            Ok(Probe::Available {
                stdout: format!("{program} 1.0.0"),
            })
        }
    }

    async fn run(&self, invocation: &Invocation) -> Result<Completion, ProcessError> {
        self.invocations.lock().unwrap().push(invocation.clone());

        Ok(Completion {
            code: self
                .exit_codes
                .get(&invocation.program)
                .copied()
                .unwrap_or(Some(0)),
        })
    }
}
