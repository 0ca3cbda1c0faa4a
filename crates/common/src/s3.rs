use std::{
    convert::Infallible,
    error::Error,
    path::Path,
    pin::Pin,
    task::{Context, Poll},
};

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::{
    config::{http::HttpResponse, Credentials, Region},
    error::{DisplayErrorContext, ProvideErrorMetadata, SdkError},
    primitives::ByteStream,
    types::{
        BucketLocationConstraint, CompletedMultipartUpload, CompletedPart,
        CreateBucketConfiguration, ErrorDocument, IndexDocument, WebsiteConfiguration,
    },
    Client,
};
use bytes::Bytes;
use http_body::{Body, Frame, SizeHint};
use tokio::{
    fs::{self, File},
    io::{AsyncReadExt, AsyncWrite, AsyncWriteExt},
    sync::mpsc::{self, UnboundedSender},
};
use tracing::{debug, instrument, warn};

use crate::{
    config,
    storage::{ObjectMetadata, ObjectStore, StorageError, TransferProgress},
};

/// Region which doesn't accept an explicit bucket location constraint.
const DEFAULT_REGION: &str = "us-east-1";

/// Name reported by statically configured credentials.
const CREDENTIALS_PROVIDER_NAME: &str = "vib3-config";

/// Size of chunks single part upload bodies are sent in.
const BODY_CHUNK_SIZE: usize = 64 * 1024;

/// Configured S3 client.
pub struct ConfiguredClient {
    client: Client,
    part_size: u64,
}

impl ConfiguredClient {
    /// Create new [`ConfiguredClient`] from the provided [`Storage`] configuration
    /// bound to the provided `region`.
    ///
    /// Static credentials are used only if both keys are configured,
    /// otherwise the default AWS credential provider chain is consulted lazily.
    ///
    /// [`Storage`]: config::Storage
    pub async fn new(config: &config::Storage, region: &str) -> ConfiguredClient {
        let mut loader =
            aws_config::defaults(BehaviorVersion::latest()).region(Region::new(region.to_owned()));

        if let Some(endpoint_url) = &config.endpoint_url {
            loader = loader.endpoint_url(endpoint_url);
        }

        if let (Some(access_key_id), Some(secret_access_key)) =
            (&config.access_key_id, &config.secret_access_key)
        {
            loader = loader.credentials_provider(Credentials::new(
                access_key_id,
                secret_access_key,
                None,
                None,
                CREDENTIALS_PROVIDER_NAME,
            ));
        }

        let sdk_config = loader.load().await;
        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(config.force_path_style)
            .build();

        ConfiguredClient {
            client: Client::from_conf(s3_config),
            part_size: config.part_size.max(1),
        }
    }

    /// Upload a file that exceeds the part size using a multipart upload.
    ///
    /// Unfinished uploads are aborted, so that the stored parts don't linger in the bucket.
    async fn multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        path: &Path,
        content_type: Option<&str>,
        progress: &mut dyn TransferProgress,
    ) -> Result<(), StorageError> {
        let upload = self
            .client
            .create_multipart_upload()
            .bucket(bucket)
            .key(key)
            .set_content_type(content_type.map(ToOwned::to_owned))
            .send()
            .await
            .map_err(classify)?;

        let upload_id = upload
            .upload_id()
            .ok_or_else(|| StorageError::Service(String::from("missing multipart upload id")))?
            .to_owned();

        let parts = match self
            .upload_parts(bucket, key, &upload_id, path, progress)
            .await
        {
            Ok(parts) => parts,
            Err(error) => {
                if let Err(abort_error) = self
                    .client
                    .abort_multipart_upload()
                    .bucket(bucket)
                    .key(key)
                    .upload_id(&upload_id)
                    .send()
                    .await
                {
                    warn!(error = %DisplayErrorContext(&abort_error), "unable to abort multipart upload");
                }

                return Err(error);
            }
        };

        self.client
            .complete_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(&upload_id)
            .multipart_upload(
                CompletedMultipartUpload::builder()
                    .set_parts(Some(parts))
                    .build(),
            )
            .send()
            .await
            .map_err(classify)?;

        Ok(())
    }

    /// Upload file contents part by part, reporting progress after each part.
    async fn upload_parts(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        path: &Path,
        progress: &mut dyn TransferProgress,
    ) -> Result<Vec<CompletedPart>, StorageError> {
        let mut file = File::open(path).await?;
        let mut parts = Vec::new();

        for part_number in 1.. {
            let mut chunk = Vec::with_capacity(self.part_size as usize);
            (&mut file)
                .take(self.part_size)
                .read_to_end(&mut chunk)
                .await?;

            if chunk.is_empty() {
                break;
            }

            let len = chunk.len() as u64;

            let part = self
                .client
                .upload_part()
                .bucket(bucket)
                .key(key)
                .upload_id(upload_id)
                .part_number(part_number)
                .body(ByteStream::from(chunk))
                .send()
                .await
                .map_err(classify)?;

            debug!(part_number, len, "uploaded part");

            parts.push(
                CompletedPart::builder()
                    .set_e_tag(part.e_tag().map(ToOwned::to_owned))
                    .part_number(part_number)
                    .build(),
            );

            progress.advance(len);
        }

        Ok(parts)
    }
}

#[async_trait]
impl ObjectStore for ConfiguredClient {
    #[instrument(skip(self), err)]
    async fn head_object(&self, bucket: &str, key: &str) -> Result<ObjectMetadata, StorageError> {
        let output = match self
            .client
            .head_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(classify)
        {
            Ok(output) => output,
            Err(StorageError::NoSuchKey) => {
                let bucket_status = self
                    .client
                    .head_bucket()
                    .bucket(bucket)
                    .send()
                    .await
                    .map(drop)
                    .map_err(classify);

                return Err(missing_object(bucket_status));
            }
            Err(error) => return Err(error),
        };

        Ok(ObjectMetadata {
            size: output.content_length().unwrap_or_default().max(0) as u64,
        })
    }

    #[instrument(skip(self, progress), err)]
    async fn upload_file(
        &self,
        bucket: &str,
        key: &str,
        path: &Path,
        content_type: Option<&str>,
        progress: &mut dyn TransferProgress,
    ) -> Result<(), StorageError> {
        let size = fs::metadata(path).await?.len();

        if size > self.part_size {
            return self
                .multipart_upload(bucket, key, path, content_type, progress)
                .await;
        }

        let body = Bytes::from(fs::read(path).await?);
        let (sent, mut reports) = mpsc::unbounded_channel();

        let request = self
            .client
            .put_object()
            .bucket(bucket)
            .key(key)
            .set_content_type(content_type.map(ToOwned::to_owned))
            .content_length(body.len() as i64)
            .body(ByteStream::from_body_1_x(ProgressBody::new(body, sent)))
            .send();
        tokio::pin!(request);

        let result = loop {
            tokio::select! {
                result = &mut request => break result,
                Some(len) = reports.recv() => progress.advance(len),
            }
        };

        result.map_err(classify)?;

        while let Ok(len) = reports.try_recv() {
            progress.advance(len);
        }

        Ok(())
    }

    #[instrument(skip(self, writer, progress), err)]
    async fn download(
        &self,
        bucket: &str,
        key: &str,
        writer: &mut (dyn AsyncWrite + Unpin + Send),
        progress: &mut dyn TransferProgress,
    ) -> Result<u64, StorageError> {
        let mut output = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(classify)?;

        let mut written = 0;

        while let Some(chunk) = output
            .body
            .try_next()
            .await
            .map_err(|error| StorageError::Service(error.to_string()))?
        {
            writer.write_all(&chunk).await?;
            written += chunk.len() as u64;
            progress.advance(chunk.len() as u64);
        }

        writer.flush().await?;

        Ok(written)
    }

    #[instrument(skip(self), err)]
    async fn create_bucket(&self, bucket: &str, region: &str) -> Result<(), StorageError> {
        let mut request = self.client.create_bucket().bucket(bucket);

        if region != DEFAULT_REGION {
            request = request.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(region))
                    .build(),
            );
        }

        request.send().await.map_err(classify)?;

        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn allow_public_access(&self, bucket: &str) -> Result<(), StorageError> {
        self.client
            .delete_public_access_block()
            .bucket(bucket)
            .send()
            .await
            .map_err(classify)?;

        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn put_bucket_website(
        &self,
        bucket: &str,
        index_document: &str,
        error_document: &str,
    ) -> Result<(), StorageError> {
        let index_document = IndexDocument::builder()
            .suffix(index_document)
            .build()
            .map_err(|error| StorageError::Service(error.to_string()))?;

        let error_document = ErrorDocument::builder()
            .key(error_document)
            .build()
            .map_err(|error| StorageError::Service(error.to_string()))?;

        self.client
            .put_bucket_website()
            .bucket(bucket)
            .website_configuration(
                WebsiteConfiguration::builder()
                    .index_document(index_document)
                    .error_document(error_document)
                    .build(),
            )
            .send()
            .await
            .map_err(classify)?;

        Ok(())
    }

    #[instrument(skip(self, policy), err)]
    async fn put_bucket_policy(&self, bucket: &str, policy: &str) -> Result<(), StorageError> {
        self.client
            .put_bucket_policy()
            .bucket(bucket)
            .policy(policy)
            .send()
            .await
            .map_err(classify)?;

        Ok(())
    }
}

/// Resolve a missing object error, given the result of probing its bucket.
///
/// `HEAD` responses carry no error code, so a missing bucket is indistinguishable
/// from a missing key until the bucket itself is probed.
fn missing_object(bucket: Result<(), StorageError>) -> StorageError {
    match bucket {
        Err(StorageError::NoSuchKey | StorageError::NoSuchBucket) => StorageError::NoSuchBucket,
        _ => StorageError::NoSuchKey,
    }
}

/// In-memory request body sent in chunks, each of which is reported once polled.
struct ProgressBody {
    /// Bytes that weren't sent yet.
    remaining: Bytes,

    /// Receiver of sent chunk lengths.
    sent: UnboundedSender<u64>,
}

impl ProgressBody {
    fn new(body: Bytes, sent: UnboundedSender<u64>) -> Self {
        Self {
            remaining: body,
            sent,
        }
    }
}

impl Body for ProgressBody {
    type Data = Bytes;
    type Error = Infallible;

    fn poll_frame(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Bytes>, Infallible>>> {
        let this = self.get_mut();

        if this.remaining.is_empty() {
            return Poll::Ready(None);
        }

        let len = this.remaining.len().min(BODY_CHUNK_SIZE);
        let chunk = this.remaining.split_to(len);

        // Upload is complete once the receiver is gone.
        let _ = this.sent.send(len as u64);

        Poll::Ready(Some(Ok(Frame::data(chunk))))
    }

    fn is_end_stream(&self) -> bool {
        self.remaining.is_empty()
    }

    fn size_hint(&self) -> SizeHint {
        SizeHint::with_exact(self.remaining.len() as u64)
    }
}

/// Classify an SDK error into a [`StorageError`].
///
/// Service errors are matched by their error code, falling back to the HTTP status
/// for responses without a body (such as `HEAD` requests).
fn classify<E>(error: SdkError<E, HttpResponse>) -> StorageError
where
    E: ProvideErrorMetadata + Error + Send + Sync + 'static,
{
    let status = error.raw_response().map(|response| response.status().as_u16());

    match (error.code(), status) {
        (Some("NoSuchBucket"), _) => StorageError::NoSuchBucket,
        (Some("NoSuchKey" | "NotFound"), _) | (None, Some(404)) => StorageError::NoSuchKey,
        (Some("AccessDenied" | "AllAccessDisabled"), _) | (None, Some(403)) => {
            StorageError::AccessDenied
        }
        (
            Some("InvalidAccessKeyId" | "SignatureDoesNotMatch" | "ExpiredToken" | "InvalidToken"),
            _,
        ) => StorageError::Credentials,
        _ => {
            let message = DisplayErrorContext(&error).to_string();

            let local_failure = matches!(
                error,
                SdkError::ConstructionFailure(_) | SdkError::DispatchFailure(_)
            );

            if local_failure && message.to_lowercase().contains("credentials") {
                StorageError::Credentials
            } else {
                StorageError::Service(message)
            }
        }
    }
}
