use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Mutex;
use std::time::Duration;
use std::{fmt, io, task};

use futures_util::StreamExt;
use s3::bucket_ops::BucketConfiguration;
use s3::creds::Credentials;
use s3::error::S3Error;
use s3::{Bucket, Region};
use tokio::io::{AsyncReadExt, AsyncWrite};

use crate::common::{
    ClientError, ClientResult, ObjectKeys, PayloadReader, StorageClient, USER_AGENT,
};

/// Connection parameters for an [`S3Client`].
#[derive(Clone, Default)]
pub struct S3ClientConfig {
    /// Host and port of the service, optionally with a scheme.
    ///
    /// Without a scheme, plain `http://` is used.
    pub endpoint: String,
    /// The region sent with signed requests. MinIO accepts any value.
    pub region: String,
    /// Access key for request signing.
    pub access_key: Option<String>,
    /// Secret key for request signing.
    pub secret_key: Option<String>,
    /// Timeout applied to every request.
    pub request_timeout: Option<Duration>,
}

impl fmt::Debug for S3ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3ClientConfig")
            .field("endpoint", &self.endpoint)
            .field("region", &self.region)
            .field("access_key", &self.access_key)
            .field("secret_key", &self.secret_key.as_ref().map(|_| "[redacted]"))
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

/// A [`StorageClient`] for S3-compatible services using path-style addressing.
///
/// One [`Bucket`] handle is kept per bucket name. Its clones share the HTTP client, so connections
/// are pooled across all operations on that bucket.
pub struct S3Client {
    endpoint: String,
    region: Region,
    credentials: Credentials,
    request_timeout: Option<Duration>,
    buckets: Mutex<HashMap<String, Box<Bucket>>>,
}

impl S3Client {
    /// Creates a new client from the given connection parameters.
    pub fn new(config: S3ClientConfig) -> ClientResult<Self> {
        let credentials = Credentials::new(
            config.access_key.as_deref(),
            config.secret_key.as_deref(),
            None,
            None,
            None,
        )
        .map_err(|e| ClientError::Credentials(e.to_string()))?;

        let endpoint = endpoint_url(&config.endpoint);
        let region = Region::Custom {
            region: config.region,
            endpoint: endpoint.clone(),
        };

        Ok(Self {
            endpoint,
            region,
            credentials,
            request_timeout: config.request_timeout,
            buckets: Mutex::default(),
        })
    }

    /// Returns the shared handle for the named bucket, creating it on first use.
    fn bucket(&self, name: &str) -> ClientResult<Box<Bucket>> {
        let mut buckets = self.buckets.lock().unwrap();
        if let Some(bucket) = buckets.get(name) {
            return Ok(bucket.clone());
        }

        let bucket = self.new_bucket(name)?;
        buckets.insert(name.to_owned(), bucket.clone());
        Ok(bucket)
    }

    fn new_bucket(&self, name: &str) -> ClientResult<Box<Bucket>> {
        let invalid = |cause| s3_error(format!("invalid bucket `{name}`"), cause);

        let mut bucket = Bucket::new(name, self.region.clone(), self.credentials.clone())
            .map_err(invalid)?
            .with_path_style();
        if let Some(timeout) = self.request_timeout {
            bucket = bucket.with_request_timeout(timeout).map_err(invalid)?;
        }

        bucket.add_header("User-Agent", USER_AGENT);
        Ok(bucket)
    }
}

impl fmt::Debug for S3Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3Client")
            .field("endpoint", &self.endpoint)
            .field("request_timeout", &self.request_timeout)
            .finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl StorageClient for S3Client {
    fn name(&self) -> &'static str {
        "s3-compatible"
    }

    #[tracing::instrument(level = "trace", fields(%bucket), skip_all)]
    async fn make_bucket(&self, bucket: &str) -> ClientResult<()> {
        let result = Bucket::create_with_path_style(
            bucket,
            self.region.clone(),
            self.credentials.clone(),
            BucketConfiguration::default(),
        )
        .await;

        match result {
            Ok(response) if response.success() => {}
            Ok(response) if response.response_code == 409 => {
                tracing::debug!("Bucket already exists");
            }
            Ok(response) => {
                return Err(ClientError::Generic(format!(
                    "failed to create bucket `{bucket}`: status {}: {}",
                    response.response_code, response.response_text
                )));
            }
            Err(S3Error::HttpFailWithBody(409, _)) => {
                tracing::debug!("Bucket already exists");
            }
            Err(cause) => {
                return Err(s3_error(
                    format!("failed to create bucket `{bucket}`"),
                    cause,
                ));
            }
        }

        // Set up the shared handle now, so that the first transfer doesn't pay for it.
        self.bucket(bucket)?;
        Ok(())
    }

    #[tracing::instrument(level = "trace", fields(%bucket, %key, size), skip_all)]
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        size: u64,
        payload: PayloadReader,
    ) -> ClientResult<u64> {
        tracing::trace!("Uploading object");
        let mut reader = payload.take(size);
        let response = self
            .bucket(bucket)?
            .put_object_stream(&mut reader, key)
            .await
            .map_err(|cause| s3_error(format!("failed to put `{bucket}/{key}`"), cause))?;

        check_status(response.status_code(), bucket, key)?;
        Ok(response.uploaded_bytes() as u64)
    }

    #[tracing::instrument(level = "trace", fields(%bucket, %key, size), skip_all)]
    async fn get_object(&self, bucket: &str, key: &str, size: u64) -> ClientResult<u64> {
        if size == 0 {
            return Ok(0);
        }

        tracing::trace!("Downloading object");
        let mut sink = ByteCounter::default();
        let status = self
            .bucket(bucket)?
            .get_object_range_to_writer(key, 0, Some(size - 1), &mut sink)
            .await
            .map_err(|cause| s3_error(format!("failed to get `{bucket}/{key}`"), cause))?;

        check_status(status, bucket, key)?;
        Ok(sink.bytes)
    }

    #[tracing::instrument(level = "trace", fields(%bucket), skip_all)]
    async fn list_objects(&self, bucket: &str) -> ClientResult<ObjectKeys> {
        let pages = self
            .bucket(bucket)?
            .list(String::new(), None)
            .await
            .map_err(|cause| s3_error(format!("failed to list `{bucket}`"), cause))?;

        let keys = pages
            .into_iter()
            .flat_map(|page| page.contents)
            .map(|object| Ok(object.key));
        Ok(futures_util::stream::iter(keys).boxed())
    }

    #[tracing::instrument(level = "trace", fields(%bucket, %key), skip_all)]
    async fn remove_object(&self, bucket: &str, key: &str) -> ClientResult<()> {
        let response = self
            .bucket(bucket)?
            .delete_object(key)
            .await
            .map_err(|cause| s3_error(format!("failed to remove `{bucket}/{key}`"), cause))?;

        check_status(response.status_code(), bucket, key)
    }
}

fn s3_error(context: String, cause: S3Error) -> ClientError {
    match cause {
        S3Error::HttpFailWithBody(404, _) => ClientError::NotFound(context),
        cause => ClientError::S3 { context, cause },
    }
}

fn check_status(status: u16, bucket: &str, key: &str) -> ClientResult<()> {
    match status {
        200..=299 => Ok(()),
        404 => Err(ClientError::NotFound(format!("object `{bucket}/{key}`"))),
        status => Err(ClientError::Generic(format!(
            "unexpected status {status} for `{bucket}/{key}`"
        ))),
    }
}

/// Adds `http://` to endpoints given as bare `host:port`.
fn endpoint_url(endpoint: &str) -> String {
    if endpoint.contains("://") {
        endpoint.trim_end_matches('/').to_owned()
    } else {
        format!("http://{}", endpoint.trim_end_matches('/'))
    }
}

/// A writer that discards everything and counts the bytes written to it.
#[derive(Debug, Default)]
struct ByteCounter {
    bytes: u64,
}

impl AsyncWrite for ByteCounter {
    fn poll_write(
        mut self: Pin<&mut Self>,
        _cx: &mut task::Context<'_>,
        buf: &[u8],
    ) -> task::Poll<io::Result<usize>> {
        self.bytes += buf.len() as u64;
        task::Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut task::Context<'_>) -> task::Poll<io::Result<()>> {
        task::Poll::Ready(Ok(()))
    }

    fn poll_shutdown(
        self: Pin<&mut Self>,
        _cx: &mut task::Context<'_>,
    ) -> task::Poll<io::Result<()>> {
        task::Poll::Ready(Ok(()))
    }
}
