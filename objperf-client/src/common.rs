use std::fmt::Debug;
use std::pin::Pin;
use std::sync::Arc;

use futures_util::stream::BoxStream;
use thiserror::Error;
use tokio::io::AsyncRead;

/// User agent string used for outgoing requests.
pub const USER_AGENT: &str = concat!("objperf/", env!("CARGO_PKG_VERSION"));

/// A type-erased, shareable [`StorageClient`] instance.
pub type BoxedClient = Arc<dyn StorageClient>;

/// The contents of an object that is being uploaded.
pub type PayloadReader = Pin<Box<dyn AsyncRead + Send>>;

/// A lazy sequence of object keys, as returned by [`StorageClient::list_objects`].
pub type ObjectKeys = BoxStream<'static, ClientResult<String>>;

/// The operations the benchmarks issue against an object store.
#[async_trait::async_trait]
pub trait StorageClient: Debug + Send + Sync + 'static {
    /// The client name, used for diagnostics.
    fn name(&self) -> &'static str;

    /// Creates the bucket.
    ///
    /// This is idempotent: a bucket that already exists is not an error.
    async fn make_bucket(&self, bucket: &str) -> ClientResult<()>;

    /// Uploads `size` bytes read from `payload` to the given key.
    ///
    /// Returns the number of bytes uploaded.
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        size: u64,
        payload: PayloadReader,
    ) -> ClientResult<u64>;

    /// Downloads at most the first `size` bytes of the object at the given key and discards them.
    ///
    /// Returns the number of bytes received, which is less than `size` if the object is shorter.
    async fn get_object(&self, bucket: &str, key: &str, size: u64) -> ClientResult<u64>;

    /// Lists all keys in the bucket.
    async fn list_objects(&self, bucket: &str) -> ClientResult<ObjectKeys>;

    /// Removes the object at the given key.
    async fn remove_object(&self, bucket: &str, key: &str) -> ClientResult<()>;
}

/// Errors returned by a [`StorageClient`].
#[derive(Debug, Error)]
pub enum ClientError {
    /// IO errors related to payload streaming.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Errors from the S3 client, covering both network failures and error responses.
    #[error("s3 error: {context}")]
    S3 {
        /// What the client was doing when the error occurred.
        context: String,
        /// The underlying error.
        #[source]
        cause: s3::error::S3Error,
    },

    /// The configured credentials were rejected before sending any request.
    #[error("invalid credentials: {0}")]
    Credentials(String),

    /// The bucket or object does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Any other error, for example one injected by the [`InMemoryClient`](crate::InMemoryClient).
    #[error("storage error: {0}")]
    Generic(String),
}

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;
