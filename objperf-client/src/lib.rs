//! Storage clients used by the `objperf` benchmarks.
//!
//! The benchmarks only need a handful of operations from an object store: creating a bucket,
//! uploading and downloading whole objects, listing keys and removing objects. These are captured
//! by the [`StorageClient`] trait, which has two implementations:
//!
//! - [`S3Client`] talks to any S3-compatible service (MinIO in particular) over plain HTTP.
//! - [`InMemoryClient`] keeps objects in a `HashMap` and can simulate latency and failures. It is
//!   used by the tests of the measurement harness.
#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

mod common;
mod in_memory;
mod s3_compatible;

pub use common::{
    BoxedClient, ClientError, ClientResult, ObjectKeys, PayloadReader, StorageClient, USER_AGENT,
};
pub use in_memory::InMemoryClient;
pub use s3_compatible::{S3Client, S3ClientConfig};
