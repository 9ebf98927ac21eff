//! Throughput micro-benchmarks for S3-compatible object stores.
//!
//! There are four benchmarks, each shipped as its own binary:
//!
//! - `perf-get-cached` downloads a single object from many workers for a fixed duration, so the
//!   storage service serves it from its cache.
//! - `perf-get-uncached` downloads one distinct object per worker, all started at once.
//! - `perf-put-cached` uploads one object per worker, all started at once.
//! - `perf-put-uncached` uploads fresh objects from many workers for a fixed duration.
//!
//! All of them are built on the same [`Harness`], which spawns the workers and aggregates their
//! transfers into an [`AggregateResult`]. Bandwidth is always the total number of transferred
//! bytes divided by the elapsed time, so that concurrent transfers are accounted for correctly.
//! Failed operations are logged and excluded from the result.
#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

pub mod barrier;
pub mod bench;
pub mod cleanup;
pub mod cli;
pub mod config;
pub mod harness;
pub mod metrics;
pub mod observability;
pub mod payload;
pub mod report;
pub mod sample;
pub mod worker;

pub use crate::harness::Harness;
pub use crate::metrics::AggregateResult;
