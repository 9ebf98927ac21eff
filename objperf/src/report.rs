//! Result lines printed to stdout.
//!
//! Field names and units match what existing tooling around these benchmarks parses, so they must
//! not change: sizes in bytes, bandwidth in `MBps` (MiB per second) and times in seconds.

use std::fmt;

use serde::Serialize;

use crate::metrics::AggregateResult;

/// Report of a count-bounded run, where every worker performed one operation.
#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CountReport {
    /// Object size in bytes.
    pub obj_size: u64,
    /// Number of parallel operations.
    pub thread_count: usize,
    /// Seconds from releasing the workers until the last one finished.
    pub delta: f64,
    /// Bandwidth in MiB per second.
    pub bandwidth: f64,
    /// Completed objects per second.
    pub objs_per_sec: f64,
}

impl From<&AggregateResult> for CountReport {
    fn from(result: &AggregateResult) -> Self {
        Self {
            obj_size: result.object_size_bytes,
            thread_count: result.worker_count,
            delta: result.elapsed_seconds,
            bandwidth: result.bandwidth_mbps,
            objs_per_sec: result.ops_per_second,
        }
    }
}

/// Report of a duration-bounded run.
#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct DurationReport {
    /// Object size in bytes.
    pub obj_size: u64,
    /// Number of concurrent workers.
    pub thread_count: usize,
    /// Length of the measurement window in whole seconds.
    pub duration: u64,
    /// Bandwidth in MiB per second.
    pub bandwidth: f64,
    /// Completed objects per second.
    pub objs_per_sec: f64,
}

impl From<&AggregateResult> for DurationReport {
    fn from(result: &AggregateResult) -> Self {
        Self {
            obj_size: result.object_size_bytes,
            thread_count: result.worker_count,
            duration: result.elapsed_seconds.round() as u64,
            bandwidth: result.bandwidth_mbps,
            objs_per_sec: result.ops_per_second,
        }
    }
}

/// The plain `bandwidth <value> MBps` line of the cached read benchmark.
#[derive(Debug)]
pub struct BandwidthLine(pub f64);

impl fmt::Display for BandwidthLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bandwidth {} MBps", self.0)
    }
}
