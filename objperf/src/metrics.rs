//! Aggregation of [`Outcome`]s into the numbers reported by a benchmark run.

use std::fmt;
use std::time::Duration;

use bytesize::ByteSize;
use sketches_ddsketch::DDSketch;

use crate::sample::Outcome;

/// Bytes per MiB. Bandwidth is reported in MiB/s, labelled `MBps` for compatibility.
pub const MIB: f64 = 1024.0 * 1024.0;

/// Running totals of a benchmark run, fed by a collector.
#[derive(Default)]
pub struct Totals {
    bytes: u64,
    operations: u64,
    failures: u64,
    latency: DDSketch,
}

impl fmt::Debug for Totals {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Totals")
            .field("bytes", &self.bytes)
            .field("operations", &self.operations)
            .field("failures", &self.failures)
            .finish_non_exhaustive()
    }
}

impl Totals {
    /// Accounts for one worker outcome.
    pub fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Transferred(sample) => {
                self.bytes += sample.size();
                self.operations += 1;
                self.latency.add(sample.elapsed().as_secs_f64());
            }
            Outcome::Failed => self.failures += 1,
        }
    }

    /// Total bytes of all successful operations.
    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    /// Number of successful operations.
    pub fn operations(&self) -> u64 {
        self.operations
    }

    /// Number of failed operations.
    pub fn failures(&self) -> u64 {
        self.failures
    }

    /// Logs the latency distribution of successful operations.
    pub fn log_latencies(&self) {
        let sketch = &self.latency;
        if sketch.count() == 0 {
            tracing::info!(failures = self.failures, "no operation completed");
            return;
        }

        let quantile = |q| {
            let secs = sketch.quantile(q).ok().flatten().unwrap_or_default();
            Duration::from_secs_f64(secs)
        };
        let avg = sketch.sum().unwrap_or_default() / sketch.count() as f64;

        tracing::info!(
            operations = self.operations,
            failures = self.failures,
            transferred = %ByteSize::b(self.bytes),
            avg = ?Duration::from_secs_f64(avg),
            p50 = ?quantile(0.5),
            p90 = ?quantile(0.9),
            p99 = ?quantile(0.99),
            "operation latencies"
        );
    }
}

/// The outcome of one benchmark run.
#[derive(Clone, Debug, PartialEq)]
pub struct AggregateResult {
    /// Total bytes of successful operations per second, in MiB.
    pub bandwidth_mbps: f64,
    /// Successful operations per second.
    pub ops_per_second: f64,
    /// The span over which bandwidth was measured.
    pub elapsed_seconds: f64,
    /// Configured size of every object.
    pub object_size_bytes: u64,
    /// Number of concurrent workers.
    pub worker_count: usize,
    /// Number of successful operations.
    pub operations: u64,
    /// Number of failed operations, excluded from bandwidth.
    pub failures: u64,
}

impl AggregateResult {
    /// Computes bandwidth and operation rate of `totals` over `elapsed`.
    ///
    /// Bandwidth is always the sum of transferred bytes divided by the elapsed time, so
    /// overlapping transfers are accounted for correctly. A zero elapsed time yields zero rates.
    pub fn new(totals: &Totals, elapsed: Duration, object_size: u64, worker_count: usize) -> Self {
        let secs = elapsed.as_secs_f64();
        Self {
            bandwidth_mbps: per_second(totals.bytes as f64, secs) / MIB,
            ops_per_second: per_second(totals.operations as f64, secs),
            elapsed_seconds: secs,
            object_size_bytes: object_size,
            worker_count,
            operations: totals.operations,
            failures: totals.failures,
        }
    }
}

fn per_second(amount: f64, secs: f64) -> f64 {
    if secs > 0.0 { amount / secs } else { 0.0 }
}
