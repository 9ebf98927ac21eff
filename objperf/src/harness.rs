//! Runs a pool of workers and collects their outcomes into an [`AggregateResult`].
//!
//! There are two termination policies:
//!
//! - [`Harness::run_for`] keeps every worker looping over its operation and sums up all transfers
//!   that reach the collector within a fixed time window.
//! - [`Harness::run_once`] lets every worker perform its operation exactly once, all starting at
//!   the same instant, and measures the time until the last one completes.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::barrier::start_barrier;
use crate::metrics::{AggregateResult, Totals};
use crate::sample::Outcome;
use crate::worker::{self, KeyTemplate, Operation, WorkerConfig};

/// Capacity of the channel between workers and the collector.
///
/// Workers block on a full channel rather than dropping outcomes.
const OUTCOME_CHANNEL_CAPACITY: usize = 1;

/// A benchmark of one operation, object size and worker count.
#[derive(Clone, Debug)]
pub struct Harness {
    operation: Operation,
    key: KeyTemplate,
    size: u64,
    workers: usize,
}

impl Harness {
    /// Creates a harness for `workers` concurrent workers moving objects of `size` bytes.
    pub fn new(operation: Operation, key: KeyTemplate, size: u64, workers: usize) -> Self {
        Self {
            operation,
            key,
            size,
            workers,
        }
    }

    fn worker_configs(&self) -> impl Iterator<Item = WorkerConfig> + '_ {
        (0..self.workers).map(|operation_index| WorkerConfig {
            operation_index,
            size: self.size,
            key: self.key.clone(),
        })
    }

    /// Runs all workers in a loop and measures bandwidth over the given window.
    ///
    /// Once the window has elapsed, workers are cancelled and in-flight operations are aborted, so
    /// nothing is left running when this returns.
    pub async fn run_for(&self, window: Duration) -> AggregateResult {
        let (sender, mut receiver) = mpsc::channel(OUTCOME_CHANNEL_CAPACITY);
        let cancel = CancellationToken::new();

        let mut workers = JoinSet::new();
        for config in self.worker_configs() {
            workers.spawn(worker::run_loop(
                self.operation.clone(),
                config,
                sender.clone(),
                cancel.child_token(),
            ));
        }
        drop(sender);

        tracing::debug!(workers = self.workers, ?window, "measuring");
        let totals = collect_for(window, &mut receiver).await;

        cancel.cancel();
        drop(receiver);
        workers.shutdown().await;

        totals.log_latencies();
        AggregateResult::new(&totals, window, self.size, self.workers)
    }

    /// Runs every worker exactly once, released simultaneously, and measures until the last one
    /// completes.
    pub async fn run_once(&self) -> AggregateResult {
        let (barrier, signal) = start_barrier();

        let mut workers = JoinSet::new();
        for config in self.worker_configs() {
            workers.spawn(worker::run_once(
                self.operation.clone(),
                config,
                signal.clone(),
            ));
        }
        drop(signal);

        barrier.ready(self.workers).await;
        tracing::debug!(workers = self.workers, "releasing workers");

        let start = Instant::now();
        barrier.release();
        let totals = collect_all(&mut workers).await;
        let elapsed = start.elapsed();

        totals.log_latencies();
        AggregateResult::new(&totals, elapsed, self.size, self.workers)
    }
}

/// Accumulates outcomes from the channel until `window` has elapsed.
///
/// An outcome that becomes available at the same instant as the deadline is either counted or
/// not; both branches are polled in random order.
pub async fn collect_for(window: Duration, outcomes: &mut mpsc::Receiver<Outcome>) -> Totals {
    let deadline = tokio::time::sleep(window);
    tokio::pin!(deadline);

    let mut totals = Totals::default();
    loop {
        tokio::select! {
            Some(outcome) = outcomes.recv() => totals.record(outcome),
            _ = &mut deadline => break,
        }
    }
    totals
}

/// Waits for every one-shot worker to complete.
async fn collect_all(workers: &mut JoinSet<Option<Outcome>>) -> Totals {
    let mut totals = Totals::default();
    while let Some(joined) = workers.join_next().await {
        match joined {
            Ok(Some(outcome)) => totals.record(outcome),
            Ok(None) => {}
            Err(error) => {
                tracing::error!(error = &error as &dyn std::error::Error, "worker panicked");
                totals.record(Outcome::Failed);
            }
        }
    }
    totals
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use objperf_client::{InMemoryClient, StorageClient};

    use super::*;
    use crate::payload::Payload;
    use crate::sample::TransferSample;

    const MIB: u64 = 1024 * 1024;

    fn get_harness(client: &InMemoryClient, size: u64, workers: usize) -> Harness {
        client.insert("bucket", "obj", vec![0u8; size as usize]);
        let operation = Operation::get(Arc::new(client.clone()), "bucket");
        Harness::new(operation, KeyTemplate::Fixed("obj".into()), size, workers)
    }

    #[tokio::test(start_paused = true)]
    async fn duration_bounded_steady_state() {
        // 4 workers, 100ms per 1 MiB object: 40 MiB/s.
        let client = InMemoryClient::new().with_latency(Duration::from_millis(100));
        let harness = get_harness(&client, MIB, 4);

        let result = harness.run_for(Duration::from_secs(5)).await;

        assert_eq!(result.elapsed_seconds, 5.0);
        assert_eq!(result.worker_count, 4);
        assert_eq!(result.failures, 0);
        // Each worker completes 49 or 50 operations depending on the boundary sample.
        assert!((196..=200).contains(&result.operations), "{result:?}");
        assert!((result.bandwidth_mbps - 40.0).abs() <= 1.0, "{result:?}");
        assert!((result.ops_per_second - 40.0).abs() <= 1.0, "{result:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn duration_bounded_converges() {
        // 3 workers, 250ms per 2 MiB object: 24 MiB/s.
        let client = InMemoryClient::new().with_latency(Duration::from_millis(250));
        let harness = get_harness(&client, 2 * MIB, 3);

        // The boundary samples weigh less the longer the window.
        // Each worker may lose its last operation to the deadline.
        let short = harness.run_for(Duration::from_secs(2)).await;
        assert!((21..=24).contains(&short.operations), "{short:?}");
        assert!((short.bandwidth_mbps - 24.0).abs() <= 3.0 + 1e-9, "{short:?}");

        let long = harness.run_for(Duration::from_secs(60)).await;
        assert!((717..=720).contains(&long.operations), "{long:?}");
        assert!((long.bandwidth_mbps - 24.0).abs() <= 0.1 + 1e-9, "{long:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn duration_bounded_excludes_failures() {
        let client = InMemoryClient::new().with_latency(Duration::from_millis(100));
        let harness = get_harness(&client, MIB, 1);
        client.inject_failures(5);

        let result = harness.run_for(Duration::from_millis(1050)).await;

        assert_eq!(result.failures, 5);
        assert_eq!(result.operations, 5);
        assert!((result.bandwidth_mbps - 5.0 / 1.05).abs() < 1e-9, "{result:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn duration_bounded_cancels_workers() {
        let client = InMemoryClient::new().with_latency(Duration::from_millis(100));
        client.make_bucket("bucket").await.unwrap();
        let operation = Operation::put(Arc::new(client.clone()), "bucket", Payload::Random(0));
        let harness = Harness::new(operation, KeyTemplate::PerIteration("obj".into()), 16, 2);

        harness.run_for(Duration::from_secs(1)).await;
        let written = client.object_count("bucket").unwrap();

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(client.object_count("bucket").unwrap(), written);
    }

    #[tokio::test(start_paused = true)]
    async fn sample_at_deadline_is_counted_at_most_once() {
        let window = Duration::from_secs(1);
        let (sender, mut receiver) = mpsc::channel(1);

        tokio::spawn(async move {
            tokio::time::sleep(window).await;
            let sample = TransferSample::new(MIB, window);
            sender.send(Outcome::Transferred(sample)).await.ok();
        });

        let totals = collect_for(window, &mut receiver).await;
        assert!(
            (totals.operations() == 0 && totals.bytes() == 0)
                || (totals.operations() == 1 && totals.bytes() == MIB)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn collector_outlives_closed_channel() {
        let (sender, mut receiver) = mpsc::channel::<Outcome>(1);
        drop(sender);

        let start = Instant::now();
        let totals = collect_for(Duration::from_secs(3), &mut receiver).await;
        assert!(start.elapsed() >= Duration::from_secs(3));
        assert_eq!(totals.operations(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn count_bounded_exact() {
        // 10 workers moving 1 MiB each, all finishing after 2 seconds.
        let client = InMemoryClient::new().with_latency(Duration::from_secs(2));
        let harness = get_harness(&client, MIB, 10);

        let result = harness.run_once().await;

        assert_eq!(result.operations, 10);
        assert_eq!(result.failures, 0);
        assert!((result.elapsed_seconds - 2.0).abs() < 1e-3, "{result:?}");
        let expected = 10.0 / result.elapsed_seconds;
        assert!((result.bandwidth_mbps - expected).abs() < 1e-9);
        assert!((result.ops_per_second - expected).abs() < 1e-9);
    }

    #[tokio::test(start_paused = true)]
    async fn count_bounded_single_worker() {
        let client = InMemoryClient::new().with_latency(Duration::from_millis(500));
        let harness = get_harness(&client, 3 * MIB, 1);

        let result = harness.run_once().await;

        assert_eq!(result.operations, 1);
        assert!((result.bandwidth_mbps - 6.0).abs() < 0.1, "{result:?}");
        assert!((result.ops_per_second - 2.0).abs() < 0.1, "{result:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn count_bounded_excludes_failures() {
        let client = InMemoryClient::new().with_latency(Duration::from_secs(1));
        let harness = get_harness(&client, MIB, 4);
        client.inject_failures(1);

        let result = harness.run_once().await;

        assert_eq!(result.operations, 3);
        assert_eq!(result.failures, 1);
        assert!((result.bandwidth_mbps - 3.0 / result.elapsed_seconds).abs() < 1e-9);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn count_bounded_on_multiple_threads() {
        let client = InMemoryClient::new().with_latency(Duration::from_millis(20));
        let harness = get_harness(&client, 1024, 16);

        let result = harness.run_once().await;

        assert_eq!(result.operations, 16);
        assert!(result.elapsed_seconds >= 0.02);
        assert!(result.bandwidth_mbps > 0.0);
    }
}
