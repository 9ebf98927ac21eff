//! Benchmark workers, each repeatedly issuing one storage operation.

use std::fmt;
use std::sync::Arc;

use objperf_client::{BoxedClient, ClientResult};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::barrier::StartSignal;
use crate::payload::Payload;
use crate::sample::{Outcome, TransferSample};

/// Naming scheme for the objects touched by workers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum KeyTemplate {
    /// All workers use the same key.
    Fixed(String),
    /// Each worker uses its own key, `<prefix>.<worker>`.
    PerWorker(String),
    /// Each operation of each worker uses a fresh key, `<prefix>.<worker>.<iteration>`.
    PerIteration(String),
}

impl KeyTemplate {
    /// Renders the key for the given worker and iteration.
    pub fn render(&self, worker: usize, iteration: u64) -> String {
        match self {
            KeyTemplate::Fixed(key) => key.clone(),
            KeyTemplate::PerWorker(prefix) => format!("{prefix}.{worker}"),
            KeyTemplate::PerIteration(prefix) => format!("{prefix}.{worker}.{iteration}"),
        }
    }
}

/// Parameters of a single worker, fixed at spawn time.
#[derive(Clone, Debug)]
pub struct WorkerConfig {
    /// Index of the worker within its run.
    pub operation_index: usize,
    /// Size of every object moved by this worker.
    pub size: u64,
    /// Naming scheme for the objects.
    pub key: KeyTemplate,
}

#[derive(Clone)]
enum Kind {
    Get,
    Put(Payload),
}

/// A storage operation bound to a client and bucket.
#[derive(Clone)]
pub struct Operation {
    client: BoxedClient,
    bucket: Arc<str>,
    kind: Kind,
}

impl Operation {
    /// Downloads objects and discards their contents.
    pub fn get(client: BoxedClient, bucket: &str) -> Self {
        Self {
            client,
            bucket: bucket.into(),
            kind: Kind::Get,
        }
    }

    /// Uploads objects read from the given payload.
    pub fn put(client: BoxedClient, bucket: &str, payload: Payload) -> Self {
        Self {
            client,
            bucket: bucket.into(),
            kind: Kind::Put(payload),
        }
    }

    /// Issues the storage call and times it.
    ///
    /// Opening the payload happens before the clock starts.
    async fn perform(&self, key: &str, size: u64) -> ClientResult<TransferSample> {
        let (bytes, elapsed) = match &self.kind {
            Kind::Get => {
                let start = Instant::now();
                let bytes = self.client.get_object(&self.bucket, key, size).await?;
                (bytes, start.elapsed())
            }
            Kind::Put(payload) => {
                let reader = payload.reader(size).await?;
                let start = Instant::now();
                let bytes = self.client.put_object(&self.bucket, key, size, reader).await?;
                (bytes, start.elapsed())
            }
        };
        Ok(TransferSample::new(bytes, elapsed))
    }

    /// Performs the operation once and times it.
    ///
    /// Failures are logged and reported as [`Outcome::Failed`]. So are transfers that moved fewer
    /// bytes than the configured object size.
    pub async fn transfer(&self, config: &WorkerConfig, iteration: u64) -> Outcome {
        let key = config.key.render(config.operation_index, iteration);

        match self.perform(&key, config.size).await {
            Ok(sample) if sample.size() == config.size => Outcome::Transferred(sample),
            Ok(sample) => {
                tracing::warn!(
                    worker = config.operation_index,
                    %key,
                    expected = config.size,
                    transferred = sample.size(),
                    "incomplete transfer"
                );
                Outcome::Failed
            }
            Err(error) => {
                tracing::warn!(
                    error = &error as &dyn std::error::Error,
                    worker = config.operation_index,
                    %key,
                    "operation failed"
                );
                Outcome::Failed
            }
        }
    }
}

impl fmt::Debug for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            Kind::Get => "get",
            Kind::Put(_) => "put",
        };
        f.debug_struct("Operation")
            .field("client", &self.client.name())
            .field("bucket", &self.bucket)
            .field("kind", &kind)
            .finish()
    }
}

/// Repeats the operation until cancelled, sending every outcome to the collector.
///
/// Sending blocks while the collector is busy. The loop also ends once the collector has gone away.
pub async fn run_loop(
    operation: Operation,
    config: WorkerConfig,
    outcomes: mpsc::Sender<Outcome>,
    cancel: CancellationToken,
) {
    for iteration in 0u64.. {
        let outcome = tokio::select! {
            _ = cancel.cancelled() => return,
            outcome = operation.transfer(&config, iteration) => outcome,
        };

        if outcomes.send(outcome).await.is_err() {
            return;
        }
    }
}

/// Waits for the start signal, then performs the operation exactly once.
///
/// Returns `None` if the run was cancelled before the signal was given.
pub async fn run_once(
    operation: Operation,
    config: WorkerConfig,
    start: StartSignal,
) -> Option<Outcome> {
    if !start.wait().await {
        return None;
    }
    Some(operation.transfer(&config, 0).await)
}
