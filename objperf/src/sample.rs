//! Measurements produced by benchmark workers.

use std::time::Duration;

/// One completed transfer: how many bytes were moved and how long the operation took.
///
/// The elapsed time covers only the storage operation itself, not time spent waiting at the start
/// barrier or on a full sample channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransferSample {
    size: u64,
    elapsed: Duration,
}

impl TransferSample {
    /// Creates a sample for a transfer of `size` bytes.
    pub fn new(size: u64, elapsed: Duration) -> Self {
        Self { size, elapsed }
    }

    /// Number of bytes moved.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Time spent in the storage operation.
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }
}

/// The result of a single storage operation, as reported by a worker.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// The operation completed.
    Transferred(TransferSample),
    /// The operation failed. It does not count towards bandwidth.
    Failed,
}
