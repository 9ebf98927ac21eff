//! A one-shot start gate for workers of a count-bounded run.
//!
//! [`start_barrier`] returns a [`StartBarrier`] held by the orchestrator and a [`StartSignal`]
//! cloned into every worker. Workers announce their arrival and block in [`StartSignal::wait`]
//! until [`StartBarrier::release`] is called, which consumes the barrier so it fires exactly once.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::{Notify, watch};

/// Creates a connected barrier and signal pair.
pub fn start_barrier() -> (StartBarrier, StartSignal) {
    let (released, receiver) = watch::channel(false);
    let arrivals = Arc::new(Arrivals::default());

    let barrier = StartBarrier {
        released,
        arrivals: Arc::clone(&arrivals),
    };
    let signal = StartSignal { receiver, arrivals };
    (barrier, signal)
}

#[derive(Debug, Default)]
struct Arrivals {
    count: AtomicUsize,
    notify: Notify,
}

/// The releasing side of the gate.
///
/// Dropping the barrier without releasing it wakes all waiting workers with a cancellation.
#[derive(Debug)]
pub struct StartBarrier {
    released: watch::Sender<bool>,
    arrivals: Arc<Arrivals>,
}

impl StartBarrier {
    /// Waits until `expected` workers are blocked in [`StartSignal::wait`].
    pub async fn ready(&self, expected: usize) {
        loop {
            let notified = self.arrivals.notify.notified();
            if self.arrivals.count.load(Ordering::Acquire) >= expected {
                return;
            }
            notified.await;
        }
    }

    /// Releases all waiting workers at once.
    pub fn release(self) {
        self.released.send_replace(true);
    }
}

/// The waiting side of the gate, cloned into every worker.
#[derive(Clone, Debug)]
pub struct StartSignal {
    receiver: watch::Receiver<bool>,
    arrivals: Arc<Arrivals>,
}

impl StartSignal {
    /// Blocks until the barrier is released.
    ///
    /// Returns `false` if the barrier was dropped without being released.
    pub async fn wait(mut self) -> bool {
        self.arrivals.count.fetch_add(1, Ordering::AcqRel);
        self.arrivals.notify.notify_one();

        self.receiver.wait_for(|released| *released).await.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::task::JoinSet;

    use super::*;

    #[tokio::test]
    async fn releases_all_waiters() {
        let (barrier, signal) = start_barrier();

        let mut waiters = JoinSet::new();
        for _ in 0..4 {
            waiters.spawn(signal.clone().wait());
        }
        drop(signal);

        barrier.ready(4).await;
        barrier.release();

        let released = waiters.join_all().await;
        assert_eq!(released, [true; 4]);
    }

    #[tokio::test(start_paused = true)]
    async fn waiters_block_until_release() {
        let (barrier, signal) = start_barrier();
        let waiter = tokio::spawn(signal.wait());

        barrier.ready(1).await;
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(!waiter.is_finished());

        barrier.release();
        assert!(waiter.await.unwrap());
    }

    #[tokio::test]
    async fn late_waiters_pass_after_release() {
        let (barrier, signal) = start_barrier();
        barrier.release();
        assert!(signal.wait().await);
    }

    #[tokio::test]
    async fn dropping_the_barrier_cancels() {
        let (barrier, signal) = start_barrier();
        let waiter = tokio::spawn(signal.wait());

        barrier.ready(1).await;
        drop(barrier);
        assert!(!waiter.await.unwrap());
    }
}
