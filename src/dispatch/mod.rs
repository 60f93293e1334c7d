//! Bounded pool for blocking model work
//!
//! Async callers hand a closure to [`WorkDispatcher::run`] and await its result;
//! the closure runs on a blocking thread once one of the worker slots is free.
//! Waiting submissions are admitted in FIFO order.

pub mod speech;

pub use speech::{SpeechService, SynthesisOutput};

use crate::config::schema::WorkerConfig;
use crate::error::{Result, VoiceError};
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Fixed set of worker slots for blocking jobs
#[derive(Debug)]
pub struct WorkDispatcher {
    slots: Arc<Semaphore>,
    workers: usize,
    max_queue: Option<usize>,
    queued: Arc<AtomicUsize>,
}

/// Decrements the queued count when a submission stops waiting
struct QueueTicket(Arc<AtomicUsize>);

impl Drop for QueueTicket {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl WorkDispatcher {
    /// Create a dispatcher with `workers` slots and an optional queue bound
    #[must_use]
    pub fn new(workers: usize, max_queue: Option<usize>) -> Self {
        let workers = workers.max(1);
        tracing::info!(
            "Work dispatcher: {workers} workers, queue {}",
            max_queue.map_or_else(|| "unbounded".to_string(), |n| format!("bounded at {n}"))
        );

        Self {
            slots: Arc::new(Semaphore::new(workers)),
            workers,
            max_queue,
            queued: Arc::new(AtomicUsize::new(0)),
        }
    }

    #[must_use]
    pub fn from_config(config: &WorkerConfig) -> Self {
        Self::new(config.resolved_threads(), config.max_queue)
    }

    /// Run `job` on a worker and await its result
    ///
    /// The slot is held until `job` returns, even if the caller stops waiting.
    /// Fails with `Overloaded` when the queue is bounded and full.
    pub async fn run<T, F>(&self, job: F) -> Result<T>
    where
        F: FnOnce() -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let ticket = self.enqueue()?;

        let permit = Arc::clone(&self.slots)
            .acquire_owned()
            .await
            .map_err(|_| VoiceError::Other("work dispatcher is shut down".to_string()))?;
        drop(ticket);

        let task = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            job()
        });

        task.await
            .map_err(|e| VoiceError::Other(format!("worker task failed: {e}")))?
    }

    fn enqueue(&self) -> Result<QueueTicket> {
        let waiting = self.queued.fetch_add(1, Ordering::SeqCst);
        let ticket = QueueTicket(Arc::clone(&self.queued));

        if let Some(limit) = self.max_queue {
            // Only count as queued if no slot is free right now
            if waiting >= limit && self.slots.available_permits() == 0 {
                tracing::warn!("Rejecting job: {waiting} already queued");
                return Err(VoiceError::Overloaded { limit });
            }
        }

        Ok(ticket)
    }

    #[must_use]
    pub fn stats(&self) -> DispatcherStats {
        let available = self.slots.available_permits();
        DispatcherStats {
            workers: self.workers,
            busy: self.workers.saturating_sub(available),
            queued: self.queued.load(Ordering::SeqCst),
        }
    }
}

/// Point-in-time view of the dispatcher
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DispatcherStats {
    pub workers: usize,
    pub busy: usize,
    pub queued: usize,
}

impl DispatcherStats {
    /// Get the utilization ratio (0.0 to 1.0)
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn utilization(&self) -> f32 {
        if self.workers == 0 {
            0.0
        } else {
            self.busy as f32 / self.workers as f32
        }
    }
}

impl fmt::Display for DispatcherStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Workers: {}/{} busy ({:.1}% utilization), {} queued",
            self.busy,
            self.workers,
            self.utilization() * 100.0,
            self.queued
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_run_returns_job_result() {
        let dispatcher = WorkDispatcher::new(2, None);
        let value = dispatcher.run(|| Ok(21 * 2)).await.unwrap();
        assert_eq!(value, 42);
    }

    #[tokio::test]
    async fn test_run_propagates_job_error() {
        let dispatcher = WorkDispatcher::new(2, None);
        let err = dispatcher
            .run::<(), _>(|| Err(VoiceError::Synthesis("boom".to_string())))
            .await
            .unwrap_err();
        assert!(matches!(err, VoiceError::Synthesis(_)));
    }

    #[tokio::test]
    async fn test_panicking_job_is_an_error() {
        let dispatcher = WorkDispatcher::new(2, None);
        let result = dispatcher.run::<(), _>(|| panic!("model crashed")).await;
        assert!(result.is_err());
        assert_eq!(dispatcher.stats().busy, 0);
    }

    #[tokio::test]
    async fn test_zero_workers_clamped() {
        let dispatcher = WorkDispatcher::new(0, None);
        assert_eq!(dispatcher.stats().workers, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_bounded_queue_rejects_when_full() {
        let dispatcher = Arc::new(WorkDispatcher::new(1, Some(1)));
        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();

        // Occupy the only slot
        let busy = {
            let dispatcher = Arc::clone(&dispatcher);
            tokio::spawn(async move {
                dispatcher
                    .run(move || {
                        release_rx.recv().ok();
                        Ok(())
                    })
                    .await
            })
        };
        while dispatcher.stats().busy == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        // One waiter fits in the queue
        let waiting = {
            let dispatcher = Arc::clone(&dispatcher);
            tokio::spawn(async move { dispatcher.run(|| Ok(())).await })
        };
        while dispatcher.stats().queued == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let rejected = dispatcher.run(|| Ok(())).await;
        assert!(matches!(rejected, Err(VoiceError::Overloaded { limit: 1 })));

        release_tx.send(()).unwrap();
        busy.await.unwrap().unwrap();
        waiting.await.unwrap().unwrap();
        assert_eq!(dispatcher.stats().queued, 0);
    }

    #[test]
    fn test_stats_display() {
        let stats = DispatcherStats {
            workers: 4,
            busy: 1,
            queued: 3,
        };
        assert_eq!(
            stats.to_string(),
            "Workers: 1/4 busy (25.0% utilization), 3 queued"
        );
    }
}
