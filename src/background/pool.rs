//! Bounded worker pool for fire-and-forget background tasks.
//!
//! Tasks go through a bounded queue to a fixed set of workers. Submitting to
//! a full (or shut down) pool is rejected rather than awaited, so the
//! request path never blocks on background work. Every task runs under its
//! own timeout and is detached from the submitting request: dropping the
//! request does not cancel its tasks.
//!
//! # Usage
//!
//! ```ignore
//! let pool = TaskPool::new(4, 256, Duration::from_secs(15));
//! pool.submit("enhance", async move { enhancer.enhance(&group).await.map(|_| ()) });
//! pool.shutdown().await;
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::Result;

type Job = Pin<Box<dyn Future<Output = Result<()>> + Send + 'static>>;

struct Task {
    name: String,
    job: Job,
}

/// Counters exposed by [`TaskPool::stats`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub submitted: u64,
    pub completed: u64,
    pub failed: u64,
    pub timed_out: u64,
    pub rejected: u64,
}

impl PoolStats {
    /// Accepted tasks that have not finished yet.
    pub fn pending(&self) -> u64 {
        self.submitted
            .saturating_sub(self.completed + self.failed + self.timed_out)
    }
}

#[derive(Debug, Default)]
struct Counters {
    submitted: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    timed_out: AtomicU64,
    rejected: AtomicU64,
}

/// Fixed-size pool of background workers.
pub struct TaskPool {
    sender: Mutex<Option<mpsc::Sender<Task>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    counters: Arc<Counters>,
}

impl TaskPool {
    /// Spawn `workers` workers behind a queue of `capacity` tasks.
    ///
    /// Must be called inside a tokio runtime.
    pub fn new(workers: usize, capacity: usize, task_timeout: Duration) -> Self {
        let (sender, receiver) = mpsc::channel::<Task>(capacity.max(1));
        let receiver = Arc::new(tokio::sync::Mutex::new(receiver));
        let counters = Arc::new(Counters::default());

        let handles = (0..workers.max(1))
            .map(|id| {
                let receiver = Arc::clone(&receiver);
                let counters = Arc::clone(&counters);
                tokio::spawn(async move {
                    run_worker(id, receiver, counters, task_timeout).await;
                })
            })
            .collect();

        Self {
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(handles),
            counters,
        }
    }

    /// Queue a task. Returns false if the queue is full or closed.
    pub fn submit<F>(&self, name: &str, job: F) -> bool
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        let guard = self.sender.lock();
        let Some(sender) = guard.as_ref() else {
            self.counters.rejected.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(target: "background", "Pool closed, dropping {}", name);
            return false;
        };

        let task = Task {
            name: name.to_string(),
            job: Box::pin(job),
        };
        match sender.try_send(task) {
            Ok(()) => {
                self.counters.submitted.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(e) => {
                self.counters.rejected.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(target: "background", "Rejected task {}: {}", name, e);
                false
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.sender.lock().is_none()
    }

    pub fn stats(&self) -> PoolStats {
        let c = &self.counters;
        PoolStats {
            submitted: c.submitted.load(Ordering::Relaxed),
            completed: c.completed.load(Ordering::Relaxed),
            failed: c.failed.load(Ordering::Relaxed),
            timed_out: c.timed_out.load(Ordering::Relaxed),
            rejected: c.rejected.load(Ordering::Relaxed),
        }
    }

    /// Stop accepting tasks, let the workers drain the queue, and wait for
    /// every worker to exit.
    pub async fn shutdown(&self) {
        drop(self.sender.lock().take());
        let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.workers.lock());
        for handle in handles {
            if let Err(e) = handle.await {
                tracing::error!(target: "background", "Worker panicked: {}", e);
            }
        }
        tracing::debug!(target: "background", "Pool shut down: {:?}", self.stats());
    }
}

async fn run_worker(
    id: usize,
    receiver: Arc<tokio::sync::Mutex<mpsc::Receiver<Task>>>,
    counters: Arc<Counters>,
    task_timeout: Duration,
) {
    loop {
        let next = receiver.lock().await.recv().await;
        let Some(task) = next else {
            break;
        };

        match tokio::time::timeout(task_timeout, task.job).await {
            Ok(Ok(())) => {
                counters.completed.fetch_add(1, Ordering::Relaxed);
            }
            Ok(Err(e)) => {
                counters.failed.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(target: "background", "Task {} failed: {}", task.name, e);
            }
            Err(_) => {
                counters.timed_out.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    target: "background",
                    "Task {} timed out after {:?}",
                    task.name,
                    task_timeout
                );
            }
        }
    }
    tracing::trace!(target: "background", "Worker {} stopped", id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, SourceError};

    const TIMEOUT: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn test_runs_submitted_tasks() {
        let pool = TaskPool::new(2, 16, TIMEOUT);
        let hits = Arc::new(AtomicU64::new(0));

        for _ in 0..10 {
            let hits = Arc::clone(&hits);
            assert!(pool.submit("count", async move {
                hits.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }));
        }
        pool.shutdown().await;

        assert_eq!(hits.load(Ordering::SeqCst), 10);
        let stats = pool.stats();
        assert_eq!(stats.submitted, 10);
        assert_eq!(stats.completed, 10);
        assert_eq!(stats.pending(), 0);
    }

    #[tokio::test]
    async fn test_failures_and_timeouts_are_counted() {
        let pool = TaskPool::new(1, 4, Duration::from_millis(20));

        pool.submit("fails", async { Err(Error::Source(SourceError::NotFound)) });
        pool.submit("hangs", async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        });
        pool.shutdown().await;

        let stats = pool.stats();
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.timed_out, 1);
    }

    #[tokio::test]
    async fn test_full_queue_rejects() {
        let pool = TaskPool::new(1, 1, TIMEOUT);
        let (release, gate) = tokio::sync::oneshot::channel::<()>();

        // Occupies the single worker until released.
        pool.submit("blocker", async move {
            let _ = gate.await;
            Ok(())
        });
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(pool.submit("queued", async { Ok(()) }));
        assert!(!pool.submit("overflow", async { Ok(()) }));
        assert_eq!(pool.stats().rejected, 1);

        let _ = release.send(());
        pool.shutdown().await;
        assert_eq!(pool.stats().completed, 2);
    }

    #[tokio::test]
    async fn test_submit_after_shutdown_is_rejected() {
        let pool = TaskPool::new(1, 4, TIMEOUT);
        pool.shutdown().await;

        assert!(pool.is_closed());
        assert!(!pool.submit("late", async { Ok(()) }));
        assert_eq!(pool.stats().rejected, 1);
    }

    #[tokio::test]
    async fn test_repeated_rounds_leave_nothing_behind() {
        let token = Arc::new(());

        for _ in 0..20 {
            let pool = TaskPool::new(3, 8, TIMEOUT);
            for _ in 0..8 {
                let token = Arc::clone(&token);
                pool.submit("round", async move {
                    tokio::task::yield_now().await;
                    drop(token);
                    Ok(())
                });
            }
            pool.shutdown().await;
            assert_eq!(pool.stats().pending(), 0);
        }

        // Every task future, run or rejected, has been dropped.
        assert_eq!(Arc::strong_count(&token), 1);
    }
}
