//! Bounded concurrency for in-flight handler invocations, and tracking of
//! the tasks that run them so shutdown can wait for them to drain.
//!
//! A counting semaphore sized to the configured worker count provides the
//! backpressure a fixed-size thread pool would give a synchronous server.
//! Listener tasks acquire a permit before spawning a job and hold it for
//! the job's full lifetime, including sending the reply. Every spawned
//! job is also registered with a [`JobTracker`] so the supervisor can
//! await them instead of letting them run unsupervised in the background.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;

#[derive(Clone)]
pub(crate) struct WorkerPool {
    semaphore: Arc<Semaphore>,
}

impl WorkerPool {
    pub(crate) fn new(workers: usize) -> Self {
        WorkerPool { semaphore: Arc::new(Semaphore::new(workers.max(1))) }
    }

    /// Waits for a free slot. Hold the returned permit for as long as the
    /// job runs; dropping it returns the slot to the pool.
    pub(crate) async fn acquire(&self) -> OwnedSemaphorePermit {
        Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .expect("worker pool semaphore is never closed")
    }
}

/// Tracks every spawned per-datagram handler job in a shared [`JoinSet`]
/// so the supervisor can drain them on shutdown instead of dropping them
/// in flight when the listener tasks that spawned them exit.
#[derive(Clone)]
pub(crate) struct JobTracker {
    jobs: Arc<Mutex<JoinSet<()>>>,
}

impl JobTracker {
    pub(crate) fn new() -> Self {
        JobTracker { jobs: Arc::new(Mutex::new(JoinSet::new())) }
    }

    /// Registers `fut` as a tracked job. The job still runs in the
    /// background; only bookkeeping happens here.
    pub(crate) async fn spawn<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.jobs.lock().await.spawn(fut);
    }

    /// Waits for every tracked job to finish, logging panics.
    pub(crate) async fn drain(&self) {
        let mut jobs = self.jobs.lock().await;
        while let Some(result) = jobs.join_next().await {
            if let Err(e) = result {
                tracing::error!(error = %e, "handler job panicked");
            }
        }
    }

    /// Force-aborts every tracked job still running.
    pub(crate) async fn abort_all(&self) {
        self.jobs.lock().await.abort_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn limits_concurrent_permits_to_worker_count() {
        let pool = WorkerPool::new(2);
        let a = pool.acquire().await;
        let b = pool.acquire().await;

        let pool2 = pool.clone();
        let third = tokio::spawn(async move { pool2.acquire().await });

        tokio::task::yield_now().await;
        assert!(!third.is_finished());

        drop(a);
        let _c = third.await.unwrap();
        drop(b);
    }

    #[tokio::test]
    async fn drain_waits_for_spawned_jobs() {
        use std::sync::atomic::{AtomicBool, Ordering};

        let tracker = JobTracker::new();
        let done = Arc::new(AtomicBool::new(false));
        let done_clone = Arc::clone(&done);

        tracker
            .spawn(async move {
                tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                done_clone.store(true, Ordering::SeqCst);
            })
            .await;

        tracker.drain().await;
        assert!(done.load(Ordering::SeqCst));
    }
}
