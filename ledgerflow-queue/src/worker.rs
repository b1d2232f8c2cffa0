//! Async worker pool draining the admission queue.
//!
//! Workers poll the queue, release due retries, and run each job under
//! the configured processing timeout. The pool owns the shutdown signal:
//! `shutdown()` closes intake, lets in-flight jobs finish, then blocks
//! everything still pending.

use crate::error::{ExecuteError, ProcessingError};
use crate::job::{BlockReason, JobPayload};
use crate::queue::JobQueue;
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Executes job payloads. Implemented by the application; the queue has
/// no knowledge of what a job actually does.
#[async_trait]
pub trait JobExecutor: Send + Sync + 'static {
    /// Runs one payload to completion.
    async fn execute(&self, payload: &JobPayload) -> Result<(), ExecuteError>;
}

/// Re-checks license validity before a stale retry executes.
#[async_trait]
pub trait Revalidator: Send + Sync + 'static {
    /// Returns false when the license no longer admits work.
    async fn revalidate(&self) -> bool;
}

/// Worker pool sizing and polling cadence.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Number of concurrent worker tasks.
    pub workers: usize,
    /// Idle poll interval when the queue is empty.
    pub poll_interval_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            poll_interval_ms: 50,
        }
    }
}

/// A running pool of worker tasks bound to one [`JobQueue`].
pub struct WorkerPool {
    queue: Arc<JobQueue>,
    shutdown: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawns worker tasks onto the current tokio runtime.
    #[must_use]
    pub fn spawn(
        queue: Arc<JobQueue>,
        executor: Arc<dyn JobExecutor>,
        config: WorkerConfig,
    ) -> Self {
        Self::spawn_inner(queue, executor, None, config)
    }

    /// Like [`WorkerPool::spawn`], with a revalidation hook consulted
    /// before stale retries execute.
    #[must_use]
    pub fn spawn_with_revalidator(
        queue: Arc<JobQueue>,
        executor: Arc<dyn JobExecutor>,
        revalidator: Arc<dyn Revalidator>,
        config: WorkerConfig,
    ) -> Self {
        Self::spawn_inner(queue, executor, Some(revalidator), config)
    }

    fn spawn_inner(
        queue: Arc<JobQueue>,
        executor: Arc<dyn JobExecutor>,
        revalidator: Option<Arc<dyn Revalidator>>,
        config: WorkerConfig,
    ) -> Self {
        let (shutdown, shutdown_rx) = watch::channel(false);
        let handles = (0..config.workers.max(1))
            .map(|worker| {
                tokio::spawn(worker_loop(
                    worker,
                    Arc::clone(&queue),
                    Arc::clone(&executor),
                    revalidator.clone(),
                    shutdown_rx.clone(),
                    config.poll_interval_ms,
                ))
            })
            .collect();
        Self {
            queue,
            shutdown,
            handles,
        }
    }

    /// Graceful shutdown: stop intake, let in-flight jobs run to their
    /// outcome, then block whatever is still pending. Returns the number
    /// of pending jobs that were blocked.
    pub async fn shutdown(self) -> usize {
        self.queue.close_intake();
        let _ = self.shutdown.send(true);
        for handle in self.handles {
            let _ = handle.await;
        }
        self.queue.drain_pending_to_blocked()
    }
}

async fn worker_loop(
    worker: usize,
    queue: Arc<JobQueue>,
    executor: Arc<dyn JobExecutor>,
    revalidator: Option<Arc<dyn Revalidator>>,
    mut shutdown_rx: watch::Receiver<bool>,
    poll_interval_ms: u64,
) {
    let poll = Duration::from_millis(poll_interval_ms.max(1));
    loop {
        if *shutdown_rx.borrow() {
            break;
        }
        queue.tick_retries(Utc::now());
        let Some(job) = queue.dequeue() else {
            tokio::select! {
                _ = shutdown_rx.changed() => {}
                _ = tokio::time::sleep(poll) => {}
            }
            continue;
        };

        if job.retry_count > 0 {
            if let (Some(after_secs), Some(reval)) =
                (queue.config().revalidate_after_secs, revalidator.as_ref())
            {
                let age_secs = (Utc::now() - job.created_at).num_seconds();
                if age_secs >= after_secs && !reval.revalidate().await {
                    warn!(id = %job.id, "license revalidation failed, blocking retry");
                    queue.block_processing(job.id, BlockReason::LicenseExpired);
                    continue;
                }
            }
        }

        let timeout = Duration::from_millis(queue.config().job_timeout_ms);
        debug!(worker, id = %job.id, kind = %job.payload.kind, "executing job");
        match tokio::time::timeout(timeout, executor.execute(&job.payload)).await {
            Ok(Ok(())) => queue.complete(job.id),
            Ok(Err(err)) => queue.fail(job.id, &ProcessingError::Execution(err.to_string())),
            Err(_) => queue.fail(job.id, &ProcessingError::Timeout),
        }
    }
    debug!(worker, "worker stopped");
}
