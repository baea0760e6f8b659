//! Worker pool for blocking jobs.
//!
//! The bot runs on a single-threaded event loop. Downloads and encodes are
//! long, blocking operations, so they are submitted here and the calling
//! task suspends on the job's completion handle while other chats keep
//! being served.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::debug;

/// Errors surfaced by the pool itself (never by the job's own logic).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WorkerError {
    #[error("worker job '{job}' panicked")]
    Panicked { job: &'static str },

    #[error("worker job '{job}' was cancelled")]
    Cancelled { job: &'static str },

    #[error("worker pool is closed")]
    Closed,
}

/// Submits blocking work to tokio's blocking thread pool, optionally capping
/// how many jobs run at once.
#[derive(Debug, Clone, Default)]
pub struct WorkerPool {
    limit: Option<Arc<Semaphore>>,
}

impl WorkerPool {
    /// A pool that starts every job immediately.
    pub fn unbounded() -> Self {
        Self { limit: None }
    }

    /// A pool that runs at most `max_jobs` jobs at a time (minimum 1).
    pub fn bounded(max_jobs: usize) -> Self {
        Self {
            limit: Some(Arc::new(Semaphore::new(max_jobs.max(1)))),
        }
    }

    pub fn from_limit(max_jobs: Option<usize>) -> Self {
        match max_jobs {
            Some(n) => Self::bounded(n),
            None => Self::unbounded(),
        }
    }

    /// Run `work` on a worker thread and wait for its result.
    pub async fn run<F, T>(&self, job: &'static str, work: F) -> Result<T, WorkerError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let _permit = match &self.limit {
            Some(semaphore) => Some(
                Arc::clone(semaphore)
                    .acquire_owned()
                    .await
                    .map_err(|_| WorkerError::Closed)?,
            ),
            None => None,
        };

        debug!(job, "dispatching blocking job");
        tokio::task::spawn_blocking(work).await.map_err(|e| {
            if e.is_panic() {
                WorkerError::Panicked { job }
            } else {
                WorkerError::Cancelled { job }
            }
        })
    }
}
