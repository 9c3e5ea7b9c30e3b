//! Bounded pool for blocking filesystem and hashing work.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Semaphore;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    #[error("Worker pool is shut down")]
    Closed,

    #[error("Blocking task failed: {0}")]
    Join(String),
}

/// Runs closures on tokio's blocking threads, at most `size` at a time.
#[derive(Debug, Clone)]
pub struct BlockingPool {
    permits: Arc<Semaphore>,
    size: usize,
}

impl BlockingPool {
    /// `workers == 0` sizes the pool to the CPU count.
    pub fn new(workers: usize) -> Self {
        let size = if workers == 0 {
            num_cpus::get().max(1)
        } else {
            workers
        };
        Self {
            permits: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub async fn run<F, T>(&self, task: F) -> Result<T, PoolError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| PoolError::Closed)?;

        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            task()
        })
        .await
        .map_err(|e| PoolError::Join(e.to_string()))
    }

    /// Reject new work. Tasks already running finish normally.
    pub fn close(&self) {
        self.permits.close();
    }

    pub fn is_closed(&self) -> bool {
        self.permits.is_closed()
    }
}
