//! Bounded worker pool for password hashing
//!
//! Argon2 is deliberately slow and memory hungry. Running it inline on the
//! async runtime would stall unrelated requests, so every hash and verify
//! runs on tokio's blocking threads, at most `worker_count` at a time, with
//! a bounded number of callers allowed to wait for a slot.

use log::{info, warn};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;

use crate::config::AuthConfig;
use crate::error::{Result, RustyGuardError};

/// Represents a pool for executing CPU-heavy credential work
pub struct HashingPool {
    /// One permit per concurrently running job
    permits: Arc<Semaphore>,
    /// Number of concurrent workers
    worker_count: usize,
    /// Maximum number of jobs that can be running or waiting
    max_queued_tasks: usize,
    /// Jobs currently running or waiting for a permit
    pending: Arc<AtomicUsize>,
}

struct PendingSlot(Arc<AtomicUsize>);

impl Drop for PendingSlot {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl HashingPool {
    /// Create a new pool
    ///
    /// # Arguments
    /// * `worker_count` - Number of hashing jobs allowed to run at once
    /// * `max_queued_tasks` - Maximum number of jobs running or waiting
    pub fn new(worker_count: usize, max_queued_tasks: usize) -> Result<Self> {
        if worker_count == 0 {
            return Err(RustyGuardError::ConfigError(
                "Hashing pool needs at least one worker".to_string(),
            ));
        }
        let max_queued_tasks = max_queued_tasks.max(worker_count);

        info!(
            "Created hashing pool with {} workers and {} max queued tasks",
            worker_count, max_queued_tasks
        );

        Ok(Self {
            permits: Arc::new(Semaphore::new(worker_count)),
            worker_count,
            max_queued_tasks,
            pending: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Create a pool from configuration
    pub fn from_config(config: &AuthConfig) -> Result<Self> {
        Self::new(config.hashing_pool_size, config.max_queued_hashes)
    }

    /// Run a blocking job on the pool and wait for its result.
    ///
    /// Fails fast with `StorageUnavailable` when the queue is full instead of
    /// letting callers pile up behind the hashing workers.
    pub async fn run<F, T>(&self, job: F) -> Result<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let queued = self.pending.fetch_add(1, Ordering::SeqCst) + 1;
        let _slot = PendingSlot(Arc::clone(&self.pending));
        if queued > self.max_queued_tasks {
            warn!("Hashing pool at capacity ({} pending jobs), rejecting new job", queued - 1);
            return Err(RustyGuardError::StorageUnavailable(
                "password hashing pool saturated".to_string(),
            ));
        }

        let _permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|e| RustyGuardError::SystemError(format!("Hashing pool closed: {}", e)))?;

        tokio::task::spawn_blocking(job)
            .await
            .map_err(|e| RustyGuardError::SystemError(format!("Hashing job failed: {}", e)))
    }

    /// Jobs currently running or waiting
    pub fn pending_count(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// Get the number of workers in the pool
    pub fn worker_count(&self) -> usize {
        self.worker_count
    }
}
