//! Worker Pool - a fixed set of permits bounding concurrent executions.
//!
//! The pool starts with `size` interchangeable tokens. Acquiring one hands out
//! a [`WorkerToken`]; dropping the token puts it back. Because release is tied
//! to ownership, a token is returned exactly once, on whatever path its
//! execution ends, and `available() + in_use() == size()` always holds.
//!
//! ```text
//!   acquire()            drop(token)
//! ┌──────────┐  token  ┌───────────┐
//! │ available│ ──────▶ │  in use   │
//! │  (pool)  │ ◀────── │ (worker)  │
//! └──────────┘         └───────────┘
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info};

/// Default wait before logging and retrying an acquisition.
pub const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(60);

/// Errors returned by the worker pool.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum PoolError {
    /// The pool was closed during teardown
    #[error("worker pool is closed")]
    Closed,
}

/// Permission to process one event. Returned to the pool on drop.
#[derive(Debug)]
pub struct WorkerToken {
    _permit: OwnedSemaphorePermit,
}

/// Fixed-capacity pool of worker tokens.
#[derive(Debug)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    size: usize,
    acquire_timeout: Duration,
    acquire_timeouts: AtomicU64,
}

impl WorkerPool {
    /// Create a pool with `size` tokens and the default acquire timeout.
    pub fn new(size: usize) -> Self {
        Self::with_timeout(size, DEFAULT_ACQUIRE_TIMEOUT)
    }

    /// Create a pool with a custom acquire timeout.
    ///
    /// The timeout only sets how often a waiting acquisition logs; it never
    /// makes acquisition give up.
    pub fn with_timeout(size: usize, acquire_timeout: Duration) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(size)),
            size,
            acquire_timeout,
            acquire_timeouts: AtomicU64::new(0),
        }
    }

    /// Wait for a token, logging every `acquire_timeout` while contended.
    ///
    /// Retries forever; only fails if the pool is closed.
    pub async fn acquire(&self) -> Result<WorkerToken, PoolError> {
        let mut waited = 0u32;

        loop {
            match tokio::time::timeout(self.acquire_timeout, self.permits.clone().acquire_owned())
                .await
            {
                Ok(Ok(permit)) => {
                    if waited > 0 {
                        debug!(waited_periods = waited, "Acquired worker after waiting");
                    }
                    return Ok(WorkerToken { _permit: permit });
                }
                Ok(Err(_)) => return Err(PoolError::Closed),
                Err(_) => {
                    waited += 1;
                    self.acquire_timeouts.fetch_add(1, Ordering::Relaxed);
                    info!(
                        timeout_ms = self.acquire_timeout.as_millis() as u64,
                        pool_size = self.size,
                        waited_periods = waited,
                        "Timed out waiting for worker. Re-initializing wait."
                    );
                }
            }
        }
    }

    /// Take a token only if one is free right now.
    pub fn try_acquire(&self) -> Option<WorkerToken> {
        self.permits
            .clone()
            .try_acquire_owned()
            .ok()
            .map(|permit| WorkerToken { _permit: permit })
    }

    /// Tokens currently in the pool.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Tokens currently held by executions.
    pub fn in_use(&self) -> usize {
        self.size - self.available().min(self.size)
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn acquire_timeout(&self) -> Duration {
        self.acquire_timeout
    }

    /// How many times an acquisition timed out and retried.
    pub fn acquire_timeouts(&self) -> u64 {
        self.acquire_timeouts.load(Ordering::Relaxed)
    }

    /// Fail all pending and future acquisitions. Tokens already handed out
    /// are unaffected.
    pub fn close(&self) {
        self.permits.close();
    }

    pub fn is_closed(&self) -> bool {
        self.permits.is_closed()
    }
}
