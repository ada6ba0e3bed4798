//! Connection governor - bounded upstream concurrency
//!
//! A fixed-size slot pool per upstream host. Requests beyond capacity queue
//! in arrival order instead of opening more connections: upstream origins
//! rate-limit or stall aggressive clients, and an unbounded burst of segment
//! requests ends with upstream refusing all of them, including the ones the
//! player needs right now to avoid a stall.
//!
//! The governor is the only shared mutable state in the proxy core. It is
//! injected into both the proxy server and the fetch orchestrator so metadata
//! fetching and playback compete fairly for the same bounded capacity.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::error;

/// Default slots per upstream host. Small on purpose.
pub const DEFAULT_HOST_CAPACITY: usize = 6;

/// Governor failures
#[derive(Debug, Error)]
pub enum GovernorError {
    #[error("timed out waiting for an upstream slot for {host}")]
    Timeout { host: String },
}

/// Per-host bounded slot pools
pub struct Governor {
    capacity: usize,
    acquire_timeout: Duration,
    pools: Mutex<HashMap<String, Arc<Semaphore>>>,
}

impl Governor {
    pub fn new(capacity: usize, acquire_timeout: Duration) -> Self {
        Self {
            capacity: capacity.max(1),
            acquire_timeout,
            pools: Mutex::new(HashMap::new()),
        }
    }

    fn pool(&self, host: &str) -> Arc<Semaphore> {
        let mut pools = self.pools.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            pools
                .entry(host.to_string())
                .or_insert_with(|| Arc::new(Semaphore::new(self.capacity))),
        )
    }

    /// Acquire a slot for `host`, waiting FIFO behind earlier callers.
    ///
    /// Fails with [`GovernorError::Timeout`] if no slot frees within the
    /// configured acquire timeout. Tokio's semaphore queues waiters fairly,
    /// which gives the arrival-order guarantee.
    pub async fn acquire(&self, host: &str) -> Result<Slot, GovernorError> {
        let pool = self.pool(host);
        match tokio::time::timeout(self.acquire_timeout, pool.acquire_owned()).await {
            Ok(Ok(permit)) => Ok(Slot {
                host: host.to_string(),
                permit: Some(permit),
            }),
            // The pool semaphore is never closed; both arms are the timeout.
            Ok(Err(_)) | Err(_) => Err(GovernorError::Timeout {
                host: host.to_string(),
            }),
        }
    }

    /// Free slots currently available for `host`
    pub fn available(&self, host: &str) -> usize {
        self.pool(host).available_permits()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Permission to hold one upstream connection to a host.
///
/// Owned exclusively by the request holding it. Dropping an unreleased slot
/// releases it, so abnormal exits (client disconnect, task abort, panic
/// unwind) can never leak a slot.
pub struct Slot {
    host: String,
    permit: Option<OwnedSemaphorePermit>,
}

impl Slot {
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Release the slot explicitly.
    ///
    /// Calling this twice is a programming error; the second call is a no-op
    /// that logs at error level rather than double-freeing.
    pub fn release(&mut self) {
        match self.permit.take() {
            Some(permit) => drop(permit),
            None => error!(host = %self.host, "governor slot released twice"),
        }
    }
}

impl Drop for Slot {
    fn drop(&mut self) {
        // Permit drop returns the slot to the pool; nothing to log here,
        // drop-release is the normal path for streamed responses.
        self.permit.take();
    }
}

impl std::fmt::Debug for Slot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Slot")
            .field("host", &self.host)
            .field("held", &self.permit.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_acquire_within_capacity() {
        let governor = Governor::new(2, Duration::from_millis(100));
        let a = governor.acquire("cdn.example.com").await.unwrap();
        let _b = governor.acquire("cdn.example.com").await.unwrap();
        assert_eq!(governor.available("cdn.example.com"), 0);
        drop(a);
        assert_eq!(governor.available("cdn.example.com"), 1);
    }

    #[tokio::test]
    async fn test_acquire_times_out_when_full() {
        let governor = Governor::new(1, Duration::from_millis(50));
        let _held = governor.acquire("cdn.example.com").await.unwrap();
        match governor.acquire("cdn.example.com").await {
            Err(GovernorError::Timeout { host }) => assert_eq!(host, "cdn.example.com"),
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_hosts_have_independent_pools() {
        let governor = Governor::new(1, Duration::from_millis(50));
        let _a = governor.acquire("a.example.com").await.unwrap();
        // Different host, fresh pool.
        assert!(governor.acquire("b.example.com").await.is_ok());
    }

    #[tokio::test]
    async fn test_explicit_release_then_drop_is_quiet() {
        let governor = Governor::new(1, Duration::from_millis(50));
        let mut slot = governor.acquire("cdn.example.com").await.unwrap();
        slot.release();
        assert_eq!(governor.available("cdn.example.com"), 1);
        drop(slot); // already released; must not underflow or log
        assert_eq!(governor.available("cdn.example.com"), 1);
    }

    #[tokio::test]
    async fn test_double_release_does_not_panic() {
        let governor = Governor::new(1, Duration::from_millis(50));
        let mut slot = governor.acquire("cdn.example.com").await.unwrap();
        slot.release();
        slot.release(); // logged, not fatal
        assert_eq!(governor.available("cdn.example.com"), 1);
    }
}
