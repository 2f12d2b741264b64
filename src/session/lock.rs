// SPDX-License-Identifier: GPL-3.0-only

//! Open/close mutual exclusion for the device handle
//!
//! Opening is asynchronous: the caller acquires the lock, issues the open, and
//! the lock is released either immediately (synchronous failure) or from the
//! open-completion callback. Modelling the permit as an owned value means
//! whichever path ends up holding it releases it, exactly once, when it drops.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;
use tracing::{debug, trace};

/// Failed to acquire the device lock within the bound
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockTimeout {
    pub waited: Duration,
}

impl fmt::Display for LockTimeout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "timed out after {} ms waiting for the camera open/close lock",
            self.waited.as_millis()
        )
    }
}

impl std::error::Error for LockTimeout {}

/// Binary lock guarding hardware open/close
#[derive(Clone)]
pub struct DeviceLock {
    semaphore: Arc<Semaphore>,
}

impl Default for DeviceLock {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceLock {
    pub fn new() -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(1)),
        }
    }

    /// Wait up to `timeout` for the lock
    ///
    /// Timing out is reported to the caller, never retried here.
    pub async fn acquire(
        &self,
        timeout: Duration,
        purpose: &'static str,
    ) -> Result<DevicePermit, LockTimeout> {
        let start = Instant::now();
        let acquired = tokio::time::timeout(timeout, Arc::clone(&self.semaphore).acquire_owned()).await;

        match acquired {
            Ok(Ok(permit)) => {
                debug!(purpose, waited_ms = start.elapsed().as_millis() as u64, "Device lock acquired");
                Ok(DevicePermit {
                    _permit: permit,
                    purpose,
                    acquired_at: Instant::now(),
                })
            }
            // The semaphore is never closed, so only the timeout arm is reachable
            _ => Err(LockTimeout {
                waited: start.elapsed(),
            }),
        }
    }

    /// Take the lock only if it is free right now
    pub fn try_acquire(&self, purpose: &'static str) -> Option<DevicePermit> {
        let permit = Arc::clone(&self.semaphore).try_acquire_owned().ok()?;
        Some(DevicePermit {
            _permit: permit,
            purpose,
            acquired_at: Instant::now(),
        })
    }

    /// Give the lock back. Equivalent to dropping the permit.
    pub fn release(&self, permit: DevicePermit) {
        drop(permit);
    }

    /// True while some path holds the permit
    pub fn is_held(&self) -> bool {
        self.semaphore.available_permits() == 0
    }
}

impl fmt::Debug for DeviceLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceLock")
            .field("held", &self.is_held())
            .finish()
    }
}

/// Proof of holding the device lock; dropping it releases the lock
pub struct DevicePermit {
    _permit: OwnedSemaphorePermit,
    purpose: &'static str,
    acquired_at: Instant,
}

impl DevicePermit {
    pub fn purpose(&self) -> &'static str {
        self.purpose
    }
}

impl fmt::Debug for DevicePermit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DevicePermit")
            .field("purpose", &self.purpose)
            .finish()
    }
}

impl Drop for DevicePermit {
    fn drop(&mut self) {
        trace!(
            purpose = self.purpose,
            held_ms = self.acquired_at.elapsed().as_millis() as u64,
            "Device lock released"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_single_holder() {
        let lock = DeviceLock::new();
        let permit = lock.acquire(Duration::from_millis(10), "open").await.unwrap();
        assert!(lock.is_held());
        assert!(lock.try_acquire("close").is_none());

        lock.release(permit);
        assert!(!lock.is_held());
        assert!(lock.try_acquire("close").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_times_out() {
        let lock = DeviceLock::new();
        let _held = lock.acquire(Duration::from_millis(10), "open").await.unwrap();

        let err = lock
            .acquire(Duration::from_millis(2500), "close")
            .await
            .unwrap_err();
        assert!(err.waited >= Duration::from_millis(2500));
        assert!(err.to_string().contains("timed out"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_release_from_another_task() {
        // The open path moves the permit to whoever handles the completion
        let lock = DeviceLock::new();
        let permit = lock.acquire(Duration::from_millis(10), "open").await.unwrap();

        let handle = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            drop(permit);
        });

        let second = lock.acquire(Duration::from_secs(1), "close").await;
        assert!(second.is_ok());
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let lock = DeviceLock::new();
        let other = lock.clone();
        let _permit = lock.try_acquire("open").unwrap();
        assert!(other.is_held());
    }
}
