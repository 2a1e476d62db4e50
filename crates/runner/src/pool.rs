//! Admission control for runner processes
//!
//! A fixed number of execution slots. A run waits for a free slot up to the
//! configured queue wait, then fails with `Busy` instead of piling up more
//! processes.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{RunnerError, RunnerResult};

#[derive(Debug, Clone)]
pub struct ExecutionPool {
    slots: usize,
    queue_wait: Duration,
    semaphore: Arc<Semaphore>,
}

/// Held for the duration of one run; the slot frees on drop
#[derive(Debug)]
pub struct ExecutionSlot {
    _permit: OwnedSemaphorePermit,
}

impl ExecutionPool {
    pub fn new(slots: usize, queue_wait: Duration) -> Self {
        let slots = slots.max(1);
        Self {
            slots,
            queue_wait,
            semaphore: Arc::new(Semaphore::new(slots)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots
    }

    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Wait for a slot, giving up on timeout or cancellation
    pub async fn acquire(&self, cancel: &CancellationToken) -> RunnerResult<ExecutionSlot> {
        if let Ok(permit) = Arc::clone(&self.semaphore).try_acquire_owned() {
            return Ok(ExecutionSlot { _permit: permit });
        }

        debug!("All {} execution slots busy, queueing", self.slots);
        let acquire = Arc::clone(&self.semaphore).acquire_owned();

        tokio::select! {
            permit = tokio::time::timeout(self.queue_wait, acquire) => match permit {
                Ok(Ok(permit)) => Ok(ExecutionSlot { _permit: permit }),
                Ok(Err(_closed)) => Err(RunnerError::Cancelled),
                Err(_elapsed) => {
                    warn!("No execution slot within {:?}", self.queue_wait);
                    Err(RunnerError::Busy {
                        slots: self.slots,
                        waited_secs: self.queue_wait.as_secs(),
                    })
                }
            },
            _ = cancel.cancelled() => Err(RunnerError::Cancelled),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_slots_are_bounded() {
        let pool = ExecutionPool::new(2, Duration::from_millis(20));
        let token = CancellationToken::new();
        let a = pool.acquire(&token).await.unwrap();
        let _b = pool.acquire(&token).await.unwrap();
        assert_eq!(pool.available(), 0);

        let err = pool.acquire(&token).await.unwrap_err();
        assert!(matches!(err, RunnerError::Busy { slots: 2, .. }));

        drop(a);
        assert!(pool.acquire(&token).await.is_ok());
    }

    #[tokio::test]
    async fn test_waiter_gets_freed_slot() {
        let pool = ExecutionPool::new(1, Duration::from_secs(5));
        let token = CancellationToken::new();
        let held = pool.acquire(&token).await.unwrap();

        let waiter = {
            let pool = pool.clone();
            let token = token.clone();
            tokio::spawn(async move { pool.acquire(&token).await.is_ok() })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(held);
        assert!(waiter.await.unwrap());
    }

    #[tokio::test]
    async fn test_cancel_while_queued() {
        let pool = ExecutionPool::new(1, Duration::from_secs(5));
        let token = CancellationToken::new();
        let _held = pool.acquire(&token).await.unwrap();

        let queued = CancellationToken::new();
        queued.cancel();
        let err = pool.acquire(&queued).await.unwrap_err();
        assert!(matches!(err, RunnerError::Cancelled));
    }

    #[test]
    fn test_zero_slots_clamped() {
        assert_eq!(ExecutionPool::new(0, Duration::from_secs(1)).capacity(), 1);
    }
}
