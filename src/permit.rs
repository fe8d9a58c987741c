use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
#[cfg(feature = "async")]
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};

/// Counts primary execution units that are still running.
#[derive(Clone, Default)]
pub(crate) struct InFlight {
    limit: Option<usize>,
    running: Arc<AtomicUsize>,
}

/// Held by an execution unit for as long as it runs.
pub(crate) struct Permit {
    running: Arc<AtomicUsize>,
}

impl InFlight {
    pub(crate) fn new(limit: Option<usize>) -> Self {
        InFlight {
            limit,
            ..Default::default()
        }
    }

    pub(crate) fn running(&self) -> usize {
        self.running.load(Ordering::Acquire)
    }

    /// Fails with a rejection message when the limit is reached.
    pub(crate) fn try_acquire(&self) -> Result<Permit, String> {
        let limit = self.limit;
        self.running
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| match limit {
                Some(limit) if n >= limit => None,
                _ => Some(n + 1),
            })
            .map(|_| Permit {
                running: self.running.clone(),
            })
            .map_err(|n| format!("{n} operations already in flight"))
    }
}

impl Drop for Permit {
    fn drop(&mut self) {
        self.running.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Semaphore-backed counterpart of [`InFlight`] for tokio tasks.
#[cfg(feature = "async")]
#[derive(Clone)]
pub(crate) struct TaskSlots {
    capacity: usize,
    semaphore: Arc<Semaphore>,
}

#[cfg(feature = "async")]
impl TaskSlots {
    pub(crate) fn new(limit: Option<usize>) -> Self {
        let capacity = limit.unwrap_or(Semaphore::MAX_PERMITS).min(Semaphore::MAX_PERMITS);

        TaskSlots {
            capacity,
            semaphore: Arc::new(Semaphore::new(capacity)),
        }
    }

    pub(crate) fn running(&self) -> usize {
        self.capacity - self.semaphore.available_permits()
    }

    pub(crate) fn try_acquire(&self) -> Result<OwnedSemaphorePermit, String> {
        self.semaphore
            .clone()
            .try_acquire_owned()
            .map_err(|err| match err {
                TryAcquireError::NoPermits => {
                    format!("{} operations already in flight", self.running())
                }
                TryAcquireError::Closed => String::from("task slots closed"),
            })
    }
}
