//! Concurrency cap for bulk fan-out.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Optional cap on how many per-item actions run at once.
///
/// Tasks are still spawned for every item up front; they only wait here
/// for a permit, so no item ever waits on a particular sibling.
#[derive(Debug, Clone)]
pub struct ConcurrencyLimit {
    semaphore: Option<Arc<Semaphore>>,
}

impl ConcurrencyLimit {
    /// A limit of `max` concurrent holders, or no limit for `None`.
    #[must_use]
    pub fn new(max: Option<usize>) -> Self {
        Self {
            semaphore: max.map(|permits| Arc::new(Semaphore::new(permits))),
        }
    }

    #[must_use]
    pub const fn unbounded() -> Self {
        Self { semaphore: None }
    }

    /// Wait for a slot. The slot is released when the returned permit is
    /// dropped; unbounded limits hand out `None` immediately.
    pub async fn acquire(&self) -> Option<OwnedSemaphorePermit> {
        let semaphore = Arc::clone(self.semaphore.as_ref()?);
        // The semaphore is never closed, so acquisition only fails if that
        // changes; in that case the caller proceeds without a slot.
        semaphore.acquire_owned().await.ok()
    }
}

impl Default for ConcurrencyLimit {
    fn default() -> Self {
        Self::unbounded()
    }
}
