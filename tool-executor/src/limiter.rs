//! Per-tool concurrency limits with a bounded wait queue.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tool_primitives::{ResourceLimits, ToolId};

/// The wait queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Saturated {
    pub(crate) capacity: usize,
    pub(crate) queue_depth: usize,
}

#[derive(Debug)]
struct ToolLimiter {
    capacity: NonZeroUsize,
    queue_depth: usize,
    semaphore: Arc<Semaphore>,
    waiting: AtomicUsize,
}

/// Decrements the waiter count even if the acquiring future is dropped.
struct WaitSlot<'a>(&'a AtomicUsize);

impl Drop for WaitSlot<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

impl ToolLimiter {
    fn new(capacity: NonZeroUsize, queue_depth: usize) -> Self {
        Self {
            capacity,
            queue_depth,
            semaphore: Arc::new(Semaphore::new(capacity.get())),
            waiting: AtomicUsize::new(0),
        }
    }

    fn matches(&self, capacity: NonZeroUsize, queue_depth: usize) -> bool {
        self.capacity == capacity && self.queue_depth == queue_depth
    }

    async fn acquire(&self) -> Result<OwnedSemaphorePermit, Saturated> {
        let saturated = Saturated {
            capacity: self.capacity.get(),
            queue_depth: self.queue_depth,
        };
        if let Ok(permit) = Arc::clone(&self.semaphore).try_acquire_owned() {
            return Ok(permit);
        }

        let queued = self.waiting.fetch_add(1, Ordering::AcqRel);
        let _slot = WaitSlot(&self.waiting);
        if queued >= self.queue_depth {
            return Err(saturated);
        }
        Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| saturated)
    }
}

/// Concurrency limiters keyed by tool identity.
///
/// A limiter is rebuilt when the tool's limits change; executions holding a
/// permit from the old limiter finish under it.
#[derive(Debug, Default)]
pub(crate) struct LimiterSet {
    limiters: RwLock<HashMap<ToolId, Arc<ToolLimiter>>>,
}

impl LimiterSet {
    fn limiter(&self, tool: ToolId, capacity: NonZeroUsize, queue_depth: usize) -> Arc<ToolLimiter> {
        if let Some(limiter) = self.limiters.read().expect("limiter set poisoned").get(&tool) {
            if limiter.matches(capacity, queue_depth) {
                return Arc::clone(limiter);
            }
        }
        let mut limiters = self.limiters.write().expect("limiter set poisoned");
        let entry = limiters
            .entry(tool)
            .or_insert_with(|| Arc::new(ToolLimiter::new(capacity, queue_depth)));
        if !entry.matches(capacity, queue_depth) {
            *entry = Arc::new(ToolLimiter::new(capacity, queue_depth));
        }
        Arc::clone(entry)
    }

    /// Waits for a slot; `Ok(None)` when the tool has no concurrency limit.
    pub(crate) async fn acquire(
        &self,
        tool: ToolId,
        limits: &ResourceLimits,
    ) -> Result<Option<OwnedSemaphorePermit>, Saturated> {
        let Some(capacity) = limits.max_concurrency else {
            return Ok(None);
        };
        let limiter = self.limiter(tool, capacity, limits.max_queue_depth);
        limiter.acquire().await.map(Some)
    }

    pub(crate) fn forget(&self, tool: ToolId) {
        self.limiters.write().expect("limiter set poisoned").remove(&tool);
    }
}
