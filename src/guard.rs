//! RAII borrow guard (spec §3 "Ownership").
//!
//! Wraps the instance handed out by `borrow`. Dropping the guard without
//! calling [`BorrowGuard::invalidate`] returns the instance to the pool;
//! the return runs on a spawned task since `Drop` cannot `await`, mirroring
//! the teacher crate's `Pool::acquire` drop-callback pattern.

use std::ops::{Deref, DerefMut};
use std::sync::Weak;
use std::time::Instant;

use async_trait::async_trait;

/// Back-handle a [`BorrowGuard`] uses to hand its instance back to
/// whichever pool produced it, without the guard needing to name the
/// pool's concrete type (spec §9 "prefer a back-handle over raw
/// two-way ownership").
#[async_trait]
pub(crate) trait ReturnSink<T>: Send + Sync {
    /// Return a borrowed instance, running the normal return algorithm.
    async fn handle_return(&self, id: u64, item: T);

    /// Unconditionally destroy a borrowed instance.
    async fn handle_invalidate(&self, id: u64, item: T);

    /// Record a usage touch (only called when usage tracking is enabled).
    fn handle_touch(&self, id: u64, now: Instant, trace: Option<String>);
}

/// RAII guard conveying exclusive, transient ownership of a pooled
/// instance (spec §3).
///
/// On drop, the instance is returned to the pool. Call
/// [`BorrowGuard::invalidate`] instead when the caller knows the
/// instance is unusable, to skip the normal return path and destroy it
/// immediately.
pub struct BorrowGuard<T: Send + 'static> {
    id: u64,
    item: Option<T>,
    sink: Weak<dyn ReturnSink<T>>,
    track_usage: bool,
}

impl<T: Send + 'static> BorrowGuard<T> {
    pub(crate) fn new(id: u64, item: T, sink: Weak<dyn ReturnSink<T>>, track_usage: bool) -> Self {
        Self {
            id,
            item: Some(item),
            sink,
            track_usage,
        }
    }

    /// Record that the caller used the instance just now. Only has an
    /// effect when the pool's `use_usage_tracking` option is enabled;
    /// otherwise it is a no-op (spec §6 `use_usage_tracking`).
    ///
    /// `trace` is an optional call-site identifier surfaced by the
    /// abandonment detector's log output if this borrow is later
    /// reclaimed (spec §3 `last_use_trace`).
    pub fn touch(&self, trace: Option<impl Into<String>>) {
        if !self.track_usage {
            return;
        }
        if let Some(sink) = self.sink.upgrade() {
            sink.handle_touch(self.id, Instant::now(), trace.map(Into::into));
        }
    }

    /// Unconditionally destroy the instance instead of returning it to
    /// the pool. Use this when the caller has observed the instance to
    /// be unusable (spec §7 "a successful borrow that later observes
    /// the instance to be unusable requires the caller to call
    /// `invalidate`").
    pub async fn invalidate(mut self) {
        let item = self.item.take().expect("guard used after invalidate");
        if let Some(sink) = self.sink.upgrade() {
            sink.handle_invalidate(self.id, item).await;
        }
    }
}

impl<T: Send + 'static> Deref for BorrowGuard<T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.item.as_ref().expect("guard used after invalidate")
    }
}

impl<T: Send + 'static> DerefMut for BorrowGuard<T> {
    fn deref_mut(&mut self) -> &mut T {
        self.item.as_mut().expect("guard used after invalidate")
    }
}

impl<T: Send + 'static> Drop for BorrowGuard<T> {
    fn drop(&mut self) {
        let Some(item) = self.item.take() else {
            return;
        };
        let Some(sink) = self.sink.upgrade() else {
            // Pool is gone; nothing left to return to.
            return;
        };
        let id = self.id;
        tokio::spawn(async move {
            sink.handle_return(id, item).await;
        });
    }
}

impl<T: Send + std::fmt::Debug + 'static> std::fmt::Debug for BorrowGuard<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BorrowGuard")
            .field("id", &self.id)
            .field("item", &self.item)
            .finish()
    }
}
