//! Pool lifecycle event broadcasting (spec §11).
//!
//! Provides [`PoolEvent`] variants emitted at the points named throughout
//! spec §4, and an [`EventBus`] backed by `tokio::sync::broadcast`.

use std::time::Duration;

use tokio::sync::broadcast;

use crate::factory::DestroyReason;

/// Events emitted during pool lifecycle operations.
///
/// All variants carry a `pool_key` identifying which sub-pool emitted the
/// event; a single, unkeyed [`crate::SinglePool`] always uses the same
/// fixed key. Subscribers receive cloned copies via [`EventBus::subscribe`].
#[derive(Debug, Clone)]
pub enum PoolEvent {
    /// A new instance was created by the factory.
    Created {
        /// The sub-pool key, or the fixed key for an unkeyed pool.
        pool_key: String,
    },
    /// An instance was successfully handed out by `borrow`.
    Borrowed {
        /// The sub-pool key, or the fixed key for an unkeyed pool.
        pool_key: String,
        /// How long the caller waited before being handed the instance.
        wait: Duration,
    },
    /// An instance was returned to idle.
    Returned {
        /// The sub-pool key, or the fixed key for an unkeyed pool.
        pool_key: String,
        /// How long the instance was allocated.
        active_time: Duration,
    },
    /// An instance was permanently destroyed.
    Destroyed {
        /// The sub-pool key, or the fixed key for an unkeyed pool.
        pool_key: String,
        /// Why the instance was destroyed.
        reason: DestroyReason,
    },
    /// The pool was exhausted and a caller is waiting, or was rejected.
    Exhausted {
        /// The sub-pool key, or the fixed key for an unkeyed pool.
        pool_key: String,
        /// Number of callers currently waiting for an instance.
        waiters: usize,
    },
    /// The abandonment detector reclaimed a borrowed instance.
    Abandoned {
        /// The sub-pool key, or the fixed key for an unkeyed pool.
        pool_key: String,
        /// How long it had gone unused before being reclaimed.
        idle_for: Duration,
    },
    /// The pool or one of its sub-pools was closed.
    Closed {
        /// The sub-pool key, or the fixed key for an unkeyed pool.
        pool_key: String,
    },
}

/// Broadcast-based event bus for pool lifecycle events.
///
/// Uses `tokio::sync::broadcast` under the hood. Emission is fire-and-forget:
/// if no subscribers are listening or the channel is full, events are silently
/// dropped (no backpressure on the emitter).
pub struct EventBus {
    sender: broadcast::Sender<PoolEvent>,
}

impl EventBus {
    /// Create a new event bus with the given buffer size.
    ///
    /// The buffer size determines how many events can be queued before
    /// slow subscribers start lagging (and losing events).
    #[must_use]
    pub fn new(buffer_size: usize) -> Self {
        let (sender, _) = broadcast::channel(buffer_size);
        Self { sender }
    }

    /// Emit an event to all current subscribers.
    ///
    /// This is non-blocking. If there are no subscribers or the channel
    /// is full, the event is silently dropped.
    pub fn emit(&self, event: PoolEvent) {
        let _ = self.sender.send(event);
    }

    /// Subscribe to events.
    ///
    /// Returns a receiver that will get all events emitted after this
    /// call. If the subscriber falls behind by more than `buffer_size`
    /// events, it will receive a `Lagged` error and skip to the latest.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<PoolEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.sender.receiver_count())
            .finish()
    }
}
