//! Metrics collection for pool lifecycle events (spec §11).
//!
//! Subscribes to the [`EventBus`](crate::events::EventBus) and translates
//! events into counters and histograms via the `metrics` crate.
//!
//! Gated behind the `metrics` feature.

use tokio::sync::broadcast;

use crate::events::{EventBus, PoolEvent};

/// Background metrics collector that subscribes to an [`EventBus`]
/// and records counters/histograms via the `metrics` crate.
///
/// # Usage
///
/// ```rust,ignore
/// let event_bus = Arc::new(EventBus::default());
/// let collector = MetricsCollector::new(&event_bus);
/// tokio::spawn(collector.run());
/// ```
pub struct MetricsCollector {
    receiver: broadcast::Receiver<PoolEvent>,
}

impl MetricsCollector {
    /// Create a new collector subscribed to the given event bus.
    #[must_use]
    pub fn new(event_bus: &EventBus) -> Self {
        Self {
            receiver: event_bus.subscribe(),
        }
    }

    /// Run the collector loop, consuming events and updating metrics.
    ///
    /// Runs until the broadcast channel is closed (i.e. the `EventBus` is
    /// dropped). Lagged events are skipped with a warning.
    pub async fn run(mut self) {
        loop {
            match self.receiver.recv().await {
                Ok(event) => Self::record_event(&event),
                Err(broadcast::error::RecvError::Lagged(_n)) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(skipped = _n, "MetricsCollector lagged behind event bus");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }

    fn record_event(event: &PoolEvent) {
        match event {
            PoolEvent::Created { pool_key } => {
                metrics::counter!("pool.created.total", "pool_key" => pool_key.clone())
                    .increment(1);
            }
            PoolEvent::Borrowed { pool_key, wait } => {
                metrics::counter!("pool.borrowed.total", "pool_key" => pool_key.clone())
                    .increment(1);
                metrics::histogram!(
                    "pool.borrow_wait.duration_seconds",
                    "pool_key" => pool_key.clone()
                )
                .record(wait.as_secs_f64());
            }
            PoolEvent::Returned {
                pool_key,
                active_time,
            } => {
                metrics::counter!("pool.returned.total", "pool_key" => pool_key.clone())
                    .increment(1);
                metrics::histogram!(
                    "pool.active.duration_seconds",
                    "pool_key" => pool_key.clone()
                )
                .record(active_time.as_secs_f64());
            }
            PoolEvent::Destroyed { pool_key, reason } => {
                metrics::counter!(
                    "pool.destroyed.total",
                    "pool_key" => pool_key.clone(),
                    "reason" => reason.to_string()
                )
                .increment(1);
            }
            PoolEvent::Abandoned { pool_key, .. } => {
                metrics::counter!("pool.abandoned.total", "pool_key" => pool_key.clone())
                    .increment(1);
            }
            // Exhausted and Closed are informational; tracing handles these.
            PoolEvent::Exhausted { .. } | PoolEvent::Closed { .. } => {}
        }
    }
}

impl std::fmt::Debug for MetricsCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsCollector").finish()
    }
}
