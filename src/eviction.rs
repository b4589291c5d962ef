//! Background Eviction Engine task (spec §4.4 — component C4).
//!
//! Decoupled from [`crate::single::SinglePool`] via a plain async closure
//! the same way the teacher's `AutoScaler` is decoupled from `Pool`,
//! wrapping one sweep call on a fixed period behind a `CancellationToken`.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// Periodic driver for one pool's eviction sweep (and, when enabled,
/// abandonment reclamation during maintenance — spec §4.5 "during each
/// eviction sweep").
///
/// Disabled entirely when `time_between_eviction_runs` is `None`: callers
/// should check that before constructing one.
pub struct EvictionRunner {
    period: Duration,
    cancel: CancellationToken,
}

impl EvictionRunner {
    /// Create a runner that fires every `period`, stopping when `cancel`
    /// is triggered.
    #[must_use]
    pub fn new(period: Duration, cancel: CancellationToken) -> Self {
        Self { period, cancel }
    }

    /// Spawn the background task. `sweep` is called once per tick; it
    /// should run the pool's eviction sweep (and abandonment reclamation,
    /// if `remove_abandoned_on_maintenance` is set).
    pub fn start<S, SF>(&self, sweep: S) -> tokio::task::JoinHandle<()>
    where
        S: Fn() -> SF + Send + Sync + 'static,
        SF: Future<Output = ()> + Send,
    {
        let period = self.period;
        let cancel = self.cancel.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = tokio::time::sleep(period) => {}
                    () = cancel.cancelled() => break,
                }
                sweep().await;
            }
        })
    }

    /// Stop the background task.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

impl std::fmt::Debug for EvictionRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvictionRunner")
            .field("period", &self.period)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}
