//! Monotonic counters and derived gauges (spec §4.8, §6).

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering as AtomicOrdering};
use std::time::Duration;

/// Monotonic 64-bit counters plus the running sums needed to derive the
/// §4.8 gauges (`mean_*`, `max_borrow_wait_time`) without pulling in a
/// full histogram dependency.
#[derive(Debug, Default)]
pub struct Counters {
    created: AtomicU64,
    destroyed: AtomicU64,
    destroyed_by_eviction: AtomicU64,
    destroyed_by_abandonment: AtomicU64,
    destroyed_by_borrow_validation: AtomicU64,
    borrowed: AtomicU64,
    returned: AtomicU64,

    active_time_total_micros: AtomicU64,
    active_time_samples: AtomicU64,
    idle_time_total_micros: AtomicU64,
    idle_time_samples: AtomicU64,
    borrow_wait_total_micros: AtomicU64,
    borrow_wait_samples: AtomicU64,
    max_borrow_wait_micros: AtomicU64,

    num_waiters: AtomicI64,
}

impl Counters {
    /// New, all-zero counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a successful factory `create`.
    pub fn record_created(&self) {
        self.created.fetch_add(1, AtomicOrdering::Relaxed);
    }

    /// Record a destruction, attributing it to the given cause.
    pub fn record_destroyed(&self, cause: DestroyCause) {
        self.destroyed.fetch_add(1, AtomicOrdering::Relaxed);
        match cause {
            DestroyCause::Normal => {}
            DestroyCause::Eviction => {
                self.destroyed_by_eviction.fetch_add(1, AtomicOrdering::Relaxed);
            }
            DestroyCause::Abandonment => {
                self.destroyed_by_abandonment
                    .fetch_add(1, AtomicOrdering::Relaxed);
            }
            DestroyCause::BorrowValidation => {
                self.destroyed_by_borrow_validation
                    .fetch_add(1, AtomicOrdering::Relaxed);
            }
        }
    }

    /// Record a successful borrow, including how long the caller waited.
    pub fn record_borrowed(&self, wait: Duration) {
        self.borrowed.fetch_add(1, AtomicOrdering::Relaxed);
        let micros = wait.as_micros().min(u128::from(u64::MAX)) as u64;
        self.borrow_wait_total_micros
            .fetch_add(micros, AtomicOrdering::Relaxed);
        self.borrow_wait_samples.fetch_add(1, AtomicOrdering::Relaxed);
        self.max_borrow_wait_micros
            .fetch_max(micros, AtomicOrdering::Relaxed);
    }

    /// Record a return, including how long the record was allocated.
    pub fn record_returned(&self, active_time: Duration) {
        self.returned.fetch_add(1, AtomicOrdering::Relaxed);
        let micros = active_time.as_micros().min(u128::from(u64::MAX)) as u64;
        self.active_time_total_micros
            .fetch_add(micros, AtomicOrdering::Relaxed);
        self.active_time_samples
            .fetch_add(1, AtomicOrdering::Relaxed);
    }

    /// Record how long a record sat idle before being taken or evicted.
    pub fn record_idle_time(&self, idle_time: Duration) {
        let micros = idle_time.as_micros().min(u128::from(u64::MAX)) as u64;
        self.idle_time_total_micros
            .fetch_add(micros, AtomicOrdering::Relaxed);
        self.idle_time_samples.fetch_add(1, AtomicOrdering::Relaxed);
    }

    /// Adjust the live waiter gauge.
    pub fn waiter_started(&self) {
        self.num_waiters.fetch_add(1, AtomicOrdering::Relaxed);
    }

    /// Adjust the live waiter gauge.
    pub fn waiter_finished(&self) {
        self.num_waiters.fetch_sub(1, AtomicOrdering::Relaxed);
    }

    /// Current number of callers blocked waiting for an instance.
    #[must_use]
    pub fn num_waiters(&self) -> i64 {
        self.num_waiters.load(AtomicOrdering::Relaxed)
    }

    /// Total instances ever created.
    #[must_use]
    pub fn created(&self) -> u64 {
        self.created.load(AtomicOrdering::Relaxed)
    }

    /// Total instances ever destroyed, for any reason.
    #[must_use]
    pub fn destroyed(&self) -> u64 {
        self.destroyed.load(AtomicOrdering::Relaxed)
    }

    /// Total instances destroyed specifically by the eviction engine.
    #[must_use]
    pub fn destroyed_by_eviction(&self) -> u64 {
        self.destroyed_by_eviction.load(AtomicOrdering::Relaxed)
    }

    /// Total instances destroyed specifically by the abandonment detector.
    #[must_use]
    pub fn destroyed_by_abandonment(&self) -> u64 {
        self.destroyed_by_abandonment.load(AtomicOrdering::Relaxed)
    }

    /// Total instances destroyed by a failed borrow-time validation.
    #[must_use]
    pub fn destroyed_by_borrow_validation(&self) -> u64 {
        self.destroyed_by_borrow_validation
            .load(AtomicOrdering::Relaxed)
    }

    /// Total successful borrows.
    #[must_use]
    pub fn borrowed(&self) -> u64 {
        self.borrowed.load(AtomicOrdering::Relaxed)
    }

    /// Total returns.
    #[must_use]
    pub fn returned(&self) -> u64 {
        self.returned.load(AtomicOrdering::Relaxed)
    }

    /// Mean time a record spent allocated, across every recorded return.
    #[must_use]
    pub fn mean_active_time(&self) -> Duration {
        mean(
            self.active_time_total_micros.load(AtomicOrdering::Relaxed),
            self.active_time_samples.load(AtomicOrdering::Relaxed),
        )
    }

    /// Mean time a record spent idle before being taken or evicted.
    #[must_use]
    pub fn mean_idle_time(&self) -> Duration {
        mean(
            self.idle_time_total_micros.load(AtomicOrdering::Relaxed),
            self.idle_time_samples.load(AtomicOrdering::Relaxed),
        )
    }

    /// Mean time a caller waited before a successful borrow.
    #[must_use]
    pub fn mean_borrow_wait_time(&self) -> Duration {
        mean(
            self.borrow_wait_total_micros.load(AtomicOrdering::Relaxed),
            self.borrow_wait_samples.load(AtomicOrdering::Relaxed),
        )
    }

    /// Longest time any caller has waited before a successful borrow.
    #[must_use]
    pub fn max_borrow_wait_time(&self) -> Duration {
        Duration::from_micros(self.max_borrow_wait_micros.load(AtomicOrdering::Relaxed))
    }
}

fn mean(total_micros: u64, samples: u64) -> Duration {
    if samples == 0 {
        Duration::ZERO
    } else {
        Duration::from_micros(total_micros / samples)
    }
}

/// Why an instance was destroyed, for counter attribution (a coarser
/// view than [`crate::factory::DestroyReason`], which the factory sees).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DestroyCause {
    /// Ordinary invalidation / failed passivation on return.
    Normal,
    /// Removed by the eviction engine.
    Eviction,
    /// Reclaimed by the abandonment detector.
    Abandonment,
    /// Failed `activate`/`validate` during borrow.
    BorrowValidation,
}

/// Point-in-time snapshot of every counter and derived gauge (spec §4.8),
/// plus the current live gauges supplied by the caller (pool size is not
/// tracked here since it belongs to the idle store / allocated set).
#[derive(Debug, Clone, Copy, Default)]
pub struct CounterSnapshot {
    /// Total instances ever created.
    pub created: u64,
    /// Total instances ever destroyed.
    pub destroyed: u64,
    /// Total instances destroyed by the eviction engine.
    pub destroyed_by_eviction: u64,
    /// Total instances destroyed by the abandonment detector.
    pub destroyed_by_abandonment: u64,
    /// Total instances destroyed by a failed borrow-time validation.
    pub destroyed_by_borrow_validation: u64,
    /// Total successful borrows.
    pub borrowed: u64,
    /// Total returns.
    pub returned: u64,
    /// Current number of callers blocked waiting for an instance.
    pub num_waiters: i64,
    /// Mean time a record spent allocated.
    pub mean_active_time: Duration,
    /// Mean time a record spent idle.
    pub mean_idle_time: Duration,
    /// Mean time a caller waited for a successful borrow.
    pub mean_borrow_wait_time: Duration,
    /// Longest time any caller has waited for a successful borrow.
    pub max_borrow_wait_time: Duration,
}

impl From<&Counters> for CounterSnapshot {
    fn from(c: &Counters) -> Self {
        Self {
            created: c.created(),
            destroyed: c.destroyed(),
            destroyed_by_eviction: c.destroyed_by_eviction(),
            destroyed_by_abandonment: c.destroyed_by_abandonment(),
            destroyed_by_borrow_validation: c.destroyed_by_borrow_validation(),
            borrowed: c.borrowed(),
            returned: c.returned(),
            num_waiters: c.num_waiters(),
            mean_active_time: c.mean_active_time(),
            mean_idle_time: c.mean_idle_time(),
            mean_borrow_wait_time: c.mean_borrow_wait_time(),
            max_borrow_wait_time: c.max_borrow_wait_time(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_counters_are_all_zero() {
        let c = Counters::new();
        assert_eq!(c.created(), 0);
        assert_eq!(c.destroyed(), 0);
        assert_eq!(c.mean_active_time(), Duration::ZERO);
        assert_eq!(c.max_borrow_wait_time(), Duration::ZERO);
    }

    #[test]
    fn destroyed_attribution_increments_both_total_and_cause() {
        let c = Counters::new();
        c.record_destroyed(DestroyCause::Eviction);
        c.record_destroyed(DestroyCause::Abandonment);
        c.record_destroyed(DestroyCause::Normal);
        assert_eq!(c.destroyed(), 3);
        assert_eq!(c.destroyed_by_eviction(), 1);
        assert_eq!(c.destroyed_by_abandonment(), 1);
    }

    #[test]
    fn mean_borrow_wait_time_averages_samples() {
        let c = Counters::new();
        c.record_borrowed(Duration::from_millis(10));
        c.record_borrowed(Duration::from_millis(30));
        assert_eq!(c.mean_borrow_wait_time(), Duration::from_millis(20));
    }

    #[test]
    fn max_borrow_wait_time_tracks_the_largest_sample() {
        let c = Counters::new();
        c.record_borrowed(Duration::from_millis(5));
        c.record_borrowed(Duration::from_millis(100));
        c.record_borrowed(Duration::from_millis(40));
        assert_eq!(c.max_borrow_wait_time(), Duration::from_millis(100));
    }

    #[test]
    fn waiter_gauge_tracks_start_and_finish() {
        let c = Counters::new();
        c.waiter_started();
        c.waiter_started();
        assert_eq!(c.num_waiters(), 2);
        c.waiter_finished();
        assert_eq!(c.num_waiters(), 1);
    }

    #[test]
    fn snapshot_reflects_recorded_values() {
        let c = Counters::new();
        c.record_created();
        c.record_borrowed(Duration::from_millis(10));
        c.record_returned(Duration::from_millis(200));
        let snap = CounterSnapshot::from(&c);
        assert_eq!(snap.created, 1);
        assert_eq!(snap.borrowed, 1);
        assert_eq!(snap.returned, 1);
        assert_eq!(snap.mean_active_time, Duration::from_millis(200));
    }
}
