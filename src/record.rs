//! The pooled-object record (spec §3, §4.1 — component C1).

use std::time::{Duration, Instant};

use chrono::{DateTime, Local};

use crate::error::PoolError;

/// Lifecycle state of a [`PooledObject`].
///
/// See spec §3 for the full state diagram:
/// `create -> passivate -> Idle -> activate -> [validate] -> Allocated
/// -> [validate] -> passivate -> Idle (or destroyed)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Available for borrow; reachable from the idle store.
    Idle,
    /// Checked out to a caller.
    Allocated,
    /// Temporarily pulled aside by the evictor for validation.
    Eviction,
    /// Temporarily pulled aside during return, while passivation runs.
    Returning,
    /// Queued for destruction.
    Invalid,
    /// Reclaimed by the abandonment detector; the original borrower's
    /// eventual return becomes a no-op.
    Abandoned,
}

/// A record wrapping one user instance with lifecycle state, timestamps,
/// and an optional usage trace (spec §3).
#[derive(Debug)]
pub struct PooledObject<T> {
    /// The user-facing instance. Opaque to the pool.
    pub instance: T,
    state: State,
    create_time: Instant,
    /// Wall-clock creation time, kept alongside the monotonic `create_time`
    /// solely to render the ISO-8601 timestamp in the abandonment log
    /// format (spec §6); all duration math uses `Instant`.
    wall_create_time: DateTime<Local>,
    last_borrow_time: Instant,
    last_return_time: Instant,
    last_use_time: Instant,
    borrow_count: u64,
    /// Call-site identifier captured when usage tracking is enabled; read
    /// by the abandonment detector's log output (spec §3, §4.5).
    pub last_use_trace: Option<String>,
}

impl<T> PooledObject<T> {
    /// Wrap a freshly created instance. The record starts `Idle` — the
    /// caller is expected to have already run `passivate` per the
    /// lifecycle diagram before this point, or to be constructing the
    /// very first idle entry.
    #[must_use]
    pub fn new(instance: T) -> Self {
        let now = Instant::now();
        Self {
            instance,
            state: State::Idle,
            create_time: now,
            wall_create_time: Local::now(),
            last_borrow_time: now,
            last_return_time: now,
            last_use_time: now,
            borrow_count: 0,
            last_use_trace: None,
        }
    }

    /// Wall-clock creation time (spec §6 abandonment log timestamp).
    #[must_use]
    pub fn wall_create_time(&self) -> DateTime<Local> {
        self.wall_create_time
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> State {
        self.state
    }

    /// When the record was created.
    #[must_use]
    pub fn create_time(&self) -> Instant {
        self.create_time
    }

    /// When the record was last handed out via `borrow`.
    #[must_use]
    pub fn last_borrow_time(&self) -> Instant {
        self.last_borrow_time
    }

    /// When the record was last returned to idle.
    #[must_use]
    pub fn last_return_time(&self) -> Instant {
        self.last_return_time
    }

    /// When the caller last touched the instance (updated by the borrow
    /// guard when usage tracking is enabled; otherwise equal to
    /// `last_borrow_time`).
    #[must_use]
    pub fn last_use_time(&self) -> Instant {
        self.last_use_time
    }

    /// Monotonic counter used for fair-ordering tiebreaks and
    /// usage-based policies.
    #[must_use]
    pub fn borrow_count(&self) -> u64 {
        self.borrow_count
    }

    /// Transition `Idle -> Allocated`. Updates `last_borrow_time` and
    /// increments `borrow_count`.
    pub fn allocate(&mut self, now: Instant) -> Result<(), PoolError> {
        self.require(&[State::Idle])?;
        self.state = State::Allocated;
        self.last_borrow_time = now;
        self.last_use_time = now;
        self.borrow_count += 1;
        Ok(())
    }

    /// Transition `Allocated -> Idle`. Updates `last_return_time`.
    pub fn deallocate(&mut self, now: Instant) -> Result<(), PoolError> {
        self.require(&[State::Allocated, State::Returning])?;
        self.state = State::Idle;
        self.last_return_time = now;
        Ok(())
    }

    /// Move into the `Returning` sentinel state while passivation runs
    /// outside the pool's lock (spec §5).
    pub fn begin_return(&mut self) -> Result<(), PoolError> {
        self.require(&[State::Allocated])?;
        self.state = State::Returning;
        Ok(())
    }

    /// Move into the `Eviction` sentinel state so a concurrent borrow
    /// skips this record while the evictor inspects it (spec §4.4).
    pub fn begin_eviction(&mut self) -> Result<(), PoolError> {
        self.require(&[State::Idle])?;
        self.state = State::Eviction;
        Ok(())
    }

    /// Return from the `Eviction` sentinel state to `Idle` (the evictor
    /// decided to keep the record).
    pub fn end_eviction(&mut self, now: Instant) -> Result<(), PoolError> {
        self.require(&[State::Eviction])?;
        self.state = State::Idle;
        self.last_return_time = now;
        Ok(())
    }

    /// Queue the record for destruction. Always succeeds: invalidation is
    /// unconditional from any non-terminal state (spec §4.3.3).
    pub fn invalidate(&mut self) {
        self.state = State::Invalid;
    }

    /// Mark the record as reclaimed by the abandonment detector. Only
    /// valid from `Allocated` (spec §4.5 step 1); returns `false` if the
    /// record had already left that state (e.g. a racing legitimate
    /// return), in which case the caller must skip it.
    #[must_use]
    pub fn mark_abandoned(&mut self) -> bool {
        if self.state == State::Allocated {
            self.state = State::Abandoned;
            true
        } else {
            false
        }
    }

    /// Update `last_use_time` (called by the borrow guard on each touch
    /// when `use_usage_tracking` is enabled) and optionally capture a
    /// call-site trace.
    pub fn touch(&mut self, now: Instant, trace: Option<String>) {
        self.last_use_time = now;
        if trace.is_some() {
            self.last_use_trace = trace;
        }
    }

    /// How long the record has been idle, as of `now`.
    #[must_use]
    pub fn idle_time(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_return_time)
    }

    /// How long the record has been allocated, as of `now`.
    #[must_use]
    pub fn active_time(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_borrow_time)
    }

    /// How long since the instance was last used, as of `now` — the
    /// quantity the abandonment detector compares against
    /// `abandoned_timeout` (spec §4.5).
    #[must_use]
    pub fn since_last_use(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_use_time)
    }

    fn require(&self, allowed: &[State]) -> Result<(), PoolError> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(PoolError::IllegalState(format!(
                "expected one of {allowed:?}, found {:?}",
                self.state
            )))
        }
    }

    /// Split into the bare instance and its metadata, for the duration the
    /// instance is out on loan to a caller and the pool only needs to keep
    /// track of state and timestamps (spec §5 — the instance itself is
    /// owned by the `BorrowGuard`, not the pool, while allocated).
    pub(crate) fn split(self) -> (T, RecordMeta) {
        (
            self.instance,
            RecordMeta {
                state: self.state,
                create_time: self.create_time,
                wall_create_time: self.wall_create_time,
                last_borrow_time: self.last_borrow_time,
                last_return_time: self.last_return_time,
                last_use_time: self.last_use_time,
                borrow_count: self.borrow_count,
                last_use_trace: self.last_use_trace,
            },
        )
    }
}

/// The timestamp/state half of a [`PooledObject`], kept by the pool for
/// allocated records whose instance has been handed to a caller.
#[derive(Debug, Clone)]
pub(crate) struct RecordMeta {
    pub state: State,
    pub create_time: Instant,
    pub wall_create_time: DateTime<Local>,
    pub last_borrow_time: Instant,
    pub last_return_time: Instant,
    pub last_use_time: Instant,
    pub borrow_count: u64,
    pub last_use_trace: Option<String>,
}

impl RecordMeta {
    /// Rejoin with the instance, reconstructing the full record.
    pub(crate) fn rejoin<T>(self, instance: T) -> PooledObject<T> {
        PooledObject {
            instance,
            state: self.state,
            create_time: self.create_time,
            wall_create_time: self.wall_create_time,
            last_borrow_time: self.last_borrow_time,
            last_return_time: self.last_return_time,
            last_use_time: self.last_use_time,
            borrow_count: self.borrow_count,
            last_use_trace: self.last_use_trace,
        }
    }

    /// Mark the record as reclaimed by the abandonment detector. See
    /// [`PooledObject::mark_abandoned`].
    #[must_use]
    pub(crate) fn mark_abandoned(&mut self) -> bool {
        if self.state == State::Allocated {
            self.state = State::Abandoned;
            true
        } else {
            false
        }
    }

    /// Update `last_use_time` and optionally the call-site trace. See
    /// [`PooledObject::touch`].
    pub(crate) fn touch(&mut self, now: Instant, trace: Option<String>) {
        self.last_use_time = now;
        if trace.is_some() {
            self.last_use_trace = trace;
        }
    }

    /// See [`PooledObject::since_last_use`].
    #[must_use]
    pub(crate) fn since_last_use(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_use_time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn new_record_starts_idle() {
        let rec = PooledObject::new(42);
        assert_eq!(rec.state(), State::Idle);
        assert_eq!(rec.borrow_count(), 0);
    }

    #[test]
    fn allocate_from_idle_succeeds_and_bumps_borrow_count() {
        let mut rec = PooledObject::new(());
        rec.allocate(Instant::now()).unwrap();
        assert_eq!(rec.state(), State::Allocated);
        assert_eq!(rec.borrow_count(), 1);
    }

    #[test]
    fn allocate_twice_fails() {
        let mut rec = PooledObject::new(());
        rec.allocate(Instant::now()).unwrap();
        let err = rec.allocate(Instant::now()).unwrap_err();
        assert!(matches!(err, PoolError::IllegalState(_)));
    }

    #[test]
    fn deallocate_from_allocated_returns_to_idle() {
        let mut rec = PooledObject::new(());
        rec.allocate(Instant::now()).unwrap();
        rec.deallocate(Instant::now()).unwrap();
        assert_eq!(rec.state(), State::Idle);
    }

    #[test]
    fn deallocate_from_idle_fails() {
        let mut rec = PooledObject::new(());
        assert!(rec.deallocate(Instant::now()).is_err());
    }

    #[test]
    fn begin_end_eviction_round_trip() {
        let mut rec = PooledObject::new(());
        rec.begin_eviction().unwrap();
        assert_eq!(rec.state(), State::Eviction);
        rec.end_eviction(Instant::now()).unwrap();
        assert_eq!(rec.state(), State::Idle);
    }

    #[test]
    fn invalidate_is_unconditional() {
        let mut rec = PooledObject::new(());
        rec.invalidate();
        assert_eq!(rec.state(), State::Invalid);

        let mut rec2 = PooledObject::new(());
        rec2.allocate(Instant::now()).unwrap();
        rec2.invalidate();
        assert_eq!(rec2.state(), State::Invalid);
    }

    #[test]
    fn mark_abandoned_only_from_allocated() {
        let mut idle = PooledObject::new(());
        assert!(!idle.mark_abandoned());

        let mut allocated = PooledObject::new(());
        allocated.allocate(Instant::now()).unwrap();
        assert!(allocated.mark_abandoned());
        assert_eq!(allocated.state(), State::Abandoned);
    }

    #[test]
    fn idle_time_grows_after_return() {
        let mut rec = PooledObject::new(());
        rec.allocate(Instant::now()).unwrap();
        rec.deallocate(Instant::now()).unwrap();
        sleep(Duration::from_millis(5));
        assert!(rec.idle_time(Instant::now()) >= Duration::from_millis(5));
    }

    #[test]
    fn touch_updates_last_use_time_and_optional_trace() {
        let mut rec = PooledObject::new(());
        rec.allocate(Instant::now()).unwrap();
        let before = rec.last_use_time();
        sleep(Duration::from_millis(2));
        rec.touch(Instant::now(), Some("caller.rs:10".to_string()));
        assert!(rec.last_use_time() > before);
        assert_eq!(rec.last_use_trace.as_deref(), Some("caller.rs:10"));
    }

    #[test]
    fn split_and_rejoin_round_trips_state() {
        let mut rec = PooledObject::new("payload".to_string());
        rec.allocate(Instant::now()).unwrap();
        let (instance, meta) = rec.split();
        assert_eq!(instance, "payload");
        assert_eq!(meta.state, State::Allocated);
        let rejoined = meta.rejoin(instance);
        assert_eq!(rejoined.state(), State::Allocated);
        assert_eq!(rejoined.instance, "payload");
    }

    #[test]
    fn touch_without_trace_preserves_previous_trace() {
        let mut rec = PooledObject::new(());
        rec.touch(Instant::now(), Some("first".to_string()));
        rec.touch(Instant::now(), None);
        assert_eq!(rec.last_use_trace.as_deref(), Some("first"));
    }
}
