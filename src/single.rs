//! The Borrow/Return State Machine (spec §4.3 — component C3).
//!
//! [`SinglePool`] is the unkeyed pool: a thin, cheaply-cloneable handle
//! around the real state in [`Shared`]. The keyed multiplexer
//! ([`crate::keyed::KeyedPool`]) is a map of these, one per key.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{oneshot, Notify};
use tokio_util::sync::CancellationToken;

use crate::config::{ExhaustedAction, PoolConfig};
use crate::counters::{CounterSnapshot, Counters, DestroyCause};
use crate::error::{PoolError, PoolResult};
use crate::events::{EventBus, PoolEvent};
use crate::factory::{destroy_swallowing_errors, DestroyReason, Factory};
use crate::guard::{BorrowGuard, ReturnSink};
use crate::idle::{DequeIdleStore, IdleStore};
use crate::log_writer::{format_abandonment_record, LogWriter, TracingLogWriter};
use crate::record::{PooledObject, RecordMeta, State};

/// The unkeyed pool: one factory, one set of tunables, one idle store.
pub struct SinglePool<F: Factory> {
    inner: Arc<Shared<F>>,
}

impl<F: Factory> Clone for SinglePool<F> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<F: Factory> std::fmt::Debug for SinglePool<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("SinglePool")
            .field("pool_key", &self.inner.pool_key)
            .field("num_idle", &state.idle.len())
            .field("num_allocated", &state.allocated.len())
            .field("closed", &self.inner.closed.load(AtomicOrdering::SeqCst))
            .finish()
    }
}

struct PoolState<T> {
    idle: Box<dyn IdleStore<T>>,
    allocated: HashMap<u64, RecordMeta>,
    /// In-flight factory `create` calls not yet committed as allocated,
    /// counted against `max_active` so concurrent borrows can't overrun it.
    reserved: usize,
}

impl<T> PoolState<T> {
    fn active_count(&self) -> usize {
        self.allocated
            .values()
            .filter(|m| m.state == State::Allocated)
            .count()
            + self.reserved
    }
}

/// The pool's real state, held behind an `Arc` so [`BorrowGuard`] can keep
/// a `Weak<dyn ReturnSink>` back-handle into it without a reference cycle.
struct Shared<F: Factory> {
    factory: F,
    config: PoolConfig,
    state: Mutex<PoolState<F::Item>>,
    notify: Notify,
    waiters: Mutex<VecDeque<oneshot::Sender<()>>>,
    next_id: AtomicU64,
    counters: Counters,
    events: EventBus,
    log_writer: Box<dyn LogWriter>,
    closed: AtomicBool,
    pool_key: String,
}

enum WaitOutcome {
    Signaled,
    TimedOut,
    Interrupted,
}

enum CreateOutcome {
    FactoryFailed(PoolError),
    ValidationFailed,
}

impl<F: Factory> SinglePool<F> {
    /// Build a pool with the default idle store (LIFO/FIFO deque).
    pub fn new(factory: F, config: PoolConfig) -> PoolResult<Self> {
        Self::with_idle_store(factory, config, Box::new(DequeIdleStore::new()))
    }

    /// Build a pool with a caller-supplied idle store implementation
    /// (spec §9 "selected at construction").
    pub fn with_idle_store(
        factory: F,
        config: PoolConfig,
        idle: Box<dyn IdleStore<F::Item>>,
    ) -> PoolResult<Self> {
        Self::with_idle_store_and_key(factory, config, idle, "default".to_string())
    }

    /// Build a pool identified by `pool_key` in events/logs — used by the
    /// keyed multiplexer, whose sub-pools are otherwise plain
    /// [`SinglePool`]s (spec §4.6 "C6 wraps C2-C3 per key").
    pub(crate) fn with_idle_store_and_key(
        factory: F,
        config: PoolConfig,
        idle: Box<dyn IdleStore<F::Item>>,
        pool_key: String,
    ) -> PoolResult<Self> {
        config.validate()?;
        Ok(Self {
            inner: Arc::new(Shared {
                factory,
                config,
                state: Mutex::new(PoolState {
                    idle,
                    allocated: HashMap::new(),
                    reserved: 0,
                }),
                notify: Notify::new(),
                waiters: Mutex::new(VecDeque::new()),
                next_id: AtomicU64::new(0),
                counters: Counters::new(),
                events: EventBus::default(),
                log_writer: Box::new(TracingLogWriter),
                closed: AtomicBool::new(false),
                pool_key,
            }),
        })
    }

    /// The key this pool is identified by in events/logs (`"default"` for
    /// a plain unkeyed pool).
    #[must_use]
    pub fn pool_key(&self) -> &str {
        &self.inner.pool_key
    }

    /// Pop and destroy this pool's single oldest idle record, if any.
    /// Used by the keyed multiplexer's cross-key LRU eviction (spec §4.6).
    /// Returns whether a record was evicted.
    pub(crate) async fn evict_oldest_idle(&self) -> bool {
        let popped = {
            let mut state = self.inner.state.lock();
            state.idle.pop_oldest(1)
        };
        let Some(record) = popped.into_iter().next() else {
            return false;
        };
        destroy_swallowing_errors(&self.inner.factory, record.instance, DestroyReason::Eviction).await;
        self.inner.counters.record_destroyed(DestroyCause::Eviction);
        self.inner.events.emit(PoolEvent::Destroyed {
            pool_key: self.inner.pool_key.clone(),
            reason: DestroyReason::Eviction,
        });
        true
    }

    /// `last_return_time` of this pool's oldest idle record, without
    /// removing it — lets the keyed multiplexer compare candidates across
    /// keys before committing to an eviction.
    #[must_use]
    pub(crate) fn oldest_idle_return_time(&self) -> Option<Instant> {
        let mut state = self.inner.state.lock();
        let popped = state.idle.pop_oldest(1);
        let ts = popped.first().map(PooledObject::last_return_time);
        for record in popped {
            state.idle.push(record);
        }
        ts
    }

    /// Total records (allocated + idle) currently held by this sub-pool,
    /// the per-key contribution to the keyed multiplexer's global total.
    #[must_use]
    pub fn total_count(&self) -> usize {
        let state = self.inner.state.lock();
        state.active_count() + state.idle.len()
    }

    /// The configuration snapshot this pool was built with.
    #[must_use]
    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    /// Subscribe to lifecycle events (spec §11).
    #[must_use]
    pub fn subscribe_events(&self) -> tokio::sync::broadcast::Receiver<PoolEvent> {
        self.inner.events.subscribe()
    }

    /// A snapshot of the pool's monotonic counters and derived gauges.
    #[must_use]
    pub fn stats(&self) -> CounterSnapshot {
        CounterSnapshot::from(&self.inner.counters)
    }

    /// Current number of allocated (checked-out, non-abandoned) records.
    #[must_use]
    pub fn num_active(&self) -> usize {
        self.inner.state.lock().active_count()
    }

    /// Current number of idle records.
    #[must_use]
    pub fn num_idle(&self) -> usize {
        self.inner.state.lock().idle.len()
    }

    /// Borrow an instance, waiting up to `config.max_wait` under the
    /// `Block` exhaustion policy (spec §4.3.1).
    pub async fn borrow(&self) -> PoolResult<BorrowGuard<F::Item>> {
        self.inner.borrow(None).await
    }

    /// Borrow an instance, also waking early with [`PoolError::Interrupted`]
    /// if `cancel` fires while blocked (spec §4.3.1 wake condition (d)).
    pub async fn borrow_cancellable(
        &self,
        cancel: &CancellationToken,
    ) -> PoolResult<BorrowGuard<F::Item>> {
        self.inner.borrow(Some(cancel)).await
    }

    /// Eagerly create one instance and place it into idle (spec §4.3
    /// `add_idle()`).
    pub async fn add_idle(&self) -> PoolResult<()> {
        self.inner.add_idle().await
    }

    /// Destroy all idle records (spec §4.3 `clear()`).
    pub async fn clear(&self) {
        self.inner.evict_everything().await;
    }

    /// Destroy all idle records immediately, regardless of threshold
    /// (spec's `evict_everything` administrative operation).
    pub async fn evict_everything(&self) {
        self.inner.evict_everything().await;
    }

    /// Close the pool: destroy all idle, wake every waiter so they observe
    /// `Closed`, and fail subsequent borrows. Records already allocated may
    /// still be returned/invalidated (spec §4.3 `close()`).
    pub async fn close(&self) {
        self.inner.close().await;
    }

    /// Run the Abandonment Detector (spec §4.5) once, synchronously.
    pub async fn reap_abandoned(&self) -> usize {
        self.inner.reap_abandoned().await
    }

    /// Run one Eviction Engine sweep (spec §4.4).
    pub async fn run_eviction_sweep(&self) {
        self.inner.run_eviction_sweep().await;
    }

    /// Spawn the background maintenance task (spec §4.4's periodic
    /// evictor, plus abandonment reclamation when
    /// `remove_abandoned_on_maintenance` is set) if
    /// `time_between_eviction_runs` is configured.
    ///
    /// Returns `None` when the background evictor is disabled; the caller
    /// is still free to invoke [`Self::run_eviction_sweep`] manually.
    #[must_use]
    pub fn spawn_maintenance(&self, cancel: CancellationToken) -> Option<crate::eviction::EvictionRunner> {
        let period = self.inner.config.time_between_eviction_runs?;
        let runner = crate::eviction::EvictionRunner::new(period, cancel);
        let pool = self.clone();
        runner.start(move || {
            let pool = pool.clone();
            async move {
                pool.run_eviction_sweep().await;
                if pool.inner.config.remove_abandoned_on_maintenance {
                    pool.reap_abandoned().await;
                }
            }
        });
        Some(runner)
    }
}

impl<F: Factory> Shared<F> {
    async fn borrow(
        self: &Arc<Self>,
        cancel: Option<&CancellationToken>,
    ) -> PoolResult<BorrowGuard<F::Item>> {
        let start = Instant::now();
        let deadline = self.config.max_wait.map(|d| start + d);
        let mut attempts_budget = self.state.lock().idle.len() + 1;

        loop {
            if self.closed.load(AtomicOrdering::SeqCst) {
                return Err(PoolError::Closed);
            }

            if self.config.remove_abandoned_on_borrow {
                self.reap_abandoned().await;
            }

            if let Some(record) = self.take_idle_candidate() {
                match self.activate_and_validate(record).await {
                    Ok(record) => return Ok(self.commit_allocated(record, start)),
                    Err(()) => {
                        if attempts_budget == 0 {
                            return Err(PoolError::NoSuchElement);
                        }
                        attempts_budget -= 1;
                        continue;
                    }
                }
            }

            if self.try_reserve_slot() {
                match self.create_and_commit(start).await {
                    Ok(guard) => return Ok(guard),
                    Err(CreateOutcome::FactoryFailed(e)) => return Err(e),
                    Err(CreateOutcome::ValidationFailed) => {
                        if attempts_budget == 0 {
                            return Err(PoolError::NoSuchElement);
                        }
                        attempts_budget -= 1;
                        continue;
                    }
                }
            }

            match self.config.exhausted_action {
                ExhaustedAction::Fail => return Err(PoolError::NoSuchElement),
                ExhaustedAction::Grow => match self.create_and_commit(start).await {
                    Ok(guard) => return Ok(guard),
                    Err(CreateOutcome::FactoryFailed(e)) => return Err(e),
                    Err(CreateOutcome::ValidationFailed) => continue,
                },
                ExhaustedAction::Block => {
                    self.counters.waiter_started();
                    self.events.emit(PoolEvent::Exhausted {
                        pool_key: self.pool_key.clone(),
                        waiters: self.counters.num_waiters().max(0) as usize,
                    });
                    let outcome = self.wait_for_signal(deadline, cancel).await;
                    self.counters.waiter_finished();
                    match outcome {
                        WaitOutcome::Signaled => continue,
                        WaitOutcome::TimedOut => return Err(PoolError::NoSuchElement),
                        WaitOutcome::Interrupted => return Err(PoolError::Interrupted),
                    }
                }
            }
        }
    }

    fn take_idle_candidate(&self) -> Option<PooledObject<F::Item>> {
        self.state.lock().idle.poll(self.config.ordering)
    }

    /// Reserve a capacity slot for a new `create`, if `max_active` allows.
    fn try_reserve_slot(&self) -> bool {
        let mut state = self.state.lock();
        if self.config.max_active.allows(state.active_count()) {
            state.reserved += 1;
            true
        } else {
            false
        }
    }

    fn release_reservation(&self) {
        let mut state = self.state.lock();
        state.reserved = state.reserved.saturating_sub(1);
    }

    /// Run `activate`, then `test_on_borrow` if enabled, against an idle
    /// candidate. On failure the record is destroyed and `Err(())` is
    /// returned so the caller retries from the top of the borrow loop.
    async fn activate_and_validate(
        &self,
        mut record: PooledObject<F::Item>,
    ) -> Result<PooledObject<F::Item>, ()> {
        if self.factory.activate(&mut record.instance).await.is_err() {
            self.destroy_idle_candidate(record, DestroyReason::ValidationFailed).await;
            return Err(());
        }
        if self.config.test_on_borrow && !self.factory.validate(&record.instance).await {
            self.destroy_idle_candidate(record, DestroyReason::ValidationFailed).await;
            return Err(());
        }
        Ok(record)
    }

    async fn destroy_idle_candidate(&self, record: PooledObject<F::Item>, reason: DestroyReason) {
        destroy_swallowing_errors(&self.factory, record.instance, reason).await;
        self.counters.record_destroyed(DestroyCause::BorrowValidation);
        self.events.emit(PoolEvent::Destroyed {
            pool_key: self.pool_key.clone(),
            reason,
        });
    }

    /// Finish committing a just-validated idle or freshly-created record as
    /// `Allocated`.
    fn commit_allocated(
        self: &Arc<Self>,
        mut record: PooledObject<F::Item>,
        borrow_start: Instant,
    ) -> BorrowGuard<F::Item> {
        let now = Instant::now();
        record.allocate(now).expect("record is allocatable");
        let (instance, meta) = record.split();
        let id = self.next_id.fetch_add(1, AtomicOrdering::Relaxed);
        self.state.lock().allocated.insert(id, meta);

        let wait = now.saturating_duration_since(borrow_start);
        self.counters.record_borrowed(wait);
        self.events.emit(PoolEvent::Borrowed {
            pool_key: self.pool_key.clone(),
            wait,
        });

        let sink: Weak<dyn ReturnSink<F::Item>> = Arc::downgrade(self) as Weak<dyn ReturnSink<F::Item>>;
        BorrowGuard::new(id, instance, sink, self.config.use_usage_tracking)
    }

    async fn create_and_commit(
        self: &Arc<Self>,
        borrow_start: Instant,
    ) -> Result<BorrowGuard<F::Item>, CreateOutcome> {
        let item = match self.factory.create().await {
            Ok(item) => item,
            Err(e) => {
                self.release_reservation();
                return Err(CreateOutcome::FactoryFailed(PoolError::factory(e)));
            }
        };
        let mut record = PooledObject::new(item);
        if self.factory.activate(&mut record.instance).await.is_err() {
            self.release_reservation();
            destroy_swallowing_errors(&self.factory, record.instance, DestroyReason::ValidationFailed).await;
            self.counters.record_destroyed(DestroyCause::BorrowValidation);
            self.events.emit(PoolEvent::Destroyed {
                pool_key: self.pool_key.clone(),
                reason: DestroyReason::ValidationFailed,
            });
            return Err(CreateOutcome::ValidationFailed);
        }
        if self.config.test_on_create && !self.factory.validate(&record.instance).await {
            self.release_reservation();
            destroy_swallowing_errors(&self.factory, record.instance, DestroyReason::ValidationFailed).await;
            self.counters.record_destroyed(DestroyCause::BorrowValidation);
            self.events.emit(PoolEvent::Destroyed {
                pool_key: self.pool_key.clone(),
                reason: DestroyReason::ValidationFailed,
            });
            return Err(CreateOutcome::ValidationFailed);
        }

        self.counters.record_created();
        self.events.emit(PoolEvent::Created {
            pool_key: self.pool_key.clone(),
        });
        self.release_reservation();
        Ok(self.commit_allocated(record, borrow_start))
    }

    /// Return a borrowed instance, running the return algorithm (spec
    /// §4.3.2). Called by the spawned task in `BorrowGuard::drop`.
    async fn do_return(&self, id: u64, item: F::Item) {
        let meta = {
            let mut state = self.state.lock();
            state.allocated.remove(&id)
        };
        let Some(meta) = meta else {
            // Unknown id: the guard outlived a `clear`/`close`, or double
            // return. Nothing sensible to do but drop the instance.
            return;
        };

        if meta.state == State::Abandoned {
            // The straggler's own return of a record the detector already
            // reclaimed (spec §4.5): no-op toward idle, but the factory
            // still gets its destroy call now that the instance is back.
            self.log_abandoned(&meta);
            destroy_swallowing_errors(&self.factory, item, DestroyReason::Abandoned).await;
            self.counters.record_destroyed(DestroyCause::Abandonment);
            self.events.emit(PoolEvent::Destroyed {
                pool_key: self.pool_key.clone(),
                reason: DestroyReason::Abandoned,
            });
            self.signal_one();
            return;
        }

        let mut record = meta.rejoin(item);
        let active_time = record.active_time(Instant::now());
        record.begin_return().expect("allocated record can begin return");

        if self.closed.load(AtomicOrdering::SeqCst) {
            destroy_swallowing_errors(&self.factory, record.instance, DestroyReason::Normal).await;
            self.counters.record_destroyed(DestroyCause::Normal);
            self.events.emit(PoolEvent::Destroyed {
                pool_key: self.pool_key.clone(),
                reason: DestroyReason::Normal,
            });
            self.signal_one();
            return;
        }

        if self.config.test_on_return && !self.factory.validate(&record.instance).await {
            destroy_swallowing_errors(&self.factory, record.instance, DestroyReason::ValidationFailed).await;
            self.counters.record_destroyed(DestroyCause::Normal);
            self.events.emit(PoolEvent::Destroyed {
                pool_key: self.pool_key.clone(),
                reason: DestroyReason::ValidationFailed,
            });
            self.signal_one();
            return;
        }

        if self.factory.passivate(&mut record.instance).await.is_err() {
            destroy_swallowing_errors(&self.factory, record.instance, DestroyReason::PassivationFailed).await;
            self.counters.record_destroyed(DestroyCause::Normal);
            self.events.emit(PoolEvent::Destroyed {
                pool_key: self.pool_key.clone(),
                reason: DestroyReason::PassivationFailed,
            });
            self.signal_one();
            return;
        }

        let now = Instant::now();
        record.deallocate(now).expect("returning record can deallocate");

        let mut state = self.state.lock();
        if !self.config.max_idle.allows(state.idle.len()) {
            drop(state);
            destroy_swallowing_errors(&self.factory, record.instance, DestroyReason::Normal).await;
            self.counters.record_destroyed(DestroyCause::Normal);
            self.events.emit(PoolEvent::Destroyed {
                pool_key: self.pool_key.clone(),
                reason: DestroyReason::Normal,
            });
        } else {
            state.idle.push(record);
            drop(state);
            self.counters.record_returned(active_time);
            self.events.emit(PoolEvent::Returned {
                pool_key: self.pool_key.clone(),
                active_time,
            });
        }
        self.signal_one();
    }

    /// Unconditionally destroy a borrowed instance (spec §4.3.3).
    async fn do_invalidate(&self, id: u64, item: F::Item) {
        let meta = {
            let mut state = self.state.lock();
            state.allocated.remove(&id)
        };
        let Some(meta) = meta else {
            return;
        };
        let reason = if meta.state == State::Abandoned {
            self.log_abandoned(&meta);
            DestroyReason::Abandoned
        } else {
            DestroyReason::Normal
        };
        destroy_swallowing_errors(&self.factory, item, reason).await;
        self.counters.record_destroyed(if reason == DestroyReason::Abandoned {
            DestroyCause::Abandonment
        } else {
            DestroyCause::Normal
        });
        self.events.emit(PoolEvent::Destroyed {
            pool_key: self.pool_key.clone(),
            reason,
        });
        self.signal_one();
    }

    fn log_abandoned(&self, meta: &RecordMeta) {
        if self.config.log_abandoned {
            let record = format_abandonment_record(meta.wall_create_time, meta.last_use_trace.as_deref());
            self.log_writer.write_record(&record);
        }
    }

    fn do_touch(&self, id: u64, now: Instant, trace: Option<String>) {
        if let Some(meta) = self.state.lock().allocated.get_mut(&id) {
            meta.touch(now, trace);
        }
    }

    async fn reap_abandoned(&self) -> usize {
        let now = Instant::now();
        let reclaimed = {
            let mut state = self.state.lock();
            crate::abandoned::scan_for_abandoned(&mut state.allocated, now, self.config.abandoned_timeout)
        };
        for (_id, meta) in &reclaimed {
            // Only the logical reclaim is counted/logged here; the actual
            // destroy counter, log line, and `Destroyed` event fire once,
            // later, when the straggler's own return/invalidate observes
            // the `Abandoned` state and the instance is physically back.
            self.events.emit(PoolEvent::Abandoned {
                pool_key: self.pool_key.clone(),
                idle_for: meta.since_last_use(now),
            });
            // The slot is logically free immediately; wake a blocked
            // borrower even though the instance itself hasn't physically
            // returned yet (spec §4.5 step 3).
            self.signal_one();
        }
        reclaimed.len()
    }

    async fn run_eviction_sweep(&self) {
        let batch = {
            let mut state = self.state.lock();
            let n = self.config.eviction_batch_size(state.idle.len());
            state.idle.pop_oldest(n)
        };

        let now = Instant::now();
        for record in batch {
            self.evict_or_keep(record, now).await;
        }

        self.replenish_min_idle().await;
    }

    async fn evict_or_keep(&self, mut record: PooledObject<F::Item>, now: Instant) {
        record.begin_eviction().expect("idle record can begin eviction");
        let idle_time = record.idle_time(now);
        let idle_len = self.state.lock().idle.len();

        if idle_time_exceeds(&self.config, idle_time, idle_len) {
            destroy_swallowing_errors(&self.factory, record.instance, DestroyReason::Eviction).await;
            self.counters.record_destroyed(DestroyCause::Eviction);
            self.events.emit(PoolEvent::Destroyed {
                pool_key: self.pool_key.clone(),
                reason: DestroyReason::Eviction,
            });
            return;
        }

        if self.config.test_while_idle && !self.factory.validate(&record.instance).await {
            destroy_swallowing_errors(&self.factory, record.instance, DestroyReason::ValidationFailed).await;
            self.counters.record_destroyed(DestroyCause::Eviction);
            self.events.emit(PoolEvent::Destroyed {
                pool_key: self.pool_key.clone(),
                reason: DestroyReason::ValidationFailed,
            });
            return;
        }

        self.counters.record_idle_time(idle_time);
        record.end_eviction(Instant::now()).expect("record in eviction state");
        self.state.lock().idle.push(record);
    }

    async fn replenish_min_idle(&self) {
        loop {
            let (idle_len, active_len) = {
                let state = self.state.lock();
                (state.idle.len(), state.active_count())
            };
            if idle_len >= self.config.min_idle {
                break;
            }
            if !self.config.max_active.allows(active_len) && !self.config.max_idle.allows(idle_len) {
                break;
            }
            match self.factory.create().await {
                Ok(mut item) => {
                    if self.factory.activate(&mut item).await.is_err() {
                        break;
                    }
                    let mut record = PooledObject::new(item);
                    if self.factory.passivate(&mut record.instance).await.is_err() {
                        destroy_swallowing_errors(&self.factory, record.instance, DestroyReason::PassivationFailed).await;
                        break;
                    }
                    self.counters.record_created();
                    self.events.emit(PoolEvent::Created {
                        pool_key: self.pool_key.clone(),
                    });
                    self.state.lock().idle.push(record);
                }
                Err(_) => break,
            }
        }
    }

    async fn evict_everything(&self) {
        let drained = self.state.lock().idle.drain_all();
        for record in drained {
            destroy_swallowing_errors(&self.factory, record.instance, DestroyReason::Eviction).await;
            self.counters.record_destroyed(DestroyCause::Eviction);
            self.events.emit(PoolEvent::Destroyed {
                pool_key: self.pool_key.clone(),
                reason: DestroyReason::Eviction,
            });
        }
    }

    async fn add_idle(&self) -> PoolResult<()> {
        let mut item = self.factory.create().await.map_err(PoolError::factory)?;
        self.factory.activate(&mut item).await.map_err(PoolError::factory)?;
        let mut record = PooledObject::new(item);
        if let Err(err) = self.factory.passivate(&mut record.instance).await {
            destroy_swallowing_errors(&self.factory, record.instance, DestroyReason::PassivationFailed).await;
            return Err(PoolError::factory(err));
        }
        self.counters.record_created();
        self.events.emit(PoolEvent::Created {
            pool_key: self.pool_key.clone(),
        });
        self.state.lock().idle.push(record);
        self.signal_one();
        Ok(())
    }

    async fn close(&self) {
        self.closed.store(true, AtomicOrdering::SeqCst);
        self.evict_everything().await;
        self.events.emit(PoolEvent::Closed {
            pool_key: self.pool_key.clone(),
        });
        self.wake_all();
    }

    fn signal_one(&self) {
        if self.config.fairness {
            let mut waiters = self.waiters.lock();
            while let Some(tx) = waiters.pop_front() {
                if tx.send(()).is_ok() {
                    break;
                }
            }
        } else {
            self.notify.notify_one();
        }
    }

    fn wake_all(&self) {
        let mut waiters = self.waiters.lock();
        while let Some(tx) = waiters.pop_front() {
            let _ = tx.send(());
        }
        self.notify.notify_waiters();
    }

    async fn wait_for_signal(&self, deadline: Option<Instant>, cancel: Option<&CancellationToken>) -> WaitOutcome {
        if self.config.fairness {
            let (tx, rx) = oneshot::channel();
            self.waiters.lock().push_back(tx);
            Self::race(rx, deadline, cancel).await
        } else {
            let notified = self.notify.notified();
            Self::race(notified, deadline, cancel).await
        }
    }

    async fn race<Fut: std::future::Future>(
        fut: Fut,
        deadline: Option<Instant>,
        cancel: Option<&CancellationToken>,
    ) -> WaitOutcome {
        match (deadline, cancel) {
            (Some(d), Some(c)) => tokio::select! {
                _ = fut => WaitOutcome::Signaled,
                () = tokio::time::sleep_until(d.into()) => WaitOutcome::TimedOut,
                () = c.cancelled() => WaitOutcome::Interrupted,
            },
            (Some(d), None) => tokio::select! {
                _ = fut => WaitOutcome::Signaled,
                () = tokio::time::sleep_until(d.into()) => WaitOutcome::TimedOut,
            },
            (None, Some(c)) => tokio::select! {
                _ = fut => WaitOutcome::Signaled,
                () = c.cancelled() => WaitOutcome::Interrupted,
            },
            (None, None) => {
                fut.await;
                WaitOutcome::Signaled
            }
        }
    }
}

fn idle_time_exceeds(config: &PoolConfig, idle_time: Duration, idle_len: usize) -> bool {
    if let Some(hard) = config.min_evictable_idle_time
        && idle_time > hard
    {
        return true;
    }
    if let Some(soft) = config.soft_min_evictable_idle_time
        && idle_time > soft
        && idle_len > config.min_idle
    {
        return true;
    }
    false
}

#[async_trait]
impl<F: Factory> ReturnSink<F::Item> for Shared<F> {
    async fn handle_return(&self, id: u64, item: F::Item) {
        self.do_return(id, item).await;
    }

    async fn handle_invalidate(&self, id: u64, item: F::Item) {
        self.do_invalidate(id, item).await;
    }

    fn handle_touch(&self, id: u64, now: Instant, trace: Option<String>) {
        self.do_touch(id, now, trace);
    }
}
