//! Keyed Multiplexer (spec §4.6 — component C6).
//!
//! Wraps C2/C3 ([`SinglePool`]) per key behind a [`DashMap`], enforcing a
//! global cap across keys with cross-key LRU idle eviction and a single
//! fair FIFO queue for waiters. Sub-pools are plain [`SinglePool`]s, each
//! with its own primary lock; the map itself supplies the "outer" locking
//! the spec calls for, sharded rather than a single mutex, so it is never
//! held across a sub-pool's blocking wait by construction.

use std::hash::Hash;
use std::sync::atomic::Ordering as AtomicOrdering;
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::{oneshot, Notify};
use tokio_util::sync::CancellationToken;

use crate::config::{Cap, ExhaustedAction, KeyedPoolConfig, PoolConfig};
use crate::error::PoolError;
use crate::factory::Factory;
use crate::guard::BorrowGuard;
use crate::idle::DequeIdleStore;
use crate::single::SinglePool;

/// Per-key pool multiplexer enforcing per-key and global caps (spec §4.6).
///
/// `F` is cloned once per key, on first touch for that key; the clone is
/// expected to be cheap, the way the teacher's factories wrap an `Arc`
/// handle rather than owning heavyweight state directly.
pub struct KeyedPool<K, F: Factory + Clone> {
    inner: Arc<KeyedShared<K, F>>,
}

impl<K, F: Factory + Clone> Clone for KeyedPool<K, F> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K: Eq + Hash + std::fmt::Debug, F: Factory + Clone> std::fmt::Debug for KeyedPool<K, F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyedPool")
            .field("num_keys", &self.inner.sub_pools.len())
            .field(
                "global_total",
                &self
                    .inner
                    .sub_pools
                    .iter()
                    .map(|e| e.value().num_active() + e.value().num_idle())
                    .sum::<usize>(),
            )
            .finish()
    }
}

struct KeyedShared<K, F: Factory + Clone> {
    factory: F,
    config: KeyedPoolConfig,
    sub_pools: DashMap<K, Arc<SinglePool<F>>>,
    /// Single cross-key FIFO handoff queue (spec §4.6 "fair waiting"):
    /// woken whenever any key's live count changes.
    fair_waiters: Mutex<std::collections::VecDeque<oneshot::Sender<()>>>,
    notify: Notify,
    /// Cancelled on `close()`, stopping every per-key maintenance task
    /// started in `sub_pool()`.
    maintenance_cancel: CancellationToken,
}

enum WaitOutcome {
    Signaled,
    TimedOut,
    Interrupted,
}

impl<K, F> KeyedPool<K, F>
where
    K: Eq + Hash + Clone + Send + Sync + std::fmt::Display + 'static,
    F: Factory + Clone,
{
    /// Construct an empty keyed pool. Sub-pools are created lazily on
    /// first touch for a key (spec §4.6 "key lifecycle").
    pub fn new(factory: F, config: KeyedPoolConfig) -> crate::error::PoolResult<Self> {
        config.validate()?;
        Ok(Self {
            inner: Arc::new(KeyedShared {
                factory,
                config,
                sub_pools: DashMap::new(),
                fair_waiters: Mutex::new(std::collections::VecDeque::new()),
                notify: Notify::new(),
                maintenance_cancel: CancellationToken::new(),
            }),
        })
    }

    /// Subscribe to one key's lifecycle events. Each key has its own event
    /// bus (inherited from its [`SinglePool`]); there is no single
    /// cross-key event stream.
    #[must_use]
    pub fn subscribe_events(&self, key: K) -> tokio::sync::broadcast::Receiver<crate::events::PoolEvent> {
        self.sub_pool(&key).subscribe_events()
    }

    /// Borrow an instance for `key`, waiting under `Block` per the base
    /// exhaustion policy if the global or per-key cap is reached and
    /// cross-key LRU eviction can't free a slot.
    pub async fn borrow(&self, key: K) -> crate::error::PoolResult<BorrowGuard<F::Item>> {
        self.borrow_cancellable(key, None).await
    }

    /// As [`Self::borrow`], also waking early with [`PoolError::Interrupted`]
    /// if `cancel` fires while blocked.
    pub async fn borrow_cancellable(
        &self,
        key: K,
        cancel: Option<&CancellationToken>,
    ) -> crate::error::PoolResult<BorrowGuard<F::Item>> {
        let start = Instant::now();
        let deadline = self.inner.config.base.max_wait.map(|d| start + d);

        loop {
            let sub = self.sub_pool(&key);

            if self.has_room_for(&sub) {
                match sub.borrow_cancellable(cancel.unwrap_or(&CancellationToken::new())).await {
                    Ok(guard) => return Ok(guard),
                    Err(e) => return Err(e),
                }
            }

            if self.evict_lru_across_other_keys(&key).await {
                continue;
            }

            match self.inner.config.base.exhausted_action {
                ExhaustedAction::Fail => return Err(PoolError::NoSuchElement),
                ExhaustedAction::Grow => {
                    return sub.borrow_cancellable(cancel.unwrap_or(&CancellationToken::new())).await;
                }
                ExhaustedAction::Block => {
                    let outcome = self.wait_for_room(deadline, cancel).await;
                    match outcome {
                        WaitOutcome::Signaled => continue,
                        WaitOutcome::TimedOut => return Err(PoolError::NoSuchElement),
                        WaitOutcome::Interrupted => return Err(PoolError::Interrupted),
                    }
                }
            }
        }
    }

    /// Destroy all idle records across every key (spec's `clear()` /
    /// `evict_everything`, applied keyed-wide).
    pub async fn clear(&self) {
        let keys: Vec<_> = self
            .inner
            .sub_pools
            .iter()
            .map(|e| Arc::clone(e.value()))
            .collect();
        for sub in keys {
            sub.evict_everything().await;
        }
    }

    /// Close every sub-pool and stop accepting new ones.
    pub async fn close(&self) {
        let keys: Vec<_> = self
            .inner
            .sub_pools
            .iter()
            .map(|e| Arc::clone(e.value()))
            .collect();
        for sub in keys {
            sub.close().await;
        }
        self.inner.maintenance_cancel.cancel();
        self.inner.notify.notify_waiters();
        let mut waiters = self.inner.fair_waiters.lock();
        while let Some(tx) = waiters.pop_front() {
            let _ = tx.send(());
        }
    }

    /// Current number of live sub-pools (keys touched at least once).
    #[must_use]
    pub fn num_keys(&self) -> usize {
        self.inner.sub_pools.len()
    }

    /// Σ|allocated(k)| + Σ|idle(k)| across every key (spec §4.6 "outer"
    /// counter). Computed directly from each sub-pool's own counts rather
    /// than reconstructed from a best-effort broadcast stream, since a
    /// lossy `Lagged` event would otherwise permanently desync the hard
    /// cap this number gates.
    #[must_use]
    pub fn global_total(&self) -> usize {
        self.inner
            .sub_pools
            .iter()
            .map(|e| e.value().num_active() + e.value().num_idle())
            .sum()
    }

    fn sub_pool(&self, key: &K) -> Arc<SinglePool<F>> {
        if let Some(existing) = self.inner.sub_pools.get(key) {
            return Arc::clone(existing.value());
        }

        let per_key_active = effective_cap(self.inner.config.base.max_active, self.inner.config.max_per_key);
        let sub_config = PoolConfig {
            max_active: per_key_active,
            ..self.inner.config.base.clone()
        };
        let pool = SinglePool::with_idle_store_and_key(
            self.inner.factory.clone(),
            sub_config,
            Box::new(DequeIdleStore::new()),
            key.to_string(),
        )
        .expect("per-key config inherits validated base config");
        let pool = Arc::new(pool);

        self.spawn_waiter_wake(Arc::clone(&pool));
        // Each key gets its own eviction/abandonment maintenance loop,
        // same as an unkeyed SinglePool would if the caller opted in.
        let _runner = pool.spawn_maintenance(self.inner.maintenance_cancel.clone());

        self.inner
            .sub_pools
            .entry(key.clone())
            .or_insert_with(|| pool)
            .value()
            .clone()
    }

    /// Subscribe to one sub-pool's events purely to wake cross-key waiters
    /// (`global_total()` itself is computed synchronously from live
    /// sub-pool counts, never from this stream). A borrow returned,
    /// destroyed, created or reclaimed on *any* key can free or add a slot
    /// another key is blocked on, so every one of those wakes the queue;
    /// a `Lagged` gap is treated the same way since a spurious wake only
    /// costs the waiter a re-check, while a missed one would hang it
    /// until `max_wait`.
    fn spawn_waiter_wake(&self, sub: Arc<SinglePool<F>>) {
        let mut rx = sub.subscribe_events();
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(
                        crate::events::PoolEvent::Created { .. }
                        | crate::events::PoolEvent::Destroyed { .. }
                        | crate::events::PoolEvent::Returned { .. }
                        | crate::events::PoolEvent::Abandoned { .. },
                    )
                    | Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {
                        if inner.config.base.fairness {
                            let mut waiters = inner.fair_waiters.lock();
                            while let Some(tx) = waiters.pop_front() {
                                if tx.send(()).is_ok() {
                                    break;
                                }
                            }
                        } else {
                            inner.notify.notify_one();
                        }
                    }
                    Ok(_) => {}
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }

    fn has_room_for(&self, sub: &SinglePool<F>) -> bool {
        if sub.num_idle() > 0 {
            return true;
        }
        let under_per_key = sub.config().max_active.allows(sub.num_active());
        let under_global = self.inner.config.max_total.allows(self.global_total());
        under_per_key && under_global
    }

    /// Select the globally least-recently-returned idle record across
    /// every key other than `key` and destroy it, freeing one global slot
    /// (spec §4.6 "global-cap eviction for idle").
    async fn evict_lru_across_other_keys(&self, key: &K) -> bool {
        if self.inner.config.max_total.allows(self.global_total()) {
            return false;
        }

        let mut best: Option<(Arc<SinglePool<F>>, Instant)> = None;
        for entry in self.inner.sub_pools.iter() {
            if entry.key() == key {
                continue;
            }
            let sub = entry.value();
            if let Some(ts) = sub.oldest_idle_return_time()
                && best.as_ref().is_none_or(|(_, best_ts)| ts < *best_ts)
            {
                best = Some((Arc::clone(sub), ts));
            }
        }

        match best {
            Some((sub, _)) => sub.evict_oldest_idle().await,
            None => false,
        }
    }

    async fn wait_for_room(
        &self,
        deadline: Option<Instant>,
        cancel: Option<&CancellationToken>,
    ) -> WaitOutcome {
        if self.inner.config.base.fairness {
            let (tx, rx) = oneshot::channel();
            self.inner.fair_waiters.lock().push_back(tx);
            Self::race(rx, deadline, cancel).await
        } else {
            let notified = self.inner.notify.notified();
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

fn effective_cap(base: Cap, per_key: Cap) -> Cap {
    match (base, per_key) {
        (Cap::Bounded(a), Cap::Bounded(b)) => Cap::Bounded(a.min(b)),
        (Cap::Bounded(a), Cap::Unbounded) => Cap::Bounded(a),
        (Cap::Unbounded, Cap::Bounded(b)) => Cap::Bounded(b),
        (Cap::Unbounded, Cap::Unbounded) => Cap::Unbounded,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PoolConfigBuilder;
    use crate::factory::DestroyReason;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;

    #[derive(Debug, thiserror::Error)]
    #[error("factory failure")]
    struct TestErr;

    #[derive(Clone)]
    struct CountingFactory {
        created: Arc<AtomicU32>,
    }

    impl CountingFactory {
        fn new() -> Self {
            Self {
                created: Arc::new(AtomicU32::new(0)),
            }
        }
    }

    #[async_trait]
    impl Factory for CountingFactory {
        type Item = u32;
        type Error = TestErr;

        async fn create(&self) -> Result<Self::Item, Self::Error> {
            Ok(self.created.fetch_add(1, AtomicOrdering::SeqCst))
        }

        async fn destroy(&self, _item: Self::Item, _reason: DestroyReason) -> Result<(), Self::Error> {
            Ok(())
        }
    }

    fn keyed_config(max_per_key: usize, max_total: usize) -> KeyedPoolConfig {
        KeyedPoolConfig {
            base: PoolConfigBuilder::new()
                .max_active(max_per_key)
                .max_idle(max_per_key)
                .exhausted_action(ExhaustedAction::Fail)
                .build()
                .unwrap(),
            max_per_key: Cap::Bounded(max_per_key),
            max_total: Cap::Bounded(max_total),
        }
    }

    #[tokio::test]
    async fn borrow_creates_lazily_per_key() {
        let pool = KeyedPool::new(CountingFactory::new(), keyed_config(5, 10)).unwrap();
        let _g = pool.borrow("a".to_string()).await.unwrap();
        assert_eq!(pool.num_keys(), 1);
    }

    #[tokio::test]
    async fn different_keys_get_independent_sub_pools() {
        let pool = KeyedPool::new(CountingFactory::new(), keyed_config(1, 10)).unwrap();
        let _ga = pool.borrow("a".to_string()).await.unwrap();
        let _gb = pool.borrow("b".to_string()).await.unwrap();
        assert_eq!(pool.num_keys(), 2);
    }

    #[tokio::test]
    async fn per_key_cap_exhausts_independently_of_other_keys() {
        let pool = KeyedPool::new(CountingFactory::new(), keyed_config(1, 10)).unwrap();
        let _ga = pool.borrow("a".to_string()).await.unwrap();
        let err = pool.borrow("a".to_string()).await.unwrap_err();
        assert!(matches!(err, PoolError::NoSuchElement));
    }

    #[tokio::test]
    async fn global_cap_triggers_cross_key_eviction_of_idle() {
        // max_total=1 so "a"'s one idle record already sits at the cap;
        // borrowing a different key has no room left and must evict it.
        let pool = KeyedPool::new(CountingFactory::new(), keyed_config(5, 1)).unwrap();
        {
            let _ga = pool.borrow("a".to_string()).await.unwrap();
        }
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(pool.global_total(), 1);

        let _gb = pool.borrow("b".to_string()).await.unwrap();
        assert_eq!(pool.global_total(), 1);
        assert_eq!(pool.sub_pool(&"a".to_string()).num_idle(), 0);
    }

    #[tokio::test]
    async fn clear_destroys_idle_across_all_keys() {
        let pool = KeyedPool::new(CountingFactory::new(), keyed_config(5, 20)).unwrap();
        {
            let _ga = pool.borrow("a".to_string()).await.unwrap();
            let _gb = pool.borrow("b".to_string()).await.unwrap();
        }
        tokio::time::sleep(Duration::from_millis(30)).await;
        pool.clear().await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(pool.global_total(), 0);
    }
}
