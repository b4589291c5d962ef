//! Eviction Engine and Abandonment Detector, end to end.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use nebula_pool::config::PoolConfigBuilder;
use nebula_pool::factory::{DestroyReason, Factory};
use nebula_pool::SinglePool;
use tokio_util::sync::CancellationToken;

#[derive(Debug, thiserror::Error)]
#[error("create failed")]
struct CreateError;

struct CountingFactory {
    created: AtomicU32,
    destroyed: AtomicU32,
}

#[async_trait]
impl Factory for CountingFactory {
    type Item = u32;
    type Error = CreateError;

    async fn create(&self) -> Result<Self::Item, Self::Error> {
        Ok(self.created.fetch_add(1, Ordering::SeqCst))
    }

    async fn destroy(&self, _item: Self::Item, _reason: DestroyReason) -> Result<(), Self::Error> {
        self.destroyed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[tokio::test]
async fn background_evictor_reclaims_stale_idle_records() {
    let config = PoolConfigBuilder::new()
        .min_evictable_idle_time(Some(Duration::from_millis(20)))
        .time_between_eviction_runs(Some(Duration::from_millis(15)))
        .build()
        .unwrap();
    let pool = SinglePool::new(
        CountingFactory {
            created: AtomicU32::new(0),
            destroyed: AtomicU32::new(0),
        },
        config,
    )
    .unwrap();

    pool.add_idle().await.unwrap();
    assert_eq!(pool.num_idle(), 1);

    let cancel = CancellationToken::new();
    let _runner = pool.spawn_maintenance(cancel.clone());

    tokio::time::sleep(Duration::from_millis(120)).await;
    cancel.cancel();

    assert_eq!(pool.num_idle(), 0);
    assert!(pool.stats().destroyed_by_eviction >= 1);
}

#[tokio::test]
async fn abandoned_borrow_is_reclaimed_on_maintenance_sweep() {
    let config = PoolConfigBuilder::new()
        .max_active(1)
        .abandoned_timeout(Duration::from_millis(20))
        .remove_abandoned(false, true)
        .time_between_eviction_runs(Some(Duration::from_millis(15)))
        .build()
        .unwrap();
    let pool = SinglePool::new(
        CountingFactory {
            created: AtomicU32::new(0),
            destroyed: AtomicU32::new(0),
        },
        config,
    )
    .unwrap();

    let guard = pool.borrow().await.unwrap();
    std::mem::forget(guard);

    let cancel = CancellationToken::new();
    let _runner = pool.spawn_maintenance(cancel.clone());

    tokio::time::sleep(Duration::from_millis(150)).await;
    cancel.cancel();

    // The slot is logically free even though the leaked instance never
    // physically returned.
    let _next = tokio::time::timeout(Duration::from_millis(200), pool.borrow())
        .await
        .expect("abandoned slot should have been freed")
        .unwrap();
}
