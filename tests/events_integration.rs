//! Lifecycle event sequence observed through a pool's event bus (spec §11).

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use nebula_pool::config::PoolConfigBuilder;
use nebula_pool::factory::{DestroyReason, Factory};
use nebula_pool::{PoolEvent, SinglePool};

#[derive(Debug, thiserror::Error)]
#[error("create failed")]
struct CreateError;

struct CountingFactory {
    created: AtomicU32,
}

#[async_trait]
impl Factory for CountingFactory {
    type Item = u32;
    type Error = CreateError;

    async fn create(&self) -> Result<Self::Item, Self::Error> {
        Ok(self.created.fetch_add(1, Ordering::SeqCst))
    }

    async fn destroy(&self, _item: Self::Item, _reason: DestroyReason) -> Result<(), Self::Error> {
        Ok(())
    }
}

#[tokio::test]
async fn borrow_return_destroy_emit_events_in_order() {
    let config = PoolConfigBuilder::new().max_active(1).build().unwrap();
    let pool = SinglePool::new(CountingFactory { created: AtomicU32::new(0) }, config).unwrap();
    let mut events = pool.subscribe_events();

    let guard = pool.borrow().await.unwrap();
    assert!(matches!(events.recv().await.unwrap(), PoolEvent::Created { .. }));
    assert!(matches!(events.recv().await.unwrap(), PoolEvent::Borrowed { .. }));

    drop(guard);
    assert!(matches!(events.recv().await.unwrap(), PoolEvent::Returned { .. }));

    pool.close().await;
    let mut saw_destroyed = false;
    let mut saw_closed = false;
    for _ in 0..2 {
        match events.recv().await.unwrap() {
            PoolEvent::Destroyed { .. } => saw_destroyed = true,
            PoolEvent::Closed { .. } => saw_closed = true,
            other => panic!("unexpected event: {other:?}"),
        }
    }
    assert!(saw_destroyed && saw_closed);
}

#[tokio::test]
async fn exhaustion_emits_exhausted_event_with_waiter_count() {
    let config = PoolConfigBuilder::new().max_active(1).build().unwrap();
    let pool = SinglePool::new(CountingFactory { created: AtomicU32::new(0) }, config).unwrap();
    let mut events = pool.subscribe_events();

    let held = pool.borrow().await.unwrap();
    assert!(matches!(events.recv().await.unwrap(), PoolEvent::Created { .. }));
    assert!(matches!(events.recv().await.unwrap(), PoolEvent::Borrowed { .. }));

    let pool2 = pool.clone();
    let waiter = tokio::spawn(async move { pool2.borrow().await });
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(matches!(events.recv().await.unwrap(), PoolEvent::Exhausted { waiters: 1, .. }));

    drop(held);
    let result = tokio::time::timeout(Duration::from_millis(500), waiter)
        .await
        .expect("waiter resolves")
        .unwrap();
    assert!(result.is_ok());
}
