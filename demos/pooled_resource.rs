// Advanced example: a keyed multiplexer over per-tenant database pools.
//
// Demonstrates per-key isolation, a shared global cap across tenants,
// background eviction, and event bus subscription.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use nebula_pool::config::{Cap, KeyedPoolConfig, PoolConfigBuilder};
use nebula_pool::factory::{DestroyReason, Factory};
use nebula_pool::keyed::KeyedPool;

#[derive(Debug, thiserror::Error)]
#[error("connect failed")]
struct ConnectError;

#[derive(Debug)]
struct DbConnection {
    id: u64,
}

#[derive(Clone)]
struct DbFactory {
    next_id: std::sync::Arc<AtomicU64>,
}

#[async_trait]
impl Factory for DbFactory {
    type Item = DbConnection;
    type Error = ConnectError;

    async fn create(&self) -> Result<Self::Item, Self::Error> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        println!("  [create] connection #{id}");
        Ok(DbConnection { id })
    }

    async fn destroy(&self, conn: Self::Item, reason: DestroyReason) -> Result<(), Self::Error> {
        println!("  [destroy] connection #{} ({reason:?})", conn.id);
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== Keyed Multiplexer Example (per-tenant DB pools) ===\n");

    let config = KeyedPoolConfig {
        base: PoolConfigBuilder::new()
            .max_active(4)
            .max_idle(4)
            .min_evictable_idle_time(Some(Duration::from_millis(100)))
            .time_between_eviction_runs(Some(Duration::from_millis(50)))
            .build()?,
        max_per_key: Cap::Bounded(4),
        max_total: Cap::Bounded(6),
    };

    let factory = DbFactory { next_id: std::sync::Arc::new(AtomicU64::new(1)) };
    let pool = KeyedPool::new(factory, config)?;

    let mut events = pool.subscribe_events("tenant-a".to_string());
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            println!("  [event] {event:?}");
        }
    });

    println!("Borrowing for tenant-a and tenant-b...");
    let a1 = pool.borrow("tenant-a".to_string()).await?;
    let b1 = pool.borrow("tenant-b".to_string()).await?;
    println!("  tenant-a: connection #{}", a1.id);
    println!("  tenant-b: connection #{}", b1.id);

    drop(a1);
    drop(b1);
    tokio::time::sleep(Duration::from_millis(20)).await;

    println!(
        "\nGlobal total across {} tenants: {}",
        pool.num_keys(),
        pool.global_total()
    );

    // Wait for the background sweep to reclaim the idle connections above
    // the configured idle threshold.
    tokio::time::sleep(Duration::from_millis(200)).await;
    println!("After eviction sweep, global total: {}", pool.global_total());

    pool.close().await;
    println!("\n=== Example complete ===");

    Ok(())
}
