// Validation and recycling example: a cache connection that goes stale.
//
// Shows implementing Factory::validate and Factory::passivate so worn-out
// instances are discarded on borrow rather than handed back out.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use nebula_pool::config::PoolConfigBuilder;
use nebula_pool::factory::{DestroyReason, Factory};
use nebula_pool::SinglePool;

#[derive(Debug, thiserror::Error)]
#[error("cache connect failed")]
struct CacheError;

/// A connection that wears out after a fixed number of checkouts.
struct CacheConnection {
    id: u64,
    uses: u32,
}

struct CacheFactory {
    next_id: AtomicU64,
}

#[async_trait]
impl Factory for CacheFactory {
    type Item = CacheConnection;
    type Error = CacheError;

    async fn create(&self) -> Result<Self::Item, Self::Error> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        println!("  [create] connection #{id}");
        Ok(CacheConnection { id, uses: 0 })
    }

    /// Reject connections that have served too many checkouts.
    async fn validate(&self, conn: &Self::Item) -> bool {
        conn.uses < 3
    }

    /// Reset per-checkout state before handing the connection back out.
    async fn passivate(&self, conn: &mut Self::Item) -> Result<(), Self::Error> {
        conn.uses += 1;
        Ok(())
    }

    async fn destroy(&self, conn: Self::Item, reason: DestroyReason) -> Result<(), Self::Error> {
        println!("  [destroy] connection #{} ({reason:?})", conn.id);
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== Validation and Recycling Example ===\n");

    let config = PoolConfigBuilder::new().max_active(2).max_idle(2).build()?;
    let pool = SinglePool::new(CacheFactory { next_id: AtomicU64::new(0) }, config)?;

    for round in 1..=5 {
        let conn = pool.borrow().await?;
        println!("round {round}: using connection #{} (uses so far: {})", conn.id, conn.uses);
        drop(conn);
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    println!("\nTotal created: {}", pool.stats().created);
    pool.close().await;
    println!("=== Example complete ===");

    Ok(())
}
