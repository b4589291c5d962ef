//! Minimal pool example.
//!
//! Demonstrates borrowing and returning through a [`SinglePool`] with no
//! eviction or abandonment detection configured.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use nebula_pool::config::{ExhaustedAction, PoolConfigBuilder};
use nebula_pool::factory::{DestroyReason, Factory};
use nebula_pool::SinglePool;

#[derive(Debug, thiserror::Error)]
#[error("failed to open connection")]
struct ConnectError;

/// Hands out incrementing connection ids.
struct ConnectionFactory {
    next_id: AtomicU64,
}

#[async_trait]
impl Factory for ConnectionFactory {
    type Item = String;
    type Error = ConnectError;

    async fn create(&self) -> Result<Self::Item, Self::Error> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        Ok(format!("connection-{id}"))
    }

    async fn destroy(&self, item: Self::Item, reason: DestroyReason) -> Result<(), Self::Error> {
        println!("  [destroy] {item} ({reason:?})");
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== Simple Pool Example ===\n");

    let config = PoolConfigBuilder::new()
        .max_active(10)
        .min_idle(2)
        .exhausted_action(ExhaustedAction::Block)
        .max_wait(Some(Duration::from_secs(5)))
        .build()?;

    let pool = SinglePool::new(ConnectionFactory { next_id: AtomicU64::new(0) }, config)?;
    println!("Pool created (max_active=10, min_idle=2)");

    println!("\nBorrowing a connection...");
    let conn = pool.borrow().await?;
    println!("Got: {}", *conn);

    println!(
        "\nStats: active={} idle={} created={}",
        pool.num_active(),
        pool.num_idle(),
        pool.stats().created
    );

    drop(conn);
    tokio::time::sleep(Duration::from_millis(20)).await;
    println!("Connection returned (idle={})", pool.num_idle());

    pool.close().await;
    println!("\n=== Example complete ===");

    Ok(())
}
