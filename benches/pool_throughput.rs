// Pool throughput benchmarks.
//
// Measures raw borrow/return overhead with a zero-cost instance (no I/O,
// instant create/destroy).

use std::hint::black_box;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use criterion::{criterion_group, criterion_main, Criterion};
use nebula_pool::config::PoolConfigBuilder;
use nebula_pool::factory::{DestroyReason, Factory};
use nebula_pool::SinglePool;

#[derive(Debug, thiserror::Error)]
#[error("create failed")]
struct NoOpError;

struct NoOpFactory {
    next: AtomicU64,
}

#[async_trait]
impl Factory for NoOpFactory {
    type Item = u64;
    type Error = NoOpError;

    async fn create(&self) -> Result<Self::Item, Self::Error> {
        Ok(self.next.fetch_add(1, Ordering::Relaxed))
    }

    async fn destroy(&self, _item: Self::Item, _reason: DestroyReason) -> Result<(), Self::Error> {
        Ok(())
    }
}

fn pool(max_active: usize) -> SinglePool<NoOpFactory> {
    let config = PoolConfigBuilder::new()
        .max_active(max_active)
        .max_idle(max_active)
        .build()
        .expect("valid config");
    SinglePool::new(NoOpFactory { next: AtomicU64::new(0) }, config).expect("pool construction")
}

fn single_thread_throughput(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().expect("failed to build runtime");
    let pool = pool(64);

    // Warm up: borrow and return once so the next borrow reuses the idle slot.
    rt.block_on(async {
        let guard = pool.borrow().await.unwrap();
        drop(guard);
        tokio::task::yield_now().await;
    });

    c.bench_function("single_thread_borrow_return", |b| {
        b.to_async(&rt).iter(|| {
            let pool = pool.clone();
            async move {
                let guard = pool.borrow().await.unwrap();
                drop(guard);
                tokio::task::yield_now().await;
                black_box(())
            }
        });
    });
}

fn multi_thread_throughput(c: &mut Criterion) {
    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(4)
        .enable_all()
        .build()
        .expect("failed to build runtime");
    let pool = pool(64);

    rt.block_on(async {
        let mut guards = Vec::new();
        for _ in 0..8 {
            guards.push(pool.borrow().await.unwrap());
        }
        drop(guards);
        tokio::task::yield_now().await;
    });

    c.bench_function("multi_thread_borrow_return", |b| {
        b.to_async(&rt).iter(|| {
            let pool = pool.clone();
            async move {
                let guard = pool.borrow().await.unwrap();
                drop(guard);
                tokio::task::yield_now().await;
                black_box(())
            }
        });
    });
}

fn concurrent_contention(c: &mut Criterion) {
    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(4)
        .enable_all()
        .build()
        .expect("failed to build runtime");

    // Small pool to force contention on the waiter path.
    let pool = pool(4);

    c.bench_function("contended_borrow_return_4slots", |b| {
        b.to_async(&rt).iter(|| {
            let pool = pool.clone();
            async move {
                let guard = pool.borrow().await.unwrap();
                drop(guard);
                tokio::task::yield_now().await;
                black_box(())
            }
        });
    });
}

criterion_group!(
    benches,
    single_thread_throughput,
    multi_thread_throughput,
    concurrent_contention,
);
criterion_main!(benches);
