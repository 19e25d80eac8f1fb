// Pool throughput benchmarks.
//
// Measures raw acquire/release overhead with a broker whose connections are
// free to create and close.

use std::collections::HashSet;
use std::hint::black_box;

use async_trait::async_trait;
use criterion::{Criterion, criterion_group, criterion_main};
use nebula_producer_pool::{Broker, Pool, PoolConfig, Result};

// -- Minimal no-op broker for benchmarking pool overhead only --

struct NoOpBroker;

#[async_trait]
impl Broker for NoOpBroker {
    type Connection = u64;

    async fn topics(&self, _address: &str) -> Result<HashSet<String>> {
        Ok(HashSet::from(["bench".to_string()]))
    }

    async fn connect(&self, _address: &str, _topic: &str) -> Result<u64> {
        Ok(0)
    }
}

fn pool_config(init: usize, max: usize) -> PoolConfig {
    PoolConfig::default()
        .with_topic("bench")
        .with_init_capacity(init)
        .with_max_capacity(max)
        .with_max_idle(max)
}

fn build_pool(rt: &tokio::runtime::Runtime, init: usize, max: usize) -> Pool<NoOpBroker> {
    rt.block_on(Pool::new(NoOpBroker, pool_config(init, max)))
        .expect("failed to create pool")
}

fn single_thread_throughput(c: &mut Criterion) {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("failed to build runtime");
    let pool = build_pool(&rt, 1, 64);

    c.bench_function("single_thread_acquire_release", |b| {
        b.to_async(&rt).iter(|| {
            let pool = pool.clone();
            async move {
                let producer = pool.acquire().await.unwrap();
                pool.release(black_box(producer)).await.unwrap();
            }
        });
    });
}

fn lease_throughput(c: &mut Criterion) {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("failed to build runtime");
    let pool = build_pool(&rt, 1, 64);

    c.bench_function("single_thread_lease_drop", |b| {
        b.to_async(&rt).iter(|| {
            let pool = pool.clone();
            async move {
                let lease = pool.lease().await.unwrap();
                black_box(lease.id());
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

    // Small pool so most acquires queue and are served by hand-off.
    let pool = build_pool(&rt, 4, 4);

    c.bench_function("contended_acquire_release_4slots_16tasks", |b| {
        b.to_async(&rt).iter(|| {
            let pool = pool.clone();
            async move {
                let mut tasks = tokio::task::JoinSet::new();
                for _ in 0..16 {
                    let pool = pool.clone();
                    tasks.spawn(async move {
                        let producer = pool.acquire().await.unwrap();
                        tokio::task::yield_now().await;
                        pool.release(producer).await.unwrap();
                    });
                }
                while let Some(result) = tasks.join_next().await {
                    result.unwrap();
                }
            }
        });
    });
}

criterion_group!(
    benches,
    single_thread_throughput,
    lease_throughput,
    concurrent_contention,
);
criterion_main!(benches);
