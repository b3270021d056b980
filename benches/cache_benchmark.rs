//! Performance benchmarks for cachegate
//!
//! This benchmark suite measures:
//! - Key index operations (insert, wildcard lookup, persistence) by index size
//! - Facade get/set over pattern and indexed clients
//! - Pattern deletes through both client kinds
//!
//! Run with: cargo bench
//! View results: open target/criterion/report/index.html

use cachegate::backend::InMemoryBackend;
use cachegate::client::{IndexedClient, PatternClient, SharedClient};
use cachegate::config::ClientConfig;
use cachegate::index::KeyIndex;
use cachegate::key::KeyPattern;
use cachegate::CacheService;
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::hint::black_box;
use std::sync::Arc;

// ============================================================================
// Fixtures
// ============================================================================

#[derive(Clone, Serialize, Deserialize)]
struct BenchValue {
    id: u64,
    data: Vec<u8>,
}

/// `count` random keys shaped like `tenant-N:section-N:item-N`.
fn random_keys(count: usize) -> Vec<String> {
    let mut rng = rand::rng();
    (0..count)
        .map(|_| {
            format!(
                "tenant-{}:section-{}:item-{}",
                rng.random_range(0..16),
                rng.random_range(0..32),
                rng.random_range(0..1_000_000)
            )
        })
        .collect()
}

fn build_index(keys: &[String]) -> KeyIndex {
    let mut index = KeyIndex::new();
    for key in keys {
        let segments: Vec<&str> = key.split(':').collect();
        index.insert(&segments, key);
    }
    index
}

async fn pattern_client() -> cachegate::Result<SharedClient> {
    let config = ClientConfig::default().with_key_prefix("bench");
    Ok(Arc::new(PatternClient::new(InMemoryBackend::new(), config)?))
}

async fn indexed_client() -> cachegate::Result<SharedClient> {
    let config = ClientConfig::default().with_key_prefix("bench");
    Ok(Arc::new(IndexedClient::new(InMemoryBackend::new(), config)?))
}

fn service(rt: &tokio::runtime::Runtime, name: &str) -> CacheService {
    let cache = CacheService::new();
    cache.register_client("pattern", pattern_client);
    cache.register_client("indexed", indexed_client);
    rt.block_on(cache.set_active_client(name))
        .expect("Failed to activate client");
    cache
}

// ============================================================================
// Group 1: Key Index
// ============================================================================

fn index_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("key_index");

    for size in [100usize, 1_000, 10_000].iter() {
        let keys = random_keys(*size);
        let index = build_index(&keys);

        group
            .throughput(Throughput::Elements(*size as u64))
            .bench_with_input(BenchmarkId::new("insert", size), &keys, |b, keys| {
                b.iter(|| build_index(black_box(keys)));
            });

        group.bench_with_input(BenchmarkId::new("find_wildcard", size), &index, |b, index| {
            let pattern = KeyPattern::parse("tenant-3:*", ":");
            b.iter(|| index.find(black_box(&pattern)));
        });

        group.bench_with_input(BenchmarkId::new("to_bytes", size), &index, |b, index| {
            b.iter(|| index.to_bytes().expect("Failed to serialize"));
        });

        let bytes = index.to_bytes().expect("Failed to serialize");
        group.bench_with_input(BenchmarkId::new("from_bytes", size), &bytes, |b, bytes| {
            b.iter(|| KeyIndex::from_bytes(black_box(bytes)).expect("Failed to parse"));
        });
    }

    group.finish();
}

// ============================================================================
// Group 2: Facade
// ============================================================================

fn facade_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("facade");
    let rt = tokio::runtime::Runtime::new().expect("Failed to create Tokio runtime");

    for name in ["pattern", "indexed"] {
        let cache = service(&rt, name);
        let value = BenchValue {
            id: 1,
            data: vec![7u8; 1_000],
        };

        group.bench_function(BenchmarkId::new("set", name), |b| {
            let keys = random_keys(256);
            let mut i = 0usize;
            b.to_async(&rt).iter(|| {
                i = (i + 1) % keys.len();
                let key = keys[i].clone();
                let cache = cache.clone();
                let value = value.clone();
                async move {
                    cache
                        .set(black_box(&key), &value, None)
                        .await
                        .expect("Failed to set")
                }
            });
        });

        rt.block_on(cache.set("hot:key", &value, None))
            .expect("Failed to set");

        group.bench_function(BenchmarkId::new("get_hit", name), |b| {
            b.to_async(&rt).iter(|| async {
                cache
                    .get::<BenchValue>(black_box("hot:key"))
                    .await
                    .expect("Failed to get")
            });
        });

        group.bench_function(BenchmarkId::new("get_miss", name), |b| {
            b.to_async(&rt).iter(|| async {
                cache
                    .get::<BenchValue>(black_box("cold:key"))
                    .await
                    .expect("Failed to get")
            });
        });

        group.bench_function(BenchmarkId::new("delete_pattern", name), |b| {
            b.to_async(&rt).iter(|| async {
                for item in 0..8 {
                    cache
                        .set(&format!("tenant-x:item-{}", item), &item, None)
                        .await
                        .expect("Failed to set");
                }
                cache
                    .delete(black_box("tenant-x:*"), true)
                    .await
                    .expect("Failed to delete")
            });
        });
    }

    group.finish();
}

// ============================================================================
// Benchmark Registration
// ============================================================================

criterion_group!(benches, index_benchmarks, facade_benchmarks);
criterion_main!(benches);
