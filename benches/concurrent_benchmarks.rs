//! Concurrent Cache Benchmarks
//!
//! Benchmarks for measuring concurrent map and expiring cache performance
//! across different access patterns and concurrency levels.

use concurrent_linked_cache::config::{ConcurrentLinkedHashMapConfig, ExpiringCacheConfig};
use concurrent_linked_cache::{ConcurrentLinkedHashMap, ExpiringCache};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const CACHE_SIZE: usize = 10_000;
const OPS_PER_THREAD: usize = 1_000;

/// Benchmark concurrent read operations
fn concurrent_reads(c: &mut Criterion) {
    let mut group = c.benchmark_group("Concurrent Reads");
    group.throughput(Throughput::Elements((8 * OPS_PER_THREAD) as u64));

    let map: Arc<ConcurrentLinkedHashMap<usize, usize>> =
        Arc::new(ConcurrentLinkedHashMap::with_capacity(CACHE_SIZE));
    let expiring: Arc<ExpiringCache<usize, usize>> = Arc::new(expiring_cache());

    // Fill caches
    for i in 0..CACHE_SIZE {
        map.put(i, i).unwrap();
        expiring.put(i, i).unwrap();
    }

    group.bench_function("ConcurrentLinkedHashMap", |b| {
        b.iter(|| {
            let cache = Arc::clone(&map);
            run_concurrent_reads(cache, 8, OPS_PER_THREAD);
        });
    });

    group.bench_function("ExpiringCache", |b| {
        b.iter(|| {
            let cache = Arc::clone(&expiring);
            run_concurrent_reads(cache, 8, OPS_PER_THREAD);
        });
    });

    group.finish();
}

/// Benchmark concurrent write operations, mostly evicting
fn concurrent_writes(c: &mut Criterion) {
    let mut group = c.benchmark_group("Concurrent Writes");
    group.throughput(Throughput::Elements((8 * OPS_PER_THREAD) as u64));

    group.bench_function("ConcurrentLinkedHashMap", |b| {
        let map: Arc<ConcurrentLinkedHashMap<usize, usize>> =
            Arc::new(ConcurrentLinkedHashMap::with_capacity(CACHE_SIZE / 4));
        b.iter(|| {
            let cache = Arc::clone(&map);
            run_concurrent_writes(cache, 8, OPS_PER_THREAD);
        });
    });

    group.bench_function("ExpiringCache", |b| {
        let expiring: Arc<ExpiringCache<usize, usize>> = Arc::new(expiring_cache());
        b.iter(|| {
            let cache = Arc::clone(&expiring);
            run_concurrent_writes(cache, 8, OPS_PER_THREAD);
        });
    });

    group.finish();
}

/// Benchmark concurrent mixed operations (80% reads, 20% writes)
fn concurrent_mixed(c: &mut Criterion) {
    let mut group = c.benchmark_group("Concurrent Mixed");
    group.throughput(Throughput::Elements((8 * OPS_PER_THREAD) as u64));

    for threads in [1, 2, 4, 8, 16] {
        group.bench_with_input(
            BenchmarkId::new("threads", threads),
            &threads,
            |b, &threads| {
                let map: Arc<ConcurrentLinkedHashMap<usize, usize>> =
                    Arc::new(ConcurrentLinkedHashMap::with_capacity(CACHE_SIZE));
                for i in 0..CACHE_SIZE {
                    map.put(i, i).unwrap();
                }
                b.iter(|| {
                    let cache = Arc::clone(&map);
                    run_concurrent_mixed(cache, threads, 8 * OPS_PER_THREAD / threads);
                });
            },
        );
    }

    group.finish();
}

/// Benchmark different concurrency levels (table shard counts)
fn concurrency_level_comparison(c: &mut Criterion) {
    let mut group = c.benchmark_group("Concurrency Level Comparison");
    group.throughput(Throughput::Elements((8 * OPS_PER_THREAD) as u64));

    for level in [1, 4, 8, 16, 32, 64] {
        group.bench_with_input(BenchmarkId::new("level", level), &level, |b, &level| {
            let config = ConcurrentLinkedHashMapConfig::new(CACHE_SIZE)
                .with_concurrency_level(level)
                .with_initial_capacity(CACHE_SIZE);
            let map: Arc<ConcurrentLinkedHashMap<usize, usize>> =
                Arc::new(ConcurrentLinkedHashMap::init(config, None).unwrap());
            // Pre-populate
            for i in 0..CACHE_SIZE {
                map.put(i, i).unwrap();
            }
            b.iter(|| {
                let cache = Arc::clone(&map);
                run_concurrent_mixed(cache, 8, OPS_PER_THREAD);
            });
        });
    }

    group.finish();
}

fn expiring_cache() -> ExpiringCache<usize, usize> {
    let config = ExpiringCacheConfig::new(NonZeroUsize::new(CACHE_SIZE).unwrap())
        .with_default_max_age(Some(Duration::from_secs(60)));
    ExpiringCache::new(config).unwrap()
}

// Helper trait for generic cache operations
trait ConcurrentCache<K, V>: Send + Sync {
    fn cache_get(&self, key: &K) -> Option<V>;
    fn cache_put(&self, key: K, value: V);
}

impl<K, V> ConcurrentCache<K, V> for ConcurrentLinkedHashMap<K, V>
where
    K: std::hash::Hash + Eq + Clone + Send + Sync,
    V: Clone + Send + Sync,
{
    fn cache_get(&self, key: &K) -> Option<V> {
        self.get(key)
    }
    fn cache_put(&self, key: K, value: V) {
        self.put(key, value).unwrap();
    }
}

impl<K, V> ConcurrentCache<K, V> for ExpiringCache<K, V>
where
    K: std::hash::Hash + Eq + Clone + Send + Sync,
    V: Clone + Send + Sync,
{
    fn cache_get(&self, key: &K) -> Option<V> {
        self.get(key)
    }
    fn cache_put(&self, key: K, value: V) {
        self.put(key, value).unwrap();
    }
}

// Generic concurrent read runner
fn run_concurrent_reads<C>(cache: Arc<C>, num_threads: usize, ops_per_thread: usize)
where
    C: ConcurrentCache<usize, usize> + 'static,
{
    let mut handles = Vec::with_capacity(num_threads);
    for t in 0..num_threads {
        let cache = Arc::clone(&cache);
        handles.push(thread::spawn(move || {
            for i in 0..ops_per_thread {
                let key = (t * ops_per_thread + i) % CACHE_SIZE;
                black_box(cache.cache_get(&key));
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }
}

// Generic concurrent write runner
fn run_concurrent_writes<C>(cache: Arc<C>, num_threads: usize, ops_per_thread: usize)
where
    C: ConcurrentCache<usize, usize> + 'static,
{
    let mut handles = Vec::with_capacity(num_threads);
    for t in 0..num_threads {
        let cache = Arc::clone(&cache);
        handles.push(thread::spawn(move || {
            for i in 0..ops_per_thread {
                let key = t * ops_per_thread + i;
                cache.cache_put(key, key);
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }
}

// Generic concurrent mixed runner (80% reads, 20% writes)
fn run_concurrent_mixed<C>(cache: Arc<C>, num_threads: usize, ops_per_thread: usize)
where
    C: ConcurrentCache<usize, usize> + 'static,
{
    let mut handles = Vec::with_capacity(num_threads);
    for t in 0..num_threads {
        let cache = Arc::clone(&cache);
        handles.push(thread::spawn(move || {
            for i in 0..ops_per_thread {
                let key = (t * ops_per_thread + i) % CACHE_SIZE;
                if i % 5 == 0 {
                    // 20% writes
                    cache.cache_put(key, key);
                } else {
                    // 80% reads
                    black_box(cache.cache_get(&key));
                }
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }
}

criterion_group!(
    benches,
    concurrent_reads,
    concurrent_writes,
    concurrent_mixed,
    concurrency_level_comparison
);
criterion_main!(benches);
