//! Benchmarks of the single-key cache operations.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use cachet::{Cache, CacheBuilder, EvictionPolicy};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn bounded(size: u64, policy: EvictionPolicy) -> Cache<u64, String> {
    CacheBuilder::new(size).eviction_policy(policy).build()
}

/// Insertion of new entries into an empty cache.
fn put_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("put");

    for size in [100u64, 1_000, 10_000] {
        group.throughput(Throughput::Elements(size));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.iter(|| {
                let cache: Cache<u64, String> = Cache::new(size);
                for i in 0..size {
                    cache
                        .put(black_box(i), black_box(format!("value-{i}")))
                        .unwrap();
                }
            });
        });
    }
    group.finish();
}

/// `peek` on a populated cache. Reads take no lock.
fn peek_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("peek");

    for size in [100u64, 1_000, 10_000] {
        let cache: Cache<u64, String> = Cache::new(size);
        for i in 0..size {
            cache.put(i, format!("value-{i}")).unwrap();
        }

        group.throughput(Throughput::Elements(size));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.iter(|| {
                for i in 0..size {
                    let _ = cache.peek(&black_box(i));
                }
            });
        });
    }
    group.finish();
}

/// `get` through a loader, with half of the keys missing.
fn get_with_loader_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("get_with_loader");

    for size in [1_000u64, 10_000] {
        let cache: Cache<u64, String> = Cache::builder()
            .max_capacity(size)
            .loader(|k: &u64| Ok::<_, std::fmt::Error>(k.to_string()))
            .build();

        group.throughput(Throughput::Elements(size));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.iter(|| {
                for i in 0..size {
                    let _ = cache.get(&black_box(i * 2));
                }
            });
        });
    }
    group.finish();
}

/// A third each of puts, gets and `contains_key` calls.
fn mixed_operations_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("mixed_ops");

    for size in [100u64, 1_000, 10_000] {
        group.throughput(Throughput::Elements(size));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            let cache: Cache<u64, String> = Cache::new(size);
            b.iter(|| {
                for i in 0..size {
                    match i % 3 {
                        0 => cache.put(black_box(i), format!("value-{i}")).unwrap(),
                        1 => {
                            let _ = cache.get(&black_box(i - 1));
                        }
                        _ => {
                            let _ = cache.contains_key(&black_box(i));
                        }
                    }
                }
            });
        });
    }
    group.finish();
}

/// Puts into a full cache, so that every put runs the eviction engine.
fn eviction_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("eviction");

    for (name, policy) in [
        ("clock", EvictionPolicy::clock()),
        ("fifo", EvictionPolicy::fifo()),
    ] {
        let size = 1_000u64;
        group.throughput(Throughput::Elements(size * 2));
        group.bench_function(name, |b| {
            b.iter(|| {
                let cache = bounded(size, policy.clone());
                for i in 0..size * 2 {
                    cache.put(black_box(i), black_box(format!("value-{i}"))).unwrap();
                }
            });
        });
    }
    group.finish();
}

/// Atomic read-modify-write through an entry processor, from several threads.
fn invoke_contended_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("invoke_contended");
    let cache: Cache<u64, u64> = Cache::new(1_000);
    let cache = Arc::new(cache);

    for threads in [1usize, 4] {
        group.bench_with_input(
            BenchmarkId::from_parameter(threads),
            &threads,
            |b, &threads| {
                b.iter(|| {
                    let handles: Vec<_> = (0..threads)
                        .map(|t| {
                            let cache = Arc::clone(&cache);
                            thread::spawn(move || {
                                for i in 0..1_000u64 {
                                    let _ = cache.invoke((i + t as u64) % 16, false, |e| {
                                        let next = e.peek_value()?.unwrap_or(0) + 1;
                                        e.set_value(next);
                                        Ok(next)
                                    });
                                }
                            })
                        })
                        .collect();
                    handles.into_iter().for_each(|h| h.join().unwrap());
                });
            },
        );
    }
    group.finish();
}

criterion_group! {
    name = benches;
    config = Criterion::default()
        .measurement_time(Duration::from_secs(10))
        .sample_size(100);
    targets = put_benchmark, peek_benchmark, get_with_loader_benchmark,
              mixed_operations_benchmark, eviction_benchmark, invoke_contended_benchmark
}

criterion_main!(benches);
