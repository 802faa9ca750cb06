use cooperation::{Coordinator, configure};
use core::{convert::Infallible, hint::black_box, time::Duration};
use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use std::{
    sync::{Arc, Barrier},
    thread::scope,
    time::Instant,
};

// Number of calls per benchmark iteration (split across threads when
// contended).
const TOTAL_CALLS: usize = 4096;

fn coordinator(enabled: bool, threads_per_key: usize) -> Coordinator<u64, Infallible> {
    configure()
        .enabled(enabled)
        .threads_per_key(threads_per_key)
        .minor_timeout(Duration::from_millis(1))
        .build("bench")
        .unwrap()
}

/// Benchmarks a single caller walking distinct keys, so every call is an
/// uncontended worker that creates and retires its key.
fn bench_uncontended(c: &mut Criterion, group_name: &str, enabled: bool) {
    let keys: Vec<String> = (0..TOTAL_CALLS).map(|i| format!("key-{i}")).collect();
    let mut group = c.benchmark_group(group_name);
    group.throughput(Throughput::Elements(TOTAL_CALLS as u64));

    group.bench_function(format!("elems/{TOTAL_CALLS}"), |b| {
        b.iter_custom(|iters| {
            let coordinator = coordinator(enabled, 1);
            let start = Instant::now();

            for _ in 0..iters {
                for (i, key) in keys.iter().enumerate() {
                    black_box(coordinator.run(key, || Ok(i as u64)).unwrap());
                }
            }

            start.elapsed()
        });
    });

    group.finish();
}

/// Benchmarks many threads hammering one key. Most calls either wait for or
/// pick up an already published outcome.
fn bench_contended(c: &mut Criterion, group_name: &str, threads_per_key: usize) {
    let mut group = c.benchmark_group(group_name);
    let max_threads = num_cpus::get().max(2) * 2;

    for thread_count in [1, 2, 4, 8, 16].into_iter().filter(|t| *t <= max_threads) {
        let calls_per_thread = TOTAL_CALLS / thread_count;

        group.throughput(Throughput::Elements(TOTAL_CALLS as u64));
        group.bench_function(
            format!("elems/{TOTAL_CALLS}/threads/{thread_count}"),
            |b| {
                b.iter_custom(|iters| {
                    let start = Instant::now();

                    for _ in 0..iters {
                        let coordinator = Arc::new(coordinator(true, threads_per_key));
                        let barrier = Arc::new(Barrier::new(thread_count + 1));
                        scope(|s| {
                            for _ in 0..thread_count {
                                let coordinator = Arc::clone(&coordinator);
                                let barrier = Arc::clone(&barrier);
                                s.spawn(move || {
                                    barrier.wait();
                                    for i in 0..calls_per_thread {
                                        black_box(
                                            coordinator.run("hot", || Ok(i as u64)).unwrap(),
                                        );
                                    }
                                });
                            }
                            barrier.wait();
                        });
                    }

                    start.elapsed()
                });
            },
        );
    }

    group.finish();
}

fn benchmark_uncontended_active(c: &mut Criterion) {
    bench_uncontended(c, "uncontended/active", true);
}

fn benchmark_uncontended_disabled(c: &mut Criterion) {
    bench_uncontended(c, "uncontended/disabled", false);
}

fn benchmark_contended_single_worker(c: &mut Criterion) {
    bench_contended(c, "contended/threads_per_key/1", 1);
}

fn benchmark_contended_four_workers(c: &mut Criterion) {
    bench_contended(c, "contended/threads_per_key/4", 4);
}

criterion_group!(
    benches,
    benchmark_uncontended_active,
    benchmark_uncontended_disabled,
    benchmark_contended_single_worker,
    benchmark_contended_four_workers,
);
criterion_main!(benches);
