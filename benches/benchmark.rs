use core_affinity::*;
use criterion::measurement::WallTime;
use criterion::BenchmarkGroup;
use criterion::BenchmarkId;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use liblocktrack::{RawMutex, RawSimpleLock, RawSpinLock, Registry, TrackedLock};
use std::{sync::Arc, thread::*};

const ITERATION: u64 = 1000;

fn local_registry<R: RawSimpleLock>() -> &'static Registry {
    Box::leak(Box::new(Registry::new(R::KIND)))
}

pub fn uncontended_bench(bencher: &mut Criterion) {
    let mut group = bencher.benchmark_group("Uncontended lock/unlock");

    raw_single::<RawMutex>(&mut group, "mutex");
    tracked_single::<RawMutex>(&mut group, "mutex");
    raw_single::<RawSpinLock>(&mut group, "spinlock");
    tracked_single::<RawSpinLock>(&mut group, "spinlock");

    group.finish();
}

fn raw_single<R: RawSimpleLock>(group: &mut BenchmarkGroup<WallTime>, name: &str) {
    let raw = R::init(&R::Attributes::default()).unwrap();
    group.bench_function(BenchmarkId::new("raw", name), |b| {
        b.iter(|| {
            raw.lock().unwrap();
            unsafe { raw.unlock().unwrap() };
        })
    });
}

fn tracked_single<R: RawSimpleLock>(group: &mut BenchmarkGroup<WallTime>, name: &str) {
    let lock = TrackedLock::<u64, R>::new_in(0, &R::Attributes::default(), name, local_registry::<R>())
        .unwrap();
    group.bench_function(BenchmarkId::new("tracked", name), |b| {
        b.iter(|| {
            *lock.lock().unwrap() += 1;
        })
    });
}

pub fn contended_bench(bencher: &mut Criterion) {
    let cpu_count = available_parallelism().unwrap().get();

    let mut group = bencher.benchmark_group("Contended tracked locks");

    for thread_count in [2, 4, 8] {
        contended::<RawMutex>(&mut group, "mutex", cpu_count, thread_count);
        contended::<RawSpinLock>(&mut group, "spinlock", cpu_count, thread_count);
    }

    group.finish();
}

fn contended<R: RawSimpleLock + Send + Sync + 'static>(
    group: &mut BenchmarkGroup<WallTime>,
    name: &str,
    cpu_count: usize,
    thread_count: usize,
) {
    let lock = Arc::new(
        TrackedLock::<u64, R>::new_in(0, &R::Attributes::default(), name, local_registry::<R>())
            .unwrap(),
    );

    group.bench_with_input(
        BenchmarkId::new(name, thread_count),
        &cpu_count,
        |b, &cpu_count| {
            b.iter(|| {
                *lock.lock().unwrap() = 0;
                black_box(cooperative_counter(
                    lock.clone(),
                    cpu_count,
                    thread_count,
                    ITERATION,
                ));
                assert_eq!(*lock.lock().unwrap(), ITERATION);
            });
        },
    );
}

fn cooperative_counter<R: RawSimpleLock + Send + Sync + 'static>(
    lock: Arc<TrackedLock<u64, R>>,
    cpu_count: usize,
    thread_count: usize,
    threshold: u64,
) {
    let res = (0..thread_count)
        .map(|id| {
            let lock = lock.clone();
            Builder::new()
                .name(id.to_string())
                .spawn(move || {
                    set_for_current(CoreId {
                        id: (id % cpu_count),
                    });
                    loop {
                        let mut guard = lock.lock().unwrap();
                        if *guard >= threshold {
                            return;
                        }
                        *guard += 1;
                    }
                })
                .unwrap()
        })
        .collect::<Vec<_>>();

    for thread in res {
        thread.join().unwrap();
    }
}

criterion_group!(benches, uncontended_bench, contended_bench);

criterion_main!(benches);
