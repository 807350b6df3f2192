//! # Acquisition Benchmark
//!
//! REQUIREMENTS:
//! - Owner fast path: one id comparison plus an uncontended lock
//! - Bulk acquisition: cost scales with owners, not handles
//! - Empty cycle: dominated by the worker wake-up, not assignment
//!
//! Run with: `cargo bench --package meridian_core`

// Benchmarks don't need strict docs
#![allow(missing_docs)]

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use meridian_core::{
    acquire_for_each, Acquirable, AcquisitionContext, Lease, ObjectKind, Placement, SchedulerConfig,
    StrategyConfig, Tickable, UpdateManager,
};

struct Body {
    energy: u64,
}

impl Tickable for Body {
    fn tick(this: &mut Lease<'_, Self>, _time: u64) {
        this.energy = this.energy.wrapping_add(1);
    }
}

fn manager(threads: usize) -> UpdateManager {
    UpdateManager::new(SchedulerConfig {
        threads,
        strategy: StrategyConfig::RoundRobin,
        ..SchedulerConfig::default()
    })
    .expect("scheduler")
}

fn populate(manager: &UpdateManager, count: usize) -> Vec<Arc<Acquirable<Body>>> {
    (0..count)
        .map(|_| {
            let handle = Arc::new(Acquirable::new(Body { energy: 0 }));
            manager.register(handle.clone(), Placement::loose(ObjectKind::Agent));
            handle
        })
        .collect()
}

/// Benchmark: unassigned and quiescent single acquisitions.
fn bench_single_acquire(c: &mut Criterion) {
    let mut group = c.benchmark_group("single_acquire");

    let loose = Acquirable::new(Body { energy: 0 });
    let ctx = AcquisitionContext::detached();
    group.bench_function("unassigned", |b| {
        b.iter(|| loose.acquire(&ctx, |body| black_box(body.energy)));
    });

    let scheduler = manager(2);
    let handles = populate(&scheduler, 1);
    scheduler.tick_once().expect("cycle");
    let ctx = scheduler.acquisition_context();
    group.bench_function("quiescent_owner", |b| {
        b.iter(|| handles[0].acquire(&ctx, |body| black_box(body.energy)));
    });

    group.finish();
}

/// Benchmark: bulk acquisition over many handles and few owners.
fn bench_bulk_acquire(c: &mut Criterion) {
    let mut group = c.benchmark_group("bulk_acquire");

    for count in [64_usize, 1024] {
        let scheduler = manager(4);
        let handles = populate(&scheduler, count);
        scheduler.tick_once().expect("cycle");
        let ctx = scheduler.acquisition_context();

        group.bench_with_input(BenchmarkId::new("for_each", count), &handles, |b, handles| {
            b.iter(|| {
                let mut total = 0_u64;
                acquire_for_each(&ctx, handles.iter().map(Arc::as_ref), |body| total += body.energy);
                black_box(total)
            });
        });
    }

    group.finish();
}

/// Benchmark: full driver cycle.
fn bench_cycle(c: &mut Criterion) {
    let mut group = c.benchmark_group("cycle");

    for count in [0_usize, 1000, 10_000] {
        let scheduler = manager(4);
        let _handles = populate(&scheduler, count);

        group.bench_with_input(BenchmarkId::new("tick_once", count), &count, |b, _| {
            b.iter(|| black_box(scheduler.tick_once().expect("cycle").duration));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_single_acquire, bench_bulk_acquire, bench_cycle);
criterion_main!(benches);
