//! Benchmarks for the ownership pointer and run-record hot paths.

use creatorflow::core::{CreatorId, RunDescriptor, RunId};
use creatorflow::registry::{InMemoryRegistryStore, PipelineRegistry};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::sync::Arc;
use tokio::runtime::Runtime;

fn registry() -> PipelineRegistry {
    PipelineRegistry::new(Arc::new(InMemoryRegistryStore::new()))
}

fn bench_ownership(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("ownership");

    // Launch hot path: claiming a creator nobody owns.
    group.bench_function("take_free_creator", |b| {
        let registry = registry();
        let mut n = 0u64;
        b.iter(|| {
            n += 1;
            let creator = CreatorId::new(format!("creator-{n}"));
            let run = RunId::new(format!("run-{n}"));
            rt.block_on(async {
                black_box(registry.take_ownership(&creator, &run).await.unwrap());
            });
        });
    });

    // Relaunch hot path: every takeover displaces the previous owner.
    group.bench_function("supersede_previous_owner", |b| {
        let registry = registry();
        let creator = CreatorId::new("creator-contended");
        rt.block_on(async {
            registry
                .take_ownership(&creator, &RunId::new("run-0"))
                .await
                .unwrap();
        });
        let mut n = 0u64;
        b.iter(|| {
            n += 1;
            let run = RunId::new(format!("run-{n}"));
            rt.block_on(async {
                black_box(registry.take_ownership(&creator, &run).await.unwrap());
            });
        });
    });

    // The guard a run evaluates at every stage boundary.
    group.bench_function("stage_boundary_guard", |b| {
        let registry = registry();
        let creator = CreatorId::new("creator-guarded");
        let run = RunId::new("run-guarded");
        rt.block_on(async {
            registry.take_ownership(&creator, &run).await.unwrap();
        });
        b.iter(|| {
            rt.block_on(async {
                registry.ensure_active_run(&creator, &run).await.unwrap();
            });
        });
    });

    // Watchdog claim that loses: the expectation is stale, so the swap
    // never applies and the state stays fixed across iterations.
    group.bench_function("claim_with_stale_expectation", |b| {
        let registry = registry();
        let creator = CreatorId::new("creator-claimed");
        rt.block_on(async {
            registry
                .take_ownership(&creator, &RunId::new("run-owner"))
                .await
                .unwrap();
        });
        let stale = RunId::new("run-stale");
        let next = RunId::new("run-next");
        b.iter(|| {
            rt.block_on(async {
                let claimed = registry
                    .claim_ownership_if(&creator, &stale, &next)
                    .await
                    .unwrap();
                black_box(claimed);
            });
        });
    });

    group.finish();
}

fn bench_run_records(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("run_records");

    group.bench_function("begin_fresh_run", |b| {
        let registry = registry();
        let creator = CreatorId::new("creator-records");
        let mut n = 0u64;
        b.iter(|| {
            n += 1;
            let descriptor = RunDescriptor::new(RunId::new(format!("run-{n}")), creator.clone());
            rt.block_on(async {
                black_box(registry.begin_run(descriptor).await.unwrap());
            });
        });
    });

    // Replayed queue message path: the record exists and begin reuses it.
    group.bench_function("begin_duplicate_run", |b| {
        let registry = registry();
        let descriptor = RunDescriptor::new(RunId::new("run-dup"), CreatorId::new("creator-dup"));
        rt.block_on(async {
            registry.begin_run(descriptor.clone()).await.unwrap();
        });
        b.iter(|| {
            rt.block_on(async {
                black_box(registry.begin_run(descriptor.clone()).await.unwrap());
            });
        });
    });

    group.finish();
}

criterion_group!(benches, bench_ownership, bench_run_records);
criterion_main!(benches);
