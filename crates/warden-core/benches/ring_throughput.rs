#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

//! Benchmark the acquisition hot path and whole-ring throughput.
//!
//! The acquire/release pair is the per-cycle cost every agent pays, so it
//! has to stay cheap relative to the work and think pauses around it.

use std::sync::Arc;
use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use warden_core::{
    AcquirePolicy, AcquireRequest, AgentId, Arbitrator, Arena, LockMode, RingConfig,
    RingSimulation,
};

// ============================================================================
// FIXTURES
// ============================================================================

/// Arbitrator over a fresh arena of `seats` resources
fn fixture(seats: usize) -> Arbitrator {
    Arbitrator::new(Arc::new(Arena::new(seats)))
}

/// Request for the first `width` seats of the arena, in ascending order
fn request(width: usize, mode: LockMode) -> AcquireRequest {
    let ids = (0..width).map(warden_core::ResourceId::new).collect();
    match AcquireRequest::new(ids, mode) {
        Ok(request) => request,
        Err(err) => unreachable!("fixture request is valid: {err}"),
    }
}

// ============================================================================
// BENCHMARKS: uncontended acquire/release pair
// ============================================================================

fn bench_acquire_release_pair(c: &mut Criterion) {
    let mut group = c.benchmark_group("acquire_release_pair");

    for width in [1usize, 2, 4] {
        let arbitrator = fixture(8);
        let exclusive = request(width, LockMode::Exclusive);
        group.bench_with_input(
            BenchmarkId::new("exclusive", width),
            &exclusive,
            |b, req| {
                b.iter(|| {
                    let grant =
                        arbitrator.acquire(AgentId::new(0), black_box(req), AcquirePolicy::TryOnce);
                    drop(black_box(grant));
                });
            },
        );

        let shared = request(width, LockMode::Shared);
        group.bench_with_input(BenchmarkId::new("shared", width), &shared, |b, req| {
            b.iter(|| {
                let grant =
                    arbitrator.acquire(AgentId::new(0), black_box(req), AcquirePolicy::TryOnce);
                drop(black_box(grant));
            });
        });
    }

    group.finish();
}

// ============================================================================
// BENCHMARKS: whole-ring runs
// ============================================================================

fn bench_ring_run(c: &mut Criterion) {
    let mut group = c.benchmark_group("ring_run");
    group.sample_size(10);

    for agents in [2usize, 5] {
        group.bench_with_input(
            BenchmarkId::new("one_cycle_no_work", agents),
            &agents,
            |b, &agents| {
                let config = RingConfig::new(agents)
                    .with_cycles(1)
                    .with_work(Duration::ZERO);
                b.iter(|| {
                    let report = RingSimulation::new(config.clone())
                        .and_then(|sim| sim.run_to_completion());
                    drop(black_box(report));
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_acquire_release_pair, bench_ring_run);

criterion_main!(benches);
