//! Property tests for the acquisition contract.
//!
//! # Invariants tested:
//! 1. Ordered strategy: caller order never matters on an uncontended arena
//! 2. All-or-nothing: a failed attempt leaves nothing newly held
//! 3. Validation: empty, duplicate, and unknown requests are rejected
//! 4. Shared mode: any number of readers coexist on the same seats
//! 5. Whole rings: ordered rings of any small shape run to completion
//!
//! Reproducible: Set `PROPTEST_SEED` environment variable for deterministic runs

#![allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::cast_possible_truncation
)]

use std::sync::Arc;
use std::time::Duration;

use proptest::{prelude::*, prop_oneof, proptest};
use warden_core::{
    AcquirePolicy, AcquireRequest, AgentId, Arbitrator, Arena, Error, Grant, LockMode,
    ResourceId, RingConfig, RingSimulation,
};

// Integration tests have relaxed clippy settings for test ergonomics.
// Production code (src/) must use strict zero-unwrap/panic patterns.

/// Proptest config for cheap single-threaded invariants.
fn fast_config() -> ProptestConfig {
    ProptestConfig {
        cases: 64,
        max_shrink_iters: 256,
        ..ProptestConfig::default()
    }
}

/// Proptest config for properties that spawn agent threads.
fn slow_config() -> ProptestConfig {
    ProptestConfig {
        cases: 8,
        max_shrink_iters: 32,
        ..ProptestConfig::default()
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// CUSTOM STRATEGIES FOR GENERATING TEST DATA
// ═══════════════════════════════════════════════════════════════════════════

/// Generate a lock mode
fn mode_strategy() -> impl Strategy<Value = LockMode> {
    prop_oneof![Just(LockMode::Exclusive), Just(LockMode::Shared)]
}

/// Generate an arena size and a shuffled non-empty subset of its seats
fn arena_and_subset_strategy() -> impl Strategy<Value = (usize, Vec<usize>)> {
    (3usize..=6).prop_flat_map(|count| {
        let seats: Vec<usize> = (0..count).collect();
        (
            Just(count),
            proptest::sample::subsequence(seats, 1..=count).prop_shuffle(),
        )
    })
}

/// Generate an arena size and a shuffled permutation of all of its seats
fn arena_and_permutation_strategy() -> impl Strategy<Value = (usize, Vec<usize>)> {
    (3usize..=6).prop_flat_map(|count| {
        let seats: Vec<usize> = (0..count).collect();
        (Just(count), Just(seats).prop_shuffle())
    })
}

fn ids_of(indices: &[usize]) -> Vec<ResourceId> {
    indices.iter().copied().map(ResourceId::new).collect()
}

fn assert_all_unlocked(arena: &Arena) -> Result<(), proptest::test_runner::TestCaseError> {
    for id in arena.ids() {
        let state = arena.resource(id).expect("known seat").lock_state();
        prop_assert!(state.is_unlocked(), "{} still locked: {:?}", id, state);
    }
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════════
// PROPERTY 1: CALLER ORDER NEVER MATTERS WHEN UNCONTENDED
// ═══════════════════════════════════════════════════════════════════════════

/// Property: the ordered strategy grants any shuffled request on a free
/// arena, and releasing the grant frees every seat
proptest! {
    #![proptest_config(fast_config())]

    #[test]
    fn prop_ordered_grants_any_shuffle_when_uncontended(
        (count, subset) in arena_and_subset_strategy(),
        mode in mode_strategy(),
    ) {
        let arena = Arc::new(Arena::new(count));
        let arbitrator = Arbitrator::new(Arc::clone(&arena));
        let ids = ids_of(&subset);
        let request = AcquireRequest::new(ids.clone(), mode).expect("valid request");

        let grant = arbitrator
            .acquire(AgentId::new(0), &request, AcquirePolicy::TryOnce)
            .expect("uncontended acquisition");

        prop_assert_eq!(grant.len(), ids.len());
        for &id in &ids {
            let state = arena.resource(id).expect("known seat").lock_state();
            prop_assert!(!state.is_unlocked(), "{} not held by the grant", id);
        }

        drop(grant);
        assert_all_unlocked(&arena)?;
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// PROPERTY 2: ALL-OR-NOTHING ON FAILURE
// ═══════════════════════════════════════════════════════════════════════════

/// Property: when one seat is held elsewhere, a try-once request over all
/// seats fails on exactly that seat and holds nothing afterwards
proptest! {
    #![proptest_config(fast_config())]

    #[test]
    fn prop_failed_attempt_leaves_nothing_held(
        (count, order) in arena_and_permutation_strategy(),
        held_pick in 0usize..6,
        mode in mode_strategy(),
    ) {
        let arena = Arc::new(Arena::new(count));
        let arbitrator = Arbitrator::new(Arc::clone(&arena));
        let held_id = ResourceId::new(held_pick % count);

        let hold_request = AcquireRequest::exclusive(vec![held_id]).expect("valid request");
        let hold = arbitrator
            .acquire(AgentId::new(9), &hold_request, AcquirePolicy::TryOnce)
            .expect("free seat");

        let request = AcquireRequest::new(ids_of(&order), mode).expect("valid request");
        let err = arbitrator
            .acquire(AgentId::new(0), &request, AcquirePolicy::TryOnce)
            .expect_err("one seat is already held");

        prop_assert_eq!(err.code(), "WOULD_BLOCK");
        prop_assert!(
            matches!(&err, Error::WouldBlock { resource, .. } if *resource == held_id),
            "failure must name the busy seat: {}",
            err
        );
        for id in arena.ids() {
            let state = arena.resource(id).expect("known seat").lock_state();
            if id == held_id {
                prop_assert!(state.is_exclusive(), "{} lost its holder", id);
            } else {
                prop_assert!(state.is_unlocked(), "{} leaked from the failed attempt", id);
            }
        }

        drop(hold);
        assert_all_unlocked(&arena)?;
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// PROPERTY 3: REQUEST VALIDATION
// ═══════════════════════════════════════════════════════════════════════════

/// Property: duplicate seats are rejected before anything is locked
proptest! {
    #![proptest_config(fast_config())]

    #[test]
    fn prop_duplicate_seats_are_rejected(
        (_, subset) in arena_and_subset_strategy(),
        mode in mode_strategy(),
    ) {
        let mut indices = subset;
        indices.push(indices[0]);

        let err = AcquireRequest::new(ids_of(&indices), mode).expect_err("duplicate seat");
        prop_assert_eq!(err.code(), "INVALID_REQUEST");
    }
}

/// Property: seats outside the arena fail the whole request and lock nothing
proptest! {
    #![proptest_config(fast_config())]

    #[test]
    fn prop_unknown_seats_fail_the_whole_request(
        count in 3usize..=6,
        beyond in 0usize..4,
        mode in mode_strategy(),
    ) {
        let arena = Arc::new(Arena::new(count));
        let arbitrator = Arbitrator::new(Arc::clone(&arena));
        let ids = vec![ResourceId::new(0), ResourceId::new(count + beyond)];
        let request = AcquireRequest::new(ids, mode).expect("shape is valid");

        let err = arbitrator
            .acquire(AgentId::new(0), &request, AcquirePolicy::TryOnce)
            .expect_err("unknown seat");

        prop_assert_eq!(err.code(), "INVALID_REQUEST");
        assert_all_unlocked(&arena)?;
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// PROPERTY 4: SHARED READERS COEXIST
// ═══════════════════════════════════════════════════════════════════════════

/// Property: any number of shared grants coexist on the same seats, and the
/// seats free up only after the last one is released
proptest! {
    #![proptest_config(fast_config())]

    #[test]
    fn prop_shared_readers_coexist(
        count in 3usize..=6,
        readers in 2usize..=5,
    ) {
        let arena = Arc::new(Arena::new(count));
        let arbitrator = Arbitrator::new(Arc::clone(&arena));
        let ids: Vec<ResourceId> = arena.ids();

        let grants: Vec<Grant> = (0..readers)
            .map(|reader| {
                let request = AcquireRequest::shared(ids.clone()).expect("valid request");
                arbitrator
                    .acquire(AgentId::new(reader), &request, AcquirePolicy::TryOnce)
                    .expect("shared seats coexist")
            })
            .collect();

        for &id in &ids {
            let state = arena.resource(id).expect("known seat").lock_state();
            prop_assert_eq!(state.holder_count(), readers, "{} holder count", id);
        }

        drop(grants);
        assert_all_unlocked(&arena)?;
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// PROPERTY 5: SMALL ORDERED RINGS ALWAYS FINISH
// ═══════════════════════════════════════════════════════════════════════════

/// Property: any small ordered ring runs to completion with an exact
/// payload tally
proptest! {
    #![proptest_config(slow_config())]

    #[test]
    fn prop_small_ordered_rings_run_to_completion(
        agents in 2usize..=5,
        cycles in 1u64..=4,
        work_ms in 0u64..=2,
    ) {
        let config = RingConfig::new(agents)
            .with_cycles(cycles)
            .with_work(Duration::from_millis(work_ms));
        let sim = RingSimulation::new(config).expect("valid config");

        let report = sim.run_to_completion().expect("ordered rings finish");

        prop_assert!(report.all_completed(cycles), "incomplete ring: {:?}", report);
        let expected = u64::try_from(agents).expect("small ring") * cycles * 2;
        prop_assert_eq!(sim.payload_total(), expected, "payload updates were lost");
    }
}
