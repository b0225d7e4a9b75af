//! End-to-end ring scenarios
//!
//! Drives whole rings through both harness modes and checks the outcomes
//! the harness exists to demonstrate:
//! - Ordered strategy: every agent finishes, payload tally is exact
//! - Unordered strategy with reversed seat order: a stable livelock
//! - Liveness verdicts and their report flags
//! - Clean teardown: every seat unlocked after every run
//!
//! The livelock scenarios are phase-timed (grip, backoff, and start
//! stagger tuned so retry rounds keep colliding), so everything here runs
//! serially to keep scheduler noise down.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

use std::time::Duration;

use serial_test::serial;
use warden_core::{
    AcquirePolicy, AcquireStrategy, AgentId, Error, LockMode, RingConfig, RingSimulation,
};

/// Test helper: assert every seat in the arena ended unlocked
fn assert_arena_unlocked(sim: &RingSimulation) -> Result<(), Error> {
    for id in sim.arena().ids() {
        let state = sim.arena().resource(id)?.lock_state();
        assert!(state.is_unlocked(), "{id} still locked after run: {state:?}");
    }
    Ok(())
}

// ========================================================================
// SCENARIO 1: Default ring runs to completion
// ========================================================================
//
// GIVEN: 5 agents, ordered strategy, blocking policy, 3 cycles of 10ms
// WHEN: The ring runs to completion
// THEN: Every agent completes 3 cycles and every payload bump survives

#[test]
#[serial]
fn test_five_agents_three_cycles_all_complete() -> Result<(), Error> {
    let sim = RingSimulation::new(RingConfig::new(5))?;

    let report = sim.run_to_completion()?;

    assert!(report.all_completed(3), "incomplete ring: {report:?}");
    assert_eq!(report.total_cycles(), 15, "expected 5 agents x 3 cycles");
    assert!(report.starved_agents.is_empty(), "nobody should starve");
    assert!(!report.deadlock_detected);
    assert!(!report.livelock_observed);

    // Each cycle bumps both held seats by one.
    assert_eq!(sim.payload_total(), 30, "payload updates were lost");
    assert_arena_unlocked(&sim)
}

// ========================================================================
// SCENARIO 2: Reversed-order pair livelocks
// ========================================================================
//
// GIVEN: 2 agents taking their seats in opposite orders, unordered
//        strategy with 50ms backoff and a 200ms grip, starts staggered
//        125ms so the retry rounds phase-lock
// WHEN: A 2s liveness check runs
// THEN: Attempts conclude but nobody is ever granted both seats

#[test]
#[serial]
fn test_reversed_pair_livelocks_within_the_window() -> Result<(), Error> {
    let config = RingConfig::new(2)
        .with_strategy(AcquireStrategy::unordered_with_grip(
            Duration::from_millis(50),
            Duration::from_millis(200),
        ))
        .with_stagger(Duration::from_millis(125))
        .with_starvation_threshold(64);
    let sim = RingSimulation::new(config)?;

    let report = sim.liveness_check()?;

    assert!(report.livelock_observed, "expected a livelock: {report:?}");
    assert!(!report.deadlock_detected);
    assert_eq!(report.total_cycles(), 0, "a grant breaks the livelock");
    assert!(
        report.total_failed_attempts() > 0,
        "agents must have kept trying"
    );

    let verdict = report.ensure_progress().err();
    assert_eq!(
        verdict.as_ref().map(Error::code),
        Some("LIVELOCK_OBSERVED"),
        "verdict must fail the check"
    );
    assert_arena_unlocked(&sim)
}

// ========================================================================
// SCENARIO 3: Same pair under the ordered strategy is live
// ========================================================================
//
// GIVEN: The 2-agent ring with the default ordered strategy
// WHEN: A 500ms liveness check runs
// THEN: Both agents complete at least one cycle

#[test]
#[serial]
fn test_ordered_pair_progresses_within_half_a_second() -> Result<(), Error> {
    let config = RingConfig::new(2).with_check_window(Duration::from_millis(500));
    let sim = RingSimulation::new(config)?;

    let report = sim.liveness_check()?;

    assert!(!report.deadlock_detected);
    assert!(!report.livelock_observed);
    for index in 0..2 {
        let cycles = report
            .cycles_completed
            .get(&AgentId::new(index))
            .copied()
            .unwrap_or(0);
        assert!(cycles >= 1, "A{index} completed no cycle: {report:?}");
    }
    report.ensure_progress()?;
    assert_arena_unlocked(&sim)
}

// ========================================================================
// SCENARIO 4: Three-agent ring livelocks too
// ========================================================================
//
// GIVEN: 3 agents in caller order under the unordered strategy, starts
//        staggered 75ms so every retry round lands inside a neighbor's
//        grip window
// WHEN: A 2s liveness check runs
// THEN: The livelock verdict holds for the wider ring

#[test]
#[serial]
fn test_three_agent_ring_livelocks() -> Result<(), Error> {
    let config = RingConfig::new(3)
        .with_strategy(AcquireStrategy::unordered_with_grip(
            Duration::from_millis(50),
            Duration::from_millis(200),
        ))
        .with_stagger(Duration::from_millis(75))
        .with_starvation_threshold(64);
    let sim = RingSimulation::new(config)?;

    let report = sim.liveness_check()?;

    assert!(report.livelock_observed, "expected a livelock: {report:?}");
    assert_eq!(report.total_cycles(), 0);
    assert!(report.total_failed_attempts() > 0);
    assert_arena_unlocked(&sim)
}

// ========================================================================
// SCENARIO 5: Shared mode never contends
// ========================================================================
//
// GIVEN: 4 agents requesting their seats in shared mode, even under the
//        unordered strategy
// WHEN: The ring runs to completion
// THEN: Everyone finishes and no payload is ever written

#[test]
#[serial]
fn test_shared_mode_ring_never_contends() -> Result<(), Error> {
    let config = RingConfig::new(4)
        .with_mode(LockMode::Shared)
        .with_strategy(AcquireStrategy::unordered_with_grip(
            Duration::from_millis(10),
            Duration::from_millis(5),
        ))
        .with_work(Duration::from_millis(1));
    let sim = RingSimulation::new(config)?;

    let report = sim.run_to_completion()?;

    assert!(report.all_completed(3), "incomplete ring: {report:?}");
    assert_eq!(report.total_failed_attempts(), 0, "shared seats never block");
    assert_eq!(sim.payload_total(), 0, "shared holds must not write");
    assert_arena_unlocked(&sim)
}

// ========================================================================
// SCENARIO 6: Payload integrity under sustained contention
// ========================================================================
//
// GIVEN: 4 agents hammering the ring for 25 cycles with no pacing at all
// WHEN: The ring runs to completion
// THEN: The payload tally is exact, so no two agents ever worked a seat
//       at the same time

#[test]
#[serial]
fn test_payload_survives_sustained_contention() -> Result<(), Error> {
    let config = RingConfig::new(4)
        .with_cycles(25)
        .with_work(Duration::ZERO);
    let sim = RingSimulation::new(config)?;

    let report = sim.run_to_completion()?;

    assert!(report.all_completed(25), "incomplete ring: {report:?}");
    // 4 agents x 25 cycles x 2 seats bumped per cycle.
    assert_eq!(sim.payload_total(), 200, "payload updates were lost");
    assert_arena_unlocked(&sim)
}

// ========================================================================
// SCENARIO 7: Try-once agents retry their way home
// ========================================================================
//
// GIVEN: 2 agents under the ordered strategy with the try-once policy
// WHEN: The ring runs to completion
// THEN: Contention shows up as failed attempts, not as a stuck ring

#[test]
#[serial]
fn test_try_once_ring_completes_despite_contention() -> Result<(), Error> {
    let config = RingConfig::new(2)
        .with_policy(AcquirePolicy::TryOnce)
        .with_work(Duration::from_millis(1))
        .with_think(Duration::from_millis(1))
        .with_starvation_threshold(64);
    let sim = RingSimulation::new(config)?;

    let report = sim.run_to_completion()?;

    assert!(report.all_completed(3), "incomplete ring: {report:?}");
    assert!(report.starved_agents.is_empty(), "nobody should starve");
    for index in 0..2 {
        assert!(
            report.failed_attempts.contains_key(&AgentId::new(index)),
            "every agent must be tallied"
        );
    }
    assert_arena_unlocked(&sim)
}
