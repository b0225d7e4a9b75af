//! The ring harness: N agents contending over N resources in a cycle
//!
//! Agent `i` claims seats `R_i` and `R_((i+1) mod N)`, in that caller
//! order. Under the unordered strategy the wrap at the last seat closes a
//! hold-and-wait cycle; under the ordered strategy the same request sorts
//! into the global order and the cycle cannot form.
//!
//! Two drive modes: `run_to_completion` gives every agent a cycle budget
//! and joins, `liveness_check` runs agents against a wall-clock window and
//! classifies what the window produced (progress, livelock, or deadlock).

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::agent::{
    Agent, AgentId, AgentReport, AgentSpec, DEFAULT_STARVATION_THRESHOLD,
};
use crate::arbitrator::{AcquirePolicy, AcquireRequest, AcquireStrategy, Arbitrator};
use crate::error::{Error, Result};
use crate::events::EventBus;
use crate::grant::LockMode;
use crate::resource::{Arena, ResourceId};

/// Default number of seats in the ring
pub const DEFAULT_AGENTS: usize = 5;

/// Default cycle budget per agent for `run_to_completion`
pub const DEFAULT_CYCLES: u64 = 3;

/// Default time an agent spends holding its seats each cycle
pub const DEFAULT_WORK: Duration = Duration::from_millis(10);

/// Default per-attempt budget used when `liveness_check` bounds a
/// blocking policy
pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_millis(250);

/// Default observation window for `liveness_check`
pub const DEFAULT_CHECK_WINDOW: Duration = Duration::from_secs(2);

/// Everything that shapes a ring run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RingConfig {
    /// Number of agents, which is also the number of seats (min 2)
    pub agents: usize,
    /// Acquisition strategy every agent runs under
    pub strategy: AcquireStrategy,
    /// Lock mode every agent requests its seats in
    pub mode: LockMode,
    /// Acquisition policy for `run_to_completion`
    pub policy: AcquirePolicy,
    /// Cycle budget per agent for `run_to_completion`
    pub cycles: u64,
    /// How long an agent holds its seats each cycle
    pub work: Duration,
    /// How long an agent idles between cycles
    pub think: Duration,
    /// Start offset between consecutive agents: agent `i` waits
    /// `stagger * i` before its first cycle
    pub stagger: Duration,
    /// Consecutive failed cycles before an agent stops starved
    pub starvation_threshold: u32,
    /// Per-attempt budget substituted for a blocking policy during
    /// `liveness_check`
    pub attempt_timeout: Duration,
    /// How long `liveness_check` lets the ring run before classifying
    pub check_window: Duration,
}

impl RingConfig {
    /// Config for a ring of `agents` seats with the default pacing: ordered
    /// strategy, exclusive mode, blocking policy, 3 cycles of 10ms work.
    #[must_use]
    pub const fn new(agents: usize) -> Self {
        Self {
            agents,
            strategy: AcquireStrategy::Ordered,
            mode: LockMode::Exclusive,
            policy: AcquirePolicy::Blocking,
            cycles: DEFAULT_CYCLES,
            work: DEFAULT_WORK,
            think: Duration::ZERO,
            stagger: Duration::ZERO,
            starvation_threshold: DEFAULT_STARVATION_THRESHOLD,
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
            check_window: DEFAULT_CHECK_WINDOW,
        }
    }

    /// Set the acquisition strategy
    #[must_use]
    pub const fn with_strategy(mut self, strategy: AcquireStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Set the lock mode
    #[must_use]
    pub const fn with_mode(mut self, mode: LockMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the acquisition policy
    #[must_use]
    pub const fn with_policy(mut self, policy: AcquirePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Set the per-agent cycle budget
    #[must_use]
    pub const fn with_cycles(mut self, cycles: u64) -> Self {
        self.cycles = cycles;
        self
    }

    /// Set the holding time per cycle
    #[must_use]
    pub const fn with_work(mut self, work: Duration) -> Self {
        self.work = work;
        self
    }

    /// Set the idle time between cycles
    #[must_use]
    pub const fn with_think(mut self, think: Duration) -> Self {
        self.think = think;
        self
    }

    /// Set the start offset between consecutive agents
    #[must_use]
    pub const fn with_stagger(mut self, stagger: Duration) -> Self {
        self.stagger = stagger;
        self
    }

    /// Set the starvation threshold
    #[must_use]
    pub const fn with_starvation_threshold(mut self, threshold: u32) -> Self {
        self.starvation_threshold = threshold;
        self
    }

    /// Set the per-attempt budget for the liveness check
    #[must_use]
    pub const fn with_attempt_timeout(mut self, attempt_timeout: Duration) -> Self {
        self.attempt_timeout = attempt_timeout;
        self
    }

    /// Set the liveness observation window
    #[must_use]
    pub const fn with_check_window(mut self, check_window: Duration) -> Self {
        self.check_window = check_window;
        self
    }

    /// Reject configs the harness cannot run meaningfully
    pub fn validate(&self) -> Result<()> {
        if self.agents < 2 {
            return Err(Error::invalid_request(format!(
                "a ring needs at least 2 agents, got {}",
                self.agents
            )));
        }
        if self.cycles == 0 {
            return Err(Error::invalid_request("cycle budget must be at least 1"));
        }
        if self.starvation_threshold == 0 {
            return Err(Error::invalid_request(
                "starvation threshold must be at least 1",
            ));
        }
        if let AcquireStrategy::Unordered { backoff, .. } = self.strategy {
            if backoff.is_zero() {
                return Err(Error::invalid_request(
                    "unordered strategy requires a nonzero backoff",
                ));
            }
        }
        if self.attempt_timeout.is_zero() {
            return Err(Error::invalid_request(
                "attempt timeout must be nonzero",
            ));
        }
        if self.check_window.is_zero() {
            return Err(Error::invalid_request("check window must be nonzero"));
        }
        Ok(())
    }
}

impl Default for RingConfig {
    fn default() -> Self {
        Self::new(DEFAULT_AGENTS)
    }
}

/// The two seats agent `index` claims, in claim order: its own seat, then
/// the next one around the ring.
const fn seats(index: usize, agents: usize) -> (ResourceId, ResourceId) {
    (
        ResourceId::new(index),
        ResourceId::new((index + 1) % agents),
    )
}

/// Start offset for agent `index`, saturating instead of overflowing
fn stagger_for(stagger: Duration, index: usize) -> Duration {
    let factor = u32::try_from(index).unwrap_or(u32::MAX);
    stagger.checked_mul(factor).unwrap_or(Duration::MAX)
}

/// A configured ring: arena, arbitrator, and the recipe for its agents
#[derive(Debug)]
pub struct RingSimulation {
    config: RingConfig,
    arena: Arc<Arena>,
    arbitrator: Arbitrator,
}

impl RingSimulation {
    /// Build the arena and arbitrator for `config`.
    ///
    /// Telemetry goes nowhere until a bus is attached with
    /// [`with_bus`](Self::with_bus).
    pub fn new(config: RingConfig) -> Result<Self> {
        config.validate()?;
        let arena = Arc::new(Arena::new(config.agents));
        let arbitrator =
            Arbitrator::new(Arc::clone(&arena)).with_strategy(config.strategy);
        Ok(Self {
            config,
            arena,
            arbitrator,
        })
    }

    /// Route every agent's telemetry through `bus`
    #[must_use]
    pub fn with_bus(mut self, bus: EventBus) -> Self {
        self.arbitrator = self.arbitrator.with_bus(bus);
        self
    }

    /// The config this ring was built from
    #[must_use]
    pub const fn config(&self) -> &RingConfig {
        &self.config
    }

    /// The arena the ring runs against
    #[must_use]
    pub const fn arena(&self) -> &Arc<Arena> {
        &self.arena
    }

    /// Sum of every seat's payload, the cross-check that exclusive cycles
    /// never lost an update
    #[must_use]
    pub fn payload_total(&self) -> u64 {
        self.arena
            .ids()
            .into_iter()
            .filter_map(|id| self.arena.payload_of(id).ok())
            .sum()
    }

    fn agent_spec(&self, index: usize, policy: AcquirePolicy) -> Result<AgentSpec> {
        let (own, next) = seats(index, self.config.agents);
        let request = AcquireRequest::new(vec![own, next], self.config.mode)?;
        Ok(AgentSpec::new(AgentId::new(index), request)
            .with_policy(policy)
            .with_work(self.config.work)
            .with_think(self.config.think)
            .with_starvation_threshold(self.config.starvation_threshold))
    }

    /// Run every agent to its cycle budget and aggregate the tallies.
    ///
    /// When this returns `Ok`, every agent came home through its Idle safe
    /// point, so the report's deadlock and livelock flags are false by
    /// construction.
    pub fn run_to_completion(&self) -> Result<SimulationReport> {
        tracing::debug!(
            "running ring of {} agents to {} cycles each",
            self.config.agents,
            self.config.cycles
        );
        self.drive(self.config.policy, Some(self.config.cycles), None)
    }

    /// Run the ring against the check window, then classify.
    ///
    /// A blocking policy is bounded to `TimedRetry(attempt_timeout)` so
    /// every agent keeps reaching its Idle safe point and the shutdown
    /// flag is honored. The verdict over the whole window:
    /// - grants happened: neither flag, the ring is live;
    /// - no grants but failed attempts: `livelock_observed`, everyone was
    ///   active and nobody progressed;
    /// - no grants and no failed attempts: `deadlock_detected`, nobody
    ///   even concluded an attempt.
    pub fn liveness_check(&self) -> Result<SimulationReport> {
        let policy = match self.config.policy {
            AcquirePolicy::Blocking => {
                AcquirePolicy::TimedRetry(self.config.attempt_timeout)
            }
            bounded => bounded,
        };
        tracing::debug!(
            "liveness check over {:?} with policy {:?}",
            self.config.check_window,
            policy
        );
        let mut report = self.drive(policy, None, Some(self.config.check_window))?;
        if report.total_cycles() == 0 {
            if report.total_failed_attempts() == 0 {
                report.deadlock_detected = true;
                tracing::warn!(
                    "deadlock detected: no attempt concluded within {:?}",
                    self.config.check_window
                );
            } else {
                report.livelock_observed = true;
                tracing::warn!(
                    "livelock observed: {} failed attempts and no grants within {:?}",
                    report.total_failed_attempts(),
                    self.config.check_window
                );
            }
        }
        Ok(report)
    }

    /// Spawn one named thread per agent, optionally stop them after
    /// `window`, join them all, and fold their reports.
    fn drive(
        &self,
        policy: AcquirePolicy,
        cycles: Option<u64>,
        window: Option<Duration>,
    ) -> Result<SimulationReport> {
        let shutdown = AtomicBool::new(false);
        let started = Instant::now();

        let agent_reports = thread::scope(|scope| -> Result<Vec<AgentReport>> {
            let mut workers = Vec::with_capacity(self.config.agents);
            for index in 0..self.config.agents {
                let spec = self.agent_spec(index, policy)?;
                let offset = stagger_for(self.config.stagger, index);
                let arbitrator = &self.arbitrator;
                let stop = &shutdown;
                let spawned = thread::Builder::new()
                    .name(format!("agent-{index}"))
                    .spawn_scoped(scope, move || {
                        if !offset.is_zero() {
                            thread::sleep(offset);
                        }
                        Agent::new(spec).run(arbitrator, cycles, stop)
                    });
                match spawned {
                    Ok(worker) => workers.push(worker),
                    Err(err) => {
                        // Stop the agents already running before the scope
                        // joins them on the way out.
                        shutdown.store(true, Ordering::Relaxed);
                        return Err(Error::harness(format!(
                            "failed to spawn agent-{index}: {err}"
                        )));
                    }
                }
            }

            if let Some(window) = window {
                thread::sleep(window);
                shutdown.store(true, Ordering::Relaxed);
            }

            let mut reports = Vec::with_capacity(workers.len());
            for worker in workers {
                let name = worker.thread().name().unwrap_or("agent").to_owned();
                let report = worker
                    .join()
                    .map_err(|_| Error::harness(format!("{name} panicked")))??;
                reports.push(report);
            }
            Ok(reports)
        })?;

        Ok(SimulationReport::from_agents(&agent_reports, started.elapsed()))
    }
}

/// What a ring run produced, agent by agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationReport {
    /// Completed cycles per agent
    pub cycles_completed: BTreeMap<AgentId, u64>,
    /// Failed acquisition attempts per agent
    pub failed_attempts: BTreeMap<AgentId, u64>,
    /// Agents that stopped after tripping their starvation threshold
    pub starved_agents: BTreeSet<AgentId>,
    /// Liveness verdict: nobody concluded a single attempt
    pub deadlock_detected: bool,
    /// Liveness verdict: attempts concluded, none was ever granted
    pub livelock_observed: bool,
    /// Wall-clock time from first spawn to last join
    pub elapsed: Duration,
}

impl SimulationReport {
    fn from_agents(agents: &[AgentReport], elapsed: Duration) -> Self {
        Self {
            cycles_completed: agents.iter().map(|r| (r.id, r.completed)).collect(),
            failed_attempts: agents
                .iter()
                .map(|r| (r.id, r.failed_attempts))
                .collect(),
            starved_agents: agents
                .iter()
                .filter(|r| r.starved)
                .map(|r| r.id)
                .collect(),
            deadlock_detected: false,
            livelock_observed: false,
            elapsed,
        }
    }

    /// Cycles completed across all agents
    #[must_use]
    pub fn total_cycles(&self) -> u64 {
        self.cycles_completed.values().sum()
    }

    /// Failed attempts across all agents
    #[must_use]
    pub fn total_failed_attempts(&self) -> u64 {
        self.failed_attempts.values().sum()
    }

    /// Whether every agent completed at least `cycles` cycles
    #[must_use]
    pub fn all_completed(&self, cycles: u64) -> bool {
        !self.cycles_completed.is_empty()
            && self.cycles_completed.values().all(|&done| done >= cycles)
    }

    /// Error-typed view of the liveness verdict, for callers that want to
    /// `?` their way out of a stuck ring
    pub fn ensure_progress(&self) -> Result<()> {
        if self.deadlock_detected {
            return Err(Error::harness(format!(
                "deadlock detected: no attempt concluded within {:?}",
                self.elapsed
            )));
        }
        if self.livelock_observed {
            return Err(Error::LivelockObserved {
                window: self.elapsed,
            });
        }
        Ok(())
    }
}
