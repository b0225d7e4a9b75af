//! Agents: identity, lifecycle state machine, and the work loop
//!
//! An agent cycles Idle -> Requesting -> Holding -> Releasing -> Idle,
//! acquiring its whole resource set through the arbitrator, mutating the
//! payloads it holds exclusively, and releasing everything before going
//! idle again. A failed acquisition falls back to Idle; repeated failures
//! trip the starvation threshold and stop the agent with a `Starved`
//! event.
//!
//! Cancellation is cooperative and coarse: the shutdown flag is consulted
//! only at the Idle safe point, never mid-acquisition and never while
//! holding.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::arbitrator::{AcquirePolicy, AcquireRequest, Arbitrator};
use crate::error::{Error, Result};
use crate::events::Event;
use crate::grant::Grant;

/// Default number of consecutive failed cycles before an agent gives up
pub const DEFAULT_STARVATION_THRESHOLD: u32 = 8;

/// Identity of an agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(usize);

impl AgentId {
    /// Create an agent id from its index
    #[must_use]
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    /// The index behind this id
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "A{}", self.0)
    }
}

/// Where an agent is in its cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    /// Holding nothing, between cycles
    Idle,
    /// An acquisition is in flight
    Requesting,
    /// Every requested resource is held
    Holding,
    /// Handing resources back
    Releasing,
}

impl AgentState {
    /// Whether moving to `next` is a legal step of the cycle
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Idle, Self::Requesting)
                | (Self::Requesting, Self::Holding)
                | (Self::Requesting, Self::Idle)
                | (Self::Holding, Self::Releasing)
                | (Self::Releasing, Self::Idle)
        )
    }
}

/// Everything an agent needs to run: identity, request, pacing
#[derive(Debug, Clone)]
pub struct AgentSpec {
    id: AgentId,
    request: AcquireRequest,
    policy: AcquirePolicy,
    work: Duration,
    think: Duration,
    starvation_threshold: u32,
}

impl AgentSpec {
    /// Spec with blocking policy, no pacing, and the default starvation
    /// threshold
    #[must_use]
    pub fn new(id: AgentId, request: AcquireRequest) -> Self {
        Self {
            id,
            request,
            policy: AcquirePolicy::Blocking,
            work: Duration::ZERO,
            think: Duration::ZERO,
            starvation_threshold: DEFAULT_STARVATION_THRESHOLD,
        }
    }

    /// Set the acquisition policy
    #[must_use]
    pub const fn with_policy(mut self, policy: AcquirePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Set how long the agent works while holding
    #[must_use]
    pub const fn with_work(mut self, work: Duration) -> Self {
        self.work = work;
        self
    }

    /// Set how long the agent thinks between cycles
    #[must_use]
    pub const fn with_think(mut self, think: Duration) -> Self {
        self.think = think;
        self
    }

    /// Set how many consecutive failed cycles mean starvation
    #[must_use]
    pub const fn with_starvation_threshold(mut self, threshold: u32) -> Self {
        self.starvation_threshold = threshold;
        self
    }

    /// The agent identity
    #[must_use]
    pub const fn id(&self) -> AgentId {
        self.id
    }

    /// The resources this agent cycles over
    #[must_use]
    pub const fn request(&self) -> &AcquireRequest {
        &self.request
    }

    /// The acquisition policy
    #[must_use]
    pub const fn policy(&self) -> AcquirePolicy {
        self.policy
    }
}

/// What one cycle produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Acquired, worked, released
    Completed,
    /// The acquisition failed with a retryable error; nothing was held
    Failed(Error),
}

/// Per-agent tallies, collected when the agent stops
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentReport {
    /// The reporting agent
    pub id: AgentId,
    /// Cycles that completed
    pub completed: u64,
    /// Acquisition attempts that failed
    pub failed_attempts: u64,
    /// Whether the agent stopped because it starved
    pub starved: bool,
}

/// A worker cycling through acquire, work, release
#[derive(Debug)]
pub struct Agent {
    spec: AgentSpec,
    state: AgentState,
    completed: u64,
    failed_attempts: u64,
    consecutive_failures: u32,
    starved: bool,
}

impl Agent {
    /// Create an idle agent from its spec
    #[must_use]
    pub const fn new(spec: AgentSpec) -> Self {
        Self {
            spec,
            state: AgentState::Idle,
            completed: 0,
            failed_attempts: 0,
            consecutive_failures: 0,
            starved: false,
        }
    }

    /// The agent identity
    #[must_use]
    pub const fn id(&self) -> AgentId {
        self.spec.id
    }

    /// Current lifecycle state
    #[must_use]
    pub const fn state(&self) -> AgentState {
        self.state
    }

    /// Cycles completed so far
    #[must_use]
    pub const fn completed(&self) -> u64 {
        self.completed
    }

    fn transition(&mut self, next: AgentState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal agent transition"
        );
        self.state = next;
    }

    /// One full pass through the cycle.
    ///
    /// Retryable acquisition failures come back as
    /// [`CycleOutcome::Failed`]; programming errors propagate as `Err`.
    pub fn run_cycle(&mut self, arbitrator: &Arbitrator) -> Result<CycleOutcome> {
        self.transition(AgentState::Requesting);
        match arbitrator.acquire(self.spec.id, &self.spec.request, self.spec.policy) {
            Ok(grant) => {
                self.transition(AgentState::Holding);
                self.work_on(&grant)?;
                self.transition(AgentState::Releasing);
                grant.release()?;
                self.transition(AgentState::Idle);
                self.completed += 1;
                self.consecutive_failures = 0;
                Ok(CycleOutcome::Completed)
            }
            Err(err) if err.is_retryable() => {
                self.transition(AgentState::Idle);
                self.failed_attempts += 1;
                self.consecutive_failures += 1;
                Ok(CycleOutcome::Failed(err))
            }
            Err(err) => {
                self.transition(AgentState::Idle);
                Err(err)
            }
        }
    }

    /// The critical section: bump every exclusively held payload through a
    /// split read-then-write, then stay in the section for the work pause.
    ///
    /// The split update is deliberate. If exclusivity were ever violated,
    /// two agents in here at once would lose updates, and the payload
    /// tally at the end of a run would come up short.
    fn work_on(&self, grant: &Grant) -> Result<()> {
        for handle in grant.handles() {
            if handle.mode().is_exclusive() {
                let value = handle.payload();
                handle.store_payload(value + 1)?;
            }
        }
        if !self.spec.work.is_zero() {
            thread::sleep(self.spec.work);
        }
        Ok(())
    }

    /// Run cycles until the budget is spent, shutdown is observed, or the
    /// starvation threshold trips. `None` means no cycle budget.
    ///
    /// Shutdown and budget are consulted only at the Idle safe point.
    pub fn run(
        &mut self,
        arbitrator: &Arbitrator,
        cycles: Option<u64>,
        shutdown: &AtomicBool,
    ) -> Result<AgentReport> {
        loop {
            if shutdown.load(Ordering::Relaxed) {
                break;
            }
            if cycles.is_some_and(|budget| self.completed >= budget) {
                break;
            }
            if self.consecutive_failures >= self.spec.starvation_threshold {
                self.starved = true;
                tracing::warn!(
                    "{} starved after {} consecutive failed cycles",
                    self.spec.id,
                    self.consecutive_failures
                );
                arbitrator.bus().record(Event::starved(
                    self.spec.id,
                    self.consecutive_failures,
                    Utc::now(),
                ));
                break;
            }
            if !self.spec.think.is_zero() {
                thread::sleep(self.spec.think);
            }
            self.run_cycle(arbitrator)?;
        }
        Ok(self.report())
    }

    /// Tallies so far
    #[must_use]
    pub const fn report(&self) -> AgentReport {
        AgentReport {
            id: self.spec.id,
            completed: self.completed,
            failed_attempts: self.failed_attempts,
            starved: self.starved,
        }
    }
}
