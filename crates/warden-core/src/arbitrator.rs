//! Atomic multi-resource acquisition
//!
//! The [`Arbitrator`] is the only way agents take locks. A request names
//! the resources and the mode; a policy says how long to insist; the
//! arbitrator's strategy decides the order locks are taken in:
//!
//! - [`AcquireStrategy::Ordered`] (default) sorts the request into
//!   ascending resource order before locking. With every agent locking
//!   along the same total order, a hold-and-wait cycle cannot form, so
//!   this strategy cannot deadlock.
//! - [`AcquireStrategy::Unordered`] locks in caller order and retries
//!   with a fixed backoff. It exists to demonstrate the failure mode the
//!   ordered strategy prevents: two agents with reversed requests and
//!   identical backoff livelock here. The backoff is deliberately
//!   jitter-free so the pathology is reproducible.
//!
//! Whatever happens, acquisition is all-or-nothing: on any failure the
//! agent holds nothing from the request, and partial progress is unwound
//! in reverse acquisition order.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use chrono::Utc;
use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::agent::AgentId;
use crate::error::{Error, Result};
use crate::events::{Event, EventBus};
use crate::grant::{Grant, LockHandle, LockMode};
use crate::resource::{Arena, Resource, ResourceId};

/// A validated multi-resource acquisition request.
///
/// The resource vector preserves the caller-supplied order, which is
/// significant under the unordered strategy and for failure reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcquireRequest {
    resources: Vec<ResourceId>,
    mode: LockMode,
}

impl AcquireRequest {
    /// Build a request, rejecting empty and duplicate-carrying ones
    pub fn new(resources: Vec<ResourceId>, mode: LockMode) -> Result<Self> {
        if resources.is_empty() {
            return Err(Error::invalid_request("request names no resources"));
        }
        if let Some(dup) = resources.iter().duplicates().next() {
            return Err(Error::invalid_request(format!(
                "duplicate resource {dup} in request"
            )));
        }
        Ok(Self { resources, mode })
    }

    /// Exclusive-mode request
    pub fn exclusive(resources: Vec<ResourceId>) -> Result<Self> {
        Self::new(resources, LockMode::Exclusive)
    }

    /// Shared-mode request
    pub fn shared(resources: Vec<ResourceId>) -> Result<Self> {
        Self::new(resources, LockMode::Shared)
    }

    /// Requested resources in caller-supplied order
    #[must_use]
    pub fn resources(&self) -> &[ResourceId] {
        &self.resources
    }

    /// Requested lock mode
    #[must_use]
    pub const fn mode(&self) -> LockMode {
        self.mode
    }

    /// Number of requested resources
    #[must_use]
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// Always false: empty requests are rejected at construction
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

/// How long an acquisition insists before giving up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AcquirePolicy {
    /// Wait as long as it takes
    Blocking,
    /// One attempt that never parks; failure reports the blocking
    /// resource's index in the caller-supplied order
    TryOnce,
    /// Keep trying until the duration elapses, then fail with `Timeout`
    TimedRetry(Duration),
}

/// The order locks are taken in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AcquireStrategy {
    /// Ascending resource order; deadlock-free. The default.
    Ordered,
    /// Caller order with fixed-backoff retry rounds; livelock-prone by
    /// design, for diagnostics and demonstration
    Unordered {
        /// Fixed pause between retry rounds. No jitter is ever added.
        backoff: Duration,
        /// Fixed pause between acquiring the first resource and trying
        /// the rest. Widens the collision window so the classic livelock
        /// interleaving is stable instead of scheduler-dependent.
        grip: Duration,
    },
}

impl AcquireStrategy {
    /// Unordered strategy with the given backoff and no grip pause
    #[must_use]
    pub const fn unordered(backoff: Duration) -> Self {
        Self::Unordered {
            backoff,
            grip: Duration::ZERO,
        }
    }

    /// Unordered strategy with both pauses set
    #[must_use]
    pub const fn unordered_with_grip(backoff: Duration, grip: Duration) -> Self {
        Self::Unordered { backoff, grip }
    }

    /// Whether this is the ordered (deadlock-free) strategy
    #[must_use]
    pub const fn is_ordered(self) -> bool {
        matches!(self, Self::Ordered)
    }
}

impl Default for AcquireStrategy {
    fn default() -> Self {
        Self::Ordered
    }
}

/// Grants and revokes multi-resource holds against one arena
#[derive(Debug)]
pub struct Arbitrator {
    arena: Arc<Arena>,
    bus: EventBus,
    strategy: AcquireStrategy,
}

impl Arbitrator {
    /// Arbitrator with the default (ordered) strategy and no telemetry
    #[must_use]
    pub fn new(arena: Arc<Arena>) -> Self {
        Self {
            arena,
            bus: EventBus::null(),
            strategy: AcquireStrategy::Ordered,
        }
    }

    /// Set the acquisition strategy
    #[must_use]
    pub fn with_strategy(mut self, strategy: AcquireStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Set the telemetry bus
    #[must_use]
    pub fn with_bus(mut self, bus: EventBus) -> Self {
        self.bus = bus;
        self
    }

    /// The arena this arbitrator grants against
    #[must_use]
    pub fn arena(&self) -> &Arc<Arena> {
        &self.arena
    }

    /// The configured strategy
    #[must_use]
    pub const fn strategy(&self) -> AcquireStrategy {
        self.strategy
    }

    /// The telemetry bus acquisition events are recorded on
    #[must_use]
    pub const fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Acquire every resource in the request, all or nothing.
    ///
    /// Emits `AcquireAttempt` before locking and exactly one of
    /// `AcquireGranted` / `AcquireFailed` after. On any `Err` the agent
    /// holds nothing from this request.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidRequest`] when the request names unknown resources
    /// - [`Error::WouldBlock`] under [`AcquirePolicy::TryOnce`] contention
    /// - [`Error::Timeout`] when [`AcquirePolicy::TimedRetry`] runs out
    /// - [`Error::AlreadyHeld`] when the agent re-requests a held resource
    pub fn acquire(
        &self,
        agent: AgentId,
        request: &AcquireRequest,
        policy: AcquirePolicy,
    ) -> Result<Grant> {
        let plan = self.plan(request)?;
        let started = Instant::now();
        self.bus.record(Event::acquire_attempt(
            agent,
            request.resources().to_vec(),
            request.mode(),
            Utc::now(),
        ));

        let mode = request.mode();
        let outcome = match (self.strategy, policy) {
            (_, AcquirePolicy::TryOnce) => self.try_batch(agent, mode, &plan),
            (AcquireStrategy::Ordered, AcquirePolicy::Blocking) => {
                self.lock_along(agent, mode, &plan, None)
            }
            (AcquireStrategy::Ordered, AcquirePolicy::TimedRetry(budget)) => {
                self.lock_along(agent, mode, &plan, Some(started + budget))
            }
            (AcquireStrategy::Unordered { backoff, grip }, AcquirePolicy::Blocking) => {
                self.unordered_rounds(agent, mode, &plan, backoff, grip, None)
            }
            (AcquireStrategy::Unordered { backoff, grip }, AcquirePolicy::TimedRetry(budget)) => {
                self.unordered_rounds(agent, mode, &plan, backoff, grip, Some(started + budget))
            }
        };

        match outcome {
            Ok(handles) => {
                let grant = Grant::new(handles);
                let wait_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
                tracing::debug!(
                    "{} granted {} resource(s) after {}ms",
                    agent,
                    grant.len(),
                    wait_ms
                );
                self.bus.record(Event::acquire_granted(
                    agent,
                    grant.resource_ids(),
                    mode,
                    wait_ms,
                    Utc::now(),
                ));
                Ok(grant)
            }
            Err(err) => {
                self.bus.record(Event::acquire_failed(
                    agent,
                    request.resources().to_vec(),
                    &err,
                    Utc::now(),
                ));
                Err(err)
            }
        }
    }

    /// Resolve the request against the arena and fix the attempt order:
    /// ascending resource order when ordered, caller order otherwise.
    /// Each entry keeps its index in the caller-supplied order.
    fn plan(&self, request: &AcquireRequest) -> Result<Vec<(usize, Arc<Resource>)>> {
        let resolved: Vec<(usize, Arc<Resource>)> = request
            .resources()
            .iter()
            .enumerate()
            .map(|(index, &id)| self.arena.resource(id).map(|r| (index, Arc::clone(r))))
            .collect::<Result<_>>()?;

        if self.strategy.is_ordered() {
            Ok(resolved
                .into_iter()
                .sorted_by_key(|(_, resource)| resource.id())
                .collect())
        } else {
            Ok(resolved)
        }
    }

    /// Blocking walk along the plan. A deadline bounds every park; when it
    /// fires, everything taken so far is unwound and the attempt fails.
    fn lock_along(
        &self,
        agent: AgentId,
        mode: LockMode,
        plan: &[(usize, Arc<Resource>)],
        deadline: Option<Instant>,
    ) -> Result<Vec<LockHandle>> {
        let started = Instant::now();
        let mut held = Vec::with_capacity(plan.len());
        for (_, resource) in plan {
            match resource.acquire_blocking(agent, mode, deadline) {
                Ok(true) => held.push(self.handle(resource, agent, mode)),
                Ok(false) => {
                    release_descending(held);
                    return Err(Error::Timeout {
                        waited: started.elapsed(),
                    });
                }
                Err(err) => {
                    release_descending(held);
                    return Err(err);
                }
            }
        }
        Ok(held)
    }

    /// One pass of non-blocking tries along the plan. The first busy
    /// resource fails the attempt and reports its caller-order index.
    fn try_batch(
        &self,
        agent: AgentId,
        mode: LockMode,
        plan: &[(usize, Arc<Resource>)],
    ) -> Result<Vec<LockHandle>> {
        let mut held = Vec::with_capacity(plan.len());
        for (index, resource) in plan {
            match resource.try_acquire(agent, mode) {
                Ok(true) => held.push(self.handle(resource, agent, mode)),
                Ok(false) => {
                    release_descending(held);
                    return Err(Error::WouldBlock {
                        resource: resource.id(),
                        index: *index,
                    });
                }
                Err(err) => {
                    release_descending(held);
                    return Err(err);
                }
            }
        }
        Ok(held)
    }

    /// Retry rounds in caller order: block on the first resource, hold it
    /// across the grip pause, try the rest, and on any miss release
    /// everything and nap before the next round. The nap is the fixed
    /// `backoff`, clamped to whatever remains of the deadline.
    fn unordered_rounds(
        &self,
        agent: AgentId,
        mode: LockMode,
        plan: &[(usize, Arc<Resource>)],
        backoff: Duration,
        grip: Duration,
        deadline: Option<Instant>,
    ) -> Result<Vec<LockHandle>> {
        let Some(((_, first_resource), rest)) = plan.split_first() else {
            return Err(Error::invalid_request("request names no resources"));
        };

        let started = Instant::now();
        let mut round: u32 = 0;
        loop {
            if deadline.is_some_and(|d| Instant::now() >= d) {
                return Err(Error::Timeout {
                    waited: started.elapsed(),
                });
            }

            if !first_resource.acquire_blocking(agent, mode, deadline)? {
                return Err(Error::Timeout {
                    waited: started.elapsed(),
                });
            }
            let mut held = vec![self.handle(first_resource, agent, mode)];
            if !grip.is_zero() {
                thread::sleep(grip);
            }

            let mut blocked = None;
            for (_, resource) in rest {
                match resource.try_acquire(agent, mode) {
                    Ok(true) => held.push(self.handle(resource, agent, mode)),
                    Ok(false) => {
                        blocked = Some(resource.id());
                        break;
                    }
                    Err(err) => {
                        release_descending(held);
                        return Err(err);
                    }
                }
            }

            let Some(blocked_id) = blocked else {
                return Ok(held);
            };
            release_descending(held);
            round += 1;
            let nap = deadline.map_or(backoff, |d| {
                backoff.min(d.saturating_duration_since(Instant::now()))
            });
            tracing::debug!(
                "{} round {} blocked on {}, backing off {:?}",
                agent,
                round,
                blocked_id,
                nap
            );
            if !nap.is_zero() {
                thread::sleep(nap);
            }
        }
    }

    fn handle(&self, resource: &Arc<Resource>, agent: AgentId, mode: LockMode) -> LockHandle {
        LockHandle::new(Arc::clone(resource), agent, mode, self.bus.clone())
    }
}

/// Unwind partial progress in reverse acquisition order
fn release_descending(mut held: Vec<LockHandle>) {
    while let Some(handle) = held.pop() {
        drop(handle);
    }
}
