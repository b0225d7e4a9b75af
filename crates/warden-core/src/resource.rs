//! Resources, lock state, and the arena
//!
//! A [`Resource`] is a named lockable thing: an integer identity, a lock
//! state machine, and an opaque `u64` payload that tests use to prove
//! exclusivity actually held. Resources live in an [`Arena`] that is built
//! explicitly by the caller and passed around by reference; there is no
//! process-global registry. The ascending [`ResourceId`] order doubles as
//! the global acquisition order used by the deadlock-free strategy, and it
//! is fixed once the arena exists.
//!
//! # Design Principles
//!
//! - **Zero panics**: All operations return `Result<T, Error>`
//! - **Loud programming errors**: invalid releases and self-re-acquisition
//!   are reported, never silently absorbed
//! - **Drop-safe**: unlocking is driven by RAII handles in [`crate::grant`]

use std::collections::BTreeSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};

use crate::agent::AgentId;
use crate::error::{Error, Result};
use crate::grant::LockMode;

/// Identity of a lockable resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(usize);

impl ResourceId {
    /// Create a resource id from its index
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

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "R{}", self.0)
    }
}

/// Who holds a resource right now
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockState {
    /// Nobody holds the resource
    Unlocked,
    /// One or more agents hold the resource for reading; the set is never
    /// empty (an emptied set collapses to `Unlocked`)
    Shared(BTreeSet<AgentId>),
    /// Exactly one agent holds the resource for writing
    Exclusive(AgentId),
}

impl LockState {
    /// Whether nobody holds the resource
    #[must_use]
    pub const fn is_unlocked(&self) -> bool {
        matches!(self, Self::Unlocked)
    }

    /// Whether the resource is held in shared mode
    #[must_use]
    pub const fn is_shared(&self) -> bool {
        matches!(self, Self::Shared(_))
    }

    /// Whether the resource is held exclusively
    #[must_use]
    pub const fn is_exclusive(&self) -> bool {
        matches!(self, Self::Exclusive(_))
    }

    /// How many agents hold the resource
    #[must_use]
    pub fn holder_count(&self) -> usize {
        match self {
            Self::Unlocked => 0,
            Self::Shared(holders) => holders.len(),
            Self::Exclusive(_) => 1,
        }
    }

    /// Whether the given agent is among the holders
    #[must_use]
    pub fn holds(&self, agent: AgentId) -> bool {
        match self {
            Self::Unlocked => false,
            Self::Shared(holders) => holders.contains(&agent),
            Self::Exclusive(holder) => *holder == agent,
        }
    }
}

/// A lockable resource: identity, lock state, and an opaque payload.
///
/// The payload is a plain counter read and written through separate calls,
/// so a lost update under concurrent "exclusive" holders is detectable:
/// payload integrity is the witness that arbitration kept its promise.
#[derive(Debug)]
pub struct Resource {
    id: ResourceId,
    state: Mutex<LockState>,
    available: Condvar,
    payload: AtomicU64,
}

impl Resource {
    /// Create an unlocked resource with a zeroed payload
    #[must_use]
    pub fn new(id: ResourceId) -> Self {
        Self {
            id,
            state: Mutex::new(LockState::Unlocked),
            available: Condvar::new(),
            payload: AtomicU64::new(0),
        }
    }

    /// The resource identity
    #[must_use]
    pub const fn id(&self) -> ResourceId {
        self.id
    }

    /// Snapshot of the current lock state, for diagnostics and tests
    #[must_use]
    pub fn lock_state(&self) -> LockState {
        self.state.lock().clone()
    }

    /// Read the opaque payload
    pub(crate) fn payload_load(&self) -> u64 {
        self.payload.load(Ordering::Relaxed)
    }

    /// Overwrite the opaque payload
    pub(crate) fn payload_store(&self, value: u64) {
        self.payload.store(value, Ordering::Relaxed);
    }

    /// Compatibility check and transition, under the state mutex.
    ///
    /// Returns `Ok(true)` when the agent now holds the resource, `Ok(false)`
    /// when the current holders are incompatible, and `Err(AlreadyHeld)`
    /// when the agent is re-requesting something it already holds.
    fn admit(&self, state: &mut LockState, agent: AgentId, mode: LockMode) -> Result<bool> {
        if state.holds(agent) {
            return Err(Error::AlreadyHeld {
                resource: self.id,
                agent,
            });
        }
        match (&mut *state, mode) {
            (LockState::Unlocked, LockMode::Exclusive) => {
                *state = LockState::Exclusive(agent);
                Ok(true)
            }
            (LockState::Unlocked, LockMode::Shared) => {
                *state = LockState::Shared(BTreeSet::from([agent]));
                Ok(true)
            }
            (LockState::Shared(holders), LockMode::Shared) => {
                holders.insert(agent);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// One non-blocking acquisition attempt
    pub(crate) fn try_acquire(&self, agent: AgentId, mode: LockMode) -> Result<bool> {
        let mut state = self.state.lock();
        self.admit(&mut state, agent, mode)
    }

    /// Blocking acquisition, optionally bounded by a deadline.
    ///
    /// Returns `Ok(true)` once the resource is held and `Ok(false)` when the
    /// deadline fired first. With no deadline this waits as long as it takes.
    pub(crate) fn acquire_blocking(
        &self,
        agent: AgentId,
        mode: LockMode,
        deadline: Option<Instant>,
    ) -> Result<bool> {
        let mut state = self.state.lock();
        loop {
            if self.admit(&mut state, agent, mode)? {
                return Ok(true);
            }
            match deadline {
                Some(deadline) => {
                    if self.available.wait_until(&mut state, deadline).timed_out() {
                        return Ok(false);
                    }
                }
                None => self.available.wait(&mut state),
            }
        }
    }

    /// Release one hold on the resource.
    ///
    /// The releasing agent must hold the resource in exactly the given mode;
    /// anything else is an [`Error::InvalidRelease`], reported loudly.
    pub(crate) fn release(&self, agent: AgentId, mode: LockMode) -> Result<()> {
        let mut state = self.state.lock();
        let released = match (&mut *state, mode) {
            (LockState::Exclusive(holder), LockMode::Exclusive) if *holder == agent => {
                *state = LockState::Unlocked;
                true
            }
            (LockState::Shared(holders), LockMode::Shared) => holders.remove(&agent),
            _ => false,
        };
        if released && matches!(&*state, LockState::Shared(holders) if holders.is_empty()) {
            *state = LockState::Unlocked;
        }
        drop(state);

        if released {
            self.available.notify_all();
            Ok(())
        } else {
            tracing::error!("invalid release: {} does not hold {} as {}", agent, self.id, mode);
            Err(Error::InvalidRelease {
                resource: self.id,
                agent,
            })
        }
    }
}

/// An explicitly constructed set of resources.
///
/// The arena owns the resources and hands out shared references; every
/// arbitrator and simulation is wired to one arena by its caller.
#[derive(Debug)]
pub struct Arena {
    resources: Vec<Arc<Resource>>,
}

impl Arena {
    /// Create an arena of `count` unlocked resources with ids `0..count`
    #[must_use]
    pub fn new(count: usize) -> Self {
        let resources = (0..count)
            .map(|index| Arc::new(Resource::new(ResourceId::new(index))))
            .collect();
        Self { resources }
    }

    /// Number of resources in the arena
    #[must_use]
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// Whether the arena is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// All resource ids, in ascending (acquisition) order
    #[must_use]
    pub fn ids(&self) -> Vec<ResourceId> {
        self.resources.iter().map(|r| r.id()).collect()
    }

    /// Whether the arena contains the given id
    #[must_use]
    pub fn contains(&self, id: ResourceId) -> bool {
        id.index() < self.resources.len()
    }

    /// Look up a resource by id
    pub fn resource(&self, id: ResourceId) -> Result<&Arc<Resource>> {
        self.resources
            .get(id.index())
            .ok_or_else(|| Error::invalid_request(format!("unknown resource {id}")))
    }

    /// Read a resource's payload without holding a lock, for post-run
    /// assertions when all agents have stopped
    pub fn payload_of(&self, id: ResourceId) -> Result<u64> {
        self.resource(id).map(|r| r.payload_load())
    }
}
