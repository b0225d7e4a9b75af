//! Move-only lock handles and multi-resource grants
//!
//! A [`LockHandle`] is the capability that one agent holds one resource in
//! one mode. Handles are move-only (no `Clone`), release their resource
//! exactly once, and release on drop, so a scope exit can never leak a
//! hold. A [`Grant`] bundles the handles of one atomic acquisition and
//! releases them in descending resource order, the reverse of how they
//! were taken.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::agent::AgentId;
use crate::error::{Error, Result};
use crate::events::{Event, EventBus};
use crate::resource::{Resource, ResourceId};

/// How a resource is held
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "lowercase")]
pub enum LockMode {
    /// Single writer, excludes every other holder
    Exclusive,
    /// Many readers, excludes writers
    Shared,
}

impl LockMode {
    /// Whether this mode grants write access to the payload
    #[must_use]
    pub const fn is_exclusive(self) -> bool {
        matches!(self, Self::Exclusive)
    }
}

/// Witness that one agent holds one resource in one mode.
///
/// Created by the arbitrator after the resource has admitted the agent.
/// Releasing consumes the handle; dropping an unreleased handle releases
/// it. Either way the underlying release runs exactly once.
#[derive(Debug)]
pub struct LockHandle {
    resource: Arc<Resource>,
    agent: AgentId,
    mode: LockMode,
    bus: EventBus,
    released: bool,
}

impl LockHandle {
    /// Wrap an already-admitted hold in a handle
    pub(crate) fn new(
        resource: Arc<Resource>,
        agent: AgentId,
        mode: LockMode,
        bus: EventBus,
    ) -> Self {
        Self {
            resource,
            agent,
            mode,
            bus,
            released: false,
        }
    }

    /// The held resource's id
    #[must_use]
    pub fn resource_id(&self) -> ResourceId {
        self.resource.id()
    }

    /// The holding agent
    #[must_use]
    pub const fn agent(&self) -> AgentId {
        self.agent
    }

    /// The mode this handle holds the resource in
    #[must_use]
    pub const fn mode(&self) -> LockMode {
        self.mode
    }

    /// Read the resource payload
    #[must_use]
    pub fn payload(&self) -> u64 {
        self.resource.payload_load()
    }

    /// Write the resource payload.
    ///
    /// Only an exclusive handle may write; a shared handle gets
    /// [`Error::ReadOnlyHandle`].
    pub fn store_payload(&self, value: u64) -> Result<()> {
        if !self.mode.is_exclusive() {
            return Err(Error::ReadOnlyHandle {
                resource: self.resource.id(),
                agent: self.agent,
            });
        }
        self.resource.payload_store(value);
        Ok(())
    }

    /// Release the hold, consuming the handle
    pub fn release(mut self) -> Result<()> {
        self.release_inner()
    }

    fn release_inner(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        self.resource.release(self.agent, self.mode)?;
        tracing::debug!("{} released {}", self.agent, self.resource.id());
        self.bus.record(Event::released(
            self.agent,
            self.resource.id(),
            self.mode,
            Utc::now(),
        ));
        Ok(())
    }
}

impl Drop for LockHandle {
    fn drop(&mut self) {
        // Invalid releases are already reported loudly by the resource.
        let _ = self.release_inner();
    }
}

/// The all-or-nothing product of one multi-resource acquisition.
///
/// Handles are kept in ascending resource order and released in descending
/// order, whether through [`Grant::release`] or drop.
#[derive(Debug)]
pub struct Grant {
    handles: Vec<LockHandle>,
}

impl Grant {
    /// Bundle handles into a grant, normalizing to ascending resource order
    pub(crate) fn new(mut handles: Vec<LockHandle>) -> Self {
        handles.sort_by_key(LockHandle::resource_id);
        Self { handles }
    }

    /// Number of resources held
    #[must_use]
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Whether the grant holds nothing
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Held resource ids in ascending order
    #[must_use]
    pub fn resource_ids(&self) -> Vec<ResourceId> {
        self.handles.iter().map(LockHandle::resource_id).collect()
    }

    /// All handles, ascending by resource id
    #[must_use]
    pub fn handles(&self) -> &[LockHandle] {
        &self.handles
    }

    /// The handle for one held resource, if present in this grant
    #[must_use]
    pub fn handle(&self, id: ResourceId) -> Option<&LockHandle> {
        self.handles.iter().find(|h| h.resource_id() == id)
    }

    /// Take the handles out for per-resource control.
    ///
    /// The caller becomes responsible for release order.
    #[must_use]
    pub fn into_handles(mut self) -> Vec<LockHandle> {
        std::mem::take(&mut self.handles)
    }

    /// Release every handle in descending resource order.
    ///
    /// All handles are released even if one reports an error; the first
    /// error wins.
    pub fn release(mut self) -> Result<()> {
        let mut first_error = None;
        for handle in self.handles.drain(..).rev() {
            if let Err(err) = handle.release() {
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

impl Drop for Grant {
    fn drop(&mut self) {
        // Pop from the back: descending resource order.
        while let Some(handle) = self.handles.pop() {
            drop(handle);
        }
    }
}
