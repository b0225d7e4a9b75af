//! Telemetry events for lock arbitration
//!
//! Every acquisition attempt, grant, failure, release, and starvation signal
//! is reported as a structured event. The core never formats or prints;
//! events flow through an [`EventSink`] chosen by the caller, and the
//! default sink drops everything.
//!
//! # Design Principles
//!
//! - **Immutable**: Events cannot be modified after creation
//! - **Serializable**: All events can be serialized for transmission
//! - **Typed**: Each event carries specific domain data
//! - **Timestamped**: All events include when they occurred
//! - **Pure**: Event creation is deterministic and side-effect free
//!
//! # Usage
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use warden_core::events::{Event, EventBus, MemorySink};
//!
//! let sink = Arc::new(MemorySink::new());
//! let bus = EventBus::new(sink.clone());
//! bus.record(Event::starved(warden_core::AgentId::new(0), 8, chrono::Utc::now()));
//! assert_eq!(sink.snapshot().len(), 1);
//! ```

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::agent::AgentId;
use crate::error::Error;
use crate::grant::LockMode;
use crate::resource::ResourceId;

// ============================================================================
// Event Enum
// ============================================================================

/// A telemetry event emitted by the arbitration core.
///
/// Events are the observable record of lock traffic. They enable:
/// - Liveness diagnostics (attempt/grant ratios over a window)
/// - Audit logging (complete history of who held what, when)
/// - Streaming to external consumers (JSON lines over a channel)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event_type", content = "data", rename_all = "snake_case")]
pub enum Event {
    /// An agent is about to start a multi-resource acquisition
    AcquireAttempt(Box<AcquireAttemptEvent>),

    /// An acquisition completed; the agent holds every requested resource
    AcquireGranted(Box<AcquireGrantedEvent>),

    /// An acquisition failed; the agent holds nothing from the request
    AcquireFailed(Box<AcquireFailedEvent>),

    /// A single resource was released
    Released(Box<ReleasedEvent>),

    /// An agent exceeded its consecutive-failure threshold and gave up
    Starved(Box<StarvedEvent>),
}

impl Event {
    /// Get the timestamp for when this event occurred
    #[must_use]
    pub const fn timestamp(&self) -> &DateTime<Utc> {
        match self {
            Self::AcquireAttempt(e) => &e.timestamp,
            Self::AcquireGranted(e) => &e.timestamp,
            Self::AcquireFailed(e) => &e.timestamp,
            Self::Released(e) => &e.timestamp,
            Self::Starved(e) => &e.timestamp,
        }
    }

    /// Get the event type as a string
    #[must_use]
    pub const fn event_type(&self) -> &'static str {
        match self {
            Self::AcquireAttempt(_) => "acquire_attempt",
            Self::AcquireGranted(_) => "acquire_granted",
            Self::AcquireFailed(_) => "acquire_failed",
            Self::Released(_) => "released",
            Self::Starved(_) => "starved",
        }
    }

    /// Get the agent this event concerns
    #[must_use]
    pub const fn agent(&self) -> AgentId {
        match self {
            Self::AcquireAttempt(e) => e.agent,
            Self::AcquireGranted(e) => e.agent,
            Self::AcquireFailed(e) => e.agent,
            Self::Released(e) => e.agent,
            Self::Starved(e) => e.agent,
        }
    }

    /// Create an acquire attempt event. Resources are in the
    /// caller-supplied request order.
    #[must_use]
    pub fn acquire_attempt(
        agent: AgentId,
        resources: Vec<ResourceId>,
        mode: LockMode,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self::AcquireAttempt(Box::new(AcquireAttemptEvent {
            agent,
            resources,
            mode,
            timestamp,
        }))
    }

    /// Create an acquire granted event. Resources are in the order they
    /// were actually locked.
    #[must_use]
    pub fn acquire_granted(
        agent: AgentId,
        resources: Vec<ResourceId>,
        mode: LockMode,
        wait_ms: u64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self::AcquireGranted(Box::new(AcquireGrantedEvent {
            agent,
            resources,
            mode,
            wait_ms,
            timestamp,
        }))
    }

    /// Create an acquire failed event from the error that ended the attempt
    #[must_use]
    pub fn acquire_failed(
        agent: AgentId,
        resources: Vec<ResourceId>,
        error: &Error,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let (blocked, blocked_index) = match error {
            Error::WouldBlock { resource, index } => (Some(*resource), Some(*index)),
            _ => (None, None),
        };
        Self::AcquireFailed(Box::new(AcquireFailedEvent {
            agent,
            resources,
            blocked,
            blocked_index,
            code: error.code().to_string(),
            timestamp,
        }))
    }

    /// Create a released event
    #[must_use]
    pub fn released(
        agent: AgentId,
        resource: ResourceId,
        mode: LockMode,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self::Released(Box::new(ReleasedEvent {
            agent,
            resource,
            mode,
            timestamp,
        }))
    }

    /// Create a starved event
    #[must_use]
    pub fn starved(agent: AgentId, consecutive_failures: u32, timestamp: DateTime<Utc>) -> Self {
        Self::Starved(Box::new(StarvedEvent {
            agent,
            consecutive_failures,
            timestamp,
        }))
    }
}

// ============================================================================
// Event Types
// ============================================================================

/// Event emitted before any locking happens for a request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcquireAttemptEvent {
    /// The requesting agent
    pub agent: AgentId,
    /// Requested resources in caller-supplied order
    pub resources: Vec<ResourceId>,
    /// Requested lock mode
    pub mode: LockMode,
    /// When the attempt started
    pub timestamp: DateTime<Utc>,
}

/// Event emitted when a request is granted in full
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcquireGrantedEvent {
    /// The holding agent
    pub agent: AgentId,
    /// Granted resources in acquisition order
    pub resources: Vec<ResourceId>,
    /// Granted lock mode
    pub mode: LockMode,
    /// Milliseconds between attempt and grant
    pub wait_ms: u64,
    /// When the grant completed
    pub timestamp: DateTime<Utc>,
}

/// Event emitted when a request fails with nothing held
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcquireFailedEvent {
    /// The requesting agent
    pub agent: AgentId,
    /// Requested resources in caller-supplied order
    pub resources: Vec<ResourceId>,
    /// The resource that blocked the attempt, when known
    pub blocked: Option<ResourceId>,
    /// Index of the blocking resource in the caller-supplied order
    pub blocked_index: Option<usize>,
    /// Stable error code for the failure
    pub code: String,
    /// When the failure was reported
    pub timestamp: DateTime<Utc>,
}

/// Event emitted when a single resource is released
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleasedEvent {
    /// The releasing agent
    pub agent: AgentId,
    /// The released resource
    pub resource: ResourceId,
    /// The mode the resource was held in
    pub mode: LockMode,
    /// When the release happened
    pub timestamp: DateTime<Utc>,
}

/// Event emitted when an agent gives up after repeated failures
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StarvedEvent {
    /// The starved agent
    pub agent: AgentId,
    /// How many cycles in a row failed before giving up
    pub consecutive_failures: u32,
    /// When starvation was declared
    pub timestamp: DateTime<Utc>,
}

// ============================================================================
// Event Serialization
// ============================================================================

/// Serialize an event to JSON
///
/// # Errors
///
/// Returns an error if serialization fails
pub fn serialize_event(event: &Event) -> Result<String, serde_json::Error> {
    serde_json::to_string(event)
}

/// Deserialize an event from JSON
///
/// # Errors
///
/// Returns an error if deserialization fails
pub fn deserialize_event(json: &str) -> Result<Event, serde_json::Error> {
    serde_json::from_str(json)
}

// ============================================================================
// Sinks
// ============================================================================

/// Consumer of telemetry events.
///
/// Implementations must be safe to call from many agent threads at once.
pub trait EventSink: Send + Sync {
    /// Record one event
    fn record(&self, event: Event);
}

/// Cheap, cloneable handle to the configured sink.
///
/// Arbitrators, handles, and agents each carry a clone; recording an event
/// is a single virtual call.
#[derive(Clone)]
pub struct EventBus {
    sink: Arc<dyn EventSink>,
}

impl EventBus {
    /// Wrap a sink in a bus handle
    #[must_use]
    pub fn new(sink: Arc<dyn EventSink>) -> Self {
        Self { sink }
    }

    /// Bus that discards every event
    #[must_use]
    pub fn null() -> Self {
        Self::new(Arc::new(NullSink))
    }

    /// Forward one event to the sink
    pub fn record(&self, event: Event) {
        self.sink.record(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::null()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus").finish_non_exhaustive()
    }
}

/// Sink that drops every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn record(&self, _event: Event) {}
}

/// Sink that accumulates events in memory, for tests and small runs
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<Event>>,
}

impl MemorySink {
    /// Create an empty sink
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy out everything recorded so far
    #[must_use]
    pub fn snapshot(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    /// Number of events recorded so far
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    /// Whether nothing has been recorded yet
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

impl EventSink for MemorySink {
    fn record(&self, event: Event) {
        self.events.lock().push(event);
    }
}

/// Sink that forwards events over a crossbeam channel.
///
/// Send failures (receiver dropped) are ignored; a consumer that has gone
/// away should not take the simulation down with it.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: Sender<Event>,
}

impl ChannelSink {
    /// Wrap an existing sender
    #[must_use]
    pub fn new(sender: Sender<Event>) -> Self {
        Self { sender }
    }

    /// Create a sink backed by a fresh unbounded channel
    #[must_use]
    pub fn unbounded() -> (Self, Receiver<Event>) {
        let (sender, receiver) = crossbeam_channel::unbounded();
        (Self::new(sender), receiver)
    }
}

impl EventSink for ChannelSink {
    fn record(&self, event: Event) {
        self.sender.send(event).ok();
    }
}

// ============================================================================
// Tests
// ============================================================================
