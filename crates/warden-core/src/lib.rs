//! Warden-core - Deadlock-free coordination of named resources
//!
//! This crate provides:
//! - Resources with exclusive/shared lock state and an opaque payload
//! - Move-only RAII lock handles and all-or-nothing grants
//! - An arbitrator with ordered (deadlock-free) and unordered
//!   (livelock-prone, diagnostic) acquisition strategies
//! - Agents with an Idle/Requesting/Holding/Releasing lifecycle and
//!   starvation detection
//! - A ring simulation harness with run-to-completion and liveness-check
//!   drive modes
//! - Telemetry events, pluggable sinks, and TOML configuration

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod agent;
pub mod arbitrator;
pub mod config;
pub mod error;
pub mod events;
pub mod grant;
pub mod resource;
pub mod ring;

pub use agent::{Agent, AgentId, AgentReport, AgentSpec, AgentState, CycleOutcome};
pub use arbitrator::{AcquirePolicy, AcquireRequest, AcquireStrategy, Arbitrator};
pub use config::{load_config, parse_config, PolicyName, SimConfig, StrategyName};
pub use error::{Error, Result};
pub use events::{ChannelSink, Event, EventBus, EventSink, MemorySink, NullSink};
pub use grant::{Grant, LockHandle, LockMode};
pub use resource::{Arena, LockState, Resource, ResourceId};
pub use ring::{RingConfig, RingSimulation, SimulationReport};
