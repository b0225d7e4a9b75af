//! Error types for warden-core
//!
//! The taxonomy separates contention outcomes (retryable, expected under
//! load) from programming errors (loud, never retried) and harness
//! diagnostics.

use std::time::Duration;

use thiserror::Error;

use crate::agent::AgentId;
use crate::resource::ResourceId;

/// Core error type for warden operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// A try-once acquisition found a resource busy. `index` is the position
    /// of the blocking resource in the caller-supplied request order.
    #[error("would block on {resource} (request index {index})")]
    WouldBlock {
        /// The resource that was busy
        resource: ResourceId,
        /// Position of that resource in the caller-supplied order
        index: usize,
    },

    /// A timed acquisition ran out of budget before every resource was held
    #[error("acquisition timed out after {waited:?}")]
    Timeout {
        /// How long the acquisition tried before giving up
        waited: Duration,
    },

    /// Release of a resource the agent does not hold (or holds in another
    /// mode). Programming error: reported loudly, never retried.
    #[error("{agent} released {resource} without holding it")]
    InvalidRelease {
        /// The resource the release named
        resource: ResourceId,
        /// The agent that attempted the release
        agent: AgentId,
    },

    /// An agent requested a resource it already holds. Surfaced as an error
    /// instead of letting the agent deadlock against itself.
    #[error("{agent} already holds {resource}")]
    AlreadyHeld {
        /// The resource requested twice
        resource: ResourceId,
        /// The agent holding it
        agent: AgentId,
    },

    /// Payload write through a shared (read-only) handle
    #[error("{agent} attempted a payload write on {resource} through a shared handle")]
    ReadOnlyHandle {
        /// The resource whose payload was targeted
        resource: ResourceId,
        /// The agent holding the shared handle
        agent: AgentId,
    },

    /// Malformed acquisition request or simulation configuration
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Liveness verdict: agents stayed active for the whole check window
    /// without a single completed acquisition
    #[error("livelock observed: no progress within {window:?}")]
    LivelockObserved {
        /// The observation window that elapsed without progress
        window: Duration,
    },

    /// Simulation harness failure (thread spawn or join)
    #[error("harness error: {0}")]
    Harness(String),
}

impl Error {
    /// Convenience constructor for malformed requests and configs
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    /// Convenience constructor for harness failures
    pub fn harness(msg: impl Into<String>) -> Self {
        Self::Harness(msg.into())
    }

    /// Stable machine-readable code for this error
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::WouldBlock { .. } => "WOULD_BLOCK",
            Self::Timeout { .. } => "TIMEOUT",
            Self::InvalidRelease { .. } => "INVALID_RELEASE",
            Self::AlreadyHeld { .. } => "ALREADY_HELD",
            Self::ReadOnlyHandle { .. } => "READ_ONLY_HANDLE",
            Self::InvalidRequest(_) => "INVALID_REQUEST",
            Self::LivelockObserved { .. } => "LIVELOCK_OBSERVED",
            Self::Harness(_) => "HARNESS",
        }
    }

    /// Whether retrying the same operation can succeed.
    ///
    /// Contention outcomes are retryable; programming errors and harness
    /// failures are not.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::WouldBlock { .. } | Self::Timeout { .. })
    }
}

/// Result type alias for warden-core operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_stable() {
        let err = Error::WouldBlock {
            resource: ResourceId::new(3),
            index: 1,
        };
        assert_eq!(err.code(), "WOULD_BLOCK");

        let err = Error::Timeout {
            waited: Duration::from_millis(250),
        };
        assert_eq!(err.code(), "TIMEOUT");

        let err = Error::invalid_request("empty request");
        assert_eq!(err.code(), "INVALID_REQUEST");
    }

    #[test]
    fn test_contention_errors_are_retryable() {
        assert!(Error::WouldBlock {
            resource: ResourceId::new(0),
            index: 0,
        }
        .is_retryable());
        assert!(Error::Timeout {
            waited: Duration::from_millis(1),
        }
        .is_retryable());
    }

    #[test]
    fn test_programming_errors_are_not_retryable() {
        let invalid = Error::InvalidRelease {
            resource: ResourceId::new(1),
            agent: AgentId::new(0),
        };
        assert!(!invalid.is_retryable());
        assert!(!Error::invalid_request("duplicate resource").is_retryable());
        assert!(!Error::harness("spawn failed").is_retryable());
    }

    #[test]
    fn test_display_names_the_actors() {
        let err = Error::InvalidRelease {
            resource: ResourceId::new(2),
            agent: AgentId::new(7),
        };
        assert_eq!(err.to_string(), "A7 released R2 without holding it");

        let err = Error::AlreadyHeld {
            resource: ResourceId::new(0),
            agent: AgentId::new(1),
        };
        assert_eq!(err.to_string(), "A1 already holds R0");
    }
}
