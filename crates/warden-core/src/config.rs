//! Simulation configuration loaded from TOML
//!
//! The schema is flat, every key optional, durations as millisecond
//! integers. [`SimConfig::apply_to`] folds a document over a
//! [`RingConfig`], touching only the keys the document actually set, so a
//! driver can layer defaults, a config file, and its own flags in that
//! order.
//!
//! ```toml
//! agents = 5
//! strategy = "unordered"
//! policy = "blocking"
//! cycles = 3
//! work_ms = 10
//! backoff_ms = 50
//! grip_ms = 200
//! stagger_ms = 125
//! ```

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::arbitrator::{AcquirePolicy, AcquireStrategy};
use crate::error::{Error, Result};
use crate::grant::LockMode;
use crate::ring::RingConfig;

/// Backoff used when a document turns on the unordered strategy without
/// tuning it
const DEFAULT_BACKOFF: Duration = Duration::from_millis(50);

/// Strategy selector as it appears in documents and on the command line.
/// The `_ms` knobs fill in the unordered shape.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum StrategyName {
    Ordered,
    Unordered,
}

impl StrategyName {
    const fn of(strategy: AcquireStrategy) -> Self {
        match strategy {
            AcquireStrategy::Ordered => Self::Ordered,
            AcquireStrategy::Unordered { .. } => Self::Unordered,
        }
    }
}

/// Policy selector as it appears in documents and on the command line.
/// A timed retry borrows its budget from `attempt_ms`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "lowercase")]
pub enum PolicyName {
    Blocking,

    #[strum(to_string = "try-once")]
    #[serde(alias = "try_once")]
    TryOnce,

    #[strum(to_string = "timed-retry")]
    #[serde(alias = "timed_retry")]
    TimedRetry,
}

impl PolicyName {
    const fn of(policy: AcquirePolicy) -> Self {
        match policy {
            AcquirePolicy::Blocking => Self::Blocking,
            AcquirePolicy::TryOnce => Self::TryOnce,
            AcquirePolicy::TimedRetry(_) => Self::TimedRetry,
        }
    }

    const fn to_policy(self, attempt: Duration) -> AcquirePolicy {
        match self {
            Self::Blocking => AcquirePolicy::Blocking,
            Self::TryOnce => AcquirePolicy::TryOnce,
            Self::TimedRetry => AcquirePolicy::TimedRetry(attempt),
        }
    }
}

/// One parsed document: only the keys the author wrote are `Some`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SimConfig {
    #[serde(default)]
    pub agents: Option<usize>,
    #[serde(default)]
    pub strategy: Option<StrategyName>,
    #[serde(default)]
    pub mode: Option<LockMode>,
    #[serde(default)]
    pub policy: Option<PolicyName>,
    #[serde(default)]
    pub cycles: Option<u64>,
    #[serde(default)]
    pub work_ms: Option<u64>,
    #[serde(default)]
    pub think_ms: Option<u64>,
    #[serde(default)]
    pub stagger_ms: Option<u64>,
    #[serde(default)]
    pub backoff_ms: Option<u64>,
    #[serde(default)]
    pub grip_ms: Option<u64>,
    #[serde(default)]
    pub starvation_threshold: Option<u32>,
    #[serde(default)]
    pub attempt_ms: Option<u64>,
    #[serde(default)]
    pub window_ms: Option<u64>,
}

impl SimConfig {
    /// Fold this document over `config`, overriding only the keys it set.
    ///
    /// Strategy and policy are rebuilt from the resolved knobs at the end,
    /// so a document that only retunes `backoff_ms` updates an unordered
    /// strategy in place, and a timed-retry policy always carries the
    /// current attempt budget.
    #[must_use]
    pub fn apply_to(&self, mut config: RingConfig) -> RingConfig {
        if let Some(agents) = self.agents {
            config.agents = agents;
        }
        if let Some(mode) = self.mode {
            config.mode = mode;
        }
        if let Some(cycles) = self.cycles {
            config.cycles = cycles;
        }
        if let Some(ms) = self.work_ms {
            config.work = Duration::from_millis(ms);
        }
        if let Some(ms) = self.think_ms {
            config.think = Duration::from_millis(ms);
        }
        if let Some(ms) = self.stagger_ms {
            config.stagger = Duration::from_millis(ms);
        }
        if let Some(threshold) = self.starvation_threshold {
            config.starvation_threshold = threshold;
        }
        if let Some(ms) = self.attempt_ms {
            config.attempt_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = self.window_ms {
            config.check_window = Duration::from_millis(ms);
        }

        let (current_backoff, current_grip) = match config.strategy {
            AcquireStrategy::Unordered { backoff, grip } => (backoff, grip),
            AcquireStrategy::Ordered => (DEFAULT_BACKOFF, Duration::ZERO),
        };
        let backoff = self.backoff_ms.map_or(current_backoff, Duration::from_millis);
        let grip = self.grip_ms.map_or(current_grip, Duration::from_millis);
        let strategy = self
            .strategy
            .unwrap_or_else(|| StrategyName::of(config.strategy));
        config.strategy = match strategy {
            StrategyName::Ordered => AcquireStrategy::Ordered,
            StrategyName::Unordered => AcquireStrategy::unordered_with_grip(backoff, grip),
        };

        let policy = self.policy.unwrap_or_else(|| PolicyName::of(config.policy));
        config.policy = policy.to_policy(config.attempt_timeout);

        config
    }
}

/// Parse a TOML document. Unknown keys are rejected so typos fail loudly.
pub fn parse_config(text: &str) -> Result<SimConfig> {
    toml::from_str(text)
        .map_err(|err| Error::invalid_request(format!("malformed config: {err}")))
}

/// Read and parse a TOML config file
pub fn load_config(path: &Path) -> Result<SimConfig> {
    let text = fs::read_to_string(path).map_err(|err| {
        Error::invalid_request(format!(
            "failed to read config {}: {err}",
            path.display()
        ))
    })?;
    parse_config(&text)
}
