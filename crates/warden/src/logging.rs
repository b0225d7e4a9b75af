//! Process-wide logging initialization
//!
//! The subscriber is installed exactly once per process behind a
//! `OnceLock`: the first call does the work, every later call is a no-op.

use std::sync::OnceLock;

use anyhow::Result;

static INIT: OnceLock<()> = OnceLock::new();

/// Install the tracing subscriber: env-filtered (INFO by default),
/// writing to stderr so reports on stdout stay clean.
pub fn init_tracing() -> Result<()> {
    let mut outcome = Ok(());
    INIT.get_or_init(|| {
        outcome = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::from_default_env()
                    .add_directive(tracing::Level::INFO.into()),
            )
            .with_writer(std::io::stderr)
            .try_init()
            .map_err(|err| anyhow::anyhow!("failed to initialize tracing subscriber: {err}"));
    });
    outcome
}
