pub mod check;
pub mod run;

use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::thread;

use anyhow::Result;
use clap::ArgMatches;
use warden_core::events::serialize_event;
use warden_core::{load_config, ChannelSink, EventBus, RingConfig, SimConfig};

pub fn dispatch(matches: &ArgMatches) -> Result<()> {
    match matches.subcommand() {
        Some(("run", sub_m)) => run::handle(sub_m),
        Some(("check", sub_m)) => check::handle(sub_m),
        _ => anyhow::bail!("Unknown command. Run 'warden --help' for usage."),
    }
}

/// Resolve the ring config for a subcommand: built-in defaults, then the
/// `--config` file if given, then explicit flags on top.
pub(crate) fn ring_config_from(matches: &ArgMatches) -> Result<RingConfig> {
    let mut config = RingConfig::default();

    if let Some(path) = matches.get_one::<String>("config") {
        let document = load_config(Path::new(path))?;
        config = document.apply_to(config);
        tracing::debug!("layered config file {path}");
    }

    let flags = SimConfig {
        agents: parse_flag(matches, "agents")?,
        strategy: parse_flag(matches, "strategy")?,
        mode: parse_flag(matches, "mode")?,
        policy: parse_flag(matches, "policy")?,
        cycles: parse_flag(matches, "cycles")?,
        work_ms: parse_flag(matches, "work-ms")?,
        think_ms: parse_flag(matches, "think-ms")?,
        stagger_ms: parse_flag(matches, "stagger-ms")?,
        backoff_ms: parse_flag(matches, "backoff-ms")?,
        grip_ms: parse_flag(matches, "grip-ms")?,
        starvation_threshold: parse_flag(matches, "starvation-threshold")?,
        attempt_ms: parse_flag(matches, "attempt-ms")?,
        window_ms: parse_flag(matches, "window-ms")?,
    };
    Ok(flags.apply_to(config))
}

fn parse_flag<T>(matches: &ArgMatches, name: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    matches
        .get_one::<String>(name)
        .map(|raw| {
            raw.parse::<T>()
                .map_err(|err| anyhow::anyhow!("invalid --{name} value '{raw}': {err}"))
        })
        .transpose()
}

/// Wire a channel sink to a printer thread that writes one JSON line per
/// event to stderr. The thread ends when the last clone of the returned
/// bus is dropped.
pub(crate) fn spawn_event_printer() -> (EventBus, thread::JoinHandle<()>) {
    let (sink, receiver) = ChannelSink::unbounded();
    let bus = EventBus::new(Arc::new(sink));
    let printer = thread::spawn(move || {
        for event in receiver {
            if let Ok(line) = serialize_event(&event) {
                let _ = writeln!(std::io::stderr(), "{line}");
            }
        }
    });
    (bus, printer)
}
