use anyhow::Result;
use clap::ArgMatches;
use warden_core::RingSimulation;

use crate::render;

pub fn handle(matches: &ArgMatches) -> Result<()> {
    let config = super::ring_config_from(matches)?;
    let as_json = matches.get_flag("json");
    let stream_events = matches.get_flag("events");

    tracing::info!(
        agents = config.agents,
        window = ?config.check_window,
        "starting liveness check"
    );

    let mut sim = RingSimulation::new(config)?;
    let printer = if stream_events {
        let (bus, printer) = super::spawn_event_printer();
        sim = sim.with_bus(bus);
        Some(printer)
    } else {
        None
    };

    let result = sim.liveness_check();

    // Drain and join the printer before reporting, whatever the outcome.
    drop(sim);
    if let Some(printer) = printer {
        let _ = printer.join();
    }
    let report = result?;

    if as_json {
        println!("{}", render::render_json(&report)?);
    } else {
        print!("{}", render::render_text(&report));
    }

    // Print the report either way, then let a stuck ring fail the command.
    report.ensure_progress()?;
    Ok(())
}
