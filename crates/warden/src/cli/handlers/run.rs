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
        cycles = config.cycles,
        "starting ring run"
    );

    let mut sim = RingSimulation::new(config)?;
    let printer = if stream_events {
        let (bus, printer) = super::spawn_event_printer();
        sim = sim.with_bus(bus);
        Some(printer)
    } else {
        None
    };

    let result = sim.run_to_completion();

    // The simulation owns the last bus clone. Dropping it closes the event
    // channel, which ends the printer thread. The join lands before the
    // error check so the stream flushes for a failed run too.
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
    Ok(())
}
