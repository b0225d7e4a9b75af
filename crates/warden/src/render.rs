//! Report rendering for the `warden` CLI.

use std::fmt::Write;

use anyhow::Result;
use warden_core::SimulationReport;

/// Format a simulation report as a human-readable table.
#[must_use]
pub fn render_text(report: &SimulationReport) -> String {
    let mut output = String::new();
    writeln!(
        output,
        "Ring of {} agents finished in {:.3?}",
        report.cycles_completed.len(),
        report.elapsed
    )
    .ok();
    output.push('\n');
    output.push_str("  agent   cycles   failed\n");
    for (id, cycles) in &report.cycles_completed {
        let name = id.to_string();
        let failed = report.failed_attempts.get(id).copied().unwrap_or(0);
        let flag = if report.starved_agents.contains(id) {
            "   starved"
        } else {
            ""
        };
        writeln!(output, "  {name:<7} {cycles:>6} {failed:>8}{flag}").ok();
    }
    output.push('\n');
    writeln!(
        output,
        "Totals: {} cycles completed, {} failed attempts",
        report.total_cycles(),
        report.total_failed_attempts()
    )
    .ok();
    if report.deadlock_detected {
        output.push_str("Verdict: deadlock detected, no attempt concluded\n");
    } else if report.livelock_observed {
        output.push_str("Verdict: livelock observed, attempts ran but none succeeded\n");
    } else {
        output.push_str("Verdict: the ring made progress\n");
    }
    output
}

/// Format a simulation report as pretty-printed JSON.
pub fn render_json(report: &SimulationReport) -> Result<String> {
    serde_json::to_string_pretty(report).map_err(anyhow::Error::from)
}
