pub mod handlers;

use clap::{Arg, ArgAction, Command};

pub fn build_cli() -> Command {
    Command::new("warden")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Ring simulation driver for deadlock-free lock arbitration")
        .subcommand_required(true)
        .subcommand(cmd_run())
        .subcommand(cmd_check())
}

fn cmd_run() -> Command {
    sim_args(
        Command::new("run")
            .about("Run every agent to its cycle budget and print the report"),
    )
}

fn cmd_check() -> Command {
    sim_args(
        Command::new("check")
            .about("Run the ring against a time window and classify liveness")
            .after_help(
                "Exits nonzero when the window ends with no agent ever \
                 completing an acquisition (livelock or deadlock).",
            ),
    )
}

/// Flags shared by both subcommands. Values given here override the
/// config file, which overrides the built-in defaults.
fn sim_args(cmd: Command) -> Command {
    cmd.arg(
        Arg::new("agents")
            .long("agents")
            .value_name("N")
            .help("Number of agents (and resources) in the ring, min 2"),
    )
    .arg(
        Arg::new("strategy")
            .long("strategy")
            .value_name("NAME")
            .help("Acquisition strategy: ordered (deadlock-free) or unordered (diagnostic)"),
    )
    .arg(
        Arg::new("mode")
            .long("mode")
            .value_name("MODE")
            .help("Lock mode agents request: exclusive or shared"),
    )
    .arg(
        Arg::new("policy")
            .long("policy")
            .value_name("NAME")
            .help("Acquisition policy: blocking, try-once, or timed-retry"),
    )
    .arg(
        Arg::new("cycles")
            .long("cycles")
            .value_name("N")
            .help("Cycle budget per agent (run mode)"),
    )
    .arg(
        Arg::new("work-ms")
            .long("work-ms")
            .value_name("MS")
            .help("How long an agent holds its resources each cycle"),
    )
    .arg(
        Arg::new("think-ms")
            .long("think-ms")
            .value_name("MS")
            .help("How long an agent idles between cycles"),
    )
    .arg(
        Arg::new("stagger-ms")
            .long("stagger-ms")
            .value_name("MS")
            .help("Start offset between consecutive agents"),
    )
    .arg(
        Arg::new("backoff-ms")
            .long("backoff-ms")
            .value_name("MS")
            .help("Fixed retry backoff for the unordered strategy"),
    )
    .arg(
        Arg::new("grip-ms")
            .long("grip-ms")
            .value_name("MS")
            .help("Pause between first and remaining acquisitions (unordered strategy)"),
    )
    .arg(
        Arg::new("attempt-ms")
            .long("attempt-ms")
            .value_name("MS")
            .help("Per-attempt budget for timed-retry and the liveness check"),
    )
    .arg(
        Arg::new("window-ms")
            .long("window-ms")
            .value_name("MS")
            .help("Observation window for the liveness check"),
    )
    .arg(
        Arg::new("starvation-threshold")
            .long("starvation-threshold")
            .value_name("N")
            .help("Consecutive failed cycles before an agent stops starved"),
    )
    .arg(
        Arg::new("config")
            .long("config")
            .value_name("FILE")
            .help("TOML config file layered under the flags"),
    )
    .arg(
        Arg::new("events")
            .long("events")
            .action(ArgAction::SetTrue)
            .help("Stream telemetry events as JSON lines on stderr"),
    )
    .arg(
        Arg::new("json")
            .long("json")
            .action(ArgAction::SetTrue)
            .help("Print the report as JSON"),
    )
}
