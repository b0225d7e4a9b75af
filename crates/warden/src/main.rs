use anyhow::Result;
use warden::cli::build_cli;

fn main() -> Result<()> {
    warden::logging::init_tracing()?;
    let matches = build_cli().get_matches();
    warden::cli::handlers::dispatch(&matches)
}
