use clap::Parser;
use log::{info, warn, LevelFilter};
use std::str::FromStr;
use std::time::Instant;

use wavesim_common::read_run_parameters;
use wavesim_simulator::{simulation::Simulation, Outcome};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// path to the run parameters (`.toml`, or `Key: value` text)
    #[arg(short, long)]
    parameters: String,

    /// log level (off, error, warn, info, debug, trace)
    #[arg(short, long)]
    verbosity: Option<String>,

    /// show a progress bar
    #[arg(long)]
    progress: bool,

    /// only parse and print the parameters
    #[arg(long)]
    test: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    env_logger::builder()
        .format_timestamp_secs()
        .filter_level(LevelFilter::from_str(
            args.verbosity.as_deref().unwrap_or("info"),
        )?)
        .init();

    // Start timer
    let now = Instant::now();

    let parameters = read_run_parameters(&args.parameters)?;
    info!("Simulation Parameters\n{parameters}");
    if args.test {
        return Ok(());
    }

    let simulation = Simulation::new_from_params(parameters)?;
    if let Some(path) = simulation.save_parameters()? {
        info!("Parameters saved to {}", path.display());
    }
    let watchers = simulation.watchers(args.progress)?;
    let name = simulation.parameters.sim_name.clone();

    // Main evolve loop runs in the background; this thread only waits
    let handle = simulation.start(watchers);
    match handle.join() {
        Outcome::Succeeded => {
            info!(
                "Finished {name} in {} seconds",
                now.elapsed().as_secs()
            );
            Ok(())
        }
        Outcome::Cancelled => {
            warn!("{name} was cancelled");
            Ok(())
        }
        Outcome::Faulted(e) => Err(e.into()),
    }
}
