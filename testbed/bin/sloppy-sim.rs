//! Command line driver: load a topology, run the simulation for a number of
//! iterations, print mismatch lines on stdout and store GML artifacts.

use anyhow::{Context, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};
use sloppy_sim::RandomWalkMode;
use sloppy_testbed::{Runner, StorePolicy, TestbedConfig};
use std::io::{self, Write};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn cli() -> Command {
    Command::new("sloppy-sim")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Simulate sloppy-group construction and record gossip over a social trust graph")
        .arg(Arg::new("input")
            .short('i')
            .long("input")
            .value_name("FILE")
            .help("Node-link JSON topology"))
        .arg(Arg::new("config")
            .short('c')
            .long("config")
            .value_name("FILE")
            .help("TOML configuration; flags override its values"))
        .arg(Arg::new("output")
            .short('o')
            .long("output")
            .value_name("DIR")
            .help("Directory for GML artifacts"))
        .arg(Arg::new("seed")
            .short('s')
            .long("seed")
            .value_name("SEED")
            .value_parser(clap::value_parser!(u64))
            .help("Master random seed"))
        .arg(Arg::new("iterations")
            .short('n')
            .long("iterations")
            .value_name("N")
            .value_parser(clap::value_parser!(usize))
            .help("Number of simulation runs"))
        .arg(Arg::new("store")
            .long("store")
            .value_name("POLICY")
            .value_parser(["never", "always", "on-mismatch"])
            .help("When to write GML artifacts"))
        .arg(Arg::new("population-error")
            .long("population-error")
            .value_name("FRACTION")
            .value_parser(clap::value_parser!(f64))
            .help("Per-node population estimation error"))
        .arg(Arg::new("max-rounds")
            .long("max-rounds")
            .value_name("N")
            .value_parser(clap::value_parser!(usize))
            .help("Gossip round budget (default: node count + 1)"))
        .arg(Arg::new("random-walk")
            .long("random-walk")
            .value_name("MODE")
            .value_parser(["off", "explore", "wire"])
            .help("Random walk exploration mode"))
        .arg(Arg::new("verbose")
            .short('v')
            .long("verbose")
            .action(ArgAction::SetTrue)
            .help("Log per-node and per-round progress"))
}

/// File configuration first, then command line overrides
fn resolve_config(matches: &ArgMatches) -> Result<TestbedConfig> {
    let mut config = match matches.get_one::<String>("config") {
        Some(path) => TestbedConfig::from_file(path.as_ref())
            .with_context(|| format!("failed to read configuration {}", path))?,
        None => TestbedConfig::default(),
    };

    if let Some(input) = matches.get_one::<String>("input") {
        config.input = Some(PathBuf::from(input));
    }
    if let Some(output) = matches.get_one::<String>("output") {
        config.output_dir = PathBuf::from(output);
    }
    if let Some(&seed) = matches.get_one::<u64>("seed") {
        config.simulation.seed = seed;
    }
    if let Some(&iterations) = matches.get_one::<usize>("iterations") {
        config.iterations = iterations;
    }
    if let Some(store) = matches.get_one::<String>("store") {
        config.store = store.parse::<StorePolicy>()?;
    }
    if let Some(&error) = matches.get_one::<f64>("population-error") {
        config.simulation.population_error = error;
    }
    if let Some(&rounds) = matches.get_one::<usize>("max-rounds") {
        config.simulation.max_gossip_rounds = Some(rounds);
    }
    if let Some(mode) = matches.get_one::<String>("random-walk") {
        config.simulation.random_walk = mode.parse::<RandomWalkMode>()?;
    }

    config.validate()?;
    Ok(config)
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_level.into()))
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let matches = cli().get_matches();
    init_tracing(matches.get_flag("verbose"));

    let config = resolve_config(&matches)?;
    info!(
        "Running {} iterations (store {}, random walk {})",
        config.iterations, config.store, config.simulation.random_walk
    );

    let runner = Runner::new(config)?;
    let stdout = io::stdout();
    let mut out = stdout.lock();
    let summary = runner.run(&mut out)?;
    out.flush()?;

    info!(
        "{} of {} iterations had mismatches",
        summary.mismatched_iterations(),
        summary.iterations.len()
    );
    Ok(())
}
