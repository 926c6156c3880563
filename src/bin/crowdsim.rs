//! # crowdsim
//!
//! Runs a crowd scenario file for a fixed number of ticks and prints the
//! initialization and computation times followed by the run report.
//!
//! ```text
//! crowdsim -f crowd.txt -i 500 -n 8 --positions frames.jsonl
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use tracing::info;

use crowdsim_core::{setup_logging, JsonLinesSink, Scenario, SimConfig, Simulation};

/// Concurrent quadtree crowd simulation
#[derive(Parser)]
#[command(name = "crowdsim")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Scenario file: `dim_x dim_y count` then `x y direction` per agent
    #[arg(short = 'f', long = "file", value_name = "FILE")]
    file: PathBuf,

    /// Number of ticks to simulate
    #[arg(short = 'i', long = "iterations")]
    iterations: Option<u64>,

    /// Worker threads
    #[arg(short = 'n', long = "threads")]
    threads: Option<usize>,

    /// Seed for corner and edge decisions
    #[arg(long)]
    seed: Option<u64>,

    /// JSON configuration file; flags above override its values
    #[arg(long, value_name = "FILE", env = "CROWDSIM_CONFIG")]
    config: Option<PathBuf>,

    /// Write per-tick positions as JSON lines
    #[arg(long, value_name = "FILE")]
    positions: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "CROWDSIM_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(Some(cli.log_level.clone()));

    let mut config = match &cli.config {
        Some(path) => SimConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => SimConfig::default(),
    };
    if let Some(ticks) = cli.iterations {
        config.ticks = ticks;
    }
    if let Some(threads) = cli.threads {
        config.threads = threads;
    }
    if let Some(seed) = cli.seed {
        config.seed = seed;
    }

    let scenario = Scenario::load(&cli.file)
        .with_context(|| format!("Failed to load scenario {}", cli.file.display()))?;
    let mut sim = Simulation::new(config, &scenario).context("Failed to initialize simulation")?;
    println!("Initialization time (sec): {:.6}", sim.init_time().as_secs_f64());

    let report = match &cli.positions {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create {}", path.display()))?;
            let mut sink = JsonLinesSink::new(BufWriter::new(file));
            let report = sim.run_with_sink(&mut sink)?;
            info!("Wrote {} position frames to {}", sink.frames(), path.display());
            report
        }
        None => sim.run()?,
    };
    println!("Computation time (sec): {:.6}", report.compute_time);
    println!("{}", report.to_json()?);
    Ok(())
}
