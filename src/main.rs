mod config;
mod engine;
mod manager;
mod observe;
mod rate;
mod report;
mod stats;

use crate::config::{Config, ModelConfig, OutputConfig, parse_rate_samples};
use crate::manager::Manager;
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::{
    fs::File,
    io::{self, BufWriter, Write},
    path::{Path, PathBuf},
};

#[derive(Debug, Parser)]
#[command(version, about)]
struct CLI {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Simulate a single trajectory.
    Simulate {
        /// Starting cell count.
        #[arg(short = 'n', long)]
        n0: u64,

        /// Birth rate samples, e.g. "[0.5, 1.0, 0.8]".
        #[arg(short = 'b', long, allow_hyphen_values = true)]
        birth_rate: String,

        /// Death rate.
        #[arg(short = 'd', long, allow_negative_numbers = true)]
        death_rate: f64,

        /// Interaction birth rate.
        #[arg(short = 'p', long, allow_negative_numbers = true)]
        interaction_birth_rate: f64,

        /// Interaction death rate.
        #[arg(short = 'q', long, allow_negative_numbers = true)]
        interaction_death_rate: f64,

        /// Simulation time.
        #[arg(short = 't', long, allow_negative_numbers = true)]
        t_max: f64,

        /// Time between reported rows.
        #[arg(long, default_value_t = 0.1)]
        print_interval: f64,

        #[command(flatten)]
        run: RunArgs,
    },

    /// Simulate many trajectories of a TOML configuration and report their end states.
    Ensemble {
        #[arg(long)]
        config: PathBuf,

        /// Number of runs.
        #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
        runs: u64,

        #[command(flatten)]
        run: RunArgs,
    },
}

#[derive(Debug, Args)]
struct RunArgs {
    /// Base random seed (drawn from the OS if absent).
    #[arg(long)]
    seed: Option<u64>,

    /// Output file (standard output if absent).
    #[arg(long)]
    output: Option<PathBuf>,
}

fn main() {
    env_logger::Builder::new()
        .format_timestamp_millis()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    if let Err(error) = run_cli() {
        log::error!("{error:#?}");
        std::process::exit(1);
    }
}

fn run_cli() -> Result<()> {
    let args = CLI::parse();
    log::info!("{args:#?}");

    match args.command {
        Command::Simulate {
            n0,
            birth_rate,
            death_rate,
            interaction_birth_rate,
            interaction_death_rate,
            t_max,
            print_interval,
            run,
        } => {
            let birth_rates =
                parse_rate_samples(&birth_rate).context("failed to parse birth rate samples")?;
            let model = ModelConfig {
                n_init: n0,
                birth_rates,
                death_rate,
                birth_interaction: interaction_birth_rate,
                death_interaction: interaction_death_rate,
                t_max,
            };
            let cfg = Config::new(model, OutputConfig { print_interval })
                .context("failed to construct cfg")?;
            log::info!("{cfg:#?}");

            let mgr = Manager::new(cfg, run.seed).context("failed to construct mgr")?;
            let writer = open_output(run.output.as_deref())?;
            mgr.run_trajectory(writer)?;
        }
        Command::Ensemble { config, runs, run } => {
            let cfg = Config::from_file(&config).context("failed to construct cfg")?;
            log::info!("{cfg:#?}");

            let mgr = Manager::new(cfg, run.seed).context("failed to construct mgr")?;
            let writer = open_output(run.output.as_deref())?;
            mgr.run_ensemble(runs, writer)?;
        }
    }

    Ok(())
}

fn open_output(file: Option<&Path>) -> Result<Box<dyn Write>> {
    let writer: Box<dyn Write> = match file {
        Some(file) => {
            let file = File::create(file).with_context(|| format!("failed to create {file:?}"))?;
            Box::new(BufWriter::new(file))
        }
        None => Box::new(BufWriter::new(io::stdout().lock())),
    };
    Ok(writer)
}
