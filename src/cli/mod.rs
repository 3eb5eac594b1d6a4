//! CLI argument parsing and command dispatch

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use loadsync_core::{aggregate_task_stats, ClusterBuilder, SimulationConfig, SyncMode};

#[derive(Parser)]
#[command(name = "loadsync")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a barrier simulation
    Run {
        /// Path to a JSON configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Number of simulated worker processes
        #[arg(short, long)]
        processes: Option<usize>,

        /// Script tasks per process
        #[arg(short, long)]
        threads: Option<usize>,

        /// Rounds each task runs
        #[arg(short, long)]
        rounds: Option<usize>,

        /// Bound on each barrier wait, in milliseconds
        #[arg(long)]
        wait_timeout_ms: Option<u64>,

        /// Share one local registry instead of running a console
        #[arg(long)]
        local: bool,
    },
    /// Validate a configuration file
    Validate {
        /// Path to a JSON configuration file
        #[arg(short, long)]
        config: PathBuf,
    },
}

impl Cli {
    /// Dispatch the parsed command
    pub async fn run(self) -> Result<()> {
        match self.command {
            Commands::Run {
                config,
                processes,
                threads,
                rounds,
                wait_timeout_ms,
                local,
            } => {
                let mut config = match config {
                    Some(path) => load_config(&path)?,
                    None => SimulationConfig::default(),
                };

                if let Some(processes) = processes {
                    config.processes = processes;
                }
                if let Some(threads) = threads {
                    config.threads_per_process = threads;
                }
                if let Some(rounds) = rounds {
                    config.rounds = rounds;
                }
                if let Some(ms) = wait_timeout_ms {
                    config = config.with_wait_timeout(Duration::from_millis(ms));
                }
                if local {
                    config = config.with_mode(SyncMode::Local);
                }

                run_simulation(config).await
            }
            Commands::Validate { config } => {
                let config = load_config(&config)?;
                config.validate()?;
                tracing::info!(
                    processes = config.processes,
                    threads_per_process = config.threads_per_process,
                    rounds = config.rounds,
                    mode = ?config.mode,
                    "Configuration is valid"
                );
                Ok(())
            }
        }
    }
}

async fn run_simulation(config: SimulationConfig) -> Result<()> {
    let cluster = ClusterBuilder::new().config(config).build()?;

    let stats = cluster
        .run_with_signal_handling()
        .await
        .context("simulation failed")?;

    let aggregated = aggregate_task_stats(&stats);
    tracing::info!(
        tasks = aggregated.total_tasks,
        rounds = aggregated.total_rounds,
        waits = aggregated.total_waits,
        mean_wait_us = aggregated.mean_wait.as_micros() as u64,
        max_wait_us = aggregated.max_wait.as_micros() as u64,
        rounds_per_second = aggregated.rounds_per_second,
        "Run finished"
    );

    Ok(())
}

fn load_config(path: &Path) -> Result<SimulationConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("failed to parse config {}", path.display()))
}
