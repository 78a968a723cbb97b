//! phaseloop - CLI

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use owo_colors::OwoColorize;
use std::path::PathBuf;

use phaseloop::demo::run_demo;
use phaseloop::util::config::{load_effective_config, LoopConfig};
use phaseloop::util::logger::{self, LogLevel};
use phaseloop::{NAME, VERSION};

/// Phase-ordered event loop with a bounded worker pool
#[derive(Parser, Debug)]
#[command(name = "phaseloop")]
#[command(version = VERSION)]
#[command(about = NAME, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,

    /// Config file (defaults to ./phaseloop.toml when present)
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level: trace, debug, info, warn, error
    #[arg(long, global = true, default_value = "warn")]
    log_level: LogLevel,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the built-in demo workload and print the execution order
    Demo {
        /// Number of worker payloads to submit
        #[arg(short, long, default_value_t = 5)]
        jobs: usize,

        /// Override the worker pool size
        #[arg(short, long)]
        workers: Option<usize>,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the effective configuration as TOML
    Config,

    /// Print version information
    Version,
}

fn effective_config(args: &Args) -> Result<LoopConfig> {
    load_effective_config(args.config.as_deref()).context("Failed to load configuration")
}

fn main() -> Result<()> {
    let args = Args::parse();
    let level = if args.verbose { LogLevel::Debug } else { args.log_level };
    logger::init_with_level(level);

    if args.verbose {
        eprintln!("{} version: {}", NAME, VERSION);
        eprintln!("Host: {}", std::env::consts::OS);
    }

    match &args.command {
        Commands::Demo {
            jobs,
            workers,
            json,
        } => {
            let mut config = effective_config(&args)?;
            if let Some(workers) = workers {
                config.worker_pool_size = *workers;
            }
            config.validate().context("Invalid worker count")?;

            let report = run_demo(config, *jobs).context("Demo run failed")?;

            if *json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                for entry in &report.trace {
                    let phase = entry.phase.as_deref().unwrap_or("-");
                    println!(
                        "tick {:>3}  {:<7}  {}",
                        entry.tick,
                        phase.cyan(),
                        entry.label
                    );
                }
                println!();
                println!(
                    "{} ticks, {} jobs completed, peak busy workers {}",
                    report.stats.ticks.bold(),
                    report.stats.jobs_completed.bold(),
                    report.stats.peak_busy_workers.bold()
                );
            }
        }
        Commands::Config => {
            let config = effective_config(&args)?;
            print!("{}", toml::to_string_pretty(&config)?);
        }
        Commands::Version => {
            println!("{} {}", NAME, VERSION);
        }
    }

    Ok(())
}
