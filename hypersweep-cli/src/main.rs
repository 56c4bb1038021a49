//! hypersweep CLI — runs hyperparameter sweeps against an external trainer.

mod commands;
mod report;

use anyhow::Context;
use clap::Parser;
use std::path::{Path, PathBuf};
use tracing_appender::rolling::{Builder, RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// hypersweep: resumable hyperparameter sweeps for external trainers
#[derive(Parser, Debug)]
#[command(name = "hypersweep", version, about, long_about = None)]
pub(crate) struct Cli {
    /// Orchestrator settings file (defaults to ./hypersweep.toml when present)
    #[arg(short, long, global = true)]
    settings: Option<PathBuf>,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
pub(crate) enum Commands {
    /// Expand a sweep document and execute every run
    Run {
        /// Sweep document (YAML or JSON)
        sweep: PathBuf,
        /// Output root; one directory per run is created beneath it
        #[arg(short, long)]
        output: PathBuf,
        /// Number of runs to execute concurrently
        #[arg(short = 'j', long)]
        concurrency: Option<usize>,
        /// Skip runs that already succeeded in the output root
        #[arg(long)]
        resume: bool,
        /// Per-run timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,
        /// Retries for timed-out or resource-starved runs
        #[arg(long)]
        retries: Option<u32>,
    },
    /// Print the run configurations a sweep document expands to
    Expand {
        /// Sweep document (YAML or JSON)
        sweep: PathBuf,
        /// Print each run as a JSON line instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Show the results recorded in an output root
    Summary {
        /// Output root of a previous sweep
        output: PathBuf,
    },
    /// Manage orchestrator settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Subcommand, Debug)]
pub(crate) enum ConfigAction {
    /// Write a default settings file
    Init {
        /// Destination (defaults to ./hypersweep.toml)
        #[arg(long)]
        path: Option<PathBuf>,
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Print the effective layered settings
    Show,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    // Human-readable layer for stderr (always active)
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(EnvFilter::new(filter));

    // JSON file layer for structured logging, only when a sweep writes an output root
    let mut _guard = None;
    let json_layer = match &cli.command {
        Commands::Run { output, .. } => {
            let file_appender = open_log_appender(output)?;
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            _guard = Some(guard);
            Some(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(non_blocking)
                    .with_filter(EnvFilter::new("debug")),
            )
        }
        _ => None,
    };

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    commands::handle_command(cli.command, cli.settings.as_deref()).await
}

/// Daily-rolling JSON log file under `<output>/logs`.
fn open_log_appender(output: &Path) -> anyhow::Result<RollingFileAppender> {
    let log_dir = output.join("logs");
    std::fs::create_dir_all(&log_dir)
        .with_context(|| format!("Cannot create log directory {}", log_dir.display()))?;
    Builder::new()
        .rotation(Rotation::DAILY)
        .filename_prefix("hypersweep.log")
        .build(&log_dir)
        .with_context(|| format!("Cannot open log file in {}", log_dir.display()))
}
