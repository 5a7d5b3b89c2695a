use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Main CLI structure for the speedprobe application
/// Uses clap's derive macros for automatic CLI generation
#[derive(Parser)]
#[command(name = "sp")]
#[command(version)] // Automatically uses version from Cargo.toml
#[command(about = "Internet Speed Test CLI Tool - Measure download and upload speed with live instantaneous rates")]
#[command(long_about = "Speed Probe measures real download and upload throughput against configurable \
HTTP endpoints, reports instantaneous transfer rates while a run is in flight, looks up public \
network metadata, and keeps a short history of completed runs. Also ships an interactive \
terminal dashboard for running tests on demand.")]
pub struct Cli {
    /// Explicit settings file; otherwise built-in defaults, an optional
    /// speedprobe.toml in the working directory and SPEEDPROBE_* environment
    /// variables apply
    #[arg(short, long, global = true, help = "Path to a TOML settings file")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands for the speedprobe application
/// Each variant represents a different mode of operation
#[derive(Subcommand)]
pub enum Commands {
    /// Interactive terminal dashboard with live transfer progress
    /// Runs measurements on demand and renders instantaneous rates
    #[command(about = "Run speed tests from an interactive dashboard")]
    #[command(long_about = "Launches a terminal dashboard that runs measurements on demand, showing \
live transfer progress, an instantaneous-rate sparkline, quality ratings, network metadata \
and the recent run history.\n\n\
Examples:\n  \
sp live                               # Open the dashboard\n  \
sp live --config probe.toml           # Dashboard against custom endpoints\n\n\
Press 'r' to start a run, 'n' to fetch network info, 'q' or ESC to exit.")]
    Live,

    /// Full measurement run in the terminal: download phase, then upload phase
    /// Persists the result to the bounded history database unless told not to
    #[command(about = "Run a full speed test (download, then upload)")]
    #[command(long_about = "Measures download throughput by streaming a large file from the first \
reachable configured source, then upload throughput by streaming a generated payload to the \
configured sink. Instantaneous rates print while the transfer runs; the summary shows the \
run averages with quality ratings.\n\n\
Examples:\n  \
sp run                                # Measure and record the result\n  \
sp run --no-history                   # Measure without touching the database\n  \
SPEEDPROBE_UPLOAD_TOTAL_BYTES=1048576 sp run   # Smaller upload payload")]
    Run {
        /// Skip persisting the result to the history database
        #[arg(long, help = "Do not record this run in the history database")]
        no_history: bool,
    },

    /// Download measurement only, nothing persisted
    #[command(about = "Measure download speed only")]
    Download,

    /// Upload measurement only, nothing persisted
    #[command(about = "Measure upload speed only")]
    Upload,

    /// One-shot public network metadata lookup
    #[command(about = "Show public IP, provider and location")]
    Info,

    /// Recent completed runs from the history database, oldest first
    #[command(about = "Show recent speed test history")]
    History {
        /// Maximum number of runs to display
        #[arg(short, long, help = "Maximum number of runs to show")]
        limit: Option<usize>,
    },
}
