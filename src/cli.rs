//! CLI argument parsing for codeprof

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Output format for reports printed to stdout
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable summary (default)
    Text,
    /// JSON run report
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "codeprof")]
#[command(version)]
#[command(about = "Profile test files and classify their code patterns", long_about = None)]
pub struct Cli {
    /// Target test file(s) to analyze
    #[arg(value_name = "FILE", required = true)]
    pub targets: Vec<PathBuf>,

    /// Compare each target with another implementation of the same unit
    #[arg(short = 'c', long = "compare", value_name = "FILE")]
    pub compare: Option<PathBuf>,

    /// Execution timeout in seconds (overrides config and PROFILING_TIMEOUT)
    #[arg(short = 't', long = "timeout", value_name = "SECS")]
    pub timeout: Option<f64>,

    /// Write the JSON run report to this file
    #[arg(short = 'o', long = "output", value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Classify code patterns of each target
    #[arg(short = 'p', long = "patterns")]
    pub patterns: bool,

    /// Enable debug logging
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,

    /// Print the performance history of each target
    #[arg(short = 'H', long = "history")]
    pub history: bool,

    /// Run only this test (`name` or `Class.method`)
    #[arg(long = "test", value_name = "NAME")]
    pub test: Option<String>,

    /// Sampling interval in milliseconds
    #[arg(long = "interval-ms", value_name = "MS")]
    pub interval_ms: Option<u64>,

    /// Runs per side when comparing; medians are compared
    #[arg(long = "repeat", value_name = "N")]
    pub repeat: Option<usize>,

    /// Output format (text or json)
    #[arg(long = "format", value_enum, default_value = "text")]
    pub format: OutputFormat,

    /// Write the sample series of every run as CSV
    #[arg(long = "samples-csv", value_name = "FILE")]
    pub samples_csv: Option<PathBuf>,

    /// Do not contact the suggestion service
    #[arg(long = "no-suggest")]
    pub no_suggest: bool,

    /// Do not append to the history file
    #[arg(long = "no-history")]
    pub no_history: bool,

    /// Config file (default: ./codeprof.toml if present)
    #[arg(long = "config", value_name = "FILE")]
    pub config: Option<PathBuf>,
}
