//! codeprof - sandboxed profiling and pattern classification of test files
//!
//! Runs a target test file in an isolated child process under a timeout,
//! samples its resource usage, classifies recognizable code patterns and
//! compares two implementations of the same unit. Reports render as text,
//! JSON or CSV sample series.

pub mod analyzer;
pub mod cancel;
pub mod cli;
pub mod comparison;
pub mod config;
pub mod csv_output;
pub mod error;
pub mod history;
pub mod metrics;
pub mod patterns;
pub mod procfs;
pub mod report;
pub mod result;
pub mod runner;
pub mod sampler;
pub mod sandbox;
pub mod suggestions;
pub mod target;
