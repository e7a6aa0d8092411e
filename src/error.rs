//! Error taxonomy for the analysis engine
//!
//! Faults raised by the analyzed code never show up here: they are captured
//! into [`crate::result::ExecutionResult`]. These types cover load failures
//! of a target and faults of the analyzer's own infrastructure.

use std::path::PathBuf;
use thiserror::Error;

/// A target could not be loaded, so it was never executed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LoadError {
    #[error("target file {} not found", path.display())]
    Missing { path: PathBuf },

    #[error("target file {} is not readable: {reason}", path.display())]
    Unreadable { path: PathBuf, reason: String },

    #[error("no runner configured for {} (extension {extension:?})", path.display())]
    NoRunner { path: PathBuf, extension: String },

    #[error("syntax error in {}: {message}", path.display())]
    Syntax {
        path: PathBuf,
        message: String,
        line: Option<u32>,
    },

    #[error("test {name:?} not found or not callable in {}", path.display())]
    MissingTest { path: PathBuf, name: String },
}

/// Failure of the execution sandbox itself
#[derive(Debug, Error)]
pub enum SandboxError {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error("failed to spawn runner {program:?}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("sandbox I/O failure during {operation}: {source}")]
    Io {
        operation: &'static str,
        #[source]
        source: std::io::Error,
    },
}

/// Configuration could not be loaded or is inconsistent
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("invalid regex in pattern rule {id:?}: {source}")]
    Regex {
        id: String,
        #[source]
        source: regex::Error,
    },
}

/// The suggestion service could not produce suggestions
#[derive(Debug, Error)]
pub enum SuggestionError {
    #[error("suggestion service unreachable at {url}: {reason}")]
    Unreachable { url: String, reason: String },

    #[error("suggestion service returned HTTP {status}")]
    Status { status: u16 },

    #[error("malformed suggestion service response: {0}")]
    Malformed(String),
}

/// History file could not be read or written
#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("failed to access history file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("history file {} is corrupt: {source}", path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Errors surfaced by the [`crate::analyzer::Analyzer`] orchestration
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error(transparent)]
    Sandbox(#[from] SandboxError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("cannot compare unit {baseline:?} with unit {candidate:?}")]
    IncomparableTargets { baseline: String, candidate: String },

    #[error("comparison needs at least one run of each target")]
    EmptyComparison,
}
