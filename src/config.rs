//! `codeprof.toml` configuration
//!
//! Loaded once at startup, then adjusted by environment variables and CLI
//! flags, and passed by reference into every component.

use crate::error::ConfigError;
use crate::patterns::RuleSpec;
use crate::runner::RunnerSpec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default config file looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "codeprof.toml";

const MAX_SUGGESTION_TIMEOUT_SECS: u64 = 24 * 60 * 60;

/// Top-level analyzer configuration
///
/// # Example
/// ```
/// use codeprof::config::AnalyzerConfig;
///
/// let config = AnalyzerConfig::default();
/// assert_eq!(config.sandbox.timeout_secs, 30.0);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    pub sandbox: SandboxConfig,
    pub sampler: SamplerConfig,
    pub comparison: ComparisonConfig,
    pub suggestions: SuggestionConfig,
    pub history: HistoryConfig,

    /// Extra or overriding runners keyed by file extension (without the dot)
    pub runners: BTreeMap<String, RunnerSpec>,

    /// Extra or overriding pattern rules (matched to defaults by id)
    pub patterns: Vec<RuleSpec>,

    /// Pattern ids to drop from the taxonomy
    pub disabled_patterns: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    /// Execution timeout in seconds
    pub timeout_secs: f64,

    /// Delay between SIGTERM and SIGKILL once the timeout fired, also the bound
    /// for collecting output streams after the target exited
    pub kill_grace_ms: u64,

    /// Per-stream cap on captured stdout/stderr
    pub max_output_bytes: usize,

    /// Interpreter used by the built-in Python runner
    pub python: String,

    /// Functions reported from the harness's cProfile run; 0 disables profiling
    pub hotspot_limit: usize,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30.0,
            kill_grace_ms: 200,
            max_output_bytes: 1024 * 1024,
            python: "python3".to_string(),
            hotspot_limit: 15,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerConfig {
    /// Sampling interval in milliseconds
    pub interval_ms: u64,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self { interval_ms: 50 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ComparisonConfig {
    /// Relative change at or below which a metric counts as unchanged
    pub noise_threshold: f64,

    /// Runs per side; deltas are computed from per-metric medians
    pub repeat: usize,
}

impl Default for ComparisonConfig {
    fn default() -> Self {
        Self {
            noise_threshold: 0.05,
            repeat: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SuggestionConfig {
    pub enabled: bool,

    /// Generate endpoint of an Ollama-compatible model server
    pub url: String,

    pub model: String,

    /// Request timeout in seconds
    pub timeout_secs: u64,

    /// Maximum number of source bytes included in the request
    pub max_source_bytes: usize,
}

impl Default for SuggestionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            url: "http://localhost:11434/api/generate".to_string(),
            model: "dolphin3".to_string(),
            timeout_secs: 60,
            max_source_bytes: 8 * 1024,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    pub enabled: bool,
    pub path: PathBuf,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: PathBuf::from("performance_history.json"),
        }
    }
}

impl AnalyzerConfig {
    /// Load a config file that must exist
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text, path)
    }

    /// Load a config file, falling back to defaults when it does not exist
    pub fn load_optional(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(text) => Self::from_toml_str(&text, path),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("no config at {}, using defaults", path.display());
                Ok(Self::default())
            }
            Err(source) => Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    fn from_toml_str(text: &str, path: &Path) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `OLLAMA_URL`, `OLLAMA_MODEL` and `PROFILING_TIMEOUT` overrides
    ///
    /// `lookup` is usually `|k| std::env::var(k).ok()`; tests pass a map.
    pub fn with_env_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("OLLAMA_URL") {
            self.suggestions.url = url;
        }
        if let Some(model) = lookup("OLLAMA_MODEL") {
            self.suggestions.model = model;
        }
        if let Some(raw) = lookup("PROFILING_TIMEOUT") {
            let secs: f64 = raw.trim().parse().map_err(|_| {
                ConfigError::Invalid(format!("PROFILING_TIMEOUT must be a number, got {raw:?}"))
            })?;
            self.sandbox.timeout_secs = secs;
        }
        self.validate()?;
        Ok(self)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        let timeout = self.sandbox.timeout_secs;
        if !timeout.is_finite() || timeout <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "sandbox.timeout_secs must be > 0, got {timeout}"
            )));
        }
        if Duration::try_from_secs_f64(timeout).is_err() {
            return Err(ConfigError::Invalid(format!(
                "sandbox.timeout_secs is out of range, got {timeout}"
            )));
        }

        if self.sampler.interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "sampler.interval_ms must be >= 1".to_string(),
            ));
        }

        if self.sandbox.max_output_bytes == 0 {
            return Err(ConfigError::Invalid(
                "sandbox.max_output_bytes must be > 0".to_string(),
            ));
        }

        let noise = self.comparison.noise_threshold;
        if !noise.is_finite() || noise < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "comparison.noise_threshold must be non-negative, got {noise}"
            )));
        }

        if self.comparison.repeat == 0 {
            return Err(ConfigError::Invalid(
                "comparison.repeat must be >= 1".to_string(),
            ));
        }

        let suggest_timeout = self.suggestions.timeout_secs;
        if suggest_timeout == 0 || suggest_timeout > MAX_SUGGESTION_TIMEOUT_SECS {
            return Err(ConfigError::Invalid(format!(
                "suggestions.timeout_secs must be within 1..={MAX_SUGGESTION_TIMEOUT_SECS}"
            )));
        }

        Ok(())
    }

    /// Saturates for out-of-range values; `validate` rejects those
    pub fn timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.sandbox.timeout_secs).unwrap_or(Duration::MAX)
    }

    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sampler.interval_ms)
    }

    pub fn kill_grace(&self) -> Duration {
        Duration::from_millis(self.sandbox.kill_grace_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = AnalyzerConfig::default();
        assert_eq!(config.sandbox.timeout_secs, 30.0);
        assert_eq!(config.sampler.interval_ms, 50);
        assert_eq!(config.comparison.noise_threshold, 0.05);
        assert_eq!(config.comparison.repeat, 1);
        assert_eq!(config.suggestions.model, "dolphin3");
        assert_eq!(
            config.history.path,
            PathBuf::from("performance_history.json")
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let text = r#"
            [sandbox]
            timeout_secs = 5
            hotspot_limit = 3

            [sampler]
            interval_ms = 10
        "#;
        let config = AnalyzerConfig::from_toml_str(text, Path::new("inline.toml")).unwrap();
        assert_eq!(config.sandbox.timeout_secs, 5.0);
        assert_eq!(config.sandbox.python, "python3");
        assert_eq!(config.sandbox.hotspot_limit, 3);
        assert_eq!(config.sandbox.max_output_bytes, 1024 * 1024);
        assert_eq!(config.sampler.interval_ms, 10);
        assert!(config.history.enabled);
    }

    #[test]
    fn test_runner_and_pattern_tables_parse() {
        let text = r#"
            disabled_patterns = ["print-in-test"]

            [runners.rb]
            command = ["ruby", "{file}"]

            [[patterns]]
            id = "network-in-test"
            severity = "medium"
            confidence = 0.7
            description = "test performs network requests"
            rule = { kind = "test_contains", pattern = "requests\\.(get|post)\\(" }
        "#;
        let config = AnalyzerConfig::from_toml_str(text, Path::new("inline.toml")).unwrap();
        assert_eq!(config.disabled_patterns, vec!["print-in-test"]);
        assert_eq!(config.runners["rb"].command, vec!["ruby", "{file}"]);
        assert_eq!(config.patterns.len(), 1);
        assert_eq!(config.patterns[0].id, "network-in-test");
    }

    #[test]
    fn test_malformed_toml_is_parse_error() {
        let err = AnalyzerConfig::from_toml_str("[sandbox\n", Path::new("bad.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_load_optional_missing_file_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AnalyzerConfig::load_optional(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.sandbox.timeout_secs, 30.0);
    }

    #[test]
    fn test_load_missing_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = AnalyzerConfig::load(&dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("OLLAMA_URL", "http://model-host:8080/api/generate"),
            ("OLLAMA_MODEL", "llama3"),
            ("PROFILING_TIMEOUT", "12"),
        ]
        .into_iter()
        .collect();

        let config = AnalyzerConfig::default()
            .with_env_overrides(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.suggestions.url, "http://model-host:8080/api/generate");
        assert_eq!(config.suggestions.model, "llama3");
        assert_eq!(config.timeout(), Duration::from_secs(12));
    }

    #[test]
    fn test_env_override_rejects_bad_timeout() {
        let err = AnalyzerConfig::default()
            .with_env_overrides(|k| (k == "PROFILING_TIMEOUT").then(|| "soon".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    #[allow(clippy::field_reassign_with_default)]
    fn test_invalid_values() {
        let mut config = AnalyzerConfig::default();
        config.sandbox.timeout_secs = 0.0;
        assert!(config.validate().is_err());

        let mut config = AnalyzerConfig::default();
        config.sampler.interval_ms = 0;
        assert!(config.validate().is_err());

        let mut config = AnalyzerConfig::default();
        config.comparison.noise_threshold = -0.1;
        assert!(config.validate().is_err());

        let mut config = AnalyzerConfig::default();
        config.comparison.repeat = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    #[allow(clippy::field_reassign_with_default)]
    fn test_huge_timeout_is_rejected_not_panicking() {
        let mut config = AnalyzerConfig::default();
        config.sandbox.timeout_secs = 1e30;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("out of range"));
        assert_eq!(config.timeout(), Duration::MAX);

        let err = AnalyzerConfig::default()
            .with_env_overrides(|k| (k == "PROFILING_TIMEOUT").then(|| "1e30".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let mut config = AnalyzerConfig::default();
        config.sandbox.timeout_secs = 1e15;
        assert!(config.validate().is_ok());
    }
}
