//! Runner table: how a target file is turned into a command line
//!
//! Runners are argv templates keyed by file extension. Placeholders:
//! - `{file}`: absolute path of the target
//! - `{test}`: selected test name; an argument that is exactly `{test}` is
//!   dropped when no test is selected
//! - `{python}`: configured Python interpreter
//! - `{harness}`: source of the built-in Python test harness (whole argument only)

use crate::config::AnalyzerConfig;
use crate::error::LoadError;
use crate::target::AnalysisTarget;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Built-in Python harness, run with `python -c`
pub const PYTHON_HARNESS: &str = include_str!("harness.py");

/// Marker prefixing the harness's result line on stderr
pub const RESULT_MARKER: &str = "__CODEPROF_RESULT__";

/// Environment variable naming the file the harness writes its result to
pub const RESULT_FILE_ENV: &str = "CODEPROF_RESULT_FILE";

/// Environment variable carrying the number of cProfile hotspots to report
pub const HOTSPOT_LIMIT_ENV: &str = "CODEPROF_HOTSPOT_LIMIT";

/// A command template for one file extension
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunnerSpec {
    pub command: Vec<String>,
    /// Whether the command speaks the harness result protocol
    #[serde(default)]
    pub harness: bool,
}

impl RunnerSpec {
    pub fn new(command: &[&str]) -> Self {
        Self {
            command: command.iter().map(|s| s.to_string()).collect(),
            harness: false,
        }
    }
}

/// A fully expanded command for one target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedCommand {
    pub program: String,
    pub args: Vec<String>,
    pub harness: bool,
}

/// Extension → runner mapping
#[derive(Debug, Clone)]
pub struct RunnerTable {
    runners: BTreeMap<String, RunnerSpec>,
    python: String,
}

impl RunnerTable {
    /// Built-in runners (`py`, `sh`, `bash`) overlaid with configured ones
    pub fn from_config(config: &AnalyzerConfig) -> Self {
        let mut runners = BTreeMap::new();
        runners.insert(
            "py".to_string(),
            RunnerSpec {
                command: ["{python}", "-c", "{harness}", "{file}", "{test}"]
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
                harness: true,
            },
        );
        runners.insert("sh".to_string(), RunnerSpec::new(&["sh", "{file}", "{test}"]));
        runners.insert(
            "bash".to_string(),
            RunnerSpec::new(&["bash", "{file}", "{test}"]),
        );

        for (ext, spec) in &config.runners {
            runners.insert(ext.trim_start_matches('.').to_string(), spec.clone());
        }

        Self {
            runners,
            python: config.sandbox.python.clone(),
        }
    }

    /// Expand the runner for a target into a concrete command
    pub fn resolve(&self, target: &AnalysisTarget) -> Result<ResolvedCommand, LoadError> {
        let extension = target
            .path()
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_string();

        let spec = self
            .runners
            .get(&extension)
            .filter(|spec| !spec.command.is_empty())
            .ok_or_else(|| LoadError::NoRunner {
                path: target.path().to_path_buf(),
                extension: extension.clone(),
            })?;

        let file = target.path().to_string_lossy();
        let mut argv = Vec::with_capacity(spec.command.len());
        for part in &spec.command {
            if part == "{test}" && target.test().is_none() {
                continue;
            }
            if part == "{harness}" {
                argv.push(PYTHON_HARNESS.to_string());
                continue;
            }
            argv.push(
                part.replace("{python}", &self.python)
                    .replace("{file}", &file)
                    .replace("{test}", target.test().unwrap_or("")),
            );
        }

        let program = argv.remove(0);
        Ok(ResolvedCommand {
            program,
            args: argv,
            harness: spec.harness,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn target(path: &str, test: Option<&str>) -> AnalysisTarget {
        AnalysisTarget::unresolved(PathBuf::from(path), test.map(str::to_string))
    }

    #[test]
    fn test_python_runner_uses_harness() {
        let table = RunnerTable::from_config(&AnalyzerConfig::default());
        let cmd = table.resolve(&target("/t/test_a.py", Some("test_a"))).unwrap();
        assert_eq!(cmd.program, "python3");
        assert_eq!(cmd.args[0], "-c");
        assert!(cmd.args[1].contains(RESULT_MARKER));
        assert_eq!(cmd.args[2], "/t/test_a.py");
        assert_eq!(cmd.args[3], "test_a");
        assert!(cmd.harness);
    }

    #[test]
    fn test_missing_test_placeholder_is_dropped() {
        let table = RunnerTable::from_config(&AnalyzerConfig::default());
        let cmd = table.resolve(&target("/t/run.sh", None)).unwrap();
        assert_eq!(cmd.program, "sh");
        assert_eq!(cmd.args, vec!["/t/run.sh"]);
        assert!(!cmd.harness);
    }

    #[test]
    fn test_configured_runner_overrides_default() {
        let mut config = AnalyzerConfig::default();
        config.sandbox.python = "/opt/py/bin/python".to_string();
        config
            .runners
            .insert(".rb".to_string(), RunnerSpec::new(&["ruby", "-w", "{file}"]));

        let table = RunnerTable::from_config(&config);
        let cmd = table.resolve(&target("/t/spec.rb", None)).unwrap();
        assert_eq!(cmd.program, "ruby");
        assert_eq!(cmd.args, vec!["-w", "/t/spec.rb"]);

        let py = table.resolve(&target("/t/test_b.py", None)).unwrap();
        assert_eq!(py.program, "/opt/py/bin/python");
    }

    #[test]
    fn test_unknown_extension_has_no_runner() {
        let table = RunnerTable::from_config(&AnalyzerConfig::default());
        let err = table.resolve(&target("/t/notes.txt", None)).unwrap_err();
        assert!(matches!(err, LoadError::NoRunner { ref extension, .. } if extension == "txt"));
    }

    #[test]
    fn test_harness_protocol_constants_match_script() {
        assert!(PYTHON_HARNESS.contains(&format!("MARKER = \"{RESULT_MARKER}\"")));
        assert!(PYTHON_HARNESS.contains(&format!("os.environ.get(\"{RESULT_FILE_ENV}\")")));
        assert!(PYTHON_HARNESS.contains(&format!("os.environ.get(\"{HOTSPOT_LIMIT_ENV}\"")));
    }
}
