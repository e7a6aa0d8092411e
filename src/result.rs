//! Outcome of one sandboxed run

use crate::error::LoadError;
use crate::metrics::{MetricSummary, SampleSeries};
use crate::target::AnalysisTarget;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Success,
    Failure,
    Timeout,
    /// The target could not be loaded and was never executed
    Unavailable,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Success => "success",
            ExecutionStatus::Failure => "failure",
            ExecutionStatus::Timeout => "timeout",
            ExecutionStatus::Unavailable => "unavailable",
        }
    }
}

/// Description of an error raised by (or about) the target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Error class, e.g. `AssertionError`, `ExitStatus`, `TimeoutError`
    pub class: String,
    pub message: String,
}

impl ErrorInfo {
    pub fn new(class: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestVerdict {
    Passed,
    Failed,
    Skipped,
}

/// Result of one test reported by the harness
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestOutcome {
    pub name: String,
    pub outcome: TestVerdict,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}

/// One function from the harness's cProfile run, sorted by cumulative time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hotspot {
    pub function: String,
    pub file: String,
    #[serde(default)]
    pub line: u32,
    pub calls: u64,
    #[serde(default)]
    pub total_secs: f64,
    pub cumulative_secs: f64,
}

impl Hotspot {
    /// `function (file:line)`, or just the function for builtins
    pub fn location(&self) -> String {
        if self.line == 0 {
            self.function.clone()
        } else {
            format!("{} ({}:{})", self.function, self.file, self.line)
        }
    }
}

/// Captured output stream, bounded in size
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapturedStream {
    pub text: String,
    /// Output beyond the capture limit was discarded
    #[serde(default)]
    pub truncated: bool,
}

/// Outcome of running one [`AnalysisTarget`]; immutable once built
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub target: AnalysisTarget,
    pub status: ExecutionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
    pub stdout: CapturedStream,
    pub stderr: CapturedStream,
    #[serde(default)]
    pub tests: Vec<TestOutcome>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hotspots: Vec<Hotspot>,
    pub samples: SampleSeries,
    pub summary: MetricSummary,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub wall_time_secs: f64,
}

impl ExecutionResult {
    /// Sentinel result for a target that failed to load
    pub fn unavailable(target: AnalysisTarget, error: &LoadError) -> Self {
        let now = Utc::now();
        Self {
            target,
            status: ExecutionStatus::Unavailable,
            exit_code: None,
            error: Some(ErrorInfo::new("LoadError", error.to_string())),
            stdout: CapturedStream::default(),
            stderr: CapturedStream::default(),
            tests: Vec::new(),
            hotspots: Vec::new(),
            samples: SampleSeries::new(),
            summary: MetricSummary::default(),
            started_at: now,
            ended_at: now,
            wall_time_secs: 0.0,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ExecutionStatus::Success
    }

    pub fn error_class(&self) -> Option<&str> {
        self.error.as_ref().map(|e| e.class.as_str())
    }

    /// Count of (passed, failed, skipped) harness tests
    pub fn test_counts(&self) -> (usize, usize, usize) {
        self.tests
            .iter()
            .fold((0, 0, 0), |(p, f, s), t| match t.outcome {
                TestVerdict::Passed => (p + 1, f, s),
                TestVerdict::Failed => (p, f + 1, s),
                TestVerdict::Skipped => (p, f, s + 1),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_unavailable_sentinel() {
        let target = AnalysisTarget::unresolved("gone.py", None);
        let err = LoadError::Missing {
            path: PathBuf::from("gone.py"),
        };
        let result = ExecutionResult::unavailable(target, &err);
        assert_eq!(result.status, ExecutionStatus::Unavailable);
        assert_eq!(result.error_class(), Some("LoadError"));
        assert!(result.samples.is_empty());
        assert!(!result.is_success());
    }

    #[test]
    fn test_counts() {
        let mut result = ExecutionResult::unavailable(
            AnalysisTarget::unresolved("t.py", None),
            &LoadError::Missing {
                path: PathBuf::from("t.py"),
            },
        );
        result.tests = vec![
            TestOutcome {
                name: "test_a".into(),
                outcome: TestVerdict::Passed,
                error: None,
            },
            TestOutcome {
                name: "test_b".into(),
                outcome: TestVerdict::Failed,
                error: Some(ErrorInfo::new("AssertionError", "1 != 2")),
            },
            TestOutcome {
                name: "test_c".into(),
                outcome: TestVerdict::Skipped,
                error: None,
            },
        ];
        assert_eq!(result.test_counts(), (1, 1, 1));
    }

    #[test]
    fn test_hotspots_are_omitted_when_empty() {
        let mut result = ExecutionResult::unavailable(
            AnalysisTarget::unresolved("t.py", None),
            &LoadError::Missing {
                path: PathBuf::from("t.py"),
            },
        );
        let json = serde_json::to_value(&result).unwrap();
        assert!(json.get("hotspots").is_none());

        result.hotspots.push(Hotspot {
            function: "slow_sum".into(),
            file: "/t/t.py".into(),
            line: 4,
            calls: 3,
            total_secs: 0.2,
            cumulative_secs: 0.5,
        });
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["hotspots"][0]["function"], "slow_sum");
        assert_eq!(json["hotspots"][0]["calls"], 3);
    }

    #[test]
    fn test_hotspot_location() {
        let mut hotspot = Hotspot {
            function: "<built-in method time.sleep>".into(),
            file: "~".into(),
            line: 0,
            calls: 1,
            total_secs: 0.1,
            cumulative_secs: 0.1,
        };
        assert_eq!(hotspot.location(), "<built-in method time.sleep>");
        hotspot.function = "test_slow".into();
        hotspot.file = "t.py".into();
        hotspot.line = 7;
        assert_eq!(hotspot.location(), "test_slow (t.py:7)");
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_string(&ExecutionStatus::Timeout).unwrap();
        assert_eq!(json, "\"timeout\"");
        assert_eq!(ExecutionStatus::Unavailable.as_str(), "unavailable");
    }
}
