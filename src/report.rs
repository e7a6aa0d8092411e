//! Report aggregation and rendering
//!
//! [`aggregate`] merges one run's result, its pattern tags and an optional
//! comparison into an [`AnalysisReport`]. Reports are never modified in
//! place; [`AnalysisReport::with_suggestions`] returns a new one.

use crate::comparison::ComparisonReport;
use crate::patterns::PatternTagSet;
use crate::result::{ExecutionResult, ExecutionStatus, TestVerdict};
use crate::target::AnalysisTarget;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Format tag of the persisted JSON envelope
pub const FORMAT: &str = "codeprof-json-v1";

/// Suggestion slot of a report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Suggestions {
    NotRequested,
    Available { text: String },
    /// The service failed; the rest of the report is unaffected
    Unavailable { reason: String },
}

/// Complete analysis of one target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub target: AnalysisTarget,
    pub result: ExecutionResult,
    /// Absent when classification was not requested
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patterns: Option<PatternTagSet>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comparison: Option<ComparisonReport>,
    pub suggestions: Suggestions,
    pub generated_at: DateTime<Utc>,
    pub version: String,
}

/// Compose a report; inputs are taken as-is
pub fn aggregate(
    result: ExecutionResult,
    patterns: Option<PatternTagSet>,
    comparison: Option<ComparisonReport>,
) -> AnalysisReport {
    AnalysisReport {
        target: result.target.clone(),
        result,
        patterns,
        comparison,
        suggestions: Suggestions::NotRequested,
        generated_at: Utc::now(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    }
}

impl AnalysisReport {
    pub fn with_suggestions(self, suggestions: Suggestions) -> Self {
        Self {
            suggestions,
            ..self
        }
    }

    pub fn is_success(&self) -> bool {
        self.result.is_success()
    }

    /// Short text summary
    pub fn to_text(&self) -> String {
        let result = &self.result;
        let summary = &result.summary;
        let mut out = Vec::new();

        out.push("=== Quick Profiling Summary ===".to_string());
        out.push(format!("Target: {}", self.target.display_name()));
        out.push(format!(
            "Execution Time: {:.2}s | Memory: {:.2}MB peak | CPU: {:.1}% avg",
            summary.execution_time_secs,
            summary.peak_memory_bytes as f64 / (1024.0 * 1024.0),
            summary.avg_cpu_percent
        ));
        if summary.io_ops > 0 || summary.network_calls > 0 {
            out.push(format!(
                "I/O ops: {} | Sockets: {}",
                summary.io_ops, summary.network_calls
            ));
        }

        let error = result
            .error
            .as_ref()
            .map(|e| format!(" ({}: {})", e.class, e.message))
            .unwrap_or_default();
        let status = match result.status {
            ExecutionStatus::Success => "PASSED",
            ExecutionStatus::Failure => "FAILED",
            ExecutionStatus::Timeout => "TIMEOUT",
            ExecutionStatus::Unavailable => "UNAVAILABLE",
        };
        out.push(format!("Test Status: {status}{error}"));

        if !result.tests.is_empty() {
            let (passed, failed, skipped) = result.test_counts();
            out.push(format!(
                "Tests: {passed} passed, {failed} failed, {skipped} skipped"
            ));
            for test in result
                .tests
                .iter()
                .filter(|t| t.outcome == TestVerdict::Failed)
            {
                let reason = test
                    .error
                    .as_ref()
                    .map(|e| format!("{}: {}", e.class, e.message))
                    .unwrap_or_default();
                out.push(format!("  Test {} failed: {}", test.name, reason));
            }
        }

        if let Some(reason) = result.samples.degraded() {
            out.push(format!("Sampling degraded: {reason}"));
        }
        if result.stdout.truncated || result.stderr.truncated {
            out.push("Output truncated".to_string());
        }

        if !result.hotspots.is_empty() {
            out.push(String::new());
            out.push("=== Hotspots ===".to_string());
            for hotspot in &result.hotspots {
                out.push(format!(
                    "{:>8.3}s cumulative {:>6} calls  {}",
                    hotspot.cumulative_secs,
                    hotspot.calls,
                    hotspot.location()
                ));
            }
        }

        if let Some(patterns) = &self.patterns {
            out.push(String::new());
            out.push("=== Patterns ===".to_string());
            if patterns.is_empty() {
                out.push("No patterns detected".to_string());
            }
            for tag in patterns.iter() {
                let lines: Vec<String> = tag.lines.iter().map(u32::to_string).collect();
                out.push(format!(
                    "[{}] {} (confidence {:.2}, lines {}){}",
                    tag.severity.as_str(),
                    tag.id,
                    tag.confidence,
                    lines.join(", "),
                    if tag.description.is_empty() {
                        String::new()
                    } else {
                        format!(": {}", tag.description)
                    }
                ));
            }
        }

        if let Some(comparison) = &self.comparison {
            out.push(String::new());
            out.push(comparison.to_report_string().trim_end().to_string());
        }

        match &self.suggestions {
            Suggestions::NotRequested => {}
            Suggestions::Available { text } => {
                out.push(String::new());
                out.push("=== Suggestions ===".to_string());
                out.push(text.trim_end().to_string());
            }
            Suggestions::Unavailable { reason } => {
                out.push(String::new());
                out.push(format!("Suggestions unavailable: {reason}"));
            }
        }

        out.join("\n")
    }
}

/// Persisted envelope for one invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub format: String,
    pub version: String,
    pub reports: Vec<AnalysisReport>,
}

impl RunReport {
    pub fn new(reports: Vec<AnalysisReport>) -> Self {
        Self {
            format: FORMAT.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            reports,
        }
    }

    pub fn all_succeeded(&self) -> bool {
        self.reports.iter().all(AnalysisReport::is_success)
    }

    /// Serialize to pretty JSON
    pub fn to_json(&self) -> anyhow::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(text: &str) -> anyhow::Result<Self> {
        let report: Self = serde_json::from_str(text)?;
        if report.format != FORMAT {
            anyhow::bail!("unsupported report format {:?}", report.format);
        }
        Ok(report)
    }
}
