// Comparison of two units run under identical sampling conditions
//
// Deltas are computed from per-metric medians of the run summaries, so
// with `repeat = 1` they are the plain differences of the two runs.

use crate::comparison::delta::{MetricDelta, Verdict};
use crate::config::ComparisonConfig;
use crate::error::AnalysisError;
use crate::metrics::{median, Metric};
use crate::result::{ExecutionResult, ExecutionStatus};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonOutcome {
    /// Deltas were computed
    Measured,
    /// Both sides failed the same way; no deltas
    NoMeasurableDifference,
    /// The baseline could not be loaded; no deltas
    BaselineUnavailable,
    /// The candidate could not be loaded; no deltas
    CandidateUnavailable,
}

impl ComparisonOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComparisonOutcome::Measured => "measured",
            ComparisonOutcome::NoMeasurableDifference => "no_measurable_difference",
            ComparisonOutcome::BaselineUnavailable => "baseline_unavailable",
            ComparisonOutcome::CandidateUnavailable => "candidate_unavailable",
        }
    }
}

/// Baseline vs candidate comparison of one unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonReport {
    /// Unit compared on both sides (test name or `*`)
    pub unit: String,
    /// First baseline run
    pub baseline: ExecutionResult,
    /// First candidate run
    pub candidate: ExecutionResult,
    pub outcome: ComparisonOutcome,
    /// Metric name → delta; empty unless `outcome` is `measured`
    pub deltas: BTreeMap<String, MetricDelta>,
    pub noise_threshold: f64,
    /// Runs per side
    pub repeat: usize,
}

impl ComparisonReport {
    /// Compare one baseline run with one candidate run
    pub fn from_results(
        baseline: ExecutionResult,
        candidate: ExecutionResult,
        config: &ComparisonConfig,
    ) -> Result<Self, AnalysisError> {
        Self::from_runs(vec![baseline], vec![candidate], config)
    }

    /// Compare repeated runs using per-metric medians
    pub fn from_runs(
        baseline: Vec<ExecutionResult>,
        candidate: Vec<ExecutionResult>,
        config: &ComparisonConfig,
    ) -> Result<Self, AnalysisError> {
        let repeat = baseline.len().min(candidate.len());
        let (Some(first_a), Some(first_b)) = (baseline.first(), candidate.first()) else {
            return Err(AnalysisError::EmptyComparison);
        };

        if first_a.target.unit_name() != first_b.target.unit_name() {
            return Err(AnalysisError::IncomparableTargets {
                baseline: first_a.target.display_name(),
                candidate: first_b.target.display_name(),
            });
        }

        let outcome = outcome_of(first_a, first_b);
        let deltas = if outcome == ComparisonOutcome::Measured {
            Metric::ALL
                .iter()
                .map(|metric| {
                    let a = side_median(&baseline, *metric);
                    let b = side_median(&candidate, *metric);
                    (
                        metric.name().to_string(),
                        MetricDelta::compute(a, b, config.noise_threshold),
                    )
                })
                .collect()
        } else {
            BTreeMap::new()
        };

        tracing::debug!(
            unit = first_a.target.unit_name(),
            outcome = outcome.as_str(),
            repeat,
            "comparison computed"
        );

        let unit = first_a.target.unit_name().to_string();
        let mut baseline = baseline;
        let mut candidate = candidate;
        Ok(Self {
            unit,
            baseline: baseline.swap_remove(0),
            candidate: candidate.swap_remove(0),
            outcome,
            deltas,
            noise_threshold: config.noise_threshold,
            repeat,
        })
    }

    pub fn delta(&self, metric: Metric) -> Option<&MetricDelta> {
        self.deltas.get(metric.name())
    }

    /// Names of metrics that regressed
    pub fn regressions(&self) -> Vec<&str> {
        self.with_verdict(Verdict::Regression)
    }

    pub fn improvements(&self) -> Vec<&str> {
        self.with_verdict(Verdict::Improvement)
    }

    pub fn has_regression(&self) -> bool {
        !self.regressions().is_empty()
    }

    fn with_verdict(&self, verdict: Verdict) -> Vec<&str> {
        self.deltas
            .iter()
            .filter(|(_, d)| d.verdict == verdict)
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// Human-readable comparison table
    pub fn to_report_string(&self) -> String {
        let mut report = String::new();
        report.push_str(&format!(
            "=== Comparison: {} vs {} ===\n",
            self.baseline.target.display_name(),
            self.candidate.target.display_name()
        ));

        match self.outcome {
            ComparisonOutcome::Measured => {}
            ComparisonOutcome::NoMeasurableDifference => {
                report.push_str(&format!(
                    "No measurable difference: both runs ended with {} ({})\n",
                    self.baseline.status.as_str(),
                    self.baseline.error_class().unwrap_or("no error")
                ));
                return report;
            }
            ComparisonOutcome::BaselineUnavailable | ComparisonOutcome::CandidateUnavailable => {
                report.push_str(&format!("Not compared: {}\n", self.outcome.as_str()));
                return report;
            }
        }

        if self.repeat > 1 {
            report.push_str(&format!("Medians of {} runs per side\n", self.repeat));
        }
        report.push_str(&format!(
            "{:<22} {:>14} {:>14} {:>14} {:>9}  {}\n",
            "metric", "baseline", "candidate", "delta", "change", "verdict"
        ));
        for (name, d) in &self.deltas {
            let change = d
                .percent()
                .map(|p| format!("{p:+.1}%"))
                .unwrap_or_else(|| "n/a".to_string());
            report.push_str(&format!(
                "{:<22} {:>14.4} {:>14.4} {:>+14.4} {:>9}  {}\n",
                name,
                d.baseline,
                d.candidate,
                d.absolute,
                change,
                d.verdict.as_str()
            ));
        }
        for (side, result) in [("baseline", &self.baseline), ("candidate", &self.candidate)] {
            if let Some(top) = result.hotspots.first() {
                report.push_str(&format!(
                    "Top hotspot ({side}): {} - {} calls, {:.3}s cumulative\n",
                    top.location(),
                    top.calls,
                    top.cumulative_secs
                ));
            }
        }
        report
    }
}

fn side_median(runs: &[ExecutionResult], metric: Metric) -> f64 {
    let values: Vec<f64> = runs.iter().map(|r| r.summary.value(metric)).collect();
    median(&values).unwrap_or(0.0)
}

fn outcome_of(a: &ExecutionResult, b: &ExecutionResult) -> ComparisonOutcome {
    let same_failure = !a.is_success()
        && !b.is_success()
        && a.status == b.status
        && a.error_class() == b.error_class();
    if same_failure {
        ComparisonOutcome::NoMeasurableDifference
    } else if a.status == ExecutionStatus::Unavailable {
        ComparisonOutcome::BaselineUnavailable
    } else if b.status == ExecutionStatus::Unavailable {
        ComparisonOutcome::CandidateUnavailable
    } else {
        ComparisonOutcome::Measured
    }
}
