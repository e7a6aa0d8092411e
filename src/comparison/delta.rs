// Per-metric delta and verdict
//
// All compared metrics are lower-is-better, so a candidate above the
// baseline beyond the noise threshold is a regression.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Regression,
    Improvement,
    Unchanged,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Regression => "regression",
            Verdict::Improvement => "improvement",
            Verdict::Unchanged => "unchanged",
        }
    }
}

/// Change of one metric from baseline to candidate
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricDelta {
    pub baseline: f64,
    pub candidate: f64,
    /// `candidate - baseline`
    pub absolute: f64,
    /// `absolute / baseline`; `None` when the baseline is exactly zero
    pub relative: Option<f64>,
    pub verdict: Verdict,
}

impl MetricDelta {
    pub fn compute(baseline: f64, candidate: f64, noise_threshold: f64) -> Self {
        let absolute = candidate - baseline;
        let relative = if baseline == 0.0 {
            None
        } else {
            Some(absolute / baseline)
        };

        let verdict = match relative {
            _ if absolute == 0.0 => Verdict::Unchanged,
            Some(rel) if rel.abs() <= noise_threshold => Verdict::Unchanged,
            Some(_) if candidate > baseline => Verdict::Regression,
            Some(_) => Verdict::Improvement,
            // Baseline zero, candidate non-zero
            None if candidate > 0.0 => Verdict::Regression,
            None => Verdict::Improvement,
        };

        Self {
            baseline,
            candidate,
            absolute,
            relative,
            verdict,
        }
    }

    /// Relative change in percent, if defined
    pub fn percent(&self) -> Option<f64> {
        self.relative.map(|r| r * 100.0)
    }
}
