//! Resource metric samples and per-run summaries

use serde::{Deserialize, Serialize};

/// One timestamped resource-usage reading
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MetricSample {
    /// Seconds since the target was spawned
    pub elapsed_secs: f64,
    /// Resident set size (peak resident size for the end-of-run sample)
    pub memory_bytes: u64,
    /// CPU time over wall time since the previous sample, in percent
    pub cpu_percent: f64,
    /// Cumulative read + write syscalls
    pub io_ops: u64,
    /// Socket descriptors open at sample time
    pub network_calls: u64,
}

/// Ordered sample stream of one run
///
/// Samples are kept in insertion order and `elapsed_secs` never decreases.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SampleSeries {
    samples: Vec<MetricSample>,
    /// Set when some counters could not be read
    #[serde(skip_serializing_if = "Option::is_none")]
    degraded: Option<String>,
}

impl SampleSeries {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a sample, clamping its elapsed time to keep time order
    pub fn push(&mut self, mut sample: MetricSample) {
        if let Some(last) = self.samples.last() {
            if sample.elapsed_secs < last.elapsed_secs {
                sample.elapsed_secs = last.elapsed_secs;
            }
        }
        if !sample.cpu_percent.is_finite() || sample.cpu_percent < 0.0 {
            sample.cpu_percent = 0.0;
        }
        self.samples.push(sample);
    }

    /// Record the first degradation reason; later ones are dropped
    pub fn mark_degraded(&mut self, reason: impl Into<String>) {
        if self.degraded.is_none() {
            self.degraded = Some(reason.into());
        }
    }

    pub fn samples(&self) -> &[MetricSample] {
        &self.samples
    }

    pub fn last(&self) -> Option<&MetricSample> {
        self.samples.last()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn degraded(&self) -> Option<&str> {
        self.degraded.as_deref()
    }

    pub fn is_time_ordered(&self) -> bool {
        self.samples
            .windows(2)
            .all(|w| w[0].elapsed_secs <= w[1].elapsed_secs)
    }
}

/// Metrics compared between runs. All of them are lower-is-better.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    ExecutionTimeSecs,
    PeakMemoryBytes,
    AvgCpuPercent,
    IoOps,
    NetworkCalls,
}

impl Metric {
    pub const ALL: [Metric; 5] = [
        Metric::ExecutionTimeSecs,
        Metric::PeakMemoryBytes,
        Metric::AvgCpuPercent,
        Metric::IoOps,
        Metric::NetworkCalls,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Metric::ExecutionTimeSecs => "execution_time_secs",
            Metric::PeakMemoryBytes => "peak_memory_bytes",
            Metric::AvgCpuPercent => "avg_cpu_percent",
            Metric::IoOps => "io_ops",
            Metric::NetworkCalls => "network_calls",
        }
    }
}

/// Summary of one run's samples
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MetricSummary {
    pub execution_time_secs: f64,
    pub peak_memory_bytes: u64,
    pub avg_cpu_percent: f64,
    pub max_cpu_percent: f64,
    pub io_ops: u64,
    pub network_calls: u64,
    pub sample_count: usize,
}

impl MetricSummary {
    /// Summarize a series; `execution_time_secs` is the measured wall time
    pub fn from_series(series: &SampleSeries, execution_time_secs: f64) -> Self {
        let samples = series.samples();
        if samples.is_empty() {
            return Self {
                execution_time_secs,
                ..Self::default()
            };
        }

        let cpu_sum: f64 = samples.iter().map(|s| s.cpu_percent).sum();
        Self {
            execution_time_secs,
            peak_memory_bytes: samples.iter().map(|s| s.memory_bytes).max().unwrap_or(0),
            avg_cpu_percent: cpu_sum / samples.len() as f64,
            max_cpu_percent: samples.iter().map(|s| s.cpu_percent).fold(0.0, f64::max),
            io_ops: samples.iter().map(|s| s.io_ops).max().unwrap_or(0),
            network_calls: samples.iter().map(|s| s.network_calls).max().unwrap_or(0),
            sample_count: samples.len(),
        }
    }

    /// Value of one comparable metric as a float
    pub fn value(&self, metric: Metric) -> f64 {
        match metric {
            Metric::ExecutionTimeSecs => self.execution_time_secs,
            Metric::PeakMemoryBytes => self.peak_memory_bytes as f64,
            Metric::AvgCpuPercent => self.avg_cpu_percent,
            Metric::IoOps => self.io_ops as f64,
            Metric::NetworkCalls => self.network_calls as f64,
        }
    }
}

/// Median of a slice of floats (mean of the middle pair for even lengths)
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(elapsed: f64, memory: u64, cpu: f64) -> MetricSample {
        MetricSample {
            elapsed_secs: elapsed,
            memory_bytes: memory,
            cpu_percent: cpu,
            ..Default::default()
        }
    }

    #[test]
    fn test_push_keeps_time_order() {
        let mut series = SampleSeries::new();
        series.push(sample(0.5, 1, 0.0));
        series.push(sample(0.2, 2, 0.0));
        assert_eq!(series.samples()[1].elapsed_secs, 0.5);
        assert!(series.is_time_ordered());
    }

    #[test]
    fn test_push_sanitizes_cpu() {
        let mut series = SampleSeries::new();
        series.push(sample(0.0, 0, f64::NAN));
        series.push(sample(0.1, 0, -3.0));
        assert!(series.samples().iter().all(|s| s.cpu_percent == 0.0));
    }

    #[test]
    fn test_first_degradation_reason_wins() {
        let mut series = SampleSeries::new();
        series.mark_degraded("no /proc/<pid>/io");
        series.mark_degraded("something else");
        assert_eq!(series.degraded(), Some("no /proc/<pid>/io"));
    }

    #[test]
    fn test_summary_from_series() {
        let mut series = SampleSeries::new();
        series.push(sample(0.0, 100, 10.0));
        series.push(sample(0.1, 300, 50.0));
        series.push(MetricSample {
            elapsed_secs: 0.2,
            memory_bytes: 200,
            cpu_percent: 30.0,
            io_ops: 7,
            network_calls: 1,
        });

        let summary = MetricSummary::from_series(&series, 0.2);
        assert_eq!(summary.peak_memory_bytes, 300);
        assert_eq!(summary.avg_cpu_percent, 30.0);
        assert_eq!(summary.max_cpu_percent, 50.0);
        assert_eq!(summary.io_ops, 7);
        assert_eq!(summary.network_calls, 1);
        assert_eq!(summary.sample_count, 3);
        assert_eq!(summary.value(Metric::PeakMemoryBytes), 300.0);
    }

    #[test]
    fn test_summary_of_empty_series() {
        let summary = MetricSummary::from_series(&SampleSeries::new(), 1.5);
        assert_eq!(summary.execution_time_secs, 1.5);
        assert_eq!(summary.sample_count, 0);
    }

    #[test]
    fn test_median() {
        assert_eq!(median(&[]), None);
        assert_eq!(median(&[3.0]), Some(3.0));
        assert_eq!(median(&[3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&[4.0, 1.0, 2.0, 3.0]), Some(2.5));
    }

    #[test]
    fn test_metric_names_are_stable() {
        let names: Vec<_> = Metric::ALL.iter().map(Metric::name).collect();
        assert_eq!(
            names,
            vec![
                "execution_time_secs",
                "peak_memory_bytes",
                "avg_cpu_percent",
                "io_ops",
                "network_calls"
            ]
        );
    }
}
