// Comparison scenarios built from synthetic run results

use super::*;
use crate::config::ComparisonConfig;
use crate::error::{AnalysisError, LoadError};
use crate::metrics::{Metric, MetricSummary};
use crate::result::{ErrorInfo, ExecutionResult, ExecutionStatus, Hotspot};
use crate::target::AnalysisTarget;
use std::path::PathBuf;

fn run(path: &str, test: Option<&str>, secs: f64, memory: u64) -> ExecutionResult {
    let mut result = ExecutionResult::unavailable(
        AnalysisTarget::unresolved(path, test.map(str::to_string)),
        &LoadError::Missing {
            path: PathBuf::from(path),
        },
    );
    result.status = ExecutionStatus::Success;
    result.error = None;
    result.exit_code = Some(0);
    result.wall_time_secs = secs;
    result.summary = MetricSummary {
        execution_time_secs: secs,
        peak_memory_bytes: memory,
        avg_cpu_percent: 90.0,
        max_cpu_percent: 100.0,
        io_ops: 12,
        network_calls: 0,
        sample_count: 5,
    };
    result
}

fn failed(path: &str, class: &str) -> ExecutionResult {
    let mut result = run(path, None, 0.2, 1000);
    result.status = ExecutionStatus::Failure;
    result.exit_code = Some(1);
    result.error = Some(ErrorInfo::new(class, "boom"));
    result
}

/// Self-comparison: every delta is zero and unchanged
#[test]
fn test_self_comparison_is_zero() {
    let a = run("impl.py", None, 1.25, 4_000_000);
    let report =
        ComparisonReport::from_results(a.clone(), a, &ComparisonConfig::default()).unwrap();

    assert_eq!(report.outcome, ComparisonOutcome::Measured);
    assert_eq!(report.deltas.len(), Metric::ALL.len());
    for (name, delta) in &report.deltas {
        assert_eq!(delta.absolute, 0.0, "{name}");
        assert_eq!(delta.verdict, Verdict::Unchanged, "{name}");
        match name.as_str() {
            // Zero baseline: relative change undefined
            "network_calls" => assert_eq!(delta.relative, None),
            _ => assert_eq!(delta.relative, Some(0.0), "{name}"),
        }
    }
    assert!(!report.has_regression());
}

/// Slower and larger candidate regresses on time and memory only
#[test]
fn test_slower_candidate_regresses() {
    let a = run("linear.py", None, 0.5, 10_000_000);
    let b = run("quadratic.py", None, 2.0, 30_000_000);
    let report = ComparisonReport::from_results(a, b, &ComparisonConfig::default()).unwrap();

    let time = report.delta(Metric::ExecutionTimeSecs).unwrap();
    assert_eq!(time.absolute, 1.5);
    assert_eq!(time.relative, Some(3.0));
    assert_eq!(time.verdict, Verdict::Regression);

    assert_eq!(
        report.regressions(),
        vec!["execution_time_secs", "peak_memory_bytes"]
    );
    assert!(report.improvements().is_empty());
}

/// Faster candidate is an improvement
#[test]
fn test_faster_candidate_improves() {
    let a = run("slow.py", None, 2.0, 1000);
    let b = run("fast.py", None, 1.0, 1000);
    let report = ComparisonReport::from_results(a, b, &ComparisonConfig::default()).unwrap();
    assert_eq!(report.improvements(), vec!["execution_time_secs"]);
}

/// Differences inside the noise threshold are unchanged
#[test]
fn test_noise_is_unchanged() {
    let a = run("a.py", None, 1.00, 1000);
    let b = run("b.py", None, 1.03, 1000);
    let report = ComparisonReport::from_results(a, b, &ComparisonConfig::default()).unwrap();
    assert_eq!(
        report.delta(Metric::ExecutionTimeSecs).unwrap().verdict,
        Verdict::Unchanged
    );

    let strict = ComparisonConfig {
        noise_threshold: 0.0,
        repeat: 1,
    };
    let a = run("a.py", None, 1.00, 1000);
    let b = run("b.py", None, 1.03, 1000);
    let report = ComparisonReport::from_results(a, b, &strict).unwrap();
    assert_eq!(
        report.delta(Metric::ExecutionTimeSecs).unwrap().verdict,
        Verdict::Regression
    );
}

/// Same failure on both sides: no deltas
#[test]
fn test_identical_failures_have_no_measurable_difference() {
    let report = ComparisonReport::from_results(
        failed("a.py", "ZeroDivisionError"),
        failed("b.py", "ZeroDivisionError"),
        &ComparisonConfig::default(),
    )
    .unwrap();
    assert_eq!(report.outcome, ComparisonOutcome::NoMeasurableDifference);
    assert!(report.deltas.is_empty());
    assert!(report.to_report_string().contains("No measurable difference"));
}

/// Different failures are still measured
#[test]
fn test_different_failures_are_measured() {
    let report = ComparisonReport::from_results(
        failed("a.py", "ZeroDivisionError"),
        failed("b.py", "KeyError"),
        &ComparisonConfig::default(),
    )
    .unwrap();
    assert_eq!(report.outcome, ComparisonOutcome::Measured);
}

/// Unavailable side yields no deltas
#[test]
fn test_unavailable_candidate() {
    let a = run("a.py", None, 1.0, 1000);
    let b = ExecutionResult::unavailable(
        AnalysisTarget::unresolved("b.py", None),
        &LoadError::Missing {
            path: PathBuf::from("b.py"),
        },
    );
    let report = ComparisonReport::from_results(a, b, &ComparisonConfig::default()).unwrap();
    assert_eq!(report.outcome, ComparisonOutcome::CandidateUnavailable);
    assert!(report.deltas.is_empty());
}

/// Units must match
#[test]
fn test_different_units_are_incomparable() {
    let a = run("a.py", Some("test_x"), 1.0, 1000);
    let b = run("b.py", Some("test_y"), 1.0, 1000);
    let err = ComparisonReport::from_results(a, b, &ComparisonConfig::default()).unwrap_err();
    assert!(matches!(err, AnalysisError::IncomparableTargets { .. }));
}

/// Repeated runs compare medians, so one outlier does not flip the verdict
#[test]
fn test_repeat_uses_medians() {
    let baseline = vec![
        run("a.py", None, 1.0, 1000),
        run("a.py", None, 1.0, 1000),
        run("a.py", None, 1.0, 1000),
    ];
    let candidate = vec![
        run("b.py", None, 1.0, 1000),
        run("b.py", None, 9.0, 1000),
        run("b.py", None, 1.01, 1000),
    ];
    let report =
        ComparisonReport::from_runs(baseline, candidate, &ComparisonConfig::default()).unwrap();
    let time = report.delta(Metric::ExecutionTimeSecs).unwrap();
    assert_eq!(time.candidate, 1.01);
    assert_eq!(time.verdict, Verdict::Unchanged);
    assert_eq!(report.repeat, 3);
    assert!(report.to_report_string().contains("Medians of 3 runs"));
}

#[test]
fn test_empty_runs_are_rejected() {
    let err = ComparisonReport::from_runs(
        Vec::new(),
        vec![run("b.py", None, 1.0, 1)],
        &ComparisonConfig::default(),
    )
    .unwrap_err();
    assert!(matches!(err, AnalysisError::EmptyComparison));
}

#[test]
fn test_report_string_lists_metrics() {
    let a = run("a.py", None, 1.0, 1000);
    let b = run("b.py", None, 2.0, 1000);
    let text = ComparisonReport::from_results(a, b, &ComparisonConfig::default())
        .unwrap()
        .to_report_string();
    assert!(text.starts_with("=== Comparison: a.py vs b.py ==="));
    assert!(text.contains("execution_time_secs"));
    assert!(text.contains("+100.0%"));
    assert!(text.contains("regression"));
}

#[test]
fn test_report_string_names_top_hotspot() {
    let a = run("a.py", None, 1.0, 1000);
    let mut b = run("b.py", None, 2.0, 1000);
    b.hotspots = vec![Hotspot {
        function: "nested_scan".to_string(),
        file: "b.py".to_string(),
        line: 3,
        calls: 1,
        total_secs: 1.5,
        cumulative_secs: 1.9,
    }];
    let text = ComparisonReport::from_results(a, b, &ComparisonConfig::default())
        .unwrap()
        .to_report_string();
    assert!(!text.contains("Top hotspot (baseline)"));
    assert!(text.contains("Top hotspot (candidate): nested_scan (b.py:3) - 1 calls, 1.900s cumulative"));
}

#[test]
fn test_report_serializes_verdicts() {
    let a = run("a.py", None, 1.0, 1000);
    let b = run("b.py", None, 2.0, 1000);
    let report = ComparisonReport::from_results(a, b, &ComparisonConfig::default()).unwrap();
    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["outcome"], "measured");
    assert_eq!(
        json["deltas"]["execution_time_secs"]["verdict"],
        "regression"
    );
}
