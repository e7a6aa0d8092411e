//! Analysis orchestration
//!
//! Resolves targets, runs them one at a time in the sandbox, classifies
//! their source when asked, runs comparisons and assembles reports. Load
//! failures become `unavailable` results; sandbox infrastructure faults are
//! collected per target so one failing target never stops the others.

use crate::comparison::ComparisonReport;
use crate::config::AnalyzerConfig;
use crate::error::{AnalysisError, SandboxError};
use crate::patterns::{PatternClassifier, PatternTagSet};
use crate::report::{aggregate, AnalysisReport, Suggestions};
use crate::result::{ExecutionResult, ExecutionStatus};
use crate::sandbox::Sandbox;
use crate::suggestions::{request_suggestions, OllamaClient, SuggestionRequest, SuggestionService};
use crate::target::AnalysisTarget;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// What to analyze
#[derive(Debug, Clone, Default)]
pub struct AnalysisRequest {
    pub targets: Vec<PathBuf>,
    /// Single test to select in every target
    pub test: Option<String>,
    /// Candidate compared against each target
    pub compare: Option<PathBuf>,
    /// Attach pattern tags
    pub patterns: bool,
}

/// Reports plus the targets that hit an infrastructure fault
#[derive(Debug, Default)]
pub struct AnalysisBatch {
    pub reports: Vec<AnalysisReport>,
    pub failures: Vec<(PathBuf, AnalysisError)>,
}

impl AnalysisBatch {
    pub fn all_succeeded(&self) -> bool {
        self.failures.is_empty() && self.reports.iter().all(AnalysisReport::is_success)
    }
}

enum Suggester {
    Disabled,
    Service(Box<dyn SuggestionService>),
    Broken(String),
}

pub struct Analyzer<'a> {
    config: &'a AnalyzerConfig,
    sandbox: Sandbox,
    classifier: PatternClassifier,
    suggester: Suggester,
}

impl<'a> Analyzer<'a> {
    pub fn new(config: &'a AnalyzerConfig) -> Result<Self, AnalysisError> {
        Ok(Self {
            config,
            sandbox: Sandbox::new(config),
            classifier: PatternClassifier::from_config(config)?,
            suggester: Suggester::Disabled,
        })
    }

    /// Use the configured Ollama endpoint for suggestions
    pub fn with_ollama(self) -> Self {
        match OllamaClient::new(&self.config.suggestions) {
            Ok(client) => self.with_suggestion_service(Box::new(client)),
            Err(err) => {
                tracing::warn!("suggestion client unavailable: {}", err);
                Self {
                    suggester: Suggester::Broken(err.to_string()),
                    ..self
                }
            }
        }
    }

    pub fn with_suggestion_service(self, service: Box<dyn SuggestionService>) -> Self {
        Self {
            suggester: Suggester::Service(service),
            ..self
        }
    }

    pub fn config(&self) -> &AnalyzerConfig {
        self.config
    }

    pub fn timeout(&self) -> Duration {
        self.config.timeout()
    }

    /// Resolve a path; a load failure yields an unresolved target and the error
    fn resolve(&self, path: &Path, test: Option<&str>) -> (AnalysisTarget, Option<ExecutionResult>) {
        let test = test.map(str::to_string);
        match AnalysisTarget::resolve(path, test.clone()) {
            Ok(target) => (target, None),
            Err(err) => {
                tracing::warn!("{}", err);
                let target = AnalysisTarget::unresolved(path, test);
                let sentinel = ExecutionResult::unavailable(target.clone(), &err);
                (target, Some(sentinel))
            }
        }
    }

    /// Run one target; load failures become the `unavailable` sentinel
    pub fn run_target(
        &self,
        target: &AnalysisTarget,
        timeout: Duration,
    ) -> Result<ExecutionResult, SandboxError> {
        match self.sandbox.run(target, timeout) {
            Ok(result) => Ok(result),
            Err(SandboxError::Load(err)) => {
                tracing::warn!("{}", err);
                Ok(ExecutionResult::unavailable(target.clone(), &err))
            }
            Err(err) => Err(err),
        }
    }

    fn run_repeated(
        &self,
        target: &AnalysisTarget,
        timeout: Duration,
    ) -> Result<Vec<ExecutionResult>, SandboxError> {
        let mut runs = Vec::with_capacity(self.config.comparison.repeat);
        for _ in 0..self.config.comparison.repeat {
            let result = self.run_target(target, timeout)?;
            let unavailable = result.status == ExecutionStatus::Unavailable;
            runs.push(result);
            if unavailable {
                break;
            }
        }
        Ok(runs)
    }

    /// Run `baseline` fully, then `candidate` fully, and compare them
    pub fn compare(
        &self,
        baseline: &AnalysisTarget,
        candidate: &AnalysisTarget,
        timeout: Duration,
    ) -> Result<ComparisonReport, AnalysisError> {
        if baseline.unit_name() != candidate.unit_name() {
            return Err(AnalysisError::IncomparableTargets {
                baseline: baseline.display_name(),
                candidate: candidate.display_name(),
            });
        }
        let a = self.run_repeated(baseline, timeout)?;
        let b = self.run_repeated(candidate, timeout)?;
        ComparisonReport::from_runs(a, b, &self.config.comparison)
    }

    pub fn classify(&self, target: &AnalysisTarget) -> Option<PatternTagSet> {
        match self.classifier.classify(target) {
            Ok(tags) => Some(tags),
            Err(err) => {
                tracing::warn!("pattern classification skipped: {}", err);
                None
            }
        }
    }

    fn suggest(&self, report: AnalysisReport) -> AnalysisReport {
        let suggestions = match &self.suggester {
            Suggester::Disabled => return report,
            Suggester::Broken(reason) => Suggestions::Unavailable {
                reason: reason.clone(),
            },
            Suggester::Service(service) => {
                let source = report.target.read_source().ok();
                let request = SuggestionRequest::from_report(
                    &report,
                    source.as_deref(),
                    self.config.suggestions.max_source_bytes,
                );
                request_suggestions(service.as_ref(), &request)
            }
        };
        report.with_suggestions(suggestions)
    }

    fn analyze_one(
        &self,
        path: &Path,
        request: &AnalysisRequest,
        timeout: Duration,
    ) -> Result<AnalysisReport, AnalysisError> {
        let test = request.test.as_deref();
        let (target, sentinel) = self.resolve(path, test);

        let (result, comparison) = match (&request.compare, sentinel) {
            (Some(other), sentinel) => {
                let (candidate, candidate_sentinel) = self.resolve(other, test);
                let comparison = match (sentinel, candidate_sentinel) {
                    (None, None) => self.compare(&target, &candidate, timeout)?,
                    (a, b) => {
                        let a = match a {
                            Some(a) => vec![a],
                            None => self.run_repeated(&target, timeout)?,
                        };
                        let b = match b {
                            Some(b) => vec![b],
                            None => self.run_repeated(&candidate, timeout)?,
                        };
                        ComparisonReport::from_runs(a, b, &self.config.comparison)?
                    }
                };
                (comparison.baseline.clone(), Some(comparison))
            }
            (None, Some(sentinel)) => (sentinel, None),
            (None, None) => (self.run_target(&target, timeout)?, None),
        };

        let patterns = if request.patterns && result.status != ExecutionStatus::Unavailable {
            self.classify(&target)
        } else {
            None
        };

        Ok(self.suggest(aggregate(result, patterns, comparison)))
    }

    /// Analyze every requested target in order
    pub fn analyze(&self, request: &AnalysisRequest) -> AnalysisBatch {
        let timeout = self.timeout();
        let mut batch = AnalysisBatch::default();
        for path in &request.targets {
            tracing::debug!(target = %path.display(), "analyzing");
            match self.analyze_one(path, request, timeout) {
                Ok(report) => batch.reports.push(report),
                Err(err) => {
                    tracing::warn!(target = %path.display(), "analysis failed: {}", err);
                    batch.failures.push((path.clone(), err));
                }
            }
        }
        batch
    }
}
