//! Rule evaluation over scanned source

use super::rules::{default_rules, RuleKind, RuleSpec};
use super::scanner::{scan_plain, scan_python, CodeLine, SourceStructure};
use super::{PatternTag, PatternTagSet};
use crate::config::AnalyzerConfig;
use crate::error::{ConfigError, LoadError};
use crate::target::{AnalysisTarget, SourceLanguage};
use regex::Regex;
use std::collections::BTreeSet;

#[derive(Debug, Clone)]
enum Matcher {
    Single(Regex),
    Pair { trigger: Regex, companion: Regex },
}

#[derive(Debug, Clone)]
struct CompiledRule {
    spec: RuleSpec,
    matcher: Matcher,
}

/// Tags targets using a compiled taxonomy table
#[derive(Debug, Clone)]
pub struct PatternClassifier {
    rules: Vec<CompiledRule>,
}

impl PatternClassifier {
    /// Compile a taxonomy table
    pub fn new(rules: Vec<RuleSpec>) -> Result<Self, ConfigError> {
        let rules = rules
            .into_iter()
            .map(compile)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { rules })
    }

    /// The built-in taxonomy
    pub fn default_taxonomy() -> Result<Self, ConfigError> {
        Self::new(default_rules())
    }

    /// Built-in taxonomy overlaid with `[[patterns]]`, minus `disabled_patterns`
    pub fn from_config(config: &AnalyzerConfig) -> Result<Self, ConfigError> {
        let mut rules = default_rules();
        for spec in &config.patterns {
            match rules.iter_mut().find(|r| r.id == spec.id) {
                Some(existing) => *existing = spec.clone(),
                None => rules.push(spec.clone()),
            }
        }
        rules.retain(|r| !config.disabled_patterns.contains(&r.id));
        rules.sort_by(|a, b| a.id.cmp(&b.id));
        Self::new(rules)
    }

    pub fn rule_ids(&self) -> impl Iterator<Item = &str> {
        self.rules.iter().map(|r| r.spec.id.as_str())
    }

    /// Read and classify a target's source
    pub fn classify(&self, target: &AnalysisTarget) -> Result<PatternTagSet, LoadError> {
        let source = target.read_source()?;
        Ok(self.classify_source(target.language(), &source))
    }

    pub fn classify_source(&self, language: SourceLanguage, source: &str) -> PatternTagSet {
        let structure = match language {
            SourceLanguage::Python => scan_python(source),
            SourceLanguage::Shell | SourceLanguage::Other => scan_plain(source),
        };

        let mut tags = PatternTagSet::new();
        for rule in &self.rules {
            if !rule.spec.applies_to(language) {
                continue;
            }
            if rule.spec.rule.needs_structure() && !structure.structured {
                tracing::debug!(rule = %rule.spec.id, "skipping structural rule for unstructured source");
                continue;
            }
            if let Some(lines) = evaluate(rule, &structure) {
                tags.insert(PatternTag {
                    id: rule.spec.id.clone(),
                    severity: rule.spec.severity,
                    confidence: rule.spec.confidence,
                    lines,
                    description: rule.spec.description.clone(),
                });
            }
        }
        tags
    }
}

fn compile(spec: RuleSpec) -> Result<CompiledRule, ConfigError> {
    if !(0.0..=1.0).contains(&spec.confidence) {
        return Err(ConfigError::Invalid(format!(
            "pattern {} confidence must be within [0, 1], got {}",
            spec.id, spec.confidence
        )));
    }
    if spec.id.trim().is_empty() {
        return Err(ConfigError::Invalid("pattern id must not be empty".to_string()));
    }

    let regex = |pattern: &str| {
        Regex::new(pattern).map_err(|source| ConfigError::Regex {
            id: spec.id.clone(),
            source,
        })
    };

    let matcher = match &spec.rule {
        RuleKind::LineMatch { pattern }
        | RuleKind::TestContains { pattern }
        | RuleKind::TestMissing { pattern }
        | RuleKind::AbsentInTests { pattern }
        | RuleKind::InLoop { pattern }
        | RuleKind::Decorated { pattern }
        | RuleKind::UnpairedSetup { pattern } => Matcher::Single(regex(pattern)?),
        RuleKind::RequiresCompanion { trigger, companion } => Matcher::Pair {
            trigger: regex(trigger)?,
            companion: regex(companion)?,
        },
    };

    Ok(CompiledRule { spec, matcher })
}

fn matching<'a, I>(lines: I, re: &'a Regex) -> impl Iterator<Item = u32> + 'a
where
    I: Iterator<Item = &'a CodeLine> + 'a,
{
    lines
        .filter(|l| !l.is_blank() && re.is_match(&l.code))
        .map(|l| l.number)
}

fn test_lines(structure: &SourceStructure) -> impl Iterator<Item = &CodeLine> {
    structure.tests().flat_map(|t| structure.body(t).iter())
}

fn non_empty(lines: BTreeSet<u32>) -> Option<Vec<u32>> {
    (!lines.is_empty()).then(|| lines.into_iter().collect())
}

/// Lines the rule fired on, or `None` when it did not fire
fn evaluate(rule: &CompiledRule, structure: &SourceStructure) -> Option<Vec<u32>> {
    match (&rule.spec.rule, &rule.matcher) {
        (RuleKind::LineMatch { .. }, Matcher::Single(re)) => {
            non_empty(matching(structure.lines.iter(), re).collect())
        }
        (RuleKind::TestContains { .. }, Matcher::Single(re)) => {
            non_empty(matching(test_lines(structure), re).collect())
        }
        (RuleKind::InLoop { .. }, Matcher::Single(re)) => {
            non_empty(matching(structure.lines.iter().filter(|l| l.in_loop), re).collect())
        }
        (RuleKind::TestMissing { .. }, Matcher::Single(re)) => non_empty(
            structure
                .tests()
                .filter(|t| matching(structure.body(t).iter(), re).next().is_none())
                .map(|t| t.line_number())
                .collect(),
        ),
        (RuleKind::AbsentInTests { .. }, Matcher::Single(re)) => {
            if !structure.has_tests() || matching(test_lines(structure), re).next().is_some() {
                return None;
            }
            non_empty(structure.tests().map(|t| t.line_number()).collect())
        }
        (RuleKind::Decorated { .. }, Matcher::Single(re)) => non_empty(
            structure
                .functions
                .iter()
                .filter(|f| f.decorated_with(re))
                .map(|f| f.line_number())
                .collect(),
        ),
        (RuleKind::UnpairedSetup { .. }, Matcher::Single(re)) => non_empty(
            structure
                .functions
                .iter()
                .filter(|f| f.is_setup())
                .filter(|setup| {
                    !structure
                        .functions
                        .iter()
                        .any(|f| f.is_teardown() && f.class == setup.class)
                })
                .filter(|setup| matching(structure.body(setup).iter(), re).next().is_none())
                .map(|f| f.line_number())
                .collect(),
        ),
        (RuleKind::RequiresCompanion { .. }, Matcher::Pair { trigger, companion }) => {
            if matching(structure.lines.iter(), companion).next().is_some() {
                return None;
            }
            non_empty(matching(structure.lines.iter(), trigger).collect())
        }
        _ => None,
    }
}
