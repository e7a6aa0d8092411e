//! Pattern classification of target source
//!
//! Tags a target with ids from a configurable taxonomy table. Each rule is
//! evaluated independently against the output of the line [`scanner`], so
//! classification is deterministic for a given source text and table.
//!
//! # Example
//!
//! ```
//! use codeprof::patterns::PatternClassifier;
//! use codeprof::target::SourceLanguage;
//!
//! # fn main() -> Result<(), codeprof::error::ConfigError> {
//! let classifier = PatternClassifier::default_taxonomy()?;
//! let source = "def test_parse():\n    try:\n        parse()\n    except:\n        pass\n";
//! let tags = classifier.classify_source(SourceLanguage::Python, source);
//!
//! assert!(tags.contains("broad-exception-catch"));
//! assert!(tags.contains("missing-assertion"));
//! # Ok(())
//! # }
//! ```

pub mod classifier;
pub mod rules;
pub mod scanner;

pub use classifier::PatternClassifier;
pub use rules::{default_rules, RuleKind, RuleSpec};

use serde::{Deserialize, Serialize};

/// Severity of a pattern tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational, often a positive practice
    Info,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

/// One taxonomy label attached to a target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternTag {
    pub id: String,
    pub severity: Severity,
    pub confidence: f64,
    /// Sorted 1-based lines that made the rule fire
    pub lines: Vec<u32>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

/// Tags of one target: at most one per id, ordered by id
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<PatternTag>", into = "Vec<PatternTag>")]
pub struct PatternTagSet {
    tags: Vec<PatternTag>,
}

impl PatternTagSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a tag, replacing an existing tag with the same id
    pub fn insert(&mut self, tag: PatternTag) {
        match self.tags.binary_search_by(|t| t.id.as_str().cmp(&tag.id)) {
            Ok(pos) => self.tags[pos] = tag,
            Err(pos) => self.tags.insert(pos, tag),
        }
    }

    pub fn get(&self, id: &str) -> Option<&PatternTag> {
        self.tags
            .binary_search_by(|t| t.id.as_str().cmp(id))
            .ok()
            .map(|pos| &self.tags[pos])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PatternTag> {
        self.tags.iter()
    }

    pub fn ids(&self) -> Vec<&str> {
        self.tags.iter().map(|t| t.id.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    pub fn max_severity(&self) -> Option<Severity> {
        self.tags.iter().map(|t| t.severity).max()
    }
}

impl From<Vec<PatternTag>> for PatternTagSet {
    fn from(tags: Vec<PatternTag>) -> Self {
        let mut set = Self::new();
        for tag in tags {
            set.insert(tag);
        }
        set
    }
}

impl From<PatternTagSet> for Vec<PatternTag> {
    fn from(set: PatternTagSet) -> Self {
        set.tags
    }
}
