//! Taxonomy table: pattern rules and the built-in defaults

use super::Severity;
use crate::target::SourceLanguage;
use serde::{Deserialize, Serialize};

/// How a rule decides whether it fires
///
/// Patterns are regular expressions matched against stripped code lines
/// (comments removed, string contents emptied).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RuleKind {
    /// Any code line matches
    LineMatch { pattern: String },
    /// A line inside a test function matches
    TestContains { pattern: String },
    /// Some test function has no matching line; fires on its `def` line
    TestMissing { pattern: String },
    /// `trigger` matches somewhere and `companion` matches nowhere
    RequiresCompanion { trigger: String, companion: String },
    /// The file defines tests and no line of any test matches
    AbsentInTests { pattern: String },
    /// A line inside a loop body matches
    InLoop { pattern: String },
    /// A `def` carries a decorator matching `pattern`; fires on the `def` line
    Decorated { pattern: String },
    /// A setup hook has no teardown hook in its class (or module) and no
    /// body line matching `pattern`; fires on the setup `def` line
    UnpairedSetup { pattern: String },
}

impl RuleKind {
    /// Whether the rule needs recovered `def`/loop structure
    pub fn needs_structure(&self) -> bool {
        !matches!(
            self,
            RuleKind::LineMatch { .. } | RuleKind::RequiresCompanion { .. }
        )
    }
}

fn default_languages() -> Vec<SourceLanguage> {
    vec![SourceLanguage::Python]
}

/// One taxonomy entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleSpec {
    pub id: String,
    pub severity: Severity,
    /// Confidence attached to tags produced by this rule, in `[0, 1]`
    pub confidence: f64,
    #[serde(default)]
    pub description: String,
    /// Languages the rule applies to
    #[serde(default = "default_languages")]
    pub languages: Vec<SourceLanguage>,
    pub rule: RuleKind,
}

impl RuleSpec {
    fn python(id: &str, severity: Severity, confidence: f64, description: &str, rule: RuleKind) -> Self {
        Self {
            id: id.to_string(),
            severity,
            confidence,
            description: description.to_string(),
            languages: default_languages(),
            rule,
        }
    }

    pub fn applies_to(&self, language: SourceLanguage) -> bool {
        self.languages.contains(&language)
    }
}

/// Writes to module-level or class-level state from inside a test
const SHARED_STATE: &str = r"^\s*global\s+\w|\bcls\.\w+\s*=[^=]|\b[A-Z][A-Z0-9_]+\s*(\[[^\]]*\])?\s*(\+|-)?=[^=]|\b[A-Z][A-Z0-9_]+\.(append|extend|update|pop|clear|add)\(";

fn line_match(pattern: &str) -> RuleKind {
    RuleKind::LineMatch {
        pattern: pattern.to_string(),
    }
}

fn test_contains(pattern: &str) -> RuleKind {
    RuleKind::TestContains {
        pattern: pattern.to_string(),
    }
}

/// Built-in taxonomy, ordered by id
pub fn default_rules() -> Vec<RuleSpec> {
    use Severity::{High, Info, Low, Medium};

    let mut rules = vec![
        RuleSpec::python(
            "broad-exception-catch",
            High,
            0.9,
            "bare or catch-all exception handler hides failures",
            line_match(r"^\s*except\s*(:|[^:]*\b(Exception|BaseException)\b)"),
        ),
        RuleSpec::python(
            "fixture-usage",
            Info,
            0.8,
            "uses pytest fixtures",
            RuleKind::Decorated {
                pattern: r"^@(pytest\.)?fixture\b".to_string(),
            },
        ),
        RuleSpec::python(
            "independent-test",
            Info,
            0.6,
            "tests share no module-level mutable state",
            RuleKind::AbsentInTests {
                pattern: SHARED_STATE.to_string(),
            },
        ),
        RuleSpec::python(
            "missing-assertion",
            Medium,
            0.8,
            "test function never asserts anything",
            RuleKind::TestMissing {
                pattern: r"\bassert\b|\.assert\w*\(|\bpytest\.(raises|warns|fail)\(|\bself\.fail\(|\.fail\w*\("
                    .to_string(),
            },
        ),
        RuleSpec::python(
            "missing-cleanup",
            Medium,
            0.6,
            "acquires a resource without a visible release",
            RuleKind::RequiresCompanion {
                trigger: r"\bopen\(|\btempfile\.mk(d|s)?temp\(|\bsocket\.socket\(|\.connect\(|\bsubprocess\.Popen\("
                    .to_string(),
                companion: r"^\s*(async\s+)?with\b|\.close\(\)|\baddCleanup\(|\bshutil\.rmtree\(|\bos\.(remove|unlink)\(|^\s*finally\s*:|\.terminate\(\)|\.kill\(\)"
                    .to_string(),
            },
        ),
        RuleSpec::python(
            "parametrized-test",
            Info,
            0.9,
            "tests are parametrized",
            line_match(r"@pytest\.mark\.parametrize\b|\bself\.subTest\("),
        ),
        RuleSpec::python(
            "print-in-test",
            Low,
            0.7,
            "test writes to stdout instead of asserting",
            test_contains(r"\bprint\("),
        ),
        RuleSpec::python(
            "setup-without-teardown",
            Low,
            0.7,
            "setup hook without a matching teardown",
            RuleKind::UnpairedSetup {
                pattern: r"\baddCleanup\(|\baddClassCleanup\(|\byield\b".to_string(),
            },
        ),
        RuleSpec::python(
            "shared-global-state",
            Medium,
            0.7,
            "tests mutate module- or class-level state",
            test_contains(SHARED_STATE),
        ),
        RuleSpec::python(
            "sleep-in-test",
            Medium,
            0.8,
            "test waits on wall-clock time",
            test_contains(r"\b(time\.)?sleep\("),
        ),
        RuleSpec::python(
            "string-concat-in-loop",
            Low,
            0.6,
            "string built by repeated concatenation inside a loop",
            RuleKind::InLoop {
                pattern: r#"\+=\s*(f?["']|str\(|\w+\.(upper|lower|strip|title|capitalize|format|join)\()"#
                    .to_string(),
            },
        ),
        RuleSpec::python(
            "timing-assertion",
            Medium,
            0.6,
            "assertion depends on measured time",
            test_contains(r"\bassert\w*\b.*\b(time|elapsed|duration|perf_counter|monotonic)\b"),
        ),
        RuleSpec::python(
            "unseeded-random",
            Low,
            0.6,
            "uses random values without seeding",
            RuleKind::RequiresCompanion {
                trigger: r"\brandom\.(random|randint|choice|choices|shuffle|sample|uniform|randrange)\(|\bnp\.random\.\w+\("
                    .to_string(),
                companion: r"\b(random|np\.random)\.seed\(|\bRandom\(\s*\d".to_string(),
            },
        ),
    ];

    rules.push(RuleSpec {
        id: "missing-errexit".to_string(),
        severity: Low,
        confidence: 0.7,
        description: "shell script keeps running after a failing command".to_string(),
        languages: vec![SourceLanguage::Shell],
        rule: RuleKind::RequiresCompanion {
            trigger: r"\S".to_string(),
            companion: r"^\s*set\s+-[a-zA-Z]*e|^\s*set\s+-o\s+errexit".to_string(),
        },
    });

    rules.sort_by(|a, b| a.id.cmp(&b.id));
    rules
}

#[cfg(test)]
mod tests {
    use super::*;
    use regex::Regex;

    #[test]
    fn test_default_ids_are_unique_and_sorted() {
        let rules = default_rules();
        let ids: Vec<_> = rules.iter().map(|r| r.id.as_str()).collect();
        let mut sorted = ids.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(ids, sorted);
        assert_eq!(ids.len(), 14);
    }

    #[test]
    fn test_default_patterns_compile() {
        for rule in default_rules() {
            let patterns: Vec<&String> = match &rule.rule {
                RuleKind::LineMatch { pattern }
                | RuleKind::TestContains { pattern }
                | RuleKind::TestMissing { pattern }
                | RuleKind::AbsentInTests { pattern }
                | RuleKind::InLoop { pattern }
                | RuleKind::Decorated { pattern }
                | RuleKind::UnpairedSetup { pattern } => vec![pattern],
                RuleKind::RequiresCompanion { trigger, companion } => vec![trigger, companion],
            };
            for p in patterns {
                assert!(Regex::new(p).is_ok(), "{}: {}", rule.id, p);
            }
            assert!((0.0..=1.0).contains(&rule.confidence));
        }
    }

    #[test]
    fn test_broad_exception_pattern() {
        let rules = default_rules();
        let Some(RuleKind::LineMatch { pattern }) = rules
            .iter()
            .find(|r| r.id == "broad-exception-catch")
            .map(|r| &r.rule)
        else {
            panic!("broad-exception-catch must be a line rule");
        };
        let re = Regex::new(pattern).unwrap();
        assert!(re.is_match("    except:"));
        assert!(re.is_match("    except Exception as e:"));
        assert!(re.is_match("except (Exception, KeyError):"));
        assert!(re.is_match("except BaseException:"));
        assert!(!re.is_match("    except ValueError:"));
        assert!(re.is_match("    except (ValueError, Exception):"));
        assert!(re.is_match("    except (KeyError, BaseException) as err:"));
        assert!(!re.is_match("    except ExceptionGroupError:"));
        assert!(!re.is_match("    except (ValueError, MyException):"));
    }

    #[test]
    fn test_rule_spec_toml_defaults_language() {
        let spec: RuleSpec = toml::from_str(
            r#"
            id = "x"
            severity = "critical"
            confidence = 1.0
            rule = { kind = "in_loop", pattern = "append" }
            "#,
        )
        .unwrap();
        assert_eq!(spec.severity, Severity::Critical);
        assert_eq!(spec.languages, vec![SourceLanguage::Python]);
        assert!(spec.rule.needs_structure());
    }
}
