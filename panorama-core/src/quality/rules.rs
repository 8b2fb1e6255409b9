//! Quality gate rule model and the default per-stage rulesets.

use serde::{Deserialize, Serialize};

use crate::config::QualityConfig;

/// A single validation rule applied to a stage payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    /// Identifier cited in violation messages (e.g. "min_sources").
    pub name: String,
    /// Dot-separated path into the serialized payload. Empty = whole payload.
    pub field: String,
    pub check: RuleCheck,
    /// Score penalty when the rule fails.
    pub weight: u8,
    /// A failing critical rule rejects the stage regardless of score.
    pub critical: bool,
}

impl Rule {
    pub fn new(name: impl Into<String>, field: impl Into<String>, check: RuleCheck) -> Self {
        Self {
            name: name.into(),
            field: field.into(),
            check,
            weight: 10,
            critical: false,
        }
    }

    pub fn with_weight(mut self, weight: u8) -> Self {
        self.weight = weight;
        self
    }

    pub fn critical(mut self) -> Self {
        self.critical = true;
        self
    }
}

/// Comparator applied to the value at a rule's field path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuleCheck {
    /// Array at path has at least `min` elements.
    MinCount { min: usize },
    /// String at path (or summed string elements of an array) has at least
    /// `min` characters.
    MinLength { min: usize },
    /// Number at path is at least `min`.
    NumericMin { min: f64 },
    /// String at path contains `needle` (case-insensitive).
    Contains { needle: String },
    /// String at path does not contain `needle` (case-insensitive).
    NotContains { needle: String },
    /// The whole serialized payload contains none of `phrases`
    /// (case-insensitive). Penalty scales with the number of matches.
    ForbiddenPhrases { phrases: Vec<String> },
}

/// The rules guarding one stage, plus the gate's pass threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleSet {
    /// Minimum passing score (0-100).
    pub min_score: u8,
    /// Relative weight of this gate in the session-wide quality score.
    pub gate_weight: u32,
    pub rules: Vec<Rule>,
}

impl RuleSet {
    pub fn new(min_score: u8, rules: Vec<Rule>) -> Self {
        Self {
            min_score,
            gate_weight: 1,
            rules,
        }
    }

    pub fn with_gate_weight(mut self, gate_weight: u32) -> Self {
        self.gate_weight = gate_weight;
        self
    }
}

fn forbidden_phrases_rule(quality: &QualityConfig) -> Rule {
    Rule::new(
        "forbidden_phrases",
        "",
        RuleCheck::ForbiddenPhrases {
            phrases: quality.forbidden_phrases.clone(),
        },
    )
    .with_weight(10)
    .critical()
}

/// Gate for the research stage: enough sources, enough content, enough
/// distinct domains.
pub fn research_ruleset(quality: &QualityConfig) -> RuleSet {
    RuleSet::new(
        quality.min_score,
        vec![
            Rule::new(
                "min_sources",
                "sources",
                RuleCheck::MinCount {
                    min: quality.min_sources,
                },
            )
            .with_weight(40)
            .critical(),
            Rule::new(
                "min_content_length",
                "statistics.total_content_chars",
                RuleCheck::NumericMin {
                    min: quality.min_content_length as f64,
                },
            )
            .with_weight(25),
            Rule::new(
                "min_unique_domains",
                "statistics.unique_domains",
                RuleCheck::NumericMin {
                    min: quality.min_unique_domains as f64,
                },
            )
            .with_weight(15),
            forbidden_phrases_rule(quality),
        ],
    )
}

/// Gate for the synthesis stage: substantial prose in every section, no
/// placeholder boilerplate.
pub fn synthesis_ruleset(quality: &QualityConfig) -> RuleSet {
    RuleSet::new(
        quality.min_score,
        vec![
            Rule::new(
                "positioning_length",
                "positioning",
                RuleCheck::MinLength { min: 80 },
            )
            .with_weight(15),
            Rule::new(
                "overview_length",
                "market_overview",
                RuleCheck::MinLength { min: 300 },
            )
            .with_weight(25),
            Rule::new(
                "competitive_length",
                "competitive_landscape",
                RuleCheck::MinLength { min: 200 },
            )
            .with_weight(15),
            Rule::new(
                "min_opportunities",
                "opportunities",
                RuleCheck::MinCount { min: 3 },
            )
            .with_weight(15),
            Rule::new("min_risks", "risks", RuleCheck::MinCount { min: 2 }).with_weight(10),
            forbidden_phrases_rule(quality),
        ],
    )
    .with_gate_weight(2)
}

/// Gate for the drivers stage.
pub fn drivers_ruleset(quality: &QualityConfig) -> RuleSet {
    RuleSet::new(
        quality.min_score,
        vec![
            Rule::new("min_drivers", "drivers", RuleCheck::MinCount { min: 5 })
                .with_weight(40)
                .critical(),
            forbidden_phrases_rule(quality),
        ],
    )
}

/// Gate for the objections stage.
pub fn objections_ruleset(quality: &QualityConfig) -> RuleSet {
    RuleSet::new(
        quality.min_score,
        vec![
            Rule::new(
                "min_objections",
                "objections",
                RuleCheck::MinCount { min: 4 },
            )
            .with_weight(40)
            .critical(),
            forbidden_phrases_rule(quality),
        ],
    )
}

/// Gate for the forecast stage.
pub fn forecast_ruleset(quality: &QualityConfig) -> RuleSet {
    RuleSet::new(
        quality.min_score,
        vec![
            Rule::new("min_scenarios", "scenarios", RuleCheck::MinCount { min: 2 })
                .with_weight(30),
            Rule::new("min_signals", "signals", RuleCheck::MinCount { min: 1 }).with_weight(10),
            forbidden_phrases_rule(quality),
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_builder_defaults() {
        let rule = Rule::new("min_sources", "sources", RuleCheck::MinCount { min: 8 });
        assert_eq!(rule.weight, 10);
        assert!(!rule.critical);

        let rule = rule.with_weight(40).critical();
        assert_eq!(rule.weight, 40);
        assert!(rule.critical);
    }

    #[test]
    fn test_rule_check_serde_tag() {
        let check = RuleCheck::NumericMin { min: 5.0 };
        let value = serde_json::to_value(&check).unwrap();
        assert_eq!(value["type"], "numeric_min");
        assert_eq!(value["min"], 5.0);
    }

    #[test]
    fn test_research_ruleset_uses_configured_thresholds() {
        let mut quality = QualityConfig::default();
        quality.min_sources = 3;
        quality.min_score = 60;

        let ruleset = research_ruleset(&quality);
        assert_eq!(ruleset.min_score, 60);
        let min_sources = ruleset
            .rules
            .iter()
            .find(|r| r.name == "min_sources")
            .unwrap();
        assert!(min_sources.critical);
        assert_eq!(min_sources.check, RuleCheck::MinCount { min: 3 });
    }

    #[test]
    fn test_every_default_ruleset_scans_for_forbidden_phrases() {
        let quality = QualityConfig::default();
        for ruleset in [
            research_ruleset(&quality),
            synthesis_ruleset(&quality),
            drivers_ruleset(&quality),
            objections_ruleset(&quality),
            forecast_ruleset(&quality),
        ] {
            assert!(
                ruleset
                    .rules
                    .iter()
                    .any(|r| r.name == "forbidden_phrases" && r.critical),
                "ruleset missing forbidden phrase scan"
            );
        }
    }
}
