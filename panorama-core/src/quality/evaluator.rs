//! Deterministic quality gate evaluation.
//!
//! `evaluate` is pure: it reads only the payload and the ruleset, so
//! identical inputs always produce identical reports. No clock, no
//! randomness, no IO.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::quality::rules::{Rule, RuleCheck, RuleSet};
use crate::types::StagePayload;

/// The result of gating one stage's payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityGateReport {
    pub stage: String,
    pub outcomes: Vec<RuleOutcome>,
    /// 100 minus the weights of failed rules, floored at 0.
    pub score: u8,
    pub violations: Vec<String>,
    pub critical_failure: bool,
    /// Score at or above the gate minimum and no critical rule failed.
    pub passed: bool,
}

/// Pass/fail record for one rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleOutcome {
    pub rule: String,
    pub passed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Evaluate a stage payload against a ruleset.
pub fn evaluate(stage: &str, payload: &StagePayload, ruleset: &RuleSet) -> QualityGateReport {
    let value = serde_json::to_value(payload).unwrap_or(Value::Null);

    let mut outcomes = Vec::with_capacity(ruleset.rules.len());
    let mut violations = Vec::new();
    let mut penalty: u32 = 0;
    let mut critical_failure = false;

    for rule in &ruleset.rules {
        let (passed, detail, rule_penalty) = apply_rule(rule, &value);
        if !passed {
            let message = format!("{}: {}", rule.name, detail);
            violations.push(message.clone());
            penalty = penalty.saturating_add(rule_penalty);
            if rule.critical {
                critical_failure = true;
            }
            outcomes.push(RuleOutcome {
                rule: rule.name.clone(),
                passed: false,
                message: Some(message),
            });
        } else {
            outcomes.push(RuleOutcome {
                rule: rule.name.clone(),
                passed: true,
                message: None,
            });
        }
    }

    let score = 100u32.saturating_sub(penalty) as u8;
    let passed = score >= ruleset.min_score && !critical_failure;

    QualityGateReport {
        stage: stage.to_string(),
        outcomes,
        score,
        violations,
        critical_failure,
        passed,
    }
}

/// Apply one rule. Returns (passed, failure detail, penalty).
fn apply_rule(rule: &Rule, payload: &Value) -> (bool, String, u32) {
    let base = u32::from(rule.weight);
    match &rule.check {
        RuleCheck::MinCount { min } => match lookup(payload, &rule.field).and_then(Value::as_array)
        {
            Some(items) if items.len() >= *min => (true, String::new(), 0),
            Some(items) => (
                false,
                format!("expected at least {} item(s), found {}", min, items.len()),
                base,
            ),
            None => (
                false,
                format!("field '{}' is not a list", rule.field),
                base,
            ),
        },
        RuleCheck::MinLength { min } => match string_length(lookup(payload, &rule.field)) {
            Some(len) if len >= *min => (true, String::new(), 0),
            Some(len) => (
                false,
                format!("expected at least {} character(s), found {}", min, len),
                base,
            ),
            None => (
                false,
                format!("field '{}' is not text", rule.field),
                base,
            ),
        },
        RuleCheck::NumericMin { min } => match lookup(payload, &rule.field).and_then(Value::as_f64)
        {
            Some(n) if n >= *min => (true, String::new(), 0),
            Some(n) => (false, format!("expected at least {}, found {}", min, n), base),
            None => (
                false,
                format!("field '{}' is not a number", rule.field),
                base,
            ),
        },
        RuleCheck::Contains { needle } => match lookup(payload, &rule.field).and_then(Value::as_str)
        {
            Some(text) if contains_ci(text, needle) => (true, String::new(), 0),
            Some(_) => (false, format!("missing required text '{}'", needle), base),
            None => (
                false,
                format!("field '{}' is not text", rule.field),
                base,
            ),
        },
        RuleCheck::NotContains { needle } => {
            match lookup(payload, &rule.field).and_then(Value::as_str) {
                Some(text) if contains_ci(text, needle) => {
                    (false, format!("contains banned text '{}'", needle), base)
                }
                Some(_) => (true, String::new(), 0),
                None => (
                    false,
                    format!("field '{}' is not text", rule.field),
                    base,
                ),
            }
        }
        RuleCheck::ForbiddenPhrases { phrases } => {
            let target = match lookup(payload, &rule.field) {
                Some(v) => v,
                None => payload,
            };
            let serialized = serde_json::to_string(target)
                .unwrap_or_default()
                .to_lowercase();
            let mut matched = Vec::new();
            let mut matches: u32 = 0;
            for phrase in phrases {
                let count = serialized.matches(&phrase.to_lowercase()).count() as u32;
                if count > 0 {
                    matches = matches.saturating_add(count);
                    matched.push(phrase.clone());
                }
            }
            if matches == 0 {
                (true, String::new(), 0)
            } else {
                // Penalty scales with how much boilerplate leaked through.
                (
                    false,
                    format!(
                        "{} forbidden phrase match(es): {}",
                        matches,
                        matched.join(", ")
                    ),
                    base.saturating_mul(matches),
                )
            }
        }
    }
}

/// Walk a dot-separated path into a JSON value. Empty path is the value itself.
fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(value);
    }
    let mut current = value;
    for segment in path.split('.') {
        current = current.get(segment)?;
    }
    Some(current)
}

/// Character count of a string, or the summed count of an array of strings.
fn string_length(value: Option<&Value>) -> Option<usize> {
    match value? {
        Value::String(s) => Some(s.chars().count()),
        Value::Array(items) => {
            let mut total = 0;
            for item in items {
                total += item.as_str()?.chars().count();
            }
            Some(total)
        }
        _ => None,
    }
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}
