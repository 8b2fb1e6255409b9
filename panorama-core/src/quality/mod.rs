//! Quality gates: deterministic rule evaluation over stage payloads.
//!
//! A gate is a ruleset (field checks with weights and critical flags) plus a
//! minimum score. Evaluation starts at 100, subtracts failed rule weights,
//! and passes only when the score clears the minimum and no critical rule
//! failed.

pub mod evaluator;
pub mod rules;

pub use evaluator::{QualityGateReport, RuleOutcome, evaluate};
pub use rules::{
    Rule, RuleCheck, RuleSet, drivers_ruleset, forecast_ruleset, objections_ruleset,
    research_ruleset, synthesis_ruleset,
};
