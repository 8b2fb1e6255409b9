//! Consolidation of a finished session into the final report.
//!
//! Merges every successful stage payload into a section map, strips bulk
//! fields (fetched page text never leaves the pipeline), computes the
//! weighted session quality score over mandatory gates, and stamps
//! processing metadata. A session missing a mandatory payload cannot be
//! consolidated.

use std::collections::BTreeMap;

use chrono::Utc;
use serde_json::{json, Value};
use tracing::debug;

use crate::error::ConsolidateError;
use crate::pipeline::stage::StagePlan;
use crate::session::{GateScore, Session, StageStatus};
use crate::types::{FinalReport, ReportMetadata, ResearchSummary, StagePayload};

/// Build the final report from a session's recorded results.
pub fn consolidate(session: &Session, plan: &StagePlan) -> Result<FinalReport, ConsolidateError> {
    let missing: Vec<String> = plan
        .stages
        .iter()
        .filter(|spec| spec.required && !session.stage_succeeded(&spec.name))
        .map(|spec| spec.name.clone())
        .collect();
    if !missing.is_empty() {
        return Err(ConsolidateError::IncompleteSession { missing });
    }

    let mut sections = BTreeMap::new();
    for spec in &plan.stages {
        if let Some(payload) = session.successful_payload(&spec.name) {
            sections.insert(spec.name.clone(), section_value(&spec.name, payload)?);
        }
    }

    let quality_score = weighted_quality(&session.gate_scores);
    let completed_at = Utc::now();
    let duration_ms = (completed_at - session.started_at).num_milliseconds().max(0) as u64;
    let stages_executed = session
        .results
        .iter()
        .filter(|r| r.status != StageStatus::Skipped)
        .count();

    debug!(
        session_id = %session.id,
        sections = sections.len(),
        quality_score,
        "Session consolidated"
    );

    Ok(FinalReport {
        session_id: session.id,
        segment: session.request.segment.clone(),
        sections,
        quality_score,
        metadata: ReportMetadata {
            started_at: session.started_at,
            completed_at,
            duration_ms,
            providers_used: session.providers_used.clone(),
            stages_executed,
            warnings: session.warnings.clone(),
        },
    })
}

/// Weighted average of mandatory gate scores, rounded to two decimals.
///
/// Optional stages never move the session score, even when they ran.
fn weighted_quality(gates: &[GateScore]) -> f64 {
    let (sum, weight) = gates
        .iter()
        .filter(|g| g.required)
        .fold((0.0_f64, 0.0_f64), |(sum, weight), g| {
            (sum + g.score * g.weight, weight + g.weight)
        });
    if weight == 0.0 {
        0.0
    } else {
        (sum / weight * 100.0).round() / 100.0
    }
}

fn section_value(stage: &str, payload: &StagePayload) -> Result<Value, ConsolidateError> {
    let encode = |stage: &str, value: serde_json::Result<Value>| {
        value.map_err(|source| ConsolidateError::Encode {
            stage: stage.to_string(),
            source,
        })
    };
    match payload {
        StagePayload::Research(research) => Ok(research_section(research)),
        StagePayload::Synthesis(analysis) => encode(stage, serde_json::to_value(analysis)),
        StagePayload::Drivers(drivers) => encode(stage, serde_json::to_value(drivers)),
        StagePayload::Objections(playbook) => encode(stage, serde_json::to_value(playbook)),
        StagePayload::Forecast(forecast) => encode(stage, serde_json::to_value(forecast)),
    }
}

/// Research section with page text reduced to a per-source character count.
fn research_section(research: &ResearchSummary) -> Value {
    let sources: Vec<Value> = research
        .sources
        .iter()
        .map(|s| {
            json!({
                "url": s.url,
                "title": s.title,
                "snippet": s.snippet,
                "content_chars": s.raw_text.chars().count(),
            })
        })
        .collect();
    json!({
        "queries": research.queries,
        "statistics": {
            "total_sources": research.statistics.total_sources,
            "total_content_chars": research.statistics.total_content_chars,
            "unique_domains": research.statistics.unique_domains,
        },
        "sources": sources,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::StageResult;
    use crate::types::{
        AnalysisRequest, DriverSet, ForecastScenario, MarketAnalysis, MarketForecast,
        MentalDriver, Objection, ObjectionPlaybook, ProviderCategory, ResearchStatistics,
        SourceDocument,
    };
    use pretty_assertions::assert_eq;

    fn research_payload() -> StagePayload {
        StagePayload::Research(ResearchSummary {
            queries: vec!["q1".into()],
            sources: vec![SourceDocument {
                url: "https://a.example.com/1".into(),
                title: "Report".into(),
                snippet: "snippet".into(),
                raw_text: "a very long page body".into(),
            }],
            statistics: ResearchStatistics {
                total_sources: 1,
                total_content_chars: 21,
                unique_domains: 1,
            },
        })
    }

    fn synthesis_payload() -> StagePayload {
        StagePayload::Synthesis(MarketAnalysis {
            positioning: "pos".into(),
            market_overview: "overview".into(),
            competitive_landscape: "landscape".into(),
            opportunities: vec!["opp".into()],
            risks: vec!["risk".into()],
            keywords: vec!["kw".into()],
        })
    }

    fn full_session() -> Session {
        let mut session = Session::new(AnalysisRequest::new("home fitness equipment"));
        session.record_stage(StageResult::succeeded("research", research_payload(), 5));
        session.record_stage(StageResult::succeeded("synthesis", synthesis_payload(), 5));
        session.record_stage(StageResult::succeeded(
            "drivers",
            StagePayload::Drivers(DriverSet {
                drivers: vec![MentalDriver {
                    name: "status".into(),
                    trigger: "t".into(),
                    application: "a".into(),
                }],
            }),
            5,
        ));
        session.record_stage(StageResult::succeeded(
            "objections",
            StagePayload::Objections(ObjectionPlaybook {
                objections: vec![Objection {
                    objection: "o".into(),
                    category: "price".into(),
                    counter: "c".into(),
                }],
            }),
            5,
        ));
        session.record_stage(StageResult::succeeded(
            "forecast",
            StagePayload::Forecast(MarketForecast {
                scenarios: vec![ForecastScenario {
                    name: "base".into(),
                    horizon_months: 12,
                    outlook: "steady".into(),
                    confidence: 0.5,
                }],
                signals: vec!["signal".into()],
            }),
            5,
        ));
        for (stage, required, weight, score) in [
            ("research", true, 1.0, 100.0),
            ("synthesis", true, 2.0, 80.0),
            ("drivers", true, 1.0, 90.0),
            ("objections", true, 1.0, 100.0),
            ("forecast", false, 1.0, 10.0),
        ] {
            session.record_gate(GateScore {
                stage: stage.into(),
                required,
                weight,
                score,
            });
        }
        session.note_provider(ProviderCategory::Research, "serper");
        session.note_provider(ProviderCategory::Ai, "gemini");
        session
    }

    #[test]
    fn test_consolidates_all_sections() {
        let session = full_session();
        let report = consolidate(&session, &StagePlan::standard(false)).unwrap();
        let keys: Vec<&str> = report.sections.keys().map(String::as_str).collect();
        assert_eq!(
            keys,
            vec!["drivers", "forecast", "objections", "research", "synthesis"]
        );
        assert_eq!(report.segment, "home fitness equipment");
        assert_eq!(report.metadata.stages_executed, 5);
        assert_eq!(
            report.metadata.providers_used.get("ai"),
            Some(&"gemini".to_string())
        );
    }

    #[test]
    fn test_raw_text_never_reaches_the_report() {
        let session = full_session();
        let report = consolidate(&session, &StagePlan::standard(false)).unwrap();
        let serialized = serde_json::to_string(&report).unwrap();
        assert!(!serialized.contains("raw_text"));
        assert!(!serialized.contains("a very long page body"));

        let research = &report.sections["research"];
        assert_eq!(research["sources"][0]["content_chars"], json!(21));
        assert_eq!(research["sources"][0]["url"], json!("https://a.example.com/1"));
    }

    #[test]
    fn test_quality_score_weights_mandatory_gates_only() {
        let session = full_session();
        let report = consolidate(&session, &StagePlan::standard(false)).unwrap();
        // (100*1 + 80*2 + 90*1 + 100*1) / 5, forecast's 10.0 excluded.
        assert_eq!(report.quality_score, 90.0);
    }

    #[test]
    fn test_missing_mandatory_stage_is_incomplete() {
        let mut session = Session::new(AnalysisRequest::new("home fitness equipment"));
        session.record_stage(StageResult::succeeded("research", research_payload(), 5));

        let err = consolidate(&session, &StagePlan::standard(false)).unwrap_err();
        match err {
            ConsolidateError::IncompleteSession { missing } => {
                assert_eq!(missing, vec!["synthesis", "drivers", "objections"]);
            }
            other => panic!("expected IncompleteSession, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_optional_stage_is_fine() {
        let mut session = full_session();
        session.results.retain(|r| r.stage != "forecast");
        session.warn("optional stage 'forecast' failed: provider offline");

        let report = consolidate(&session, &StagePlan::standard(false)).unwrap();
        assert!(!report.sections.contains_key("forecast"));
        assert_eq!(report.metadata.stages_executed, 4);
        assert_eq!(report.metadata.warnings.len(), 1);
    }

    #[test]
    fn test_failed_stage_payload_is_not_merged() {
        let mut session = full_session();
        session.results.retain(|r| r.stage != "forecast");
        session.record_stage(StageResult::failed("forecast", "gate failed", 5));

        let report = consolidate(&session, &StagePlan::standard(false)).unwrap();
        assert!(!report.sections.contains_key("forecast"));
    }

    #[test]
    fn test_no_required_gates_scores_zero() {
        assert_eq!(weighted_quality(&[]), 0.0);
        assert_eq!(
            weighted_quality(&[GateScore {
                stage: "forecast".into(),
                required: false,
                weight: 1.0,
                score: 100.0,
            }]),
            0.0
        );
    }
}
