//! Fundamental data types shared across the Panorama pipeline.
//!
//! Defines the analysis request, the tagged stage payload variants, and the
//! final report. Stage payloads are typed per stage so quality gates can
//! validate shape before applying rules; maps use `BTreeMap` so serialized
//! output has a stable field order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

use crate::error::PanoramaError;

/// Segment names that indicate a placeholder request rather than a real one.
const PLACEHOLDER_SEGMENTS: &[&str] = &["test", "teste", "example", "exemplo", "sample", "demo"];

/// Minimum length of a meaningful segment description, in characters.
const MIN_SEGMENT_CHARS: usize = 5;

// ---------------------------------------------------------------------------
// Analysis Request
// ---------------------------------------------------------------------------

/// The initial input to a pipeline session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisRequest {
    /// Market segment to analyze (e.g. "organic skincare for athletes").
    pub segment: String,
    /// Product or service under analysis, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product: Option<String>,
    /// Target audience description, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_audience: Option<String>,
    /// Free-form additional context from the caller.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

impl AnalysisRequest {
    pub fn new(segment: impl Into<String>) -> Self {
        Self {
            segment: segment.into(),
            product: None,
            target_audience: None,
            context: None,
        }
    }

    pub fn with_product(mut self, product: impl Into<String>) -> Self {
        self.product = Some(product.into());
        self
    }

    pub fn with_target_audience(mut self, audience: impl Into<String>) -> Self {
        self.target_audience = Some(audience.into());
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Validate the request before any stage runs.
    ///
    /// Rejects empty or too-short segments and placeholder segment names.
    pub fn validate(&self) -> Result<(), PanoramaError> {
        let segment = self.segment.trim();
        if segment.is_empty() {
            return Err(PanoramaError::InputValidation {
                message: "segment is required".into(),
            });
        }
        if segment.chars().count() < MIN_SEGMENT_CHARS {
            return Err(PanoramaError::InputValidation {
                message: format!(
                    "segment '{}' is too short (minimum {} characters)",
                    segment, MIN_SEGMENT_CHARS
                ),
            });
        }
        let lowered = segment.to_lowercase();
        if PLACEHOLDER_SEGMENTS.contains(&lowered.as_str()) {
            return Err(PanoramaError::InputValidation {
                message: format!("segment '{}' looks like placeholder input", segment),
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Provider category
// ---------------------------------------------------------------------------

/// The two classes of external providers the pipeline calls.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ProviderCategory {
    Research,
    Ai,
}

impl fmt::Display for ProviderCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderCategory::Research => write!(f, "research"),
            ProviderCategory::Ai => write!(f, "ai"),
        }
    }
}

/// One ranked result from a research provider's `search`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    pub url: String,
    pub title: String,
    pub snippet: String,
}

// ---------------------------------------------------------------------------
// Stage payloads
// ---------------------------------------------------------------------------

/// Declared output type tag of a stage, used in stage configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadKind {
    Research,
    Synthesis,
    Drivers,
    Objections,
    Forecast,
}

impl fmt::Display for PayloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PayloadKind::Research => write!(f, "research"),
            PayloadKind::Synthesis => write!(f, "synthesis"),
            PayloadKind::Drivers => write!(f, "drivers"),
            PayloadKind::Objections => write!(f, "objections"),
            PayloadKind::Forecast => write!(f, "forecast"),
        }
    }
}

/// A stage's output, tagged by the producing stage's declared shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StagePayload {
    Research(ResearchSummary),
    Synthesis(MarketAnalysis),
    Drivers(DriverSet),
    Objections(ObjectionPlaybook),
    Forecast(MarketForecast),
}

impl StagePayload {
    pub fn kind(&self) -> PayloadKind {
        match self {
            StagePayload::Research(_) => PayloadKind::Research,
            StagePayload::Synthesis(_) => PayloadKind::Synthesis,
            StagePayload::Drivers(_) => PayloadKind::Drivers,
            StagePayload::Objections(_) => PayloadKind::Objections,
            StagePayload::Forecast(_) => PayloadKind::Forecast,
        }
    }

    pub fn as_research(&self) -> Option<&ResearchSummary> {
        match self {
            StagePayload::Research(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_synthesis(&self) -> Option<&MarketAnalysis> {
        match self {
            StagePayload::Synthesis(a) => Some(a),
            _ => None,
        }
    }
}

/// Output of the research stage: gathered sources plus summary statistics.
///
/// `raw_text` on each source is bulk content for downstream prompts only;
/// the consolidator replaces it with derived scalars in the final report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResearchSummary {
    pub queries: Vec<String>,
    pub sources: Vec<SourceDocument>,
    pub statistics: ResearchStatistics,
}

/// One fetched source document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDocument {
    pub url: String,
    pub title: String,
    pub snippet: String,
    /// Full fetched page text. Never appears verbatim in a final report.
    pub raw_text: String,
}

/// Derived statistics over the gathered sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResearchStatistics {
    pub total_sources: usize,
    pub total_content_chars: usize,
    pub unique_domains: usize,
}

/// Output of the synthesis stage: the structured market analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketAnalysis {
    pub positioning: String,
    pub market_overview: String,
    pub competitive_landscape: String,
    pub opportunities: Vec<String>,
    pub risks: Vec<String>,
    pub keywords: Vec<String>,
}

/// Output of the drivers stage: psychological purchase drivers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverSet {
    pub drivers: Vec<MentalDriver>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MentalDriver {
    pub name: String,
    pub trigger: String,
    pub application: String,
}

/// Output of the objections stage: objection-handling playbook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectionPlaybook {
    pub objections: Vec<Objection>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Objection {
    pub objection: String,
    pub category: String,
    pub counter: String,
}

/// Output of the forecast stage: market projection scenarios.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketForecast {
    pub scenarios: Vec<ForecastScenario>,
    pub signals: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastScenario {
    pub name: String,
    pub horizon_months: u32,
    pub outlook: String,
    pub confidence: f64,
}

// ---------------------------------------------------------------------------
// Final report
// ---------------------------------------------------------------------------

/// The consolidated result of a fully successful session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalReport {
    pub session_id: Uuid,
    pub segment: String,
    /// Consolidated stage payloads keyed by stage name, raw fields stripped.
    pub sections: BTreeMap<String, serde_json::Value>,
    /// Weighted average of mandatory stages' quality gate scores.
    pub quality_score: f64,
    pub metadata: ReportMetadata,
}

/// Processing metadata stamped onto every final report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportMetadata {
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_ms: u64,
    /// Provider actually used per category (last successful call wins).
    pub providers_used: BTreeMap<String, String>,
    pub stages_executed: usize,
    pub warnings: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_request_validate_accepts_real_segment() {
        let request = AnalysisRequest::new("organic skincare for athletes");
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_request_validate_rejects_empty_segment() {
        let request = AnalysisRequest::new("   ");
        let err = request.validate().unwrap_err();
        assert_eq!(
            err.to_string(),
            "Input validation failed: segment is required"
        );
    }

    #[test]
    fn test_request_validate_rejects_short_segment() {
        let request = AnalysisRequest::new("b2b");
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_request_validate_rejects_placeholder_segment() {
        for segment in ["test", "TESTE", "Sample", "demo "] {
            let request = AnalysisRequest::new(segment);
            assert!(
                request.validate().is_err(),
                "placeholder '{}' should be rejected",
                segment
            );
        }
    }

    #[test]
    fn test_request_builder_fields() {
        let request = AnalysisRequest::new("premium coffee subscriptions")
            .with_product("roast box")
            .with_target_audience("remote workers");
        assert_eq!(request.product.as_deref(), Some("roast box"));
        assert_eq!(request.target_audience.as_deref(), Some("remote workers"));
        assert!(request.context.is_none());
    }

    #[test]
    fn test_payload_kind_tags() {
        let payload = StagePayload::Drivers(DriverSet { drivers: vec![] });
        assert_eq!(payload.kind(), PayloadKind::Drivers);
        assert_eq!(payload.kind().to_string(), "drivers");
    }

    #[test]
    fn test_payload_serializes_with_kind_tag() {
        let payload = StagePayload::Research(ResearchSummary {
            queries: vec!["q".into()],
            sources: vec![],
            statistics: ResearchStatistics {
                total_sources: 0,
                total_content_chars: 0,
                unique_domains: 0,
            },
        });
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["kind"], "research");
        assert!(value["statistics"]["total_sources"].is_number());
    }

    #[test]
    fn test_payload_roundtrip() {
        let payload = StagePayload::Synthesis(MarketAnalysis {
            positioning: "premium".into(),
            market_overview: "growing".into(),
            competitive_landscape: "fragmented".into(),
            opportunities: vec!["niche".into()],
            risks: vec!["churn".into()],
            keywords: vec!["coffee".into()],
        });
        let json = serde_json::to_string(&payload).unwrap();
        let back: StagePayload = serde_json::from_str(&json).unwrap();
        assert_eq!(back, payload);
    }

    #[test]
    fn test_provider_category_display() {
        assert_eq!(ProviderCategory::Research.to_string(), "research");
        assert_eq!(ProviderCategory::Ai.to_string(), "ai");
    }
}
