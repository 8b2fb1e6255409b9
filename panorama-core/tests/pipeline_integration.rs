//! Integration tests for the analysis pipeline.
//!
//! These exercise the full Pipeline end-to-end with mock providers:
//! research through consolidation, quality rejection, provider fallback,
//! cancellation, and concurrent sessions over a shared health table.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use panorama_core::checkpoint::{CATEGORY_QUALITY_GATE, CATEGORY_STAGE_RESULT};
use panorama_core::error::ProviderError;
use panorama_core::pipeline::RecordingProgress;
use panorama_core::providers::{MockAiProvider, MockResearchProvider};
use panorama_core::{
    AiProvider, AnalysisRequest, CheckpointStore, MemoryCheckpointStore, NoOpProgress,
    PanoramaConfig, PanoramaError, Pipeline, PipelineError, ProviderName, Session, SessionStatus,
    StageError,
};

fn test_config(data_dir: &Path) -> PanoramaConfig {
    let mut config = PanoramaConfig::default();
    config.storage.data_dir = Some(data_dir.to_path_buf());
    config.stages.search_results_per_query = 12;
    config
}

/// AI provider that answers by prompt content instead of call order, so it
/// stays deterministic when sessions interleave.
struct StageAwareAi {
    name: String,
}

impl StageAwareAi {
    fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl ProviderName for StageAwareAi {
    fn name(&self) -> &str {
        &self.name
    }
}

#[async_trait]
impl AiProvider for StageAwareAi {
    async fn generate(&self, prompt: &str, _max_tokens: usize) -> Result<String, ProviderError> {
        if prompt.contains("market analyst") {
            Ok(synthesis_json())
        } else if prompt.contains("consumer psychologist") {
            Ok(drivers_json())
        } else if prompt.contains("sales strategist") {
            Ok(objections_json())
        } else if prompt.contains("market forecaster") {
            Ok(forecast_json())
        } else {
            Err(ProviderError::ResponseParse {
                message: "unrecognized prompt".into(),
            })
        }
    }
}

fn synthesis_json() -> String {
    let overview = "The home fitness equipment market keeps expanding as hybrid work \
        normalizes exercising at home and connected hardware earns recurring revenue. "
        .repeat(3);
    let landscape = "Two incumbent platforms hold most connected-equipment share while \
        value brands compete on price across marketplaces. "
        .repeat(2);
    serde_json::json!({
        "positioning": "Premium connected rowing system for space-constrained urban homes, \
            pairing durable hardware with subscription coaching for measurable results.",
        "market_overview": overview,
        "competitive_landscape": landscape,
        "opportunities": ["bundled coaching subscriptions", "corporate wellness channels", "refurbished entry tier"],
        "risks": ["hardware margin compression", "subscription fatigue"],
        "keywords": ["connected fitness", "home rowing", "subscription coaching"]
    })
    .to_string()
}

fn drivers_json() -> String {
    serde_json::json!({
        "drivers": [
            {"name": "status", "trigger": "peer comparison in fitness communities", "application": "leaderboards and shareable milestones"},
            {"name": "convenience", "trigger": "commute friction to gyms", "application": "lead with time-saved messaging"},
            {"name": "identity", "trigger": "self-image as an athlete", "application": "progressive training programs"},
            {"name": "scarcity", "trigger": "limited cohort openings", "application": "seasonal coached cohorts"},
            {"name": "belonging", "trigger": "training alone feels unsustainable", "application": "live group classes"}
        ]
    })
    .to_string()
}

fn objections_json() -> String {
    serde_json::json!({
        "objections": [
            {"objection": "it costs too much", "category": "price", "counter": "compare against a year of gym membership plus commute"},
            {"objection": "I will stop using it", "category": "need", "counter": "coached plans and streak mechanics sustain usage"},
            {"objection": "it takes too much space", "category": "need", "counter": "vertical storage in under one square meter"},
            {"objection": "cheaper machines exist", "category": "trust", "counter": "durability testing and a ten-year frame warranty"}
        ]
    })
    .to_string()
}

fn forecast_json() -> String {
    serde_json::json!({
        "scenarios": [
            {"name": "base", "horizon_months": 12, "outlook": "single-digit unit growth with services revenue outpacing hardware", "confidence": 0.6},
            {"name": "accelerated", "horizon_months": 24, "outlook": "connected share doubles as incumbents open their platforms", "confidence": 0.25}
        ],
        "signals": ["search volume for home rowing machines", "attach rate of coaching subscriptions"]
    })
    .to_string()
}

fn rich_research_provider(name: &str) -> Arc<MockResearchProvider> {
    Arc::new(MockResearchProvider::new(
        name,
        MockResearchProvider::hits_across_domains(10),
        "m".repeat(1_600),
    ))
}

// --- Integration Tests ---

#[tokio::test]
async fn test_full_session_produces_report() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let observer = Arc::new(RecordingProgress::new());

    let pipeline = Pipeline::assemble(
        &config,
        vec![Arc::new(StageAwareAi::new("gemini"))],
        vec![rich_research_provider("serper")],
        Arc::new(MemoryCheckpointStore::new()),
        observer.clone(),
    )
    .unwrap();

    let report = pipeline
        .analyze(AnalysisRequest::new("home fitness equipment"))
        .await
        .unwrap();

    let sections: Vec<&str> = report.sections.keys().map(String::as_str).collect();
    assert_eq!(
        sections,
        vec!["drivers", "forecast", "objections", "research", "synthesis"]
    );
    assert_eq!(report.quality_score, 100.0);
    assert_eq!(
        report.metadata.providers_used.get("ai"),
        Some(&"gemini".to_string())
    );
    assert_eq!(
        report.metadata.providers_used.get("research"),
        Some(&"serper".to_string())
    );
    assert_eq!(report.metadata.stages_executed, 5);

    // Bulk page text must not leak into the report.
    let serialized = serde_json::to_string(&report).unwrap();
    assert!(!serialized.contains("raw_text"));
    assert!(!serialized.contains(&"m".repeat(1_600)));

    // Observer saw every stage start and complete in order.
    assert_eq!(
        observer.started(),
        vec!["research", "synthesis", "drivers", "objections", "forecast"]
    );
    assert_eq!(observer.completed().len(), 5);
    assert!(observer.failed().is_empty());

    // Session snapshot persisted as completed.
    let summaries = Session::list(dir.path());
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].status, SessionStatus::Completed);
}

#[tokio::test]
async fn test_every_stage_checkpointed_before_next() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let checkpoints = Arc::new(MemoryCheckpointStore::new());

    let pipeline = Pipeline::assemble(
        &config,
        vec![Arc::new(StageAwareAi::new("gemini"))],
        vec![rich_research_provider("serper")],
        checkpoints.clone(),
        Arc::new(NoOpProgress),
    )
    .unwrap();

    pipeline
        .analyze(AnalysisRequest::new("home fitness equipment"))
        .await
        .unwrap();

    let summaries = Session::list(dir.path());
    let records = checkpoints.read_session(summaries[0].id).await.unwrap();
    let stage_results: Vec<&str> = records
        .iter()
        .filter(|c| c.category == CATEGORY_STAGE_RESULT)
        .map(|c| c.stage.as_str())
        .collect();
    assert_eq!(
        stage_results,
        vec!["research", "synthesis", "drivers", "objections", "forecast"]
    );
    assert_eq!(
        records
            .iter()
            .filter(|c| c.category == CATEGORY_QUALITY_GATE)
            .count(),
        5
    );
}

#[tokio::test]
async fn test_thin_research_is_rejected_and_recoverable() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let checkpoints = Arc::new(MemoryCheckpointStore::new());
    let ai = Arc::new(MockAiProvider::new("gemini"));

    let pipeline = Pipeline::assemble(
        &config,
        vec![ai.clone()],
        vec![Arc::new(MockResearchProvider::new(
            "serper",
            MockResearchProvider::hits_across_domains(3),
            "thin page",
        ))],
        checkpoints.clone(),
        Arc::new(NoOpProgress),
    )
    .unwrap();

    let err = pipeline
        .analyze(AnalysisRequest::new("home fitness equipment"))
        .await
        .unwrap_err();

    match err {
        PanoramaError::Pipeline(PipelineError::QualityRejected { report }) => {
            assert_eq!(report.stage, "research");
            assert!(
                report.violations.iter().any(|v| v.contains("min_sources")),
                "violations should cite min_sources: {:?}",
                report.violations
            );
        }
        other => panic!("expected QualityRejected, got {:?}", other),
    }

    // No AI call happened: the gate rejected before synthesis.
    assert_eq!(ai.calls(), 0);

    // The rejected payload is still recoverable from checkpoints.
    let summaries = Session::list(dir.path());
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].status, SessionStatus::Rejected);

    let records = checkpoints.read_session(summaries[0].id).await.unwrap();
    let stage_result = records
        .iter()
        .find(|c| c.category == CATEGORY_STAGE_RESULT && c.stage == "research")
        .expect("rejected stage result should be checkpointed");
    assert_eq!(stage_result.payload["payload"]["sources"].as_array().unwrap().len(), 3);
    assert!(records
        .iter()
        .any(|c| c.category == CATEGORY_QUALITY_GATE && c.stage == "research"));
}

#[tokio::test]
async fn test_ai_timeout_falls_back_to_secondary() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path());
    config.fallback.call_timeout_secs = 1;
    config.fallback.failure_threshold = 1;

    let secondary = Arc::new(MockAiProvider::new("secondary"));
    secondary.queue_response(synthesis_json());
    secondary.queue_response(drivers_json());
    secondary.queue_response(objections_json());
    secondary.queue_response(forecast_json());

    let pipeline = Pipeline::assemble(
        &config,
        vec![
            Arc::new(MockAiProvider::slow("primary", Duration::from_secs(30))),
            secondary,
        ],
        vec![rich_research_provider("serper")],
        Arc::new(MemoryCheckpointStore::new()),
        Arc::new(NoOpProgress),
    )
    .unwrap();

    let report = pipeline
        .analyze(AnalysisRequest::new("home fitness equipment"))
        .await
        .unwrap();

    assert_eq!(
        report.metadata.providers_used.get("ai"),
        Some(&"secondary".to_string())
    );

    let health = pipeline.provider_health();
    let primary = health.iter().find(|h| h.name == "primary").unwrap();
    let secondary = health.iter().find(|h| h.name == "secondary").unwrap();
    assert_eq!(primary.consecutive_failures, 1);
    assert!(primary.disabled_for_secs.is_some());
    assert_eq!(secondary.consecutive_failures, 0);
}

#[tokio::test]
async fn test_all_ai_providers_down_aborts_session() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let checkpoints = Arc::new(MemoryCheckpointStore::new());

    let pipeline = Pipeline::assemble(
        &config,
        vec![
            Arc::new(MockAiProvider::failing("gemini", "connection refused")),
            Arc::new(MockAiProvider::failing("groq", "quota exhausted")),
        ],
        vec![rich_research_provider("serper")],
        checkpoints.clone(),
        Arc::new(NoOpProgress),
    )
    .unwrap();

    let err = pipeline
        .analyze(AnalysisRequest::new("home fitness equipment"))
        .await
        .unwrap_err();

    match err {
        PanoramaError::Pipeline(PipelineError::SessionAborted { stage, cause }) => {
            assert_eq!(stage, "synthesis");
            match *cause {
                StageError::AllProvidersFailed(failed) => {
                    assert_eq!(failed.attempts.len(), 2);
                    assert_eq!(failed.attempts[0].provider, "gemini");
                    assert_eq!(failed.attempts[1].provider, "groq");
                }
                other => panic!("expected AllProvidersFailed, got {:?}", other),
            }
        }
        other => panic!("expected SessionAborted, got {:?}", other),
    }

    let summaries = Session::list(dir.path());
    assert_eq!(summaries[0].status, SessionStatus::Aborted);

    // Research checkpoint survived; the failed synthesis result is recorded.
    let records = checkpoints.read_session(summaries[0].id).await.unwrap();
    assert!(records
        .iter()
        .any(|c| c.stage == "research" && c.category == CATEGORY_STAGE_RESULT));
    let synthesis = records
        .iter()
        .find(|c| c.stage == "synthesis" && c.category == CATEGORY_STAGE_RESULT)
        .unwrap();
    assert_eq!(synthesis.payload["status"], "failed");
}

#[tokio::test]
async fn test_optional_forecast_failure_degrades_report() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());

    // Answers every stage except forecast, which gets undecodable prose.
    struct NoForecastAi;
    impl ProviderName for NoForecastAi {
        fn name(&self) -> &str {
            "gemini"
        }
    }
    #[async_trait]
    impl AiProvider for NoForecastAi {
        async fn generate(
            &self,
            prompt: &str,
            _max_tokens: usize,
        ) -> Result<String, ProviderError> {
            if prompt.contains("market analyst") {
                Ok(synthesis_json())
            } else if prompt.contains("consumer psychologist") {
                Ok(drivers_json())
            } else if prompt.contains("sales strategist") {
                Ok(objections_json())
            } else {
                Ok("I am unable to project this market with confidence.".into())
            }
        }
    }

    let observer = Arc::new(RecordingProgress::new());
    let pipeline = Pipeline::assemble(
        &config,
        vec![Arc::new(NoForecastAi)],
        vec![rich_research_provider("serper")],
        Arc::new(MemoryCheckpointStore::new()),
        observer.clone(),
    )
    .unwrap();

    let report = pipeline
        .analyze(AnalysisRequest::new("home fitness equipment"))
        .await
        .unwrap();

    assert!(!report.sections.contains_key("forecast"));
    assert_eq!(report.sections.len(), 4);
    assert!(report
        .metadata
        .warnings
        .iter()
        .any(|w| w.contains("forecast")));
    // Required gates all passed, so the weighted score is unaffected.
    assert_eq!(report.quality_score, 100.0);
    assert_eq!(observer.failed().len(), 1);
    assert_eq!(observer.failed()[0].0, "forecast");
}

#[tokio::test]
async fn test_cancellation_stops_session_between_stages() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());

    let pipeline = Pipeline::assemble(
        &config,
        vec![Arc::new(StageAwareAi::new("gemini"))],
        vec![rich_research_provider("serper")],
        Arc::new(MemoryCheckpointStore::new()),
        Arc::new(NoOpProgress),
    )
    .unwrap();

    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = pipeline
        .analyze_with_cancel(AnalysisRequest::new("home fitness equipment"), cancel)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        PanoramaError::Pipeline(PipelineError::Cancelled { .. })
    ));
    let summaries = Session::list(dir.path());
    assert_eq!(summaries[0].status, SessionStatus::Cancelled);
    assert_eq!(summaries[0].stages_recorded, 0);
}

#[tokio::test]
async fn test_invalid_request_never_starts_a_session() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());

    let pipeline = Pipeline::assemble(
        &config,
        vec![Arc::new(StageAwareAi::new("gemini"))],
        vec![rich_research_provider("serper")],
        Arc::new(MemoryCheckpointStore::new()),
        Arc::new(NoOpProgress),
    )
    .unwrap();

    let err = pipeline.analyze(AnalysisRequest::new("x")).await.unwrap_err();
    assert!(matches!(err, PanoramaError::InputValidation { .. }));
    assert!(Session::list(dir.path()).is_empty());
}

#[tokio::test]
async fn test_concurrent_sessions_share_one_health_table() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());

    let pipeline = Arc::new(
        Pipeline::assemble(
            &config,
            vec![Arc::new(StageAwareAi::new("gemini"))],
            vec![rich_research_provider("serper")],
            Arc::new(MemoryCheckpointStore::new()),
            Arc::new(NoOpProgress),
        )
        .unwrap(),
    );

    let a = {
        let pipeline = pipeline.clone();
        tokio::spawn(async move {
            pipeline
                .analyze(AnalysisRequest::new("home fitness equipment"))
                .await
        })
    };
    let b = {
        let pipeline = pipeline.clone();
        tokio::spawn(async move {
            pipeline
                .analyze(AnalysisRequest::new("compact home gyms"))
                .await
        })
    };

    let (a, b) = tokio::join!(a, b);
    let report_a = a.unwrap().unwrap();
    let report_b = b.unwrap().unwrap();
    assert_ne!(report_a.session_id, report_b.session_id);
    assert_eq!(report_a.sections.len(), 5);
    assert_eq!(report_b.sections.len(), 5);

    // Both sessions persisted, and the shared registry saw no failures.
    assert_eq!(Session::list(dir.path()).len(), 2);
    assert!(pipeline
        .provider_health()
        .iter()
        .all(|h| h.consecutive_failures == 0));
}

#[tokio::test]
async fn test_provider_reset_reenables_disabled_provider() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path());
    config.fallback.failure_threshold = 1;

    let primary: Arc<dyn AiProvider> = Arc::new(MockAiProvider::failing("gemini", "connection refused"));
    let secondary: Arc<dyn AiProvider> = Arc::new(StageAwareAi::new("groq"));

    let pipeline = Pipeline::assemble(
        &config,
        vec![primary, secondary],
        vec![rich_research_provider("serper")],
        Arc::new(MemoryCheckpointStore::new()),
        Arc::new(NoOpProgress),
    )
    .unwrap();

    pipeline
        .analyze(AnalysisRequest::new("home fitness equipment"))
        .await
        .unwrap();

    let health = pipeline.provider_health();
    let gemini = health.iter().find(|h| h.name == "gemini").unwrap();
    assert!(gemini.disabled_for_secs.is_some());

    pipeline.reset_providers(panorama_core::ProviderCategory::Ai, Some("gemini"));

    let health = pipeline.provider_health();
    let gemini = health.iter().find(|h| h.name == "gemini").unwrap();
    assert!(gemini.disabled_for_secs.is_none());
    assert_eq!(gemini.consecutive_failures, 0);
}
