//! Stage plan and worker contract.
//!
//! A `StagePlan` is the ordered list of stages a session runs; each stage
//! names its dependencies and whether failure aborts the session. Workers
//! do the actual stage work against a read-only context and never mutate
//! session state; the sequencer owns all bookkeeping.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::config::{FallbackConfig, StagesConfig};
use crate::error::{AllProvidersFailed, ProviderError, StageError};
use crate::providers::{AiProvider, FallbackSelector, ProviderName, ResearchProvider, Selected};
use crate::session::Session;
use crate::types::{AnalysisRequest, PayloadKind, ProviderCategory, SearchHit, StagePayload};

/// Standard stage names.
pub const STAGE_RESEARCH: &str = "research";
pub const STAGE_SYNTHESIS: &str = "synthesis";
pub const STAGE_DRIVERS: &str = "drivers";
pub const STAGE_OBJECTIONS: &str = "objections";
pub const STAGE_FORECAST: &str = "forecast";

/// Declaration of one stage in the plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageSpec {
    pub name: String,
    /// Position in the plan; strictly increasing.
    pub ordinal: usize,
    /// Whether a failure of this stage aborts the session.
    pub required: bool,
    /// Stages whose successful output this stage consumes.
    pub depends_on: Vec<String>,
    /// Payload shape this stage produces, which selects its gate ruleset.
    pub output: PayloadKind,
}

impl StageSpec {
    pub fn new(name: &str, ordinal: usize, output: PayloadKind) -> Self {
        Self {
            name: name.to_string(),
            ordinal,
            required: true,
            depends_on: Vec::new(),
            output,
        }
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn depends_on(mut self, stage: &str) -> Self {
        self.depends_on.push(stage.to_string());
        self
    }
}

/// The ordered set of stages a session executes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StagePlan {
    pub stages: Vec<StageSpec>,
}

impl StagePlan {
    /// Build a plan, enforcing strict ordinal order and that every
    /// dependency names an earlier stage.
    pub fn new(stages: Vec<StageSpec>) -> Result<Self, String> {
        let mut seen: Vec<&str> = Vec::new();
        let mut last_ordinal: Option<usize> = None;
        for spec in &stages {
            if let Some(last) = last_ordinal {
                if spec.ordinal <= last {
                    return Err(format!(
                        "stage '{}' has ordinal {} which does not follow {}",
                        spec.name, spec.ordinal, last
                    ));
                }
            }
            for dep in &spec.depends_on {
                if !seen.contains(&dep.as_str()) {
                    return Err(format!(
                        "stage '{}' depends on '{}' which is not an earlier stage",
                        spec.name, dep
                    ));
                }
            }
            seen.push(&spec.name);
            last_ordinal = Some(spec.ordinal);
        }
        Ok(Self { stages })
    }

    /// The standard five-stage market analysis plan.
    pub fn standard(forecast_required: bool) -> Self {
        let forecast = StageSpec::new(STAGE_FORECAST, 5, PayloadKind::Forecast)
            .depends_on(STAGE_SYNTHESIS);
        let forecast = if forecast_required {
            forecast
        } else {
            forecast.optional()
        };

        Self {
            stages: vec![
                StageSpec::new(STAGE_RESEARCH, 1, PayloadKind::Research),
                StageSpec::new(STAGE_SYNTHESIS, 2, PayloadKind::Synthesis)
                    .depends_on(STAGE_RESEARCH),
                StageSpec::new(STAGE_DRIVERS, 3, PayloadKind::Drivers).depends_on(STAGE_SYNTHESIS),
                StageSpec::new(STAGE_OBJECTIONS, 4, PayloadKind::Objections)
                    .depends_on(STAGE_SYNTHESIS),
                forecast,
            ],
        }
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Runtime and context
// ---------------------------------------------------------------------------

/// Shared provider machinery handed to every stage worker.
pub struct StageRuntime {
    selector: FallbackSelector,
    ai: Vec<Arc<dyn AiProvider>>,
    research: Vec<Arc<dyn ResearchProvider>>,
    call_timeout: Duration,
    pub stages: StagesConfig,
}

impl StageRuntime {
    pub fn new(
        selector: FallbackSelector,
        ai: Vec<Arc<dyn AiProvider>>,
        research: Vec<Arc<dyn ResearchProvider>>,
        fallback: &FallbackConfig,
        stages: StagesConfig,
    ) -> Self {
        Self {
            selector,
            ai,
            research,
            call_timeout: Duration::from_secs(fallback.call_timeout_secs),
            stages,
        }
    }

    pub fn selector(&self) -> &FallbackSelector {
        &self.selector
    }

    /// Generate text with AI provider fallback.
    pub async fn generate(&self, prompt: &str) -> Result<Selected<String>, AllProvidersFailed> {
        let max_tokens = self.stages.ai_max_tokens;
        self.selector
            .call(ProviderCategory::Ai, &self.ai, |provider| {
                let prompt = prompt.to_string();
                async move { provider.generate(&prompt, max_tokens).await }
            })
            .await
    }

    /// Run a search query with research provider fallback.
    pub async fn search(
        &self,
        query: &str,
    ) -> Result<Selected<Vec<SearchHit>>, AllProvidersFailed> {
        let max_results = self.stages.search_results_per_query;
        self.selector
            .call(ProviderCategory::Research, &self.research, |provider| {
                let query = query.to_string();
                async move { provider.search(&query, max_results).await }
            })
            .await
    }

    pub fn research_provider(&self, name: &str) -> Option<Arc<dyn ResearchProvider>> {
        self.research.iter().find(|p| p.name() == name).cloned()
    }

    /// Fetch one page under the per-call timeout.
    ///
    /// Page fetches bypass health bookkeeping: a dead link is the page's
    /// fault, not the provider's, so failures surface to the caller as
    /// per-source errors only.
    pub async fn fetch_page(
        &self,
        provider: &Arc<dyn ResearchProvider>,
        url: &str,
    ) -> Result<String, ProviderError> {
        tokio::time::timeout(self.call_timeout, provider.fetch(url))
            .await
            .unwrap_or(Err(ProviderError::Timeout {
                timeout_secs: self.call_timeout.as_secs(),
            }))
    }
}

/// Read-only view a worker runs against.
pub struct StageContext<'a> {
    pub session: &'a Session,
    pub runtime: &'a StageRuntime,
}

impl<'a> StageContext<'a> {
    pub fn request(&self) -> &AnalysisRequest {
        &self.session.request
    }

    /// Payload of a dependency stage, or `MissingDependency`.
    pub fn dependency(&self, stage: &str) -> Result<&StagePayload, StageError> {
        self.session
            .successful_payload(stage)
            .ok_or_else(|| StageError::MissingDependency {
                stage: stage.to_string(),
            })
    }
}

/// What a worker hands back on success.
#[derive(Debug)]
pub struct StageOutcome {
    pub payload: StagePayload,
    /// Providers that served this stage, in call order.
    pub providers_used: Vec<(ProviderCategory, String)>,
    /// Non-fatal problems hit while producing the payload.
    pub warnings: Vec<String>,
}

impl StageOutcome {
    pub fn new(payload: StagePayload) -> Self {
        Self {
            payload,
            providers_used: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn with_provider(mut self, category: ProviderCategory, name: impl Into<String>) -> Self {
        self.providers_used.push((category, name.into()));
        self
    }

    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }
}

/// One unit of pipeline work.
#[async_trait]
pub trait StageWorker: Send + Sync {
    async fn run(&self, ctx: &StageContext<'_>) -> Result<StageOutcome, StageError>;
}
