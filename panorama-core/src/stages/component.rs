//! Component stages: drivers, objections, and forecast.
//!
//! All three share the same shape (synthesis payload in, one AI call, one
//! typed decode out) and differ only in prompt and target type, so a single
//! parameterized worker covers them.

use async_trait::async_trait;

use crate::error::StageError;
use crate::pipeline::stage::{
    StageContext, StageOutcome, StageWorker, STAGE_DRIVERS, STAGE_FORECAST, STAGE_OBJECTIONS,
    STAGE_SYNTHESIS,
};
use crate::stages::decode::decode_response;
use crate::stages::prompt::escape_for_prompt;
use crate::types::{AnalysisRequest, MarketAnalysis, ProviderCategory, StagePayload};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Component {
    Drivers,
    Objections,
    Forecast,
}

/// Worker for the analysis components derived from the synthesis.
pub struct ComponentWorker {
    component: Component,
}

impl ComponentWorker {
    /// Mental and psychological purchase drivers.
    pub fn drivers() -> Self {
        Self {
            component: Component::Drivers,
        }
    }

    /// Objection-handling playbook.
    pub fn objections() -> Self {
        Self {
            component: Component::Objections,
        }
    }

    /// Market projections.
    pub fn forecast() -> Self {
        Self {
            component: Component::Forecast,
        }
    }

    fn stage_name(&self) -> &'static str {
        match self.component {
            Component::Drivers => STAGE_DRIVERS,
            Component::Objections => STAGE_OBJECTIONS,
            Component::Forecast => STAGE_FORECAST,
        }
    }
}

fn analysis_context(request: &AnalysisRequest, analysis: &MarketAnalysis) -> String {
    format!(
        "<segment>{}</segment>\n\
        <positioning>{}</positioning>\n\
        <market_overview>{}</market_overview>\n\
        <competitive_landscape>{}</competitive_landscape>\n\
        <opportunities>{}</opportunities>\n\
        <risks>{}</risks>",
        escape_for_prompt(&request.segment, 300),
        escape_for_prompt(&analysis.positioning, 1_000),
        escape_for_prompt(&analysis.market_overview, 4_000),
        escape_for_prompt(&analysis.competitive_landscape, 2_000),
        escape_for_prompt(&analysis.opportunities.join("; "), 1_000),
        escape_for_prompt(&analysis.risks.join("; "), 1_000),
    )
}

fn drivers_prompt(request: &AnalysisRequest, analysis: &MarketAnalysis) -> String {
    format!(
        "You are a consumer psychologist. From the market analysis below, identify the \
        mental drivers that move buyers in this segment.\n\
        Return JSON with exactly these fields:\n\
        {{\"drivers\": [{{\"name\": \"driver name\", \"trigger\": \"what activates it\", \
        \"application\": \"how marketing applies it\"}}]}}\n\
        Provide at least five distinct drivers.\n\n{}",
        analysis_context(request, analysis)
    )
}

fn objections_prompt(request: &AnalysisRequest, analysis: &MarketAnalysis) -> String {
    format!(
        "You are a sales strategist. From the market analysis below, build an \
        objection-handling playbook for this segment.\n\
        Return JSON with exactly these fields:\n\
        {{\"objections\": [{{\"objection\": \"what the buyer says\", \"category\": \
        \"price|trust|need|urgency|other\", \"counter\": \"how to answer it\"}}]}}\n\
        Provide at least four objections.\n\n{}",
        analysis_context(request, analysis)
    )
}

fn forecast_prompt(request: &AnalysisRequest, analysis: &MarketAnalysis) -> String {
    format!(
        "You are a market forecaster. From the market analysis below, project how this \
        segment develops.\n\
        Return JSON with exactly these fields:\n\
        {{\"scenarios\": [{{\"name\": \"scenario name\", \"horizon_months\": 12, \
        \"outlook\": \"what happens\", \"confidence\": 0.5}}], \
        \"signals\": [\"leading indicator to watch\"]}}\n\
        Provide at least two scenarios and one signal.\n\n{}",
        analysis_context(request, analysis)
    )
}

#[async_trait]
impl StageWorker for ComponentWorker {
    async fn run(&self, ctx: &StageContext<'_>) -> Result<StageOutcome, StageError> {
        let payload = ctx.dependency(STAGE_SYNTHESIS)?;
        let analysis = payload.as_synthesis().ok_or_else(|| StageError::Execution {
            message: format!(
                "stage '{}' produced a {} payload, expected synthesis",
                STAGE_SYNTHESIS,
                payload.kind()
            ),
        })?;

        let prompt = match self.component {
            Component::Drivers => drivers_prompt(ctx.request(), analysis),
            Component::Objections => objections_prompt(ctx.request(), analysis),
            Component::Forecast => forecast_prompt(ctx.request(), analysis),
        };

        let selected = ctx.runtime.generate(&prompt).await?;
        let stage = self.stage_name();
        let payload = match self.component {
            Component::Drivers => StagePayload::Drivers(decode_response(stage, &selected.value)?),
            Component::Objections => {
                StagePayload::Objections(decode_response(stage, &selected.value)?)
            }
            Component::Forecast => {
                StagePayload::Forecast(decode_response(stage, &selected.value)?)
            }
        };

        Ok(StageOutcome::new(payload).with_provider(ProviderCategory::Ai, selected.provider))
    }
}
