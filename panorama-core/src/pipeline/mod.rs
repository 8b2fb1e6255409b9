//! Pipeline assembly and session orchestration.
//!
//! [`Pipeline`] wires providers, registry, checkpoint store, and the stage
//! sequencer into one entry point. A pipeline is cheap to share: `analyze`
//! takes `&self`, so concurrent sessions run against the same provider
//! health table while each session stays strictly sequential inside.

pub mod progress;
pub mod sequencer;
pub mod stage;

pub use progress::{NoOpProgress, ProgressObserver, RecordingProgress};
pub use sequencer::StageSequencer;
pub use stage::{
    StageContext, StageOutcome, StagePlan, StageRuntime, StageSpec, StageWorker, STAGE_DRIVERS,
    STAGE_FORECAST, STAGE_OBJECTIONS, STAGE_RESEARCH, STAGE_SYNTHESIS,
};

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::checkpoint::{CheckpointStore, FileCheckpointStore};
use crate::config::PanoramaConfig;
use crate::consolidate::consolidate;
use crate::error::Result;
use crate::providers::{
    build_ai_providers, build_research_providers, AiProvider, FallbackSelector, ProviderHealth,
    ProviderName, ProviderRegistry, ResearchProvider,
};
use crate::session::Session;
use crate::stages::standard_workers;
use crate::types::{AnalysisRequest, FinalReport, ProviderCategory};

/// The assembled market-analysis pipeline.
pub struct Pipeline {
    sequencer: StageSequencer,
    registry: Arc<ProviderRegistry>,
    checkpoints: Arc<dyn CheckpointStore>,
    data_dir: PathBuf,
    forecast_required: bool,
}

impl Pipeline {
    /// Build the production pipeline from configuration.
    ///
    /// Providers come from the config's ordered lists, checkpoints go to the
    /// configured data directory, and progress reporting is a no-op until an
    /// observer is attached.
    pub fn from_config(config: &PanoramaConfig) -> Result<Self> {
        let ai = build_ai_providers(config)?;
        let research = build_research_providers(config)?;
        let checkpoints: Arc<dyn CheckpointStore> =
            Arc::new(FileCheckpointStore::new(config.storage.checkpoint_dir()));
        Self::assemble(config, ai, research, checkpoints, Arc::new(NoOpProgress))
    }

    /// Build a pipeline around explicit providers and stores.
    ///
    /// Providers are registered in the health table by their own names, in
    /// the order given; that order is the fallback priority.
    pub fn assemble(
        config: &PanoramaConfig,
        ai: Vec<Arc<dyn AiProvider>>,
        research: Vec<Arc<dyn ResearchProvider>>,
        checkpoints: Arc<dyn CheckpointStore>,
        observer: Arc<dyn ProgressObserver>,
    ) -> Result<Self> {
        let mut registry = ProviderRegistry::new(
            config.fallback.failure_threshold,
            Duration::from_secs(config.fallback.cooldown_secs),
        );
        for provider in &research {
            registry.register(provider.name(), ProviderCategory::Research);
        }
        for provider in &ai {
            registry.register(provider.name(), ProviderCategory::Ai);
        }
        let registry = Arc::new(registry);

        let selector = FallbackSelector::new(
            registry.clone(),
            Duration::from_secs(config.fallback.call_timeout_secs),
        );
        let runtime = Arc::new(StageRuntime::new(
            selector,
            ai,
            research,
            &config.fallback,
            config.stages.clone(),
        ));

        let forecast_required = config.stages.forecast_required;
        let sequencer = StageSequencer::new(
            StagePlan::standard(forecast_required),
            standard_workers(),
            runtime,
            checkpoints.clone(),
            observer,
            config.quality.clone(),
        )?;

        Ok(Self {
            sequencer,
            registry,
            checkpoints,
            data_dir: config.storage.resolve_data_dir(),
            forecast_required,
        })
    }

    /// Run one full analysis session.
    pub async fn analyze(&self, request: AnalysisRequest) -> Result<FinalReport> {
        self.analyze_with_cancel(request, CancellationToken::new())
            .await
    }

    /// Run one full analysis session under a cancellation token.
    ///
    /// Cancellation takes effect between stages; a provider call already in
    /// flight finishes first.
    pub async fn analyze_with_cancel(
        &self,
        request: AnalysisRequest,
        cancel: CancellationToken,
    ) -> Result<FinalReport> {
        request.validate()?;
        let mut session = Session::new(request);
        info!(
            session_id = %session.id,
            segment = %session.request.segment,
            "Session started"
        );

        if let Err(e) = self.sequencer.run(&mut session, &cancel).await {
            self.persist_session(&session);
            return Err(e);
        }

        let report = match consolidate(&session, self.sequencer.plan()) {
            Ok(report) => report,
            Err(e) => {
                self.persist_session(&session);
                return Err(e.into());
            }
        };
        session.complete();
        self.persist_session(&session);
        info!(
            session_id = %session.id,
            quality_score = report.quality_score,
            warnings = report.metadata.warnings.len(),
            "Session completed"
        );
        Ok(report)
    }

    /// Current health of every registered provider.
    pub fn provider_health(&self) -> Vec<ProviderHealth> {
        self.registry.snapshot()
    }

    /// Re-enable providers after operator intervention.
    pub fn reset_providers(&self, category: ProviderCategory, name: Option<&str>) {
        self.registry.reset(category, name);
    }

    pub fn checkpoints(&self) -> &Arc<dyn CheckpointStore> {
        &self.checkpoints
    }

    pub fn data_dir(&self) -> &PathBuf {
        &self.data_dir
    }

    pub fn forecast_required(&self) -> bool {
        self.forecast_required
    }

    /// Session snapshots are best-effort; a write failure costs the snapshot,
    /// never the session.
    fn persist_session(&self, session: &Session) {
        if let Err(e) = session.save(&self.data_dir) {
            warn!(session_id = %session.id, error = %e, "Failed to persist session snapshot");
        }
    }
}
