//! # Panorama Core
//!
//! Core library for the Panorama market-analysis pipeline.
//! Provides the stage sequencer, provider fallback selector, quality gate
//! evaluator, checkpoint store, consolidator, configuration, and the
//! fundamental types flowing between them.

pub mod checkpoint;
pub mod config;
pub mod consolidate;
pub mod error;
pub mod persistence;
pub mod pipeline;
pub mod providers;
pub mod quality;
pub mod session;
pub mod stages;
pub mod types;

// Re-export commonly used types at the crate root.
pub use checkpoint::{Checkpoint, CheckpointStore, FileCheckpointStore, MemoryCheckpointStore};
pub use config::PanoramaConfig;
pub use consolidate::consolidate;
pub use error::{
    AllProvidersFailed, PanoramaError, PipelineError, ProviderError, Result, StageError,
};
pub use pipeline::{NoOpProgress, Pipeline, ProgressObserver, StagePlan, StageSequencer};
pub use providers::{
    AiProvider, FallbackSelector, ProviderHealth, ProviderName, ProviderRegistry,
    ResearchProvider, Selected,
};
pub use quality::{QualityGateReport, RuleSet};
pub use session::{Session, SessionStatus, SessionSummary, StageResult, StageStatus};
pub use types::{
    AnalysisRequest, FinalReport, MarketAnalysis, PayloadKind, ProviderCategory, ReportMetadata,
    ResearchSummary, SearchHit, StagePayload,
};
