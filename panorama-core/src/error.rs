//! Error types for the Panorama pipeline core.
//!
//! Uses `thiserror` for public API error types with structured variants
//! covering input validation, pipeline control flow, provider calls,
//! checkpointing, and consolidation.

use crate::quality::QualityGateReport;
use crate::types::ProviderCategory;

/// Top-level error type for the Panorama core library.
#[derive(Debug, thiserror::Error)]
pub enum PanoramaError {
    #[error("Input validation failed: {message}")]
    InputValidation { message: String },

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("Consolidation error: {0}")]
    Consolidate(#[from] ConsolidateError),

    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Terminal pipeline outcomes that are not a `FinalReport`.
///
/// `SessionAborted` and `QualityRejected` are expected control-flow results
/// of running a session, not programmer errors; callers are expected to
/// match on them and recover partial work from the checkpoint store.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Session aborted at stage '{stage}': {cause}")]
    SessionAborted { stage: String, cause: Box<StageError> },

    #[error(
        "Quality gate rejected stage '{}': score {} with {} violation(s)",
        .report.stage,
        .report.score,
        .report.violations.len()
    )]
    QualityRejected { report: Box<QualityGateReport> },

    #[error("Session cancelled before stage '{stage}'")]
    Cancelled { stage: String },
}

/// Errors produced by a single stage's work function.
#[derive(Debug, thiserror::Error)]
pub enum StageError {
    #[error(transparent)]
    AllProvidersFailed(#[from] AllProvidersFailed),

    #[error("Provider call failed: {0}")]
    Provider(#[from] ProviderError),

    #[error("Response decode failed: {message}")]
    Decode { message: String },

    #[error("Missing dependency output from stage '{stage}'")]
    MissingDependency { stage: String },

    #[error("{message}")]
    Execution { message: String },
}

/// Errors from a single external provider call.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("API request failed: {message}")]
    ApiRequest { message: String },

    #[error("API response parse error: {message}")]
    ResponseParse { message: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("Provider connection failed: {message}")]
    Connection { message: String },
}

/// Every eligible provider in a category failed or was disabled for one call.
///
/// Carries the full attempt history so callers can report exactly which
/// provider failed with which error, in order.
#[derive(Debug, thiserror::Error)]
#[error(
    "All {category} providers failed after {} attempt(s): {}",
    .attempts.len(),
    format_attempts(.attempts)
)]
pub struct AllProvidersFailed {
    pub category: ProviderCategory,
    pub attempts: Vec<ProviderAttempt>,
}

/// One failed provider invocation inside an exhausted fallback chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderAttempt {
    pub provider: String,
    pub error: String,
}

fn format_attempts(attempts: &[ProviderAttempt]) -> String {
    attempts
        .iter()
        .map(|a| format!("{}: {}", a.provider, a.error))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Errors from the checkpoint store.
#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    #[error("Checkpoint IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Checkpoint record encode error: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Errors from the consolidator.
#[derive(Debug, thiserror::Error)]
pub enum ConsolidateError {
    #[error(
        "Incomplete session: no successful result for mandatory stage(s): {}",
        .missing.join(", ")
    )]
    IncompleteSession { missing: Vec<String> },

    #[error("Report section encode error for stage '{stage}': {source}")]
    Encode {
        stage: String,
        #[source]
        source: serde_json::Error,
    },
}

/// A type alias for results using the top-level `PanoramaError`.
pub type Result<T> = std::result::Result<T, PanoramaError>;
