//! Analysis session state with persistence.
//!
//! A session tracks one pipeline run: which stages produced what, which
//! providers answered, gate scores, and accumulated warnings. Sessions are
//! persisted as JSON so aborted runs can be inspected and partially
//! recovered alongside their checkpoints.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use uuid::Uuid;

use crate::types::{AnalysisRequest, ProviderCategory, StagePayload};

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Stages are executing.
    Running,
    /// All mandatory stages succeeded and a report was produced.
    Completed,
    /// A mandatory stage failed.
    Aborted,
    /// A mandatory stage's quality gate rejected its output.
    Rejected,
    /// Cancelled between stages.
    Cancelled,
}

/// Outcome of one stage execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Succeeded,
    Failed,
    Skipped,
}

/// The full record of one stage run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageResult {
    pub stage: String,
    pub status: StageStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<StagePayload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
    pub completed_at: DateTime<Utc>,
}

impl StageResult {
    pub fn succeeded(stage: impl Into<String>, payload: StagePayload, duration_ms: u64) -> Self {
        Self {
            stage: stage.into(),
            status: StageStatus::Succeeded,
            payload: Some(payload),
            error: None,
            duration_ms,
            completed_at: Utc::now(),
        }
    }

    pub fn failed(stage: impl Into<String>, error: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            stage: stage.into(),
            status: StageStatus::Failed,
            payload: None,
            error: Some(error.into()),
            duration_ms,
            completed_at: Utc::now(),
        }
    }

    pub fn skipped(stage: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            status: StageStatus::Skipped,
            payload: None,
            error: Some(reason.into()),
            duration_ms: 0,
            completed_at: Utc::now(),
        }
    }
}

/// A mandatory-gate score retained for the final weighted quality score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateScore {
    pub stage: String,
    pub required: bool,
    pub weight: f64,
    pub score: f64,
}

/// One pipeline run over a single analysis request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub request: AnalysisRequest,
    pub status: SessionStatus,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Stage records in execution order.
    pub results: Vec<StageResult>,
    /// Provider actually used per category; last successful call wins.
    pub providers_used: BTreeMap<String, String>,
    /// Gate scores retained for the consolidated quality score.
    pub gate_scores: Vec<GateScore>,
    pub warnings: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Session {
    pub fn new(request: AnalysisRequest) -> Self {
        Self {
            id: Uuid::new_v4(),
            request,
            status: SessionStatus::Running,
            started_at: Utc::now(),
            updated_at: Utc::now(),
            results: Vec::new(),
            providers_used: BTreeMap::new(),
            gate_scores: Vec::new(),
            warnings: Vec::new(),
            error: None,
        }
    }

    pub fn record_stage(&mut self, result: StageResult) {
        self.results.push(result);
        self.updated_at = Utc::now();
    }

    /// Most recent result for a stage.
    pub fn result_for(&self, stage: &str) -> Option<&StageResult> {
        self.results.iter().rev().find(|r| r.stage == stage)
    }

    pub fn stage_succeeded(&self, stage: &str) -> bool {
        self.result_for(stage)
            .map(|r| r.status == StageStatus::Succeeded)
            .unwrap_or(false)
    }

    /// Payload of a stage's most recent successful run.
    pub fn successful_payload(&self, stage: &str) -> Option<&StagePayload> {
        self.result_for(stage)
            .filter(|r| r.status == StageStatus::Succeeded)
            .and_then(|r| r.payload.as_ref())
    }

    pub fn note_provider(&mut self, category: ProviderCategory, name: &str) {
        self.providers_used
            .insert(category.to_string(), name.to_string());
        self.updated_at = Utc::now();
    }

    pub fn record_gate(&mut self, gate: GateScore) {
        self.gate_scores.push(gate);
        self.updated_at = Utc::now();
    }

    pub fn warn(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
        self.updated_at = Utc::now();
    }

    pub fn complete(&mut self) {
        self.status = SessionStatus::Completed;
        self.updated_at = Utc::now();
    }

    pub fn abort(&mut self, error: impl Into<String>) {
        self.status = SessionStatus::Aborted;
        self.error = Some(error.into());
        self.updated_at = Utc::now();
    }

    pub fn reject(&mut self, error: impl Into<String>) {
        self.status = SessionStatus::Rejected;
        self.error = Some(error.into());
        self.updated_at = Utc::now();
    }

    pub fn cancel(&mut self) {
        self.status = SessionStatus::Cancelled;
        self.updated_at = Utc::now();
    }

    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Running
    }

    /// Persist the session under `base_dir/sessions/`.
    pub fn save(&self, base_dir: &Path) -> Result<(), std::io::Error> {
        let path = base_dir.join("sessions").join(format!("{}.json", self.id));
        crate::persistence::write_json_atomic(&path, self)
    }

    /// Load a session from disk, `Ok(None)` if it does not exist.
    pub fn load(base_dir: &Path, session_id: Uuid) -> Result<Option<Self>, std::io::Error> {
        let path = base_dir
            .join("sessions")
            .join(format!("{}.json", session_id));
        crate::persistence::read_json(&path)
    }

    /// Summaries of all saved sessions, most recently updated first.
    /// Unreadable files are skipped.
    pub fn list(base_dir: &Path) -> Vec<SessionSummary> {
        let dir = base_dir.join("sessions");
        if !dir.exists() {
            return Vec::new();
        }

        let mut summaries = Vec::new();
        if let Ok(entries) = std::fs::read_dir(&dir) {
            for entry in entries.flatten() {
                if entry
                    .path()
                    .extension()
                    .map(|e| e == "json")
                    .unwrap_or(false)
                {
                    if let Ok(Some(session)) =
                        crate::persistence::read_json::<Session>(&entry.path())
                    {
                        summaries.push(SessionSummary {
                            id: session.id,
                            segment: session.request.segment.clone(),
                            status: session.status,
                            stages_recorded: session.results.len(),
                            started_at: session.started_at,
                            updated_at: session.updated_at,
                        });
                    }
                }
            }
        }

        summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        summaries
    }
}

/// Compact view of a session for listings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: Uuid,
    pub segment: String,
    pub status: SessionStatus,
    pub stages_recorded: usize,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
