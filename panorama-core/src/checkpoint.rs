//! Append-only checkpoint store.
//!
//! Every stage outcome is recorded as an immutable checkpoint keyed by
//! session. Records are never rewritten or deleted, so a session's history
//! can always be reconstructed after an abort. Pipeline correctness never
//! depends on a checkpoint landing; only recoverability does.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Mutex;
use uuid::Uuid;

use crate::error::CheckpointError;
use crate::persistence;

/// Checkpoint category for recorded stage results.
pub const CATEGORY_STAGE_RESULT: &str = "stage_result";
/// Checkpoint category for quality gate reports.
pub const CATEGORY_QUALITY_GATE: &str = "quality_gate";

/// One immutable record of a stage outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub session_id: Uuid,
    pub stage: String,
    pub category: String,
    pub payload: serde_json::Value,
    pub recorded_at: DateTime<Utc>,
}

/// Persistence contract for checkpoints.
///
/// `append` adds exactly one record and never touches existing ones;
/// `read_session` returns a session's records in append order.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn append(
        &self,
        session_id: Uuid,
        stage: &str,
        category: &str,
        payload: serde_json::Value,
    ) -> Result<(), CheckpointError>;

    async fn read_session(&self, session_id: Uuid) -> Result<Vec<Checkpoint>, CheckpointError>;
}

fn make_checkpoint(
    session_id: Uuid,
    stage: &str,
    category: &str,
    payload: serde_json::Value,
) -> Checkpoint {
    Checkpoint {
        session_id,
        stage: stage.to_string(),
        category: category.to_string(),
        payload,
        recorded_at: Utc::now(),
    }
}

// ---------------------------------------------------------------------------
// File-backed store
// ---------------------------------------------------------------------------

/// Checkpoint store writing one JSONL file per session.
///
/// Appends open the file in append mode and write a single line, so
/// concurrent sessions never contend and existing records are untouched.
pub struct FileCheckpointStore {
    dir: PathBuf,
}

impl FileCheckpointStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn session_file(&self, session_id: Uuid) -> PathBuf {
        self.dir.join(format!("{}.jsonl", session_id))
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn append(
        &self,
        session_id: Uuid,
        stage: &str,
        category: &str,
        payload: serde_json::Value,
    ) -> Result<(), CheckpointError> {
        let record = make_checkpoint(session_id, stage, category, payload);
        persistence::append_jsonl(&self.session_file(session_id), &record)?;
        Ok(())
    }

    async fn read_session(&self, session_id: Uuid) -> Result<Vec<Checkpoint>, CheckpointError> {
        let records = persistence::read_jsonl(&self.session_file(session_id))?;
        Ok(records)
    }
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

/// In-memory checkpoint store for tests and embedded use.
#[derive(Default)]
pub struct MemoryCheckpointStore {
    records: Mutex<Vec<Checkpoint>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total records across all sessions.
    pub fn len(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn append(
        &self,
        session_id: Uuid,
        stage: &str,
        category: &str,
        payload: serde_json::Value,
    ) -> Result<(), CheckpointError> {
        let record = make_checkpoint(session_id, stage, category, payload);
        if let Ok(mut records) = self.records.lock() {
            records.push(record);
        }
        Ok(())
    }

    async fn read_session(&self, session_id: Uuid) -> Result<Vec<Checkpoint>, CheckpointError> {
        let records = self
            .records
            .lock()
            .map(|r| {
                r.iter()
                    .filter(|c| c.session_id == session_id)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        Ok(records)
    }
}
