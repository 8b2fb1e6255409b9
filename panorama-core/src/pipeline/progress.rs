//! Progress notifications for pipeline consumers.

use uuid::Uuid;

/// Callback trait for stage-by-stage progress updates.
///
/// Notifications are best-effort: implementations must not block or fail,
/// and the pipeline never waits on them.
pub trait ProgressObserver: Send + Sync {
    /// A stage is about to run.
    fn on_stage_started(&self, session_id: Uuid, stage: &str, ordinal: usize, total: usize);
    /// A stage finished and passed its gate.
    fn on_stage_completed(&self, session_id: Uuid, stage: &str, gate_score: u8);
    /// A stage failed or its gate rejected the output.
    fn on_stage_failed(&self, session_id: Uuid, stage: &str, error: &str);
    /// A non-fatal problem was recorded.
    fn on_warning(&self, session_id: Uuid, message: &str);
}

/// No-op observer for headless and test use.
pub struct NoOpProgress;

impl ProgressObserver for NoOpProgress {
    fn on_stage_started(&self, _session_id: Uuid, _stage: &str, _ordinal: usize, _total: usize) {}
    fn on_stage_completed(&self, _session_id: Uuid, _stage: &str, _gate_score: u8) {}
    fn on_stage_failed(&self, _session_id: Uuid, _stage: &str, _error: &str) {}
    fn on_warning(&self, _session_id: Uuid, _message: &str) {}
}

/// Observer that records every notification, for assertions in tests.
pub struct RecordingProgress {
    started: std::sync::Mutex<Vec<String>>,
    completed: std::sync::Mutex<Vec<(String, u8)>>,
    failed: std::sync::Mutex<Vec<(String, String)>>,
    warnings: std::sync::Mutex<Vec<String>>,
}

impl RecordingProgress {
    pub fn new() -> Self {
        Self {
            started: std::sync::Mutex::new(Vec::new()),
            completed: std::sync::Mutex::new(Vec::new()),
            failed: std::sync::Mutex::new(Vec::new()),
            warnings: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn started(&self) -> Vec<String> {
        self.started.lock().map(|v| v.clone()).unwrap_or_default()
    }

    pub fn completed(&self) -> Vec<(String, u8)> {
        self.completed.lock().map(|v| v.clone()).unwrap_or_default()
    }

    pub fn failed(&self) -> Vec<(String, String)> {
        self.failed.lock().map(|v| v.clone()).unwrap_or_default()
    }

    pub fn warnings(&self) -> Vec<String> {
        self.warnings.lock().map(|v| v.clone()).unwrap_or_default()
    }
}

impl Default for RecordingProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressObserver for RecordingProgress {
    fn on_stage_started(&self, _session_id: Uuid, stage: &str, _ordinal: usize, _total: usize) {
        if let Ok(mut started) = self.started.lock() {
            started.push(stage.to_string());
        }
    }

    fn on_stage_completed(&self, _session_id: Uuid, stage: &str, gate_score: u8) {
        if let Ok(mut completed) = self.completed.lock() {
            completed.push((stage.to_string(), gate_score));
        }
    }

    fn on_stage_failed(&self, _session_id: Uuid, stage: &str, error: &str) {
        if let Ok(mut failed) = self.failed.lock() {
            failed.push((stage.to_string(), error.to_string()));
        }
    }

    fn on_warning(&self, _session_id: Uuid, message: &str) {
        if let Ok(mut warnings) = self.warnings.lock() {
            warnings.push(message.to_string());
        }
    }
}
