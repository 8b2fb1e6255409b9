//! Stage sequencer.
//!
//! Runs a session's stage plan in strict ordinal order. Every stage result
//! is checkpointed before the next stage starts; gate evaluation sits
//! between a stage's output and its acceptance. Mandatory failures abort
//! the session, optional failures degrade to warnings. Cancellation is
//! honored between stages only, so an in-flight provider call always runs
//! to completion.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::checkpoint::{CheckpointStore, CATEGORY_QUALITY_GATE, CATEGORY_STAGE_RESULT};
use crate::config::QualityConfig;
use crate::error::{PanoramaError, PipelineError, StageError};
use crate::pipeline::progress::ProgressObserver;
use crate::pipeline::stage::{StageContext, StagePlan, StageRuntime, StageSpec, StageWorker};
use crate::quality::{self, QualityGateReport, RuleSet};
use crate::session::{GateScore, Session, StageResult};
use crate::types::PayloadKind;

/// Executes a stage plan over one session at a time.
pub struct StageSequencer {
    plan: StagePlan,
    workers: HashMap<String, Arc<dyn StageWorker>>,
    runtime: Arc<StageRuntime>,
    checkpoints: Arc<dyn CheckpointStore>,
    observer: Arc<dyn ProgressObserver>,
    quality: QualityConfig,
}

impl StageSequencer {
    pub fn new(
        plan: StagePlan,
        workers: HashMap<String, Arc<dyn StageWorker>>,
        runtime: Arc<StageRuntime>,
        checkpoints: Arc<dyn CheckpointStore>,
        observer: Arc<dyn ProgressObserver>,
        quality: QualityConfig,
    ) -> Result<Self, PanoramaError> {
        for spec in &plan.stages {
            if !workers.contains_key(&spec.name) {
                return Err(PanoramaError::Config {
                    message: format!("no worker registered for stage '{}'", spec.name),
                });
            }
        }
        Ok(Self {
            plan,
            workers,
            runtime,
            checkpoints,
            observer,
            quality,
        })
    }

    pub fn plan(&self) -> &StagePlan {
        &self.plan
    }

    /// Run every stage of the plan against the session.
    ///
    /// On success the session holds a successful result for every mandatory
    /// stage and is ready for consolidation. Terminal pipeline outcomes
    /// (`SessionAborted`, `QualityRejected`, `Cancelled`) come back as
    /// errors with the session already marked accordingly.
    pub async fn run(
        &self,
        session: &mut Session,
        cancel: &CancellationToken,
    ) -> Result<(), PanoramaError> {
        let total = self.plan.len();

        for spec in &self.plan.stages {
            if cancel.is_cancelled() {
                info!(session_id = %session.id, stage = %spec.name, "Session cancelled");
                session.cancel();
                return Err(PipelineError::Cancelled {
                    stage: spec.name.clone(),
                }
                .into());
            }

            if let Some(missing) = spec
                .depends_on
                .iter()
                .find(|dep| !session.stage_succeeded(dep))
            {
                self.handle_missing_dependency(session, spec, missing)
                    .await?;
                continue;
            }

            self.observer
                .on_stage_started(session.id, &spec.name, spec.ordinal, total);
            info!(
                session_id = %session.id,
                stage = %spec.name,
                ordinal = spec.ordinal,
                "Stage started"
            );

            let started = Instant::now();
            let outcome = {
                let ctx = StageContext {
                    session,
                    runtime: &self.runtime,
                };
                let worker = &self.workers[&spec.name];
                worker.run(&ctx).await
            };
            let duration_ms = started.elapsed().as_millis() as u64;

            match outcome {
                Ok(outcome) => {
                    for (category, name) in &outcome.providers_used {
                        session.note_provider(*category, name);
                    }
                    for warning in outcome.warnings {
                        self.observer.on_warning(session.id, &warning);
                        session.warn(warning);
                    }
                    self.apply_gate(session, spec, outcome.payload, duration_ms)
                        .await?;
                }
                Err(stage_error) => {
                    self.handle_stage_error(session, spec, stage_error, duration_ms)
                        .await?;
                }
            }
        }

        Ok(())
    }

    /// Evaluate the stage's gate and record the result.
    async fn apply_gate(
        &self,
        session: &mut Session,
        spec: &StageSpec,
        payload: crate::types::StagePayload,
        duration_ms: u64,
    ) -> Result<(), PanoramaError> {
        let ruleset = self.ruleset_for(spec.output);
        let report = quality::evaluate(&spec.name, &payload, &ruleset);

        session.record_gate(GateScore {
            stage: spec.name.clone(),
            required: spec.required,
            weight: ruleset.gate_weight as f64,
            score: report.score as f64,
        });

        if report.passed {
            let result = StageResult::succeeded(&spec.name, payload, duration_ms);
            self.checkpoint_stage(session, &result).await;
            self.checkpoint_gate(session, &report).await;
            self.observer
                .on_stage_completed(session.id, &spec.name, report.score);
            info!(
                session_id = %session.id,
                stage = %spec.name,
                score = report.score,
                duration_ms,
                "Stage completed"
            );
            session.record_stage(result);
            return Ok(());
        }

        if spec.required {
            // Keep the rejected output recoverable before failing the session.
            let result = StageResult::succeeded(&spec.name, payload, duration_ms);
            self.checkpoint_stage(session, &result).await;
            self.checkpoint_gate(session, &report).await;
            session.record_stage(result);

            let message = format!(
                "quality gate rejected stage '{}': score {} (min {}), violations: {}",
                spec.name,
                report.score,
                ruleset.min_score,
                report.violations.join("; ")
            );
            self.observer
                .on_stage_failed(session.id, &spec.name, &message);
            warn!(session_id = %session.id, stage = %spec.name, score = report.score, "Quality gate rejected mandatory stage");
            session.reject(&message);
            return Err(PipelineError::QualityRejected {
                report: Box::new(report),
            }
            .into());
        }

        let reason = format!(
            "quality gate failed: score {} (min {}), violations: {}",
            report.score,
            ruleset.min_score,
            report.violations.join("; ")
        );
        let result = StageResult::failed(&spec.name, &reason, duration_ms);
        self.checkpoint_stage(session, &result).await;
        self.checkpoint_gate(session, &report).await;
        session.record_stage(result);

        let warning = format!("optional stage '{}' dropped: {}", spec.name, reason);
        self.observer.on_warning(session.id, &warning);
        warn!(session_id = %session.id, stage = %spec.name, score = report.score, "Optional stage gate failed");
        session.warn(warning);
        Ok(())
    }

    async fn handle_stage_error(
        &self,
        session: &mut Session,
        spec: &StageSpec,
        stage_error: StageError,
        duration_ms: u64,
    ) -> Result<(), PanoramaError> {
        let message = stage_error.to_string();
        let result = StageResult::failed(&spec.name, &message, duration_ms);
        self.checkpoint_stage(session, &result).await;
        session.record_stage(result);
        self.observer
            .on_stage_failed(session.id, &spec.name, &message);

        if spec.required {
            warn!(
                session_id = %session.id,
                stage = %spec.name,
                error = %message,
                "Mandatory stage failed, aborting session"
            );
            session.abort(&message);
            return Err(PipelineError::SessionAborted {
                stage: spec.name.clone(),
                cause: Box::new(stage_error),
            }
            .into());
        }

        let warning = format!("optional stage '{}' failed: {}", spec.name, message);
        warn!(session_id = %session.id, stage = %spec.name, error = %message, "Optional stage failed, continuing");
        self.observer.on_warning(session.id, &warning);
        session.warn(warning);
        Ok(())
    }

    async fn handle_missing_dependency(
        &self,
        session: &mut Session,
        spec: &StageSpec,
        missing: &str,
    ) -> Result<(), PanoramaError> {
        let stage_error = StageError::MissingDependency {
            stage: missing.to_string(),
        };
        if spec.required {
            let message = stage_error.to_string();
            let result = StageResult::failed(&spec.name, &message, 0);
            self.checkpoint_stage(session, &result).await;
            session.record_stage(result);
            self.observer
                .on_stage_failed(session.id, &spec.name, &message);
            session.abort(&message);
            return Err(PipelineError::SessionAborted {
                stage: spec.name.clone(),
                cause: Box::new(stage_error),
            }
            .into());
        }

        let reason = format!("dependency '{}' did not succeed", missing);
        let result = StageResult::skipped(&spec.name, &reason);
        self.checkpoint_stage(session, &result).await;
        session.record_stage(result);

        let warning = format!("stage '{}' skipped: {}", spec.name, reason);
        self.observer.on_warning(session.id, &warning);
        warn!(session_id = %session.id, stage = %spec.name, missing, "Stage skipped, dependency missing");
        session.warn(warning);
        Ok(())
    }

    /// Append a stage-result checkpoint. Failures are logged and recorded
    /// as warnings; they never affect control flow.
    async fn checkpoint_stage(&self, session: &mut Session, result: &StageResult) {
        let payload = match serde_json::to_value(result) {
            Ok(value) => value,
            Err(e) => {
                warn!(session_id = %session.id, stage = %result.stage, error = %e, "Checkpoint encode failed");
                session.warn(format!(
                    "checkpoint encode failed for stage '{}': {}",
                    result.stage, e
                ));
                return;
            }
        };
        if let Err(e) = self
            .checkpoints
            .append(session.id, &result.stage, CATEGORY_STAGE_RESULT, payload)
            .await
        {
            warn!(session_id = %session.id, stage = %result.stage, error = %e, "Checkpoint write failed");
            session.warn(format!(
                "checkpoint write failed for stage '{}': {}",
                result.stage, e
            ));
        }
    }

    async fn checkpoint_gate(&self, session: &mut Session, report: &QualityGateReport) {
        let payload = match serde_json::to_value(report) {
            Ok(value) => value,
            Err(e) => {
                warn!(session_id = %session.id, stage = %report.stage, error = %e, "Gate checkpoint encode failed");
                return;
            }
        };
        if let Err(e) = self
            .checkpoints
            .append(session.id, &report.stage, CATEGORY_QUALITY_GATE, payload)
            .await
        {
            warn!(session_id = %session.id, stage = %report.stage, error = %e, "Gate checkpoint write failed");
            session.warn(format!(
                "checkpoint write failed for gate '{}': {}",
                report.stage, e
            ));
        }
    }

    fn ruleset_for(&self, kind: PayloadKind) -> RuleSet {
        match kind {
            PayloadKind::Research => quality::research_ruleset(&self.quality),
            PayloadKind::Synthesis => quality::synthesis_ruleset(&self.quality),
            PayloadKind::Drivers => quality::drivers_ruleset(&self.quality),
            PayloadKind::Objections => quality::objections_ruleset(&self.quality),
            PayloadKind::Forecast => quality::forecast_ruleset(&self.quality),
        }
    }
}
