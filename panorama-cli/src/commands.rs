//! CLI subcommand handlers.

use crate::render::{self, ReportFormat};
use crate::{Commands, ConfigAction, ProvidersAction, SessionsAction};
use anyhow::Context;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use panorama_core::checkpoint::{CheckpointStore, FileCheckpointStore};
use panorama_core::providers::{build_ai_providers, build_research_providers};
use panorama_core::{
    AnalysisRequest, PanoramaConfig, PanoramaError, Pipeline, PipelineError, ProviderName,
    Session, SessionStatus,
};

/// Exit code when a mandatory quality gate rejects a session.
const EXIT_QUALITY_REJECTED: u8 = 2;
/// Exit code when a mandatory stage fails outright.
const EXIT_SESSION_ABORTED: u8 = 3;

/// Handle a CLI subcommand.
pub async fn handle_command(command: Commands, workspace: &Path) -> anyhow::Result<ExitCode> {
    match command {
        Commands::Analyze {
            segment,
            product,
            audience,
            format,
            output,
            session_dir,
            require_forecast,
        } => {
            handle_analyze(
                workspace,
                segment,
                product,
                audience,
                format,
                output,
                session_dir,
                require_forecast,
            )
            .await
        }
        Commands::Sessions { action } => handle_sessions(action, workspace).await,
        Commands::Providers { action } => handle_providers(action, workspace),
        Commands::Config { action } => handle_config(action, workspace),
    }
}

#[allow(clippy::too_many_arguments)]
async fn handle_analyze(
    workspace: &Path,
    segment: String,
    product: Option<String>,
    audience: Option<String>,
    format: ReportFormat,
    output: Option<PathBuf>,
    session_dir: Option<PathBuf>,
    require_forecast: bool,
) -> anyhow::Result<ExitCode> {
    let mut config = load_config(workspace)?;
    if let Some(dir) = session_dir {
        config.storage.data_dir = Some(dir);
    }
    if require_forecast {
        config.stages.forecast_required = true;
    }

    let pipeline = Pipeline::from_config(&config)?;

    let mut request = AnalysisRequest::new(segment);
    if let Some(product) = product {
        request = request.with_product(product);
    }
    if let Some(audience) = audience {
        request = request.with_target_audience(audience);
    }

    // Ctrl-C stops the session at the next stage boundary; the partial
    // session and its checkpoints stay on disk.
    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nCancelling after the current stage...");
            signal_cancel.cancel();
        }
    });

    match pipeline.analyze_with_cancel(request, cancel).await {
        Ok(report) => {
            let session_id = report.session_id;
            let rendered = render::render_report(&report, format)?;
            match output {
                Some(path) => {
                    std::fs::write(&path, rendered)
                        .with_context(|| format!("writing report to {}", path.display()))?;
                    println!("Report written to {}", path.display());
                }
                None => println!("{}", rendered),
            }
            eprintln!(
                "Session {} completed (quality score {}).",
                session_id, report.quality_score
            );
            Ok(ExitCode::SUCCESS)
        }
        Err(PanoramaError::Pipeline(PipelineError::QualityRejected { report })) => {
            eprintln!(
                "Quality gate rejected stage '{}' with score {}.",
                report.stage, report.score
            );
            for violation in &report.violations {
                eprintln!("  - {}", violation);
            }
            eprintln!(
                "The stage output is checkpointed. Find the session with \
                 `panorama sessions list`, then inspect it with \
                 `panorama sessions checkpoints <id>`."
            );
            Ok(ExitCode::from(EXIT_QUALITY_REJECTED))
        }
        Err(PanoramaError::Pipeline(PipelineError::SessionAborted { stage, cause })) => {
            eprintln!("Session aborted at stage '{}': {}", stage, cause);
            eprintln!("Completed stages are checkpointed and recoverable.");
            Ok(ExitCode::from(EXIT_SESSION_ABORTED))
        }
        Err(e) => Err(e.into()),
    }
}

async fn handle_sessions(action: SessionsAction, workspace: &Path) -> anyhow::Result<ExitCode> {
    let config = load_config(workspace)?;
    let data_dir = config.storage.resolve_data_dir();

    match action {
        SessionsAction::List => {
            let summaries = Session::list(&data_dir);
            if summaries.is_empty() {
                println!("No sessions recorded under {}", data_dir.display());
                return Ok(ExitCode::SUCCESS);
            }
            println!("{} session(s):", summaries.len());
            for summary in &summaries {
                println!(
                    "  {}  {:<9}  {} stage(s)  {}  {}",
                    summary.id,
                    status_label(summary.status),
                    summary.stages_recorded,
                    summary.updated_at.format("%Y-%m-%d %H:%M:%S"),
                    summary.segment
                );
            }
            Ok(ExitCode::SUCCESS)
        }
        SessionsAction::Show { id } => {
            let id = parse_session_id(&id)?;
            let session = Session::load(&data_dir, id)?.ok_or_else(|| {
                anyhow::anyhow!("no session {} under {}", id, data_dir.display())
            })?;

            println!("Session {}", session.id);
            println!("  segment:  {}", session.request.segment);
            println!("  status:   {}", status_label(session.status));
            println!(
                "  started:  {}",
                session.started_at.format("%Y-%m-%d %H:%M:%S")
            );
            if let Some(error) = &session.error {
                println!("  error:    {}", error);
            }

            if !session.results.is_empty() {
                println!("  stages:");
                for result in &session.results {
                    match &result.error {
                        Some(error) => println!(
                            "    {:<12} {:<9} {}",
                            result.stage,
                            format!("{:?}", result.status).to_lowercase(),
                            error
                        ),
                        None => println!(
                            "    {:<12} {:<9} {} ms",
                            result.stage,
                            format!("{:?}", result.status).to_lowercase(),
                            result.duration_ms
                        ),
                    }
                }
            }
            if !session.gate_scores.is_empty() {
                println!("  gates:");
                for gate in &session.gate_scores {
                    println!(
                        "    {:<12} score {:<5} weight {}{}",
                        gate.stage,
                        gate.score,
                        gate.weight,
                        if gate.required { "" } else { "  (optional)" }
                    );
                }
            }
            if !session.providers_used.is_empty() {
                println!("  providers:");
                for (category, provider) in &session.providers_used {
                    println!("    {:<12} {}", category, provider);
                }
            }
            if !session.warnings.is_empty() {
                println!("  warnings:");
                for warning in &session.warnings {
                    println!("    - {}", warning);
                }
            }
            Ok(ExitCode::SUCCESS)
        }
        SessionsAction::Checkpoints { id, stage } => {
            let id = parse_session_id(&id)?;
            let store = FileCheckpointStore::new(config.storage.checkpoint_dir());
            let records = store.read_session(id).await?;
            if records.is_empty() {
                println!("No checkpoints for session {}", id);
                return Ok(ExitCode::SUCCESS);
            }

            match stage {
                Some(stage) => {
                    let matching: Vec<_> =
                        records.iter().filter(|c| c.stage == stage).collect();
                    if matching.is_empty() {
                        anyhow::bail!("no checkpoints for stage '{}' in session {}", stage, id);
                    }
                    for record in matching {
                        println!(
                            "--- {} ({}, {})",
                            record.stage,
                            record.category,
                            record.recorded_at.format("%Y-%m-%d %H:%M:%S")
                        );
                        println!("{}", serde_json::to_string_pretty(&record.payload)?);
                    }
                }
                None => {
                    println!("{} checkpoint(s) for session {}:", records.len(), id);
                    for record in &records {
                        println!(
                            "  {:<12} {:<13} {}",
                            record.stage,
                            record.category,
                            record.recorded_at.format("%Y-%m-%d %H:%M:%S")
                        );
                    }
                    println!("Use --stage <name> to print a stage's full payload.");
                }
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn handle_providers(action: ProvidersAction, workspace: &Path) -> anyhow::Result<ExitCode> {
    let config = load_config(workspace)?;
    match action {
        ProvidersAction::Status => {
            let usable_ai: Vec<String> = build_ai_providers(&config)
                .map(|providers| providers.iter().map(|p| p.name().to_string()).collect())
                .unwrap_or_default();
            let usable_research: Vec<String> = build_research_providers(&config)
                .map(|providers| providers.iter().map(|p| p.name().to_string()).collect())
                .unwrap_or_default();

            println!("AI providers (fallback order):");
            for entry in &config.providers.ai {
                println!(
                    "  {:<10} {:<28} {}",
                    entry.name,
                    entry.model,
                    credential_label(usable_ai.contains(&entry.name), entry.api_key_env.as_deref())
                );
            }
            println!("Research providers (fallback order):");
            for entry in &config.providers.research {
                println!(
                    "  {:<10} {:<28} {}",
                    entry.name,
                    "-",
                    credential_label(
                        usable_research.contains(&entry.name),
                        entry.api_key_env.as_deref()
                    )
                );
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn handle_config(action: ConfigAction, workspace: &Path) -> anyhow::Result<ExitCode> {
    match action {
        ConfigAction::Init => {
            let config_dir = workspace.join(".panorama");
            std::fs::create_dir_all(&config_dir)?;

            let config_path = config_dir.join("config.toml");
            if config_path.exists() {
                println!(
                    "Configuration file already exists at: {}",
                    config_path.display()
                );
                return Ok(ExitCode::SUCCESS);
            }

            let default_config = PanoramaConfig::default();
            let toml_str = toml::to_string_pretty(&default_config)?;
            std::fs::write(&config_path, &toml_str)?;
            println!(
                "Created default configuration at: {}",
                config_path.display()
            );
            Ok(ExitCode::SUCCESS)
        }
        ConfigAction::Show => {
            let config = load_config(workspace)?;
            let toml_str = toml::to_string_pretty(&config)?;
            println!("{}", toml_str);
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn load_config(workspace: &Path) -> anyhow::Result<PanoramaConfig> {
    panorama_core::config::load_config(Some(workspace), None)
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))
}

fn parse_session_id(raw: &str) -> anyhow::Result<Uuid> {
    Uuid::parse_str(raw).with_context(|| format!("'{}' is not a valid session ID", raw))
}

fn status_label(status: SessionStatus) -> &'static str {
    match status {
        SessionStatus::Running => "running",
        SessionStatus::Completed => "completed",
        SessionStatus::Rejected => "rejected",
        SessionStatus::Aborted => "aborted",
        SessionStatus::Cancelled => "cancelled",
    }
}

fn credential_label(usable: bool, env_var: Option<&str>) -> String {
    if usable {
        "ready".to_string()
    } else {
        match env_var {
            Some(var) => format!("missing credentials (set {})", var),
            None => "missing credentials".to_string(),
        }
    }
}
