//! Panorama CLI: staged market analysis from the terminal.
//!
//! Runs full analysis sessions and inspects persisted sessions,
//! checkpoints, and provider configuration.

mod commands;
mod render;

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::render::ReportFormat;

/// Panorama: staged market analysis with quality gates
#[derive(Parser, Debug)]
#[command(name = "panorama", version, about, long_about = None)]
struct Cli {
    /// Workspace directory (holds .panorama/config.toml)
    #[arg(short, long, default_value = ".")]
    workspace: PathBuf,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Run a full analysis session for a market segment
    Analyze {
        /// Market segment to analyze
        #[arg(short, long)]
        segment: String,

        /// Product or service within the segment
        #[arg(short, long)]
        product: Option<String>,

        /// Target audience
        #[arg(short, long)]
        audience: Option<String>,

        /// Report output format
        #[arg(short, long, value_enum, default_value_t = ReportFormat::Markdown)]
        format: ReportFormat,

        /// Write the report to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Override the session data directory
        #[arg(long)]
        session_dir: Option<PathBuf>,

        /// Treat the forecast stage as mandatory
        #[arg(long)]
        require_forecast: bool,
    },
    /// Inspect persisted sessions
    Sessions {
        #[command(subcommand)]
        action: SessionsAction,
    },
    /// Provider configuration and credentials
    Providers {
        #[command(subcommand)]
        action: ProvidersAction,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Subcommand, Debug)]
enum SessionsAction {
    /// List all persisted sessions, most recent first
    List,
    /// Show one session's stages, gates, and warnings
    Show {
        /// Session ID
        id: String,
    },
    /// List a session's checkpoint records for recovery
    Checkpoints {
        /// Session ID
        id: String,
        /// Print the full payload of this stage's records
        #[arg(long)]
        stage: Option<String>,
    },
}

#[derive(clap::Subcommand, Debug)]
enum ProvidersAction {
    /// Show configured providers and whether their credentials resolve
    Status,
}

#[derive(clap::Subcommand, Debug)]
enum ConfigAction {
    /// Create default configuration file
    Init,
    /// Show current configuration
    Show,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // Human-readable stderr + JSON file logging
    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::new(filter));

    let log_dir = directories::ProjectDirs::from("dev", "panorama", "panorama")
        .map(|d| d.data_dir().join("logs"))
        .unwrap_or_else(|| PathBuf::from("."));
    let _ = std::fs::create_dir_all(&log_dir);
    let file_appender = tracing_appender::rolling::daily(&log_dir, "panorama.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::new("debug"));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let workspace = cli
        .workspace
        .canonicalize()
        .unwrap_or_else(|_| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    commands::handle_command(cli.command, &workspace).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_parses() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_analyze_args() {
        let cli = Cli::parse_from([
            "panorama",
            "analyze",
            "--segment",
            "home fitness equipment",
            "--format",
            "json",
        ]);
        match cli.command {
            Commands::Analyze {
                segment, format, ..
            } => {
                assert_eq!(segment, "home fitness equipment");
                assert_eq!(format, ReportFormat::Json);
            }
            other => panic!("expected analyze, got {:?}", other),
        }
    }
}
