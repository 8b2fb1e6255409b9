//! Configuration for the Panorama pipeline.
//!
//! Layered loading via figment, highest priority first:
//! 1. Explicit overrides (passed as argument)
//! 2. Environment variables (prefixed with `PANORAMA_`, `__` as separator)
//! 3. Workspace-local config (`.panorama/config.toml`)
//! 4. User config (`~/.config/panorama/config.toml`)
//! 5. Built-in defaults

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Root configuration for the pipeline and its providers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PanoramaConfig {
    pub providers: ProvidersConfig,
    pub fallback: FallbackConfig,
    pub quality: QualityConfig,
    pub stages: StagesConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

/// Ordered provider lists per category. Order is fallback priority.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvidersConfig {
    pub ai: Vec<AiProviderConfig>,
    pub research: Vec<ResearchProviderConfig>,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            ai: vec![
                AiProviderConfig {
                    name: "gemini".into(),
                    kind: AiProviderKind::Gemini,
                    model: "gemini-2.0-flash".into(),
                    api_key: None,
                    api_key_env: Some("GEMINI_API_KEY".into()),
                    base_url: None,
                },
                AiProviderConfig {
                    name: "groq".into(),
                    kind: AiProviderKind::OpenAiCompat,
                    model: "llama-3.3-70b-versatile".into(),
                    api_key: None,
                    api_key_env: Some("GROQ_API_KEY".into()),
                    base_url: Some("https://api.groq.com/openai/v1".into()),
                },
            ],
            research: vec![
                ResearchProviderConfig {
                    name: "serper".into(),
                    kind: ResearchProviderKind::Serper,
                    api_key: None,
                    api_key_env: Some("SERPER_API_KEY".into()),
                    base_url: None,
                },
                ResearchProviderConfig {
                    name: "tavily".into(),
                    kind: ResearchProviderKind::Tavily,
                    api_key: None,
                    api_key_env: Some("TAVILY_API_KEY".into()),
                    base_url: None,
                },
            ],
        }
    }
}

/// One configured AI text-generation provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiProviderConfig {
    pub name: String,
    pub kind: AiProviderKind,
    pub model: String,
    /// Inline API key. Prefer `api_key_env` outside of tests.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

/// Wire protocol spoken by an AI provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AiProviderKind {
    Gemini,
    OpenAiCompat,
}

/// One configured web-research provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchProviderConfig {
    pub name: String,
    pub kind: ResearchProviderKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

/// Search API spoken by a research provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResearchProviderKind {
    Serper,
    Tavily,
}

/// Provider health and fallback behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FallbackConfig {
    /// Consecutive failures before a provider is disabled.
    pub failure_threshold: u32,
    /// How long a disabled provider stays skipped.
    pub cooldown_secs: u64,
    /// Per-call timeout for any provider invocation.
    pub call_timeout_secs: u64,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            cooldown_secs: 300,
            call_timeout_secs: 60,
        }
    }
}

/// Quality gate thresholds applied to stage outputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityConfig {
    /// Minimum passing gate score (0-100).
    pub min_score: u8,
    /// Minimum number of research sources.
    pub min_sources: usize,
    /// Minimum total characters of gathered research content.
    pub min_content_length: usize,
    /// Minimum number of distinct source domains.
    pub min_unique_domains: usize,
    /// Phrases that mark boilerplate or placeholder output.
    pub forbidden_phrases: Vec<String>,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            min_score: 75,
            min_sources: 8,
            min_content_length: 15_000,
            min_unique_domains: 5,
            forbidden_phrases: vec![
                "customizado para".into(),
                "baseado em dados genéricos".into(),
                "não informado".into(),
                "informação não disponível".into(),
                "dados simulados".into(),
                "n/a".into(),
                "placeholder".into(),
                "lorem ipsum".into(),
                "to be determined".into(),
                "as an ai language model".into(),
            ],
        }
    }
}

/// Stage plan knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StagesConfig {
    /// Whether the forecast stage aborts the session on failure.
    pub forecast_required: bool,
    /// Results requested per search query.
    pub search_results_per_query: usize,
    /// How many distinct sources the research stage fetches in full.
    pub fetch_top_sources: usize,
    /// Token budget for each AI generation call.
    pub ai_max_tokens: usize,
}

impl Default for StagesConfig {
    fn default() -> Self {
        Self {
            forecast_required: false,
            search_results_per_query: 5,
            fetch_top_sources: 12,
            ai_max_tokens: 4096,
        }
    }
}

/// Where sessions and checkpoints are stored.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root data directory. Defaults to the platform data dir.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
}

impl StorageConfig {
    /// Resolve the root data directory.
    pub fn resolve_data_dir(&self) -> PathBuf {
        if let Some(dir) = &self.data_dir {
            return dir.clone();
        }
        directories::ProjectDirs::from("dev", "panorama", "panorama")
            .map(|d| d.data_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from(".panorama").join("data"))
    }

    pub fn checkpoint_dir(&self) -> PathBuf {
        self.resolve_data_dir().join("checkpoints")
    }

    pub fn session_dir(&self) -> PathBuf {
        self.resolve_data_dir().join("sessions")
    }
}

/// Logging defaults applied by the caller's subscriber setup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default tracing filter when `RUST_LOG` is unset.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

/// Load configuration from layered sources.
pub fn load_config(
    workspace: Option<&Path>,
    overrides: Option<&PanoramaConfig>,
) -> Result<PanoramaConfig, Box<figment::Error>> {
    let mut figment = Figment::from(Serialized::defaults(PanoramaConfig::default()));

    // User-level config
    if let Some(config_dir) = directories::ProjectDirs::from("dev", "panorama", "panorama") {
        let user_config = config_dir.config_dir().join("config.toml");
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    // Workspace-level config
    if let Some(ws) = workspace {
        let ws_config = ws.join(".panorama").join("config.toml");
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    // Environment variables (PANORAMA_QUALITY__MIN_SOURCES, etc.)
    figment = figment.merge(Env::prefixed("PANORAMA_").split("__"));

    // Explicit overrides
    if let Some(overrides) = overrides {
        figment = figment.merge(Serialized::defaults(overrides));
    }

    figment.extract().map_err(Box::new)
}

/// Check whether any Panorama configuration file exists.
pub fn config_exists(workspace: Option<&Path>) -> bool {
    if let Some(config_dir) = directories::ProjectDirs::from("dev", "panorama", "panorama") {
        if config_dir.config_dir().join("config.toml").exists() {
            return true;
        }
    }

    if let Some(ws) = workspace {
        if ws.join(".panorama").join("config.toml").exists() {
            return true;
        }
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PanoramaConfig::default();
        assert_eq!(config.fallback.failure_threshold, 3);
        assert_eq!(config.fallback.cooldown_secs, 300);
        assert_eq!(config.quality.min_score, 75);
        assert_eq!(config.quality.min_sources, 8);
        assert_eq!(config.quality.min_content_length, 15_000);
        assert!(!config.stages.forecast_required);
        assert_eq!(config.providers.ai.len(), 2);
        assert_eq!(config.providers.ai[0].name, "gemini");
        assert_eq!(config.providers.ai[1].kind, AiProviderKind::OpenAiCompat);
        assert_eq!(config.providers.research.len(), 2);
    }

    #[test]
    fn test_config_toml_roundtrip() {
        let config = PanoramaConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        let back: PanoramaConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(back.quality.min_sources, config.quality.min_sources);
        assert_eq!(back.providers.ai.len(), config.providers.ai.len());
        assert_eq!(
            back.quality.forbidden_phrases,
            config.quality.forbidden_phrases
        );
    }

    #[test]
    fn test_load_config_defaults() {
        let config = load_config(None, None).unwrap();
        assert_eq!(config.quality.min_score, 75);
        assert_eq!(config.stages.ai_max_tokens, 4096);
    }

    #[test]
    fn test_load_config_with_overrides() {
        let mut overrides = PanoramaConfig::default();
        overrides.quality.min_sources = 3;
        overrides.stages.forecast_required = true;

        let config = load_config(None, Some(&overrides)).unwrap();
        assert_eq!(config.quality.min_sources, 3);
        assert!(config.stages.forecast_required);
    }

    #[test]
    fn test_load_config_from_workspace_partial_table() {
        let dir = tempfile::tempdir().unwrap();
        let panorama_dir = dir.path().join(".panorama");
        std::fs::create_dir_all(&panorama_dir).unwrap();
        std::fs::write(
            panorama_dir.join("config.toml"),
            r#"
[quality]
min_sources = 4

[fallback]
cooldown_secs = 30
"#,
        )
        .unwrap();

        let config = load_config(Some(dir.path()), None).unwrap();
        // Overridden keys take effect; untouched keys keep defaults.
        assert_eq!(config.quality.min_sources, 4);
        assert_eq!(config.fallback.cooldown_secs, 30);
        assert_eq!(config.quality.min_score, 75);
        assert_eq!(config.fallback.failure_threshold, 3);
    }

    #[test]
    fn test_storage_dirs_derive_from_data_dir() {
        let storage = StorageConfig {
            data_dir: Some(PathBuf::from("/tmp/panorama-data")),
        };
        assert_eq!(
            storage.checkpoint_dir(),
            PathBuf::from("/tmp/panorama-data/checkpoints")
        );
        assert_eq!(
            storage.session_dir(),
            PathBuf::from("/tmp/panorama-data/sessions")
        );
    }
}
