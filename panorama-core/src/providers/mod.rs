//! External provider interfaces and implementations.
//!
//! Two provider categories feed the pipeline:
//! - **AI**: text generation (`Gemini`, any OpenAI-compatible API)
//! - **Research**: web search and page fetch (`Serper`, `Tavily`)
//!
//! All calls go through the [`FallbackSelector`], which tracks per-provider
//! health in the shared [`ProviderRegistry`] and falls back down the
//! configured priority order.

pub mod gemini;
pub mod openai_compat;
pub mod registry;
pub mod search;
pub mod selector;

pub use gemini::GeminiProvider;
pub use openai_compat::OpenAiCompatProvider;
pub use registry::{ProviderHealth, ProviderRecord, ProviderRegistry};
pub use search::{SerperProvider, TavilyProvider};
pub use selector::{FallbackSelector, Selected};

use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::warn;

use crate::config::{AiProviderKind, PanoramaConfig, ResearchProviderKind};
use crate::error::{PanoramaError, ProviderError};
use crate::types::SearchHit;

/// Anything the fallback selector can identify in the provider registry.
pub trait ProviderName: Send + Sync {
    /// Name as registered in the provider registry.
    fn name(&self) -> &str;
}

/// AI text generation provider.
#[async_trait]
pub trait AiProvider: ProviderName {
    /// Generate text for a prompt, bounded by a token budget.
    async fn generate(&self, prompt: &str, max_tokens: usize) -> Result<String, ProviderError>;
}

/// Web research provider.
#[async_trait]
pub trait ResearchProvider: ProviderName {
    /// Ranked search results for a query.
    async fn search(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<SearchHit>, ProviderError>;

    /// Full text of one result page.
    async fn fetch(&self, url: &str) -> Result<String, ProviderError>;
}

/// Resolve a provider's API key from inline config or the configured
/// environment variable.
pub(crate) fn resolve_api_key(
    inline: Option<&str>,
    env_var: Option<&str>,
    provider: &str,
) -> Result<String, ProviderError> {
    if let Some(key) = inline {
        if !key.is_empty() {
            return Ok(key.to_string());
        }
    }
    if let Some(var) = env_var {
        if let Ok(key) = std::env::var(var) {
            if !key.is_empty() {
                return Ok(key);
            }
        }
    }
    Err(ProviderError::AuthFailed {
        provider: provider.to_string(),
    })
}

/// Build the configured AI providers in priority order.
///
/// Providers whose credentials cannot be resolved are skipped with a
/// warning; at least one must remain.
pub fn build_ai_providers(
    config: &PanoramaConfig,
) -> Result<Vec<Arc<dyn AiProvider>>, PanoramaError> {
    let mut providers: Vec<Arc<dyn AiProvider>> = Vec::new();
    for entry in &config.providers.ai {
        let built: Result<Arc<dyn AiProvider>, ProviderError> = match entry.kind {
            AiProviderKind::Gemini => GeminiProvider::from_config(entry).map(|p| Arc::new(p) as _),
            AiProviderKind::OpenAiCompat => {
                OpenAiCompatProvider::from_config(entry).map(|p| Arc::new(p) as _)
            }
        };
        match built {
            Ok(provider) => providers.push(provider),
            Err(e) => warn!(provider = %entry.name, error = %e, "Skipping AI provider"),
        }
    }
    if providers.is_empty() {
        return Err(PanoramaError::Config {
            message: "no usable AI provider configured (check API keys)".into(),
        });
    }
    Ok(providers)
}

/// Build the configured research providers in priority order.
pub fn build_research_providers(
    config: &PanoramaConfig,
) -> Result<Vec<Arc<dyn ResearchProvider>>, PanoramaError> {
    let mut providers: Vec<Arc<dyn ResearchProvider>> = Vec::new();
    for entry in &config.providers.research {
        let built: Result<Arc<dyn ResearchProvider>, ProviderError> = match entry.kind {
            ResearchProviderKind::Serper => {
                SerperProvider::from_config(entry).map(|p| Arc::new(p) as _)
            }
            ResearchProviderKind::Tavily => {
                TavilyProvider::from_config(entry).map(|p| Arc::new(p) as _)
            }
        };
        match built {
            Ok(provider) => providers.push(provider),
            Err(e) => warn!(provider = %entry.name, error = %e, "Skipping research provider"),
        }
    }
    if providers.is_empty() {
        return Err(PanoramaError::Config {
            message: "no usable research provider configured (check API keys)".into(),
        });
    }
    Ok(providers)
}

// ---------------------------------------------------------------------------
// Mock providers (used across unit and integration tests)
// ---------------------------------------------------------------------------

/// Scripted AI provider for tests.
///
/// Responses are served FIFO from a queue; an empty queue yields a fixed
/// fallback string. Failure and delay modes simulate broken or hanging
/// backends.
pub struct MockAiProvider {
    name: String,
    responses: std::sync::Mutex<Vec<String>>,
    fail_message: Option<String>,
    delay: Option<std::time::Duration>,
    calls: AtomicUsize,
}

impl MockAiProvider {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            responses: std::sync::Mutex::new(Vec::new()),
            fail_message: None,
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// A provider that always fails with a connection error.
    pub fn failing(name: impl Into<String>, message: impl Into<String>) -> Self {
        let mut provider = Self::new(name);
        provider.fail_message = Some(message.into());
        provider
    }

    /// A provider that sleeps before answering, to trip call timeouts.
    pub fn slow(name: impl Into<String>, delay: std::time::Duration) -> Self {
        let mut provider = Self::new(name);
        provider.delay = Some(delay);
        provider
    }

    /// Queue the next response.
    pub fn queue_response(&self, text: impl Into<String>) {
        if let Ok(mut responses) = self.responses.lock() {
            responses.push(text.into());
        }
    }

    /// How many times `generate` was invoked.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ProviderName for MockAiProvider {
    fn name(&self) -> &str {
        &self.name
    }
}

#[async_trait]
impl AiProvider for MockAiProvider {
    async fn generate(&self, _prompt: &str, _max_tokens: usize) -> Result<String, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(message) = &self.fail_message {
            return Err(ProviderError::Connection {
                message: message.clone(),
            });
        }
        let mut responses = match self.responses.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if responses.is_empty() {
            Ok("mock response".to_string())
        } else {
            Ok(responses.remove(0))
        }
    }
}

/// Scripted research provider for tests.
pub struct MockResearchProvider {
    name: String,
    hits: Vec<SearchHit>,
    page_text: String,
    fail_message: Option<String>,
    search_calls: AtomicUsize,
    fetch_calls: AtomicUsize,
}

impl MockResearchProvider {
    pub fn new(name: impl Into<String>, hits: Vec<SearchHit>, page_text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            hits,
            page_text: page_text.into(),
            fail_message: None,
            search_calls: AtomicUsize::new(0),
            fetch_calls: AtomicUsize::new(0),
        }
    }

    /// A provider that always fails with a connection error.
    pub fn failing(name: impl Into<String>, message: impl Into<String>) -> Self {
        let mut provider = Self::new(name, Vec::new(), "");
        provider.fail_message = Some(message.into());
        provider
    }

    /// Build `count` distinct hits across `count` distinct domains.
    pub fn hits_across_domains(count: usize) -> Vec<SearchHit> {
        (0..count)
            .map(|i| SearchHit {
                url: format!("https://site-{}.example.com/article", i),
                title: format!("Market article {}", i),
                snippet: format!("Snippet for article {}", i),
            })
            .collect()
    }

    pub fn search_calls(&self) -> usize {
        self.search_calls.load(Ordering::SeqCst)
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }
}

impl ProviderName for MockResearchProvider {
    fn name(&self) -> &str {
        &self.name
    }
}

#[async_trait]
impl ResearchProvider for MockResearchProvider {
    async fn search(
        &self,
        _query: &str,
        max_results: usize,
    ) -> Result<Vec<SearchHit>, ProviderError> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = &self.fail_message {
            return Err(ProviderError::Connection {
                message: message.clone(),
            });
        }
        Ok(self.hits.iter().take(max_results).cloned().collect())
    }

    async fn fetch(&self, _url: &str) -> Result<String, ProviderError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = &self.fail_message {
            return Err(ProviderError::Connection {
                message: message.clone(),
            });
        }
        Ok(self.page_text.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_ai_provider_serves_queue_in_order() {
        let provider = MockAiProvider::new("mock");
        provider.queue_response("first");
        provider.queue_response("second");

        assert_eq!(provider.generate("p", 100).await.unwrap(), "first");
        assert_eq!(provider.generate("p", 100).await.unwrap(), "second");
        assert_eq!(provider.generate("p", 100).await.unwrap(), "mock response");
        assert_eq!(provider.calls(), 3);
    }

    #[tokio::test]
    async fn test_mock_ai_provider_failing() {
        let provider = MockAiProvider::failing("down", "connection refused");
        let err = provider.generate("p", 100).await.unwrap_err();
        assert!(matches!(err, ProviderError::Connection { .. }));
    }

    #[tokio::test]
    async fn test_mock_research_provider_limits_results() {
        let provider = MockResearchProvider::new(
            "mock",
            MockResearchProvider::hits_across_domains(10),
            "page text",
        );
        let hits = provider.search("query", 3).await.unwrap();
        assert_eq!(hits.len(), 3);
        assert_eq!(provider.search_calls(), 1);
    }

    #[test]
    fn test_resolve_api_key_prefers_inline() {
        let key = resolve_api_key(Some("inline-key"), Some("NO_SUCH_ENV_VAR"), "test").unwrap();
        assert_eq!(key, "inline-key");
    }

    #[test]
    fn test_resolve_api_key_missing_is_auth_failure() {
        let err = resolve_api_key(None, Some("PANORAMA_TEST_NO_SUCH_KEY"), "gemini").unwrap_err();
        assert!(matches!(err, ProviderError::AuthFailed { .. }));
    }
}
