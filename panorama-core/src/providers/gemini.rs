//! Google Gemini text-generation provider.
//!
//! Speaks the native Gemini API: auth via `?key=API_KEY` query parameter,
//! prompt wrapped in a single-turn `contents` array, text pulled from the
//! first candidate's parts.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use crate::config::AiProviderConfig;
use crate::error::ProviderError;
use crate::providers::{resolve_api_key, AiProvider, ProviderName};

/// The default Google Gemini API base URL.
const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Google Gemini API provider.
#[derive(Debug)]
pub struct GeminiProvider {
    client: Client,
    name: String,
    base_url: String,
    api_key: String,
    model: String,
}

impl GeminiProvider {
    /// Create a provider from its config entry.
    ///
    /// The API key comes from the inline config value or the configured
    /// environment variable; missing credentials fail with `AuthFailed`.
    pub fn from_config(config: &AiProviderConfig) -> Result<Self, ProviderError> {
        let api_key = resolve_api_key(
            config.api_key.as_deref(),
            config.api_key_env.as_deref(),
            &config.name,
        )?;
        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .connect_timeout(std::time::Duration::from_secs(10))
            .build()
            .map_err(|e| ProviderError::Connection {
                message: format!("Failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            name: config.name.clone(),
            base_url,
            api_key,
            model: config.model.clone(),
        })
    }

    fn endpoint_url(&self) -> String {
        format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        )
    }

    fn build_request_body(prompt: &str, max_tokens: usize) -> Value {
        serde_json::json!({
            "contents": [{
                "role": "user",
                "parts": [{"text": prompt}],
            }],
            "generationConfig": {
                "maxOutputTokens": max_tokens,
                "temperature": 0.4,
            },
        })
    }

    /// Extract the generated text from a Gemini response.
    fn parse_response(body: &Value) -> Result<String, ProviderError> {
        let candidates = body["candidates"]
            .as_array()
            .ok_or_else(|| ProviderError::ResponseParse {
                message: "Missing 'candidates' array in response".to_string(),
            })?;

        let candidate = candidates
            .first()
            .ok_or_else(|| ProviderError::ResponseParse {
                message: "Empty 'candidates' array in response".to_string(),
            })?;

        let parts = candidate["content"]["parts"]
            .as_array()
            .ok_or_else(|| ProviderError::ResponseParse {
                message: "Missing 'parts' array in candidate content".to_string(),
            })?;

        let text: String = parts
            .iter()
            .filter_map(|part| part["text"].as_str())
            .collect::<Vec<_>>()
            .join("");

        if text.is_empty() {
            return Err(ProviderError::ResponseParse {
                message: "No text parts in candidate".to_string(),
            });
        }

        Ok(text)
    }

    fn map_http_error(status: reqwest::StatusCode, provider: &str, body_text: &str) -> ProviderError {
        match status.as_u16() {
            401 | 403 => ProviderError::AuthFailed {
                provider: provider.to_string(),
            },
            429 => ProviderError::RateLimited {
                retry_after_secs: 30,
            },
            _ => ProviderError::ApiRequest {
                message: format!("HTTP {} from Gemini API: {}", status, body_text),
            },
        }
    }
}

impl ProviderName for GeminiProvider {
    fn name(&self) -> &str {
        &self.name
    }
}

#[async_trait]
impl AiProvider for GeminiProvider {
    async fn generate(&self, prompt: &str, max_tokens: usize) -> Result<String, ProviderError> {
        let body = Self::build_request_body(prompt, max_tokens);
        let url = self.endpoint_url();

        debug!(
            model = self.model.as_str(),
            prompt_chars = prompt.len(),
            "Sending Gemini generate request"
        );

        let response = self
            .client
            .post(&url)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::ApiRequest {
                message: format!("Request to Gemini API failed: {}", e),
            })?;

        let status = response.status();
        let body_text = response
            .text()
            .await
            .map_err(|e| ProviderError::ResponseParse {
                message: format!("Failed to read response body: {}", e),
            })?;

        if !status.is_success() {
            return Err(Self::map_http_error(status, &self.name, &body_text));
        }

        let response_json: Value =
            serde_json::from_str(&body_text).map_err(|e| ProviderError::ResponseParse {
                message: format!("Invalid JSON in response: {}", e),
            })?;

        Self::parse_response(&response_json)
    }
}
