//! OpenAI-compatible text-generation provider.
//!
//! Covers Groq, OpenAI itself, and any endpoint speaking the chat
//! completions format. Auth is a `Bearer` header, text comes from the
//! first choice's message content.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::debug;

use crate::config::AiProviderConfig;
use crate::error::ProviderError;
use crate::providers::{resolve_api_key, AiProvider, ProviderName};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Provider for OpenAI-format chat completion endpoints.
pub struct OpenAiCompatProvider {
    client: Client,
    name: String,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAiCompatProvider {
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

    fn build_request_body(&self, prompt: &str, max_tokens: usize) -> Value {
        json!({
            "model": self.model,
            "messages": [{"role": "user", "content": prompt}],
            "temperature": 0.4,
            "max_tokens": max_tokens,
            "stream": false,
        })
    }

    /// Extract the generated text from a chat completions response.
    fn parse_response(body: &Value) -> Result<String, ProviderError> {
        let choice = body
            .get("choices")
            .and_then(|c| c.get(0))
            .ok_or_else(|| ProviderError::ResponseParse {
                message: "No choices in response".to_string(),
            })?;

        let content = choice
            .get("message")
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str())
            .ok_or_else(|| ProviderError::ResponseParse {
                message: "No message content in choice".to_string(),
            })?;

        if content.is_empty() {
            return Err(ProviderError::ResponseParse {
                message: "Empty message content in choice".to_string(),
            });
        }

        Ok(content.to_string())
    }

    fn map_http_error(status: reqwest::StatusCode, provider: &str, body: &str) -> ProviderError {
        match status.as_u16() {
            401 | 403 => {
                debug!(body = %body, "Authentication failed");
                ProviderError::AuthFailed {
                    provider: provider.to_string(),
                }
            }
            429 => {
                // Try to extract seconds from "Rate limit... try again in Xs"
                let retry_secs = serde_json::from_str::<Value>(body)
                    .ok()
                    .and_then(|v| {
                        v.get("error")?
                            .get("message")?
                            .as_str()
                            .map(|s| s.to_string())
                    })
                    .and_then(|msg| {
                        msg.split("in ")
                            .last()
                            .and_then(|s| s.trim_end_matches('s').parse::<u64>().ok())
                    })
                    .unwrap_or(5);
                ProviderError::RateLimited {
                    retry_after_secs: retry_secs,
                }
            }
            status if status >= 500 => ProviderError::ApiRequest {
                message: format!("Server error ({}): {}", status, body),
            },
            _ => ProviderError::ApiRequest {
                message: format!("HTTP {}: {}", status, body),
            },
        }
    }
}

impl ProviderName for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
    }
}

#[async_trait]
impl AiProvider for OpenAiCompatProvider {
    async fn generate(&self, prompt: &str, max_tokens: usize) -> Result<String, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.build_request_body(prompt, max_tokens);

        debug!(url = %url, model = %self.model, "Sending chat completion request");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::ApiRequest {
                message: format!("Request failed: {}", e),
            })?;

        let status = response.status();
        let response_body = response.text().await.map_err(|e| ProviderError::ApiRequest {
            message: format!("Failed to read response body: {}", e),
        })?;

        if !status.is_success() {
            return Err(Self::map_http_error(status, &self.name, &response_body));
        }

        let json: Value =
            serde_json::from_str(&response_body).map_err(|e| ProviderError::ResponseParse {
                message: format!("Invalid JSON: {}", e),
            })?;

        Self::parse_response(&json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> AiProviderConfig {
        AiProviderConfig {
            name: "groq".into(),
            kind: crate::config::AiProviderKind::OpenAiCompat,
            model: "llama-3.3-70b-versatile".into(),
            api_key: Some("test-key".into()),
            api_key_env: None,
            base_url: Some("https://api.groq.com/openai/v1".into()),
        }
    }

    #[test]
    fn test_from_config_uses_configured_base_url() {
        let provider = OpenAiCompatProvider::from_config(&test_config()).unwrap();
        assert_eq!(provider.base_url, "https://api.groq.com/openai/v1");
    }

    #[test]
    fn test_build_request_body_shape() {
        let provider = OpenAiCompatProvider::from_config(&test_config()).unwrap();
        let body = provider.build_request_body("hello", 512);
        assert_eq!(body["model"], "llama-3.3-70b-versatile");
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["messages"][0]["content"], "hello");
        assert_eq!(body["max_tokens"], 512);
        assert_eq!(body["stream"], false);
    }

    #[test]
    fn test_parse_response_extracts_content() {
        let body = json!({
            "choices": [{
                "message": {"role": "assistant", "content": "the analysis"},
                "finish_reason": "stop"
            }]
        });
        assert_eq!(
            OpenAiCompatProvider::parse_response(&body).unwrap(),
            "the analysis"
        );
    }

    #[test]
    fn test_parse_response_no_choices() {
        let body = json!({"choices": []});
        let err = OpenAiCompatProvider::parse_response(&body).unwrap_err();
        assert!(err.to_string().contains("No choices"));
    }

    #[test]
    fn test_parse_response_null_content() {
        let body = json!({
            "choices": [{"message": {"role": "assistant", "content": null}}]
        });
        let err = OpenAiCompatProvider::parse_response(&body).unwrap_err();
        assert!(err.to_string().contains("No message content"));
    }

    #[test]
    fn test_map_http_error_rate_limit_parses_retry() {
        let body = r#"{"error": {"message": "Rate limit reached, try again in 12s"}}"#;
        let err = OpenAiCompatProvider::map_http_error(
            reqwest::StatusCode::TOO_MANY_REQUESTS,
            "groq",
            body,
        );
        assert!(matches!(
            err,
            ProviderError::RateLimited {
                retry_after_secs: 12
            }
        ));
    }

    #[test]
    fn test_map_http_error_rate_limit_defaults() {
        let err = OpenAiCompatProvider::map_http_error(
            reqwest::StatusCode::TOO_MANY_REQUESTS,
            "groq",
            "not json",
        );
        assert!(matches!(
            err,
            ProviderError::RateLimited {
                retry_after_secs: 5
            }
        ));
    }

    #[test]
    fn test_map_http_error_server_error() {
        let err = OpenAiCompatProvider::map_http_error(
            reqwest::StatusCode::BAD_GATEWAY,
            "groq",
            "upstream down",
        );
        assert!(err.to_string().contains("Server error (502"));
    }
}
