//! Web research providers: Serper and Tavily search APIs.
//!
//! Both speak simple JSON-over-POST protocols and share the same page
//! fetcher, which strips HTML down to readable text without browser
//! automation.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::debug;

use crate::config::ResearchProviderConfig;
use crate::error::ProviderError;
use crate::providers::{resolve_api_key, ProviderName, ResearchProvider};
use crate::types::SearchHit;

const SERPER_BASE_URL: &str = "https://google.serper.dev";
const TAVILY_BASE_URL: &str = "https://api.tavily.com";

fn build_client() -> Result<Client, ProviderError> {
    Client::builder()
        .timeout(std::time::Duration::from_secs(30))
        .connect_timeout(std::time::Duration::from_secs(10))
        .user_agent("Panorama/0.1")
        .redirect(reqwest::redirect::Policy::limited(5))
        .build()
        .map_err(|e| ProviderError::Connection {
            message: format!("Failed to build HTTP client: {}", e),
        })
}

/// Fetch a page and reduce it to readable text.
async fn fetch_page(client: &Client, url: &str) -> Result<String, ProviderError> {
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(ProviderError::ApiRequest {
            message: format!("URL must start with http:// or https://: {}", url),
        });
    }

    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| ProviderError::Connection {
            message: format!("Fetch failed for {}: {}", url, e),
        })?;

    let status = response.status();
    if !status.is_success() {
        return Err(ProviderError::ApiRequest {
            message: format!("HTTP {} fetching {}", status, url),
        });
    }

    let content_type = response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();

    let body = response
        .text()
        .await
        .map_err(|e| ProviderError::ResponseParse {
            message: format!("Failed to read page body: {}", e),
        })?;

    if content_type.contains("text/html") || content_type.contains("application/xhtml") {
        Ok(extract_text_from_html(&body))
    } else {
        Ok(body)
    }
}

// ---------------------------------------------------------------------------
// Serper
// ---------------------------------------------------------------------------

/// Google results via the Serper API. Auth is an `X-API-KEY` header.
pub struct SerperProvider {
    client: Client,
    name: String,
    base_url: String,
    api_key: String,
}

impl SerperProvider {
    pub fn from_config(config: &ResearchProviderConfig) -> Result<Self, ProviderError> {
        let api_key = resolve_api_key(
            config.api_key.as_deref(),
            config.api_key_env.as_deref(),
            &config.name,
        )?;
        Ok(Self {
            client: build_client()?,
            name: config.name.clone(),
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| SERPER_BASE_URL.to_string()),
            api_key,
        })
    }

    /// Pull hits out of Serper's `organic` results array.
    fn parse_search_response(body: &Value) -> Result<Vec<SearchHit>, ProviderError> {
        let organic = body["organic"]
            .as_array()
            .ok_or_else(|| ProviderError::ResponseParse {
                message: "Missing 'organic' array in Serper response".to_string(),
            })?;

        Ok(organic
            .iter()
            .filter_map(|entry| {
                let url = entry["link"].as_str()?;
                Some(SearchHit {
                    url: url.to_string(),
                    title: entry["title"].as_str().unwrap_or("").to_string(),
                    snippet: entry["snippet"].as_str().unwrap_or("").to_string(),
                })
            })
            .collect())
    }
}

impl ProviderName for SerperProvider {
    fn name(&self) -> &str {
        &self.name
    }
}

#[async_trait]
impl ResearchProvider for SerperProvider {
    async fn search(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<SearchHit>, ProviderError> {
        let url = format!("{}/search", self.base_url);
        debug!(query = query, max_results, "Serper search");

        let response = self
            .client
            .post(&url)
            .header("X-API-KEY", &self.api_key)
            .header("Content-Type", "application/json")
            .json(&json!({"q": query, "num": max_results}))
            .send()
            .await
            .map_err(|e| ProviderError::ApiRequest {
                message: format!("Serper request failed: {}", e),
            })?;

        let status = response.status();
        let body_text = response
            .text()
            .await
            .map_err(|e| ProviderError::ResponseParse {
                message: format!("Failed to read response body: {}", e),
            })?;

        if !status.is_success() {
            return Err(map_search_http_error(status, &self.name, &body_text));
        }

        let body: Value =
            serde_json::from_str(&body_text).map_err(|e| ProviderError::ResponseParse {
                message: format!("Invalid JSON from Serper: {}", e),
            })?;

        let mut hits = Self::parse_search_response(&body)?;
        hits.truncate(max_results);
        Ok(hits)
    }

    async fn fetch(&self, url: &str) -> Result<String, ProviderError> {
        fetch_page(&self.client, url).await
    }
}

// ---------------------------------------------------------------------------
// Tavily
// ---------------------------------------------------------------------------

/// Search via the Tavily API. Auth is a `Bearer` header.
pub struct TavilyProvider {
    client: Client,
    name: String,
    base_url: String,
    api_key: String,
}

impl TavilyProvider {
    pub fn from_config(config: &ResearchProviderConfig) -> Result<Self, ProviderError> {
        let api_key = resolve_api_key(
            config.api_key.as_deref(),
            config.api_key_env.as_deref(),
            &config.name,
        )?;
        Ok(Self {
            client: build_client()?,
            name: config.name.clone(),
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| TAVILY_BASE_URL.to_string()),
            api_key,
        })
    }

    /// Pull hits out of Tavily's `results` array. Tavily calls the
    /// snippet field `content`.
    fn parse_search_response(body: &Value) -> Result<Vec<SearchHit>, ProviderError> {
        let results = body["results"]
            .as_array()
            .ok_or_else(|| ProviderError::ResponseParse {
                message: "Missing 'results' array in Tavily response".to_string(),
            })?;

        Ok(results
            .iter()
            .filter_map(|entry| {
                let url = entry["url"].as_str()?;
                Some(SearchHit {
                    url: url.to_string(),
                    title: entry["title"].as_str().unwrap_or("").to_string(),
                    snippet: entry["content"].as_str().unwrap_or("").to_string(),
                })
            })
            .collect())
    }
}

impl ProviderName for TavilyProvider {
    fn name(&self) -> &str {
        &self.name
    }
}

#[async_trait]
impl ResearchProvider for TavilyProvider {
    async fn search(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<SearchHit>, ProviderError> {
        let url = format!("{}/search", self.base_url);
        debug!(query = query, max_results, "Tavily search");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&json!({"query": query, "max_results": max_results}))
            .send()
            .await
            .map_err(|e| ProviderError::ApiRequest {
                message: format!("Tavily request failed: {}", e),
            })?;

        let status = response.status();
        let body_text = response
            .text()
            .await
            .map_err(|e| ProviderError::ResponseParse {
                message: format!("Failed to read response body: {}", e),
            })?;

        if !status.is_success() {
            return Err(map_search_http_error(status, &self.name, &body_text));
        }

        let body: Value =
            serde_json::from_str(&body_text).map_err(|e| ProviderError::ResponseParse {
                message: format!("Invalid JSON from Tavily: {}", e),
            })?;

        let mut hits = Self::parse_search_response(&body)?;
        hits.truncate(max_results);
        Ok(hits)
    }

    async fn fetch(&self, url: &str) -> Result<String, ProviderError> {
        fetch_page(&self.client, url).await
    }
}

fn map_search_http_error(
    status: reqwest::StatusCode,
    provider: &str,
    body: &str,
) -> ProviderError {
    match status.as_u16() {
        401 | 403 => ProviderError::AuthFailed {
            provider: provider.to_string(),
        },
        429 => ProviderError::RateLimited {
            retry_after_secs: 30,
        },
        _ => ProviderError::ApiRequest {
            message: format!("HTTP {} from {}: {}", status, provider, body),
        },
    }
}

// ---------------------------------------------------------------------------
// HTML to text
// ---------------------------------------------------------------------------

const BLOCK_TAGS: &[&str] = &[
    "p", "/p", "br", "div", "/div", "h1", "h2", "h3", "h4", "h5", "h6", "/h1", "/h2", "/h3",
    "/h4", "/h5", "/h6", "li", "tr",
];

fn is_block_tag(tag: &str) -> bool {
    BLOCK_TAGS
        .iter()
        .any(|block| tag == *block || tag.starts_with(&format!("{} ", block)))
}

/// Strip tags and scripts, keeping readable text with block-level breaks.
fn extract_text_from_html(html: &str) -> String {
    let mut text = String::new();
    let mut tag_buf = String::new();
    let mut in_tag = false;
    let mut in_script = false;
    let mut in_style = false;

    for ch in html.chars() {
        match ch {
            '<' => {
                in_tag = true;
                tag_buf.clear();
            }
            '>' if in_tag => {
                in_tag = false;
                let tag = tag_buf.to_lowercase();
                match tag.split_whitespace().next().unwrap_or("") {
                    "script" => in_script = true,
                    "/script" => in_script = false,
                    "style" => in_style = true,
                    "/style" => in_style = false,
                    _ => {}
                }
                if is_block_tag(&tag) {
                    text.push('\n');
                }
            }
            _ if in_tag => tag_buf.push(ch),
            _ if in_script || in_style => {}
            _ => text.push(ch),
        }
    }

    let text = text
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ");

    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_serper_response() {
        let body = json!({
            "organic": [
                {
                    "title": "Fitness market report",
                    "link": "https://example.com/report",
                    "snippet": "Market grew 12% in 2025",
                    "position": 1
                },
                {
                    "title": "No snippet entry",
                    "link": "https://example.org/page"
                }
            ]
        });
        let hits = SerperProvider::parse_search_response(&body).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].url, "https://example.com/report");
        assert_eq!(hits[0].title, "Fitness market report");
        assert_eq!(hits[1].snippet, "");
    }

    #[test]
    fn test_parse_serper_response_missing_organic() {
        let body = json!({"searchParameters": {"q": "x"}});
        let err = SerperProvider::parse_search_response(&body).unwrap_err();
        assert!(err.to_string().contains("organic"));
    }

    #[test]
    fn test_parse_serper_skips_entries_without_link() {
        let body = json!({
            "organic": [
                {"title": "no link here"},
                {"title": "good", "link": "https://example.com"}
            ]
        });
        let hits = SerperProvider::parse_search_response(&body).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].url, "https://example.com");
    }

    #[test]
    fn test_parse_tavily_response() {
        let body = json!({
            "results": [
                {
                    "title": "Industry outlook",
                    "url": "https://news.example.com/outlook",
                    "content": "Analysts expect consolidation",
                    "score": 0.93
                }
            ]
        });
        let hits = TavilyProvider::parse_search_response(&body).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].snippet, "Analysts expect consolidation");
    }

    #[test]
    fn test_parse_tavily_response_missing_results() {
        let body = json!({"answer": "no results field"});
        assert!(TavilyProvider::parse_search_response(&body).is_err());
    }

    #[test]
    fn test_map_search_http_error() {
        let err = map_search_http_error(reqwest::StatusCode::UNAUTHORIZED, "serper", "bad key");
        assert!(matches!(err, ProviderError::AuthFailed { .. }));

        let err = map_search_http_error(reqwest::StatusCode::TOO_MANY_REQUESTS, "serper", "");
        assert!(matches!(err, ProviderError::RateLimited { .. }));

        let err = map_search_http_error(reqwest::StatusCode::NOT_FOUND, "tavily", "gone");
        assert!(err.to_string().contains("HTTP 404"));
    }

    #[test]
    fn test_extract_text_from_html() {
        let html = r#"
        <html>
        <head><title>Market page</title></head>
        <body>
            <h1>Fitness Trends</h1>
            <p>Home workouts are <b>growing</b> fast.</p>
            <script>trackVisit();</script>
            <style>h1 { font-size: 2em; }</style>
            <ul><li>Gyms</li><li>Apps</li></ul>
        </body>
        </html>"#;

        let text = extract_text_from_html(html);
        assert!(text.contains("Fitness Trends"));
        assert!(text.contains("Home workouts are growing fast."));
        assert!(text.contains("Gyms"));
        assert!(text.contains("Apps"));
        assert!(!text.contains("trackVisit"));
        assert!(!text.contains("font-size"));
    }

    #[test]
    fn test_extract_text_decodes_entities() {
        let html = "<p>supply &amp; demand &lt;2026&gt; &quot;forecast&quot;</p>";
        let text = extract_text_from_html(html);
        assert_eq!(text, "supply & demand <2026> \"forecast\"");
    }

    #[test]
    fn test_extract_text_block_tags_break_lines() {
        let html = "<div>first</div><div>second</div>";
        let text = extract_text_from_html(html);
        assert_eq!(text, "first\nsecond");
    }

    #[test]
    fn test_from_config_requires_key() {
        let config = ResearchProviderConfig {
            name: "serper".into(),
            kind: crate::config::ResearchProviderKind::Serper,
            api_key: None,
            api_key_env: Some("PANORAMA_TEST_MISSING_SERPER_KEY".into()),
            base_url: None,
        };
        assert!(SerperProvider::from_config(&config).is_err());
    }
}
