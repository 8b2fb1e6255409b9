//! Research stage: query generation, provider-backed search, page capture.
//!
//! Builds a market-analysis query set from the request, runs every query
//! through the fallback selector, dedupes hits by URL, then fetches page
//! text for the top sources. A search that exhausts every provider fails
//! the stage; a single page that will not fetch only costs that page.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{Datelike, Utc};
use tracing::{debug, warn};
use url::Url;

use crate::error::StageError;
use crate::pipeline::stage::{StageContext, StageOutcome, StageWorker};
use crate::types::{
    AnalysisRequest, ProviderCategory, ResearchStatistics, ResearchSummary, SourceDocument,
    StagePayload,
};

/// Gathers raw market evidence for every downstream stage.
pub struct ResearchWorker;

impl ResearchWorker {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ResearchWorker {
    fn default() -> Self {
        Self::new()
    }
}

/// Build the query set for a request.
///
/// Queries are deterministic phrasings over segment, product, and audience
/// so two runs of the same request search the same ground.
pub(crate) fn build_queries(request: &AnalysisRequest) -> Vec<String> {
    let segment = request.segment.trim();
    let year = Utc::now().year();
    let mut queries = vec![
        format!("{segment} market size and growth"),
        format!("{segment} market trends {year}"),
        format!("{segment} competitive landscape key players"),
        format!("{segment} customer demand analysis"),
        format!("{segment} pricing benchmarks"),
    ];
    if let Some(product) = request.product.as_deref() {
        queries.push(format!("{segment} market demand for {product}"));
    }
    if let Some(audience) = request.target_audience.as_deref() {
        queries.push(format!("{audience} buying behavior {segment}"));
    }
    queries
}

fn host_of(url: &str) -> Option<String> {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.trim_start_matches("www.").to_string()))
}

fn compute_statistics(sources: &[SourceDocument]) -> ResearchStatistics {
    let domains: HashSet<String> = sources.iter().filter_map(|s| host_of(&s.url)).collect();
    ResearchStatistics {
        total_sources: sources.len(),
        total_content_chars: sources
            .iter()
            .map(|s| s.raw_text.chars().count() + s.snippet.chars().count())
            .sum(),
        unique_domains: domains.len(),
    }
}

#[async_trait]
impl StageWorker for ResearchWorker {
    async fn run(&self, ctx: &StageContext<'_>) -> Result<StageOutcome, StageError> {
        let runtime = ctx.runtime;
        let queries = build_queries(ctx.request());

        let mut providers_used: Vec<(ProviderCategory, String)> = Vec::new();
        let mut warnings: Vec<String> = Vec::new();
        let mut seen = HashSet::new();
        let mut sources: Vec<SourceDocument> = Vec::new();
        let mut serving_provider: Option<String> = None;

        for query in &queries {
            let selected = runtime.search(query).await?;
            debug!(
                query = %query,
                provider = %selected.provider,
                hits = selected.value.len(),
                "Search query served"
            );
            if serving_provider.as_deref() != Some(selected.provider.as_str()) {
                providers_used.push((ProviderCategory::Research, selected.provider.clone()));
                serving_provider = Some(selected.provider.clone());
            }
            for hit in selected.value {
                if seen.insert(hit.url.clone()) {
                    sources.push(SourceDocument {
                        url: hit.url,
                        title: hit.title,
                        snippet: hit.snippet,
                        raw_text: String::new(),
                    });
                }
            }
        }

        let fetcher = serving_provider
            .as_deref()
            .and_then(|name| runtime.research_provider(name));
        if let Some(provider) = &fetcher {
            let fetch_count = runtime.stages.fetch_top_sources.min(sources.len());
            for source in sources.iter_mut().take(fetch_count) {
                match runtime.fetch_page(provider, &source.url).await {
                    Ok(text) => source.raw_text = text,
                    Err(e) => {
                        warn!(url = %source.url, error = %e, "Page fetch failed, keeping snippet only");
                        warnings.push(format!("failed to fetch {}: {}", source.url, e));
                    }
                }
            }
        }

        let statistics = compute_statistics(&sources);
        let mut outcome = StageOutcome::new(StagePayload::Research(ResearchSummary {
            queries,
            sources,
            statistics,
        }));
        outcome.providers_used = providers_used;
        outcome.warnings = warnings;
        Ok(outcome)
    }
}
