use blog_pipeline_core::{
    gateway::extract_json,
    ports::{GenerationRequest, ModelTier},
    sanitize::sanitize_tags,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{info, warn};

use super::{prompts, Pipeline};
use crate::error::PipelineError;

pub const DEFAULT_MAX_RESULTS: usize = 10;
const MAX_RESULTS_CAP: usize = 20;
const KEYWORD_MAX: usize = 100;
const FALLBACK_SNIPPET_CHARS: usize = 300;
const MAX_TOKENS: u32 = 2048;

/// How far back a news search looks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Recency {
    Hour,
    Day,
    Week,
    #[default]
    Month,
    Year,
}

impl fmt::Display for Recency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Recency::Hour => "hour",
            Recency::Day => "day",
            Recency::Week => "week",
            Recency::Month => "month",
            Recency::Year => "year",
        })
    }
}

#[derive(Debug, Clone)]
pub struct NewsQuery {
    pub keywords: Vec<String>,
    pub recency: Recency,
    pub max_results: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewsItem {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewsResults {
    pub results: Vec<NewsItem>,
    pub total: usize,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ProposedItem {
    title: String,
    snippet: String,
}

/// Pairs each result with the citation at the same position.
fn pair_with_citations(items: Vec<ProposedItem>, citations: &[String], limit: usize) -> Vec<NewsItem> {
    items
        .into_iter()
        .take(limit)
        .enumerate()
        .map(|(index, item)| NewsItem {
            title: item.title,
            url: citations.get(index).cloned().unwrap_or_default(),
            snippet: item.snippet,
        })
        .collect()
}

impl Pipeline {
    /// Searches recent news for the keywords. Nothing is persisted.
    pub async fn search_news(&self, query: NewsQuery) -> Result<NewsResults, PipelineError> {
        let keywords = sanitize_tags(&query.keywords, KEYWORD_MAX);
        if keywords.is_empty() {
            return Err(PipelineError::validation("keywords are required"));
        }
        let limit = query.max_results.clamp(1, MAX_RESULTS_CAP);
        let joined = keywords.join(", ");

        info!(keywords = %joined, recency = %query.recency, limit, "Searching news");
        let generation = self
            .search
            .generate(GenerationRequest {
                system_prompt: prompts::NEWS_SYSTEM_TEMPLATE
                    .replace("{max_results}", &limit.to_string()),
                user_message: format!(
                    "Search for the latest news about: {joined}. Only include articles published within the last {}.",
                    query.recency
                ),
                max_tokens: MAX_TOKENS,
                tier: ModelTier::Standard,
            })
            .await?;

        let items = match extract_json::<Vec<ProposedItem>>(&generation.text) {
            Ok(items) => items,
            Err(failure) => {
                warn!(excerpt = %failure.excerpt, "News reply was not a JSON array, returning it as one result");
                vec![ProposedItem {
                    title: joined.clone(),
                    snippet: generation.text.chars().take(FALLBACK_SNIPPET_CHARS).collect(),
                }]
            }
        };

        let results = pair_with_citations(items, &generation.citations, limit);
        Ok(NewsResults {
            total: results.len(),
            results,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn citations_pair_by_position() {
        let items = vec![
            ProposedItem {
                title: "A".into(),
                snippet: "first".into(),
            },
            ProposedItem {
                title: "B".into(),
                snippet: "second".into(),
            },
            ProposedItem {
                title: "C".into(),
                snippet: "third".into(),
            },
        ];
        let results = pair_with_citations(items, &["https://a.example".to_string()], 2);

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].url, "https://a.example");
        assert_eq!(results[1].url, "");
    }

    #[test]
    fn recency_defaults_to_month() {
        assert_eq!(Recency::default(), Recency::Month);
        let parsed: Recency = serde_json::from_str("\"week\"").unwrap();
        assert_eq!(parsed.to_string(), "week");
    }
}
