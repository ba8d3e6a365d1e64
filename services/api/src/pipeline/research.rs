use blog_pipeline_core::{
    domain::{
        AuthUser, CompetitorInsight, ExpertOpinion, Insight, MarketDataPoint, RelatedTrend,
        Research, ResearchSource, Session, SourceCategory, Statistic,
    },
    ports::{GenerationRequest, ModelTier},
    stage::PipelineStep,
};
use chrono::Utc;
use serde::Deserialize;
use tracing::{info, warn};
use url::Url;
use uuid::Uuid;

use super::{prompts, Pipeline};
use crate::error::PipelineError;

const MAX_TOKENS: u32 = 4096;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ResearchReply {
    topic: String,
    topic_slug: String,
    market_data: Vec<MarketDataPoint>,
    competitor_analysis: Vec<CompetitorInsight>,
    statistics: Vec<Statistic>,
    expert_opinions: Vec<ExpertOpinion>,
    related_trends: Vec<RelatedTrend>,
    sources: Vec<ProposedSource>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ProposedSource {
    title: String,
    url: String,
    category: String,
    published_date: Option<String>,
}

/// Lowercase ASCII words joined by single dashes.
pub fn slugify(text: &str) -> String {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

/// Keeps the provider's structured sources, or builds `news` sources from the raw
/// citation URLs when it gave none.
fn resolve_sources(proposed: Vec<ProposedSource>, citations: &[String]) -> Vec<ResearchSource> {
    let structured: Vec<ResearchSource> = proposed
        .into_iter()
        .filter(|source| !source.url.trim().is_empty())
        .map(|source| ResearchSource {
            title: if source.title.trim().is_empty() {
                source.url.clone()
            } else {
                source.title
            },
            category: source.category.parse().unwrap_or(SourceCategory::News),
            url: source.url,
            published_date: source.published_date.filter(|d| !d.trim().is_empty()),
        })
        .collect();
    if !structured.is_empty() {
        return structured;
    }

    citations
        .iter()
        .filter(|url| !url.trim().is_empty())
        .map(|url| ResearchSource {
            title: Url::parse(url)
                .ok()
                .and_then(|parsed| parsed.host_str().map(str::to_string))
                .unwrap_or_else(|| url.clone()),
            url: url.clone(),
            category: SourceCategory::News,
            published_date: None,
        })
        .collect()
}

impl Pipeline {
    /// Researches each chosen insight in order and makes the chosen set the session's
    /// full selection.
    pub async fn deep_research(
        &self,
        user: AuthUser,
        session_id: Uuid,
        insight_ids: &[Uuid],
    ) -> Result<Vec<Research>, PipelineError> {
        let mut ids: Vec<Uuid> = Vec::with_capacity(insight_ids.len());
        for id in insight_ids {
            if !ids.contains(id) {
                ids.push(*id);
            }
        }
        if ids.is_empty() {
            return Err(PipelineError::validation(
                "session_id and insight_ids are required",
            ));
        }

        let session = self.load_owned_session(user, session_id).await?;
        PipelineStep::DeepResearch.check(session.stage)?;

        let mut insights = Vec::with_capacity(ids.len());
        for id in &ids {
            let insight = self.store.get_insight(*id).await?;
            if insight.session_id != session_id {
                return Err(PipelineError::NotFound(format!("Insight {} not found", id)));
            }
            insights.push(insight);
        }

        let claim = self.claim(PipelineStep::DeepResearch, &session).await?;
        let result = self.run_research(&session, &insights, &ids).await;
        self.settle(claim, result).await
    }

    async fn run_research(
        &self,
        session: &Session,
        insights: &[Insight],
        selected: &[Uuid],
    ) -> Result<Vec<Research>, PipelineError> {
        let mut records = Vec::with_capacity(insights.len());
        // One provider call at a time keeps upstream cost bounded by the quota.
        for insight in insights {
            info!(session_id = %session.id, insight_id = %insight.id, "Researching insight");
            let generated = self
                .search
                .generate_json::<ResearchReply>(GenerationRequest {
                    system_prompt: prompts::RESEARCH_SYSTEM.to_string(),
                    user_message: prompts::research_message(insight),
                    max_tokens: MAX_TOKENS,
                    tier: ModelTier::Standard,
                })
                .await?;
            let reply = generated.value;

            let sources = resolve_sources(reply.sources, &generated.citations);
            if sources.is_empty() {
                warn!(insight_id = %insight.id, "Research came back without sources");
            }

            let topic = if reply.topic.trim().is_empty() {
                insight.title.clone()
            } else {
                reply.topic
            };
            let topic_slug = match slugify(&reply.topic_slug) {
                slug if slug.is_empty() => slugify(&topic),
                slug => slug,
            };

            records.push(Research {
                id: Uuid::new_v4(),
                session_id: session.id,
                insight_id: Some(insight.id),
                topic,
                topic_slug,
                market_data: reply.market_data,
                competitor_analysis: reply.competitor_analysis,
                statistics: reply.statistics,
                expert_opinions: reply.expert_opinions,
                related_trends: reply.related_trends,
                sources,
                created_at: Utc::now(),
            });
        }

        self.store.replace_selection(session.id, selected).await?;
        let saved = self.store.insert_research(records).await?;
        info!(session_id = %session.id, count = saved.len(), "Research stored");
        Ok(saved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugs_are_lowercase_and_dashed() {
        assert_eq!(slugify("Edge AI: Retail's Next Wave"), "edge-ai-retail-s-next-wave");
        assert_eq!(slugify("  --  "), "");
    }

    #[test]
    fn structured_sources_win_over_citations() {
        let proposed = vec![
            ProposedSource {
                title: "Chip report".into(),
                url: "https://research.example/chips".into(),
                category: "Report".into(),
                published_date: Some("2025-01-10".into()),
            },
            ProposedSource {
                url: "https://blog.example/post".into(),
                category: "podcast".into(),
                ..Default::default()
            },
        ];
        let sources = resolve_sources(proposed, &["https://ignored.example".to_string()]);

        assert_eq!(sources.len(), 2);
        assert_eq!(sources[0].category, SourceCategory::Report);
        assert_eq!(sources[1].category, SourceCategory::News);
        assert_eq!(sources[1].title, "https://blog.example/post");
    }

    #[test]
    fn citations_become_news_sources_when_nothing_structured() {
        let sources = resolve_sources(
            vec![ProposedSource::default()],
            &["https://www.reuters.com/tech/ai".to_string()],
        );
        assert_eq!(
            sources,
            vec![ResearchSource {
                title: "www.reuters.com".into(),
                url: "https://www.reuters.com/tech/ai".into(),
                category: SourceCategory::News,
                published_date: None,
            }]
        );
    }
}
