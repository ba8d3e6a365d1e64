use blog_pipeline_core::{
    domain::{AuthUser, Insight, InsightStatus, Level, Resource, Session, SourceRef},
    gateway::ParseFailure,
    ports::{GenerationRequest, ModelTier},
    sanitize::{sanitize_tags, sanitize_user},
    stage::PipelineStep,
};
use chrono::Utc;
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use super::{prompts, Pipeline};
use crate::error::PipelineError;

/// Cap for the keywords and target audience typed by the user.
pub const CONTEXT_MAX: usize = 200;
const TAG_MAX: usize = 50;
const MAX_TOKENS: u32 = 4096;
const MIN_INSIGHTS: usize = 3;
const MAX_INSIGHTS: usize = 7;

#[derive(Debug, Deserialize)]
struct InsightsReply {
    #[serde(default)]
    insights: Vec<ProposedInsight>,
}

#[derive(Debug, Deserialize)]
struct ProposedInsight {
    title: String,
    #[serde(default)]
    signal: String,
    #[serde(default)]
    potential_angle: String,
    #[serde(default)]
    confidence: String,
    #[serde(default)]
    relevance: String,
    #[serde(default)]
    tags: Vec<String>,
}

fn level_or_medium(raw: &str) -> Level {
    raw.parse().unwrap_or_else(|_| {
        warn!(value = raw, "Unknown level from provider, using medium");
        Level::Medium
    })
}

/// Keeps at most seven proposals. Fewer than three means the reply did not follow
/// the requested shape.
fn bounded(mut proposed: Vec<ProposedInsight>) -> Result<Vec<ProposedInsight>, ParseFailure> {
    if proposed.len() < MIN_INSIGHTS {
        return Err(ParseFailure::from_text(&format!(
            "expected at least {} insights, got {}",
            MIN_INSIGHTS,
            proposed.len()
        )));
    }
    if proposed.len() > MAX_INSIGHTS {
        warn!(count = proposed.len(), "Provider returned too many insights, keeping the first {}", MAX_INSIGHTS);
        proposed.truncate(MAX_INSIGHTS);
    }
    Ok(proposed)
}

/// Sanitizes an optional user field, treating blank input as absent.
fn context_field(raw: Option<&str>) -> Option<String> {
    raw.map(|value| sanitize_user(value.trim(), CONTEXT_MAX))
        .filter(|value| !value.is_empty())
}

impl Pipeline {
    /// Turns the session's resources into pending insights and moves the session
    /// to `selection`.
    pub async fn extract_insights(
        &self,
        user: AuthUser,
        session_id: Uuid,
        keywords: Option<&str>,
        target_audience: Option<&str>,
    ) -> Result<Vec<Insight>, PipelineError> {
        let session = self.load_owned_session(user, session_id).await?;
        PipelineStep::ExtractInsights.check(session.stage)?;

        let resources = self.store.list_resources(session_id).await?;
        if resources.is_empty() {
            return Err(PipelineError::validation(
                "No resources found for this session",
            ));
        }

        let keywords = context_field(keywords);
        let target_audience = context_field(target_audience);

        let claim = self.claim(PipelineStep::ExtractInsights, &session).await?;
        let result = self
            .run_extraction(&session, &resources, keywords, target_audience)
            .await;
        self.settle(claim, result).await
    }

    async fn run_extraction(
        &self,
        session: &Session,
        resources: &[Resource],
        keywords: Option<String>,
        target_audience: Option<String>,
    ) -> Result<Vec<Insight>, PipelineError> {
        info!(session_id = %session.id, resources = resources.len(), "Extracting insights");
        let reply = self
            .gateway
            .generate_json::<InsightsReply>(GenerationRequest {
                system_prompt: prompts::INSIGHTS_SYSTEM.to_string(),
                user_message: prompts::insights_message(
                    resources,
                    keywords.as_deref(),
                    target_audience.as_deref(),
                ),
                max_tokens: MAX_TOKENS,
                tier: ModelTier::Standard,
            })
            .await?
            .value;

        let proposed = bounded(reply.insights)?;

        let source_refs: Vec<SourceRef> = resources
            .iter()
            .map(|resource| SourceRef {
                source_type: resource.source_type,
                source_id: resource.id,
                title: resource.title.clone(),
            })
            .collect();

        let now = Utc::now();
        let insights = proposed
            .into_iter()
            .map(|proposed| Insight {
                id: Uuid::new_v4(),
                session_id: session.id,
                title: proposed.title,
                signal: proposed.signal,
                potential_angle: proposed.potential_angle,
                confidence: level_or_medium(&proposed.confidence),
                relevance: level_or_medium(&proposed.relevance),
                tags: sanitize_tags(&proposed.tags, TAG_MAX),
                status: InsightStatus::Pending,
                source_refs: source_refs.clone(),
                created_at: now,
            })
            .collect();

        let saved = self.store.insert_insights(insights).await?;
        self.store
            .update_session_context(session.id, keywords.as_deref(), target_audience.as_deref())
            .await?;
        info!(session_id = %session.id, count = saved.len(), "Insights stored");
        Ok(saved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_context_is_absent() {
        assert_eq!(context_field(Some("   ")), None);
        assert_eq!(context_field(None), None);
        assert_eq!(context_field(Some(" retail ")).as_deref(), Some("retail"));
    }

    #[test]
    fn unknown_levels_fall_back_to_medium() {
        assert_eq!(level_or_medium("HIGH"), Level::High);
        assert_eq!(level_or_medium("very high"), Level::Medium);
    }

    fn proposals(count: usize) -> Vec<ProposedInsight> {
        (0..count)
            .map(|i| ProposedInsight {
                title: format!("Insight {i}"),
                signal: String::new(),
                potential_angle: String::new(),
                confidence: String::new(),
                relevance: String::new(),
                tags: Vec::new(),
            })
            .collect()
    }

    #[test]
    fn too_few_insights_is_a_parse_failure() {
        let err = bounded(proposals(2)).unwrap_err();
        assert!(err.excerpt.contains("got 2"));
        assert!(bounded(proposals(0)).is_err());
    }

    #[test]
    fn extra_insights_are_dropped() {
        let kept = bounded(proposals(10)).unwrap();
        assert_eq!(kept.len(), 7);
        assert_eq!(kept[6].title, "Insight 6");
        assert_eq!(bounded(proposals(3)).unwrap().len(), 3);
    }

    #[test]
    fn reply_tolerates_missing_fields() {
        let reply: InsightsReply =
            serde_json::from_str(r#"{"insights":[{"title":"Only a title"}]}"#).unwrap();
        assert_eq!(reply.insights.len(), 1);
        assert!(reply.insights[0].tags.is_empty());
    }
}
