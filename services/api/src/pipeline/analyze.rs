use blog_pipeline_core::{
    domain::{AuthUser, Draft, SeoMetrics, Suggestion},
    ports::{GenerationRequest, ModelTier, PortError},
    sanitize::sanitize_tags,
    scoring::{self, cap_meta_description, fallback_meta_description},
    stage::PipelineStep,
};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use super::{prompts, Pipeline};
use crate::error::PipelineError;

const META_MAX_TOKENS: u32 = 200;
const KEYWORD_MAX: usize = 50;

/// The meta description and keywords that go with a scored draft.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeneratedMeta {
    pub description: String,
    pub keywords: Vec<String>,
}

/// The outcome of scoring one draft.
#[derive(Debug, Clone)]
pub struct ContentAnalysis {
    pub overall_score: u32,
    pub metrics: SeoMetrics,
    pub suggestions: Vec<Suggestion>,
    pub generated_meta: GeneratedMeta,
}

impl Pipeline {
    /// Scores a finished draft and stores the metrics snapshot on it.
    pub async fn analyze_content(
        &self,
        user: AuthUser,
        draft_id: Uuid,
        keywords: &[String],
    ) -> Result<ContentAnalysis, PipelineError> {
        let (draft, session) = self.load_owned_draft(user, draft_id).await?;
        PipelineStep::AnalyzeContent.check(session.stage)?;

        let keywords = self.scoring_keywords(&draft, keywords).await?;
        info!(%draft_id, keywords = keywords.len(), "Analyzing draft");
        let report = scoring::score(&draft.title, &draft.content, &keywords);

        let description = match draft
            .meta_description
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
        {
            Some(stored) => cap_meta_description(stored),
            None => self.generate_meta_description(&draft, &keywords).await,
        };

        let stored_keywords = draft.primary_keywords.clone().filter(|k| !k.is_empty());
        let new_keywords = match &stored_keywords {
            Some(_) => None,
            None if keywords.is_empty() => None,
            None => Some(keywords.as_slice()),
        };
        self.store
            .save_draft_analysis(draft.id, &report.metrics, &description, new_keywords)
            .await?;

        info!(%draft_id, overall_score = report.metrics.overall_score, "Draft analyzed");
        Ok(ContentAnalysis {
            overall_score: report.metrics.overall_score,
            generated_meta: GeneratedMeta {
                description,
                keywords: stored_keywords.unwrap_or_else(|| keywords.clone()),
            },
            metrics: report.metrics,
            suggestions: report.suggestions,
        })
    }

    /// Caller keywords first, then the outline's section keywords, then the draft's own.
    async fn scoring_keywords(
        &self,
        draft: &Draft,
        requested: &[String],
    ) -> Result<Vec<String>, PipelineError> {
        let requested = sanitize_tags(requested, KEYWORD_MAX);
        if !requested.is_empty() {
            return Ok(requested);
        }

        if let Some(outline_id) = draft.outline_id {
            match self.store.get_outline(outline_id).await {
                Ok(outline) => {
                    let aggregated = outline.aggregated_keywords();
                    if !aggregated.is_empty() {
                        return Ok(aggregated);
                    }
                }
                Err(PortError::NotFound(_)) => {}
                Err(e) => return Err(e.into()),
            }
        }

        Ok(draft.primary_keywords.clone().unwrap_or_default())
    }

    /// Asks the light model for a meta description, falling back to the first paragraph.
    async fn generate_meta_description(&self, draft: &Draft, keywords: &[String]) -> String {
        let request = GenerationRequest {
            system_prompt: prompts::META_SYSTEM.to_string(),
            user_message: prompts::meta_message(&draft.title, &draft.content, keywords),
            max_tokens: META_MAX_TOKENS,
            tier: ModelTier::Light,
        };
        match self.gateway.generate(request).await {
            Ok(generation) => {
                let description =
                    cap_meta_description(generation.text.trim().trim_matches('"'));
                if !description.is_empty() {
                    return description;
                }
                warn!(draft_id = %draft.id, "Meta description came back empty, using fallback");
            }
            Err(e) => {
                warn!(draft_id = %draft.id, "Meta description generation failed, using fallback: {}", e);
            }
        }
        fallback_meta_description(&draft.content)
    }
}
