use blog_pipeline_core::{
    domain::{
        AuthUser, Draft, DraftStatus, Outline, OutlineSection, OutlineStatus, Research, Session,
        StructurePattern,
    },
    markdown::process_draft,
    ports::{GenerationRequest, ModelTier, PortError},
    sanitize::{sanitize_tags, sanitize_user},
    stage::PipelineStep,
};
use chrono::Utc;
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use super::{prompts, Pipeline};
use crate::error::PipelineError;

const MAX_TOKENS: u32 = 8192;
const SHORT_FIELD_MAX: usize = 200;
const THESIS_MAX: usize = 500;
const TONE_MAX: usize = 50;
const SECTION_CONTENT_MAX: usize = 2000;
const KEYWORD_MAX: usize = 50;

/// The outline as the user edited it before asking for the draft.
#[derive(Debug, Clone, Deserialize)]
pub struct OutlineEdit {
    pub title: String,
    #[serde(default)]
    pub target_audience: String,
    #[serde(default)]
    pub thesis: String,
    #[serde(default)]
    pub tone: String,
    #[serde(default)]
    pub structure_pattern: Option<StructurePattern>,
    pub sections: Vec<OutlineSection>,
}

impl OutlineEdit {
    /// Applies the sanitized edits on top of the stored outline and approves it.
    fn apply_to(self, stored: &Outline) -> Result<Outline, PipelineError> {
        let sections: Vec<OutlineSection> = self
            .sections
            .into_iter()
            .map(|section| OutlineSection {
                id: sanitize_user(&section.id, SHORT_FIELD_MAX),
                section_type: section.section_type,
                title: sanitize_user(&section.title, SHORT_FIELD_MAX),
                content: sanitize_user(&section.content, SECTION_CONTENT_MAX),
                keywords: sanitize_tags(&section.keywords, KEYWORD_MAX),
            })
            .filter(|section| !section.title.is_empty())
            .collect();
        if sections.is_empty() {
            return Err(PipelineError::validation(
                "outline must have at least one section",
            ));
        }

        let title = sanitize_user(&self.title, SHORT_FIELD_MAX);
        let tone = sanitize_user(&self.tone, TONE_MAX);
        Ok(Outline {
            title: if title.is_empty() {
                stored.title.clone()
            } else {
                title
            },
            target_audience: sanitize_user(&self.target_audience, SHORT_FIELD_MAX),
            thesis: sanitize_user(&self.thesis, THESIS_MAX),
            tone: if tone.is_empty() { stored.tone.clone() } else { tone },
            structure_pattern: self.structure_pattern.unwrap_or(stored.structure_pattern),
            sections,
            status: OutlineStatus::Approved,
            updated_at: Utc::now(),
            ..stored.clone()
        })
    }
}

fn clamp_count(count: usize) -> u32 {
    u32::try_from(count).unwrap_or(u32::MAX)
}

impl Pipeline {
    /// Writes the article for an approved outline and moves the session to `final`.
    pub async fn write_draft(
        &self,
        user: AuthUser,
        session_id: Uuid,
        outline_id: Uuid,
        edit: OutlineEdit,
    ) -> Result<Draft, PipelineError> {
        let session = self.load_owned_session(user, session_id).await?;
        PipelineStep::WriteDraft.check(session.stage)?;

        let stored = self.store.get_outline(outline_id).await?;
        if stored.session_id != session_id {
            return Err(PipelineError::NotFound(format!(
                "Outline {} not found",
                outline_id
            )));
        }
        let outline = edit.apply_to(&stored)?;

        let research = match outline.research_id {
            Some(research_id) => match self.store.get_research(research_id).await {
                Ok(research) => Some(research),
                Err(PortError::NotFound(_)) => {
                    warn!(%research_id, "Outline research is gone, writing without it");
                    None
                }
                Err(e) => return Err(e.into()),
            },
            None => None,
        };

        let claim = self.claim(PipelineStep::WriteDraft, &session).await?;
        let result = self.run_draft(&session, outline, research.as_ref()).await;
        self.settle(claim, result).await
    }

    async fn run_draft(
        &self,
        session: &Session,
        outline: Outline,
        research: Option<&Research>,
    ) -> Result<Draft, PipelineError> {
        info!(session_id = %session.id, outline_id = %outline.id, "Writing draft");
        let generation = self
            .gateway
            .generate(GenerationRequest {
                system_prompt: prompts::DRAFT_SYSTEM.to_string(),
                user_message: prompts::draft_message(&outline, research, session),
                max_tokens: MAX_TOKENS,
                tier: ModelTier::Standard,
            })
            .await?;

        let processed = process_draft(&generation.text, &outline.title);
        if processed.content.is_empty() {
            return Err(PipelineError::Provider(
                "provider returned an empty article".to_string(),
            ));
        }
        if processed.metadata.is_none() {
            warn!(session_id = %session.id, "Draft has no metadata block, analysis will generate it");
        }
        let (meta_description, primary_keywords) = match processed.metadata {
            Some(metadata) => (
                Some(metadata.meta_description),
                Some(metadata.primary_keywords),
            ),
            None => (None, None),
        };

        let now = Utc::now();
        let draft = Draft {
            id: Uuid::new_v4(),
            session_id: session.id,
            outline_id: Some(outline.id),
            title: processed.title,
            subtitle: processed.subtitle,
            content: processed.content,
            word_count: clamp_count(processed.word_count),
            char_count: clamp_count(processed.char_count),
            thumbnail_url: None,
            status: DraftStatus::Draft,
            seo_metrics: None,
            meta_description,
            primary_keywords,
            created_at: now,
            updated_at: now,
        };

        self.store.update_outline(&outline).await?;
        let saved = self.store.insert_draft(draft).await?;
        info!(session_id = %session.id, draft_id = %saved.id, word_count = saved.word_count, "Draft stored");
        Ok(saved)
    }
}
