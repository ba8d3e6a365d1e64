use blog_pipeline_core::{
    domain::{
        AuthUser, Insight, Outline, OutlineSection, OutlineStatus, Research, SectionType, Session,
        StructurePattern,
    },
    gateway::ParseFailure,
    ports::{GenerationRequest, ModelTier, PortError},
    stage::PipelineStep,
};
use chrono::Utc;
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use super::{prompts, Pipeline};
use crate::error::PipelineError;

const MAX_TOKENS: u32 = 4096;
const DEFAULT_TONE: &str = "professional";
const MIN_SECTIONS: usize = 3;
const MAX_SECTIONS: usize = 5;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct OutlineReply {
    title: String,
    target_audience: String,
    thesis: String,
    tone: String,
    structure_pattern: String,
    sections: Vec<ProposedSection>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ProposedSection {
    id: String,
    #[serde(rename = "type")]
    section_type: String,
    title: String,
    content: String,
    keywords: Vec<String>,
}

/// Builds the ordered sections: ids filled, blank titles dropped, the first section
/// an intro, the last a conclusion, everything between a body section. Keeps at most
/// five sections by dropping the extra body sections at the end.
fn normalize_sections(proposed: Vec<ProposedSection>) -> Result<Vec<OutlineSection>, ParseFailure> {
    let mut sections: Vec<OutlineSection> = proposed
        .into_iter()
        .filter(|section| !section.title.trim().is_empty())
        .enumerate()
        .map(|(index, section)| OutlineSection {
            id: if section.id.trim().is_empty() {
                format!("section-{}", index + 1)
            } else {
                section.id
            },
            section_type: section.section_type.parse().unwrap_or(SectionType::Body),
            title: section.title,
            content: section.content,
            keywords: section
                .keywords
                .into_iter()
                .map(|k| k.trim().to_string())
                .filter(|k| !k.is_empty())
                .collect(),
        })
        .collect();

    if sections.len() < MIN_SECTIONS {
        return Err(ParseFailure::from_text(&format!(
            "expected at least {} outline sections, got {}",
            MIN_SECTIONS,
            sections.len()
        )));
    }
    if sections.len() > MAX_SECTIONS {
        warn!(count = sections.len(), "Outline has too many sections, dropping extra body sections");
        let last = sections.len() - 1;
        sections.drain(MAX_SECTIONS - 1..last);
    }

    let last = sections.len() - 1;
    for (index, section) in sections.iter_mut().enumerate() {
        let expected = match index {
            0 => SectionType::Intro,
            i if i == last => SectionType::Conclusion,
            _ => SectionType::Body,
        };
        if section.section_type != expected {
            warn!(id = %section.id, from = %section.section_type, to = %expected, "Retyping outline section");
            section.section_type = expected;
        }
    }
    Ok(sections)
}

impl Pipeline {
    /// Plans the article for one research record and moves the session to `outline`.
    pub async fn generate_outline(
        &self,
        user: AuthUser,
        session_id: Uuid,
        research_id: Uuid,
    ) -> Result<Outline, PipelineError> {
        let session = self.load_owned_session(user, session_id).await?;
        PipelineStep::GenerateOutline.check(session.stage)?;

        let research = self.store.get_research(research_id).await?;
        if research.session_id != session_id {
            return Err(PipelineError::NotFound(format!(
                "Research {} not found",
                research_id
            )));
        }
        let insight = match research.insight_id {
            Some(insight_id) => match self.store.get_insight(insight_id).await {
                Ok(insight) => Some(insight),
                Err(PortError::NotFound(_)) => None,
                Err(e) => return Err(e.into()),
            },
            None => None,
        };

        let claim = self.claim(PipelineStep::GenerateOutline, &session).await?;
        let result = self
            .run_outline(&session, &research, insight.as_ref())
            .await;
        self.settle(claim, result).await
    }

    async fn run_outline(
        &self,
        session: &Session,
        research: &Research,
        insight: Option<&Insight>,
    ) -> Result<Outline, PipelineError> {
        info!(session_id = %session.id, research_id = %research.id, "Generating outline");
        let reply = self
            .gateway
            .generate_json::<OutlineReply>(GenerationRequest {
                system_prompt: prompts::OUTLINE_SYSTEM.to_string(),
                user_message: prompts::outline_message(research, insight, session),
                max_tokens: MAX_TOKENS,
                tier: ModelTier::Standard,
            })
            .await?
            .value;

        let sections = normalize_sections(reply.sections)?;
        let structure_pattern = reply.structure_pattern.parse().unwrap_or_else(|_| {
            warn!(value = %reply.structure_pattern, "Unknown structure pattern, using trend_analysis");
            StructurePattern::TrendAnalysis
        });

        let now = Utc::now();
        let outline = Outline {
            id: Uuid::new_v4(),
            session_id: session.id,
            research_id: Some(research.id),
            title: if reply.title.trim().is_empty() {
                research.topic.clone()
            } else {
                reply.title
            },
            target_audience: if reply.target_audience.trim().is_empty() {
                session.target_audience.clone().unwrap_or_default()
            } else {
                reply.target_audience
            },
            thesis: reply.thesis,
            tone: if reply.tone.trim().is_empty() {
                DEFAULT_TONE.to_string()
            } else {
                reply.tone
            },
            structure_pattern,
            sections,
            status: OutlineStatus::Draft,
            created_at: now,
            updated_at: now,
        };

        let saved = self.store.insert_outline(outline).await?;
        info!(session_id = %session.id, outline_id = %saved.id, sections = saved.sections.len(), "Outline stored");
        Ok(saved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn section(kind: &str, title: &str) -> ProposedSection {
        ProposedSection {
            section_type: kind.into(),
            title: title.into(),
            ..Default::default()
        }
    }

    fn types(sections: &[OutlineSection]) -> Vec<SectionType> {
        sections.iter().map(|s| s.section_type).collect()
    }

    #[test]
    fn sections_get_ids_and_clean_keywords() {
        let sections = normalize_sections(vec![
            section("intro", "Why now"),
            ProposedSection {
                id: "custom".into(),
                section_type: "deep-dive".into(),
                title: "The numbers".into(),
                keywords: vec![" chips ".into(), "".into()],
                ..Default::default()
            },
            section("body", "   "),
            section("conclusion", "Next steps"),
        ])
        .unwrap();

        assert_eq!(sections.len(), 3);
        assert_eq!(sections[0].id, "section-1");
        assert_eq!(sections[1].id, "custom");
        assert_eq!(sections[1].keywords, vec!["chips"]);
        assert_eq!(sections[2].id, "section-3");
        assert_eq!(
            types(&sections),
            vec![SectionType::Intro, SectionType::Body, SectionType::Conclusion]
        );
    }

    #[test]
    fn misordered_sections_are_retyped() {
        let sections = normalize_sections(vec![
            section("conclusion", "Wrap up first"),
            section("intro", "Intro in the middle"),
            section("body", "Body last"),
        ])
        .unwrap();

        assert_eq!(
            types(&sections),
            vec![SectionType::Intro, SectionType::Body, SectionType::Conclusion]
        );
        assert_eq!(sections[0].title, "Wrap up first");
    }

    #[test]
    fn too_few_sections_is_a_parse_failure() {
        let err = normalize_sections(vec![
            section("conclusion", "Only two"),
            section("body", "Sections"),
        ])
        .unwrap_err();
        assert!(err.excerpt.contains("got 2"));
    }

    #[test]
    fn extra_body_sections_are_dropped() {
        let proposed = (1..=8)
            .map(|i| section("body", &format!("Part {i}")))
            .collect();
        let sections = normalize_sections(proposed).unwrap();

        let titles: Vec<&str> = sections.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(titles, vec!["Part 1", "Part 2", "Part 3", "Part 4", "Part 8"]);
        assert_eq!(sections[0].section_type, SectionType::Intro);
        assert_eq!(sections[4].section_type, SectionType::Conclusion);
    }
}
