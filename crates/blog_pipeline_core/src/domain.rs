//! crates/blog_pipeline_core/src/domain.rs
//!
//! Defines the core data structures of the content pipeline.
//! These structs are independent of any database; they serialize to the JSON
//! shapes the HTTP layer returns.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Implements the text mapping used when an enum is stored in a text column.
macro_rules! text_enum {
    ($ty:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $ty {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text,)+
                }
            }
        }

        impl FromStr for $ty {
            type Err = UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_ascii_lowercase().as_str() {
                    $($text => Ok(Self::$variant),)+
                    other => Err(UnknownVariant {
                        kind: stringify!($ty),
                        value: other.to_string(),
                    }),
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

/// Returned when a stored or generated string names no known variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} value '{value}'")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

//=========================================================================================
// Session
//=========================================================================================

/// The pipeline stage a session currently sits in, in forward order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Input,
    Analyzing,
    Selection,
    Researching,
    Outline,
    Writing,
    Final,
    Published,
}

text_enum!(Stage {
    Input => "input",
    Analyzing => "analyzing",
    Selection => "selection",
    Researching => "researching",
    Outline => "outline",
    Writing => "writing",
    Final => "final",
    Published => "published",
});

/// One user's run through the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub user_id: Uuid,
    pub stage: Stage,
    pub keywords: Option<String>,
    pub target_audience: Option<String>,
    /// Bumped on every stage write; used as the optimistic-concurrency token.
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

//=========================================================================================
// Resources and insights
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Url,
    File,
}

text_enum!(SourceType {
    Url => "url",
    File => "file",
});

/// Source material collected for a session. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resource {
    pub id: Uuid,
    pub session_id: Uuid,
    pub source_type: SourceType,
    pub source_url: Option<String>,
    pub file_name: Option<String>,
    pub title: Option<String>,
    /// Already sanitized and wrapped as external data.
    pub content: String,
    pub collected_at: DateTime<Utc>,
}

/// A three-step rating used for insight confidence and relevance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Level {
    High,
    Medium,
    Low,
}

text_enum!(Level {
    High => "high",
    Medium => "medium",
    Low => "low",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightStatus {
    Pending,
    Selected,
    Rejected,
}

text_enum!(InsightStatus {
    Pending => "pending",
    Selected => "selected",
    Rejected => "rejected",
});

/// Points an insight back at a resource it was derived from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRef {
    pub source_type: SourceType,
    pub source_id: Uuid,
    pub title: Option<String>,
}

/// A candidate article angle distilled from the collected resources.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Insight {
    pub id: Uuid,
    pub session_id: Uuid,
    pub title: String,
    pub signal: String,
    pub potential_angle: String,
    pub confidence: Level,
    pub relevance: Level,
    pub tags: Vec<String>,
    pub status: InsightStatus,
    pub source_refs: Vec<SourceRef>,
    pub created_at: DateTime<Utc>,
}

//=========================================================================================
// Research
//=========================================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketDataPoint {
    #[serde(default)]
    pub point: String,
    #[serde(default)]
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompetitorInsight {
    #[serde(default)]
    pub company: String,
    #[serde(default)]
    pub insight: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Statistic {
    #[serde(default)]
    pub stat: String,
    #[serde(default)]
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExpertOpinion {
    #[serde(default)]
    pub quote: String,
    #[serde(default)]
    pub speaker: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RelatedTrend {
    #[serde(default)]
    pub trend: String,
    #[serde(default)]
    pub relevance: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceCategory {
    News,
    Blog,
    Report,
    Paper,
    Official,
    Sns,
}

text_enum!(SourceCategory {
    News => "news",
    Blog => "blog",
    Report => "report",
    Paper => "paper",
    Official => "official",
    Sns => "sns",
});

/// A citation backing a research record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchSource {
    pub title: String,
    pub url: String,
    pub category: SourceCategory,
    pub published_date: Option<String>,
}

/// Structured evidence gathered for one selected insight. Immutable once written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Research {
    pub id: Uuid,
    pub session_id: Uuid,
    pub insight_id: Option<Uuid>,
    pub topic: String,
    pub topic_slug: String,
    pub market_data: Vec<MarketDataPoint>,
    pub competitor_analysis: Vec<CompetitorInsight>,
    pub statistics: Vec<Statistic>,
    pub expert_opinions: Vec<ExpertOpinion>,
    pub related_trends: Vec<RelatedTrend>,
    pub sources: Vec<ResearchSource>,
    pub created_at: DateTime<Utc>,
}

//=========================================================================================
// Outline
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionType {
    Intro,
    Body,
    Conclusion,
}

text_enum!(SectionType {
    Intro => "intro",
    Body => "body",
    Conclusion => "conclusion",
});

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutlineSection {
    pub id: String,
    #[serde(rename = "type")]
    pub section_type: SectionType,
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StructurePattern {
    TrendAnalysis,
    CompanyAnalysis,
    HowTo,
    Comparison,
    ProblemSolving,
}

text_enum!(StructurePattern {
    TrendAnalysis => "trend_analysis",
    CompanyAnalysis => "company_analysis",
    HowTo => "how_to",
    Comparison => "comparison",
    ProblemSolving => "problem_solving",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutlineStatus {
    Draft,
    Approved,
}

text_enum!(OutlineStatus {
    Draft => "draft",
    Approved => "approved",
});

/// An ordered section plan derived from research.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Outline {
    pub id: Uuid,
    pub session_id: Uuid,
    pub research_id: Option<Uuid>,
    pub title: String,
    pub target_audience: String,
    pub thesis: String,
    pub tone: String,
    pub structure_pattern: StructurePattern,
    pub sections: Vec<OutlineSection>,
    pub status: OutlineStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Outline {
    /// Section keywords in order of first appearance, without duplicates.
    pub fn aggregated_keywords(&self) -> Vec<String> {
        let mut keywords: Vec<String> = Vec::new();
        for keyword in self.sections.iter().flat_map(|s| s.keywords.iter()) {
            let keyword = keyword.trim();
            if !keyword.is_empty() && !keywords.iter().any(|k| k == keyword) {
                keywords.push(keyword.to_string());
            }
        }
        keywords
    }
}

//=========================================================================================
// Draft and its quality metrics
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DraftStatus {
    Draft,
    Final,
    Published,
}

text_enum!(DraftStatus {
    Draft => "draft",
    Final => "final",
    Published => "published",
});

impl DraftStatus {
    /// Status only moves forward, one step at a time.
    pub fn can_transition_to(self, next: DraftStatus) -> bool {
        matches!(
            (self, next),
            (DraftStatus::Draft, DraftStatus::Final) | (DraftStatus::Final, DraftStatus::Published)
        )
    }
}

/// A generated article plus derived metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Draft {
    pub id: Uuid,
    pub session_id: Uuid,
    pub outline_id: Option<Uuid>,
    pub title: String,
    pub subtitle: Option<String>,
    /// Markdown body with the trailing metadata block removed.
    pub content: String,
    pub word_count: u32,
    pub char_count: u32,
    pub thumbnail_url: Option<String>,
    pub status: DraftStatus,
    pub seo_metrics: Option<SeoMetrics>,
    pub meta_description: Option<String>,
    pub primary_keywords: Option<Vec<String>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DensityStatus {
    Good,
    Low,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordStat {
    pub keyword: String,
    pub count: usize,
    /// Percentage of total words, rounded to two decimals.
    pub density: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordDensityMetric {
    pub score: u32,
    pub value: f64,
    pub status: DensityStatus,
    pub details: Vec<KeywordStat>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadabilityStatus {
    Excellent,
    Good,
    NeedsImprovement,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadabilityMetric {
    pub score: u32,
    pub avg_sentence_length: f64,
    pub avg_paragraph_length: f64,
    pub status: ReadabilityStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LengthStatus {
    Optimal,
    Short,
    Long,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentLengthMetric {
    pub score: u32,
    pub word_count: usize,
    pub char_count: usize,
    pub status: LengthStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeadingStatus {
    Good,
    NeedsImprovement,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeadingStructureMetric {
    pub score: u32,
    pub h2_count: usize,
    pub h3_count: usize,
    pub headings_with_keywords: usize,
    pub is_hierarchical: bool,
    pub status: HeadingStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TitleStatus {
    Good,
    TooShort,
    TooLong,
    MissingKeyword,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TitleMetric {
    pub score: u32,
    pub length: usize,
    pub has_keyword: bool,
    pub status: TitleStatus,
    pub suggestions: Vec<String>,
}

/// Snapshot of the five quality sub-scores plus their weighted total.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeoMetrics {
    pub overall_score: u32,
    pub keyword_density: KeywordDensityMetric,
    pub readability: ReadabilityMetric,
    pub content_length: ContentLengthMetric,
    pub heading_structure: HeadingStructureMetric,
    pub title_optimization: TitleMetric,
}

/// Ordered so that sorting puts `High` first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    pub priority: Priority,
    pub category: String,
    pub message: String,
}

//=========================================================================================
// Authentication
//=========================================================================================

/// The authenticated caller, resolved from a bearer token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthUser {
    pub user_id: Uuid,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_text_round_trips_through_from_str() {
        for stage in [Stage::Input, Stage::Researching, Stage::Published] {
            assert_eq!(stage.as_str().parse::<Stage>(), Ok(stage));
        }
        assert!("archived".parse::<Stage>().is_err());
    }

    #[test]
    fn level_parsing_is_case_insensitive() {
        assert_eq!(" High ".parse::<Level>(), Ok(Level::High));
    }

    #[test]
    fn draft_status_only_moves_forward() {
        assert!(DraftStatus::Draft.can_transition_to(DraftStatus::Final));
        assert!(DraftStatus::Final.can_transition_to(DraftStatus::Published));
        assert!(!DraftStatus::Published.can_transition_to(DraftStatus::Draft));
        assert!(!DraftStatus::Draft.can_transition_to(DraftStatus::Published));
        assert!(!DraftStatus::Final.can_transition_to(DraftStatus::Final));
    }

    #[test]
    fn aggregated_keywords_are_deduplicated_in_order() {
        let section = |keywords: &[&str]| OutlineSection {
            id: "s".into(),
            section_type: SectionType::Body,
            title: "t".into(),
            content: String::new(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
        };
        let now = Utc::now();
        let outline = Outline {
            id: Uuid::new_v4(),
            session_id: Uuid::new_v4(),
            research_id: None,
            title: "t".into(),
            target_audience: String::new(),
            thesis: String::new(),
            tone: "professional".into(),
            structure_pattern: StructurePattern::HowTo,
            sections: vec![section(&["ai", "chips"]), section(&["chips", "edge"])],
            status: OutlineStatus::Draft,
            created_at: now,
            updated_at: now,
        };
        assert_eq!(outline.aggregated_keywords(), vec!["ai", "chips", "edge"]);
    }

    #[test]
    fn section_type_serializes_under_type_key() {
        let json = serde_json::json!({"id": "section-1", "type": "intro", "title": "Hook"});
        let section: OutlineSection = serde_json::from_value(json).unwrap();
        assert_eq!(section.section_type, SectionType::Intro);
        assert!(section.keywords.is_empty());
    }
}
