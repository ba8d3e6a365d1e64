//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, the concrete implementation of the
//! `PipelineStore` and `RateLimitStore` ports from the `core` crate. It handles all
//! interactions with PostgreSQL using `sqlx`.

use async_trait::async_trait;
use blog_pipeline_core::domain::{
    AuthUser, CompetitorInsight, Draft, DraftStatus, ExpertOpinion, Insight, InsightStatus,
    MarketDataPoint, Outline, OutlineSection, RelatedTrend, Research, ResearchSource, Resource,
    SeoMetrics, Session, SourceRef, Stage, Statistic,
};
use blog_pipeline_core::ports::{PipelineStore, PortError, PortResult, RateLimitStore};
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use std::fmt::Display;
use std::str::FromStr;
use uuid::Uuid;

/// The only token role allowed to call pipeline endpoints.
const AUTHENTICATED_ROLE: &str = "authenticated";

const SESSION_COLUMNS: &str =
    "id, user_id, stage, keywords, target_audience, version, created_at, updated_at";
const RESOURCE_COLUMNS: &str =
    "id, session_id, source_type, source_url, file_name, title, content, collected_at";
const INSIGHT_COLUMNS: &str = "id, session_id, title, signal, potential_angle, confidence, relevance, tags, status, source_refs, created_at";
const RESEARCH_COLUMNS: &str = "id, session_id, insight_id, topic, topic_slug, market_data, competitor_analysis, statistics, expert_opinions, related_trends, sources, created_at";
const OUTLINE_COLUMNS: &str = "id, session_id, research_id, title, target_audience, thesis, tone, structure_pattern, sections, status, created_at, updated_at";
const DRAFT_COLUMNS: &str = "id, session_id, outline_id, title, subtitle, content, word_count, char_count, thumbnail_url, status, seo_metrics, meta_description, primary_keywords, created_at, updated_at";

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the store ports.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }
}

fn unexpected(e: sqlx::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

fn not_found_or_unexpected(what: impl Display) -> impl FnOnce(sqlx::Error) -> PortError {
    move |e| match e {
        sqlx::Error::RowNotFound => PortError::NotFound(what.to_string()),
        other => unexpected(other),
    }
}

/// Parses a text column into one of the domain enums.
fn parse_column<T>(value: &str) -> PortResult<T>
where
    T: FromStr,
    T::Err: Display,
{
    value
        .parse::<T>()
        .map_err(|e| PortError::Unexpected(format!("corrupt row: {}", e)))
}

fn to_i32(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct SessionRecord {
    id: Uuid,
    user_id: Uuid,
    stage: String,
    keywords: Option<String>,
    target_audience: Option<String>,
    version: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}
impl SessionRecord {
    fn to_domain(self) -> PortResult<Session> {
        Ok(Session {
            id: self.id,
            user_id: self.user_id,
            stage: parse_column(&self.stage)?,
            keywords: self.keywords,
            target_audience: self.target_audience,
            version: self.version,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(FromRow)]
struct ResourceRecord {
    id: Uuid,
    session_id: Uuid,
    source_type: String,
    source_url: Option<String>,
    file_name: Option<String>,
    title: Option<String>,
    content: String,
    collected_at: DateTime<Utc>,
}
impl ResourceRecord {
    fn to_domain(self) -> PortResult<Resource> {
        Ok(Resource {
            id: self.id,
            session_id: self.session_id,
            source_type: parse_column(&self.source_type)?,
            source_url: self.source_url,
            file_name: self.file_name,
            title: self.title,
            content: self.content,
            collected_at: self.collected_at,
        })
    }
}

#[derive(FromRow)]
struct InsightRecord {
    id: Uuid,
    session_id: Uuid,
    title: String,
    signal: String,
    potential_angle: String,
    confidence: String,
    relevance: String,
    tags: Vec<String>,
    status: String,
    source_refs: Json<Vec<SourceRef>>,
    created_at: DateTime<Utc>,
}
impl InsightRecord {
    fn to_domain(self) -> PortResult<Insight> {
        Ok(Insight {
            id: self.id,
            session_id: self.session_id,
            title: self.title,
            signal: self.signal,
            potential_angle: self.potential_angle,
            confidence: parse_column(&self.confidence)?,
            relevance: parse_column(&self.relevance)?,
            tags: self.tags,
            status: parse_column(&self.status)?,
            source_refs: self.source_refs.0,
            created_at: self.created_at,
        })
    }
}

#[derive(FromRow)]
struct ResearchRecord {
    id: Uuid,
    session_id: Uuid,
    insight_id: Option<Uuid>,
    topic: String,
    topic_slug: String,
    market_data: Json<Vec<MarketDataPoint>>,
    competitor_analysis: Json<Vec<CompetitorInsight>>,
    statistics: Json<Vec<Statistic>>,
    expert_opinions: Json<Vec<ExpertOpinion>>,
    related_trends: Json<Vec<RelatedTrend>>,
    sources: Json<Vec<ResearchSource>>,
    created_at: DateTime<Utc>,
}
impl ResearchRecord {
    fn to_domain(self) -> Research {
        Research {
            id: self.id,
            session_id: self.session_id,
            insight_id: self.insight_id,
            topic: self.topic,
            topic_slug: self.topic_slug,
            market_data: self.market_data.0,
            competitor_analysis: self.competitor_analysis.0,
            statistics: self.statistics.0,
            expert_opinions: self.expert_opinions.0,
            related_trends: self.related_trends.0,
            sources: self.sources.0,
            created_at: self.created_at,
        }
    }
}

#[derive(FromRow)]
struct OutlineRecord {
    id: Uuid,
    session_id: Uuid,
    research_id: Option<Uuid>,
    title: String,
    target_audience: String,
    thesis: String,
    tone: String,
    structure_pattern: String,
    sections: Json<Vec<OutlineSection>>,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}
impl OutlineRecord {
    fn to_domain(self) -> PortResult<Outline> {
        Ok(Outline {
            id: self.id,
            session_id: self.session_id,
            research_id: self.research_id,
            title: self.title,
            target_audience: self.target_audience,
            thesis: self.thesis,
            tone: self.tone,
            structure_pattern: parse_column(&self.structure_pattern)?,
            sections: self.sections.0,
            status: parse_column(&self.status)?,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(FromRow)]
struct DraftRecord {
    id: Uuid,
    session_id: Uuid,
    outline_id: Option<Uuid>,
    title: String,
    subtitle: Option<String>,
    content: String,
    word_count: i32,
    char_count: i32,
    thumbnail_url: Option<String>,
    status: String,
    seo_metrics: Option<Json<SeoMetrics>>,
    meta_description: Option<String>,
    primary_keywords: Option<Vec<String>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}
impl DraftRecord {
    fn to_domain(self) -> PortResult<Draft> {
        Ok(Draft {
            id: self.id,
            session_id: self.session_id,
            outline_id: self.outline_id,
            title: self.title,
            subtitle: self.subtitle,
            content: self.content,
            word_count: u32::try_from(self.word_count).unwrap_or(0),
            char_count: u32::try_from(self.char_count).unwrap_or(0),
            thumbnail_url: self.thumbnail_url,
            status: parse_column(&self.status)?,
            seo_metrics: self.seo_metrics.map(|m| m.0),
            meta_description: self.meta_description,
            primary_keywords: self.primary_keywords,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(FromRow)]
struct AuthSessionRecord {
    user_id: Uuid,
    role: String,
    expires_at: DateTime<Utc>,
}

//=========================================================================================
// `PipelineStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl PipelineStore for DbAdapter {
    async fn validate_token(&self, token: &str) -> PortResult<AuthUser> {
        let record = sqlx::query_as::<_, AuthSessionRecord>(
            "SELECT user_id, role, expires_at FROM auth_sessions WHERE token = $1",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?
        .ok_or_else(|| PortError::Unauthorized("Invalid token".to_string()))?;

        if record.expires_at <= Utc::now() {
            return Err(PortError::Unauthorized("Token expired".to_string()));
        }
        if record.role != AUTHENTICATED_ROLE {
            return Err(PortError::Unauthorized(
                "User authentication required".to_string(),
            ));
        }
        Ok(AuthUser {
            user_id: record.user_id,
        })
    }

    async fn create_session(&self, session_id: Uuid, user_id: Uuid) -> PortResult<Session> {
        // A concurrent first submission may already have created the row.
        sqlx::query(
            "INSERT INTO sessions (id, user_id, stage) VALUES ($1, $2, $3) ON CONFLICT (id) DO NOTHING",
        )
        .bind(session_id)
        .bind(user_id)
        .bind(Stage::Input.as_str())
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;

        self.get_session(session_id).await
    }

    async fn get_session(&self, session_id: Uuid) -> PortResult<Session> {
        sqlx::query_as::<_, SessionRecord>(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions WHERE id = $1"
        ))
        .bind(session_id)
        .fetch_one(&self.pool)
        .await
        .map_err(not_found_or_unexpected(format!("Session {} not found", session_id)))?
        .to_domain()
    }

    async fn advance_session(
        &self,
        session_id: Uuid,
        expected_version: i64,
        next: Stage,
    ) -> PortResult<Session> {
        sqlx::query_as::<_, SessionRecord>(&format!(
            "UPDATE sessions SET stage = $3, version = version + 1, updated_at = now() \
             WHERE id = $1 AND version = $2 RETURNING {SESSION_COLUMNS}"
        ))
        .bind(session_id)
        .bind(expected_version)
        .bind(next.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?
        .ok_or_else(|| {
            PortError::Conflict(format!(
                "Session {} changed since version {}",
                session_id, expected_version
            ))
        })?
        .to_domain()
    }

    async fn update_session_context(
        &self,
        session_id: Uuid,
        keywords: Option<&str>,
        target_audience: Option<&str>,
    ) -> PortResult<()> {
        sqlx::query(
            "UPDATE sessions SET keywords = $2, target_audience = $3, updated_at = now() WHERE id = $1",
        )
        .bind(session_id)
        .bind(keywords)
        .bind(target_audience)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(())
    }

    async fn insert_resource(&self, resource: Resource) -> PortResult<Resource> {
        sqlx::query_as::<_, ResourceRecord>(&format!(
            "INSERT INTO resources ({RESOURCE_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             RETURNING {RESOURCE_COLUMNS}"
        ))
        .bind(resource.id)
        .bind(resource.session_id)
        .bind(resource.source_type.as_str())
        .bind(&resource.source_url)
        .bind(&resource.file_name)
        .bind(&resource.title)
        .bind(&resource.content)
        .bind(resource.collected_at)
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?
        .to_domain()
    }

    async fn list_resources(&self, session_id: Uuid) -> PortResult<Vec<Resource>> {
        sqlx::query_as::<_, ResourceRecord>(&format!(
            "SELECT {RESOURCE_COLUMNS} FROM resources WHERE session_id = $1 ORDER BY collected_at ASC"
        ))
        .bind(session_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?
        .into_iter()
        .map(ResourceRecord::to_domain)
        .collect()
    }

    async fn insert_insights(&self, insights: Vec<Insight>) -> PortResult<Vec<Insight>> {
        let mut tx = self.pool.begin().await.map_err(unexpected)?;
        let mut saved = Vec::with_capacity(insights.len());
        for insight in insights {
            let record = sqlx::query_as::<_, InsightRecord>(&format!(
                "INSERT INTO insights ({INSIGHT_COLUMNS}) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) RETURNING {INSIGHT_COLUMNS}"
            ))
            .bind(insight.id)
            .bind(insight.session_id)
            .bind(&insight.title)
            .bind(&insight.signal)
            .bind(&insight.potential_angle)
            .bind(insight.confidence.as_str())
            .bind(insight.relevance.as_str())
            .bind(&insight.tags)
            .bind(insight.status.as_str())
            .bind(Json(&insight.source_refs))
            .bind(insight.created_at)
            .fetch_one(&mut *tx)
            .await
            .map_err(unexpected)?;
            saved.push(record.to_domain()?);
        }
        tx.commit().await.map_err(unexpected)?;
        Ok(saved)
    }

    async fn get_insight(&self, insight_id: Uuid) -> PortResult<Insight> {
        sqlx::query_as::<_, InsightRecord>(&format!(
            "SELECT {INSIGHT_COLUMNS} FROM insights WHERE id = $1"
        ))
        .bind(insight_id)
        .fetch_one(&self.pool)
        .await
        .map_err(not_found_or_unexpected(format!("Insight {} not found", insight_id)))?
        .to_domain()
    }

    async fn replace_selection(&self, session_id: Uuid, insight_ids: &[Uuid]) -> PortResult<()> {
        sqlx::query(
            "UPDATE insights \
             SET status = CASE WHEN id = ANY($2) THEN $3 ELSE $4 END \
             WHERE session_id = $1 AND (id = ANY($2) OR status = $3)",
        )
        .bind(session_id)
        .bind(insight_ids)
        .bind(InsightStatus::Selected.as_str())
        .bind(InsightStatus::Pending.as_str())
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(())
    }

    async fn insert_research(&self, research: Vec<Research>) -> PortResult<Vec<Research>> {
        let mut tx = self.pool.begin().await.map_err(unexpected)?;
        let mut saved = Vec::with_capacity(research.len());
        for item in research {
            let record = sqlx::query_as::<_, ResearchRecord>(&format!(
                "INSERT INTO research ({RESEARCH_COLUMNS}) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) RETURNING {RESEARCH_COLUMNS}"
            ))
            .bind(item.id)
            .bind(item.session_id)
            .bind(item.insight_id)
            .bind(&item.topic)
            .bind(&item.topic_slug)
            .bind(Json(&item.market_data))
            .bind(Json(&item.competitor_analysis))
            .bind(Json(&item.statistics))
            .bind(Json(&item.expert_opinions))
            .bind(Json(&item.related_trends))
            .bind(Json(&item.sources))
            .bind(item.created_at)
            .fetch_one(&mut *tx)
            .await
            .map_err(unexpected)?;
            saved.push(record.to_domain());
        }
        tx.commit().await.map_err(unexpected)?;
        Ok(saved)
    }

    async fn get_research(&self, research_id: Uuid) -> PortResult<Research> {
        sqlx::query_as::<_, ResearchRecord>(&format!(
            "SELECT {RESEARCH_COLUMNS} FROM research WHERE id = $1"
        ))
        .bind(research_id)
        .fetch_one(&self.pool)
        .await
        .map(ResearchRecord::to_domain)
        .map_err(not_found_or_unexpected(format!("Research {} not found", research_id)))
    }

    async fn insert_outline(&self, outline: Outline) -> PortResult<Outline> {
        sqlx::query_as::<_, OutlineRecord>(&format!(
            "INSERT INTO outlines ({OUTLINE_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) RETURNING {OUTLINE_COLUMNS}"
        ))
        .bind(outline.id)
        .bind(outline.session_id)
        .bind(outline.research_id)
        .bind(&outline.title)
        .bind(&outline.target_audience)
        .bind(&outline.thesis)
        .bind(&outline.tone)
        .bind(outline.structure_pattern.as_str())
        .bind(Json(&outline.sections))
        .bind(outline.status.as_str())
        .bind(outline.created_at)
        .bind(outline.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?
        .to_domain()
    }

    async fn get_outline(&self, outline_id: Uuid) -> PortResult<Outline> {
        sqlx::query_as::<_, OutlineRecord>(&format!(
            "SELECT {OUTLINE_COLUMNS} FROM outlines WHERE id = $1"
        ))
        .bind(outline_id)
        .fetch_one(&self.pool)
        .await
        .map_err(not_found_or_unexpected(format!("Outline {} not found", outline_id)))?
        .to_domain()
    }

    async fn update_outline(&self, outline: &Outline) -> PortResult<Outline> {
        sqlx::query_as::<_, OutlineRecord>(&format!(
            "UPDATE outlines SET title = $2, target_audience = $3, thesis = $4, tone = $5, \
             structure_pattern = $6, sections = $7, status = $8, updated_at = now() \
             WHERE id = $1 RETURNING {OUTLINE_COLUMNS}"
        ))
        .bind(outline.id)
        .bind(&outline.title)
        .bind(&outline.target_audience)
        .bind(&outline.thesis)
        .bind(&outline.tone)
        .bind(outline.structure_pattern.as_str())
        .bind(Json(&outline.sections))
        .bind(outline.status.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(not_found_or_unexpected(format!("Outline {} not found", outline.id)))?
        .to_domain()
    }

    async fn insert_draft(&self, draft: Draft) -> PortResult<Draft> {
        sqlx::query_as::<_, DraftRecord>(&format!(
            "INSERT INTO drafts ({DRAFT_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15) \
             RETURNING {DRAFT_COLUMNS}"
        ))
        .bind(draft.id)
        .bind(draft.session_id)
        .bind(draft.outline_id)
        .bind(&draft.title)
        .bind(&draft.subtitle)
        .bind(&draft.content)
        .bind(to_i32(draft.word_count))
        .bind(to_i32(draft.char_count))
        .bind(&draft.thumbnail_url)
        .bind(draft.status.as_str())
        .bind(draft.seo_metrics.as_ref().map(Json))
        .bind(&draft.meta_description)
        .bind(&draft.primary_keywords)
        .bind(draft.created_at)
        .bind(draft.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?
        .to_domain()
    }

    async fn get_draft(&self, draft_id: Uuid) -> PortResult<Draft> {
        sqlx::query_as::<_, DraftRecord>(&format!(
            "SELECT {DRAFT_COLUMNS} FROM drafts WHERE id = $1"
        ))
        .bind(draft_id)
        .fetch_one(&self.pool)
        .await
        .map_err(not_found_or_unexpected(format!("Draft {} not found", draft_id)))?
        .to_domain()
    }

    async fn save_draft_analysis(
        &self,
        draft_id: Uuid,
        metrics: &SeoMetrics,
        meta_description: &str,
        primary_keywords: Option<&[String]>,
    ) -> PortResult<()> {
        let result = sqlx::query(
            "UPDATE drafts SET seo_metrics = $2, meta_description = $3, \
             primary_keywords = COALESCE($4, primary_keywords), updated_at = now() WHERE id = $1",
        )
        .bind(draft_id)
        .bind(Json(metrics))
        .bind(meta_description)
        .bind(primary_keywords)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;

        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Draft {} not found", draft_id)));
        }
        Ok(())
    }

    async fn update_draft_status(
        &self,
        draft_id: Uuid,
        expected: DraftStatus,
        next: DraftStatus,
    ) -> PortResult<Draft> {
        let updated = sqlx::query_as::<_, DraftRecord>(&format!(
            "UPDATE drafts SET status = $3, updated_at = now() \
             WHERE id = $1 AND status = $2 RETURNING {DRAFT_COLUMNS}"
        ))
        .bind(draft_id)
        .bind(expected.as_str())
        .bind(next.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;

        match updated {
            Some(record) => record.to_domain(),
            // Either the draft is gone or its status moved under us.
            None => {
                self.get_draft(draft_id).await?;
                Err(PortError::Conflict(format!(
                    "Draft {} is no longer '{}'",
                    draft_id, expected
                )))
            }
        }
    }
}

//=========================================================================================
// `RateLimitStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl RateLimitStore for DbAdapter {
    async fn increment_within(
        &self,
        user_id: Uuid,
        function_name: &str,
        bucket: DateTime<Utc>,
        limit: u32,
    ) -> PortResult<bool> {
        // The conflict branch only updates while under the limit, so a full bucket
        // returns no row and the count never passes `limit`.
        let counted: Option<(i32,)> = sqlx::query_as(
            "INSERT INTO rate_limits (user_id, function_name, hour_bucket, call_count) \
             VALUES ($1, $2, $3, 1) \
             ON CONFLICT (user_id, function_name, hour_bucket) \
             DO UPDATE SET call_count = rate_limits.call_count + 1 \
             WHERE rate_limits.call_count < $4 \
             RETURNING call_count",
        )
        .bind(user_id)
        .bind(function_name)
        .bind(bucket)
        .bind(to_i32(limit))
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;

        Ok(counted.is_some())
    }
}
