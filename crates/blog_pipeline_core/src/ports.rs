//! crates/blog_pipeline_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the pipeline's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of the concrete store, model providers, and HTTP client.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use url::Url;
use uuid::Uuid;

use crate::domain::{
    AuthUser, Draft, DraftStatus, Insight, Outline, Research, Resource, SeoMetrics, Session, Stage,
};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    /// A conditional write lost against a concurrent writer.
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Store Ports
//=========================================================================================

#[async_trait]
pub trait PipelineStore: Send + Sync {
    // --- Auth ---
    /// Resolves a bearer token to a user. Fails with `Unauthorized` if the token is
    /// unknown, expired, or not issued to an authenticated user.
    async fn validate_token(&self, token: &str) -> PortResult<AuthUser>;

    // --- Sessions ---
    async fn create_session(&self, session_id: Uuid, user_id: Uuid) -> PortResult<Session>;

    async fn get_session(&self, session_id: Uuid) -> PortResult<Session>;

    /// Moves a session to `next` only if its version still equals `expected_version`.
    /// Returns the updated session; fails with `Conflict` otherwise.
    async fn advance_session(
        &self,
        session_id: Uuid,
        expected_version: i64,
        next: Stage,
    ) -> PortResult<Session>;

    async fn update_session_context(
        &self,
        session_id: Uuid,
        keywords: Option<&str>,
        target_audience: Option<&str>,
    ) -> PortResult<()>;

    // --- Resources ---
    async fn insert_resource(&self, resource: Resource) -> PortResult<Resource>;

    async fn list_resources(&self, session_id: Uuid) -> PortResult<Vec<Resource>>;

    // --- Insights ---
    async fn insert_insights(&self, insights: Vec<Insight>) -> PortResult<Vec<Insight>>;

    async fn get_insight(&self, insight_id: Uuid) -> PortResult<Insight>;

    /// Marks exactly `insight_ids` as selected. Any other insight of the session that was
    /// selected goes back to pending.
    async fn replace_selection(&self, session_id: Uuid, insight_ids: &[Uuid]) -> PortResult<()>;

    // --- Research ---
    async fn insert_research(&self, research: Vec<Research>) -> PortResult<Vec<Research>>;

    async fn get_research(&self, research_id: Uuid) -> PortResult<Research>;

    // --- Outlines ---
    async fn insert_outline(&self, outline: Outline) -> PortResult<Outline>;

    async fn get_outline(&self, outline_id: Uuid) -> PortResult<Outline>;

    /// Overwrites the editable fields and status of an outline.
    async fn update_outline(&self, outline: &Outline) -> PortResult<Outline>;

    // --- Drafts ---
    async fn insert_draft(&self, draft: Draft) -> PortResult<Draft>;

    async fn get_draft(&self, draft_id: Uuid) -> PortResult<Draft>;

    /// Stores a metrics snapshot and meta description. `None` keywords keep the stored ones.
    async fn save_draft_analysis(
        &self,
        draft_id: Uuid,
        metrics: &SeoMetrics,
        meta_description: &str,
        primary_keywords: Option<&[String]>,
    ) -> PortResult<()>;

    /// Moves a draft from `expected` to `next`. Fails with `Conflict` if the stored
    /// status is no longer `expected`.
    async fn update_draft_status(
        &self,
        draft_id: Uuid,
        expected: DraftStatus,
        next: DraftStatus,
    ) -> PortResult<Draft>;
}

#[async_trait]
pub trait RateLimitStore: Send + Sync {
    /// Atomically increments the counter for `(user_id, function_name, bucket)` unless it
    /// already reached `limit`. Returns whether the call was counted.
    async fn increment_within(
        &self,
        user_id: Uuid,
        function_name: &str,
        bucket: DateTime<Utc>,
        limit: u32,
    ) -> PortResult<bool>;
}

//=========================================================================================
// Provider Ports
//=========================================================================================

/// Which model class a request needs. Adapters with a single model ignore it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ModelTier {
    #[default]
    Standard,
    Light,
}

/// A single-turn generation request.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub system_prompt: String,
    pub user_message: String,
    pub max_tokens: u32,
    pub tier: ModelTier,
}

/// Provider output: free-form text plus any citation URLs it reported.
#[derive(Debug, Clone, Default)]
pub struct Generation {
    pub text: String,
    pub citations: Vec<String>,
}

#[async_trait]
pub trait GenerationService: Send + Sync {
    /// Sends one request to the provider. Non-2xx responses and transport failures are
    /// reported as `PortError::Unexpected`.
    async fn generate(&self, request: GenerationRequest) -> PortResult<Generation>;
}

/// The raw result of fetching a page.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// The URL after redirects.
    pub final_url: Url,
    pub status: u16,
    pub body: String,
}

#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetches `url`. Callers must have validated the URL first.
    async fn fetch(&self, url: &Url) -> PortResult<FetchedPage>;
}
