//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the pipeline endpoints and the master
//! definition for the OpenAPI specification.
//!
//! Every stage handler counts the call against the caller's hourly quota before the
//! request body is read.

use crate::error::PipelineError;
use crate::pipeline::{news::DEFAULT_MAX_RESULTS, NewsItem, NewsQuery, OutlineEdit, Recency};
use crate::web::state::AppState;
use axum::{
    extract::{FromRequest, Request, State},
    response::Json,
    Extension,
};
use blog_pipeline_core::{
    domain::{AuthUser, Draft, DraftStatus, Insight, Outline, Research, Resource, SeoMetrics, Suggestion},
    rate_limit::MeteredOperation,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::sync::Arc;
use utoipa::{OpenApi, ToSchema};
use uuid::Uuid;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        health_handler,
        collect_resource_handler,
        submit_file_handler,
        extract_insights_handler,
        deep_research_handler,
        generate_outline_handler,
        write_draft_handler,
        analyze_content_handler,
        update_draft_status_handler,
        search_news_handler,
    ),
    components(
        schemas(
            HealthResponse,
            ErrorBody,
            CollectResourceRequest,
            SubmitFileRequest,
            ResourceResponse,
            ExtractInsightsRequest,
            InsightsResponse,
            DeepResearchRequest,
            ResearchResponse,
            GenerateOutlineRequest,
            OutlineResponse,
            WriteDraftRequest,
            DraftResponse,
            AnalyzeContentRequest,
            AnalyzeContentResponse,
            GeneratedMetaBody,
            UpdateDraftStatusRequest,
            SearchNewsRequest,
            SearchNewsResponse,
        )
    ),
    tags(
        (name = "Blog Pipeline API", description = "Stage endpoints that turn collected sources into a scored article.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// API Payload Structs
//=========================================================================================

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    status: String,
}

/// The body of every error response.
#[derive(Serialize, ToSchema)]
pub struct ErrorBody {
    error: String,
}

#[derive(Deserialize, ToSchema)]
pub struct CollectResourceRequest {
    pub session_id: Uuid,
    pub url: String,
}

#[derive(Deserialize, ToSchema)]
pub struct SubmitFileRequest {
    pub session_id: Uuid,
    pub file_name: String,
    /// The file's text content.
    pub content: String,
}

#[derive(Serialize, ToSchema)]
pub struct ResourceResponse {
    pub resource_id: Uuid,
    pub title: Option<String>,
    /// Length of the stored (sanitized) content in characters.
    pub content_length: usize,
}

impl From<Resource> for ResourceResponse {
    fn from(resource: Resource) -> Self {
        Self {
            resource_id: resource.id,
            content_length: resource.content.chars().count(),
            title: resource.title,
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub struct ExtractInsightsRequest {
    pub session_id: Uuid,
    pub keywords: Option<String>,
    pub target_audience: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct InsightsResponse {
    #[schema(value_type = Vec<Object>)]
    pub insights: Vec<Insight>,
}

#[derive(Deserialize, ToSchema)]
pub struct DeepResearchRequest {
    pub session_id: Uuid,
    pub insight_ids: Vec<Uuid>,
}

#[derive(Serialize, ToSchema)]
pub struct ResearchResponse {
    #[schema(value_type = Vec<Object>)]
    pub research: Vec<Research>,
}

#[derive(Deserialize, ToSchema)]
pub struct GenerateOutlineRequest {
    pub session_id: Uuid,
    pub research_id: Uuid,
}

#[derive(Serialize, ToSchema)]
pub struct OutlineResponse {
    #[schema(value_type = Object)]
    pub outline: Outline,
}

#[derive(Deserialize, ToSchema)]
pub struct WriteDraftRequest {
    pub session_id: Uuid,
    pub outline_id: Uuid,
    /// The outline as edited by the user.
    #[schema(value_type = Object)]
    pub outline: OutlineEdit,
}

#[derive(Serialize, ToSchema)]
pub struct DraftResponse {
    #[schema(value_type = Object)]
    pub draft: Draft,
}

#[derive(Deserialize, ToSchema)]
pub struct AnalyzeContentRequest {
    pub draft_id: Uuid,
    #[serde(default)]
    pub keywords: Vec<String>,
}

#[derive(Serialize, ToSchema)]
pub struct GeneratedMetaBody {
    pub description: String,
    pub keywords: Vec<String>,
}

#[derive(Serialize, ToSchema)]
pub struct AnalyzeContentResponse {
    pub overall_score: u32,
    #[schema(value_type = Object)]
    pub metrics: SeoMetrics,
    #[schema(value_type = Vec<Object>)]
    pub suggestions: Vec<Suggestion>,
    pub generated_meta: GeneratedMetaBody,
}

#[derive(Deserialize, ToSchema)]
pub struct UpdateDraftStatusRequest {
    pub draft_id: Uuid,
    /// One of `draft`, `final`, `published`.
    #[schema(value_type = String)]
    pub status: DraftStatus,
}

#[derive(Deserialize, ToSchema)]
pub struct SearchNewsRequest {
    pub keywords: Vec<String>,
    /// One of `hour`, `day`, `week`, `month`, `year`. Defaults to `month`.
    #[schema(value_type = Option<String>)]
    pub recency: Option<Recency>,
    pub max_results: Option<usize>,
}

#[derive(Serialize, ToSchema)]
pub struct SearchNewsResponse {
    #[schema(value_type = Vec<Object>)]
    pub results: Vec<NewsItem>,
    pub total: usize,
}

/// Reads a JSON body, reporting malformed input as a validation failure.
async fn read_json<T: DeserializeOwned>(request: Request) -> Result<T, PipelineError> {
    let Json(body) = Json::<T>::from_request(request, &())
        .await
        .map_err(|rejection| PipelineError::validation(rejection.body_text()))?;
    Ok(body)
}

//=========================================================================================
// REST API Handlers
//=========================================================================================

/// Liveness probe.
#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service is up", body = HealthResponse))
)]
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

/// Fetch a URL and store its readable text as a session resource.
///
/// Creates the session on first use.
#[utoipa::path(
    post,
    path = "/api/collect-resource",
    request_body = CollectResourceRequest,
    responses(
        (status = 200, description = "Resource collected", body = ResourceResponse),
        (status = 400, description = "Invalid or blocked URL, or the fetch failed", body = ErrorBody),
        (status = 401, description = "Missing or invalid token", body = ErrorBody),
        (status = 409, description = "Session is past the input stage", body = ErrorBody),
        (status = 429, description = "Hourly quota exceeded", body = ErrorBody)
    )
)]
pub async fn collect_resource_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    request: Request,
) -> Result<Json<ResourceResponse>, PipelineError> {
    state
        .limiter
        .check_and_increment(user.user_id, MeteredOperation::CollectResource)
        .await?;
    let body: CollectResourceRequest = read_json(request).await?;
    let resource = state
        .pipeline
        .collect_url(user, body.session_id, &body.url)
        .await?;
    Ok(Json(resource.into()))
}

/// Store uploaded text as a session resource.
#[utoipa::path(
    post,
    path = "/api/submit-file",
    request_body = SubmitFileRequest,
    responses(
        (status = 200, description = "File stored", body = ResourceResponse),
        (status = 400, description = "Missing file name or content", body = ErrorBody),
        (status = 401, description = "Missing or invalid token", body = ErrorBody),
        (status = 429, description = "Hourly quota exceeded", body = ErrorBody)
    )
)]
pub async fn submit_file_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    request: Request,
) -> Result<Json<ResourceResponse>, PipelineError> {
    state
        .limiter
        .check_and_increment(user.user_id, MeteredOperation::CollectResource)
        .await?;
    let body: SubmitFileRequest = read_json(request).await?;
    let resource = state
        .pipeline
        .collect_file(user, body.session_id, &body.file_name, &body.content)
        .await?;
    Ok(Json(resource.into()))
}

/// Extract candidate article angles from the session's resources.
#[utoipa::path(
    post,
    path = "/api/extract-insights",
    request_body = ExtractInsightsRequest,
    responses(
        (status = 200, description = "Insights extracted", body = InsightsResponse),
        (status = 400, description = "No resources, or the provider failed", body = ErrorBody),
        (status = 401, description = "Missing or invalid token", body = ErrorBody),
        (status = 409, description = "Session is not in the input stage", body = ErrorBody),
        (status = 429, description = "Hourly quota exceeded", body = ErrorBody)
    )
)]
pub async fn extract_insights_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    request: Request,
) -> Result<Json<InsightsResponse>, PipelineError> {
    state
        .limiter
        .check_and_increment(user.user_id, MeteredOperation::ExtractInsights)
        .await?;
    let body: ExtractInsightsRequest = read_json(request).await?;
    let insights = state
        .pipeline
        .extract_insights(
            user,
            body.session_id,
            body.keywords.as_deref(),
            body.target_audience.as_deref(),
        )
        .await?;
    Ok(Json(InsightsResponse { insights }))
}

/// Research the selected insights.
#[utoipa::path(
    post,
    path = "/api/deep-research",
    request_body = DeepResearchRequest,
    responses(
        (status = 200, description = "One research record per insight", body = ResearchResponse),
        (status = 400, description = "No insights given, or the provider failed", body = ErrorBody),
        (status = 401, description = "Missing or invalid token", body = ErrorBody),
        (status = 404, description = "Unknown session or insight", body = ErrorBody),
        (status = 409, description = "Session is not ready for research", body = ErrorBody),
        (status = 429, description = "Hourly quota exceeded", body = ErrorBody)
    )
)]
pub async fn deep_research_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    request: Request,
) -> Result<Json<ResearchResponse>, PipelineError> {
    state
        .limiter
        .check_and_increment(user.user_id, MeteredOperation::DeepResearch)
        .await?;
    let body: DeepResearchRequest = read_json(request).await?;
    let research = state
        .pipeline
        .deep_research(user, body.session_id, &body.insight_ids)
        .await?;
    Ok(Json(ResearchResponse { research }))
}

/// Plan the article for one research record.
#[utoipa::path(
    post,
    path = "/api/generate-outline",
    request_body = GenerateOutlineRequest,
    responses(
        (status = 200, description = "Outline generated", body = OutlineResponse),
        (status = 400, description = "The provider failed", body = ErrorBody),
        (status = 401, description = "Missing or invalid token", body = ErrorBody),
        (status = 404, description = "Unknown session or research", body = ErrorBody),
        (status = 409, description = "Session is not ready for an outline", body = ErrorBody),
        (status = 429, description = "Hourly quota exceeded", body = ErrorBody)
    )
)]
pub async fn generate_outline_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    request: Request,
) -> Result<Json<OutlineResponse>, PipelineError> {
    state
        .limiter
        .check_and_increment(user.user_id, MeteredOperation::GenerateOutline)
        .await?;
    let body: GenerateOutlineRequest = read_json(request).await?;
    let outline = state
        .pipeline
        .generate_outline(user, body.session_id, body.research_id)
        .await?;
    Ok(Json(OutlineResponse { outline }))
}

/// Write the article for an edited outline.
#[utoipa::path(
    post,
    path = "/api/write-draft",
    request_body = WriteDraftRequest,
    responses(
        (status = 200, description = "Draft written", body = DraftResponse),
        (status = 400, description = "Empty outline, or the provider failed", body = ErrorBody),
        (status = 401, description = "Missing or invalid token", body = ErrorBody),
        (status = 404, description = "Unknown session or outline", body = ErrorBody),
        (status = 409, description = "Session is not in the outline stage", body = ErrorBody),
        (status = 429, description = "Hourly quota exceeded", body = ErrorBody)
    )
)]
pub async fn write_draft_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    request: Request,
) -> Result<Json<DraftResponse>, PipelineError> {
    state
        .limiter
        .check_and_increment(user.user_id, MeteredOperation::WriteDraft)
        .await?;
    let body: WriteDraftRequest = read_json(request).await?;
    let draft = state
        .pipeline
        .write_draft(user, body.session_id, body.outline_id, body.outline)
        .await?;
    Ok(Json(DraftResponse { draft }))
}

/// Score a draft and store the metrics on it.
#[utoipa::path(
    post,
    path = "/api/analyze-content",
    request_body = AnalyzeContentRequest,
    responses(
        (status = 200, description = "Draft scored", body = AnalyzeContentResponse),
        (status = 401, description = "Missing or invalid token", body = ErrorBody),
        (status = 404, description = "Unknown draft", body = ErrorBody),
        (status = 409, description = "Session has no finished draft yet", body = ErrorBody),
        (status = 429, description = "Hourly quota exceeded", body = ErrorBody)
    )
)]
pub async fn analyze_content_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    request: Request,
) -> Result<Json<AnalyzeContentResponse>, PipelineError> {
    state
        .limiter
        .check_and_increment(user.user_id, MeteredOperation::AnalyzeContent)
        .await?;
    let body: AnalyzeContentRequest = read_json(request).await?;
    let analysis = state
        .pipeline
        .analyze_content(user, body.draft_id, &body.keywords)
        .await?;
    Ok(Json(AnalyzeContentResponse {
        overall_score: analysis.overall_score,
        metrics: analysis.metrics,
        suggestions: analysis.suggestions,
        generated_meta: GeneratedMetaBody {
            description: analysis.generated_meta.description,
            keywords: analysis.generated_meta.keywords,
        },
    }))
}

/// Move a draft forward through draft, final and published.
#[utoipa::path(
    post,
    path = "/api/draft-status",
    request_body = UpdateDraftStatusRequest,
    responses(
        (status = 200, description = "Status updated", body = DraftResponse),
        (status = 401, description = "Missing or invalid token", body = ErrorBody),
        (status = 404, description = "Unknown draft", body = ErrorBody),
        (status = 409, description = "Transition not allowed", body = ErrorBody)
    )
)]
pub async fn update_draft_status_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    request: Request,
) -> Result<Json<DraftResponse>, PipelineError> {
    let body: UpdateDraftStatusRequest = read_json(request).await?;
    let draft = state
        .pipeline
        .update_draft_status(user, body.draft_id, body.status)
        .await?;
    Ok(Json(DraftResponse { draft }))
}

/// Search recent news for a set of keywords.
#[utoipa::path(
    post,
    path = "/api/search-news",
    request_body = SearchNewsRequest,
    responses(
        (status = 200, description = "Search results", body = SearchNewsResponse),
        (status = 400, description = "No keywords, or the provider failed", body = ErrorBody),
        (status = 401, description = "Missing or invalid token", body = ErrorBody),
        (status = 429, description = "Hourly quota exceeded", body = ErrorBody)
    )
)]
pub async fn search_news_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    request: Request,
) -> Result<Json<SearchNewsResponse>, PipelineError> {
    state
        .limiter
        .check_and_increment(user.user_id, MeteredOperation::SearchNews)
        .await?;
    let body: SearchNewsRequest = read_json(request).await?;
    let found = state
        .pipeline
        .search_news(NewsQuery {
            keywords: body.keywords,
            recency: body.recency.unwrap_or_default(),
            max_results: body.max_results.unwrap_or(DEFAULT_MAX_RESULTS),
        })
        .await?;
    Ok(Json(SearchNewsResponse {
        results: found.results,
        total: found.total,
    }))
}
