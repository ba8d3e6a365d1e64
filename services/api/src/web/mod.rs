pub mod middleware;
pub mod rest;
pub mod state;

pub use middleware::require_auth;
pub use state::AppState;

use axum::{
    extract::DefaultBodyLimit,
    http::{
        header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
        HeaderValue, Method,
    },
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use rest::ApiDoc;
use std::sync::Arc;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing::warn;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// Uploaded files are text, but allow generous documents.
const BODY_LIMIT_BYTES: usize = 2 * 1024 * 1024;

/// Builds the full application router: authenticated stage routes, the public
/// health probe, and the Swagger UI.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = cors_layer(&state.config.allowed_origins);

    // Protected routes (bearer token required)
    let protected_routes = Router::new()
        .route("/api/collect-resource", post(rest::collect_resource_handler))
        .route("/api/submit-file", post(rest::submit_file_handler))
        .route("/api/extract-insights", post(rest::extract_insights_handler))
        .route("/api/deep-research", post(rest::deep_research_handler))
        .route("/api/generate-outline", post(rest::generate_outline_handler))
        .route("/api/write-draft", post(rest::write_draft_handler))
        .route("/api/analyze-content", post(rest::analyze_content_handler))
        .route("/api/draft-status", post(rest::update_draft_status_handler))
        .route("/api/search-news", post(rest::search_news_handler))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            require_auth,
        ));

    let api_router = Router::new()
        .route("/health", get(rest::health_handler))
        .merge(protected_routes)
        .layer(DefaultBodyLimit::max(BODY_LIMIT_BYTES))
        .with_state(state);

    Router::new()
        .merge(api_router)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(%origin, "Ignoring unparseable CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE, ACCEPT])
}
