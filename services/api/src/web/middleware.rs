//! services/api/src/web/middleware.rs
//!
//! Authentication middleware for protecting routes.

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use blog_pipeline_core::ports::PortError;
use std::sync::Arc;
use tracing::error;

use crate::error::PipelineError;
use crate::web::state::AppState;

/// Middleware that validates the bearer token and resolves the caller.
///
/// If valid, inserts the `AuthUser` into request extensions for handlers to use.
/// If missing, expired, or not a user token, returns 401 before any handler runs.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, PipelineError> {
    // 1. Extract the bearer token
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| {
            PipelineError::Auth("Missing or invalid Authorization header".to_string())
        })?;

    // 2. Validate it against the store
    let user = state.store.validate_token(token).await.map_err(|e| match e {
        PortError::Unauthorized(why) => PipelineError::Auth(why),
        other => {
            error!("Failed to validate token: {:?}", other);
            PipelineError::Auth("Invalid token".to_string())
        }
    })?;

    // 3. Insert the caller into request extensions
    req.extensions_mut().insert(user);

    // 4. Continue to the handler
    Ok(next.run(req).await)
}
