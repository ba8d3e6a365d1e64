//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use crate::config::Config;
use crate::pipeline::Pipeline;
use blog_pipeline_core::{ports::PipelineStore, rate_limit::RateLimiter};
use std::sync::Arc;

//=========================================================================================
// AppState (Shared Across All Requests)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Pipeline,
    pub limiter: RateLimiter,
    /// Used directly only for bearer-token validation.
    pub store: Arc<dyn PipelineStore>,
    pub config: Arc<Config>,
}
