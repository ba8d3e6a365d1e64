pub mod domain;
pub mod gateway;
pub mod markdown;
pub mod ports;
pub mod rate_limit;
pub mod sanitize;
pub mod scoring;
pub mod stage;
pub mod url_guard;

pub use domain::{
    AuthUser, Draft, DraftStatus, Insight, InsightStatus, Level, Outline, OutlineSection,
    OutlineStatus, Research, ResearchSource, Resource, SeoMetrics, Session, SourceCategory,
    SourceRef, SourceType, Stage, StructurePattern, Suggestion,
};
pub use gateway::{extract_json, GatewayError, JsonGeneration, ParseFailure, ProviderGateway};
pub use ports::{
    FetchedPage, Generation, GenerationRequest, GenerationService, ModelTier, PageFetcher,
    PipelineStore, PortError, PortResult, RateLimitStore,
};
pub use rate_limit::{MeteredOperation, RateLimitExceeded, RateLimiter};
pub use stage::{PipelineStep, StageClaim, StageViolation};
pub use url_guard::UrlRejection;
