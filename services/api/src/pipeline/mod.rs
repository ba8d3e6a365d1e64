//! services/api/src/pipeline/mod.rs
//!
//! The stage components. Each stage loads its prerequisite rows, claims the session
//! stage, calls its provider, persists its output, and settles the claim.
//!
//! The stages themselves live in one submodule each as `impl Pipeline` blocks.

pub mod analyze;
pub mod collect;
pub mod draft;
pub mod insights;
pub mod news;
pub mod outline;
pub mod prompts;
pub mod publish;
pub mod research;

use blog_pipeline_core::{
    domain::{AuthUser, Draft, Session},
    gateway::ProviderGateway,
    ports::{PageFetcher, PipelineStore, PortError},
    stage::{PipelineStep, StageClaim},
};
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

use crate::error::PipelineError;

pub use analyze::{ContentAnalysis, GeneratedMeta};
pub use collect::{extract_page, PageText, CONTENT_CEILING};
pub use draft::OutlineEdit;
pub use news::{NewsItem, NewsQuery, NewsResults, Recency};

/// Orchestrates every pipeline stage over the injected ports.
#[derive(Clone)]
pub struct Pipeline {
    store: Arc<dyn PipelineStore>,
    /// The general-purpose generation provider.
    gateway: ProviderGateway,
    /// The search-grounded provider used for research and news.
    search: ProviderGateway,
    fetcher: Arc<dyn PageFetcher>,
}

/// A claim that has been written to the store.
#[derive(Debug, Clone, Copy)]
struct ActiveClaim {
    plan: StageClaim,
    claimed_version: i64,
}

impl Pipeline {
    pub fn new(
        store: Arc<dyn PipelineStore>,
        gateway: ProviderGateway,
        search: ProviderGateway,
        fetcher: Arc<dyn PageFetcher>,
    ) -> Self {
        Self {
            store,
            gateway,
            search,
            fetcher,
        }
    }

    /// Loads a session the caller owns. Someone else's session is reported as missing.
    async fn load_owned_session(
        &self,
        user: AuthUser,
        session_id: Uuid,
    ) -> Result<Session, PipelineError> {
        let session = self.store.get_session(session_id).await?;
        ensure_owner(user, session)
    }

    /// Loads a draft through the session that owns it.
    async fn load_owned_draft(
        &self,
        user: AuthUser,
        draft_id: Uuid,
    ) -> Result<(Draft, Session), PipelineError> {
        let draft = self.store.get_draft(draft_id).await?;
        let session = self
            .load_owned_session(user, draft.session_id)
            .await
            .map_err(|e| match e {
                PipelineError::NotFound(_) => {
                    PipelineError::NotFound(format!("Draft {} not found", draft_id))
                }
                other => other,
            })?;
        Ok((draft, session))
    }

    /// Loads the caller's session, creating it in `input` on first use.
    async fn load_or_create_session(
        &self,
        user: AuthUser,
        session_id: Uuid,
    ) -> Result<Session, PipelineError> {
        let session = match self.store.get_session(session_id).await {
            Ok(session) => session,
            Err(PortError::NotFound(_)) => {
                info!(%session_id, user_id = %user.user_id, "Creating session");
                self.store.create_session(session_id, user.user_id).await?
            }
            Err(e) => return Err(e.into()),
        };
        ensure_owner(user, session)
    }

    /// Validates the step against the session and writes its working stage.
    async fn claim(
        &self,
        step: PipelineStep,
        session: &Session,
    ) -> Result<Option<ActiveClaim>, PipelineError> {
        let Some(plan) = step.claim(session)? else {
            return Ok(None);
        };
        let claimed = self
            .store
            .advance_session(plan.session_id, plan.expected_version, plan.working)
            .await
            .map_err(|e| match e {
                PortError::Conflict(_) => PipelineError::Conflict(format!(
                    "{} is already running for session {}",
                    step.name(),
                    plan.session_id
                )),
                other => other.into(),
            })?;
        info!(session_id = %plan.session_id, step = step.name(), stage = %plan.working, "Stage claimed");
        Ok(Some(ActiveClaim {
            plan,
            claimed_version: claimed.version,
        }))
    }

    /// Completes the claim when `result` succeeded, and releases it otherwise.
    async fn settle<T>(
        &self,
        claim: Option<ActiveClaim>,
        result: Result<T, PipelineError>,
    ) -> Result<T, PipelineError> {
        let Some(active) = claim else {
            return result;
        };
        let session_id = active.plan.session_id;

        match result {
            Ok(value) => {
                if let Some((version, done)) = active.plan.completion(active.claimed_version) {
                    self.store.advance_session(session_id, version, done).await?;
                    info!(%session_id, step = active.plan.step.name(), stage = %done, "Stage completed");
                }
                Ok(value)
            }
            Err(e) => {
                let (version, origin) = active.plan.release(active.claimed_version);
                if origin != active.plan.working {
                    if let Err(release_err) =
                        self.store.advance_session(session_id, version, origin).await
                    {
                        error!(%session_id, step = active.plan.step.name(), "Failed to release stage claim: {}", release_err);
                    }
                }
                Err(e)
            }
        }
    }
}

fn ensure_owner(user: AuthUser, session: Session) -> Result<Session, PipelineError> {
    if session.user_id != user.user_id {
        return Err(PipelineError::NotFound(format!(
            "Session {} not found",
            session.id
        )));
    }
    Ok(session)
}
