use blog_pipeline_core::{
    domain::{AuthUser, Draft, DraftStatus},
    stage::PipelineStep,
};
use tracing::info;
use uuid::Uuid;

use super::Pipeline;
use crate::error::PipelineError;

impl Pipeline {
    /// Moves a draft one status forward. Publishing also moves the session to `published`.
    ///
    /// The write only lands if the draft still has the status it was checked against.
    pub async fn update_draft_status(
        &self,
        user: AuthUser,
        draft_id: Uuid,
        status: DraftStatus,
    ) -> Result<Draft, PipelineError> {
        let (draft, session) = self.load_owned_draft(user, draft_id).await?;
        if !draft.status.can_transition_to(status) {
            return Err(PipelineError::Conflict(format!(
                "Draft cannot move from '{}' to '{}'",
                draft.status, status
            )));
        }

        if status != DraftStatus::Published {
            let updated = self
                .store
                .update_draft_status(draft_id, draft.status, status)
                .await?;
            info!(%draft_id, status = %status, "Draft status updated");
            return Ok(updated);
        }

        let claim = self.claim(PipelineStep::PublishDraft, &session).await?;
        let result = self
            .store
            .update_draft_status(draft_id, draft.status, status)
            .await
            .map_err(PipelineError::from);
        let published = self.settle(claim, result).await?;
        info!(%draft_id, session_id = %session.id, "Draft published");
        Ok(published)
    }
}
