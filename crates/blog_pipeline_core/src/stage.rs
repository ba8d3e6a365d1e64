//! crates/blog_pipeline_core/src/stage.rs
//!
//! The legal ordering of pipeline steps for one session.
//!
//! Each step accepts a fixed set of session stages, claims a working stage by a
//! compare-and-set on the session version, and leaves a completed stage when it
//! succeeds. `StageClaim` is the only value that can produce a stage write.

use crate::domain::{Session, Stage};
use uuid::Uuid;

impl Stage {
    /// The stage that directly follows this one, if any.
    pub fn next(self) -> Option<Stage> {
        match self {
            Stage::Input => Some(Stage::Analyzing),
            Stage::Analyzing => Some(Stage::Selection),
            Stage::Selection => Some(Stage::Researching),
            Stage::Researching => Some(Stage::Outline),
            Stage::Outline => Some(Stage::Writing),
            Stage::Writing => Some(Stage::Final),
            Stage::Final => Some(Stage::Published),
            Stage::Published => None,
        }
    }

    /// A stage may be entered from its predecessor or re-entered from itself.
    pub fn can_enter_from(self, from: Stage) -> bool {
        self == from || from.next() == Some(self)
    }
}

/// One invocable step of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineStep {
    CollectResource,
    ExtractInsights,
    DeepResearch,
    GenerateOutline,
    WriteDraft,
    AnalyzeContent,
    PublishDraft,
}

impl PipelineStep {
    pub fn name(self) -> &'static str {
        match self {
            Self::CollectResource => "collect-resource",
            Self::ExtractInsights => "extract-insights",
            Self::DeepResearch => "deep-research",
            Self::GenerateOutline => "generate-outline",
            Self::WriteDraft => "write-draft",
            Self::AnalyzeContent => "analyze-content",
            Self::PublishDraft => "publish-draft",
        }
    }

    /// Session stages from which this step may start.
    pub fn accepted_stages(self) -> &'static [Stage] {
        match self {
            Self::CollectResource => &[Stage::Input],
            Self::ExtractInsights => &[Stage::Input],
            Self::DeepResearch => &[Stage::Selection, Stage::Researching],
            Self::GenerateOutline => &[Stage::Researching, Stage::Outline],
            Self::WriteDraft => &[Stage::Outline],
            Self::AnalyzeContent => &[Stage::Final, Stage::Published],
            Self::PublishDraft => &[Stage::Final],
        }
    }

    /// Stage written when the step starts. `None` for steps that never move the session.
    pub fn working_stage(self) -> Option<Stage> {
        match self {
            Self::CollectResource | Self::AnalyzeContent => None,
            Self::ExtractInsights => Some(Stage::Analyzing),
            Self::DeepResearch => Some(Stage::Researching),
            Self::GenerateOutline => Some(Stage::Outline),
            Self::WriteDraft => Some(Stage::Writing),
            Self::PublishDraft => Some(Stage::Published),
        }
    }

    /// Stage written when the step succeeds.
    pub fn completed_stage(self) -> Option<Stage> {
        match self {
            Self::CollectResource | Self::AnalyzeContent => None,
            Self::ExtractInsights => Some(Stage::Selection),
            Self::DeepResearch => Some(Stage::Researching),
            Self::GenerateOutline => Some(Stage::Outline),
            Self::WriteDraft => Some(Stage::Final),
            Self::PublishDraft => Some(Stage::Published),
        }
    }

    /// Verifies that the step may run on a session currently in `current`.
    pub fn check(self, current: Stage) -> Result<(), StageViolation> {
        if self.accepted_stages().contains(&current) {
            Ok(())
        } else {
            Err(StageViolation {
                step: self.name(),
                current,
                expected: self.accepted_stages(),
            })
        }
    }

    /// Plans the claim for this step against a freshly loaded session.
    pub fn claim(self, session: &Session) -> Result<Option<StageClaim>, StageViolation> {
        self.check(session.stage)?;
        let Some(working) = self.working_stage() else {
            return Ok(None);
        };
        debug_assert!(working.can_enter_from(session.stage));
        Ok(Some(StageClaim {
            session_id: session.id,
            step: self,
            origin: session.stage,
            working,
            expected_version: session.version,
        }))
    }
}

/// A step was invoked while the session sat in a stage it does not accept.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{step} cannot run while the session is in '{current}' (expected one of {expected:?})")]
pub struct StageViolation {
    pub step: &'static str,
    pub current: Stage,
    pub expected: &'static [Stage],
}

/// A planned stage write, bound to the session version it was computed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageClaim {
    pub session_id: Uuid,
    pub step: PipelineStep,
    /// Stage the session was in when the step started.
    pub origin: Stage,
    pub working: Stage,
    pub expected_version: i64,
}

impl StageClaim {
    /// The transition that completes the step, given the version after the claim was
    /// written. `None` when the working stage is already the completed stage.
    pub fn completion(&self, claimed_version: i64) -> Option<(i64, Stage)> {
        match self.step.completed_stage() {
            Some(done) if done != self.working => Some((claimed_version, done)),
            _ => None,
        }
    }

    /// The transition that undoes this claim after a failure.
    pub fn release(&self, claimed_version: i64) -> (i64, Stage) {
        (claimed_version, self.origin)
    }
}
