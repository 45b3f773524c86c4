//! Stage state machine of the pipeline.
//!
//! ```text
//! Idle --collect--> Collecting --ok--> Collected --train--> Training --ok--> Trained
//!                                                                              |
//!                                       Predicted <--ok-- Predicting <--predict+
//! ```
//!
//! Any stage failure moves to `Failed`, which remembers the state the stage
//! was started from. `retry` (or invoking a stage again) resumes from there.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

/// One pipeline phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Collect,
    Train,
    Predict,
}

impl Stage {
    /// Verb used in transition errors
    pub fn action(&self) -> &'static str {
        match self {
            Stage::Collect => "collect",
            Stage::Train => "train",
            Stage::Predict => "predict",
        }
    }

    /// State held while this stage runs
    pub fn running_state(&self) -> PipelineState {
        match self {
            Stage::Collect => PipelineState::Collecting,
            Stage::Train => PipelineState::Training,
            Stage::Predict => PipelineState::Predicting,
        }
    }

    /// Whether the stage may start from `state` (never a busy or failed state)
    pub fn allowed_from(&self, state: &PipelineState) -> bool {
        use PipelineState::*;
        match self {
            // Training reads archived files, so it needs no prior collection
            Stage::Collect | Stage::Train => {
                matches!(state, Idle | Collected | Trained | Predicted)
            }
            Stage::Predict => matches!(state, Trained | Predicted),
        }
    }

    /// State reached when the stage succeeds after starting from `from`
    pub fn completed_state(&self, from: &PipelineState) -> PipelineState {
        match self {
            // Fresh rows collected with a model loaded stay ready for prediction
            Stage::Collect => match from {
                PipelineState::Trained | PipelineState::Predicted => PipelineState::Trained,
                _ => PipelineState::Collected,
            },
            Stage::Train => PipelineState::Trained,
            Stage::Predict => PipelineState::Predicted,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.action())
    }
}

/// Orchestrator state
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineState {
    Idle,
    Collecting,
    Collected,
    Training,
    Trained,
    Predicting,
    Predicted,
    Failed {
        stage: Stage,
        error: PipelineError,
        /// State the failed stage was started from
        resume: Box<PipelineState>,
    },
}

impl PipelineState {
    pub fn name(&self) -> &'static str {
        match self {
            PipelineState::Idle => "idle",
            PipelineState::Collecting => "collecting",
            PipelineState::Collected => "collected",
            PipelineState::Training => "training",
            PipelineState::Trained => "trained",
            PipelineState::Predicting => "predicting",
            PipelineState::Predicted => "predicted",
            PipelineState::Failed { .. } => "failed",
        }
    }

    /// A stage is currently running
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            PipelineState::Collecting | PipelineState::Training | PipelineState::Predicting
        )
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, PipelineState::Failed { .. })
    }

    /// State stage guards are evaluated against: the resume point when failed
    pub fn resume_point(&self) -> &PipelineState {
        match self {
            PipelineState::Failed { resume, .. } => resume,
            other => other,
        }
    }

    /// Error retained by a failed state
    pub fn error(&self) -> Option<&PipelineError> {
        match self {
            PipelineState::Failed { error, .. } => Some(error),
            _ => None,
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineState::Failed { stage, .. } => write!(f, "failed ({})", stage),
            other => f.write_str(other.name()),
        }
    }
}
