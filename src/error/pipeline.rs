// Pipeline error types and constants

use crate::error::{AcquisitionError, DatasetError, ErrorCode, ModelError};
use log::error;
use std::fmt;

/// Pipeline error code constants
///
/// Wrapped stage errors keep the code of the inner error.
///
/// Error code range: 4001-4005
pub struct PipelineErrorCodes {}

impl PipelineErrorCodes {
    /// A stage is already running
    pub const STAGE_BUSY: i32 = 4001;

    /// Stage invoked from a state that does not permit it
    pub const INVALID_TRANSITION: i32 = 4002;

    /// Orchestrator state lock was poisoned
    pub const STATE_POISONED: i32 = 4003;

    /// Background stage task panicked or was cancelled
    pub const TASK_FAILED: i32 = 4004;

    /// Stage invoked outside a tokio runtime
    pub const RUNTIME_UNAVAILABLE: i32 = 4005;
}

/// Log a pipeline error with structured context
pub fn log_pipeline_error(err: &PipelineError, context: &str) {
    error!(
        "Pipeline error in {}: code={}, component=PipelineOrchestrator, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Errors surfaced by services and the orchestrator
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineError {
    /// Re-entrant invocation while `state` is running
    StageBusy { state: String },

    /// `action` is not permitted from `state`
    InvalidTransition { state: String, action: String },

    /// Orchestrator state mutex poisoned
    StatePoisoned,

    /// Stage task ended abnormally
    TaskFailed { stage: String, reason: String },

    /// `action` needs a tokio runtime and none is entered
    RuntimeUnavailable { action: String },

    Acquisition(AcquisitionError),

    Dataset(DatasetError),

    Model(ModelError),
}

impl ErrorCode for PipelineError {
    fn code(&self) -> i32 {
        match self {
            PipelineError::StageBusy { .. } => PipelineErrorCodes::STAGE_BUSY,
            PipelineError::InvalidTransition { .. } => PipelineErrorCodes::INVALID_TRANSITION,
            PipelineError::StatePoisoned => PipelineErrorCodes::STATE_POISONED,
            PipelineError::TaskFailed { .. } => PipelineErrorCodes::TASK_FAILED,
            PipelineError::RuntimeUnavailable { .. } => PipelineErrorCodes::RUNTIME_UNAVAILABLE,
            PipelineError::Acquisition(err) => err.code(),
            PipelineError::Dataset(err) => err.code(),
            PipelineError::Model(err) => err.code(),
        }
    }

    fn message(&self) -> String {
        match self {
            PipelineError::StageBusy { state } => {
                format!("A stage is already running ({})", state)
            }
            PipelineError::InvalidTransition { state, action } => {
                format!("Cannot {} while pipeline is {}", action, state)
            }
            PipelineError::StatePoisoned => "Pipeline state lock poisoned".to_string(),
            PipelineError::TaskFailed { stage, reason } => {
                format!("{} task ended abnormally: {}", stage, reason)
            }
            PipelineError::RuntimeUnavailable { action } => {
                format!("Cannot {} outside a tokio runtime", action)
            }
            PipelineError::Acquisition(err) => err.message(),
            PipelineError::Dataset(err) => err.message(),
            PipelineError::Model(err) => err.message(),
        }
    }
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::Acquisition(err) => fmt::Display::fmt(err, f),
            PipelineError::Dataset(err) => fmt::Display::fmt(err, f),
            PipelineError::Model(err) => fmt::Display::fmt(err, f),
            _ => write!(f, "PipelineError (code {}): {}", self.code(), self.message()),
        }
    }
}

impl std::error::Error for PipelineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PipelineError::Acquisition(err) => Some(err),
            PipelineError::Dataset(err) => Some(err),
            PipelineError::Model(err) => Some(err),
            _ => None,
        }
    }
}

impl From<AcquisitionError> for PipelineError {
    fn from(err: AcquisitionError) -> Self {
        PipelineError::Acquisition(err)
    }
}

impl From<DatasetError> for PipelineError {
    fn from(err: DatasetError) -> Self {
        PipelineError::Dataset(err)
    }
}

impl From<ModelError> for PipelineError {
    fn from(err: ModelError) -> Self {
        PipelineError::Model(err)
    }
}
