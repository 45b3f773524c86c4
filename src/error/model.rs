// Model error types and constants

use crate::error::ErrorCode;
use log::error;
use std::fmt;

/// Model error code constants
///
/// Error code range: 3001-3005
pub struct ModelErrorCodes {}

impl ModelErrorCodes {
    /// No current model in the repository
    pub const NOT_FOUND: i32 = 3001;

    /// Classifier could not be fitted
    pub const FIT_FAILED: i32 = 3002;

    /// Model artifact could not be written or read back
    pub const PERSISTENCE: i32 = 3003;

    /// Feature vectors have the wrong dimension
    pub const DIMENSION_MISMATCH: i32 = 3004;

    /// Repository lock was poisoned
    pub const LOCK_POISONED: i32 = 3005;
}

/// Log a model error with structured context
pub fn log_model_error(err: &ModelError, context: &str) {
    error!(
        "Model error in {}: code={}, component=ModelRepository, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Classifier and model repository errors
///
/// Error code range: 3001-3005
#[derive(Debug, Clone, PartialEq)]
pub enum ModelError {
    /// No model has been persisted yet
    NotFound { location: String },

    /// Fitting failed (empty partition, label count mismatch)
    FitFailed { reason: String },

    /// Serialization or filesystem failure on the artifact
    Persistence { details: String },

    /// Input dimension differs from what the model was trained on
    DimensionMismatch { expected: usize, got: usize },

    /// Repository RwLock poisoned
    LockPoisoned,
}

impl ErrorCode for ModelError {
    fn code(&self) -> i32 {
        match self {
            ModelError::NotFound { .. } => ModelErrorCodes::NOT_FOUND,
            ModelError::FitFailed { .. } => ModelErrorCodes::FIT_FAILED,
            ModelError::Persistence { .. } => ModelErrorCodes::PERSISTENCE,
            ModelError::DimensionMismatch { .. } => ModelErrorCodes::DIMENSION_MISMATCH,
            ModelError::LockPoisoned => ModelErrorCodes::LOCK_POISONED,
        }
    }

    fn message(&self) -> String {
        match self {
            ModelError::NotFound { location } => {
                format!("No trained model found in {}", location)
            }
            ModelError::FitFailed { reason } => format!("Model fit failed: {}", reason),
            ModelError::Persistence { details } => {
                format!("Model persistence failed: {}", details)
            }
            ModelError::DimensionMismatch { expected, got } => {
                format!("Expected {} features per row, got {}", expected, got)
            }
            ModelError::LockPoisoned => "Model repository lock poisoned".to_string(),
        }
    }
}

impl fmt::Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ModelError (code {}): {}", self.code(), self.message())
    }
}

impl std::error::Error for ModelError {}

impl From<std::io::Error> for ModelError {
    fn from(err: std::io::Error) -> Self {
        ModelError::Persistence {
            details: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for ModelError {
    fn from(err: serde_json::Error) -> Self {
        ModelError::Persistence {
            details: err.to_string(),
        }
    }
}
