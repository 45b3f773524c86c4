// Error types for the mindtv pipeline
//
// This module defines custom error types for acquisition, dataset, model and
// pipeline operations, providing structured error handling with numeric codes
// suitable for any controller surface (CLI, GUI, service).

mod acquisition;
mod dataset;
mod model;
mod pipeline;

pub use acquisition::{log_acquisition_error, AcquisitionError, AcquisitionErrorCodes};
pub use dataset::{log_dataset_error, DatasetError, DatasetErrorCodes};
pub use model::{log_model_error, ModelError, ModelErrorCodes};
pub use pipeline::{log_pipeline_error, PipelineError, PipelineErrorCodes};

/// Error codes for structured error reporting
///
/// This trait provides a standard way to get error codes and messages
/// from custom error types, enabling consistent error handling across
/// every controller that drives the pipeline.
pub trait ErrorCode {
    /// Get the numeric error code
    fn code(&self) -> i32;

    /// Get the human-readable error message
    fn message(&self) -> String;
}
