// MindTV Core - physiological signal pipeline
// Serial acquisition, labeled datasets, random forest training and
// content-type prediction behind one stage orchestrator

// Module declarations
pub mod acquisition;
pub mod config;
pub mod dataset;
pub mod error;
pub mod model;
pub mod pipeline;
pub mod prediction;
pub mod training;

// Re-exports for convenience
pub use config::AppConfig;
pub use error::{ErrorCode, PipelineError};
pub use pipeline::{PipelineEvent, PipelineOrchestrator, PipelineState, PredictionRequest, Stage};

use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber
///
/// `log` records from every module are bridged into it. The filter comes
/// from `RUST_LOG` and defaults to `info`. Calling this more than once is
/// harmless.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
