// Pipeline module - stage state machine, event fan-out and the orchestrator

pub mod events;
pub mod orchestrator;
pub mod state;

pub use events::{EventHub, PipelineEvent, PredictionOutput, StageOutcome};
pub use orchestrator::{PipelineOrchestrator, PredictionRequest, StageHandle};
pub use state::{PipelineState, Stage};
