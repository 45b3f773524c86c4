// Pipeline events and their lossless fan-out
//
// Every subscriber gets its own unbounded FIFO, so a slow consumer never
// drops events and all subscribers observe the same order.

use std::sync::Mutex;

use tokio::sync::mpsc;

use crate::acquisition::LogEvent;
use crate::error::PipelineError;
use crate::pipeline::state::{PipelineState, Stage};
use crate::prediction::{AnnotationReport, PredictionResult};
use crate::training::TrainingReport;

/// Result of a prediction stage
#[derive(Debug, Clone, PartialEq)]
pub enum PredictionOutput {
    Result(PredictionResult),
    Annotation(AnnotationReport),
}

/// Result of a successful stage
#[derive(Debug, Clone, PartialEq)]
pub enum StageOutcome {
    Collected {
        /// Rows gained by this run
        rows_added: usize,
        /// Rows held by the store afterwards
        total_rows: usize,
    },
    Trained(TrainingReport),
    Predicted(PredictionOutput),
}

impl StageOutcome {
    /// Human-readable one-line summary
    pub fn summary(&self) -> String {
        match self {
            StageOutcome::Collected {
                rows_added,
                total_rows,
            } => format!("Collected {} rows ({} accumulated)", rows_added, total_rows),
            StageOutcome::Trained(report) => format!(
                "Model {} trained with accuracy {:.2}",
                report.model_id, report.accuracy
            ),
            StageOutcome::Predicted(PredictionOutput::Result(result)) => result.summary(),
            StageOutcome::Predicted(PredictionOutput::Annotation(report)) => format!(
                "Annotated {} rows into {}",
                report.rows,
                report.path.display()
            ),
        }
    }
}

/// Events observed by pipeline subscribers
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    Log(LogEvent),
    Progress(u8),
    SampleCount(usize),
    StateChanged {
        from: PipelineState,
        to: PipelineState,
    },
    StageCompleted {
        stage: Stage,
        outcome: StageOutcome,
    },
    StageFailed {
        stage: Stage,
        error: PipelineError,
    },
}

/// Fan-out of pipeline events to any number of unbounded subscribers
#[derive(Default)]
pub struct EventHub {
    subscribers: Mutex<Vec<mpsc::UnboundedSender<PipelineEvent>>>,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<PipelineEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        match self.subscribers.lock() {
            Ok(mut subscribers) => subscribers.push(tx),
            Err(poisoned) => poisoned.into_inner().push(tx),
        }
        rx
    }

    /// Deliver `event` to every live subscriber, pruning closed ones
    pub fn publish(&self, event: PipelineEvent) {
        let mut subscribers = match self.subscribers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().map(|s| s.len()).unwrap_or(0)
    }
}
