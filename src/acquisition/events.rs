//! Event types emitted by an acquisition run.

use serde::{Deserialize, Serialize};

use crate::dataset::Dataset;
use crate::error::AcquisitionError;

/// Category of a log line produced during acquisition.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogKind {
    /// Raw serial line echoed verbatim
    Record,
    /// Malformed record skipped
    ParseError,
    /// Run-level diagnostics (start, stream fault)
    Diagnostic,
}

/// Human-readable log line.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogEvent {
    pub kind: LogKind,
    pub message: String,
}

impl LogEvent {
    pub fn new(kind: LogKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Events of one run, delivered in the order records were read.
///
/// A run ends with exactly one terminal event: `Completed` after the final
/// `SampleCount`, or `Failed` after a diagnostic `Log`.
#[derive(Debug, Clone, PartialEq)]
pub enum AcquisitionEvent {
    Log(LogEvent),
    /// Elapsed share of the duration bound, 0-100
    Progress(u8),
    /// Samples accepted so far in this run
    SampleCount(usize),
    Completed(Dataset),
    Failed(AcquisitionError),
}

impl AcquisitionEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AcquisitionEvent::Completed(_) | AcquisitionEvent::Failed(_)
        )
    }
}
