// Acquisition error types and constants

use crate::error::ErrorCode;
use log::error;
use std::fmt;

/// Acquisition error code constants
///
/// Single source of truth for the numeric codes reported to controllers.
///
/// Error code range: 1001-1006
pub struct AcquisitionErrorCodes {}

impl AcquisitionErrorCodes {
    /// Device disconnect, undecodable bytes or other stream-level fault
    pub const STREAM: i32 = 1001;

    /// Malformed or non-numeric record (never fatal)
    pub const PARSE: i32 = 1002;

    /// Serial port could not be opened
    pub const PORT_OPEN_FAILED: i32 = 1003;

    /// Requested acquisition duration is not a positive number of seconds
    pub const INVALID_DURATION: i32 = 1004;

    /// Event channel closed before the run finished
    pub const CHANNEL_CLOSED: i32 = 1005;

    /// Acquisition worker thread could not be spawned or panicked
    pub const WORKER_FAILED: i32 = 1006;
}

/// Log an acquisition error with structured context
///
/// The logging is non-blocking and will not panic on failure.
pub fn log_acquisition_error(err: &AcquisitionError, context: &str) {
    error!(
        "Acquisition error in {}: code={}, component=SignalAcquisitionService, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Acquisition-related errors
///
/// `Parse` is the only per-record kind; it is reported as a log event and the
/// record is skipped. Every other variant ends the run.
///
/// Error code range: 1001-1006
#[derive(Debug, Clone, PartialEq)]
pub enum AcquisitionError {
    /// Stream-level fault, fatal to the run
    Stream { details: String },

    /// Record had the wrong field count or a non-numeric field
    Parse { record: String, reason: String },

    /// Serial port could not be opened
    PortOpenFailed { port: String, reason: String },

    /// Duration must be a positive, finite number of seconds
    InvalidDuration { seconds: f64 },

    /// Consumer dropped the event channel
    ChannelClosed,

    /// Worker thread failure
    WorkerFailed { reason: String },
}

impl ErrorCode for AcquisitionError {
    fn code(&self) -> i32 {
        match self {
            AcquisitionError::Stream { .. } => AcquisitionErrorCodes::STREAM,
            AcquisitionError::Parse { .. } => AcquisitionErrorCodes::PARSE,
            AcquisitionError::PortOpenFailed { .. } => AcquisitionErrorCodes::PORT_OPEN_FAILED,
            AcquisitionError::InvalidDuration { .. } => AcquisitionErrorCodes::INVALID_DURATION,
            AcquisitionError::ChannelClosed => AcquisitionErrorCodes::CHANNEL_CLOSED,
            AcquisitionError::WorkerFailed { .. } => AcquisitionErrorCodes::WORKER_FAILED,
        }
    }

    fn message(&self) -> String {
        match self {
            AcquisitionError::Stream { details } => {
                format!("Serial stream fault: {}", details)
            }
            AcquisitionError::Parse { record, reason } => {
                format!("Skipped malformed record '{}': {}", record, reason)
            }
            AcquisitionError::PortOpenFailed { port, reason } => {
                format!("Failed to open serial port {}: {}", port, reason)
            }
            AcquisitionError::InvalidDuration { seconds } => {
                format!("Acquisition duration must be positive (got {}s)", seconds)
            }
            AcquisitionError::ChannelClosed => "Acquisition event channel closed".to_string(),
            AcquisitionError::WorkerFailed { reason } => {
                format!("Acquisition worker failed: {}", reason)
            }
        }
    }
}

impl fmt::Display for AcquisitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "AcquisitionError::{} (code {}): {}",
            self.variant_name(),
            self.code(),
            self.message()
        )
    }
}

impl AcquisitionError {
    fn variant_name(&self) -> &'static str {
        match self {
            AcquisitionError::Stream { .. } => "Stream",
            AcquisitionError::Parse { .. } => "Parse",
            AcquisitionError::PortOpenFailed { .. } => "PortOpenFailed",
            AcquisitionError::InvalidDuration { .. } => "InvalidDuration",
            AcquisitionError::ChannelClosed => "ChannelClosed",
            AcquisitionError::WorkerFailed { .. } => "WorkerFailed",
        }
    }

    /// Whether the error ends the current run
    pub fn is_fatal(&self) -> bool {
        !matches!(self, AcquisitionError::Parse { .. })
    }
}

impl std::error::Error for AcquisitionError {}

/// Convert from std::io::Error to AcquisitionError
impl From<std::io::Error> for AcquisitionError {
    fn from(err: std::io::Error) -> Self {
        AcquisitionError::Stream {
            details: err.to_string(),
        }
    }
}
