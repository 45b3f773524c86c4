// Dataset error types and constants

use crate::error::ErrorCode;
use log::error;
use std::fmt;

/// Dataset error code constants
///
/// Error code range: 2001-2006
pub struct DatasetErrorCodes {}

impl DatasetErrorCodes {
    /// Export requested with zero accumulated rows
    pub const EMPTY_DATASET: i32 = 2001;

    /// No usable input files or rows
    pub const EMPTY_INPUT: i32 = 2002;

    /// Required column missing from a CSV header
    pub const SCHEMA: i32 = 2003;

    /// Non-numeric cell where a number was expected
    pub const CONVERSION: i32 = 2004;

    /// Filesystem failure while reading or writing a CSV
    pub const IO: i32 = 2005;

    /// Store lock was poisoned
    pub const STORE_POISONED: i32 = 2006;
}

/// Log a dataset error with structured context
pub fn log_dataset_error(err: &DatasetError, context: &str) {
    error!(
        "Dataset error in {}: code={}, component=DatasetStore, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Dataset, CSV and schema errors
///
/// Error code range: 2001-2006
#[derive(Debug, Clone, PartialEq)]
pub enum DatasetError {
    /// Nothing has been accumulated yet
    EmptyDataset,

    /// No usable files or rows for the stage
    EmptyInput { reason: String },

    /// `path` is missing the required `column`
    Schema { path: String, column: String },

    /// Cell at (`row`, `column`) of `path` is not a finite number
    Conversion {
        path: String,
        row: usize,
        column: String,
        value: String,
    },

    /// Filesystem or CSV framing failure
    Io { path: String, details: String },

    /// Store mutex poisoned
    StorePoisoned,
}

impl ErrorCode for DatasetError {
    fn code(&self) -> i32 {
        match self {
            DatasetError::EmptyDataset => DatasetErrorCodes::EMPTY_DATASET,
            DatasetError::EmptyInput { .. } => DatasetErrorCodes::EMPTY_INPUT,
            DatasetError::Schema { .. } => DatasetErrorCodes::SCHEMA,
            DatasetError::Conversion { .. } => DatasetErrorCodes::CONVERSION,
            DatasetError::Io { .. } => DatasetErrorCodes::IO,
            DatasetError::StorePoisoned => DatasetErrorCodes::STORE_POISONED,
        }
    }

    fn message(&self) -> String {
        match self {
            DatasetError::EmptyDataset => "No samples accumulated; nothing to export".to_string(),
            DatasetError::EmptyInput { reason } => format!("No usable input: {}", reason),
            DatasetError::Schema { path, column } => {
                format!("File {} does not contain the '{}' column", path, column)
            }
            DatasetError::Conversion {
                path,
                row,
                column,
                value,
            } => {
                format!(
                    "File {} row {}: column '{}' value '{}' is not a number",
                    path, row, column, value
                )
            }
            DatasetError::Io { path, details } => format!("I/O error on {}: {}", path, details),
            DatasetError::StorePoisoned => "Dataset store lock poisoned".to_string(),
        }
    }
}

impl fmt::Display for DatasetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DatasetError (code {}): {}", self.code(), self.message())
    }
}

impl std::error::Error for DatasetError {}

impl DatasetError {
    /// Wrap an I/O failure with the path it happened on
    pub fn io(path: impl AsRef<std::path::Path>, err: impl fmt::Display) -> Self {
        DatasetError::Io {
            path: path.as_ref().display().to_string(),
            details: err.to_string(),
        }
    }
}

/// Convert from csv::Error to DatasetError
///
/// Callers that know the file path should prefer [`DatasetError::io`].
impl From<csv::Error> for DatasetError {
    fn from(err: csv::Error) -> Self {
        DatasetError::Io {
            path: "<csv>".to_string(),
            details: err.to_string(),
        }
    }
}
