// Wire record parsing for the wearable sensor
//
// The firmware prints one comma-separated record per line. Two layouts are
// in the field:
//   bpm,beatAvg,GSR        (3 fields)
//   ir,bpm,beatAvg,GSR     (4 fields, raw IR value discarded)
// Every field must parse as a finite float; otherwise the record is rejected
// with a non-fatal Parse error.

use crate::dataset::Sample;
use crate::error::AcquisitionError;

/// Accepted record layouts, keyed by field count
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireFormat {
    /// `bpm,beatAvg,GSR`
    Triple,
    /// `ir,bpm,beatAvg,GSR`
    WithIr,
}

impl WireFormat {
    /// Layout for a given field count, if any
    pub fn from_field_count(count: usize) -> Option<Self> {
        match count {
            3 => Some(WireFormat::Triple),
            4 => Some(WireFormat::WithIr),
            _ => None,
        }
    }

    pub fn field_count(&self) -> usize {
        match self {
            WireFormat::Triple => 3,
            WireFormat::WithIr => 4,
        }
    }

    /// Index of the first feature field
    fn feature_offset(&self) -> usize {
        self.field_count() - 3
    }
}

/// Parse one raw line into a Sample
///
/// # Errors
/// `AcquisitionError::Parse` for a wrong field count, a non-numeric field, or
/// a non-finite value. The raw line is carried verbatim in the error.
pub fn parse_record(line: &str) -> Result<Sample, AcquisitionError> {
    let record = line.trim();
    let fields: Vec<&str> = record.split(',').map(str::trim).collect();

    let format = WireFormat::from_field_count(fields.len()).ok_or_else(|| {
        AcquisitionError::Parse {
            record: record.to_string(),
            reason: format!("expected 3 or 4 fields, got {}", fields.len()),
        }
    })?;

    let mut values = Vec::with_capacity(fields.len());
    for (idx, field) in fields.iter().enumerate() {
        let value = field
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| AcquisitionError::Parse {
                record: record.to_string(),
                reason: format!("field {} ('{}') is not a number", idx + 1, field),
            })?;
        values.push(value);
    }

    let offset = format.feature_offset();
    Sample::new(values[offset], values[offset + 1], values[offset + 2]).map_err(|err| {
        AcquisitionError::Parse {
            record: record.to_string(),
            reason: err.to_string(),
        }
    })
}
