//! CSV import/export for signal datasets.
//!
//! Layout: header row `beatsPerMinute,beatAvg,GSR[,<label column>]`, one
//! sample per line, unquoted numeric fields. Column lookup is by name, so
//! extra columns in archived files are tolerated (and preserved when a file
//! is annotated).

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use csv::{ReaderBuilder, StringRecord, Trim, Writer};

use super::sample::{Dataset, Sample, FEATURE_COLUMNS, FEATURE_COUNT};
use crate::error::DatasetError;

/// Prediction input: the raw rows of a CSV plus their parsed features.
///
/// The raw header and records are kept so the annotated output reproduces
/// the input schema exactly.
#[derive(Debug, Clone)]
pub struct FeatureTable {
    pub headers: StringRecord,
    pub records: Vec<StringRecord>,
    pub dataset: Dataset,
}

/// Load a labeled CSV, requiring the three feature columns and `label_column`.
pub fn read_labeled(path: &Path, label_column: &str) -> Result<Dataset, DatasetError> {
    let mut reader = open_reader(path)?;
    let headers = reader
        .headers()
        .map_err(|err| DatasetError::io(path, err))?
        .clone();

    let positions = feature_positions(&headers, path)?;
    let label_idx = column_position(&headers, label_column, path)?;

    let mut dataset = Dataset::new();
    for (idx, record) in reader.records().enumerate() {
        let row = idx + 1;
        let record = record.map_err(|err| record_error(err, &headers, path, row))?;
        let sample = parse_sample(&record, &positions, path, row)?;
        let label = record.get(label_idx).unwrap_or_default();
        dataset.push(sample.with_label(label));
    }

    log::debug!(
        "[CsvIo] Loaded {} labeled rows from {}",
        dataset.len(),
        path.display()
    );
    Ok(dataset)
}

/// Load a CSV for prediction, requiring only the three feature columns.
pub fn read_feature_table(path: &Path) -> Result<FeatureTable, DatasetError> {
    let mut reader = open_reader(path)?;
    let headers = reader
        .headers()
        .map_err(|err| DatasetError::io(path, err))?
        .clone();

    let positions = feature_positions(&headers, path)?;

    let mut records = Vec::new();
    let mut dataset = Dataset::new();
    for (idx, record) in reader.records().enumerate() {
        let record = record.map_err(|err| record_error(err, &headers, path, idx + 1))?;
        dataset.push(parse_sample(&record, &positions, path, idx + 1)?);
        records.push(record);
    }

    Ok(FeatureTable {
        headers,
        records,
        dataset,
    })
}

/// Write `dataset` as CSV, optionally appending a constant label column.
///
/// `label` is `(column name, value)`.
pub fn write_dataset<W: Write>(
    writer: W,
    dataset: &Dataset,
    label: Option<(&str, &str)>,
) -> Result<(), csv::Error> {
    let mut writer = Writer::from_writer(writer);

    let mut header: Vec<&str> = FEATURE_COLUMNS.to_vec();
    if let Some((column, _)) = label {
        header.push(column);
    }
    writer.write_record(&header)?;

    for sample in dataset {
        let mut row: Vec<String> = sample.features().iter().map(f64::to_string).collect();
        if let Some((_, value)) = label {
            row.push(value.to_string());
        }
        writer.write_record(&row)?;
    }

    writer.flush()?;
    Ok(())
}

/// Write the input table with one predicted label appended per row.
pub fn write_annotated<W: Write>(
    writer: W,
    table: &FeatureTable,
    output_column: &str,
    predictions: &[String],
) -> Result<(), csv::Error> {
    let mut writer = Writer::from_writer(writer);

    let mut header = table.headers.clone();
    header.push_field(output_column);
    writer.write_record(&header)?;

    for (record, label) in table.records.iter().zip(predictions) {
        let mut row = record.clone();
        row.push_field(label);
        writer.write_record(&row)?;
    }

    writer.flush()?;
    Ok(())
}

/// Create `<dir>/<stem>.<ext>`, or `<stem>(1).<ext>`, `<stem>(2).<ext>`...
/// when the name is taken. Never truncates an existing file.
pub fn create_unique(dir: &Path, stem: &str, extension: &str) -> io::Result<(PathBuf, File)> {
    let mut counter: u32 = 0;
    loop {
        let name = if counter == 0 {
            format!("{stem}.{extension}")
        } else {
            format!("{stem}({counter}).{extension}")
        };
        let candidate = dir.join(name);

        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&candidate)
        {
            Ok(file) => return Ok((candidate, file)),
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => counter += 1,
            Err(err) => return Err(err),
        }
    }
}

/// Run `write` on a file from [`create_unique`], deleting it on failure
///
/// A partial file would otherwise keep its name and push the next export
/// to the following counter.
pub fn write_or_discard<F>(path: &Path, file: File, write: F) -> Result<(), DatasetError>
where
    F: FnOnce(File) -> Result<(), csv::Error>,
{
    write(file).map_err(|err| {
        if let Err(remove_err) = fs::remove_file(path) {
            log::warn!(
                "[CsvIo] Cannot remove partial file {}: {}",
                path.display(),
                remove_err
            );
        }
        DatasetError::io(path, err)
    })
}

/// [`create_unique`] for a caller-chosen path
pub fn create_unique_at(path: &Path) -> io::Result<(PathBuf, File)> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("output");
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("csv");
    create_unique(dir, stem, extension)
}

fn open_reader(path: &Path) -> Result<csv::Reader<File>, DatasetError> {
    ReaderBuilder::new()
        .trim(Trim::All)
        .from_path(path)
        .map_err(|err| DatasetError::io(path, err))
}

/// Ragged rows are a conversion failure at the first missing or extra
/// column; anything else is I/O
fn record_error(err: csv::Error, headers: &StringRecord, path: &Path, row: usize) -> DatasetError {
    if let csv::ErrorKind::UnequalLengths {
        expected_len, len, ..
    } = err.kind()
    {
        let (expected_len, len) = (*expected_len, *len);
        let column = match headers.get(usize::try_from(len).unwrap_or(usize::MAX)) {
            Some(name) if len < expected_len => name.to_string(),
            _ => format!("field {}", expected_len + 1),
        };
        return DatasetError::Conversion {
            path: path.display().to_string(),
            row,
            column,
            value: format!("<{} of {} fields>", len, expected_len),
        };
    }
    DatasetError::io(path, err)
}

fn column_position(headers: &StringRecord, column: &str, path: &Path) -> Result<usize, DatasetError> {
    headers
        .iter()
        .position(|h| h.trim_start_matches('\u{feff}') == column)
        .ok_or_else(|| DatasetError::Schema {
            path: path.display().to_string(),
            column: column.to_string(),
        })
}

fn feature_positions(headers: &StringRecord, path: &Path) -> Result<[usize; FEATURE_COUNT], DatasetError> {
    let mut positions = [0usize; FEATURE_COUNT];
    for (slot, column) in positions.iter_mut().zip(FEATURE_COLUMNS) {
        *slot = column_position(headers, column, path)?;
    }
    Ok(positions)
}

fn parse_sample(
    record: &StringRecord,
    positions: &[usize; FEATURE_COUNT],
    path: &Path,
    row: usize,
) -> Result<Sample, DatasetError> {
    let mut values = [0.0f64; FEATURE_COUNT];
    for ((value, &idx), column) in values.iter_mut().zip(positions).zip(FEATURE_COLUMNS) {
        let cell = record.get(idx).unwrap_or_default();
        *value = cell
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| DatasetError::Conversion {
                path: path.display().to_string(),
                row,
                column: column.to_string(),
                value: cell.to_string(),
            })?;
    }

    Sample::from_features(values).map_err(|err| DatasetError::Conversion {
        path: path.display().to_string(),
        row,
        column: err.column.to_string(),
        value: err.value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_file(dir: &TempDir, name: &str, contents: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_read_labeled_happy_path() {
        let dir = TempDir::new().unwrap();
        let path = write_file(
            &dir,
            "a.csv",
            "beatsPerMinute,beatAvg,GSR,Content\n72,70,450,Filme de terror\n74,71,455,Filme de terror\n",
        );

        let dataset = read_labeled(&path, "Content").unwrap();
        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.features()[1], [74.0, 71.0, 455.0]);
        assert_eq!(dataset.samples()[0].label(), Some("Filme de terror"));
    }

    #[test]
    fn test_read_labeled_accepts_reordered_columns() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "a.csv", "Emotion,GSR,beatAvg,beatsPerMinute\ncalm,450,70,72\n");

        let dataset = read_labeled(&path, "Emotion").unwrap();
        assert_eq!(dataset.features()[0], [72.0, 70.0, 450.0]);
    }

    #[test]
    fn test_missing_label_column_is_schema_error() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "nolabel.csv", "beatsPerMinute,beatAvg,GSR\n72,70,450\n");

        match read_labeled(&path, "Content") {
            Err(DatasetError::Schema { column, .. }) => assert_eq!(column, "Content"),
            other => panic!("Expected Schema error, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_feature_column_is_schema_error() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "nogsr.csv", "beatsPerMinute,beatAvg\n72,70\n");

        match read_feature_table(&path) {
            Err(DatasetError::Schema { column, .. }) => assert_eq!(column, "GSR"),
            other => panic!("Expected Schema error, got {:?}", other),
        }
    }

    #[test]
    fn test_non_numeric_cell_is_conversion_error() {
        let dir = TempDir::new().unwrap();
        let path = write_file(
            &dir,
            "bad.csv",
            "beatsPerMinute,beatAvg,GSR,Content\n72,70,450,A\n74,abc,455,A\n",
        );

        match read_labeled(&path, "Content") {
            Err(DatasetError::Conversion {
                row, column, value, ..
            }) => {
                assert_eq!(row, 2);
                assert_eq!(column, "beatAvg");
                assert_eq!(value, "abc");
            }
            other => panic!("Expected Conversion error, got {:?}", other),
        }
    }

    #[test]
    fn test_nan_cell_is_conversion_error() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "nan.csv", "beatsPerMinute,beatAvg,GSR\nNaN,70,450\n");

        assert!(matches!(
            read_feature_table(&path),
            Err(DatasetError::Conversion { .. })
        ));
    }

    #[test]
    fn test_short_row_is_conversion_error() {
        let dir = TempDir::new().unwrap();
        let path = write_file(
            &dir,
            "ragged.csv",
            "beatsPerMinute,beatAvg,GSR,Content\n72,70,450,A\n74,71,455\n",
        );

        match read_labeled(&path, "Content") {
            Err(DatasetError::Conversion {
                row, column, value, ..
            }) => {
                assert_eq!(row, 2);
                assert_eq!(column, "Content");
                assert_eq!(value, "<3 of 4 fields>");
            }
            other => panic!("Expected Conversion error, got {:?}", other),
        }
    }

    #[test]
    fn test_long_row_is_conversion_error() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "wide.csv", "beatsPerMinute,beatAvg,GSR\n72,70,450,9\n");

        match read_feature_table(&path) {
            Err(DatasetError::Conversion { row, column, .. }) => {
                assert_eq!(row, 1);
                assert_eq!(column, "field 4");
            }
            other => panic!("Expected Conversion error, got {:?}", other),
        }
    }

    #[test]
    fn test_write_dataset_with_label() {
        let dataset: Dataset = vec![
            Sample::new(72.0, 70.0, 450.0).unwrap(),
            Sample::new(73.0, 70.5, 460.0).unwrap(),
        ]
        .into_iter()
        .collect();

        let mut buffer = Vec::new();
        write_dataset(&mut buffer, &dataset, Some(("Content", "Serie de drama"))).unwrap();
        let text = String::from_utf8(buffer).unwrap();

        assert_eq!(
            text,
            "beatsPerMinute,beatAvg,GSR,Content\n72,70,450,Serie de drama\n73,70.5,460,Serie de drama\n"
        );
    }

    #[test]
    fn test_write_annotated_preserves_extra_columns() {
        let dir = TempDir::new().unwrap();
        let path = write_file(
            &dir,
            "in.csv",
            "session,beatsPerMinute,beatAvg,GSR\ns1,72,70,450\ns1,74,71,455\n",
        );
        let table = read_feature_table(&path).unwrap();

        let mut buffer = Vec::new();
        write_annotated(
            &mut buffer,
            &table,
            "Prediction",
            &["A".to_string(), "B".to_string()],
        )
        .unwrap();

        assert_eq!(
            String::from_utf8(buffer).unwrap(),
            "session,beatsPerMinute,beatAvg,GSR,Prediction\ns1,72,70,450,A\ns1,74,71,455,B\n"
        );
    }

    #[test]
    fn test_create_unique_never_overwrites() {
        let dir = TempDir::new().unwrap();
        let (first, _) = create_unique(dir.path(), "collected_data", "csv").unwrap();
        let (second, _) = create_unique(dir.path(), "collected_data", "csv").unwrap();
        let (third, _) = create_unique(dir.path(), "collected_data", "csv").unwrap();

        assert_eq!(first.file_name().unwrap(), "collected_data.csv");
        assert_eq!(second.file_name().unwrap(), "collected_data(1).csv");
        assert_eq!(third.file_name().unwrap(), "collected_data(2).csv");
    }

    #[test]
    fn test_failed_write_releases_the_name() {
        let dir = TempDir::new().unwrap();
        let (path, file) = create_unique(dir.path(), "collected_data", "csv").unwrap();

        let result = write_or_discard(&path, file, |_| {
            Err(csv::Error::from(io::Error::new(io::ErrorKind::Other, "disk full")))
        });

        assert!(matches!(result, Err(DatasetError::Io { .. })));
        assert!(!path.exists());
        let (next, _) = create_unique(dir.path(), "collected_data", "csv").unwrap();
        assert_eq!(next.file_name().unwrap(), "collected_data.csv");
    }
}
