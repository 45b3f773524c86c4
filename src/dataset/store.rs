// DatasetStore: in-memory accumulation of acquisition runs
//
// Single Responsibility: hold every sample collected so far and export it
// to collision-safe CSV files. Rows are only ever appended; `clear` is an
// explicit operator action.

use std::path::PathBuf;

use crate::config::DatasetConfig;
use crate::dataset::csv_io::{create_unique, write_dataset, write_or_discard};
use crate::dataset::sample::Dataset;
use crate::error::{log_dataset_error, DatasetError};

/// Accumulates Samples across repeated acquisitions
///
/// # Example
/// ```ignore
/// let mut store = DatasetStore::new(config.dataset.clone());
/// store.accumulate(first_run);
/// store.accumulate(second_run);
/// let path = store.export("Filme de comedia")?;
/// ```
#[derive(Debug, Clone)]
pub struct DatasetStore {
    rows: Dataset,
    config: DatasetConfig,
}

impl DatasetStore {
    pub fn new(config: DatasetConfig) -> Self {
        Self {
            rows: Dataset::new(),
            config,
        }
    }

    /// Append all rows of `dataset`
    ///
    /// # Returns
    /// Total number of rows held after the append
    pub fn accumulate(&mut self, dataset: Dataset) -> usize {
        let added = dataset.len();
        self.rows.append(dataset);
        log::info!(
            "[DatasetStore] Accumulated {} rows ({} total)",
            added,
            self.rows.len()
        );
        self.rows.len()
    }

    /// Export accumulated rows plus a constant label column
    ///
    /// # Arguments
    /// * `label` - Content category written to every row
    ///
    /// # Returns
    /// * `Ok(PathBuf)` - Path of the newly created file
    /// * `Err(DatasetError::EmptyDataset)` - Nothing accumulated yet
    ///
    /// # Notes
    /// - The file is named `<base_filename>.csv`; if taken, `(1)`, `(2)`...
    ///   is inserted before the extension
    /// - Existing files are never overwritten
    pub fn export(&self, label: &str) -> Result<PathBuf, DatasetError> {
        self.export_with(Some((self.config.label_column.as_str(), label)))
    }

    /// Export accumulated rows without a label column (prediction input)
    pub fn export_unlabeled(&self) -> Result<PathBuf, DatasetError> {
        self.export_with(None)
    }

    fn export_with(&self, label: Option<(&str, &str)>) -> Result<PathBuf, DatasetError> {
        if self.rows.is_empty() {
            let err = DatasetError::EmptyDataset;
            log_dataset_error(&err, "export");
            return Err(err);
        }

        let dir = &self.config.export_dir;
        let (path, file) = create_unique(dir, &self.config.base_filename, "csv")
            .map_err(|err| DatasetError::io(dir, err))?;

        write_or_discard(&path, file, |file| write_dataset(file, &self.rows, label))?;

        log::info!(
            "[DatasetStore] Exported {} rows to {}",
            self.rows.len(),
            path.display()
        );
        Ok(path)
    }

    /// Drop every accumulated row
    pub fn clear(&mut self) {
        self.rows = Dataset::new();
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Copy of the accumulated rows
    pub fn snapshot(&self) -> Dataset {
        self.rows.clone()
    }

    pub fn label_column(&self) -> &str {
        &self.config.label_column
    }
}
