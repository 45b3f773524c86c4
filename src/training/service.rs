// TrainingService: labeled CSVs in, persisted Model out
//
// Every input file is loaded and validated before anything is fitted, and the
// repository is only written after a successful fit. Any failure therefore
// leaves the current model untouched.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::TrainingConfig;
use crate::dataset::csv_io::read_labeled;
use crate::dataset::Dataset;
use crate::error::{log_dataset_error, log_model_error, DatasetError, PipelineError};
use crate::model::{Classifier, ForestParams, Model, ModelRepository, RandomForest};
use crate::training::split::{partition, train_test_split};

/// Summary of one successful training run
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingReport {
    /// Held-out accuracy in [0, 1]
    pub accuracy: f64,
    pub model_id: String,
    pub label_column: String,
    /// Class labels, sorted
    pub classes: Vec<String>,
    pub train_rows: usize,
    pub test_rows: usize,
    /// Files that contributed rows, in input order
    pub files: Vec<PathBuf>,
}

/// Report plus the fitted model it describes
#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub report: TrainingReport,
    pub model: Model,
}

/// Validates, merges and fits labeled datasets
pub struct TrainingService {
    config: TrainingConfig,
    repository: Arc<dyn ModelRepository>,
}

impl TrainingService {
    pub fn new(config: TrainingConfig, repository: Arc<dyn ModelRepository>) -> Self {
        Self { config, repository }
    }

    /// Train on `paths` and make the result the current model
    ///
    /// # Arguments
    /// * `paths` - Labeled CSV files; empty entries are skipped
    /// * `label_column` - Name of the label column (e.g. `Content`, `Emotion`)
    ///
    /// # Returns
    /// * `Ok(TrainingOutcome)` - Accuracy report and the persisted model
    /// * `Err(PipelineError)` - Nothing was fitted or persisted
    ///
    /// # Errors
    /// - `DatasetError::EmptyInput` - no usable path, or fewer than two rows
    /// - `DatasetError::Schema` - a file lacks a feature or label column
    /// - `DatasetError::Conversion` - a feature cell is not numeric
    /// - `ModelError` - fit or persistence failure
    pub fn train<I, P>(&self, paths: I, label_column: &str) -> Result<TrainingOutcome, PipelineError>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let files: Vec<PathBuf> = paths
            .into_iter()
            .map(|p| p.as_ref().to_path_buf())
            .filter(|p| !p.as_os_str().is_empty())
            .collect();

        let merged = self.load_all(&files, label_column).inspect_err(|err| {
            log_dataset_error(err, "train");
        })?;

        let split = train_test_split(merged.len(), self.config.test_ratio, self.config.seed)
            .inspect_err(|err| log_dataset_error(err, "train"))?;
        let (train, test) = partition(&merged, &split);

        let train_labels = train.labels().unwrap_or_default();
        let test_labels = test.labels().unwrap_or_default();

        let params = ForestParams::from(&self.config);
        let forest = RandomForest::fit(&train.features(), &train_labels, &params)
            .inspect_err(|err| log_model_error(err, "train"))?;

        let predicted = forest.predict(&test.features());
        let accuracy = accuracy(&predicted, &test_labels);

        let model = Model::new(forest, label_column, accuracy);
        self.repository.save(&model)?;

        log::info!(
            "[TrainingService] Trained {} on {} rows from {} files: accuracy {:.3}",
            model.id(),
            merged.len(),
            files.len(),
            accuracy
        );

        let mut classes = model.classes().to_vec();
        classes.sort();

        let report = TrainingReport {
            accuracy,
            model_id: model.id().to_string(),
            label_column: label_column.to_string(),
            classes,
            train_rows: train.len(),
            test_rows: test.len(),
            files,
        };
        Ok(TrainingOutcome { report, model })
    }

    /// Load every file in order; the first bad file fails the whole call
    fn load_all(&self, files: &[PathBuf], label_column: &str) -> Result<Dataset, DatasetError> {
        if files.is_empty() {
            return Err(DatasetError::EmptyInput {
                reason: "no dataset files selected".to_string(),
            });
        }

        let mut merged = Dataset::new();
        for path in files {
            merged.append(read_labeled(path, label_column)?);
        }
        Ok(merged)
    }
}

/// Share of positions where `predicted` matches `expected`
pub fn accuracy(predicted: &[String], expected: &[String]) -> f64 {
    if expected.is_empty() {
        return 0.0;
    }
    let correct = predicted
        .iter()
        .zip(expected)
        .filter(|(p, e)| p == e)
        .count();
    correct as f64 / expected.len() as f64
}

#[cfg(test)]
#[path = "service_tests.rs"]
mod tests;
