// PredictionService: apply the current model to feature rows
//
// Two policies are offered over the same per-row predictions:
// - MajorityVote: one label for the whole window (the most frequent one)
// - Annotate: one label per row, used to write an annotated CSV

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::PredictionConfig;
use crate::dataset::csv_io::{
    create_unique_at, read_feature_table, write_annotated, write_or_discard,
};
use crate::dataset::{Dataset, Sample};
use crate::error::{log_dataset_error, log_pipeline_error, DatasetError, PipelineError};
use crate::model::{majority_vote, Model, ModelRepository};

/// How per-row predictions are returned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictionMode {
    MajorityVote,
    Annotate,
}

/// Outcome of a prediction
#[derive(Debug, Clone, PartialEq)]
pub enum PredictionResult {
    /// Most frequent label plus per-label counts in order of first prediction
    MajorityVote {
        label: String,
        counts: Vec<(String, usize)>,
    },
    /// One predicted label per input row
    Annotated(Vec<(Sample, String)>),
}

impl PredictionResult {
    /// Human-readable one-line summary
    pub fn summary(&self) -> String {
        match self {
            PredictionResult::MajorityVote { label, counts } => {
                let total: usize = counts.iter().map(|(_, n)| n).sum();
                let votes = counts
                    .iter()
                    .find(|(l, _)| l == label)
                    .map_or(0, |(_, n)| *n);
                format!(
                    "Predicted content type: {} ({}/{} rows)",
                    label, votes, total
                )
            }
            PredictionResult::Annotated(rows) => format!("Annotated {} rows", rows.len()),
        }
    }
}

/// Where an annotated file was written
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotationReport {
    pub path: PathBuf,
    pub rows: usize,
    /// Majority label over the annotated rows
    pub label: String,
}

/// Apply `model` to `rows` under `mode`
///
/// # Errors
/// `DatasetError::EmptyInput` for an empty window
pub fn apply_model(
    model: &Model,
    rows: &Dataset,
    mode: PredictionMode,
) -> Result<PredictionResult, DatasetError> {
    if rows.is_empty() {
        return Err(DatasetError::EmptyInput {
            reason: "prediction window has no rows".to_string(),
        });
    }

    let predictions = model.predict(&rows.features());

    match mode {
        PredictionMode::MajorityVote => {
            let tally = majority_vote(predictions).ok_or_else(|| DatasetError::EmptyInput {
                reason: "model returned no predictions".to_string(),
            })?;
            Ok(PredictionResult::MajorityVote {
                label: tally.winner().clone(),
                counts: tally.into_counts(),
            })
        }
        PredictionMode::Annotate => Ok(PredictionResult::Annotated(
            rows.iter().cloned().zip(predictions).collect(),
        )),
    }
}

/// Loads the current model and applies it to rows or files
pub struct PredictionService {
    config: PredictionConfig,
    repository: Arc<dyn ModelRepository>,
}

impl PredictionService {
    pub fn new(config: PredictionConfig, repository: Arc<dyn ModelRepository>) -> Self {
        Self { config, repository }
    }

    fn current_model(&self) -> Result<Model, PipelineError> {
        self.repository
            .load_current()
            .map_err(PipelineError::from)
            .inspect_err(|err| log_pipeline_error(err, "load_model"))
    }

    /// Predict over in-memory rows
    ///
    /// # Errors
    /// - `ModelError::NotFound` - no persisted model
    /// - `DatasetError::EmptyInput` - empty window
    pub fn predict(&self, rows: &Dataset, mode: PredictionMode) -> Result<PredictionResult, PipelineError> {
        let model = self.current_model()?;
        let result = apply_model(&model, rows, mode).inspect_err(|err| {
            log_dataset_error(err, "predict");
        })?;

        log::info!("[PredictionService] {} using {}", result.summary(), model.id());
        Ok(result)
    }

    /// Predict over the rows of a CSV file
    ///
    /// # Errors
    /// Adds `DatasetError::Schema` / `Conversion` for malformed files
    pub fn predict_file(&self, path: &Path, mode: PredictionMode) -> Result<PredictionResult, PipelineError> {
        let model = self.current_model()?;
        let table = read_feature_table(path).inspect_err(|err| {
            log_dataset_error(err, "predict_file");
        })?;

        let result = apply_model(&model, &table.dataset, mode).inspect_err(|err| {
            log_dataset_error(err, "predict_file");
        })?;

        log::info!(
            "[PredictionService] {} from {}",
            result.summary(),
            path.display()
        );
        Ok(result)
    }

    /// Write `input` plus an appended predicted-label column
    ///
    /// Every input column is preserved. If `output` exists a counter is
    /// inserted before the extension instead of overwriting it.
    pub fn annotate_file(&self, input: &Path, output: &Path) -> Result<AnnotationReport, PipelineError> {
        let model = self.current_model()?;
        let table = read_feature_table(input).inspect_err(|err| {
            log_dataset_error(err, "annotate_file");
        })?;

        if table.dataset.is_empty() {
            let err = DatasetError::EmptyInput {
                reason: format!("{} has no rows", input.display()),
            };
            log_dataset_error(&err, "annotate_file");
            return Err(err.into());
        }

        let predictions = model.predict(&table.dataset.features());
        let label = majority_vote(predictions.iter())
            .map(|tally| tally.winner().to_string())
            .unwrap_or_default();

        let (path, file) = create_unique_at(output).map_err(|err| DatasetError::io(output, err))?;
        write_or_discard(&path, file, |file| {
            write_annotated(file, &table, &self.config.output_column, &predictions)
        })?;

        log::info!(
            "[PredictionService] Annotated {} rows into {}",
            predictions.len(),
            path.display()
        );

        Ok(AnnotationReport {
            path,
            rows: predictions.len(),
            label,
        })
    }
}
