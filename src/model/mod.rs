// Model module - classifier capability, trained artifact and repository
//
// This module provides:
// 1. Classifier: the fit/predict capability contract
// 2. RandomForest: reference implementation over Gini decision trees
// 3. Model: the persisted artifact (forest plus training metadata)
// 4. ModelRepository: keyed storage with a "current model" slot

pub mod forest;
pub mod repository;
pub mod tree;
pub mod vote;

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::dataset::FeatureVector;
use crate::error::ModelError;

pub use forest::{ForestParams, RandomForest};
pub use repository::{FileModelRepository, InMemoryModelRepository, ModelRepository};
pub use vote::{majority_vote, VoteTally};

/// Fit/predict capability of a multi-class classifier
pub trait Classifier: Sized {
    type Params;

    /// Fit on `features` with one label per row
    ///
    /// # Errors
    /// - `ModelError::FitFailed` for empty input or unusable params
    /// - `ModelError::DimensionMismatch` when row and label counts differ
    fn fit(
        features: &[FeatureVector],
        labels: &[String],
        params: &Self::Params,
    ) -> Result<Self, ModelError>;

    /// One predicted label per row
    fn predict(&self, features: &[FeatureVector]) -> Vec<String>;
}

static MODEL_SEQUENCE: AtomicU64 = AtomicU64::new(0);

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Trained classifier plus the metadata needed to apply and audit it
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Model {
    id: String,
    created_at_ms: u64,
    label_column: String,
    accuracy: f64,
    forest: RandomForest,
}

impl Model {
    /// Wrap a fitted forest under a fresh id
    ///
    /// Ids combine the creation time in milliseconds with a process-wide
    /// sequence, so two models built in the same millisecond still differ.
    pub fn new(forest: RandomForest, label_column: impl Into<String>, accuracy: f64) -> Self {
        let created_at_ms = now_millis();
        let sequence = MODEL_SEQUENCE.fetch_add(1, Ordering::Relaxed);
        Self {
            id: format!("model-{}-{:04}", created_at_ms, sequence),
            created_at_ms,
            label_column: label_column.into(),
            accuracy,
            forest,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn created_at_ms(&self) -> u64 {
        self.created_at_ms
    }

    /// Name of the label column the model was trained on
    pub fn label_column(&self) -> &str {
        &self.label_column
    }

    /// Held-out accuracy measured at training time
    pub fn accuracy(&self) -> f64 {
        self.accuracy
    }

    pub fn classes(&self) -> &[String] {
        self.forest.classes()
    }

    pub fn forest(&self) -> &RandomForest {
        &self.forest
    }

    pub fn predict(&self, features: &[FeatureVector]) -> Vec<String> {
        self.forest.predict(features)
    }
}
