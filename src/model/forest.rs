// RandomForest: bootstrap-aggregated Gini trees
//
// All randomness (bootstrap draws and per-split feature subsets) comes from a
// single StdRng seeded from the training seed, so the same rows and params
// always produce the same forest.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::config::TrainingConfig;
use crate::dataset::{FeatureVector, FEATURE_COUNT};
use crate::error::ModelError;
use crate::model::tree::{DecisionTree, TreeConfig};
use crate::model::vote::majority_vote;
use crate::model::Classifier;

/// Forest hyperparameters
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ForestParams {
    pub n_trees: usize,
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub seed: u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self::from(&TrainingConfig::default())
    }
}

impl From<&TrainingConfig> for ForestParams {
    fn from(config: &TrainingConfig) -> Self {
        Self {
            n_trees: config.n_trees,
            max_depth: config.max_depth,
            min_samples_split: config.min_samples_split,
            seed: config.seed,
        }
    }
}

impl ForestParams {
    fn tree_config(&self) -> TreeConfig {
        TreeConfig {
            max_depth: self.max_depth,
            min_samples_split: self.min_samples_split,
            // floor(sqrt(n_features)) candidates per split
            max_features: ((FEATURE_COUNT as f64).sqrt() as usize).max(1),
        }
    }
}

/// Multi-class random forest over the three signal features
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RandomForest {
    /// Class labels in order of first appearance in the training rows
    classes: Vec<String>,
    trees: Vec<DecisionTree>,
    params: ForestParams,
}

impl RandomForest {
    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn params(&self) -> &ForestParams {
        &self.params
    }

    /// Class index voted by the trees for one row
    fn vote(&self, row: &FeatureVector) -> usize {
        majority_vote(self.trees.iter().map(|tree| tree.predict(row)))
            .map(|tally| tally.into_winner())
            .unwrap_or(0)
    }
}

impl Classifier for RandomForest {
    type Params = ForestParams;

    fn fit(
        features: &[FeatureVector],
        labels: &[String],
        params: &ForestParams,
    ) -> Result<Self, ModelError> {
        if features.is_empty() {
            return Err(ModelError::FitFailed {
                reason: "no training rows".to_string(),
            });
        }
        if features.len() != labels.len() {
            return Err(ModelError::DimensionMismatch {
                expected: features.len(),
                got: labels.len(),
            });
        }
        if params.n_trees == 0 {
            return Err(ModelError::FitFailed {
                reason: "forest needs at least one tree".to_string(),
            });
        }

        let mut classes: Vec<String> = Vec::new();
        let targets: Vec<usize> = labels
            .iter()
            .map(|label| match classes.iter().position(|c| c == label) {
                Some(idx) => idx,
                None => {
                    classes.push(label.clone());
                    classes.len() - 1
                }
            })
            .collect();

        let n = features.len();
        let tree_config = params.tree_config();
        let mut rng = StdRng::seed_from_u64(params.seed);

        let trees = (0..params.n_trees)
            .map(|_| {
                let bootstrap: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
                DecisionTree::fit(
                    features,
                    &targets,
                    classes.len(),
                    &bootstrap,
                    &tree_config,
                    &mut rng,
                )
            })
            .collect();

        log::debug!(
            "[RandomForest] Fitted {} trees on {} rows, {} classes",
            params.n_trees,
            n,
            classes.len()
        );

        Ok(Self {
            classes,
            trees,
            params: *params,
        })
    }

    fn predict(&self, features: &[FeatureVector]) -> Vec<String> {
        features
            .iter()
            .map(|row| self.classes[self.vote(row)].clone())
            .collect()
    }
}
