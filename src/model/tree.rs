//! Gini decision tree over encoded class indices.
//!
//! Trees are the building block of the forest and are never used alone, so
//! they work on class indices rather than label strings.

use rand::seq::index;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::dataset::{FeatureVector, FEATURE_COUNT};

/// A node in the decision tree
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum TreeNode {
    /// Internal node with split condition
    Split {
        /// Feature index to split on
        feature_idx: usize,
        /// Left when `feature <= threshold`
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
    },
    /// Leaf node with predicted class
    Leaf { class_idx: usize, num_samples: usize },
}

impl TreeNode {
    fn predict(&self, row: &FeatureVector) -> usize {
        match self {
            TreeNode::Split {
                feature_idx,
                threshold,
                left,
                right,
            } => {
                if row[*feature_idx] <= *threshold {
                    left.predict(row)
                } else {
                    right.predict(row)
                }
            }
            TreeNode::Leaf { class_idx, .. } => *class_idx,
        }
    }

    fn count_nodes(&self) -> usize {
        match self {
            TreeNode::Split { left, right, .. } => 1 + left.count_nodes() + right.count_nodes(),
            TreeNode::Leaf { .. } => 1,
        }
    }

    fn depth(&self) -> usize {
        match self {
            TreeNode::Split { left, right, .. } => 1 + left.depth().max(right.depth()),
            TreeNode::Leaf { .. } => 0,
        }
    }
}

/// Tree growth limits
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct TreeConfig {
    pub max_depth: usize,
    /// Minimum samples required to split
    pub min_samples_split: usize,
    /// Features drawn at random per split (clamped to 1..=FEATURE_COUNT)
    pub max_features: usize,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            max_depth: 16,
            min_samples_split: 2,
            max_features: FEATURE_COUNT,
        }
    }
}

/// Gini impurity `1 - sum(p_i^2)` from per-class counts
fn gini(counts: &[usize], total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let total = total as f64;
    1.0 - counts
        .iter()
        .map(|&c| {
            let p = c as f64 / total;
            p * p
        })
        .sum::<f64>()
}

/// Most frequent class, lowest index on ties
fn plurality(counts: &[usize]) -> usize {
    let mut best = 0;
    for (idx, &count) in counts.iter().enumerate() {
        if count > counts[best] {
            best = idx;
        }
    }
    best
}

struct BestSplit {
    feature_idx: usize,
    threshold: f64,
    gain: f64,
}

/// Classification tree fitted on a (possibly bootstrapped) row subset
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DecisionTree {
    root: TreeNode,
}

impl DecisionTree {
    /// Grow a tree on `indices` into `features` / `targets`
    ///
    /// `indices` may repeat rows (bootstrap). Callers guarantee it is not
    /// empty and every target is `< n_classes`.
    pub fn fit<R: Rng + ?Sized>(
        features: &[FeatureVector],
        targets: &[usize],
        n_classes: usize,
        indices: &[usize],
        config: &TreeConfig,
        rng: &mut R,
    ) -> Self {
        let builder = TreeBuilder {
            features,
            targets,
            n_classes,
            config,
        };
        Self {
            root: builder.build(indices, 0, rng),
        }
    }

    pub fn predict(&self, row: &FeatureVector) -> usize {
        self.root.predict(row)
    }

    pub fn node_count(&self) -> usize {
        self.root.count_nodes()
    }

    pub fn depth(&self) -> usize {
        self.root.depth()
    }
}

struct TreeBuilder<'a> {
    features: &'a [FeatureVector],
    targets: &'a [usize],
    n_classes: usize,
    config: &'a TreeConfig,
}

impl TreeBuilder<'_> {
    fn class_counts(&self, indices: &[usize]) -> Vec<usize> {
        let mut counts = vec![0; self.n_classes];
        for &i in indices {
            counts[self.targets[i]] += 1;
        }
        counts
    }

    fn build<R: Rng + ?Sized>(&self, indices: &[usize], depth: usize, rng: &mut R) -> TreeNode {
        let counts = self.class_counts(indices);
        let leaf = TreeNode::Leaf {
            class_idx: plurality(&counts),
            num_samples: indices.len(),
        };

        let pure = counts.iter().filter(|&&c| c > 0).count() <= 1;
        if pure || depth >= self.config.max_depth || indices.len() < self.config.min_samples_split {
            return leaf;
        }

        let Some(split) = self.find_best_split(indices, &counts, rng) else {
            return leaf;
        };

        let (left, right): (Vec<usize>, Vec<usize>) = indices
            .iter()
            .copied()
            .partition(|&i| self.features[i][split.feature_idx] <= split.threshold);

        TreeNode::Split {
            feature_idx: split.feature_idx,
            threshold: split.threshold,
            left: Box::new(self.build(&left, depth + 1, rng)),
            right: Box::new(self.build(&right, depth + 1, rng)),
        }
    }

    fn find_best_split<R: Rng + ?Sized>(
        &self,
        indices: &[usize],
        counts: &[usize],
        rng: &mut R,
    ) -> Option<BestSplit> {
        let total = indices.len();
        let parent_impurity = gini(counts, total);
        let n_candidates = self.config.max_features.clamp(1, FEATURE_COUNT);

        let mut best: Option<BestSplit> = None;

        for feature_idx in index::sample(rng, FEATURE_COUNT, n_candidates).into_iter() {
            let mut column: Vec<(f64, usize)> = indices
                .iter()
                .map(|&i| (self.features[i][feature_idx], self.targets[i]))
                .collect();
            column.sort_by(|a, b| a.0.total_cmp(&b.0));

            // Sweep left to right, moving one row at a time into the left side
            let mut left_counts = vec![0; self.n_classes];
            let mut right_counts = counts.to_vec();

            for pos in 0..total - 1 {
                let (value, class_idx) = column[pos];
                left_counts[class_idx] += 1;
                right_counts[class_idx] -= 1;

                let next_value = column[pos + 1].0;
                if value == next_value {
                    continue;
                }

                let n_left = pos + 1;
                let n_right = total - n_left;
                let weighted = (n_left as f64 * gini(&left_counts, n_left)
                    + n_right as f64 * gini(&right_counts, n_right))
                    / total as f64;
                let gain = parent_impurity - weighted;

                if gain > 0.0 && best.as_ref().map_or(true, |b| gain > b.gain) {
                    best = Some(BestSplit {
                        feature_idx,
                        threshold: (value + next_value) / 2.0,
                        gain,
                    });
                }
            }
        }

        best
    }
}
