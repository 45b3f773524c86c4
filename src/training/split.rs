//! Seeded train/test partitioning.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::dataset::Dataset;
use crate::error::DatasetError;

/// Row indices of each partition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrainTestSplit {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// Number of held-out rows: `ceil(n * test_ratio)`, kept within `1..n`
pub fn test_size(n: usize, test_ratio: f64) -> usize {
    let raw = (n as f64 * test_ratio).ceil() as usize;
    raw.clamp(1, n.saturating_sub(1).max(1))
}

/// Shuffle row indices with `seed` and cut off the test partition
///
/// # Errors
/// `DatasetError::EmptyInput` when fewer than two rows are available, since
/// both partitions must be non-empty.
pub fn train_test_split(
    n_rows: usize,
    test_ratio: f64,
    seed: u64,
) -> Result<TrainTestSplit, DatasetError> {
    if n_rows < 2 {
        return Err(DatasetError::EmptyInput {
            reason: format!("need at least 2 rows to split, got {}", n_rows),
        });
    }

    let mut indices: Vec<usize> = (0..n_rows).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let n_test = test_size(n_rows, test_ratio);
    let train = indices.split_off(n_test);

    Ok(TrainTestSplit {
        train,
        test: indices,
    })
}

/// Apply a split to a labeled dataset
pub fn partition(dataset: &Dataset, split: &TrainTestSplit) -> (Dataset, Dataset) {
    let samples = dataset.samples();
    let pick = |indices: &[usize]| -> Dataset {
        indices.iter().map(|&i| samples[i].clone()).collect()
    };
    (pick(&split.train), pick(&split.test))
}
