// Sample and Dataset - the physiological signal triple and ordered collections of it
//
// A Sample is only ever built from three finite numbers. Acquisition and CSV
// loading both go through `Sample::new`, so an invalid record can never end
// up inside a Dataset.

use serde::{Deserialize, Serialize};
use std::fmt;

/// CSV header names of the three feature columns, in wire order
pub const FEATURE_COLUMNS: [&str; 3] = ["beatsPerMinute", "beatAvg", "GSR"];

/// Number of features per row
pub const FEATURE_COUNT: usize = FEATURE_COLUMNS.len();

/// Feature row handed to the classifier
pub type FeatureVector = [f64; FEATURE_COUNT];

/// Rejected feature value (NaN or infinite)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NonFiniteFeature {
    pub column: &'static str,
    pub value: f64,
}

impl fmt::Display for NonFiniteFeature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} is not finite ({})", self.column, self.value)
    }
}

/// One reading of beatsPerMinute, beatAvg and GSR
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    beats_per_minute: f64,
    beat_avg: f64,
    gsr: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    label: Option<String>,
}

impl Sample {
    /// Build an unlabeled sample, rejecting non-finite values
    pub fn new(beats_per_minute: f64, beat_avg: f64, gsr: f64) -> Result<Self, NonFiniteFeature> {
        let values = [beats_per_minute, beat_avg, gsr];
        for (column, value) in FEATURE_COLUMNS.into_iter().zip(values) {
            if !value.is_finite() {
                return Err(NonFiniteFeature { column, value });
            }
        }

        Ok(Self {
            beats_per_minute,
            beat_avg,
            gsr,
            label: None,
        })
    }

    /// Build a sample from a feature row
    pub fn from_features(features: FeatureVector) -> Result<Self, NonFiniteFeature> {
        Self::new(features[0], features[1], features[2])
    }

    /// Attach a content category label
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn beats_per_minute(&self) -> f64 {
        self.beats_per_minute
    }

    pub fn beat_avg(&self) -> f64 {
        self.beat_avg
    }

    pub fn gsr(&self) -> f64 {
        self.gsr
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Feature row in `FEATURE_COLUMNS` order
    pub fn features(&self) -> FeatureVector {
        [self.beats_per_minute, self.beat_avg, self.gsr]
    }
}

/// Ordered, append-only collection of samples
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    samples: Vec<Sample>,
}

impl Dataset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            samples: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, sample: Sample) {
        self.samples.push(sample);
    }

    /// Append every row of `other`, preserving order
    pub fn append(&mut self, other: Dataset) {
        self.samples.extend(other.samples);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Sample> {
        self.samples.iter()
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn features(&self) -> Vec<FeatureVector> {
        self.samples.iter().map(Sample::features).collect()
    }

    /// Labels of every row, or `None` if any row is unlabeled
    pub fn labels(&self) -> Option<Vec<String>> {
        self.samples
            .iter()
            .map(|sample| sample.label().map(str::to_string))
            .collect()
    }
}

impl FromIterator<Sample> for Dataset {
    fn from_iter<I: IntoIterator<Item = Sample>>(iter: I) -> Self {
        Self {
            samples: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for Dataset {
    type Item = Sample;
    type IntoIter = std::vec::IntoIter<Sample>;

    fn into_iter(self) -> Self::IntoIter {
        self.samples.into_iter()
    }
}

impl<'a> IntoIterator for &'a Dataset {
    type Item = &'a Sample;
    type IntoIter = std::slice::Iter<'a, Sample>;

    fn into_iter(self) -> Self::IntoIter {
        self.samples.iter()
    }
}
