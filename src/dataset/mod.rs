// Dataset module - samples, CSV contracts and the accumulation store
//
// This module provides three components:
// 1. Sample / Dataset: validated signal triples and ordered collections
// 2. csv_io: labeled/unlabeled CSV import and export
// 3. DatasetStore: accumulation across acquisition runs with safe export

pub mod csv_io;
pub mod sample;
pub mod store;

pub use csv_io::FeatureTable;
pub use sample::{Dataset, FeatureVector, NonFiniteFeature, Sample, FEATURE_COLUMNS, FEATURE_COUNT};
pub use store::DatasetStore;
