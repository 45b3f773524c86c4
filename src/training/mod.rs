// Training module - schema-checked merge, seeded split, fit and persist

pub mod service;
pub mod split;

pub use service::{accuracy, TrainingOutcome, TrainingReport, TrainingService};
pub use split::{partition, test_size, train_test_split, TrainTestSplit};
