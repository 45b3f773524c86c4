// Prediction module - majority-vote and per-row annotation over the current model

pub mod service;

pub use crate::model::vote::{majority_vote, VoteTally};
pub use service::{apply_model, AnnotationReport, PredictionMode, PredictionResult, PredictionService};
