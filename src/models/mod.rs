//! Classifier, model selection, artifact persistence and inference

pub mod evaluation;
pub mod forest;
pub mod inference;
pub mod loader;
pub mod selector;
pub mod validation;

pub use evaluation::{ClassReport, ClassificationMetrics};
pub use forest::{Classifier, ClassWeight, ForestParams, MaxFeatures, RandomForest};
pub use inference::InferenceEngine;
pub use loader::{ArtifactStore, LoadedArtifacts, ModelMetadata};
pub use selector::{CvSummary, ModelArtifact, ModelSelector, ParamGrid, SelectionOptions};
pub use validation::StratifiedKFold;
