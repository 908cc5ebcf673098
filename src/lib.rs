//! Patient Report Pipeline Library
//!
//! Trains a classifier on patient health reports and serves predictions,
//! keeping the preprocessing applied at serving time identical to the one
//! the model was fit on.

pub mod config;
pub mod data;
pub mod error;
pub mod metrics;
pub mod models;
pub mod preprocessing;
pub mod server;
pub mod training;
pub mod types;

pub use config::AppConfig;
pub use error::{ErrorKind, PipelineError};
pub use models::inference::InferenceEngine;
pub use preprocessing::PreprocessingContext;
pub use training::{TrainingPipeline, TrainingReport};
pub use types::{PredictionResult, Record};
