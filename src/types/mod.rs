//! Type definitions shared by the training and inference paths

pub mod prediction;
pub mod record;
pub mod table;

pub use prediction::{Prediction, PredictionFailure, PredictionResult};
pub use record::{FieldValue, Record};
pub use table::{Column, ColumnData, ColumnKind, FeatureMatrix, Table};
