//! Preprocessing stages shared by training and serving

pub mod align;
pub mod context;
pub mod encoding;
pub mod features;
pub mod imputer;
pub mod outlier;
pub mod scaler;
pub mod stats;

pub use align::{FeatureAligner, FeatureSchema, FeatureSpec};
pub use context::{PreprocessingContext, TrainingData};
pub use encoding::{EncoderRegistry, LabelEncoder, TARGET_KEY, UNKNOWN};
pub use features::FeatureEngineer;
pub use imputer::MedianImputer;
pub use outlier::{OutlierBounds, OutlierCapper};
pub use scaler::RobustScaler;
