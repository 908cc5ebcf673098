//! Artifact persistence: model, scaler, encoders and metadata as JSON files

use crate::error::{PipelineError, Result};
use crate::models::evaluation::ClassificationMetrics;
use crate::models::forest::{Classifier, ForestParams, RandomForest};
use crate::models::selector::{CvSummary, ModelArtifact};
use crate::preprocessing::{
    EncoderRegistry, FeatureSchema, FeatureSpec, MedianImputer, OutlierCapper, PreprocessingContext, RobustScaler,
};
use crate::types::table::ColumnKind;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use tracing::info;
use uuid::Uuid;

pub const MODEL_FILE: &str = "patient_report_model.json";
pub const SCALER_FILE: &str = "scaler.json";
pub const ENCODERS_FILE: &str = "label_encoders.json";
pub const METADATA_FILE: &str = "model_metadata.json";

/// Frozen preprocessing state that has no artifact file of its own
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedPreprocessing {
    /// Training-time IQR clipping bounds per numeric column
    pub outlier_bounds: OutlierCapper,

    /// Training medians used to fill missing numeric cells
    pub medians: MedianImputer,
}

/// Description of a training run, stored next to the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    /// Unique identifier of the training run
    pub run_id: Uuid,

    /// Classifier identifier
    pub model_type: String,

    /// When training finished
    pub trained_at: DateTime<Utc>,

    /// Dataset column the model predicts
    pub target_column: String,

    /// Frozen schema, in model input order
    pub feature_names: Vec<String>,

    /// Schema entries that are label-encoded
    pub categorical_features: Vec<String>,

    pub n_features: usize,

    /// Class labels in code order
    pub classes: Vec<String>,

    /// Hyperparameters of the persisted model
    pub best_params: ForestParams,

    /// Baseline cross-validation summary, when it ran
    pub cv_scores: Option<CvSummary>,

    /// Non-negative importance per feature
    pub feature_importance: BTreeMap<String, f64>,

    /// Held-out evaluation of the persisted model
    pub test_metrics: ClassificationMetrics,

    pub preprocessing: PersistedPreprocessing,
}

impl ModelMetadata {
    pub fn from_training(context: &PreprocessingContext, artifact: &ModelArtifact) -> Result<Self> {
        let schema = context.schema();
        Ok(Self {
            run_id: Uuid::new_v4(),
            model_type: artifact.model.model_type().to_string(),
            trained_at: Utc::now(),
            target_column: context.target_column().to_string(),
            feature_names: schema.names(),
            categorical_features: schema.categorical().map(str::to_string).collect(),
            n_features: schema.len(),
            classes: context.class_labels()?,
            best_params: artifact.params.clone(),
            cv_scores: artifact.cv_scores.clone(),
            feature_importance: artifact.feature_importance.iter().cloned().collect(),
            test_metrics: artifact.test_metrics.clone(),
            preprocessing: PersistedPreprocessing {
                outlier_bounds: context.capper().clone(),
                medians: context.imputer().clone(),
            },
        })
    }

    /// Rebuild the frozen schema from the feature list and categorical set
    pub fn schema(&self) -> Result<FeatureSchema> {
        if self.n_features != self.feature_names.len() {
            return Err(PipelineError::config(format!(
                "metadata lists {} feature names but n_features is {}",
                self.feature_names.len(),
                self.n_features
            )));
        }
        FeatureSchema::new(
            self.feature_names
                .iter()
                .map(|name| FeatureSpec {
                    name: name.clone(),
                    kind: if self.categorical_features.contains(name) {
                        ColumnKind::Categorical
                    } else {
                        ColumnKind::Numeric
                    },
                })
                .collect(),
        )
    }
}

/// Everything needed to serve predictions
#[derive(Debug, Clone)]
pub struct LoadedArtifacts {
    pub context: PreprocessingContext,
    pub model: RandomForest,
    pub metadata: ModelMetadata,
}

/// Reads and writes the artifact files of one model directory
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, file: &str) -> PathBuf {
        self.dir.join(file)
    }

    /// Persist the fitted context and model; returns the written metadata
    pub fn save(&self, context: &PreprocessingContext, artifact: &ModelArtifact) -> Result<ModelMetadata> {
        fs::create_dir_all(&self.dir)?;
        let metadata = ModelMetadata::from_training(context, artifact)?;

        self.write_json(MODEL_FILE, &artifact.model)?;
        self.write_json(SCALER_FILE, context.scaler())?;
        self.write_json(ENCODERS_FILE, context.registry())?;
        self.write_json(METADATA_FILE, &metadata)?;

        info!(
            dir = %self.dir.display(),
            run_id = %metadata.run_id,
            features = metadata.n_features,
            "Artifacts saved"
        );
        Ok(metadata)
    }

    /// Load and cross-check every artifact. Any problem is a configuration error.
    pub fn load(&self) -> Result<LoadedArtifacts> {
        info!(dir = %self.dir.display(), "Loading artifacts");

        let model: RandomForest = self.read_json(MODEL_FILE)?;
        let scaler: RobustScaler = self.read_json(SCALER_FILE)?;
        let registry: EncoderRegistry = self.read_json(ENCODERS_FILE)?;
        let metadata: ModelMetadata = self.read_json(METADATA_FILE)?;

        model.validate()?;
        let schema = metadata.schema()?;
        if model.feature_names() != metadata.feature_names.as_slice() {
            return Err(PipelineError::config("model feature layout differs from the metadata schema"));
        }

        let context = PreprocessingContext::from_parts(
            metadata.preprocessing.outlier_bounds.clone(),
            metadata.preprocessing.medians.clone(),
            registry,
            schema,
            scaler,
            metadata.target_column.clone(),
        )?;

        let classes = context.class_labels()?;
        if model.n_classes() != classes.len() {
            return Err(PipelineError::config(format!(
                "model predicts {} classes but the target encoder knows {}",
                model.n_classes(),
                classes.len()
            )));
        }

        info!(
            run_id = %metadata.run_id,
            model_type = %metadata.model_type,
            trained_at = %metadata.trained_at,
            features = metadata.n_features,
            classes = classes.len(),
            "Artifacts loaded successfully"
        );

        Ok(LoadedArtifacts {
            context,
            model,
            metadata,
        })
    }

    fn write_json<T: Serialize + ?Sized>(&self, file: &str, value: &T) -> Result<()> {
        let writer = BufWriter::new(File::create(self.path(file))?);
        serde_json::to_writer_pretty(writer, value)?;
        Ok(())
    }

    fn read_json<T: DeserializeOwned>(&self, file: &str) -> Result<T> {
        let path = self.path(file);
        let reader = File::open(&path)
            .map(BufReader::new)
            .map_err(|e| PipelineError::config(format!("cannot open artifact {}: {}", path.display(), e)))?;
        serde_json::from_reader(reader)
            .map_err(|e| PipelineError::config(format!("artifact {} is malformed: {}", path.display(), e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::selector::SelectionOptions;
    use crate::preprocessing::TARGET_KEY;
    use crate::training::TrainingPipeline;
    use crate::types::table::{Column, Table};

    #[test]
    fn test_missing_directory_is_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = ArtifactStore::new(dir.path().join("absent")).load().unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains(MODEL_FILE));
    }

    #[test]
    fn test_malformed_artifact_is_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(MODEL_FILE), "{ not json").unwrap();
        let err = ArtifactStore::new(dir.path()).load().unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("malformed"));
    }

    fn saved_store(dir: &Path) -> ArtifactStore {
        let n = 30;
        let table = Table::new(vec![
            Column::numeric("Glucose", (0..n).map(|i| Some(if i % 2 == 0 { 90.0 } else { 170.0 })).collect()),
            Column::categorical(
                "diagnosis",
                (0..n).map(|i| Some(if i % 2 == 0 { "Healthy" } else { "Diabetic" }.to_string())).collect(),
            ),
        ])
        .unwrap();
        let options = SelectionOptions {
            use_cv: false,
            default_params: ForestParams {
                n_estimators: 3,
                ..ForestParams::default()
            },
            ..SelectionOptions::default()
        };
        let report = TrainingPipeline::new(options).fit(table).unwrap();
        let store = ArtifactStore::new(dir);
        store.save(&report.context, &report.artifact).unwrap();
        store
    }

    fn rewrite(store: &ArtifactStore, file: &str, edit: impl FnOnce(&mut serde_json::Value)) {
        let path = store.path(file);
        let mut json: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        edit(&mut json);
        fs::write(path, json.to_string()).unwrap();
    }

    #[test]
    fn test_saved_artifacts_load() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = saved_store(dir.path()).load().unwrap();
        assert_eq!(loaded.model.n_classes(), 2);
    }

    #[test]
    fn test_corrupted_tree_node_is_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = saved_store(dir.path());
        rewrite(&store, MODEL_FILE, |model| {
            model["trees"][0]["nodes"][0] = serde_json::json!({
                "type": "split", "feature": 99, "threshold": 0.0, "left": 1, "right": 2
            });
        });

        let err = store.load().unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("feature 99"));
    }

    #[test]
    fn test_zero_scale_is_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = saved_store(dir.path());
        rewrite(&store, SCALER_FILE, |scaler| scaler["scale"][0] = serde_json::json!(0.0));
        assert!(store.load().unwrap_err().is_configuration());
    }

    #[test]
    fn test_duplicate_encoder_classes_are_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = saved_store(dir.path());
        rewrite(&store, ENCODERS_FILE, |encoders| {
            encoders[TARGET_KEY]["classes"] = serde_json::json!(["Healthy", "Healthy"]);
        });
        let err = store.load().unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("malformed"));
    }

    #[test]
    fn test_metadata_schema_marks_categorical_features() {
        let json = serde_json::json!({
            "run_id": Uuid::nil(),
            "model_type": "RandomForestClassifier",
            "trained_at": "2024-01-01T00:00:00Z",
            "target_column": "diagnosis",
            "feature_names": ["Age", "Gender"],
            "categorical_features": ["Gender"],
            "n_features": 2,
            "classes": ["A", "B"],
            "best_params": ForestParams::default(),
            "cv_scores": null,
            "feature_importance": {"Age": 0.7, "Gender": 0.3},
            "test_metrics": {
                "accuracy": 1.0, "precision_weighted": 1.0, "recall_weighted": 1.0, "f1_weighted": 1.0,
                "precision_macro": 1.0, "recall_macro": 1.0, "f1_macro": 1.0,
                "confusion_matrix": [[1, 0], [0, 1]], "per_class": []
            },
            "preprocessing": {"outlier_bounds": {}, "medians": {}}
        });
        let metadata: ModelMetadata = serde_json::from_value(json).unwrap();
        let schema = metadata.schema().unwrap();
        assert_eq!(schema.kind("Gender"), Some(ColumnKind::Categorical));
        assert_eq!(schema.kind("Age"), Some(ColumnKind::Numeric));
    }
}
