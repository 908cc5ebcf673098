//! Inference facade: raw records in, per-record prediction results out

use crate::error::{PipelineError, Result};
use crate::models::forest::{Classifier, RandomForest};
use crate::models::loader::{ArtifactStore, LoadedArtifacts, ModelMetadata};
use crate::preprocessing::PreprocessingContext;
use crate::types::prediction::PredictionResult;
use crate::types::record::Record;
use std::path::Path;
use tracing::{debug, info};

/// Frozen preprocessing plus the fitted model.
///
/// Every method takes `&self`; one engine can be shared across threads.
#[derive(Debug, Clone)]
pub struct InferenceEngine {
    context: PreprocessingContext,
    model: RandomForest,
    metadata: ModelMetadata,
    labels: Vec<String>,
}

impl InferenceEngine {
    /// Load the artifacts of a model directory
    pub fn load<P: AsRef<Path>>(models_dir: P) -> Result<Self> {
        let LoadedArtifacts {
            context,
            model,
            metadata,
        } = ArtifactStore::new(models_dir).load()?;
        Self::from_parts(context, model, metadata)
    }

    pub fn from_parts(context: PreprocessingContext, model: RandomForest, metadata: ModelMetadata) -> Result<Self> {
        let labels = context.class_labels()?;
        if model.n_classes() != labels.len() {
            return Err(PipelineError::config(format!(
                "model predicts {} classes but {} labels are known",
                model.n_classes(),
                labels.len()
            )));
        }

        info!(
            model_type = model.model_type(),
            trees = model.trees().len(),
            features = context.schema().len(),
            classes = ?labels,
            "Inference engine initialized"
        );

        Ok(Self {
            context,
            model,
            metadata,
            labels,
        })
    }

    /// Classify one record. Failures are reported in the result, never raised.
    pub fn predict(&self, record: &Record) -> PredictionResult {
        match self.try_predict(record) {
            Ok(result) => result,
            Err(e) => {
                debug!(error = %e, kind = ?e.kind(), "Record could not be classified");
                PredictionResult::from_error(&e)
            }
        }
    }

    /// Classify records independently, one result per record in input order
    pub fn predict_batch(&self, records: &[Record]) -> Vec<PredictionResult> {
        records.iter().map(|r| self.predict(r)).collect()
    }

    /// Classify a JSON object
    pub fn predict_json(&self, value: &serde_json::Value) -> PredictionResult {
        match Record::from_json(value) {
            Ok(record) => self.predict(&record),
            Err(e) => PredictionResult::from_error(&e),
        }
    }

    pub fn predict_json_batch(&self, values: &[serde_json::Value]) -> Vec<PredictionResult> {
        values.iter().map(|v| self.predict_json(v)).collect()
    }

    fn try_predict(&self, record: &Record) -> Result<PredictionResult> {
        let x = self.context.transform_records(std::slice::from_ref(record))?;
        let probabilities = self
            .model
            .predict_proba(&x)?
            .into_iter()
            .next()
            .ok_or_else(|| PipelineError::schema("model returned no probabilities"))?;
        Ok(PredictionResult::from_probabilities(&self.labels, &probabilities))
    }

    pub fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }

    pub fn class_labels(&self) -> &[String] {
        &self.labels
    }

    pub fn feature_names(&self) -> &[String] {
        self.model.feature_names()
    }

    pub fn context(&self) -> &PreprocessingContext {
        &self.context
    }

    pub fn model_type(&self) -> &'static str {
        self.model.model_type()
    }
}
