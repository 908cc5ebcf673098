//! Per-record prediction results

use crate::error::{ErrorKind, PipelineError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A successful classification of one report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// Predicted class label
    pub prediction: String,

    /// Probability of the predicted class (0.0 - 1.0)
    pub confidence: f64,

    /// Probability per class label, summing to 1
    pub probabilities: BTreeMap<String, f64>,
}

/// Why a record could not be classified
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionFailure {
    /// Human-readable message
    pub error: String,

    /// Error category
    pub kind: ErrorKind,
}

/// Outcome for one input record.
///
/// Serializes as `{"status": "success", "prediction": .., "confidence": .., "probabilities": ..}`
/// or `{"status": "error", "error": .., "kind": ..}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum PredictionResult {
    Success(Prediction),
    Error(PredictionFailure),
}

impl PredictionResult {
    /// Build a success result from class probabilities ordered like `labels`
    pub fn from_probabilities(labels: &[String], probabilities: &[f64]) -> Self {
        let (best, confidence) = probabilities
            .iter()
            .copied()
            .enumerate()
            .fold((0, f64::NEG_INFINITY), |(bi, bp), (i, p)| if p > bp { (i, p) } else { (bi, bp) });

        PredictionResult::Success(Prediction {
            prediction: labels.get(best).cloned().unwrap_or_default(),
            confidence: confidence.clamp(0.0, 1.0),
            probabilities: labels.iter().cloned().zip(probabilities.iter().copied()).collect(),
        })
    }

    pub fn from_error(err: &PipelineError) -> Self {
        PredictionResult::Error(PredictionFailure {
            error: err.to_string(),
            kind: err.kind(),
        })
    }

    pub fn is_success(&self) -> bool {
        matches!(self, PredictionResult::Success(_))
    }

    pub fn status(&self) -> &'static str {
        match self {
            PredictionResult::Success(_) => "success",
            PredictionResult::Error(_) => "error",
        }
    }

    pub fn prediction(&self) -> Option<&Prediction> {
        match self {
            PredictionResult::Success(p) => Some(p),
            PredictionResult::Error(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&PredictionFailure> {
        match self {
            PredictionResult::Error(f) => Some(f),
            PredictionResult::Success(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels() -> Vec<String> {
        vec!["Healthy".to_string(), "Diabetic".to_string(), "Hypertensive".to_string()]
    }

    #[test]
    fn test_from_probabilities_picks_argmax() {
        let result = PredictionResult::from_probabilities(&labels(), &[0.2, 0.5, 0.3]);
        let prediction = result.prediction().unwrap();

        assert_eq!(prediction.prediction, "Diabetic");
        assert_eq!(prediction.confidence, 0.5);
        assert_eq!(prediction.probabilities.len(), 3);
        assert_eq!(prediction.probabilities["Hypertensive"], 0.3);
    }

    #[test]
    fn test_success_serialization() {
        let result = PredictionResult::from_probabilities(&labels(), &[0.7, 0.2, 0.1]);
        let json = serde_json::to_value(&result).unwrap();

        assert_eq!(json["status"], "success");
        assert_eq!(json["prediction"], "Healthy");
        assert_eq!(json["confidence"], 0.7);

        let back: PredictionResult = serde_json::from_value(json).unwrap();
        assert_eq!(back, result);
    }

    #[test]
    fn test_error_serialization() {
        let result = PredictionResult::from_error(&PipelineError::schema("column Age expects a number"));
        assert!(!result.is_success());
        assert_eq!(result.status(), "error");

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["status"], "error");
        assert_eq!(json["kind"], "schema");
        assert!(json["error"].as_str().unwrap().contains("Age"));
    }
}
