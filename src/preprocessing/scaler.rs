//! Median / IQR feature scaling

use crate::error::{PipelineError, Result};
use crate::preprocessing::stats::{median, quantile};
use crate::types::table::FeatureMatrix;
use serde::{Deserialize, Serialize};

/// Robust scaler: `(x - median) / (Q3 - Q1)` per feature.
///
/// Statistics are indexed by schema position and tagged with the feature
/// names they were fit on; transforming a differently laid out matrix fails.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RobustScaler {
    feature_names: Vec<String>,
    center: Vec<f64>,
    scale: Vec<f64>,
}

impl RobustScaler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fit(&mut self, x: &FeatureMatrix) -> Result<()> {
        if x.n_rows() == 0 {
            return Err(PipelineError::config("cannot fit scaler on an empty matrix"));
        }

        let mut center = Vec::with_capacity(x.n_features());
        let mut scale = Vec::with_capacity(x.n_features());
        for j in 0..x.n_features() {
            let mut values = x.column_values(j);
            if values.iter().any(|v| !v.is_finite()) {
                return Err(PipelineError::config(format!(
                    "feature {} holds non-finite values",
                    x.feature_names()[j]
                )));
            }
            values.sort_by(f64::total_cmp);
            let med = median(&values).unwrap_or(0.0);
            let iqr = match (quantile(&values, 0.25), quantile(&values, 0.75)) {
                (Some(q1), Some(q3)) => q3 - q1,
                _ => 0.0,
            };
            center.push(med);
            // zero spread: pass the centered value through
            scale.push(if iqr > 0.0 && iqr.is_finite() { iqr } else { 1.0 });
        }

        self.feature_names = x.feature_names().to_vec();
        self.center = center;
        self.scale = scale;
        Ok(())
    }

    pub fn fit_transform(&mut self, x: FeatureMatrix) -> Result<FeatureMatrix> {
        self.fit(&x)?;
        self.transform(x)
    }

    pub fn transform(&self, mut x: FeatureMatrix) -> Result<FeatureMatrix> {
        if !self.is_fitted() {
            return Err(PipelineError::config("scaler has not been fitted"));
        }
        x.ensure_schema(&self.feature_names)?;

        for row in x.rows_mut() {
            for ((value, c), s) in row.iter_mut().zip(&self.center).zip(&self.scale) {
                *value = (*value - c) / s;
            }
        }
        Ok(x)
    }

    /// Check persisted statistics: one finite center and positive scale per feature
    pub fn validate(&self) -> Result<()> {
        let n = self.feature_names.len();
        if self.center.len() != n || self.scale.len() != n {
            return Err(PipelineError::config(format!(
                "scaler holds {} centers and {} scales for {} features",
                self.center.len(),
                self.scale.len(),
                n
            )));
        }
        if self.center.iter().any(|c| !c.is_finite()) {
            return Err(PipelineError::config("scaler center is not finite"));
        }
        if self.scale.iter().any(|s| !s.is_finite() || *s <= 0.0) {
            return Err(PipelineError::config("scaler scale must be finite and positive"));
        }
        Ok(())
    }

    pub fn is_fitted(&self) -> bool {
        !self.feature_names.is_empty()
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn center(&self) -> &[f64] {
        &self.center
    }

    pub fn scale(&self) -> &[f64] {
        &self.scale
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matrix(rows: Vec<Vec<f64>>) -> FeatureMatrix {
        FeatureMatrix::new(vec!["a".to_string(), "b".to_string()], rows).unwrap()
    }

    #[test]
    fn test_fit_robust_statistics() {
        let x = matrix(vec![
            vec![1.0, 5.0],
            vec![2.0, 5.0],
            vec![3.0, 5.0],
            vec![4.0, 5.0],
            vec![100.0, 5.0],
        ]);
        let mut scaler = RobustScaler::new();
        let scaled = scaler.fit_transform(x).unwrap();

        assert_eq!(scaler.center(), &[3.0, 5.0]);
        assert_eq!(scaler.scale(), &[2.0, 1.0]);
        assert_eq!(scaled.row(0), &[-1.0, 0.0]);
        assert!(scaled.rows().iter().flatten().all(|v| v.is_finite()));
    }

    #[test]
    fn test_transform_is_deterministic() {
        let mut scaler = RobustScaler::new();
        scaler.fit(&matrix(vec![vec![1.0, 2.0], vec![3.0, 8.0], vec![5.0, 4.0]])).unwrap();

        let input = matrix(vec![vec![0.5, 7.0]]);
        let once = scaler.transform(input.clone()).unwrap();
        let again = scaler.transform(input).unwrap();
        assert_eq!(once, again);

        let twice = scaler.transform(once.clone()).unwrap();
        assert_eq!(twice, scaler.transform(once).unwrap());
    }

    #[test]
    fn test_transform_rejects_other_layout() {
        let mut scaler = RobustScaler::new();
        scaler.fit(&matrix(vec![vec![1.0, 2.0]])).unwrap();

        let other = FeatureMatrix::new(vec!["b".to_string(), "a".to_string()], vec![vec![1.0, 2.0]]).unwrap();
        assert!(scaler.transform(other).is_err());
    }

    #[test]
    fn test_validate_persisted_statistics() {
        let mut scaler = RobustScaler::new();
        scaler.fit(&matrix(vec![vec![1.0, 2.0], vec![3.0, 8.0]])).unwrap();
        assert!(scaler.validate().is_ok());

        let mut json = serde_json::to_value(&scaler).unwrap();
        json["scale"] = serde_json::json!([1.0, 0.0]);
        let zero_scale: RobustScaler = serde_json::from_value(json.clone()).unwrap();
        assert!(zero_scale.validate().unwrap_err().is_configuration());

        json["scale"] = serde_json::json!([1.0]);
        let short: RobustScaler = serde_json::from_value(json).unwrap();
        assert!(short.validate().is_err());
    }

    #[test]
    fn test_unfitted_scaler_is_configuration_error() {
        let err = RobustScaler::new().transform(matrix(vec![])).unwrap_err();
        assert!(err.is_configuration());
    }
}
