//! Fitted preprocessing state shared by the training and serving paths

use crate::error::{PipelineError, Result};
use crate::preprocessing::align::{FeatureAligner, FeatureSchema};
use crate::preprocessing::encoding::EncoderRegistry;
use crate::preprocessing::features::FeatureEngineer;
use crate::preprocessing::imputer::MedianImputer;
use crate::preprocessing::outlier::OutlierCapper;
use crate::preprocessing::scaler::RobustScaler;
use crate::types::record::Record;
use crate::types::table::{ColumnKind, FeatureMatrix, Table};
use tracing::{debug, info, warn};

/// Encoded, scaled training features and their class codes
#[derive(Debug, Clone)]
pub struct TrainingData {
    pub x: FeatureMatrix,
    pub y: Vec<usize>,
}

/// Every fitted preprocessing artifact, owned by whoever trains or serves.
///
/// Stage order is identical on both paths:
/// capper → engineer → imputer → encoders → aligner → scaler.
#[derive(Debug, Clone, Default)]
pub struct PreprocessingContext {
    capper: OutlierCapper,
    engineer: FeatureEngineer,
    imputer: MedianImputer,
    registry: EncoderRegistry,
    aligner: FeatureAligner,
    schema: FeatureSchema,
    scaler: RobustScaler,
    target_column: String,
}

impl PreprocessingContext {
    /// Fit every stage on a training table and return the transformed data.
    ///
    /// Without a `target_column` the last column is the target.
    pub fn fit_transform(table: Table, target_column: Option<&str>) -> Result<(Self, TrainingData)> {
        if table.n_rows() == 0 || table.n_cols() == 0 {
            return Err(PipelineError::config("dataset is empty"));
        }

        let target_column = match target_column {
            Some(name) if table.contains(name) => name.to_string(),
            Some(name) => {
                return Err(PipelineError::config(format!(
                    "target column {} not found in dataset columns {:?}",
                    name,
                    table.column_names()
                )))
            }
            None => table.column_names().last().map(|s| s.to_string()).unwrap_or_default(),
        };

        let mut features = table;
        let target = features
            .remove_column(&target_column)
            .ok_or_else(|| PipelineError::config(format!("target column {} not found", target_column)))?;
        if features.n_cols() == 0 {
            return Err(PipelineError::config("dataset has no feature columns besides the target"));
        }

        let labels: Vec<Option<String>> = match target.kind() {
            ColumnKind::Numeric => target
                .as_numeric()
                .unwrap_or_default()
                .iter()
                .map(|v| v.map(crate::types::record::format_number))
                .collect(),
            ColumnKind::Categorical => target.as_categorical().unwrap_or_default().to_vec(),
        };

        let keep: Vec<usize> = labels
            .iter()
            .enumerate()
            .filter_map(|(i, l)| l.as_ref().map(|_| i))
            .collect();
        if keep.len() < labels.len() {
            warn!(
                dropped = labels.len() - keep.len(),
                target = %target_column,
                "Dropping rows with a missing target label"
            );
            features = features.select_rows(&keep);
        }
        let labels: Vec<String> = labels.into_iter().flatten().collect();
        if labels.is_empty() {
            return Err(PipelineError::config("target column has no labels"));
        }

        let mut ctx = PreprocessingContext {
            target_column,
            ..Default::default()
        };

        let table = ctx.capper.fit_transform(features)?;
        let table = ctx.engineer.transform(table)?;
        let table = ctx.imputer.fit_transform(table)?;
        ctx.schema = FeatureSchema::from_table(&table);
        let table = ctx.registry.fit_transform(table)?;
        let y = ctx.registry.fit_target(&labels)?;
        let table = ctx.aligner.align(table, &ctx.schema)?;
        let x = table.to_matrix(&ctx.schema.names())?;
        let x = ctx.scaler.fit_transform(x)?;

        info!(
            rows = x.n_rows(),
            features = ctx.schema.len(),
            categorical = ctx.schema.categorical().count(),
            classes = ctx.registry.target()?.len(),
            "Preprocessing fitted"
        );

        Ok((ctx, TrainingData { x, y }))
    }

    /// Reassemble a context from persisted artifacts.
    ///
    /// Validates that the pieces agree with each other and seeds "Unknown"
    /// into every feature encoder so that serving is read-only.
    pub fn from_parts(
        capper: OutlierCapper,
        imputer: MedianImputer,
        mut registry: EncoderRegistry,
        schema: FeatureSchema,
        scaler: RobustScaler,
        target_column: String,
    ) -> Result<Self> {
        if schema.is_empty() {
            return Err(PipelineError::config("feature schema is empty"));
        }
        scaler.validate()?;
        if scaler.feature_names() != schema.names().as_slice() {
            return Err(PipelineError::config(format!(
                "scaler was fit on {} features but the schema has {}",
                scaler.feature_names().len(),
                schema.len()
            )));
        }
        for name in schema.categorical() {
            if !registry.contains(name) {
                return Err(PipelineError::config(format!(
                    "categorical feature {} has no registered encoder",
                    name
                )));
            }
        }
        registry.target()?;

        let extended = registry.seal();
        if extended > 0 {
            debug!(extended, "Seeded Unknown class into loaded encoders");
        }

        Ok(Self {
            capper,
            engineer: FeatureEngineer::new(),
            imputer,
            registry,
            aligner: FeatureAligner::new(),
            schema,
            scaler,
            target_column,
        })
    }

    /// Run every stage in transform-only mode
    pub fn transform(&self, table: Table) -> Result<FeatureMatrix> {
        let table = self.coerce(table)?;
        let table = self.capper.transform(table)?;
        let table = self.engineer.transform(table)?;
        let table = self.imputer.transform(table)?;
        let table = table.map_columns(|column| match self.schema.kind(&column.name) {
            Some(ColumnKind::Categorical) => self.registry.encode_column(&column),
            _ => Ok(column),
        })?;
        let table = self.aligner.align(table, &self.schema)?;
        let x = table.to_matrix(&self.schema.names())?;
        self.scaler.transform(x)
    }

    /// Wrap records as a table and transform them
    pub fn transform_records(&self, records: &[Record]) -> Result<FeatureMatrix> {
        self.transform(Table::from_records(records))
    }

    /// Give known input columns the kind they had during training
    fn coerce(&self, table: Table) -> Result<Table> {
        table.map_columns(|column| match self.schema.kind(&column.name) {
            Some(ColumnKind::Categorical) => Ok(column.into_categorical()),
            Some(ColumnKind::Numeric) => column.into_numeric(),
            None => Ok(column),
        })
    }

    /// Class labels in code order
    pub fn class_labels(&self) -> Result<Vec<String>> {
        Ok(self.registry.target()?.classes().to_vec())
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    pub fn registry(&self) -> &EncoderRegistry {
        &self.registry
    }

    pub fn scaler(&self) -> &RobustScaler {
        &self.scaler
    }

    pub fn capper(&self) -> &OutlierCapper {
        &self.capper
    }

    pub fn imputer(&self) -> &MedianImputer {
        &self.imputer
    }

    pub fn target_column(&self) -> &str {
        &self.target_column
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preprocessing::encoding::UNKNOWN;
    use crate::preprocessing::features::{AGE_BP_INTERACTION, CARDIOVASCULAR_RISK};
    use crate::types::table::Column;

    fn training_table() -> Table {
        let n = 12;
        let age: Vec<Option<f64>> = (0..n).map(|i| Some(30.0 + 3.0 * i as f64)).collect();
        let bp: Vec<Option<f64>> = (0..n).map(|i| Some(110.0 + 5.0 * i as f64)).collect();
        let chol: Vec<Option<f64>> = (0..n).map(|i| Some(170.0 + 10.0 * i as f64)).collect();
        let glucose: Vec<Option<f64>> = (0..n).map(|i| Some(80.0 + 6.0 * i as f64)).collect();
        let gender: Vec<Option<String>> = (0..n)
            .map(|i| Some(if i % 2 == 0 { "F" } else { "M" }.to_string()))
            .collect();
        let diagnosis: Vec<Option<String>> = (0..n)
            .map(|i| Some(if i < 6 { "Healthy" } else { "AtRisk" }.to_string()))
            .collect();

        Table::new(vec![
            Column::numeric("Age", age),
            Column::numeric("BloodPressure", bp),
            Column::numeric("Cholesterol", chol),
            Column::numeric("Glucose", glucose),
            Column::categorical("Gender", gender),
            Column::categorical("diagnosis", diagnosis),
        ])
        .unwrap()
    }

    #[test]
    fn test_fit_freezes_engineered_schema() {
        let (ctx, data) = PreprocessingContext::fit_transform(training_table(), Some("diagnosis")).unwrap();

        let names = ctx.schema().names();
        assert_eq!(
            names,
            vec!["Age", "BloodPressure", "Cholesterol", "Glucose", "Gender", AGE_BP_INTERACTION, CARDIOVASCULAR_RISK]
        );
        assert_eq!(data.x.n_features(), names.len());
        assert_eq!(data.x.n_rows(), 12);
        assert_eq!(data.y.len(), 12);
        assert_eq!(ctx.class_labels().unwrap(), vec!["AtRisk".to_string(), "Healthy".to_string()]);
        assert!(ctx.registry().encoder("Gender").unwrap().has_unknown());
    }

    #[test]
    fn test_fit_is_deterministic() {
        let (a, da) = PreprocessingContext::fit_transform(training_table(), Some("diagnosis")).unwrap();
        let (b, db) = PreprocessingContext::fit_transform(training_table(), Some("diagnosis")).unwrap();
        assert_eq!(a.schema(), b.schema());
        assert_eq!(da.x, db.x);
    }

    #[test]
    fn test_last_column_is_default_target() {
        let (ctx, _) = PreprocessingContext::fit_transform(training_table(), None).unwrap();
        assert_eq!(ctx.target_column(), "diagnosis");
        assert!(!ctx.schema().contains("diagnosis"));
    }

    #[test]
    fn test_unknown_target_column_is_configuration_error() {
        let err = PreprocessingContext::fit_transform(training_table(), Some("outcome")).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_transform_partial_record_matches_schema() {
        let (ctx, _) = PreprocessingContext::fit_transform(training_table(), Some("diagnosis")).unwrap();
        let record = Record::new()
            .with("Age", 55.0)
            .with("BloodPressure", 150.0)
            .with("Gender", "Other")
            .with("Unrelated", "ignored");

        let x = ctx.transform_records(&[record]).unwrap();
        assert_eq!(x.feature_names(), ctx.schema().names().as_slice());
        assert_eq!(x.n_rows(), 1);
        assert!(x.row(0).iter().all(|v| v.is_finite()));

        let gender_code = ctx.registry().encode_value("Gender", "Other").unwrap();
        let unknown_code = ctx.registry().encode_value("Gender", UNKNOWN).unwrap();
        assert_eq!(gender_code, unknown_code);
    }

    #[test]
    fn test_transform_rejects_unparsable_numeric() {
        let (ctx, _) = PreprocessingContext::fit_transform(training_table(), Some("diagnosis")).unwrap();
        let record = Record::new().with("Age", "fifty");
        let err = ctx.transform_records(&[record]).unwrap_err();
        assert!(!err.is_configuration());
        assert!(err.to_string().contains("Age"));
    }

    #[test]
    fn test_from_parts_requires_encoders_for_categorical_features() {
        let (ctx, _) = PreprocessingContext::fit_transform(training_table(), Some("diagnosis")).unwrap();
        let mut registry = EncoderRegistry::new();
        registry.fit_target(&["AtRisk".to_string()]).unwrap();

        let err = PreprocessingContext::from_parts(
            ctx.capper().clone(),
            ctx.imputer().clone(),
            registry,
            ctx.schema().clone(),
            ctx.scaler().clone(),
            "diagnosis".to_string(),
        )
        .unwrap_err();
        assert!(err.is_configuration());
    }
}
