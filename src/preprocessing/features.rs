//! Derived clinical features.
//!
//! The same derivations run during training and serving so the aligner sees
//! the same candidate columns on both paths.

use crate::error::Result;
use crate::types::table::{Column, Table};

pub const AGE: &str = "Age";
pub const BLOOD_PRESSURE: &str = "BloodPressure";
pub const BMI: &str = "BMI";
pub const CHOLESTEROL: &str = "Cholesterol";
pub const GLUCOSE: &str = "Glucose";

pub const AGE_BP_INTERACTION: &str = "Age_BP_Interaction";
pub const BMI_CHOLESTEROL_INTERACTION: &str = "BMI_Cholesterol_Interaction";
pub const CARDIOVASCULAR_RISK: &str = "Cardiovascular_Risk";

/// Cardiovascular risk thresholds (strictly greater than)
const BP_THRESHOLD: f64 = 140.0;
const CHOLESTEROL_THRESHOLD: f64 = 200.0;
const GLUCOSE_THRESHOLD: f64 = 100.0;

/// Appends interaction and risk-score columns when their source columns exist.
#[derive(Debug, Clone, Copy, Default)]
pub struct FeatureEngineer;

impl FeatureEngineer {
    pub fn new() -> Self {
        Self
    }

    /// Derive every feature whose numeric prerequisites are present.
    ///
    /// Derived columns are appended in a fixed order; a derived column that
    /// already exists in the input is overwritten in place.
    pub fn transform(&self, mut table: Table) -> Result<Table> {
        if let Some(column) = product(&table, AGE, BLOOD_PRESSURE, AGE_BP_INTERACTION) {
            table.set_column(column)?;
        }

        if let Some(column) = product(&table, BMI, CHOLESTEROL, BMI_CHOLESTEROL_INTERACTION) {
            table.set_column(column)?;
        }

        if let (Some(bp), Some(chol), Some(glucose)) = (
            table.numeric(BLOOD_PRESSURE),
            table.numeric(CHOLESTEROL),
            table.numeric(GLUCOSE),
        ) {
            // Missing cells never satisfy a condition
            let above = |v: Option<f64>, t: f64| v.map_or(0.0, |x| if x > t { 1.0 } else { 0.0 });
            let risk = bp
                .iter()
                .zip(chol)
                .zip(glucose)
                .map(|((&b, &c), &g)| {
                    Some(above(b, BP_THRESHOLD) + above(c, CHOLESTEROL_THRESHOLD) + above(g, GLUCOSE_THRESHOLD))
                })
                .collect();
            table.set_column(Column::numeric(CARDIOVASCULAR_RISK, risk))?;
        }

        Ok(table)
    }

    /// Names of every feature this stage can derive
    pub fn feature_names(&self) -> Vec<&'static str> {
        vec![AGE_BP_INTERACTION, BMI_CHOLESTEROL_INTERACTION, CARDIOVASCULAR_RISK]
    }
}

fn product(table: &Table, a: &str, b: &str, name: &str) -> Option<Column> {
    let (a, b) = (table.numeric(a)?, table.numeric(b)?);
    let values = a
        .iter()
        .zip(b)
        .map(|(x, y)| match (x, y) {
            (Some(x), Some(y)) => Some(x * y),
            _ => None,
        })
        .collect();
    Some(Column::numeric(name, values))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn num(name: &str, values: &[f64]) -> Column {
        Column::numeric(name, values.iter().map(|&v| Some(v)).collect())
    }

    #[test]
    fn test_derives_all_features() {
        let table = Table::new(vec![
            num(AGE, &[50.0, 30.0]),
            num(BLOOD_PRESSURE, &[150.0, 120.0]),
            num(BMI, &[30.0, 22.0]),
            num(CHOLESTEROL, &[250.0, 180.0]),
            num(GLUCOSE, &[90.0, 130.0]),
        ])
        .unwrap();

        let out = FeatureEngineer::new().transform(table).unwrap();

        assert_eq!(out.n_cols(), 8);
        assert_eq!(out.numeric(AGE_BP_INTERACTION).unwrap(), &[Some(7500.0), Some(3600.0)]);
        assert_eq!(out.numeric(BMI_CHOLESTEROL_INTERACTION).unwrap(), &[Some(7500.0), Some(3960.0)]);
        assert_eq!(out.numeric(CARDIOVASCULAR_RISK).unwrap(), &[Some(2.0), Some(1.0)]);
    }

    #[test]
    fn test_skips_features_without_prerequisites() {
        let table = Table::new(vec![num(AGE, &[50.0]), num(GLUCOSE, &[140.0])]).unwrap();
        let out = FeatureEngineer::new().transform(table).unwrap();

        assert_eq!(out.column_names(), vec![AGE, GLUCOSE]);
    }

    #[test]
    fn test_risk_score_range() {
        let table = Table::new(vec![
            num(BLOOD_PRESSURE, &[141.0, 140.0]),
            num(CHOLESTEROL, &[201.0, 200.0]),
            num(GLUCOSE, &[101.0, 100.0]),
        ])
        .unwrap();
        let out = FeatureEngineer::new().transform(table).unwrap();
        assert_eq!(out.numeric(CARDIOVASCULAR_RISK).unwrap(), &[Some(3.0), Some(0.0)]);
    }

    #[test]
    fn test_missing_cells_propagate() {
        let table = Table::new(vec![
            Column::numeric(AGE, vec![None]),
            num(BLOOD_PRESSURE, &[150.0]),
        ])
        .unwrap();
        let out = FeatureEngineer::new().transform(table).unwrap();
        assert_eq!(out.numeric(AGE_BP_INTERACTION).unwrap(), &[None]);
    }

    #[test]
    fn test_feature_names() {
        assert_eq!(FeatureEngineer::new().feature_names().len(), 3);
    }
}
