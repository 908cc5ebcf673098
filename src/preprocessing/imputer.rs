//! Median imputation of missing numeric cells

use crate::error::Result;
use crate::preprocessing::stats::{median, sorted_present};
use crate::types::table::{Column, ColumnData, Table};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Training-time medians per numeric column
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MedianImputer {
    medians: BTreeMap<String, f64>,
}

impl MedianImputer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the median of every numeric column and fill its gaps.
    ///
    /// A column with no observed values gets median 0.
    pub fn fit_transform(&mut self, table: Table) -> Result<Table> {
        self.medians = table
            .columns()
            .iter()
            .filter_map(|c| {
                let values = c.as_numeric()?;
                Some((c.name.clone(), median(&sorted_present(values)).unwrap_or(0.0)))
            })
            .collect();
        self.transform(table)
    }

    pub fn transform(&self, table: Table) -> Result<Table> {
        table.map_columns(|column| match (column.data, self.medians.get(&column.name)) {
            (ColumnData::Numeric(values), Some(&fill)) => Ok(Column::numeric(
                &column.name,
                values.into_iter().map(|v| Some(v.unwrap_or(fill))).collect(),
            )),
            (data, _) => Ok(Column {
                name: column.name,
                data,
            }),
        })
    }

    pub fn median(&self, column: &str) -> Option<f64> {
        self.medians.get(column).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fills_with_training_median() {
        let train = Table::new(vec![Column::numeric("BMI", vec![Some(20.0), None, Some(30.0), Some(24.0)])])
            .unwrap();
        let mut imputer = MedianImputer::new();
        let filled = imputer.fit_transform(train).unwrap();

        assert_eq!(imputer.median("BMI"), Some(24.0));
        assert_eq!(filled.numeric("BMI").unwrap()[1], Some(24.0));

        let serve = Table::new(vec![Column::numeric("BMI", vec![None])]).unwrap();
        assert_eq!(imputer.transform(serve).unwrap().numeric("BMI").unwrap(), &[Some(24.0)]);
    }

    #[test]
    fn test_all_missing_column_defaults_to_zero() {
        let train = Table::new(vec![Column::numeric("Glucose", vec![None, None])]).unwrap();
        let mut imputer = MedianImputer::new();
        let filled = imputer.fit_transform(train).unwrap();
        assert_eq!(filled.numeric("Glucose").unwrap(), &[Some(0.0), Some(0.0)]);
    }
}
