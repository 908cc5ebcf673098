//! Columnar tables and schema-named feature matrices

use crate::error::{PipelineError, Result};
use crate::types::record::{parse_finite, FieldValue, Record};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Kind of a column: numeric measurement or categorical string
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnKind {
    Numeric,
    Categorical,
}

/// Cell storage of one column. `None` marks a missing cell.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    Numeric(Vec<Option<f64>>),
    Categorical(Vec<Option<String>>),
}

impl ColumnData {
    pub fn len(&self) -> usize {
        match self {
            ColumnData::Numeric(v) => v.len(),
            ColumnData::Categorical(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn kind(&self) -> ColumnKind {
        match self {
            ColumnData::Numeric(_) => ColumnKind::Numeric,
            ColumnData::Categorical(_) => ColumnKind::Categorical,
        }
    }
}

/// A named column
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub data: ColumnData,
}

impl Column {
    pub fn numeric(name: &str, values: Vec<Option<f64>>) -> Self {
        Self {
            name: name.to_string(),
            data: ColumnData::Numeric(values),
        }
    }

    pub fn categorical(name: &str, values: Vec<Option<String>>) -> Self {
        Self {
            name: name.to_string(),
            data: ColumnData::Categorical(values),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn kind(&self) -> ColumnKind {
        self.data.kind()
    }

    pub fn as_numeric(&self) -> Option<&[Option<f64>]> {
        match &self.data {
            ColumnData::Numeric(v) => Some(v),
            ColumnData::Categorical(_) => None,
        }
    }

    pub fn as_categorical(&self) -> Option<&[Option<String>]> {
        match &self.data {
            ColumnData::Categorical(v) => Some(v),
            ColumnData::Numeric(_) => None,
        }
    }

    /// Reinterpret a numeric column as categorical labels
    pub fn into_categorical(self) -> Self {
        match self.data {
            ColumnData::Numeric(values) => Column {
                name: self.name,
                data: ColumnData::Categorical(
                    values
                        .into_iter()
                        .map(|v| v.map(crate::types::record::format_number))
                        .collect(),
                ),
            },
            ColumnData::Categorical(_) => self,
        }
    }

    /// Parse a categorical column as numbers. Fails on the first unparsable cell.
    pub fn into_numeric(self) -> Result<Self> {
        match self.data {
            ColumnData::Categorical(values) => {
                let mut parsed = Vec::with_capacity(values.len());
                for value in values {
                    match value {
                        None => parsed.push(None),
                        Some(s) => {
                            let v = parse_finite(&s).ok_or_else(|| {
                                PipelineError::schema(format!(
                                    "column {} expects a finite number, got {:?}",
                                    self.name, s
                                ))
                            })?;
                            parsed.push(Some(v));
                        }
                    }
                }
                Ok(Column::numeric(&self.name, parsed))
            }
            ColumnData::Numeric(_) => Ok(self),
        }
    }
}

/// An ordered set of equally long named columns
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    columns: Vec<Column>,
    n_rows: usize,
}

impl Table {
    /// Build a table, checking that every column has the same length and a unique name
    pub fn new(columns: Vec<Column>) -> Result<Self> {
        let n_rows = columns.first().map(|c| c.len()).unwrap_or(0);
        let mut seen = BTreeSet::new();
        for column in &columns {
            if column.len() != n_rows {
                return Err(PipelineError::schema(format!(
                    "column {} has {} rows, expected {}",
                    column.name,
                    column.len(),
                    n_rows
                )));
            }
            if !seen.insert(column.name.as_str()) {
                return Err(PipelineError::schema(format!("duplicate column {}", column.name)));
            }
        }
        Ok(Self { columns, n_rows })
    }

    /// Table without columns but with a fixed row count
    pub fn with_rows(n_rows: usize) -> Self {
        Self {
            columns: Vec::new(),
            n_rows,
        }
    }

    /// Wrap records as a table.
    ///
    /// Columns appear in name order. A column is numeric when every present
    /// value reads as a number, otherwise categorical.
    pub fn from_records(records: &[Record]) -> Self {
        let names: BTreeSet<&String> = records.iter().flat_map(|r| r.iter().map(|(k, _)| k)).collect();

        let columns = names
            .into_iter()
            .map(|name| {
                let cells: Vec<Option<&FieldValue>> = records
                    .iter()
                    .map(|r| r.get(name).filter(|v| !v.is_missing()))
                    .collect();

                let numeric: Option<Vec<Option<f64>>> = cells
                    .iter()
                    .map(|cell| match cell {
                        None => Some(None),
                        Some(v) => v.as_number().map(Some),
                    })
                    .collect();

                match numeric {
                    Some(values) => Column::numeric(name, values),
                    None => Column::categorical(
                        name,
                        cells.iter().map(|cell| cell.and_then(|v| v.as_label())).collect(),
                    ),
                }
            })
            .collect();

        Self {
            columns,
            n_rows: records.len(),
        }
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn n_cols(&self) -> usize {
        self.columns.len()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    /// Numeric cells of a column, if present and numeric
    pub fn numeric(&self, name: &str) -> Option<&[Option<f64>]> {
        self.column(name).and_then(|c| c.as_numeric())
    }

    /// Insert a column, replacing a same-named column in place or appending
    pub fn set_column(&mut self, column: Column) -> Result<()> {
        if self.columns.is_empty() && self.n_rows == 0 {
            self.n_rows = column.len();
        }
        if column.len() != self.n_rows {
            return Err(PipelineError::schema(format!(
                "column {} has {} rows, expected {}",
                column.name,
                column.len(),
                self.n_rows
            )));
        }
        match self.columns.iter_mut().find(|c| c.name == column.name) {
            Some(slot) => *slot = column,
            None => self.columns.push(column),
        }
        Ok(())
    }

    pub fn remove_column(&mut self, name: &str) -> Option<Column> {
        let idx = self.columns.iter().position(|c| c.name == name)?;
        Some(self.columns.remove(idx))
    }

    /// Apply `f` to every column, rebuilding the table
    pub fn map_columns<F>(self, mut f: F) -> Result<Self>
    where
        F: FnMut(Column) -> Result<Column>,
    {
        let n_rows = self.n_rows;
        let columns = self.columns.into_iter().map(&mut f).collect::<Result<Vec<_>>>()?;
        let mut table = Table::new(columns)?;
        if table.columns.is_empty() {
            table.n_rows = n_rows;
        }
        Ok(table)
    }

    /// Keep only the given rows, in the given order
    pub fn select_rows(&self, indices: &[usize]) -> Self {
        let columns = self
            .columns
            .iter()
            .map(|c| Column {
                name: c.name.clone(),
                data: match &c.data {
                    ColumnData::Numeric(v) => ColumnData::Numeric(indices.iter().map(|&i| v[i]).collect()),
                    ColumnData::Categorical(v) => {
                        ColumnData::Categorical(indices.iter().map(|&i| v[i].clone()).collect())
                    }
                },
            })
            .collect();
        Self {
            columns,
            n_rows: indices.len(),
        }
    }

    /// Convert to a dense matrix over `feature_names`, in that order.
    ///
    /// Every named column must exist, be numeric and have no missing cell.
    pub fn to_matrix(&self, feature_names: &[String]) -> Result<FeatureMatrix> {
        let mut rows = vec![Vec::with_capacity(feature_names.len()); self.n_rows];
        for name in feature_names {
            let column = self
                .column(name)
                .ok_or_else(|| PipelineError::schema(format!("missing feature column {}", name)))?;
            let values = column
                .as_numeric()
                .ok_or_else(|| PipelineError::schema(format!("feature column {} is not numeric", name)))?;
            for (row, value) in rows.iter_mut().zip(values) {
                let v = value.ok_or_else(|| {
                    PipelineError::schema(format!("feature column {} has a missing value", name))
                })?;
                row.push(v);
            }
        }
        FeatureMatrix::new(feature_names.to_vec(), rows)
    }
}

/// Dense numeric rows whose positions are named by `feature_names`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureMatrix {
    feature_names: Vec<String>,
    rows: Vec<Vec<f64>>,
}

impl FeatureMatrix {
    pub fn new(feature_names: Vec<String>, rows: Vec<Vec<f64>>) -> Result<Self> {
        if let Some(bad) = rows.iter().position(|r| r.len() != feature_names.len()) {
            return Err(PipelineError::schema(format!(
                "row {} has {} values, expected {}",
                bad,
                rows[bad].len(),
                feature_names.len()
            )));
        }
        Ok(Self { feature_names, rows })
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn n_features(&self) -> usize {
        self.feature_names.len()
    }

    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    pub fn row(&self, i: usize) -> &[f64] {
        &self.rows[i]
    }

    pub(crate) fn rows_mut(&mut self) -> &mut [Vec<f64>] {
        &mut self.rows
    }

    /// Values of the `j`-th feature across all rows
    pub fn column_values(&self, j: usize) -> Vec<f64> {
        self.rows.iter().map(|r| r[j]).collect()
    }

    /// Subset of rows, keeping the feature names
    pub fn select(&self, indices: &[usize]) -> Self {
        Self {
            feature_names: self.feature_names.clone(),
            rows: indices.iter().map(|&i| self.rows[i].clone()).collect(),
        }
    }

    /// Fail unless this matrix is laid out exactly as `expected`
    pub fn ensure_schema(&self, expected: &[String]) -> Result<()> {
        if self.feature_names != expected {
            return Err(PipelineError::schema(format!(
                "feature layout mismatch: expected {} features {:?}, got {} features {:?}",
                expected.len(),
                expected,
                self.feature_names.len(),
                self.feature_names
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_rejects_ragged_columns() {
        let result = Table::new(vec![
            Column::numeric("Age", vec![Some(1.0), Some(2.0)]),
            Column::numeric("Glucose", vec![Some(1.0)]),
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_from_records_infers_kinds() {
        let records = vec![
            Record::new().with("Age", 50.0).with("Gender", "Male"),
            Record::new().with("Age", "61").with("Smoker", 1.0),
        ];
        let table = Table::from_records(&records);

        assert_eq!(table.n_rows(), 2);
        assert_eq!(table.column_names(), vec!["Age", "Gender", "Smoker"]);
        assert_eq!(table.numeric("Age").unwrap(), &[Some(50.0), Some(61.0)]);
        assert_eq!(table.column("Gender").unwrap().kind(), ColumnKind::Categorical);
        assert_eq!(table.numeric("Smoker").unwrap(), &[None, Some(1.0)]);
    }

    #[test]
    fn test_set_column_replaces_in_place() {
        let mut table = Table::new(vec![
            Column::numeric("a", vec![Some(1.0)]),
            Column::numeric("b", vec![Some(2.0)]),
        ])
        .unwrap();
        table.set_column(Column::numeric("a", vec![Some(9.0)])).unwrap();
        assert_eq!(table.column_names(), vec!["a", "b"]);
        assert_eq!(table.numeric("a").unwrap(), &[Some(9.0)]);
    }

    #[test]
    fn test_to_matrix_orders_by_names() {
        let table = Table::new(vec![
            Column::numeric("a", vec![Some(1.0), Some(2.0)]),
            Column::numeric("b", vec![Some(3.0), Some(4.0)]),
        ])
        .unwrap();
        let names = vec!["b".to_string(), "a".to_string()];
        let matrix = table.to_matrix(&names).unwrap();
        assert_eq!(matrix.rows(), &[vec![3.0, 1.0], vec![4.0, 2.0]]);
        assert!(matrix.ensure_schema(&names).is_ok());
        assert!(matrix.ensure_schema(&["a".to_string(), "b".to_string()]).is_err());
    }

    #[test]
    fn test_to_matrix_rejects_missing_values() {
        let table = Table::new(vec![Column::numeric("a", vec![Some(1.0), None])]).unwrap();
        assert!(table.to_matrix(&["a".to_string()]).is_err());
    }

    #[test]
    fn test_into_numeric_reports_bad_cell() {
        let column = Column::categorical("Age", vec![Some("40".into()), Some("old".into())]);
        let err = column.into_numeric().unwrap_err();
        assert!(err.to_string().contains("Age"));
    }

    #[test]
    fn test_into_numeric_rejects_non_finite() {
        for text in ["nan", "inf", "-infinity"] {
            let column = Column::categorical("Glucose", vec![Some("90".into()), Some(text.into())]);
            let err = column.into_numeric().unwrap_err();
            assert_eq!(err.kind(), crate::error::ErrorKind::Schema);
        }
    }
}
