//! Frozen feature schema and alignment of arbitrary inputs against it

use crate::error::{PipelineError, Result};
use crate::types::table::{Column, ColumnKind, Table};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::debug;

/// One feature of the schema and the kind it had before encoding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSpec {
    pub name: String,
    pub kind: ColumnKind,
}

/// Ordered feature names fixed at training time
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureSchema {
    features: Vec<FeatureSpec>,
}

impl FeatureSchema {
    pub fn new(features: Vec<FeatureSpec>) -> Result<Self> {
        let mut seen = BTreeSet::new();
        for f in &features {
            if !seen.insert(f.name.as_str()) {
                return Err(PipelineError::config(format!("duplicate feature {} in schema", f.name)));
            }
        }
        Ok(Self { features })
    }

    /// Freeze the columns of a table, in table order
    pub fn from_table(table: &Table) -> Self {
        Self {
            features: table
                .columns()
                .iter()
                .map(|c| FeatureSpec {
                    name: c.name.clone(),
                    kind: c.kind(),
                })
                .collect(),
        }
    }

    pub fn names(&self) -> Vec<String> {
        self.features.iter().map(|f| f.name.clone()).collect()
    }

    pub fn features(&self) -> &[FeatureSpec] {
        &self.features
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn kind(&self, name: &str) -> Option<ColumnKind> {
        self.features.iter().find(|f| f.name == name).map(|f| f.kind)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.kind(name).is_some()
    }

    pub fn categorical(&self) -> impl Iterator<Item = &str> {
        self.features
            .iter()
            .filter(|f| f.kind == ColumnKind::Categorical)
            .map(|f| f.name.as_str())
    }
}

/// Reconciles an input column set with the frozen schema.
///
/// Must run before scaling: scaler statistics are indexed by schema position.
#[derive(Debug, Clone, Copy, Default)]
pub struct FeatureAligner;

impl FeatureAligner {
    pub fn new() -> Self {
        Self
    }

    /// Return a table whose columns are exactly the schema, in schema order.
    ///
    /// Absent schema columns are synthesized as zeros; extra columns are
    /// dropped without error.
    pub fn align(&self, mut table: Table, schema: &FeatureSchema) -> Result<Table> {
        let n_rows = table.n_rows();
        let mut columns = Vec::with_capacity(schema.len());
        let mut filled = 0usize;

        for feature in schema.features() {
            match table.remove_column(&feature.name) {
                Some(column) => columns.push(column),
                None => {
                    filled += 1;
                    columns.push(Column::numeric(&feature.name, vec![Some(0.0); n_rows]));
                }
            }
        }

        if filled > 0 || table.n_cols() > 0 {
            debug!(
                filled,
                dropped = ?table.column_names(),
                "Aligned input against feature schema"
            );
        }

        let mut aligned = Table::with_rows(n_rows);
        for column in columns {
            aligned.set_column(column)?;
        }
        Ok(aligned)
    }

    /// Input columns the schema does not know, in input order
    pub fn extra_columns(&self, table: &Table, schema: &FeatureSchema) -> Vec<String> {
        table
            .column_names()
            .into_iter()
            .filter(|name| !schema.contains(name))
            .map(str::to_string)
            .collect()
    }
}
