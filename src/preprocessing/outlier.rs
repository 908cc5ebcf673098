//! IQR-based outlier capping for numeric columns

use crate::error::Result;
use crate::preprocessing::stats::{quantile, sorted_present};
use crate::types::table::{Column, ColumnData, Table};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// Distance of the fences from the quartiles, in IQRs
pub const IQR_MULTIPLIER: f64 = 1.5;

/// Clipping fences of one numeric column
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OutlierBounds {
    pub lower: f64,
    pub upper: f64,
}

impl OutlierBounds {
    /// Fences `[Q1 - 1.5 IQR, Q3 + 1.5 IQR]` of sorted data
    pub fn from_sorted(sorted: &[f64]) -> Option<Self> {
        let q1 = quantile(sorted, 0.25)?;
        let q3 = quantile(sorted, 0.75)?;
        let iqr = q3 - q1;
        Some(Self {
            lower: q1 - IQR_MULTIPLIER * iqr,
            upper: q3 + IQR_MULTIPLIER * iqr,
        })
    }

    pub fn clip(&self, value: f64) -> f64 {
        value.clamp(self.lower, self.upper)
    }
}

/// Per-column outlier fences, fit once on training data.
///
/// Rows are never dropped: values outside the fences are clipped onto them.
/// Categorical columns and numeric columns without fitted bounds pass through.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OutlierCapper {
    bounds: BTreeMap<String, OutlierBounds>,
}

impl OutlierCapper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Learn fences for every numeric column, then clip the table with them
    pub fn fit_transform(&mut self, table: Table) -> Result<Table> {
        self.bounds = table
            .columns()
            .iter()
            .filter_map(|c| {
                let values = c.as_numeric()?;
                let bounds = OutlierBounds::from_sorted(&sorted_present(values))?;
                Some((c.name.clone(), bounds))
            })
            .collect();

        for (name, b) in &self.bounds {
            debug!(column = %name, lower = b.lower, upper = b.upper, "Fitted outlier bounds");
        }

        self.transform(table)
    }

    /// Clip numeric columns against the frozen training fences
    pub fn transform(&self, table: Table) -> Result<Table> {
        table.map_columns(|column| {
            let Some(bounds) = self.bounds.get(&column.name) else {
                return Ok(column);
            };
            Ok(match column.data {
                ColumnData::Numeric(values) => Column::numeric(
                    &column.name,
                    values.into_iter().map(|v| v.map(|x| bounds.clip(x))).collect(),
                ),
                data => Column {
                    name: column.name,
                    data,
                },
            })
        })
    }

    pub fn bounds(&self, column: &str) -> Option<&OutlierBounds> {
        self.bounds.get(column)
    }

    pub fn len(&self) -> usize {
        self.bounds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bounds.is_empty()
    }
}
