//! CSV dataset loading

use crate::error::{PipelineError, Result};
use crate::types::record::parse_finite;
use crate::types::table::{Column, Table};
use csv::{ReaderBuilder, Trim};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use tracing::info;

/// Cell literals read as missing values, matched case-insensitively
pub const MISSING_LITERALS: [&str; 5] = ["", "NA", "NaN", "null", "None"];

/// Missing literals and non-finite numbers (`inf`, `-Infinity`) are both gaps
fn is_missing(cell: &str) -> bool {
    MISSING_LITERALS.iter().any(|m| m.eq_ignore_ascii_case(cell))
        || cell.parse::<f64>().is_ok_and(|v| !v.is_finite())
}

/// Load a headed CSV file into a table
pub fn load_csv<P: AsRef<Path>>(path: P) -> Result<Table> {
    let path = path.as_ref();
    let file = File::open(path)
        .map_err(|e| PipelineError::config(format!("cannot open dataset {}: {}", path.display(), e)))?;
    let table = read_csv(BufReader::new(file))?;

    info!(
        path = %path.display(),
        rows = table.n_rows(),
        columns = table.n_cols(),
        "Dataset loaded"
    );
    Ok(table)
}

/// Parse headed CSV. A column is numeric when every present cell parses as a
/// number, otherwise categorical.
pub fn read_csv<R: Read>(reader: R) -> Result<Table> {
    let mut reader = ReaderBuilder::new().has_headers(true).trim(Trim::All).from_reader(reader);

    let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    let mut cells: Vec<Vec<Option<String>>> = vec![Vec::new(); headers.len()];

    for result in reader.records() {
        let record = result?;
        for (column, value) in cells.iter_mut().zip(record.iter()) {
            column.push(if is_missing(value) { None } else { Some(value.to_string()) });
        }
    }

    let n_rows = cells.first().map_or(0, Vec::len);
    if headers.is_empty() || n_rows == 0 {
        return Err(PipelineError::config("dataset is empty"));
    }

    let columns = headers
        .iter()
        .zip(cells)
        .map(|(name, values)| {
            let column = Column::categorical(name, values);
            let all_numeric = column
                .as_categorical()
                .unwrap_or_default()
                .iter()
                .flatten()
                .all(|v| parse_finite(v).is_some());
            if all_numeric {
                column.into_numeric()
            } else {
                Ok(column)
            }
        })
        .collect::<Result<Vec<_>>>()?;

    Table::new(columns)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::table::ColumnKind;

    #[test]
    fn test_read_csv_infers_kinds_and_missing() {
        let data = "Age,Gender,Glucose,diagnosis\n50,F,110,Healthy\n61,M,NA,Diabetic\n,F,95,Healthy\n";
        let table = read_csv(data.as_bytes()).unwrap();

        assert_eq!(table.n_rows(), 3);
        assert_eq!(table.column_names(), vec!["Age", "Gender", "Glucose", "diagnosis"]);
        assert_eq!(table.numeric("Age").unwrap(), &[Some(50.0), Some(61.0), None]);
        assert_eq!(table.numeric("Glucose").unwrap(), &[Some(110.0), None, Some(95.0)]);
        assert_eq!(table.column("Gender").unwrap().kind(), ColumnKind::Categorical);
    }

    #[test]
    fn test_non_finite_cells_are_missing() {
        let data = "Age,Glucose\n50,nan\n61,INF\n70,-infinity\n45,n/a\n";
        let table = read_csv(data.as_bytes()).unwrap();

        assert_eq!(table.numeric("Age").unwrap(), &[Some(50.0), Some(61.0), Some(70.0), Some(45.0)]);
        // "n/a" is not a missing literal, so the column stays categorical
        assert_eq!(
            table.column("Glucose").unwrap().as_categorical().unwrap(),
            &[None, None, None, Some("n/a".to_string())]
        );

        let table = read_csv("Glucose,Cholesterol\nnan,NULL\n95,none\n".as_bytes()).unwrap();
        assert_eq!(table.numeric("Glucose").unwrap(), &[None, Some(95.0)]);
        assert_eq!(table.column("Cholesterol").unwrap().kind(), ColumnKind::Numeric);
    }

    #[test]
    fn test_header_only_is_configuration_error() {
        let err = read_csv("Age,diagnosis\n".as_bytes()).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_missing_file_is_configuration_error() {
        let err = load_csv("/nonexistent/patients.csv").unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_ragged_row_is_rejected() {
        assert!(read_csv("a,b\n1,2\n3\n".as_bytes()).is_err());
    }
}
