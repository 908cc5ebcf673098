//! Patient report records as received by the inference entry point

use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single scalar cell of a report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// Numeric measurement (age, blood pressure, ...)
    Number(f64),
    /// Categorical value (gender, smoking status, ...)
    Text(String),
    /// Explicit null
    Missing,
}

impl FieldValue {
    /// Numeric view of the value. Text is parsed when it holds a finite
    /// number; `nan` and `inf` are not numbers here.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            FieldValue::Number(v) => Some(*v).filter(|v| v.is_finite()),
            FieldValue::Text(s) => parse_finite(s),
            FieldValue::Missing => None,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, FieldValue::Missing)
    }

    /// Render the value as a categorical label
    pub fn as_label(&self) -> Option<String> {
        match self {
            FieldValue::Number(v) => Some(format_number(*v)),
            FieldValue::Text(s) => Some(s.clone()),
            FieldValue::Missing => None,
        }
    }

    /// Convert a JSON scalar. Arrays and objects are rejected.
    pub fn from_json(name: &str, value: &serde_json::Value) -> Result<Self> {
        match value {
            serde_json::Value::Null => Ok(FieldValue::Missing),
            serde_json::Value::Bool(b) => Ok(FieldValue::Number(if *b { 1.0 } else { 0.0 })),
            serde_json::Value::Number(n) => n
                .as_f64()
                .map(FieldValue::Number)
                .ok_or_else(|| PipelineError::schema(format!("field {} is not a finite number", name))),
            serde_json::Value::String(s) => Ok(FieldValue::Text(s.clone())),
            serde_json::Value::Array(_) | serde_json::Value::Object(_) => Err(PipelineError::schema(
                format!("field {} must be a scalar value", name),
            )),
        }
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Number(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Text(v.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::Text(v)
    }
}

/// Parse a finite f64, rejecting the `nan`/`inf` spellings `str::parse` accepts
pub fn parse_finite(s: &str) -> Option<f64> {
    s.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Format a number as a label: integral values lose their fractional part.
pub fn format_number(v: f64) -> String {
    if v.is_finite() && v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{}", v as i64)
    } else {
        v.to_string()
    }
}

/// A patient report: feature name to scalar value
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
    fields: BTreeMap<String, FieldValue>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, name: &str, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(name.to_string(), value.into());
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<FieldValue>) {
        self.fields.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FieldValue)> {
        self.fields.iter()
    }

    /// Parse a JSON object into a record
    pub fn from_json(value: &serde_json::Value) -> Result<Self> {
        let object = value
            .as_object()
            .ok_or_else(|| PipelineError::schema("report must be a JSON object"))?;

        let mut record = Record::new();
        for (name, v) in object {
            record.insert(name.clone(), FieldValue::from_json(name, v)?);
        }
        Ok(record)
    }
}

impl FromIterator<(String, FieldValue)> for Record {
    fn from_iter<I: IntoIterator<Item = (String, FieldValue)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_from_json() {
        let record = Record::from_json(&json!({
            "Age": 55,
            "Gender": "Female",
            "Smoker": true,
            "BMI": null
        }))
        .unwrap();

        assert_eq!(record.len(), 4);
        assert_eq!(record.get("Age"), Some(&FieldValue::Number(55.0)));
        assert_eq!(record.get("Gender"), Some(&FieldValue::Text("Female".to_string())));
        assert_eq!(record.get("Smoker"), Some(&FieldValue::Number(1.0)));
        assert!(record.get("BMI").unwrap().is_missing());
    }

    #[test]
    fn test_record_rejects_nested_values() {
        let err = Record::from_json(&json!({"Age": [1, 2]})).unwrap_err();
        assert!(err.to_string().contains("Age"));

        assert!(Record::from_json(&json!([1, 2, 3])).is_err());
    }

    #[test]
    fn test_record_serialization() {
        let record = Record::new().with("Age", 40.0).with("Gender", "Male");
        let json = serde_json::to_string(&record).unwrap();
        let back: Record = serde_json::from_str(&json).unwrap();
        assert_eq!(record, back);
    }

    #[test]
    fn test_field_value_labels() {
        assert_eq!(FieldValue::Number(1.0).as_label().unwrap(), "1");
        assert_eq!(FieldValue::Number(2.5).as_label().unwrap(), "2.5");
        assert_eq!(FieldValue::Text("150".into()).as_number(), Some(150.0));
        assert_eq!(FieldValue::Text("high".into()).as_number(), None);
    }

    #[test]
    fn test_non_finite_values_are_not_numbers() {
        for text in ["nan", "NaN", "inf", "-Infinity"] {
            assert_eq!(FieldValue::Text(text.into()).as_number(), None, "{}", text);
        }
        assert_eq!(FieldValue::Number(f64::NAN).as_number(), None);
        assert_eq!(parse_finite(" 1e3 "), Some(1000.0));
    }
}
