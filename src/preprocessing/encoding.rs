//! Categorical label encoders and the registry that owns them

use crate::error::{PipelineError, Result};
use crate::types::table::{Column, ColumnData, Table};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

/// Fallback class for missing and unseen categorical values
pub const UNKNOWN: &str = "Unknown";

/// Registry key reserved for the target encoder
pub const TARGET_KEY: &str = "__target__";

/// Bijection between a closed set of string classes and dense codes `0..len`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "PersistedEncoder")]
pub struct LabelEncoder {
    classes: Vec<String>,
}

#[derive(Deserialize)]
struct PersistedEncoder {
    classes: Vec<String>,
}

impl TryFrom<PersistedEncoder> for LabelEncoder {
    type Error = PipelineError;

    fn try_from(persisted: PersistedEncoder) -> Result<Self> {
        Self::from_classes(persisted.classes)
    }
}

impl LabelEncoder {
    /// Learn the distinct values, coded in sorted order
    pub fn fit<'a, I>(values: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let distinct: BTreeSet<&str> = values.into_iter().collect();
        Self {
            classes: distinct.into_iter().map(str::to_string).collect(),
        }
    }

    /// Rebuild an encoder from persisted classes
    pub fn from_classes(classes: Vec<String>) -> Result<Self> {
        let distinct: BTreeSet<&String> = classes.iter().collect();
        if distinct.len() != classes.len() {
            return Err(PipelineError::config(format!("encoder classes are not unique: {:?}", classes)));
        }
        Ok(Self { classes })
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// Code of a known class
    pub fn code(&self, value: &str) -> Option<usize> {
        self.classes.iter().position(|c| c == value)
    }

    pub fn has_unknown(&self) -> bool {
        self.code(UNKNOWN).is_some()
    }

    /// Map a value to its code, falling back to the "Unknown" class
    pub fn encode(&self, value: &str) -> Result<usize> {
        self.code(value).or_else(|| self.code(UNKNOWN)).ok_or_else(|| {
            PipelineError::encoding(format!("value {:?} is unknown and the encoder has no {} class", value, UNKNOWN))
        })
    }

    /// Inverse mapping from code to class
    pub fn decode(&self, code: usize) -> Result<&str> {
        self.classes
            .get(code)
            .map(String::as_str)
            .ok_or_else(|| PipelineError::encoding(format!("code {} outside {} known classes", code, self.len())))
    }

    /// Append "Unknown" as a new class if absent.
    ///
    /// Existing codes never move. Returns whether the encoder changed; calling
    /// it again is a no-op. Not safe to run while other threads encode.
    pub fn ensure_unknown(&mut self) -> bool {
        if self.has_unknown() {
            return false;
        }
        self.classes.push(UNKNOWN.to_string());
        true
    }
}

/// Encoders for every categorical feature column, plus the target encoder
/// stored under [`TARGET_KEY`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EncoderRegistry {
    encoders: BTreeMap<String, LabelEncoder>,
}

impl EncoderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn encoder(&self, column: &str) -> Option<&LabelEncoder> {
        self.encoders.get(column)
    }

    pub fn contains(&self, column: &str) -> bool {
        self.encoders.contains_key(column)
    }

    /// Names of the registered feature columns (target excluded)
    pub fn feature_columns(&self) -> impl Iterator<Item = &str> {
        self.encoders.keys().map(String::as_str).filter(|k| *k != TARGET_KEY)
    }

    /// Fit encoders for categorical columns not yet registered, then encode
    /// every categorical column. New feature encoders are seeded with
    /// "Unknown" so the serving path never needs to extend them.
    pub fn fit_transform(&mut self, table: Table) -> Result<Table> {
        for column in table.columns() {
            let Some(values) = column.as_categorical() else {
                continue;
            };
            if column.name == TARGET_KEY {
                return Err(PipelineError::config(format!(
                    "column name {} is reserved for the target encoder",
                    TARGET_KEY
                )));
            }
            if self.encoders.contains_key(&column.name) {
                continue;
            }

            let mut encoder = LabelEncoder::fit(values.iter().map(|v| v.as_deref().unwrap_or(UNKNOWN)));
            encoder.ensure_unknown();
            debug!(column = %column.name, classes = encoder.len(), "Fitted label encoder");
            self.encoders.insert(column.name.clone(), encoder);
        }

        self.transform(table)
    }

    /// Encode every categorical column that has a registered encoder.
    ///
    /// Missing cells and values outside the known classes map to the
    /// "Unknown" code. Unregistered categorical columns are left as-is.
    pub fn transform(&self, table: Table) -> Result<Table> {
        table.map_columns(|column| {
            if column.name == TARGET_KEY || !self.encoders.contains_key(&column.name) {
                return Ok(column);
            }
            match column.data {
                ColumnData::Categorical(_) => self.encode_column(&column),
                ColumnData::Numeric(_) => Ok(column),
            }
        })
    }

    /// Encode one categorical column through its registered encoder
    pub fn encode_column(&self, column: &Column) -> Result<Column> {
        let encoder = self.require(&column.name)?;
        let values = column.as_categorical().ok_or_else(|| {
            PipelineError::schema(format!("column {} is not categorical", column.name))
        })?;

        let codes = values
            .iter()
            .map(|v| encoder.encode(v.as_deref().unwrap_or(UNKNOWN)).map(|c| Some(c as f64)))
            .collect::<Result<Vec<_>>>()?;
        Ok(Column::numeric(&column.name, codes))
    }

    /// Encode a single value of a registered column
    pub fn encode_value(&self, column: &str, value: &str) -> Result<usize> {
        self.require(column)?.encode(value)
    }

    fn require(&self, column: &str) -> Result<&LabelEncoder> {
        self.encoders
            .get(column)
            .ok_or_else(|| PipelineError::config(format!("no encoder registered for column {}", column)))
    }

    /// Fit the target encoder (if not yet registered) and encode the labels
    pub fn fit_target(&mut self, labels: &[String]) -> Result<Vec<usize>> {
        if !self.encoders.contains_key(TARGET_KEY) {
            let encoder = LabelEncoder::fit(labels.iter().map(String::as_str));
            debug!(classes = ?encoder.classes(), "Fitted target encoder");
            self.encoders.insert(TARGET_KEY.to_string(), encoder);
        }
        let target = self.target()?;
        labels
            .iter()
            .map(|l| {
                target
                    .code(l)
                    .ok_or_else(|| PipelineError::encoding(format!("target label {:?} was not seen during fit", l)))
            })
            .collect()
    }

    /// The target encoder, used to decode predicted class codes
    pub fn target(&self) -> Result<&LabelEncoder> {
        self.encoders
            .get(TARGET_KEY)
            .ok_or_else(|| PipelineError::config("target encoder is missing from the registry"))
    }

    /// Append "Unknown" to one feature encoder if absent. Idempotent.
    pub fn extend_unknown(&mut self, column: &str) -> Result<bool> {
        if column == TARGET_KEY {
            return Err(PipelineError::config("the target encoder never takes an Unknown class"));
        }
        let encoder = self
            .encoders
            .get_mut(column)
            .ok_or_else(|| PipelineError::config(format!("no encoder registered for column {}", column)))?;
        Ok(encoder.ensure_unknown())
    }

    /// Seed "Unknown" into every feature encoder so that serving never mutates
    /// the registry. Returns how many encoders had to be extended.
    pub fn seal(&mut self) -> usize {
        let mut extended = 0;
        for (name, encoder) in self.encoders.iter_mut() {
            if name != TARGET_KEY && encoder.ensure_unknown() {
                warn!(column = %name, "Encoder had no {} class, extended at load time", UNKNOWN);
                extended += 1;
            }
        }
        extended
    }

    /// Insert an encoder directly, replacing any previous one
    pub fn register(&mut self, column: &str, encoder: LabelEncoder) {
        self.encoders.insert(column.to_string(), encoder);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cat(name: &str, values: &[Option<&str>]) -> Column {
        Column::categorical(name, values.iter().map(|v| v.map(str::to_string)).collect())
    }

    #[test]
    fn test_label_encoder_codes_sorted_classes() {
        let encoder = LabelEncoder::fit(["Male", "Female", "Male"]);
        assert_eq!(encoder.classes(), &["Female".to_string(), "Male".to_string()]);
        assert_eq!(encoder.encode("Male").unwrap(), 1);
        assert_eq!(encoder.decode(0).unwrap(), "Female");
        assert!(encoder.decode(5).is_err());
    }

    #[test]
    fn test_unknown_extension_is_idempotent() {
        let mut encoder = LabelEncoder::fit(["Yes", "No"]);
        assert!(encoder.encode("Maybe").is_err());

        assert!(encoder.ensure_unknown());
        assert!(!encoder.ensure_unknown());
        assert_eq!(encoder.len(), 3);
        // existing codes keep their positions
        assert_eq!(encoder.encode("No").unwrap(), 0);
        assert_eq!(encoder.encode("Maybe").unwrap(), 2);
    }

    #[test]
    fn test_registry_round_trip_and_unknown_fallback() {
        let table = Table::new(vec![cat("Smoking", &[Some("Never"), Some("Current"), None])]).unwrap();
        let mut registry = EncoderRegistry::new();
        let encoded = registry.fit_transform(table).unwrap();

        let codes = encoded.numeric("Smoking").unwrap();
        let encoder = registry.encoder("Smoking").unwrap();
        assert_eq!(encoder.decode(codes[0].unwrap() as usize).unwrap(), "Never");
        assert_eq!(encoder.decode(codes[2].unwrap() as usize).unwrap(), UNKNOWN);

        let unseen = registry.encode_value("Smoking", "Former").unwrap();
        assert_eq!(encoder.decode(unseen).unwrap(), UNKNOWN);
    }

    #[test]
    fn test_registered_encoder_is_not_refit() {
        let mut registry = EncoderRegistry::new();
        registry
            .fit_transform(Table::new(vec![cat("Gender", &[Some("F")])]).unwrap())
            .unwrap();
        registry
            .fit_transform(Table::new(vec![cat("Gender", &[Some("M")])]).unwrap())
            .unwrap();

        let classes = registry.encoder("Gender").unwrap().classes();
        assert_eq!(classes, &["F".to_string(), UNKNOWN.to_string()]);
    }

    #[test]
    fn test_unregistered_column_is_configuration_error() {
        let registry = EncoderRegistry::new();
        let err = registry.encode_value("BloodType", "A").unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_target_round_trip() {
        let labels: Vec<String> = ["Healthy", "Diabetic", "Healthy"].iter().map(|s| s.to_string()).collect();
        let mut registry = EncoderRegistry::new();
        let codes = registry.fit_target(&labels).unwrap();

        let target = registry.target().unwrap();
        for (label, code) in labels.iter().zip(&codes) {
            assert_eq!(target.decode(*code).unwrap(), label);
        }
        assert!(!target.has_unknown());
        assert_eq!(registry.feature_columns().count(), 0);
    }

    #[test]
    fn test_seal_extends_legacy_encoders_once() {
        let mut registry = EncoderRegistry::new();
        registry.register("Gender", LabelEncoder::fit(["F", "M"]));
        registry.register(TARGET_KEY, LabelEncoder::fit(["A", "B"]));

        assert_eq!(registry.seal(), 1);
        assert_eq!(registry.seal(), 0);
        assert!(registry.encoder("Gender").unwrap().has_unknown());
        assert!(!registry.target().unwrap().has_unknown());
        assert!(!registry.extend_unknown("Gender").unwrap());
    }

    #[test]
    fn test_persisted_encoder_requires_unique_classes() {
        let registry: EncoderRegistry =
            serde_json::from_str(r#"{"Gender": {"classes": ["F", "M", "Unknown"]}}"#).unwrap();
        assert_eq!(registry.encoder("Gender").unwrap().encode("M").unwrap(), 1);

        let duplicated = serde_json::from_str::<EncoderRegistry>(r#"{"Gender": {"classes": ["F", "M", "F"]}}"#);
        assert!(duplicated.unwrap_err().to_string().contains("not unique"));
    }

    #[test]
    fn test_reserved_target_name_rejected() {
        let table = Table::new(vec![cat(TARGET_KEY, &[Some("x")])]).unwrap();
        assert!(EncoderRegistry::new().fit_transform(table).is_err());
    }
}
