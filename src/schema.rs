// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Record schemas for the supported tabular datasets
//!
//! A schema fixes the field order of every record, the kind of each field and
//! how the raw label column maps onto the canonical boolean label.

use crate::error::{BenchError, Result};
use crate::labels::{LabelMapping, RawLabel};
use serde::{Deserialize, Serialize};

/// How a field is encoded into features
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    /// Min-max normalized pass-through
    Numeric,
    /// One-hot expanded string token
    Categorical,
}

/// A single input column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub kind: FieldKind,
    /// Known levels of a categorical field (only used for synthetic data)
    #[serde(default)]
    pub levels: Vec<String>,
    /// Plausible range of a numeric field (only used for synthetic data)
    #[serde(default)]
    pub range: Option<(f64, f64)>,
}

impl FieldSpec {
    pub fn numeric(name: &str, low: f64, high: f64) -> Self {
        Self {
            name: name.to_string(),
            kind: FieldKind::Numeric,
            levels: vec![],
            range: Some((low, high)),
        }
    }

    pub fn categorical(name: &str, levels: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            kind: FieldKind::Categorical,
            levels: levels.iter().map(|l| l.to_string()).collect(),
            range: None,
        }
    }
}

/// Typed description of one dataset's rows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordSchema {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Feature fields in declared order
    pub fields: Vec<FieldSpec>,
    /// Column holding the raw label
    pub label_field: String,
    pub label_mapping: LabelMapping,
}

/// Raw value of one field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Numeric(f64),
    Categorical(String),
}

/// One immutable input row, values in schema field order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub values: Vec<FieldValue>,
    pub label: RawLabel,
}

impl Record {
    pub fn new(values: Vec<FieldValue>, label: RawLabel) -> Self {
        Self { values, label }
    }
}

impl RecordSchema {
    /// Ids of the schemas shipped with the crate
    pub const BUILTIN: &'static [&'static str] = &["thyroid-recurrence", "heart-disease"];

    /// Look up a built-in schema by id
    pub fn builtin(id: &str) -> Result<Self> {
        match id {
            "thyroid-recurrence" => Ok(Self::thyroid_recurrence()),
            "heart-disease" => Ok(Self::heart_disease()),
            other => Err(BenchError::UnknownSchema(other.to_string())),
        }
    }

    /// Differentiated thyroid cancer recurrence table (UCI 915).
    ///
    /// Header names are kept exactly as published, `Hx Radiothreapy` included.
    pub fn thyroid_recurrence() -> Self {
        Self {
            id: "thyroid-recurrence".to_string(),
            name: "Thyroid Cancer Recurrence".to_string(),
            description: "Recurrence of well-differentiated thyroid cancer after treatment"
                .to_string(),
            fields: vec![
                FieldSpec::numeric("Age", 15.0, 82.0),
                FieldSpec::categorical("Gender", &["F", "M"]),
                FieldSpec::categorical("Smoking", &["No", "Yes"]),
                FieldSpec::categorical("Hx Smoking", &["No", "Yes"]),
                FieldSpec::categorical("Hx Radiothreapy", &["No", "Yes"]),
                FieldSpec::categorical(
                    "Thyroid Function",
                    &[
                        "Euthyroid",
                        "Subclinical Hypothyroidism",
                        "Clinical Hypothyroidism",
                        "Subclinical Hyperthyroidism",
                        "Clinical Hyperthyroidism",
                    ],
                ),
                FieldSpec::categorical(
                    "Physical Examination",
                    &[
                        "Normal",
                        "Single nodular goiter-left",
                        "Single nodular goiter-right",
                        "Multinodular goiter",
                        "Diffuse goiter",
                    ],
                ),
                FieldSpec::categorical(
                    "Adenopathy",
                    &["No", "Left", "Right", "Bilateral", "Posterior", "Extensive"],
                ),
                FieldSpec::categorical(
                    "Pathology",
                    &["Micropapillary", "Papillary", "Follicular", "Hurthel cell"],
                ),
                FieldSpec::categorical("Focality", &["Uni-Focal", "Multi-Focal"]),
                FieldSpec::categorical("Risk", &["Low", "Intermediate", "High"]),
                FieldSpec::categorical("T", &["T1a", "T1b", "T2", "T3a", "T3b", "T4a", "T4b"]),
                FieldSpec::categorical("N", &["N0", "N1a", "N1b"]),
                FieldSpec::categorical("M", &["M0", "M1"]),
                FieldSpec::categorical("Stage", &["I", "II", "III", "IVA", "IVB"]),
                FieldSpec::categorical(
                    "Response",
                    &[
                        "Excellent",
                        "Indeterminate",
                        "Biochemical Incomplete",
                        "Structural Incomplete",
                    ],
                ),
            ],
            label_field: "Recurred".to_string(),
            label_mapping: LabelMapping::tokens("Yes", "No"),
        }
    }

    /// Cleveland heart disease data with a 0/1 target column
    pub fn heart_disease() -> Self {
        Self {
            id: "heart-disease".to_string(),
            name: "Heart Disease".to_string(),
            description: "Presence of heart disease from clinical measurements".to_string(),
            fields: vec![
                FieldSpec::numeric("age", 29.0, 77.0),
                FieldSpec::categorical("sex", &["0", "1"]),
                FieldSpec::categorical("cp", &["0", "1", "2", "3"]),
                FieldSpec::numeric("trestbps", 94.0, 200.0),
                FieldSpec::numeric("chol", 126.0, 564.0),
                FieldSpec::categorical("fbs", &["0", "1"]),
                FieldSpec::categorical("restecg", &["0", "1", "2"]),
                FieldSpec::numeric("thalach", 71.0, 202.0),
                FieldSpec::categorical("exang", &["0", "1"]),
                FieldSpec::numeric("oldpeak", 0.0, 6.2),
                FieldSpec::categorical("slope", &["0", "1", "2"]),
                FieldSpec::numeric("ca", 0.0, 4.0),
                FieldSpec::categorical("thal", &["0", "1", "2", "3"]),
            ],
            label_field: "target".to_string(),
            label_mapping: LabelMapping::binary(),
        }
    }

    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    /// Check the schema itself is usable
    pub fn validate(&self) -> Result<()> {
        if self.fields.is_empty() {
            return Err(BenchError::config(format!("schema '{}' declares no fields", self.id)));
        }
        let mut seen = std::collections::HashSet::new();
        for field in &self.fields {
            if !seen.insert(field.name.as_str()) {
                return Err(BenchError::config(format!(
                    "schema '{}' declares field '{}' twice",
                    self.id, field.name
                )));
            }
        }
        if seen.contains(self.label_field.as_str()) {
            return Err(BenchError::config(format!(
                "schema '{}' uses '{}' both as feature and label",
                self.id, self.label_field
            )));
        }
        Ok(())
    }

    /// Parse one raw cell according to the field kind
    pub fn parse_value(
        &self,
        field_idx: usize,
        raw: &str,
    ) -> std::result::Result<FieldValue, String> {
        let field = &self.fields[field_idx];
        let raw = raw.trim();
        match field.kind {
            FieldKind::Numeric => raw
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .map(FieldValue::Numeric)
                .ok_or_else(|| format!("field '{}' expects a number, got '{}'", field.name, raw)),
            FieldKind::Categorical => Ok(FieldValue::Categorical(raw.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_schemas_are_valid() {
        for id in RecordSchema::BUILTIN {
            let schema = RecordSchema::builtin(id).unwrap();
            assert_eq!(&schema.id, id);
            schema.validate().unwrap();
        }
    }

    #[test]
    fn test_unknown_schema() {
        assert!(matches!(
            RecordSchema::builtin("iris"),
            Err(BenchError::UnknownSchema(_))
        ));
    }

    #[test]
    fn test_duplicate_field_rejected() {
        let mut schema = RecordSchema::heart_disease();
        schema.fields.push(FieldSpec::numeric("age", 0.0, 1.0));
        assert!(schema.validate().is_err());
    }

    #[test]
    fn test_parse_value() {
        let schema = RecordSchema::heart_disease();
        assert_eq!(schema.parse_value(0, " 63 ").unwrap(), FieldValue::Numeric(63.0));
        assert_eq!(
            schema.parse_value(1, "1").unwrap(),
            FieldValue::Categorical("1".to_string())
        );
        assert!(schema.parse_value(0, "?").is_err());
    }
}
