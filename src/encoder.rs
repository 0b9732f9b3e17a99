// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Feature encoding shared by every trainer in a run
//!
//! The encoder is fit once on the training partition and the resulting
//! [`EncoderState`] is applied, unchanged, to both partitions:
//! - numeric fields: min-max normalization with training min/max
//! - categorical fields: one-hot over the training vocabulary (first-seen order)

use crate::error::{BenchError, Result};
use crate::schema::{FieldKind, FieldValue, Record, RecordSchema};
use std::collections::HashMap;

/// Encoded row, one value per feature dimension
pub type FeatureVector = Vec<f64>;

/// Fitted parameters of a single field
#[derive(Debug, Clone, PartialEq)]
pub enum FieldEncoding {
    Numeric {
        name: String,
        min: f64,
        max: f64,
    },
    Categorical {
        name: String,
        vocabulary: Vec<String>,
        index: HashMap<String, usize>,
    },
}

impl FieldEncoding {
    pub fn name(&self) -> &str {
        match self {
            FieldEncoding::Numeric { name, .. } | FieldEncoding::Categorical { name, .. } => name,
        }
    }

    /// Number of feature dimensions this field expands to
    pub fn width(&self) -> usize {
        match self {
            FieldEncoding::Numeric { .. } => 1,
            FieldEncoding::Categorical { vocabulary, .. } => vocabulary.len(),
        }
    }

    fn encode_into(
        &self,
        value: &FieldValue,
        out: &mut FeatureVector,
    ) -> std::result::Result<(), String> {
        match (self, value) {
            (FieldEncoding::Numeric { min, max, .. }, FieldValue::Numeric(x)) => {
                let span = max - min;
                // Degenerate field: every training value was equal
                if span == 0.0 {
                    out.push(0.0);
                } else {
                    // Out-of-range test values intentionally stay outside [0, 1]
                    out.push((x - min) / span);
                }
                Ok(())
            }
            (
                FieldEncoding::Categorical {
                    vocabulary, index, ..
                },
                FieldValue::Categorical(token),
            ) => {
                let start = out.len();
                out.resize(start + vocabulary.len(), 0.0);
                if let Some(&pos) = index.get(token) {
                    out[start + pos] = 1.0;
                }
                Ok(())
            }
            (encoding, value) => Err(format!(
                "field '{}' has an unexpected value {:?}",
                encoding.name(),
                value
            )),
        }
    }
}

/// Immutable output of [`FeatureEncoder::fit`]
#[derive(Debug, Clone, PartialEq)]
pub struct EncoderState {
    blocks: Vec<FieldEncoding>,
}

impl EncoderState {
    /// Total feature dimension after one-hot expansion
    pub fn dimension(&self) -> usize {
        self.blocks.iter().map(FieldEncoding::width).sum()
    }

    pub fn blocks(&self) -> &[FieldEncoding] {
        &self.blocks
    }

    /// Fitted parameters for a field, by name
    pub fn field(&self, name: &str) -> Option<&FieldEncoding> {
        self.blocks.iter().find(|b| b.name() == name)
    }

    /// Human readable name of every feature dimension (`age`, `menopause=premeno`, ...)
    pub fn feature_names(&self) -> Vec<String> {
        let mut names = Vec::with_capacity(self.dimension());
        for block in &self.blocks {
            match block {
                FieldEncoding::Numeric { name, .. } => names.push(name.clone()),
                FieldEncoding::Categorical { name, vocabulary, .. } => {
                    names.extend(vocabulary.iter().map(|v| format!("{}={}", name, v)));
                }
            }
        }
        names
    }

    /// Encode a single record
    pub fn encode(&self, record: &Record) -> std::result::Result<FeatureVector, String> {
        if record.values.len() != self.blocks.len() {
            return Err(format!(
                "expected {} fields, found {}",
                self.blocks.len(),
                record.values.len()
            ));
        }
        let mut out = Vec::with_capacity(self.dimension());
        for (block, value) in self.blocks.iter().zip(&record.values) {
            block.encode_into(value, &mut out)?;
        }
        Ok(out)
    }

    /// Encode a partition without re-estimating any parameter
    pub fn apply(&self, records: &[Record]) -> Result<Vec<FeatureVector>> {
        records
            .iter()
            .enumerate()
            .map(|(row, record)| {
                self.encode(record)
                    .map_err(|msg| BenchError::data("encoded partition", row, msg))
            })
            .collect()
    }
}

/// An encoded partition with its resolved labels, read-only for trainers
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedDataset {
    pub features: Vec<FeatureVector>,
    pub labels: Vec<bool>,
}

impl EncodedDataset {
    pub fn new(features: Vec<FeatureVector>, labels: Vec<bool>) -> Result<Self> {
        if features.len() != labels.len() {
            return Err(BenchError::data(
                "encoded partition",
                features.len().min(labels.len()),
                format!("{} feature rows but {} labels", features.len(), labels.len()),
            ));
        }
        Ok(Self { features, labels })
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Feature dimension (0 for an empty partition)
    pub fn dimension(&self) -> usize {
        self.features.first().map_or(0, Vec::len)
    }

    pub fn positives(&self) -> usize {
        self.labels.iter().filter(|l| **l).count()
    }
}

/// Estimates encoder parameters from a training partition
pub struct FeatureEncoder;

impl FeatureEncoder {
    pub fn fit(schema: &RecordSchema, training: &[Record]) -> Result<EncoderState> {
        if training.is_empty() {
            return Err(BenchError::data(
                "training partition",
                0,
                "cannot fit the encoder on an empty partition",
            ));
        }

        let mut blocks = Vec::with_capacity(schema.fields.len());

        for (idx, field) in schema.fields.iter().enumerate() {
            let block = match field.kind {
                FieldKind::Numeric => {
                    let mut min = f64::INFINITY;
                    let mut max = f64::NEG_INFINITY;
                    for (row, record) in training.iter().enumerate() {
                        match record.values.get(idx) {
                            Some(FieldValue::Numeric(x)) => {
                                min = min.min(*x);
                                max = max.max(*x);
                            }
                            _ => {
                                return Err(BenchError::data(
                                    "training partition",
                                    row,
                                    format!("field '{}' is not numeric", field.name),
                                ))
                            }
                        }
                    }
                    FieldEncoding::Numeric {
                        name: field.name.clone(),
                        min,
                        max,
                    }
                }
                FieldKind::Categorical => {
                    let mut vocabulary = Vec::new();
                    let mut index = HashMap::new();
                    for (row, record) in training.iter().enumerate() {
                        match record.values.get(idx) {
                            Some(FieldValue::Categorical(token)) => {
                                if !index.contains_key(token) {
                                    index.insert(token.clone(), vocabulary.len());
                                    vocabulary.push(token.clone());
                                }
                            }
                            _ => {
                                return Err(BenchError::data(
                                    "training partition",
                                    row,
                                    format!("field '{}' is not categorical", field.name),
                                ))
                            }
                        }
                    }
                    FieldEncoding::Categorical {
                        name: field.name.clone(),
                        vocabulary,
                        index,
                    }
                }
            };

            tracing::debug!("Encoder field '{}' -> {} dimension(s)", field.name, block.width());
            blocks.push(block);
        }

        Ok(EncoderState { blocks })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::labels::{LabelMapping, RawLabel};
    use crate::schema::FieldSpec;

    fn schema() -> RecordSchema {
        RecordSchema {
            id: "test".to_string(),
            name: "Test".to_string(),
            description: String::new(),
            fields: vec![
                FieldSpec::numeric("age", 0.0, 100.0),
                FieldSpec::categorical("color", &[]),
                FieldSpec::numeric("flat", 0.0, 1.0),
            ],
            label_field: "label".to_string(),
            label_mapping: LabelMapping::binary(),
        }
    }

    fn record(age: f64, color: &str, flat: f64) -> Record {
        Record::new(
            vec![
                FieldValue::Numeric(age),
                FieldValue::Categorical(color.to_string()),
                FieldValue::Numeric(flat),
            ],
            RawLabel::Numeric(0.0),
        )
    }

    fn training() -> Vec<Record> {
        vec![
            record(30.0, "red", 5.0),
            record(50.0, "blue", 5.0),
            record(70.0, "red", 5.0),
            record(40.0, "green", 5.0),
        ]
    }

    #[test]
    fn test_dimension_and_names() {
        let state = FeatureEncoder::fit(&schema(), &training()).unwrap();

        assert_eq!(state.dimension(), 1 + 3 + 1);
        assert_eq!(
            state.feature_names(),
            vec!["age", "color=red", "color=blue", "color=green", "flat"]
        );
    }

    #[test]
    fn test_training_values_in_unit_interval() {
        let train = training();
        let state = FeatureEncoder::fit(&schema(), &train).unwrap();
        let encoded = state.apply(&train).unwrap();

        for row in &encoded {
            assert!(row[0] >= 0.0 && row[0] <= 1.0);
            // Degenerate field is exactly zero
            assert_eq!(row[4], 0.0);
        }
        assert_eq!(encoded[0][0], 0.0);
        assert_eq!(encoded[2][0], 1.0);
        assert!((encoded[1][0] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_one_hot_first_seen_order() {
        let train = training();
        let state = FeatureEncoder::fit(&schema(), &train).unwrap();
        let encoded = state.apply(&train).unwrap();

        assert_eq!(&encoded[0][1..4], &[1.0, 0.0, 0.0]);
        assert_eq!(&encoded[1][1..4], &[0.0, 1.0, 0.0]);
        assert_eq!(&encoded[3][1..4], &[0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_test_partition_uses_training_parameters() {
        let state = FeatureEncoder::fit(&schema(), &training()).unwrap();
        let test = vec![record(90.0, "purple", 9.0), record(10.0, "blue", 5.0)];
        let encoded = state.apply(&test).unwrap();

        // Not clamped: 90 is above the training max of 70
        assert!((encoded[0][0] - 1.5).abs() < 1e-12);
        assert!((encoded[1][0] - (-0.5)).abs() < 1e-12);
        // Unseen category decodes to an all-zero block of training width
        assert_eq!(&encoded[0][1..4], &[0.0, 0.0, 0.0]);
        assert_eq!(&encoded[1][1..4], &[0.0, 1.0, 0.0]);
        assert_eq!(encoded[0].len(), state.dimension());
    }

    #[test]
    fn test_state_is_reusable() {
        let train = training();
        let state = FeatureEncoder::fit(&schema(), &train).unwrap();
        let first = state.apply(&train).unwrap();
        let second = state.apply(&train).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_empty_training_rejected() {
        assert!(FeatureEncoder::fit(&schema(), &[]).is_err());
    }

    #[test]
    fn test_kind_mismatch_rejected() {
        let bad = vec![Record::new(
            vec![
                FieldValue::Categorical("old".to_string()),
                FieldValue::Categorical("red".to_string()),
                FieldValue::Numeric(1.0),
            ],
            RawLabel::Numeric(1.0),
        )];
        assert!(FeatureEncoder::fit(&schema(), &bad).is_err());
    }
}
