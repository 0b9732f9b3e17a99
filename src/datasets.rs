// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Record sources and train/test partitioning
//!
//! Two partitioning modes are supported and never mixed within a run:
//! - pre-split: separate training and test sources
//! - random: one source split by a test fraction under a fixed seed

use crate::error::{BenchError, Result};
use crate::schema::{FieldKind, FieldValue, Record, RecordSchema};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::PathBuf;

fn default_true() -> bool {
    true
}

/// Where records come from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RecordSource {
    /// Delimited text file, one record per row
    Csv {
        path: PathBuf,
        #[serde(default = "default_true")]
        has_headers: bool,
    },
    /// Generated records with a learnable signal, for development runs
    Synthetic { rows: usize },
}

impl RecordSource {
    pub fn csv(path: impl Into<PathBuf>) -> Self {
        RecordSource::Csv {
            path: path.into(),
            has_headers: true,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            RecordSource::Csv { path, .. } => path.display().to_string(),
            RecordSource::Synthetic { rows } => format!("synthetic({})", rows),
        }
    }

    /// Read every record of the source
    pub fn load(&self, schema: &RecordSchema, seed: u64) -> Result<LoadedSource> {
        match self {
            RecordSource::Csv { path, has_headers } => {
                let bytes = std::fs::read(path).map_err(|source| BenchError::Io {
                    path: path.clone(),
                    source,
                })?;
                let fingerprint = format!("{:x}", Sha256::digest(&bytes));
                let records = load_csv(schema, &self.describe(), bytes.as_slice(), *has_headers)?;
                tracing::info!(
                    "Loaded {} records from {} (sha256 {})",
                    records.len(),
                    path.display(),
                    &fingerprint[..12]
                );
                Ok(LoadedSource {
                    name: self.describe(),
                    records,
                    fingerprint: Some(fingerprint),
                })
            }
            RecordSource::Synthetic { rows } => {
                tracing::info!("Generating {} synthetic records (seed={})", rows, seed);
                Ok(LoadedSource {
                    name: self.describe(),
                    records: generate_synthetic(schema, *rows, seed),
                    fingerprint: None,
                })
            }
        }
    }
}

/// Records read from one source
#[derive(Debug, Clone)]
pub struct LoadedSource {
    pub name: String,
    pub records: Vec<Record>,
    /// SHA-256 of the raw file contents, when file backed
    pub fingerprint: Option<String>,
}

/// Parse delimited text into records.
///
/// With a header row, columns are matched by name; without one, the columns
/// are the schema fields in declared order followed by the label.
pub fn load_csv<R: std::io::Read>(
    schema: &RecordSchema,
    source_name: &str,
    reader: R,
    has_headers: bool,
) -> Result<Vec<Record>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(has_headers)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let (field_columns, label_column) = if has_headers {
        let headers = reader.headers()?.clone();
        let column_of = |name: &str| -> Result<usize> {
            headers
                .iter()
                .position(|h| h == name)
                .ok_or_else(|| {
                    BenchError::data(source_name, 0, format!("header has no column '{}'", name))
                })
        };
        let fields = schema
            .fields
            .iter()
            .map(|f| column_of(&f.name))
            .collect::<Result<Vec<_>>>()?;
        (fields, column_of(&schema.label_field)?)
    } else {
        ((0..schema.fields.len()).collect(), schema.fields.len())
    };

    let mut records = Vec::new();

    for (idx, result) in reader.records().enumerate() {
        let row = idx + 1;
        let raw = result?;

        let mut values = Vec::with_capacity(schema.fields.len());
        for (field_idx, (field, &column)) in schema.fields.iter().zip(&field_columns).enumerate() {
            let text = cell(&raw, column, &field.name, source_name, row)?;
            let value = schema
                .parse_value(field_idx, text)
                .map_err(|msg| BenchError::data(source_name, row, msg))?;
            values.push(value);
        }

        let label = schema
            .label_mapping
            .parse_raw(cell(&raw, label_column, &schema.label_field, source_name, row)?);

        records.push(Record::new(values, label));
    }

    Ok(records)
}

fn cell<'r>(
    raw: &'r csv::StringRecord,
    column: usize,
    name: &str,
    source_name: &str,
    row: usize,
) -> Result<&'r str> {
    match raw.get(column) {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(BenchError::data(source_name, row, format!("missing value for '{}'", name))),
    }
}

/// Generate records whose label correlates with every field.
///
/// Positive rows skew towards the top of numeric ranges and the second half of
/// categorical levels, so simple classifiers can learn something.
pub fn generate_synthetic(schema: &RecordSchema, rows: usize, seed: u64) -> Vec<Record> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let fallback_levels = vec!["a".to_string(), "b".to_string(), "c".to_string()];

    (0..rows)
        .map(|_| {
            let positive = rng.gen_bool(0.5);
            let values = schema
                .fields
                .iter()
                .map(|field| match field.kind {
                    FieldKind::Numeric => {
                        let (low, high) = field.range.unwrap_or((0.0, 100.0));
                        let u: f64 = rng.gen();
                        let frac = if positive { 0.35 + 0.65 * u } else { 0.65 * u };
                        FieldValue::Numeric(low + (high - low) * frac)
                    }
                    FieldKind::Categorical => {
                        let levels = if field.levels.is_empty() {
                            &fallback_levels
                        } else {
                            &field.levels
                        };
                        let half = (levels.len() / 2).max(1);
                        let idx = if rng.gen_bool(0.7) {
                            if positive && levels.len() > 1 {
                                rng.gen_range(half..levels.len())
                            } else {
                                rng.gen_range(0..half)
                            }
                        } else {
                            rng.gen_range(0..levels.len())
                        };
                        FieldValue::Categorical(levels[idx].clone())
                    }
                })
                .collect();

            let label = if positive {
                schema.label_mapping.positive_raw()
            } else {
                schema.label_mapping.negative_raw()
            };
            Record::new(values, label)
        })
        .collect()
}

/// Partitioning mode for one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum SplitMode {
    PreSplit {
        train: RecordSource,
        test: RecordSource,
    },
    Random {
        source: RecordSource,
        test_fraction: f64,
    },
}

impl SplitMode {
    pub fn name(&self) -> &'static str {
        match self {
            SplitMode::PreSplit { .. } => "pre-split",
            SplitMode::Random { .. } => "random",
        }
    }
}

/// Train and test records for one run
#[derive(Debug, Clone)]
pub struct Partitions {
    pub train: Vec<Record>,
    pub test: Vec<Record>,
    pub sources: Vec<SourceInfo>,
}

/// Provenance of a loaded source, carried into the report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceInfo {
    pub name: String,
    pub records: usize,
    pub fingerprint: Option<String>,
}

impl From<&LoadedSource> for SourceInfo {
    fn from(source: &LoadedSource) -> Self {
        Self {
            name: source.name.clone(),
            records: source.records.len(),
            fingerprint: source.fingerprint.clone(),
        }
    }
}

pub struct DatasetPartitioner;

impl DatasetPartitioner {
    /// Load the configured sources and produce train/test partitions
    pub fn partition(schema: &RecordSchema, mode: &SplitMode, seed: u64) -> Result<Partitions> {
        match mode {
            SplitMode::PreSplit { train, test } => {
                let train = train.load(schema, seed)?;
                // Distinct seed so synthetic train/test sources do not repeat rows
                let test = test.load(schema, seed.wrapping_add(1))?;
                let sources = vec![SourceInfo::from(&train), SourceInfo::from(&test)];
                Ok(Partitions {
                    train: train.records,
                    test: test.records,
                    sources,
                })
            }
            SplitMode::Random { source, test_fraction } => {
                let loaded = source.load(schema, seed)?;
                let sources = vec![SourceInfo::from(&loaded)];
                let (train, test) = Self::random_split(loaded.records, *test_fraction, seed)?;
                Ok(Partitions { train, test, sources })
            }
        }
    }

    /// Label-agnostic seeded split: `test = round(f * n)`, `train = n - test`.
    ///
    /// Both partitions keep the source order of their records.
    pub fn random_split(
        records: Vec<Record>,
        test_fraction: f64,
        seed: u64,
    ) -> Result<(Vec<Record>, Vec<Record>)> {
        if !(test_fraction > 0.0 && test_fraction < 1.0) {
            return Err(BenchError::config(format!(
                "test fraction must lie in (0, 1), got {}",
                test_fraction
            )));
        }

        let n = records.len();
        let test_size = (test_fraction * n as f64).round() as usize;

        let mut indices: Vec<usize> = (0..n).collect();
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        indices.shuffle(&mut rng);

        let mut in_test = vec![false; n];
        for &idx in &indices[..test_size] {
            in_test[idx] = true;
        }

        let mut train = Vec::with_capacity(n - test_size);
        let mut test = Vec::with_capacity(test_size);
        for (record, is_test) in records.into_iter().zip(in_test) {
            if is_test {
                test.push(record);
            } else {
                train.push(record);
            }
        }

        if train.is_empty() || test.is_empty() {
            return Err(BenchError::data(
                "random split",
                0,
                format!(
                    "{} records with test fraction {} leave an empty partition",
                    n, test_fraction
                ),
            ));
        }

        tracing::info!(
            "Random split (seed={}, f={}): train={}, test={}",
            seed,
            test_fraction,
            train.len(),
            test.len()
        );

        Ok((train, test))
    }
}

/// Positive/negative counts of a resolved partition
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelDistribution {
    pub positive: usize,
    pub negative: usize,
}

impl LabelDistribution {
    pub fn of(labels: &[bool]) -> Self {
        let positive = labels.iter().filter(|l| **l).count();
        Self {
            positive,
            negative: labels.len() - positive,
        }
    }

    pub fn total(&self) -> usize {
        self.positive + self.negative
    }
}
