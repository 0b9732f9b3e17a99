// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Benchmark configuration
//!
//! Loaded from a JSON file or assembled from CLI flags. Everything is validated
//! before any record is read.

use crate::datasets::{RecordSource, SplitMode};
use crate::error::{BenchError, Result};
use crate::schema::RecordSchema;
use crate::trainers::{TrainerKind, TrainerRegistry};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// A built-in schema id or a schema spelled out in the config file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SchemaRef {
    Builtin(String),
    Inline(RecordSchema),
}

impl SchemaRef {
    pub fn resolve(&self) -> Result<RecordSchema> {
        let schema = match self {
            SchemaRef::Builtin(id) => RecordSchema::builtin(id)?,
            SchemaRef::Inline(schema) => schema.clone(),
        };
        schema.validate()?;
        Ok(schema)
    }

    pub fn id(&self) -> &str {
        match self {
            SchemaRef::Builtin(id) => id,
            SchemaRef::Inline(schema) => &schema.id,
        }
    }
}

/// Configuration for one benchmark run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkConfig {
    /// Which record schema the sources follow
    pub dataset_schema: SchemaRef,
    /// Pre-split sources or one source split at random
    pub split_mode: SplitMode,
    /// Seed for random splitting, synthetic data and stochastic trainers
    #[serde(default = "default_seed")]
    pub random_seed: u64,
    /// Trainer names, benchmarked and reported in this order
    pub trainer_registry: Vec<String>,
}

fn default_seed() -> u64 {
    42
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            dataset_schema: SchemaRef::Builtin("heart-disease".to_string()),
            split_mode: SplitMode::Random {
                source: RecordSource::Synthetic { rows: 500 },
                test_fraction: 0.3,
            },
            random_seed: default_seed(),
            trainer_registry: TrainerKind::ALL.iter().map(|k| k.name().to_string()).collect(),
        }
    }
}

impl BenchmarkConfig {
    /// Load a JSON configuration file
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| BenchError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&text)?;
        tracing::info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Check every option; configuration errors are fatal at startup
    pub fn validate(&self) -> Result<()> {
        self.schema()?;
        self.registry()?;
        self.validate_split()
    }

    /// Check the partitioning options alone
    pub fn validate_split(&self) -> Result<()> {
        match &self.split_mode {
            SplitMode::Random { source, test_fraction } => {
                if !(*test_fraction > 0.0 && *test_fraction < 1.0) {
                    return Err(BenchError::config(format!(
                        "test_fraction must lie in (0, 1), got {}",
                        test_fraction
                    )));
                }
                validate_source(source)?;
            }
            SplitMode::PreSplit { train, test } => {
                validate_source(train)?;
                validate_source(test)?;
            }
        }

        Ok(())
    }

    pub fn schema(&self) -> Result<RecordSchema> {
        self.dataset_schema.resolve()
    }

    /// Build the ordered trainer registry
    pub fn registry(&self) -> Result<TrainerRegistry> {
        if self.trainer_registry.is_empty() {
            return Err(BenchError::config("trainer registry is empty"));
        }
        TrainerRegistry::from_names(&self.trainer_registry, self.random_seed)
    }
}

fn validate_source(source: &RecordSource) -> Result<()> {
    match source {
        RecordSource::Synthetic { rows: 0 } => {
            Err(BenchError::config("synthetic source needs at least one row"))
        }
        RecordSource::Csv { path, .. } if path.as_os_str().is_empty() => {
            Err(BenchError::config("CSV source path is empty"))
        }
        _ => Ok(()),
    }
}
