// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Error taxonomy for the benchmark harness
//!
//! Data, schema and configuration errors are fatal to a run. Training,
//! prediction and evaluation errors are contained per model by the harness.

use std::path::PathBuf;
use thiserror::Error;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, BenchError>;

#[derive(Error, Debug)]
pub enum BenchError {
    /// Invalid configuration, reported before any data is read
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unknown dataset schema '{0}'")]
    UnknownSchema(String),

    #[error("Unknown trainer '{0}'")]
    UnknownTrainer(String),

    /// Raw label value outside the declared two-token domain
    #[error("Unmapped label value '{value}' (expected '{positive}' or '{negative}')")]
    UnmappedLabel {
        value: String,
        positive: String,
        negative: String,
    },

    /// Malformed row, missing field or unparsable value
    #[error("Data error in {source_name} at row {row}: {message}")]
    Data {
        source_name: String,
        row: usize,
        message: String,
    },

    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Training failed: {0}")]
    Training(String),

    #[error("Prediction failed: {0}")]
    Prediction(String),

    #[error("Evaluation failed: {0}")]
    Evaluation(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A fatal error tagged with the harness stage it happened in
    #[error("{stage} stage failed: {source}")]
    Stage {
        stage: &'static str,
        #[source]
        source: Box<BenchError>,
    },
}

impl BenchError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn data(source_name: impl Into<String>, row: usize, msg: impl Into<String>) -> Self {
        Self::Data {
            source_name: source_name.into(),
            row,
            message: msg.into(),
        }
    }

    pub fn training(msg: impl Into<String>) -> Self {
        Self::Training(msg.into())
    }

    pub fn prediction(msg: impl Into<String>) -> Self {
        Self::Prediction(msg.into())
    }

    pub fn evaluation(msg: impl Into<String>) -> Self {
        Self::Evaluation(msg.into())
    }

    /// Attach the failing stage name to a fatal error
    pub fn at_stage(self, stage: &'static str) -> Self {
        Self::Stage {
            stage,
            source: Box::new(self),
        }
    }

    /// True for errors that abort a run when raised outside a single trainer
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Self::Training(_) | Self::Prediction(_) | Self::Evaluation(_)
        )
    }
}
