// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Benchmark harness for binary classifiers on tabular records
//!
//! This crate provides:
//! - Record schemas (built-in thyroid-recurrence and heart-disease, or inline)
//! - CSV and synthetic record sources, pre-split or seeded random partitioning
//! - A feature encoder fit once on the training partition (min-max, one-hot)
//! - An ordered registry of trainers with per-model failure isolation
//! - Metrics (Accuracy, Precision, Recall, F1, AUC for calibrated models)
//! - JSON, markdown and console reports

pub mod classifiers;
pub mod config;
pub mod datasets;
pub mod encoder;
pub mod error;
pub mod labels;
pub mod metrics;
pub mod pipeline;
pub mod report;
pub mod schema;
pub mod trainers;

pub use config::{BenchmarkConfig, SchemaRef};
pub use datasets::{DatasetPartitioner, Partitions, RecordSource, SplitMode};
pub use encoder::{EncodedDataset, EncoderState, FeatureEncoder, FeatureVector};
pub use error::{BenchError, Result};
pub use labels::{LabelMapping, RawLabel};
pub use metrics::{ConfusionMatrix, EvaluationResult};
pub use pipeline::{BenchmarkHarness, BenchmarkPipeline, BenchmarkReport, ModelOutcome};
pub use schema::{FieldKind, FieldSpec, FieldValue, Record, RecordSchema};
pub use trainers::{Model, Prediction, Trainer, TrainerDescriptor, TrainerKind, TrainerRegistry};
