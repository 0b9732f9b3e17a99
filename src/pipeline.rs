// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Reproducible benchmark pipeline
//!
//! Orchestrates:
//! - Configuration validation and dataset partitioning
//! - Label resolution and a single encoder fit on the training partition
//! - Per-trainer fit, predict and evaluate with failure isolation
//! - The ordered report consumed by the presentation layer

use crate::config::BenchmarkConfig;
use crate::datasets::{DatasetPartitioner, LabelDistribution, Partitions, SourceInfo};
use crate::encoder::{EncodedDataset, EncoderState, FeatureEncoder};
use crate::error::{BenchError, Result};
use crate::metrics::{self, EvaluationResult};
use crate::schema::{Record, RecordSchema};
use crate::trainers::{TrainerDescriptor, TrainerRegistry};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cell::Cell;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::time::Instant;

/// Stages of one harness run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HarnessStage {
    Idle,
    EncoderFit,
    PartitionEncoded,
    PerModel,
    Done,
}

impl HarnessStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            HarnessStage::Idle => "Idle",
            HarnessStage::EncoderFit => "EncoderFit",
            HarnessStage::PartitionEncoded => "PartitionEncoded",
            HarnessStage::PerModel => "PerModel",
            HarnessStage::Done => "Done",
        }
    }
}

impl fmt::Display for HarnessStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Step of a single trainer that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelStep {
    Fit,
    Predict,
    Evaluate,
}

/// A trainer that did not produce an evaluation result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelFailure {
    pub model_name: String,
    pub step: ModelStep,
    pub error: String,
}

/// Result of one registry entry, success or contained failure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ModelOutcome {
    Evaluated(EvaluationResult),
    Failed(ModelFailure),
}

impl ModelOutcome {
    pub fn model_name(&self) -> &str {
        match self {
            ModelOutcome::Evaluated(result) => &result.model_name,
            ModelOutcome::Failed(failure) => &failure.model_name,
        }
    }

    pub fn evaluation(&self) -> Option<&EvaluationResult> {
        match self {
            ModelOutcome::Evaluated(result) => Some(result),
            ModelOutcome::Failed(_) => None,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, ModelOutcome::Failed(_))
    }
}

/// Everything the harness produced in its terminal state
#[derive(Debug, Clone)]
pub struct HarnessRun {
    pub encoder: EncoderState,
    pub train_distribution: LabelDistribution,
    pub test_distribution: LabelDistribution,
    pub outcomes: Vec<ModelOutcome>,
}

/// Fits the encoder once, then benchmarks every registered trainer in order
pub struct BenchmarkHarness<'a> {
    schema: &'a RecordSchema,
    registry: &'a TrainerRegistry,
    stage: HarnessStage,
}

impl<'a> BenchmarkHarness<'a> {
    pub fn new(schema: &'a RecordSchema, registry: &'a TrainerRegistry) -> Self {
        Self {
            schema,
            registry,
            stage: HarnessStage::Idle,
        }
    }

    pub fn stage(&self) -> HarnessStage {
        self.stage
    }

    fn enter(&mut self, stage: HarnessStage) {
        tracing::debug!("Harness stage {} -> {}", self.stage, stage);
        self.stage = stage;
    }

    /// Run the full state machine over the given partitions.
    ///
    /// Data errors before training abort the run, tagged with the stage.
    /// Per-trainer errors become [`ModelOutcome::Failed`] entries.
    pub fn run(&mut self, partitions: &Partitions) -> Result<HarnessRun> {
        if self.registry.is_empty() {
            return Err(BenchError::config("trainer registry is empty"));
        }

        let schema = self.schema;
        self.enter(HarnessStage::EncoderFit);
        let stage = self.stage.as_str();
        let mapping = &schema.label_mapping;
        let train_labels = mapping
            .resolve_all(partitions.train.iter().map(|r| &r.label))
            .map_err(|e| e.at_stage(stage))?;
        let test_labels = mapping
            .resolve_all(partitions.test.iter().map(|r| &r.label))
            .map_err(|e| e.at_stage(stage))?;
        let encoder =
            FeatureEncoder::fit(schema, &partitions.train).map_err(|e| e.at_stage(stage))?;

        self.enter(HarnessStage::PartitionEncoded);
        let stage = self.stage.as_str();
        let train_distribution = LabelDistribution::of(&train_labels);
        let test_distribution = LabelDistribution::of(&test_labels);
        let encode = |records: &[Record], labels: Vec<bool>| -> Result<EncodedDataset> {
            EncodedDataset::new(encoder.apply(records)?, labels)
        };
        let train = encode(&partitions.train, train_labels).map_err(|e| e.at_stage(stage))?;
        let test = encode(&partitions.test, test_labels).map_err(|e| e.at_stage(stage))?;

        tracing::info!(
            "Encoded {} train / {} test records into {} features",
            train.len(),
            test.len(),
            encoder.dimension()
        );

        self.enter(HarnessStage::PerModel);
        let registry = self.registry;
        let outcomes: Vec<ModelOutcome> = registry
            .iter()
            .map(|descriptor| run_model(descriptor, &train, &test))
            .collect();

        self.enter(HarnessStage::Done);

        Ok(HarnessRun {
            encoder,
            train_distribution,
            test_distribution,
            outcomes,
        })
    }
}

/// Fit, predict and evaluate one trainer; never propagates its failure
fn run_model(
    descriptor: &TrainerDescriptor,
    train: &EncodedDataset,
    test: &EncodedDataset,
) -> ModelOutcome {
    let name = descriptor.name();
    tracing::info!("Benchmarking trainer: {}", name);
    let started = Instant::now();

    // Last step entered, so a panic is attributed to the right one
    let step = Cell::new(ModelStep::Fit);
    let attempt = panic::catch_unwind(AssertUnwindSafe(|| -> Result<EvaluationResult> {
        let model = descriptor.trainer().fit(train)?;
        step.set(ModelStep::Predict);
        let predictions = model.predict_batch(&test.features)?;
        step.set(ModelStep::Evaluate);
        metrics::evaluate(
            name,
            &predictions,
            &test.labels,
            descriptor.produces_calibrated_scores(),
        )
    }));

    let outcome = match attempt {
        Ok(Ok(result)) => {
            tracing::info!(
                "  {} - Accuracy: {}, F1: {}, AUC: {} ({} ms)",
                name,
                metrics::format_metric(result.accuracy),
                metrics::format_metric(result.f1),
                metrics::format_auc(result.auc),
                started.elapsed().as_millis()
            );
            ModelOutcome::Evaluated(result)
        }
        Ok(Err(error)) => {
            // Trainers are expected to raise model errors only
            if error.is_fatal() {
                tracing::error!("  {} raised a non-model error: {}", name, error);
            }
            ModelOutcome::Failed(ModelFailure {
                model_name: name.to_string(),
                step: step.get(),
                error: error.to_string(),
            })
        }
        Err(payload) => {
            let error = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "trainer panicked".to_string());
            ModelOutcome::Failed(ModelFailure {
                model_name: name.to_string(),
                step: step.get(),
                error: format!("panic: {}", error),
            })
        }
    };

    if let ModelOutcome::Failed(failure) = &outcome {
        tracing::warn!("  {} failed during {:?}: {}", name, failure.step, failure.error);
    }

    outcome
}

/// Dataset facts carried into the report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetInfo {
    pub schema_id: String,
    pub schema_name: String,
    pub split_mode: String,
    pub train_records: usize,
    pub test_records: usize,
    pub encoded_dimension: usize,
    pub feature_names: Vec<String>,
    pub train_distribution: LabelDistribution,
    pub test_distribution: LabelDistribution,
    pub sources: Vec<SourceInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkSummary {
    /// Highest F1 among evaluated models (first in registry order on ties)
    pub best_model: Option<String>,
    pub best_f1: Option<f64>,
    pub evaluated: usize,
    pub failed: usize,
}

impl BenchmarkSummary {
    pub fn from_outcomes(outcomes: &[ModelOutcome]) -> Self {
        let mut best: Option<&EvaluationResult> = None;
        for result in outcomes.iter().filter_map(ModelOutcome::evaluation) {
            if best.map_or(true, |b| result.f1 > b.f1) {
                best = Some(result);
            }
        }
        let failed = outcomes.iter().filter(|o| o.is_failure()).count();

        Self {
            best_model: best.map(|b| b.model_name.clone()),
            best_f1: best.map(|b| b.f1),
            evaluated: outcomes.len() - failed,
            failed,
        }
    }
}

/// Complete benchmark results, outcomes in registry order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkReport {
    pub config: BenchmarkConfig,
    pub dataset_info: DatasetInfo,
    pub outcomes: Vec<ModelOutcome>,
    pub summary: BenchmarkSummary,
    pub timestamp: DateTime<Utc>,
    pub version: String,
}

/// Main benchmark pipeline
pub struct BenchmarkPipeline {
    config: BenchmarkConfig,
    registry: Option<TrainerRegistry>,
}

impl BenchmarkPipeline {
    pub fn new(config: BenchmarkConfig) -> Self {
        Self {
            config,
            registry: None,
        }
    }

    /// Benchmark a caller-supplied registry instead of the configured names
    pub fn with_registry(config: BenchmarkConfig, registry: TrainerRegistry) -> Self {
        Self {
            config,
            registry: Some(registry),
        }
    }

    pub fn config(&self) -> &BenchmarkConfig {
        &self.config
    }

    /// Run the full benchmark pipeline
    pub fn run(&self) -> Result<BenchmarkReport> {
        let schema = self.config.schema()?;
        self.config.validate_split()?;
        let built;
        let registry = match &self.registry {
            Some(registry) if registry.is_empty() => {
                return Err(BenchError::config("trainer registry is empty"));
            }
            Some(registry) => registry,
            None => {
                built = self.config.registry()?;
                &built
            }
        };

        tracing::info!(
            "Benchmarking {} trainer(s) on schema '{}' ({} split, seed {})",
            registry.len(),
            schema.id,
            self.config.split_mode.name(),
            self.config.random_seed
        );

        let partitions = DatasetPartitioner::partition(
            &schema,
            &self.config.split_mode,
            self.config.random_seed,
        )
        .map_err(|e| e.at_stage("Partition"))?;

        self.run_on(&schema, registry, &partitions)
    }

    /// Run the harness on already partitioned records
    pub fn run_on(
        &self,
        schema: &RecordSchema,
        registry: &TrainerRegistry,
        partitions: &Partitions,
    ) -> Result<BenchmarkReport> {
        let mut harness = BenchmarkHarness::new(schema, registry);
        let run = harness.run(partitions)?;

        let dataset_info = DatasetInfo {
            schema_id: schema.id.clone(),
            schema_name: schema.name.clone(),
            split_mode: self.config.split_mode.name().to_string(),
            train_records: partitions.train.len(),
            test_records: partitions.test.len(),
            encoded_dimension: run.encoder.dimension(),
            feature_names: run.encoder.feature_names(),
            train_distribution: run.train_distribution,
            test_distribution: run.test_distribution,
            sources: partitions.sources.clone(),
        };

        let summary = BenchmarkSummary::from_outcomes(&run.outcomes);
        tracing::info!(
            "Benchmark done: {} evaluated, {} failed",
            summary.evaluated,
            summary.failed
        );

        // The registry that ran, not necessarily the configured names
        let mut config = self.config.clone();
        config.trainer_registry = registry.names().into_iter().map(String::from).collect();

        Ok(BenchmarkReport {
            config,
            dataset_info,
            outcomes: run.outcomes,
            summary,
            timestamp: Utc::now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasets::{RecordSource, SplitMode};
    use crate::encoder::FieldEncoding;
    use crate::labels::{LabelMapping, RawLabel};
    use crate::schema::{FieldSpec, FieldValue, Record};
    use crate::trainers::{Model, Prediction, Trainer, TrainerKind};

    fn age_schema() -> RecordSchema {
        RecordSchema {
            id: "ages".to_string(),
            name: "Ages".to_string(),
            description: String::new(),
            fields: vec![FieldSpec::numeric("age", 0.0, 100.0)],
            label_field: "label".to_string(),
            label_mapping: LabelMapping::binary(),
        }
    }

    fn age_records() -> Vec<Record> {
        [(50.0, 1.0), (30.0, 0.0), (70.0, 1.0), (40.0, 0.0)]
            .iter()
            .map(|&(age, label)| {
                Record::new(vec![FieldValue::Numeric(age)], RawLabel::Numeric(label))
            })
            .collect()
    }

    /// Predicts positive above a fixed encoded threshold
    struct Threshold(f64);

    impl Model for Threshold {
        fn predict(&self, features: &[f64]) -> crate::error::Result<Prediction> {
            Ok(Prediction::from_probability(if features[0] > self.0 { 1.0 } else { 0.0 }))
        }
    }

    struct ThresholdTrainer(f64);

    impl Trainer for ThresholdTrainer {
        fn fit(&self, _data: &EncodedDataset) -> crate::error::Result<Box<dyn Model>> {
            Ok(Box::new(Threshold(self.0)))
        }

        fn description(&self) -> &str {
            "fixed threshold"
        }
    }

    struct FailingTrainer;

    impl Trainer for FailingTrainer {
        fn fit(&self, _data: &EncodedDataset) -> crate::error::Result<Box<dyn Model>> {
            Err(BenchError::training("solver did not converge"))
        }

        fn description(&self) -> &str {
            "always fails"
        }
    }

    struct PanickingTrainer;

    impl Trainer for PanickingTrainer {
        fn fit(&self, _data: &EncodedDataset) -> crate::error::Result<Box<dyn Model>> {
            panic!("index out of bounds")
        }

        fn description(&self) -> &str {
            "panics"
        }
    }

    /// Fits fine, then panics on the first prediction
    struct PanicOnPredict;

    impl Model for PanicOnPredict {
        fn predict(&self, _features: &[f64]) -> crate::error::Result<Prediction> {
            panic!("weights vector is empty")
        }
    }

    struct PanicOnPredictTrainer;

    impl Trainer for PanicOnPredictTrainer {
        fn fit(&self, _data: &EncodedDataset) -> crate::error::Result<Box<dyn Model>> {
            Ok(Box::new(PanicOnPredict))
        }

        fn description(&self) -> &str {
            "panics when predicting"
        }
    }

    fn partitions(train: Vec<Record>, test: Vec<Record>) -> Partitions {
        Partitions {
            train,
            test,
            sources: vec![],
        }
    }

    #[test]
    fn test_age_threshold_scenario() {
        let schema = age_schema();
        let (train, test) = DatasetPartitioner::random_split(age_records(), 0.5, 17).unwrap();
        assert_eq!(train.len(), 2);
        assert_eq!(test.len(), 2);

        // Threshold of 45 years expressed in the encoder's normalized space
        let state = FeatureEncoder::fit(&schema, &train).unwrap();
        let threshold = match state.field("age").unwrap() {
            FieldEncoding::Numeric { min, max, .. } => (45.0 - min) / (max - min),
            _ => unreachable!(),
        };

        let mut registry = TrainerRegistry::new();
        registry
            .register(TrainerDescriptor::new(
                "age-threshold",
                true,
                Box::new(ThresholdTrainer(threshold)),
            ))
            .unwrap();

        let pipeline = BenchmarkPipeline::new(BenchmarkConfig::default());
        let report = pipeline.run_on(&schema, &registry, &partitions(train, test)).unwrap();

        let result = report.outcomes[0].evaluation().unwrap();
        assert_eq!(result.confusion_matrix.total(), 2);
        assert!((result.accuracy - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_failures_are_isolated_and_order_preserved() {
        let schema = age_schema();
        let mut registry = TrainerRegistry::new();
        registry
            .register(TrainerDescriptor::new("broken", true, Box::new(FailingTrainer)))
            .unwrap()
            .register(TrainerKind::Majority.descriptor(0))
            .unwrap()
            .register(TrainerDescriptor::new("panicky", false, Box::new(PanickingTrainer)))
            .unwrap()
            .register(TrainerKind::LogisticRegression.descriptor(0))
            .unwrap();

        let records = age_records();
        let mut harness = BenchmarkHarness::new(&schema, &registry);
        let run = harness.run(&partitions(records.clone(), records)).unwrap();

        assert_eq!(harness.stage(), HarnessStage::Done);
        let names: Vec<&str> = run.outcomes.iter().map(ModelOutcome::model_name).collect();
        assert_eq!(names, vec!["broken", "majority", "panicky", "logistic-regression"]);

        match &run.outcomes[0] {
            ModelOutcome::Failed(failure) => {
                assert_eq!(failure.step, ModelStep::Fit);
                assert!(failure.error.contains("did not converge"));
            }
            other => panic!("expected failure, got {:?}", other),
        }
        assert!(run.outcomes[2].is_failure());
        assert!(!run.outcomes[1].is_failure());
        assert!(!run.outcomes[3].is_failure());

        for outcome in &run.outcomes {
            if let Some(result) = outcome.evaluation() {
                assert_eq!(result.confusion_matrix.total(), 4);
            }
        }
    }

    #[test]
    fn test_panic_is_attributed_to_the_step_it_hit() {
        let schema = age_schema();
        let mut registry = TrainerRegistry::new();
        registry
            .register(TrainerDescriptor::new("fit-panic", false, Box::new(PanickingTrainer)))
            .unwrap()
            .register(TrainerDescriptor::new(
                "predict-panic",
                false,
                Box::new(PanicOnPredictTrainer),
            ))
            .unwrap();

        let records = age_records();
        let mut harness = BenchmarkHarness::new(&schema, &registry);
        let run = harness.run(&partitions(records.clone(), records)).unwrap();

        let failure = |i: usize| match &run.outcomes[i] {
            ModelOutcome::Failed(failure) => failure.clone(),
            other => panic!("expected failure, got {:?}", other),
        };
        assert_eq!(failure(0).step, ModelStep::Fit);
        let predict = failure(1);
        assert_eq!(predict.step, ModelStep::Predict);
        assert!(predict.error.contains("panic"));
        assert!(predict.error.contains("weights vector is empty"));
    }

    #[test]
    fn test_report_config_lists_the_registry_that_ran() {
        let config = BenchmarkConfig {
            trainer_registry: vec!["majority".to_string(), "linear-svm".to_string()],
            ..BenchmarkConfig::default()
        };
        let mut registry = TrainerRegistry::new();
        registry.register(TrainerKind::LogisticRegression.descriptor(0)).unwrap();

        let report = BenchmarkPipeline::with_registry(config, registry).run().unwrap();

        let names: Vec<&str> = report.outcomes.iter().map(ModelOutcome::model_name).collect();
        assert_eq!(names, vec!["logistic-regression"]);
        assert_eq!(report.config.trainer_registry, vec!["logistic-regression".to_string()]);
    }

    #[test]
    fn test_unmapped_label_aborts_before_training() {
        let schema = age_schema();
        let registry = TrainerRegistry::standard(0);
        let mut test = age_records();
        test.push(Record::new(vec![FieldValue::Numeric(20.0)], RawLabel::Numeric(2.0)));

        let mut harness = BenchmarkHarness::new(&schema, &registry);
        let err = harness.run(&partitions(age_records(), test)).unwrap_err();

        assert_eq!(harness.stage(), HarnessStage::EncoderFit);
        match err {
            BenchError::Stage { stage, source } => {
                assert_eq!(stage, "EncoderFit");
                assert!(matches!(*source, BenchError::UnmappedLabel { .. }));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_uncalibrated_trainer_reports_no_auc() {
        let config = BenchmarkConfig {
            trainer_registry: vec!["linear-svm".to_string(), "logistic-regression".to_string()],
            ..BenchmarkConfig::default()
        };
        let report = BenchmarkPipeline::new(config).run().unwrap();

        assert_eq!(report.outcomes.len(), 2);
        assert_eq!(report.outcomes[0].evaluation().unwrap().auc, None);
        let auc = report.outcomes[1].evaluation().unwrap().auc.unwrap();
        assert!((0.0..=1.0).contains(&auc));
    }

    #[test]
    fn test_pipeline_synthetic_all_trainers() {
        let report = BenchmarkPipeline::new(BenchmarkConfig::default()).run().unwrap();

        assert_eq!(report.outcomes.len(), TrainerKind::ALL.len());
        assert_eq!(report.dataset_info.train_records + report.dataset_info.test_records, 500);
        assert_eq!(report.dataset_info.test_records, 150);
        for outcome in &report.outcomes {
            let result = outcome.evaluation().expect("synthetic data should not fail");
            assert_eq!(result.confusion_matrix.total(), report.dataset_info.test_records);
            assert!((0.0..=1.0).contains(&result.accuracy));
            assert!((0.0..=1.0).contains(&result.f1));
        }
        assert!(report.summary.best_model.is_some());
        assert_eq!(report.summary.failed, 0);
    }

    #[test]
    fn test_pipeline_is_idempotent() {
        let config = BenchmarkConfig {
            dataset_schema: crate::config::SchemaRef::Builtin("thyroid-recurrence".to_string()),
            split_mode: SplitMode::Random {
                source: RecordSource::Synthetic { rows: 120 },
                test_fraction: 0.25,
            },
            random_seed: 99,
            ..BenchmarkConfig::default()
        };

        let first = BenchmarkPipeline::new(config.clone()).run().unwrap();
        let second = BenchmarkPipeline::new(config).run().unwrap();

        assert_eq!(first.outcomes, second.outcomes);
        assert_eq!(first.dataset_info, second.dataset_info);
    }

    #[test]
    fn test_config_errors_surface_before_loading() {
        let config = BenchmarkConfig {
            split_mode: SplitMode::Random {
                source: RecordSource::csv("/nonexistent/data.csv"),
                test_fraction: 1.2,
            },
            ..BenchmarkConfig::default()
        };
        // Bad fraction is reported, not the missing file
        assert!(matches!(
            BenchmarkPipeline::new(config).run(),
            Err(BenchError::Config(_))
        ));
    }

    #[test]
    fn test_summary_prefers_first_on_ties() {
        let result = |name: &str, f1: f64| {
            ModelOutcome::Evaluated(EvaluationResult {
                model_name: name.to_string(),
                accuracy: 0.5,
                auc: None,
                f1,
                precision: 0.5,
                recall: 0.5,
                confusion_matrix: Default::default(),
                support: 0,
            })
        };
        let outcomes = vec![
            result("a", 0.7),
            ModelOutcome::Failed(ModelFailure {
                model_name: "b".to_string(),
                step: ModelStep::Predict,
                error: "boom".to_string(),
            }),
            result("c", 0.7),
        ];
        let summary = BenchmarkSummary::from_outcomes(&outcomes);
        assert_eq!(summary.best_model.as_deref(), Some("a"));
        assert_eq!(summary.evaluated, 2);
        assert_eq!(summary.failed, 1);
    }
}
