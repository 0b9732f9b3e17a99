// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Trainer capabilities and the ordered trainer registry
//!
//! Every learning algorithm is a leaf implementing [`Trainer`]; fitting yields
//! an opaque [`Model`]. A [`TrainerDescriptor`] pairs a trainer with its name
//! and whether its models produce calibrated probabilities.

use crate::classifiers::{
    DecisionTree, GaussianNaiveBayes, KNearestNeighbors, LinearSvm, LogisticRegression, Majority,
    RandomForest,
};
use crate::encoder::{EncodedDataset, FeatureVector};
use crate::error::{BenchError, Result};
use serde::{Deserialize, Serialize};

/// Output of a fitted model for one encoded record
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// Predicted canonical label
    pub label: bool,
    /// Raw decision value (probability, margin, ...)
    pub score: f64,
    /// P(positive), when the model is calibrated
    pub probability: Option<f64>,
}

impl Prediction {
    /// Thresholds a positive-class probability at 0.5
    pub fn from_probability(probability: f64) -> Self {
        Self {
            label: probability >= 0.5,
            score: probability,
            probability: Some(probability),
        }
    }

    /// Signed decision value without a probability interpretation
    pub fn from_margin(margin: f64) -> Self {
        Self {
            label: margin >= 0.0,
            score: margin,
            probability: None,
        }
    }
}

/// A fitted classifier
pub trait Model: Send + Sync {
    /// Predict a single encoded record
    fn predict(&self, features: &[f64]) -> Result<Prediction>;

    /// Predict every record of a partition
    fn predict_batch(&self, rows: &[FeatureVector]) -> Result<Vec<Prediction>> {
        rows.iter().map(|row| self.predict(row)).collect()
    }
}

/// A learning algorithm
pub trait Trainer: Send + Sync {
    /// Fit a new model; the trainer itself is never mutated
    fn fit(&self, data: &EncodedDataset) -> Result<Box<dyn Model>>;

    /// Get trainer description
    fn description(&self) -> &str;
}

/// Check a feature vector against the dimension a model was fit on
pub(crate) fn check_dimension(expected: usize, features: &[f64]) -> Result<()> {
    if features.len() != expected {
        return Err(BenchError::prediction(format!(
            "expected {} features, got {}",
            expected,
            features.len()
        )));
    }
    Ok(())
}

/// Immutable registry entry
pub struct TrainerDescriptor {
    name: String,
    calibrated: bool,
    trainer: Box<dyn Trainer>,
}

impl TrainerDescriptor {
    pub fn new(name: impl Into<String>, calibrated: bool, trainer: Box<dyn Trainer>) -> Self {
        Self {
            name: name.into(),
            calibrated,
            trainer,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether models from this trainer yield probabilities usable for AUC
    pub fn produces_calibrated_scores(&self) -> bool {
        self.calibrated
    }

    pub fn trainer(&self) -> &dyn Trainer {
        self.trainer.as_ref()
    }
}

impl std::fmt::Debug for TrainerDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrainerDescriptor")
            .field("name", &self.name)
            .field("calibrated", &self.calibrated)
            .finish()
    }
}

/// The built-in algorithm variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TrainerKind {
    LogisticRegression,
    GaussianNaiveBayes,
    DecisionTree,
    RandomForest,
    KNearestNeighbors,
    LinearSvm,
    Majority,
}

impl TrainerKind {
    pub const ALL: [TrainerKind; 7] = [
        TrainerKind::LogisticRegression,
        TrainerKind::GaussianNaiveBayes,
        TrainerKind::DecisionTree,
        TrainerKind::RandomForest,
        TrainerKind::KNearestNeighbors,
        TrainerKind::LinearSvm,
        TrainerKind::Majority,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            TrainerKind::LogisticRegression => "logistic-regression",
            TrainerKind::GaussianNaiveBayes => "gaussian-naive-bayes",
            TrainerKind::DecisionTree => "decision-tree",
            TrainerKind::RandomForest => "random-forest",
            TrainerKind::KNearestNeighbors => "k-nearest-neighbors",
            TrainerKind::LinearSvm => "linear-svm",
            TrainerKind::Majority => "majority",
        }
    }

    pub fn from_name(name: &str) -> Result<Self> {
        let wanted = name.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|kind| kind.name().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| BenchError::UnknownTrainer(wanted.to_string()))
    }

    /// Linear SVM margins are not probabilities; every other variant is calibrated
    pub fn calibrated(&self) -> bool {
        !matches!(self, TrainerKind::LinearSvm)
    }

    pub fn build(&self, seed: u64) -> Box<dyn Trainer> {
        match self {
            TrainerKind::LogisticRegression => Box::new(LogisticRegression::new()),
            TrainerKind::GaussianNaiveBayes => Box::new(GaussianNaiveBayes::new()),
            TrainerKind::DecisionTree => Box::new(DecisionTree::new()),
            TrainerKind::RandomForest => Box::new(RandomForest::new(seed)),
            TrainerKind::KNearestNeighbors => Box::new(KNearestNeighbors::new(5)),
            TrainerKind::LinearSvm => Box::new(LinearSvm::new(seed)),
            TrainerKind::Majority => Box::new(Majority),
        }
    }

    pub fn descriptor(&self, seed: u64) -> TrainerDescriptor {
        TrainerDescriptor::new(self.name(), self.calibrated(), self.build(seed))
    }
}

/// Ordered list of trainers to benchmark; order is preserved in the report
#[derive(Debug, Default)]
pub struct TrainerRegistry {
    descriptors: Vec<TrainerDescriptor>,
}

impl TrainerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every built-in variant in declaration order
    pub fn standard(seed: u64) -> Self {
        Self {
            descriptors: TrainerKind::ALL.iter().map(|k| k.descriptor(seed)).collect(),
        }
    }

    /// Built-in variants by name, in the given order
    pub fn from_names<S: AsRef<str>>(names: &[S], seed: u64) -> Result<Self> {
        let mut registry = Self::new();
        for name in names {
            let kind = TrainerKind::from_name(name.as_ref())?;
            registry.register(kind.descriptor(seed))?;
        }
        Ok(registry)
    }

    /// Append a descriptor; names must be unique
    pub fn register(&mut self, descriptor: TrainerDescriptor) -> Result<&mut Self> {
        if self.descriptors.iter().any(|d| d.name == descriptor.name) {
            return Err(BenchError::config(format!(
                "trainer '{}' registered twice",
                descriptor.name
            )));
        }
        self.descriptors.push(descriptor);
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TrainerDescriptor> {
        self.descriptors.iter()
    }

    pub fn names(&self) -> Vec<&str> {
        self.descriptors.iter().map(|d| d.name()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_registry_order() {
        let registry = TrainerRegistry::standard(42);
        assert_eq!(registry.len(), TrainerKind::ALL.len());
        assert_eq!(
            registry.names(),
            TrainerKind::ALL.iter().map(|k| k.name()).collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_from_names_keeps_order() {
        let registry =
            TrainerRegistry::from_names(&["majority", "Logistic-Regression"], 1).unwrap();
        assert_eq!(registry.names(), vec!["majority", "logistic-regression"]);
    }

    #[test]
    fn test_unknown_and_duplicate_names() {
        assert!(matches!(
            TrainerRegistry::from_names(&["xgboost"], 1),
            Err(BenchError::UnknownTrainer(_))
        ));
        assert!(matches!(
            TrainerRegistry::from_names(&["majority", "majority"], 1),
            Err(BenchError::Config(_))
        ));
    }

    #[test]
    fn test_calibration_tags() {
        let registry = TrainerRegistry::standard(0);
        for descriptor in registry.iter() {
            let expected = descriptor.name() != "linear-svm";
            assert_eq!(descriptor.produces_calibrated_scores(), expected);
        }
    }

    #[test]
    fn test_prediction_constructors() {
        let p = Prediction::from_probability(0.7);
        assert!(p.label);
        assert_eq!(p.probability, Some(0.7));

        let m = Prediction::from_margin(-0.3);
        assert!(!m.label);
        assert_eq!(m.probability, None);
    }
}
