// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Evaluation metrics for binary classification
//!
//! Everything except AUC is derived from the confusion matrix:
//! - Accuracy, positive-class Precision, Recall and F1
//! - AUC-ROC, only for models producing calibrated probabilities

use crate::error::{BenchError, Result};
use crate::trainers::Prediction;
use serde::{Deserialize, Serialize};

/// 2x2 confusion matrix, indexed by (actual, predicted), negative first
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    /// Negative predicted as negative
    pub tn: usize,
    /// Negative predicted as positive
    pub fp: usize,
    /// Positive predicted as negative
    pub fn_: usize,
    /// Positive predicted as positive
    pub tp: usize,
}

impl ConfusionMatrix {
    /// Create from predicted and actual labels
    pub fn from_labels(predicted: &[bool], actual: &[bool]) -> Result<Self> {
        if predicted.len() != actual.len() {
            return Err(BenchError::evaluation(format!(
                "{} predictions for {} test records",
                predicted.len(),
                actual.len()
            )));
        }

        let mut matrix = Self::default();
        for (&pred, &truth) in predicted.iter().zip(actual) {
            matrix.record(truth, pred);
        }
        Ok(matrix)
    }

    pub fn record(&mut self, actual: bool, predicted: bool) {
        match (actual, predicted) {
            (false, false) => self.tn += 1,
            (false, true) => self.fp += 1,
            (true, false) => self.fn_ += 1,
            (true, true) => self.tp += 1,
        }
    }

    /// `cells()[actual][predicted]`, index 0 = negative, 1 = positive
    pub fn cells(&self) -> [[usize; 2]; 2] {
        [[self.tn, self.fp], [self.fn_, self.tp]]
    }

    pub fn cell(&self, actual: bool, predicted: bool) -> usize {
        self.cells()[actual as usize][predicted as usize]
    }

    /// Total number of samples
    pub fn total(&self) -> usize {
        self.tp + self.tn + self.fp + self.fn_
    }

    /// Accuracy: (TP + TN) / Total
    pub fn accuracy(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return f64::NAN;
        }
        (self.tp + self.tn) as f64 / total as f64
    }

    /// Precision: TP / (TP + FP), NaN when nothing was predicted positive
    pub fn precision(&self) -> f64 {
        ratio(self.tp, self.tp + self.fp)
    }

    /// Recall: TP / (TP + FN), NaN when the test set has no positives
    pub fn recall(&self) -> f64 {
        ratio(self.tp, self.tp + self.fn_)
    }

    /// Harmonic mean of precision and recall, 0 without true positives
    pub fn f1_score(&self) -> f64 {
        if self.tp == 0 {
            return 0.0;
        }
        let precision = self.precision();
        let recall = self.recall();
        2.0 * precision * recall / (precision + recall)
    }
}

fn ratio(num: usize, denom: usize) -> f64 {
    if denom == 0 {
        f64::NAN
    } else {
        num as f64 / denom as f64
    }
}

/// Serde adapter writing undefined ratios as the string `"NaN"`.
///
/// JSON has no NaN, and `null` is reserved for an absent AUC.
pub mod nan_as_string {
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_nan() {
            serializer.serialize_str("NaN")
        } else {
            serializer.serialize_f64(*value)
        }
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Number(f64),
        Text(String),
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        match Repr::deserialize(deserializer)? {
            Repr::Number(value) => Ok(value),
            Repr::Text(text) if text == "NaN" => Ok(f64::NAN),
            Repr::Text(text) => Err(de::Error::custom(format!(
                "expected a number or \"NaN\", got \"{}\"",
                text
            ))),
        }
    }
}

/// Metrics for one trained model on the test partition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub model_name: String,
    #[serde(with = "nan_as_string")]
    pub accuracy: f64,
    /// Present only for calibrated models
    pub auc: Option<f64>,
    #[serde(with = "nan_as_string")]
    pub f1: f64,
    #[serde(with = "nan_as_string")]
    pub precision: f64,
    #[serde(with = "nan_as_string")]
    pub recall: f64,
    pub confusion_matrix: ConfusionMatrix,
    pub support: usize,
}

/// Equal values, or both undefined
fn same_metric(a: f64, b: f64) -> bool {
    a == b || (a.is_nan() && b.is_nan())
}

// NaN marks an undefined ratio, so two undefined metrics compare equal
impl PartialEq for EvaluationResult {
    fn eq(&self, other: &Self) -> bool {
        self.model_name == other.model_name
            && same_metric(self.accuracy, other.accuracy)
            && match (self.auc, other.auc) {
                (Some(a), Some(b)) => same_metric(a, b),
                (None, None) => true,
                _ => false,
            }
            && same_metric(self.f1, other.f1)
            && same_metric(self.precision, other.precision)
            && same_metric(self.recall, other.recall)
            && self.confusion_matrix == other.confusion_matrix
            && self.support == other.support
    }
}

impl EvaluationResult {
    /// Format as a human-readable block
    pub fn format(&self) -> String {
        let cm = &self.confusion_matrix;
        format!(
            r#"{}
Accuracy:  {}
AUC:       {}
F1 Score:  {}
Precision: {}
Recall:    {}
Support:   {}

Confusion Matrix (rows = actual, columns = predicted):
              Negative  Positive
Negative      {:>8}  {:>8}
Positive      {:>8}  {:>8}
"#,
            self.model_name,
            format_metric(self.accuracy),
            format_auc(self.auc),
            format_metric(self.f1),
            format_metric(self.precision),
            format_metric(self.recall),
            self.support,
            cm.tn,
            cm.fp,
            cm.fn_,
            cm.tp,
        )
    }
}

/// Four decimals, or `NaN` for undefined ratios
pub fn format_metric(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else {
        format!("{:.4}", value)
    }
}

/// AUC value, or `N/A` when the model has no calibrated scores
pub fn format_auc(auc: Option<f64>) -> String {
    auc.map_or_else(|| "N/A".to_string(), format_metric)
}

/// Evaluate a model's test predictions against the resolved test labels
pub fn evaluate(
    model_name: &str,
    predictions: &[Prediction],
    actual: &[bool],
    calibrated: bool,
) -> Result<EvaluationResult> {
    let predicted: Vec<bool> = predictions.iter().map(|p| p.label).collect();
    let cm = ConfusionMatrix::from_labels(&predicted, actual)?;

    let auc = if calibrated {
        let probabilities = predictions
            .iter()
            .enumerate()
            .map(|(idx, p)| match p.probability {
                Some(prob) if prob.is_finite() => Ok(prob),
                Some(prob) => Err(BenchError::evaluation(format!(
                    "non-finite probability {} for test record {}",
                    prob, idx
                ))),
                None => Err(BenchError::evaluation(format!(
                    "calibrated model returned no probability for test record {}",
                    idx
                ))),
            })
            .collect::<Result<Vec<f64>>>()?;

        let auc = roc_auc(actual, &probabilities);
        if auc.is_none() {
            tracing::warn!("{}: AUC undefined, test partition contains a single class", model_name);
        }
        auc
    } else {
        None
    };

    Ok(EvaluationResult {
        model_name: model_name.to_string(),
        accuracy: cm.accuracy(),
        auc,
        f1: cm.f1_score(),
        precision: cm.precision(),
        recall: cm.recall(),
        support: cm.total(),
        confusion_matrix: cm,
    })
}

/// Area under the ROC curve via the rank-sum statistic (ties averaged).
///
/// Returns `None` when either class is absent.
pub fn roc_auc(actual: &[bool], scores: &[f64]) -> Option<f64> {
    let n_pos = actual.iter().filter(|l| **l).count();
    let n_neg = actual.len() - n_pos;
    if n_pos == 0 || n_neg == 0 || scores.len() != actual.len() {
        return None;
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));

    // 1-based ranks, tied scores share their average rank
    let mut ranks = vec![0.0; scores.len()];
    let mut start = 0;
    while start < order.len() {
        let mut end = start;
        while end + 1 < order.len() && scores[order[end + 1]] == scores[order[start]] {
            end += 1;
        }
        let avg_rank = (start + end) as f64 / 2.0 + 1.0;
        for &idx in &order[start..=end] {
            ranks[idx] = avg_rank;
        }
        start = end + 1;
    }

    let pos_rank_sum: f64 = ranks
        .iter()
        .zip(actual)
        .filter(|(_, &label)| label)
        .map(|(rank, _)| rank)
        .sum();

    let n_pos = n_pos as f64;
    let n_neg = n_neg as f64;
    Some((pos_rank_sum - n_pos * (n_pos + 1.0) / 2.0) / (n_pos * n_neg))
}
