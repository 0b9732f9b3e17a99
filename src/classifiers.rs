// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Concrete learning algorithms behind the trainer registry
//!
//! Implements:
//! - Logistic regression (batch gradient descent, L2)
//! - Gaussian naive Bayes
//! - CART decision tree (Gini) and a bagged random forest
//! - k-nearest neighbors (Euclidean, vote fraction)
//! - Linear SVM (Pegasos SGD, uncalibrated margins)
//! - Majority class baseline
//!
//! All of them work on the encoded, min-max normalized feature vectors.

use crate::encoder::EncodedDataset;
use crate::error::{BenchError, Result};
use crate::trainers::{check_dimension, Model, Prediction, Trainer};
use rand::seq::{index, SliceRandom};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

fn require_samples(data: &EncodedDataset) -> Result<()> {
    if data.is_empty() {
        return Err(BenchError::training("cannot fit with zero samples"));
    }
    Ok(())
}

fn dot(weights: &[f64], features: &[f64]) -> f64 {
    weights.iter().zip(features).map(|(w, x)| w * x).sum()
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

// ---------------------------------------------------------------------------
// Logistic regression
// ---------------------------------------------------------------------------

/// Logistic regression with sigmoid activation and binary cross-entropy loss
#[derive(Debug, Clone)]
pub struct LogisticRegression {
    learning_rate: f64,
    max_iter: usize,
    l2: f64,
    tol: f64,
}

impl LogisticRegression {
    pub fn new() -> Self {
        Self {
            learning_rate: 0.5,
            max_iter: 2000,
            l2: 1e-4,
            tol: 1e-6,
        }
    }

    pub fn with_learning_rate(mut self, lr: f64) -> Self {
        self.learning_rate = lr;
        self
    }

    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }
}

impl Default for LogisticRegression {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone)]
struct LogisticModel {
    weights: Vec<f64>,
    intercept: f64,
}

impl Model for LogisticModel {
    fn predict(&self, features: &[f64]) -> Result<Prediction> {
        check_dimension(self.weights.len(), features)?;
        Ok(Prediction::from_probability(sigmoid(
            self.intercept + dot(&self.weights, features),
        )))
    }
}

impl Trainer for LogisticRegression {
    fn fit(&self, data: &EncodedDataset) -> Result<Box<dyn Model>> {
        require_samples(data)?;

        let n = data.len() as f64;
        let dim = data.dimension();
        let mut model = LogisticModel {
            weights: vec![0.0; dim],
            intercept: 0.0,
        };

        for _ in 0..self.max_iter {
            let mut grad = vec![0.0; dim];
            let mut grad_intercept = 0.0;

            for (row, &label) in data.features.iter().zip(&data.labels) {
                let p = sigmoid(model.intercept + dot(&model.weights, row));
                let error = p - if label { 1.0 } else { 0.0 };
                grad_intercept += error;
                for (g, x) in grad.iter_mut().zip(row) {
                    *g += error * x;
                }
            }

            grad_intercept /= n;
            for (g, w) in grad.iter_mut().zip(&model.weights) {
                *g = *g / n + self.l2 * w;
            }

            model.intercept -= self.learning_rate * grad_intercept;
            for (w, g) in model.weights.iter_mut().zip(&grad) {
                *w -= self.learning_rate * g;
            }

            if grad_intercept.abs() < self.tol && grad.iter().all(|g| g.abs() < self.tol) {
                break;
            }
        }

        if !model.intercept.is_finite() || model.weights.iter().any(|w| !w.is_finite()) {
            return Err(BenchError::training("logistic regression diverged"));
        }

        Ok(Box::new(model))
    }

    fn description(&self) -> &str {
        "Logistic regression trained by batch gradient descent"
    }
}

// ---------------------------------------------------------------------------
// Gaussian naive Bayes
// ---------------------------------------------------------------------------

/// Gaussian naive Bayes with per-class feature means and variances
#[derive(Debug, Clone)]
pub struct GaussianNaiveBayes {
    var_smoothing: f64,
}

impl GaussianNaiveBayes {
    pub fn new() -> Self {
        Self { var_smoothing: 1e-9 }
    }

    pub fn with_var_smoothing(mut self, var_smoothing: f64) -> Self {
        self.var_smoothing = var_smoothing;
        self
    }
}

impl Default for GaussianNaiveBayes {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone)]
struct ClassStats {
    log_prior: f64,
    means: Vec<f64>,
    variances: Vec<f64>,
}

impl ClassStats {
    fn log_likelihood(&self, features: &[f64]) -> f64 {
        let mut ll = self.log_prior;
        for ((x, mean), var) in features.iter().zip(&self.means).zip(&self.variances) {
            ll -= 0.5 * ((2.0 * std::f64::consts::PI * var).ln() + (x - mean).powi(2) / var);
        }
        ll
    }
}

#[derive(Debug, Clone)]
struct NaiveBayesModel {
    negative: ClassStats,
    positive: ClassStats,
}

impl Model for NaiveBayesModel {
    fn predict(&self, features: &[f64]) -> Result<Prediction> {
        check_dimension(self.positive.means.len(), features)?;
        let pos = self.positive.log_likelihood(features);
        let neg = self.negative.log_likelihood(features);
        // log-sum-exp for P(positive | x)
        let max = pos.max(neg);
        let pos_exp = (pos - max).exp();
        let neg_exp = (neg - max).exp();
        Ok(Prediction::from_probability(pos_exp / (pos_exp + neg_exp)))
    }
}

impl Trainer for GaussianNaiveBayes {
    fn fit(&self, data: &EncodedDataset) -> Result<Box<dyn Model>> {
        require_samples(data)?;

        let dim = data.dimension();
        let n = data.len() as f64;

        // Largest feature variance scales the smoothing term
        let mut max_var: f64 = 0.0;
        for j in 0..dim {
            let mean = data.features.iter().map(|r| r[j]).sum::<f64>() / n;
            let var = data.features.iter().map(|r| (r[j] - mean).powi(2)).sum::<f64>() / n;
            max_var = max_var.max(var);
        }
        let epsilon = self.var_smoothing * max_var.max(1.0);

        let stats_for = |class: bool| -> Result<ClassStats> {
            let rows: Vec<&Vec<f64>> = data
                .features
                .iter()
                .zip(&data.labels)
                .filter(|(_, &label)| label == class)
                .map(|(row, _)| row)
                .collect();
            if rows.is_empty() {
                return Err(BenchError::training(format!(
                    "{} class absent from training partition",
                    if class { "positive" } else { "negative" }
                )));
            }

            let count = rows.len() as f64;
            let mut means = vec![0.0; dim];
            for row in &rows {
                for (m, x) in means.iter_mut().zip(row.iter()) {
                    *m += x;
                }
            }
            for m in &mut means {
                *m /= count;
            }

            let mut variances = vec![0.0; dim];
            for row in &rows {
                for ((v, x), m) in variances.iter_mut().zip(row.iter()).zip(&means) {
                    *v += (x - m).powi(2);
                }
            }
            for v in &mut variances {
                *v = *v / count + epsilon;
            }

            Ok(ClassStats {
                log_prior: (count / n).ln(),
                means,
                variances,
            })
        };

        Ok(Box::new(NaiveBayesModel {
            negative: stats_for(false)?,
            positive: stats_for(true)?,
        }))
    }

    fn description(&self) -> &str {
        "Gaussian naive Bayes"
    }
}

// ---------------------------------------------------------------------------
// Decision tree / random forest
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum Node {
    Leaf {
        positive_fraction: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

impl Node {
    fn positive_fraction(&self, features: &[f64]) -> f64 {
        let mut node = self;
        loop {
            match node {
                Node::Leaf { positive_fraction } => return *positive_fraction,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    node = if features[*feature] <= *threshold { &**left } else { &**right };
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct TreeParams {
    max_depth: usize,
    min_samples_split: usize,
    /// Features considered per split; `None` = all
    max_features: Option<usize>,
}

fn gini(positives: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let p = positives as f64 / total as f64;
    2.0 * p * (1.0 - p)
}

/// Grow a CART tree over `indices` of `data`
fn grow(
    data: &EncodedDataset,
    indices: &[usize],
    depth: usize,
    params: &TreeParams,
    rng: &mut ChaCha8Rng,
) -> Node {
    let total = indices.len();
    let positives = indices.iter().filter(|&&i| data.labels[i]).count();
    let leaf = Node::Leaf {
        positive_fraction: positives as f64 / total as f64,
    };

    if depth >= params.max_depth
        || total < params.min_samples_split
        || positives == 0
        || positives == total
    {
        return leaf;
    }

    let dim = data.dimension();
    let candidates: Vec<usize> = match params.max_features {
        Some(m) if m < dim => index::sample(rng, dim, m).into_vec(),
        _ => (0..dim).collect(),
    };

    let parent = gini(positives, total);
    let mut best: Option<(f64, usize, f64)> = None;

    for &feature in &candidates {
        let mut column: Vec<(f64, bool)> = indices
            .iter()
            .map(|&i| (data.features[i][feature], data.labels[i]))
            .collect();
        column.sort_by(|a, b| a.0.total_cmp(&b.0));

        let mut left_pos = 0;
        for split in 1..total {
            if column[split - 1].1 {
                left_pos += 1;
            }
            let (prev, next) = (column[split - 1].0, column[split].0);
            // Adjacent floats can round the midpoint onto `next`
            let threshold = prev + (next - prev) / 2.0;
            if prev == next || !(threshold >= prev && threshold < next) {
                continue;
            }
            let right_pos = positives - left_pos;
            let impurity = (split as f64 * gini(left_pos, split)
                + (total - split) as f64 * gini(right_pos, total - split))
                / total as f64;
            if impurity < parent - 1e-12 && best.map_or(true, |(b, _, _)| impurity < b) {
                best = Some((impurity, feature, threshold));
            }
        }
    }

    let Some((_, feature, threshold)) = best else {
        return leaf;
    };

    let (left, right): (Vec<usize>, Vec<usize>) = indices
        .iter()
        .copied()
        .partition(|&i| data.features[i][feature] <= threshold);
    if left.is_empty() || right.is_empty() {
        return leaf;
    }

    Node::Split {
        feature,
        threshold,
        left: Box::new(grow(data, &left, depth + 1, params, rng)),
        right: Box::new(grow(data, &right, depth + 1, params, rng)),
    }
}

/// CART decision tree with Gini impurity; leaf class frequencies as probabilities
#[derive(Debug, Clone)]
pub struct DecisionTree {
    max_depth: usize,
    min_samples_split: usize,
}

impl DecisionTree {
    pub fn new() -> Self {
        Self {
            max_depth: 5,
            min_samples_split: 2,
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }
}

impl Default for DecisionTree {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone)]
struct TreeModel {
    root: Node,
    dimension: usize,
}

impl Model for TreeModel {
    fn predict(&self, features: &[f64]) -> Result<Prediction> {
        check_dimension(self.dimension, features)?;
        Ok(Prediction::from_probability(self.root.positive_fraction(features)))
    }
}

impl Trainer for DecisionTree {
    fn fit(&self, data: &EncodedDataset) -> Result<Box<dyn Model>> {
        require_samples(data)?;
        let params = TreeParams {
            max_depth: self.max_depth,
            min_samples_split: self.min_samples_split,
            max_features: None,
        };
        // Unused without feature subsampling
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let indices: Vec<usize> = (0..data.len()).collect();

        Ok(Box::new(TreeModel {
            root: grow(data, &indices, 0, &params, &mut rng),
            dimension: data.dimension(),
        }))
    }

    fn description(&self) -> &str {
        "CART decision tree (Gini impurity)"
    }
}

/// Bagged ensemble of decision trees with per-split feature subsampling
#[derive(Debug, Clone)]
pub struct RandomForest {
    n_trees: usize,
    max_depth: usize,
    seed: u64,
}

impl RandomForest {
    pub fn new(seed: u64) -> Self {
        Self {
            n_trees: 25,
            max_depth: 6,
            seed,
        }
    }

    pub fn with_n_trees(mut self, n_trees: usize) -> Self {
        self.n_trees = n_trees;
        self
    }
}

#[derive(Debug, Clone)]
struct ForestModel {
    trees: Vec<Node>,
    dimension: usize,
}

impl Model for ForestModel {
    fn predict(&self, features: &[f64]) -> Result<Prediction> {
        check_dimension(self.dimension, features)?;
        let sum: f64 = self.trees.iter().map(|t| t.positive_fraction(features)).sum();
        Ok(Prediction::from_probability(sum / self.trees.len() as f64))
    }
}

impl Trainer for RandomForest {
    fn fit(&self, data: &EncodedDataset) -> Result<Box<dyn Model>> {
        require_samples(data)?;
        if self.n_trees == 0 {
            return Err(BenchError::training("random forest needs at least one tree"));
        }

        let n = data.len();
        let dim = data.dimension();
        let params = TreeParams {
            max_depth: self.max_depth,
            min_samples_split: 2,
            max_features: Some(((dim as f64).sqrt().ceil() as usize).max(1)),
        };
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);

        let trees = (0..self.n_trees)
            .map(|_| {
                let bootstrap: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
                grow(data, &bootstrap, 0, &params, &mut rng)
            })
            .collect();

        Ok(Box::new(ForestModel { trees, dimension: dim }))
    }

    fn description(&self) -> &str {
        "Random forest of bootstrapped CART trees"
    }
}

// ---------------------------------------------------------------------------
// k-nearest neighbors
// ---------------------------------------------------------------------------

/// k-nearest neighbors; P(positive) is the positive share of the k neighbors
#[derive(Debug, Clone)]
pub struct KNearestNeighbors {
    k: usize,
}

impl KNearestNeighbors {
    pub fn new(k: usize) -> Self {
        Self { k }
    }
}

#[derive(Debug, Clone)]
struct NeighborsModel {
    k: usize,
    data: EncodedDataset,
}

impl Model for NeighborsModel {
    fn predict(&self, features: &[f64]) -> Result<Prediction> {
        check_dimension(self.data.dimension(), features)?;

        let mut distances: Vec<(f64, bool)> = self
            .data
            .features
            .iter()
            .zip(&self.data.labels)
            .map(|(row, &label)| {
                let d: f64 = row.iter().zip(features).map(|(a, b)| (a - b).powi(2)).sum();
                (d, label)
            })
            .collect();
        distances.sort_by(|a, b| a.0.total_cmp(&b.0));

        let votes = distances.iter().take(self.k).filter(|(_, label)| *label).count();
        Ok(Prediction::from_probability(votes as f64 / self.k as f64))
    }
}

impl Trainer for KNearestNeighbors {
    fn fit(&self, data: &EncodedDataset) -> Result<Box<dyn Model>> {
        require_samples(data)?;
        if self.k == 0 {
            return Err(BenchError::training("k must be at least 1"));
        }
        Ok(Box::new(NeighborsModel {
            k: self.k.min(data.len()),
            data: data.clone(),
        }))
    }

    fn description(&self) -> &str {
        "k-nearest neighbors (Euclidean distance)"
    }
}

// ---------------------------------------------------------------------------
// Linear SVM
// ---------------------------------------------------------------------------

/// Linear SVM trained with Pegasos stochastic sub-gradient descent
#[derive(Debug, Clone)]
pub struct LinearSvm {
    lambda: f64,
    epochs: usize,
    seed: u64,
}

impl LinearSvm {
    pub fn new(seed: u64) -> Self {
        Self {
            lambda: 0.01,
            epochs: 50,
            seed,
        }
    }

    pub fn with_lambda(mut self, lambda: f64) -> Self {
        self.lambda = lambda;
        self
    }
}

#[derive(Debug, Clone)]
struct SvmModel {
    weights: Vec<f64>,
    bias: f64,
}

impl Model for SvmModel {
    fn predict(&self, features: &[f64]) -> Result<Prediction> {
        check_dimension(self.weights.len(), features)?;
        Ok(Prediction::from_margin(self.bias + dot(&self.weights, features)))
    }
}

impl Trainer for LinearSvm {
    fn fit(&self, data: &EncodedDataset) -> Result<Box<dyn Model>> {
        require_samples(data)?;
        if self.lambda <= 0.0 {
            return Err(BenchError::training("regularization strength must be positive"));
        }

        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let mut model = SvmModel {
            weights: vec![0.0; data.dimension()],
            bias: 0.0,
        };
        let mut order: Vec<usize> = (0..data.len()).collect();
        let mut t = 0usize;

        for _ in 0..self.epochs {
            order.shuffle(&mut rng);
            for &i in &order {
                t += 1;
                let eta = 1.0 / (self.lambda * t as f64);
                let y = if data.labels[i] { 1.0 } else { -1.0 };
                let x = &data.features[i];
                let margin = y * (model.bias + dot(&model.weights, x));

                for w in &mut model.weights {
                    *w *= 1.0 - eta * self.lambda;
                }
                if margin < 1.0 {
                    for (w, xi) in model.weights.iter_mut().zip(x) {
                        *w += eta * y * xi;
                    }
                    model.bias += eta * y;
                }
            }
        }

        Ok(Box::new(model))
    }

    fn description(&self) -> &str {
        "Linear SVM (hinge loss, Pegasos SGD)"
    }
}

// ---------------------------------------------------------------------------
// Majority baseline
// ---------------------------------------------------------------------------

/// Always predicts the most common training class
#[derive(Debug, Clone, Copy, Default)]
pub struct Majority;

#[derive(Debug, Clone)]
struct MajorityModel {
    positive_rate: f64,
}

impl Model for MajorityModel {
    fn predict(&self, _features: &[f64]) -> Result<Prediction> {
        Ok(Prediction::from_probability(self.positive_rate))
    }
}

impl Trainer for Majority {
    fn fit(&self, data: &EncodedDataset) -> Result<Box<dyn Model>> {
        require_samples(data)?;
        Ok(Box::new(MajorityModel {
            positive_rate: data.positives() as f64 / data.len() as f64,
        }))
    }

    fn description(&self) -> &str {
        "Always predicts the majority class from training data"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trainers::TrainerKind;

    /// Two separable blobs in [0, 1]^2 plus a one-hot pair
    fn separable() -> EncodedDataset {
        let mut features = Vec::new();
        let mut labels = Vec::new();
        for i in 0..20 {
            let jitter = i as f64 * 0.01;
            features.push(vec![0.1 + jitter, 0.2 + jitter, 1.0, 0.0]);
            labels.push(false);
            features.push(vec![0.8 - jitter, 0.9 - jitter, 0.0, 1.0]);
            labels.push(true);
        }
        EncodedDataset::new(features, labels).unwrap()
    }

    fn accuracy(model: &dyn Model, data: &EncodedDataset) -> f64 {
        let predictions = model.predict_batch(&data.features).unwrap();
        let correct = predictions
            .iter()
            .zip(&data.labels)
            .filter(|(p, &l)| p.label == l)
            .count();
        correct as f64 / data.len() as f64
    }

    #[test]
    fn test_every_kind_learns_separable_data() {
        let data = separable();
        for kind in TrainerKind::ALL {
            if kind == TrainerKind::Majority {
                continue;
            }
            let model = kind.build(7).fit(&data).unwrap();
            assert!(
                accuracy(model.as_ref(), &data) >= 0.95,
                "{} failed to separate the blobs",
                kind.name()
            );
        }
    }

    #[test]
    fn test_calibrated_kinds_emit_probabilities() {
        let data = separable();
        for kind in TrainerKind::ALL {
            let model = kind.build(3).fit(&data).unwrap();
            let p = model.predict(&data.features[0]).unwrap();
            if kind.calibrated() {
                let prob = p.probability.unwrap();
                assert!((0.0..=1.0).contains(&prob));
            } else {
                assert!(p.probability.is_none());
            }
        }
    }

    #[test]
    fn test_empty_training_set_fails() {
        let empty = EncodedDataset::new(vec![], vec![]).unwrap();
        for kind in TrainerKind::ALL {
            assert!(kind.build(0).fit(&empty).is_err());
        }
    }

    #[test]
    fn test_naive_bayes_needs_both_classes() {
        let data = EncodedDataset::new(vec![vec![0.1], vec![0.2]], vec![true, true]).unwrap();
        let err = GaussianNaiveBayes::new().fit(&data).err().unwrap();
        assert!(err.to_string().contains("negative class absent"));
    }

    #[test]
    fn test_dimension_mismatch_is_a_prediction_error() {
        let model = LogisticRegression::new().fit(&separable()).unwrap();
        assert!(matches!(
            model.predict(&[0.5]),
            Err(BenchError::Prediction(_))
        ));
    }

    #[test]
    fn test_majority_predicts_training_prior() {
        let data = EncodedDataset::new(
            vec![vec![0.0], vec![1.0], vec![0.5]],
            vec![true, false, false],
        )
        .unwrap();
        let model = Majority.fit(&data).unwrap();
        let p = model.predict(&[0.9]).unwrap();
        assert!(!p.label);
        assert!((p.probability.unwrap() - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_forest_is_seeded() {
        let data = separable();
        let a = RandomForest::new(11).fit(&data).unwrap();
        let b = RandomForest::new(11).fit(&data).unwrap();
        let point = vec![0.45, 0.5, 0.0, 0.0];
        assert_eq!(a.predict(&point).unwrap(), b.predict(&point).unwrap());
    }

    #[test]
    fn test_tree_threshold_split() {
        let data = EncodedDataset::new(
            vec![vec![0.0], vec![0.2], vec![0.8], vec![1.0]],
            vec![false, false, true, true],
        )
        .unwrap();
        let model = DecisionTree::new().fit(&data).unwrap();
        assert!(!model.predict(&[0.3]).unwrap().label);
        assert!(model.predict(&[0.7]).unwrap().label);
    }

    #[test]
    fn test_tree_adjacent_floats_keep_finite_leaves() {
        let lo = 1.0 + f64::EPSILON;
        let hi = 1.0 + 2.0 * f64::EPSILON;
        let data = EncodedDataset::new(vec![vec![lo], vec![hi]], vec![false, true]).unwrap();
        let model = DecisionTree::new().fit(&data).unwrap();
        for x in [lo, hi, 2.0] {
            let p = model.predict(&[x]).unwrap().probability.unwrap();
            assert!(p.is_finite(), "non-finite probability at {}", x);
        }

        let forest = RandomForest::new(3).with_n_trees(5).fit(&data).unwrap();
        assert!(forest.predict(&[2.0]).unwrap().probability.unwrap().is_finite());
    }
}
