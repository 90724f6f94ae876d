//! Decision tree classifier
//!
//! CART-style binary tree grown greedily on Gini impurity or entropy. Leaves
//! keep the weighted class distribution of their training samples so that
//! ensembles can average probabilities.

use super::{argmax, check_features, check_fit_input, class_position, seeded_rng, unique_classes, Classifier, FromParams};
use crate::error::{ClassifierError, Result};
use crate::params::{ParamReader, ParamValue, Params};
use crate::registry::Algorithm;
use ndarray::{Array1, Array2, ArrayView1};
use rand::seq::index::sample;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Decision tree node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TreeNode {
    /// Leaf node with the class distribution of its samples
    Leaf {
        distribution: Vec<f64>,
        n_samples: usize,
    },
    /// Internal node with split
    Split {
        feature_idx: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
        n_samples: usize,
        impurity: f64,
    },
}

/// Impurity criterion
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Criterion {
    /// Gini impurity
    Gini,
    /// Shannon entropy
    Entropy,
}

impl Criterion {
    fn name(&self) -> &'static str {
        match self {
            Criterion::Gini => "gini",
            Criterion::Entropy => "entropy",
        }
    }

    fn impurity(&self, counts: &[f64]) -> f64 {
        let total: f64 = counts.iter().sum();
        if total <= 0.0 {
            return 0.0;
        }
        match self {
            Criterion::Gini => 1.0 - counts.iter().map(|&c| (c / total).powi(2)).sum::<f64>(),
            Criterion::Entropy => -counts
                .iter()
                .filter(|&&c| c > 0.0)
                .map(|&c| {
                    let p = c / total;
                    p * p.log2()
                })
                .sum::<f64>(),
        }
    }
}

/// Number of features examined at each split
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub enum MaxFeatures {
    /// Every feature
    All,
    /// `sqrt(n_features)`
    Sqrt,
    /// `log2(n_features)`
    Log2,
    /// Fixed count
    Count(usize),
    /// Fraction of the features
    Fraction(f64),
}

impl MaxFeatures {
    /// Resolve against the number of features, at least one
    pub fn resolve(&self, n_features: usize) -> usize {
        let n = match *self {
            MaxFeatures::All => n_features,
            MaxFeatures::Sqrt => (n_features as f64).sqrt() as usize,
            MaxFeatures::Log2 => (n_features as f64).log2() as usize,
            MaxFeatures::Count(k) => k,
            MaxFeatures::Fraction(f) => (f * n_features as f64) as usize,
        };
        n.clamp(1, n_features.max(1))
    }

    fn to_value(self) -> ParamValue {
        match self {
            MaxFeatures::All => ParamValue::None,
            MaxFeatures::Sqrt => "sqrt".into(),
            MaxFeatures::Log2 => "log2".into(),
            MaxFeatures::Count(k) => k.into(),
            MaxFeatures::Fraction(f) => f.into(),
        }
    }

    fn read(reader: &mut ParamReader<'_>, default: MaxFeatures) -> Result<MaxFeatures> {
        match reader.value("max_features") {
            None => Ok(default),
            Some(ParamValue::None) => Ok(MaxFeatures::All),
            Some(ParamValue::Str(s)) if s == "sqrt" => Ok(MaxFeatures::Sqrt),
            Some(ParamValue::Str(s)) if s == "log2" => Ok(MaxFeatures::Log2),
            Some(ParamValue::Int(k)) if *k >= 1 => Ok(MaxFeatures::Count(*k as usize)),
            Some(ParamValue::Float(f)) if *f > 0.0 && *f <= 1.0 => Ok(MaxFeatures::Fraction(*f)),
            Some(other) => Err(reader.invalid(
                "max_features",
                other,
                "expected None, 'sqrt', 'log2', a positive integer or a fraction in (0, 1]",
            )),
        }
    }
}

/// Decision tree classifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTreeClassifier {
    /// Tree root
    root: Option<TreeNode>,
    /// Maximum depth
    pub max_depth: Option<usize>,
    /// Minimum samples to split
    pub min_samples_split: usize,
    /// Minimum samples in leaf
    pub min_samples_leaf: usize,
    /// Maximum features to consider
    pub max_features: MaxFeatures,
    /// Impurity criterion
    pub criterion: Criterion,
    pub random_state: Option<u64>,
    n_features: usize,
    feature_importances: Option<Array1<f64>>,
    classes: Vec<f64>,
}

impl Default for DecisionTreeClassifier {
    fn default() -> Self {
        Self::new()
    }
}

/// Training data shared by every node while the tree grows
struct GrowContext<'a> {
    x: &'a Array2<f64>,
    encoded: &'a [usize],
    weights: &'a [f64],
    n_classes: usize,
}

impl GrowContext<'_> {
    fn class_counts(&self, indices: &[usize]) -> Vec<f64> {
        let mut counts = vec![0.0; self.n_classes];
        for &i in indices {
            counts[self.encoded[i]] += self.weights[i];
        }
        counts
    }
}

impl DecisionTreeClassifier {
    pub fn new() -> Self {
        Self {
            root: None,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: MaxFeatures::All,
            criterion: Criterion::Gini,
            random_state: None,
            n_features: 0,
            feature_importances: None,
            classes: Vec::new(),
        }
    }

    /// Set maximum depth
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    /// Set minimum samples to split
    pub fn with_min_samples_split(mut self, min_samples: usize) -> Self {
        self.min_samples_split = min_samples;
        self
    }

    /// Set minimum samples in leaf
    pub fn with_min_samples_leaf(mut self, min_samples: usize) -> Self {
        self.min_samples_leaf = min_samples;
        self
    }

    pub fn with_max_features(mut self, max_features: MaxFeatures) -> Self {
        self.max_features = max_features;
        self
    }

    /// Set criterion
    pub fn with_criterion(mut self, criterion: Criterion) -> Self {
        self.criterion = criterion;
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    /// Reads the growth keys shared by the tree ensembles
    pub(crate) fn read_growth_params(reader: &mut ParamReader<'_>, default_max_features: MaxFeatures) -> Result<Self> {
        let criterion = match reader.choice("criterion", "gini", &["gini", "entropy"])? {
            "entropy" => Criterion::Entropy,
            _ => Criterion::Gini,
        };
        let max_depth = reader.opt_usize("max_depth", None)?;
        let min_samples_split = reader.usize("min_samples_split", 2)?;
        if min_samples_split < 2 {
            return Err(ClassifierError::invalid_parameter(
                "min_samples_split",
                min_samples_split,
                "must be at least 2",
            ));
        }
        let min_samples_leaf = reader.usize("min_samples_leaf", 1)?;
        if min_samples_leaf < 1 {
            return Err(ClassifierError::invalid_parameter(
                "min_samples_leaf",
                min_samples_leaf,
                "must be at least 1",
            ));
        }
        let max_features = MaxFeatures::read(reader, default_max_features)?;

        Ok(Self {
            max_depth,
            min_samples_split,
            min_samples_leaf,
            max_features,
            criterion,
            ..Self::new()
        })
    }

    pub(crate) fn growth_params(&self) -> Params {
        Params::new()
            .with("criterion", self.criterion.name())
            .with("max_depth", self.max_depth)
            .with("min_samples_split", self.min_samples_split)
            .with("min_samples_leaf", self.min_samples_leaf)
            .with("max_features", self.max_features.to_value())
    }

    /// Grow the tree on label indices into `classes`, one weight per sample
    pub(crate) fn fit_encoded(
        &mut self,
        x: &Array2<f64>,
        encoded: &[usize],
        weights: &[f64],
        classes: Vec<f64>,
    ) -> Result<()> {
        let n_samples = x.nrows();
        let n_features = x.ncols();
        if n_features == 0 {
            return Err(ClassifierError::DataError(
                "Found array with 0 features while a minimum of 1 is required".to_string(),
            ));
        }

        let ctx = GrowContext {
            x,
            encoded,
            weights,
            n_classes: classes.len(),
        };
        let mut rng = seeded_rng(self.random_state);
        let mut importances = vec![0.0; n_features];

        let indices: Vec<usize> = (0..n_samples).collect();
        let root = self.build_tree(&ctx, &indices, 0, &mut rng, &mut importances);

        // Normalize feature importances
        let total: f64 = importances.iter().sum();
        if total > 0.0 {
            for imp in &mut importances {
                *imp /= total;
            }
        }

        self.root = Some(root);
        self.feature_importances = Some(Array1::from_vec(importances));
        self.n_features = n_features;
        self.classes = classes;
        Ok(())
    }

    fn build_tree(
        &self,
        ctx: &GrowContext<'_>,
        indices: &[usize],
        depth: usize,
        rng: &mut ChaCha8Rng,
        importances: &mut [f64],
    ) -> TreeNode {
        let n_samples = indices.len();
        let counts = ctx.class_counts(indices);
        let parent_impurity = self.criterion.impurity(&counts);

        // Check stopping conditions
        let should_stop = n_samples < self.min_samples_split
            || n_samples < 2 * self.min_samples_leaf
            || self.max_depth.map_or(false, |d| depth >= d)
            || counts.iter().filter(|&&c| c > 0.0).count() <= 1;

        if should_stop {
            return leaf(counts, n_samples);
        }

        let Some((feature_idx, threshold, gain)) = self.find_best_split(ctx, indices, &counts, parent_impurity, rng)
        else {
            return leaf(counts, n_samples);
        };

        let (left_indices, right_indices): (Vec<usize>, Vec<usize>) = indices
            .iter()
            .partition(|&&i| ctx.x[[i, feature_idx]] <= threshold);

        if left_indices.is_empty() || right_indices.is_empty() {
            return leaf(counts, n_samples);
        }

        let node_weight: f64 = counts.iter().sum();
        importances[feature_idx] += node_weight * gain;

        let left = Box::new(self.build_tree(ctx, &left_indices, depth + 1, rng, importances));
        let right = Box::new(self.build_tree(ctx, &right_indices, depth + 1, rng, importances));

        TreeNode::Split {
            feature_idx,
            threshold,
            left,
            right,
            n_samples,
            impurity: parent_impurity,
        }
    }

    /// Best (feature, threshold, gain) among the features drawn for this node
    fn find_best_split(
        &self,
        ctx: &GrowContext<'_>,
        indices: &[usize],
        parent_counts: &[f64],
        parent_impurity: f64,
        rng: &mut ChaCha8Rng,
    ) -> Option<(usize, f64, f64)> {
        let n_features = ctx.x.ncols();
        let n_features_to_try = self.max_features.resolve(n_features);
        let features: Vec<usize> = if n_features_to_try >= n_features {
            (0..n_features).collect()
        } else {
            sample(rng, n_features, n_features_to_try).into_vec()
        };

        let total_weight: f64 = parent_counts.iter().sum();

        // Each feature independently finds its best split
        let feature_results: Vec<Option<(usize, f64, f64)>> = features
            .par_iter()
            .map(|&feature_idx| {
                let mut sorted = indices.to_vec();
                sorted.sort_by(|&a, &b| {
                    ctx.x[[a, feature_idx]]
                        .partial_cmp(&ctx.x[[b, feature_idx]])
                        .unwrap_or(std::cmp::Ordering::Equal)
                });

                let mut left_counts = vec![0.0; ctx.n_classes];
                let mut best: Option<(f64, f64)> = None;

                for pos in 0..sorted.len() - 1 {
                    let i = sorted[pos];
                    left_counts[ctx.encoded[i]] += ctx.weights[i];

                    let current = ctx.x[[i, feature_idx]];
                    let next = ctx.x[[sorted[pos + 1], feature_idx]];
                    if current >= next {
                        continue;
                    }

                    let left_n = pos + 1;
                    let right_n = sorted.len() - left_n;
                    if left_n < self.min_samples_leaf || right_n < self.min_samples_leaf {
                        continue;
                    }

                    let right_counts: Vec<f64> = parent_counts
                        .iter()
                        .zip(left_counts.iter())
                        .map(|(p, l)| p - l)
                        .collect();
                    let left_weight: f64 = left_counts.iter().sum();
                    let right_weight = total_weight - left_weight;
                    let weighted_impurity = (left_weight * self.criterion.impurity(&left_counts)
                        + right_weight * self.criterion.impurity(&right_counts))
                        / total_weight;

                    let gain = parent_impurity - weighted_impurity;
                    if gain > 1e-12 && best.map_or(true, |(g, _)| gain > g) {
                        best = Some((gain, (current + next) / 2.0));
                    }
                }

                best.map(|(gain, threshold)| (feature_idx, threshold, gain))
            })
            .collect();

        // First feature wins ties
        let mut best: Option<(usize, f64, f64)> = None;
        for candidate in feature_results.into_iter().flatten() {
            if best.map_or(true, |b| candidate.2 > b.2) {
                best = Some(candidate);
            }
        }
        best
    }

    /// Class probabilities, one column per sorted training class
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let root = self.root.as_ref().ok_or(ClassifierError::ModelNotFitted)?;
        check_features(self.n_features, x)?;

        let mut proba = Array2::zeros((x.nrows(), self.classes.len()));
        for (i, row) in x.rows().into_iter().enumerate() {
            for (j, &p) in leaf_distribution(root, row).iter().enumerate() {
                proba[[i, j]] = p;
            }
        }
        Ok(proba)
    }

    pub fn classes(&self) -> &[f64] {
        &self.classes
    }

    /// Get feature importances
    pub fn feature_importances(&self) -> Option<&Array1<f64>> {
        self.feature_importances.as_ref()
    }

    /// Get tree depth (a lone leaf has depth 0)
    pub fn get_depth(&self) -> usize {
        fn depth(node: &TreeNode) -> usize {
            match node {
                TreeNode::Leaf { .. } => 0,
                TreeNode::Split { left, right, .. } => 1 + depth(left).max(depth(right)),
            }
        }
        self.root.as_ref().map_or(0, depth)
    }

    /// Get number of leaves
    pub fn get_n_leaves(&self) -> usize {
        fn count(node: &TreeNode) -> usize {
            match node {
                TreeNode::Leaf { .. } => 1,
                TreeNode::Split { left, right, .. } => count(left) + count(right),
            }
        }
        self.root.as_ref().map_or(0, count)
    }
}

fn leaf(counts: Vec<f64>, n_samples: usize) -> TreeNode {
    let total: f64 = counts.iter().sum();
    let distribution = if total > 0.0 {
        counts.iter().map(|c| c / total).collect()
    } else {
        vec![1.0 / counts.len() as f64; counts.len()]
    };
    TreeNode::Leaf {
        distribution,
        n_samples,
    }
}

pub(crate) fn leaf_distribution<'a>(node: &'a TreeNode, sample: ArrayView1<f64>) -> &'a [f64] {
    match node {
        TreeNode::Leaf { distribution, .. } => distribution,
        TreeNode::Split {
            feature_idx,
            threshold,
            left,
            right,
            ..
        } => {
            if sample[*feature_idx] <= *threshold {
                leaf_distribution(left, sample)
            } else {
                leaf_distribution(right, sample)
            }
        }
    }
}

/// Label indices into `classes`
pub(crate) fn encode_labels(y: &Array1<f64>, classes: &[f64]) -> Result<Vec<usize>> {
    y.iter()
        .map(|&label| {
            class_position(classes, label).ok_or_else(|| {
                ClassifierError::InvalidInput(format!("label {} is not a known class", label))
            })
        })
        .collect()
}

impl FromParams for DecisionTreeClassifier {
    fn from_params(params: &Params) -> Result<Self> {
        let mut reader = ParamReader::new("DecisionTree", params);
        let tree = Self::read_growth_params(&mut reader, MaxFeatures::All)?;
        let random_state = reader.opt_u64("random_state")?;
        reader.finish()?;
        Ok(Self { random_state, ..tree })
    }
}

impl Classifier for DecisionTreeClassifier {
    fn algorithm(&self) -> Algorithm {
        Algorithm::DecisionTree
    }

    fn params(&self) -> Params {
        self.growth_params().with("random_state", self.random_state)
    }

    fn is_fitted(&self) -> bool {
        self.root.is_some()
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_fit_input(x, y)?;
        let classes = unique_classes(y);
        let encoded = encode_labels(y, &classes)?;
        let weights = vec![1.0; y.len()];
        self.fit_encoded(x, &encoded, &weights, classes)
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let proba = self.predict_proba(x)?;
        Ok(proba
            .rows()
            .into_iter()
            .map(|row| self.classes[argmax(&row.to_vec())])
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimators::test_data::{accuracy, three_blobs};
    use ndarray::array;

    #[test]
    fn test_classifier_simple() {
        let x = array![[0.0, 0.0], [0.0, 1.0], [1.0, 0.0], [1.0, 1.0]];
        let y = array![0.0, 0.0, 1.0, 1.0];

        let mut tree = DecisionTreeClassifier::new();
        tree.fit(&x, &y).unwrap();

        assert_eq!(tree.predict(&x).unwrap(), y);
        assert_eq!(tree.get_depth(), 1);
        assert_eq!(tree.get_n_leaves(), 2);
    }

    #[test]
    fn test_multiclass_fits_training_data() {
        let (x, y) = three_blobs();
        let mut tree = DecisionTreeClassifier::new().with_criterion(Criterion::Entropy);
        tree.fit(&x, &y).unwrap();
        assert_eq!(accuracy(&y, &tree.predict(&x).unwrap()), 1.0);

        let proba = tree.predict_proba(&x).unwrap();
        assert_eq!(proba.ncols(), 3);
    }

    #[test]
    fn test_max_depth() {
        let x = array![[1.0, 1.0], [2.0, 2.0], [3.0, 3.0], [4.0, 4.0]];
        let y = array![0.0, 1.0, 0.0, 1.0];

        let mut tree = DecisionTreeClassifier::new().with_max_depth(1);
        tree.fit(&x, &y).unwrap();

        assert!(tree.get_depth() <= 1);
    }

    #[test]
    fn test_feature_importances() {
        let x = array![[1.0, 0.0], [2.0, 0.0], [3.0, 0.0], [4.0, 0.0]];
        let y = array![0.0, 0.0, 1.0, 1.0];

        let mut tree = DecisionTreeClassifier::new();
        tree.fit(&x, &y).unwrap();

        let importances = tree.feature_importances().unwrap();
        assert!((importances[0] - 1.0).abs() < 1e-12);
        assert_eq!(importances[1], 0.0);
    }

    #[test]
    fn test_max_features_resolution() {
        assert_eq!(MaxFeatures::Sqrt.resolve(16), 4);
        assert_eq!(MaxFeatures::Log2.resolve(8), 3);
        assert_eq!(MaxFeatures::Fraction(0.5).resolve(10), 5);
        assert_eq!(MaxFeatures::Count(50).resolve(10), 10);
        assert_eq!(MaxFeatures::Sqrt.resolve(1), 1);
    }

    #[test]
    fn test_params_round_trip() {
        let params = Params::new()
            .with("criterion", "entropy")
            .with("max_depth", 3)
            .with("max_features", "sqrt");
        let tree = DecisionTreeClassifier::from_params(&params).unwrap();
        assert_eq!(tree.criterion, Criterion::Entropy);
        assert_eq!(tree.max_depth, Some(3));
        assert_eq!(tree.params().get("max_features"), Some(&ParamValue::from("sqrt")));

        let bad = Params::new().with("min_samples_split", 1);
        assert!(DecisionTreeClassifier::from_params(&bad).is_err());
    }
}
