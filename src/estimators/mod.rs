//! Classifier families behind the facade
//!
//! Every family implements [`Classifier`], the capability contract the facade
//! and the grid search talk through:
//! - Dummy baselines
//! - K-Nearest Neighbors
//! - Naive Bayes (Gaussian, Multinomial)
//! - Support Vector Classifier
//! - Decision Tree, Random Forest, Bagging
//! - Logistic Regression
//! - Multi-layer Perceptron
//! - AdaBoost

pub mod adaboost;
pub mod bagging;
pub mod decision_tree;
pub mod dummy;
pub mod knn;
pub mod logistic;
pub mod mlp;
pub mod naive_bayes;
pub mod random_forest;
pub mod svc;

pub use adaboost::AdaBoostClassifier;
pub use bagging::BaggingClassifier;
pub use decision_tree::{Criterion, DecisionTreeClassifier, MaxFeatures};
pub use dummy::{DummyClassifier, DummyStrategy};
pub use knn::{DistanceMetric, KNNClassifier, WeightScheme};
pub use logistic::LogisticRegression;
pub use mlp::{Activation, MLPClassifier};
pub use naive_bayes::{GaussianNaiveBayes, MultinomialNaiveBayes};
pub use random_forest::RandomForestClassifier;
pub use svc::{KernelType, SVClassifier};

use crate::error::{ClassifierError, Result};
use crate::metrics::accuracy;
use crate::params::Params;
use crate::registry::Algorithm;
use ndarray::{Array1, Array2};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::fmt;

/// Trainable, predictive model produced by a family constructor
pub trait Classifier: Send + Sync + fmt::Debug {
    /// Family this model belongs to
    fn algorithm(&self) -> Algorithm;

    /// Effective configuration, defaults filled in
    fn params(&self) -> Params;

    fn is_fitted(&self) -> bool;

    /// Fit the model to training data
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()>;

    /// Predict one label per input row, in order
    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>>;

    /// Mean accuracy on the given labelled batch
    fn score(&self, x: &Array2<f64>, y: &Array1<f64>) -> Result<f64> {
        let y_pred = self.predict(x)?;
        accuracy(y, &y_pred)
    }
}

/// Families that can be built from a [`Params`] configuration
pub trait FromParams: Sized {
    fn from_params(params: &Params) -> Result<Self>;
}

pub(crate) fn check_fit_input(x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
    if x.nrows() != y.len() {
        return Err(ClassifierError::ShapeError {
            expected: format!("y length = {}", x.nrows()),
            actual: format!("y length = {}", y.len()),
        });
    }
    if x.nrows() == 0 {
        return Err(ClassifierError::DataError(
            "Found array with 0 samples while a minimum of 1 is required".to_string(),
        ));
    }
    for (i, &v) in y.iter().enumerate() {
        if !v.is_finite() || v.fract() != 0.0 {
            return Err(ClassifierError::InvalidInput(format!(
                "classifiers require integer class labels, but sample {} has label {}",
                i, v
            )));
        }
    }
    Ok(())
}

pub(crate) fn check_features(expected: usize, x: &Array2<f64>) -> Result<()> {
    if x.ncols() != expected {
        return Err(ClassifierError::ShapeError {
            expected: format!("{} features", expected),
            actual: format!("{} features", x.ncols()),
        });
    }
    Ok(())
}

/// Sorted distinct labels
pub(crate) fn unique_classes(y: &Array1<f64>) -> Vec<f64> {
    let mut classes: Vec<f64> = y.to_vec();
    classes.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    classes.dedup();
    classes
}

pub(crate) fn class_position(classes: &[f64], label: f64) -> Option<usize> {
    classes.iter().position(|&c| c == label)
}

/// Index of the first maximum
pub(crate) fn argmax(values: &[f64]) -> usize {
    let mut best = 0;
    for (i, &v) in values.iter().enumerate() {
        if v > values[best] {
            best = i;
        }
    }
    best
}

pub(crate) fn seeded_rng(random_state: Option<u64>) -> ChaCha8Rng {
    match random_state {
        Some(seed) => ChaCha8Rng::seed_from_u64(seed),
        None => ChaCha8Rng::from_entropy(),
    }
}

#[cfg(test)]
pub(crate) mod test_data {
    use ndarray::{Array1, Array2};

    /// Two well separated blobs in two dimensions
    pub fn binary_blobs() -> (Array2<f64>, Array1<f64>) {
        let x = Array2::from_shape_vec((20, 2), vec![
            1.0, 1.0, 1.5, 1.5, 2.0, 2.0, 2.5, 2.5, 1.0, 2.0,
            1.5, 2.5, 2.0, 1.5, 2.5, 1.0, 1.2, 1.8, 1.8, 1.2,
            8.0, 8.0, 8.5, 8.5, 9.0, 9.0, 9.5, 9.5, 8.0, 9.0,
            8.5, 9.5, 9.0, 8.5, 9.5, 8.0, 8.2, 8.8, 8.8, 8.2,
        ]).unwrap();
        let y = Array1::from_vec(vec![
            0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0,
            1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0,
        ]);
        (x, y)
    }

    /// Three blobs, six samples each
    pub fn three_blobs() -> (Array2<f64>, Array1<f64>) {
        let centers = [(0.0, 0.0), (6.0, 6.0), (0.0, 6.0)];
        let offsets = [(0.0, 0.0), (0.3, 0.1), (-0.2, 0.3), (0.1, -0.3), (-0.3, -0.1), (0.2, 0.2)];
        let mut data = Vec::new();
        let mut labels = Vec::new();
        for (class, (cx, cy)) in centers.iter().enumerate() {
            for (dx, dy) in offsets.iter() {
                data.push(cx + dx);
                data.push(cy + dy);
                labels.push(class as f64);
            }
        }
        (
            Array2::from_shape_vec((18, 2), data).unwrap(),
            Array1::from_vec(labels),
        )
    }

    pub fn accuracy(y: &Array1<f64>, pred: &Array1<f64>) -> f64 {
        crate::metrics::accuracy(y, pred).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_check_fit_input_shape() {
        let x = Array2::<f64>::zeros((3, 2));
        let y = array![0.0, 1.0];
        assert!(matches!(check_fit_input(&x, &y), Err(ClassifierError::ShapeError { .. })));
    }

    #[test]
    fn test_check_fit_input_rejects_continuous_labels() {
        let x = Array2::<f64>::zeros((2, 2));
        let y = array![0.0, 0.5];
        assert!(matches!(check_fit_input(&x, &y), Err(ClassifierError::InvalidInput(_))));
    }

    #[test]
    fn test_argmax_first_wins() {
        assert_eq!(argmax(&[0.2, 0.5, 0.5]), 1);
        assert_eq!(unique_classes(&array![2.0, 0.0, 2.0, 1.0]), vec![0.0, 1.0, 2.0]);
    }
}
