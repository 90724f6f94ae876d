//! AdaBoost (Adaptive Boosting) implementation
//!
//! AdaBoost builds an ensemble of weak learners (decision stumps), weighting
//! misclassified samples more heavily in subsequent rounds. Multi-class
//! problems use the SAMME update.

use super::decision_tree::{encode_labels, DecisionTreeClassifier};
use super::{argmax, check_features, check_fit_input, unique_classes, Classifier, FromParams};
use crate::error::{ClassifierError, Result};
use crate::params::{ParamReader, Params};
use crate::registry::Algorithm;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// AdaBoost Classifier (SAMME variant, supports multi-class)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdaBoostClassifier {
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub random_state: Option<u64>,
    stumps: Vec<DecisionTreeClassifier>,
    alphas: Vec<f64>,
    classes: Vec<f64>,
    n_features: usize,
}

impl Default for AdaBoostClassifier {
    fn default() -> Self {
        Self::new(50, 1.0)
    }
}

impl AdaBoostClassifier {
    pub fn new(n_estimators: usize, learning_rate: f64) -> Self {
        Self {
            n_estimators,
            learning_rate,
            random_state: None,
            stumps: Vec::new(),
            alphas: Vec::new(),
            classes: Vec::new(),
            n_features: 0,
        }
    }

    pub fn with_n_estimators(mut self, n: usize) -> Self {
        self.n_estimators = n;
        self
    }

    pub fn with_learning_rate(mut self, lr: f64) -> Self {
        self.learning_rate = lr;
        self
    }

    /// Weight of each fitted stump in the vote
    pub fn estimator_weights(&self) -> &[f64] {
        &self.alphas
    }

    /// Weighted vote per class, one column per sorted training class
    pub fn decision_function(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if self.stumps.is_empty() {
            return Err(ClassifierError::ModelNotFitted);
        }
        check_features(self.n_features, x)?;

        let mut scores = Array2::zeros((x.nrows(), self.classes.len()));
        for (stump, &alpha) in self.stumps.iter().zip(self.alphas.iter()) {
            let proba = stump.predict_proba(x)?;
            for (i, row) in proba.rows().into_iter().enumerate() {
                scores[[i, argmax(&row.to_vec())]] += alpha;
            }
        }
        Ok(scores)
    }

    /// Softmax of the normalized vote
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let mut scores = self.decision_function(x)?;
        let total_alpha: f64 = self.alphas.iter().sum();
        for mut row in scores.rows_mut() {
            if total_alpha > 0.0 {
                row /= total_alpha;
            }
            let max_score = row.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            row.mapv_inplace(|s| (s - max_score).exp());
            let exp_sum = row.sum();
            row /= exp_sum;
        }
        Ok(scores)
    }

    /// Compute feature importances from weighted stump feature usage
    pub fn feature_importances(&self) -> Option<Array1<f64>> {
        if self.stumps.is_empty() {
            return None;
        }
        let mut importances = Array1::zeros(self.n_features);
        for (stump, &alpha) in self.stumps.iter().zip(self.alphas.iter()) {
            if let Some(imp) = stump.feature_importances() {
                importances.scaled_add(alpha, imp);
            }
        }
        let total = importances.sum();
        if total > 0.0 {
            importances /= total;
        }
        Some(importances)
    }
}

impl FromParams for AdaBoostClassifier {
    fn from_params(params: &Params) -> Result<Self> {
        let mut reader = ParamReader::new("AdaBoost", params);
        let n_estimators = reader.usize("n_estimators", 50)?;
        if n_estimators == 0 {
            return Err(ClassifierError::invalid_parameter("n_estimators", 0, "must be at least 1"));
        }
        let learning_rate = reader.positive_f64("learning_rate", 1.0)?;
        let random_state = reader.opt_u64("random_state")?;
        reader.finish()?;

        Ok(Self {
            random_state,
            ..Self::new(n_estimators, learning_rate)
        })
    }
}

impl Classifier for AdaBoostClassifier {
    fn algorithm(&self) -> Algorithm {
        Algorithm::AdaBoost
    }

    fn params(&self) -> Params {
        Params::new()
            .with("n_estimators", self.n_estimators)
            .with("learning_rate", self.learning_rate)
            .with("random_state", self.random_state)
    }

    fn is_fitted(&self) -> bool {
        !self.stumps.is_empty()
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_fit_input(x, y)?;
        let n_samples = x.nrows();
        let classes = unique_classes(y);
        let encoded = encode_labels(y, &classes)?;
        let n_classes = classes.len();

        let mut weights = vec![1.0 / n_samples as f64; n_samples];
        let mut stumps = Vec::with_capacity(self.n_estimators);
        let mut alphas = Vec::with_capacity(self.n_estimators);

        for round in 0..self.n_estimators {
            let mut stump = DecisionTreeClassifier::new().with_max_depth(1);
            if let Some(seed) = self.random_state {
                stump = stump.with_random_state(seed.wrapping_add(round as u64));
            }
            stump.fit_encoded(x, &encoded, &weights, classes.clone())?;

            let proba = stump.predict_proba(x)?;
            let incorrect: Vec<bool> = proba
                .rows()
                .into_iter()
                .zip(encoded.iter())
                .map(|(row, &label)| argmax(&row.to_vec()) != label)
                .collect();

            // Compute weighted error
            let error: f64 = weights
                .iter()
                .zip(incorrect.iter())
                .filter(|(_, &wrong)| wrong)
                .map(|(w, _)| w)
                .sum();

            if error <= 0.0 {
                debug!(round, "Perfect stump found, stopping early");
                stumps.push(stump);
                alphas.push(1.0);
                break;
            }

            // Worse than random guessing
            if error >= 1.0 - 1.0 / n_classes as f64 {
                if stumps.is_empty() {
                    return Err(ClassifierError::TrainingError(
                        "BaseClassifier in AdaBoostClassifier ensemble is worse than random, ensemble can not be fit"
                            .to_string(),
                    ));
                }
                debug!(round, error, "Stump no better than chance, stopping early");
                break;
            }

            // SAMME alpha for multi-class
            let alpha = self.learning_rate * (((1.0 - error) / error).ln() + (n_classes as f64 - 1.0).ln());

            for (w, &wrong) in weights.iter_mut().zip(incorrect.iter()) {
                if wrong {
                    *w *= alpha.exp();
                }
            }
            // Normalize weights
            let w_sum: f64 = weights.iter().sum();
            if w_sum > 0.0 {
                for w in weights.iter_mut() {
                    *w /= w_sum;
                }
            }

            stumps.push(stump);
            alphas.push(alpha);
        }

        self.stumps = stumps;
        self.alphas = alphas;
        self.classes = classes;
        self.n_features = x.ncols();
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let scores = self.decision_function(x)?;
        Ok(scores
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
    fn test_adaboost_binary() {
        let x = array![[1.0, 2.0], [2.0, 3.0], [3.0, 4.0], [6.0, 7.0], [7.0, 8.0], [8.0, 9.0]];
        let y = array![0.0, 0.0, 0.0, 1.0, 1.0, 1.0];
        let mut model = AdaBoostClassifier::new(10, 1.0);
        model.fit(&x, &y).unwrap();
        assert!(model.is_fitted());
        assert_eq!(model.score(&x, &y).unwrap(), 1.0);
        // A perfect first stump ends boosting
        assert_eq!(model.estimator_weights().len(), 1);
    }

    #[test]
    fn test_adaboost_multiclass() {
        let (x, y) = three_blobs();
        let mut model = AdaBoostClassifier::default();
        model.fit(&x, &y).unwrap();
        assert!(accuracy(&y, &model.predict(&x).unwrap()) > 0.9);
    }

    #[test]
    fn test_adaboost_predict_proba() {
        let x = array![[0.0, 0.0], [1.0, 1.0], [5.0, 5.0], [6.0, 6.0]];
        let y = array![0.0, 0.0, 1.0, 1.0];
        let mut model = AdaBoostClassifier::new(20, 1.0);
        model.fit(&x, &y).unwrap();
        let proba = model.predict_proba(&x).unwrap();
        assert_eq!(proba.dim(), (4, 2));
        for row in proba.rows() {
            assert!((row.sum() - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_learning_rate_must_be_positive() {
        let params = Params::new().with("learning_rate", 0.0);
        assert!(AdaBoostClassifier::from_params(&params).is_err());
    }
}
