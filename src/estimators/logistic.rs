//! Multinomial logistic regression

use super::decision_tree::encode_labels;
use super::{argmax, check_features, check_fit_input, unique_classes, Classifier, FromParams};
use crate::error::{ClassifierError, Result};
use crate::params::{ParamReader, Params};
use crate::registry::Algorithm;
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Regularization penalty
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Penalty {
    L2,
    None,
}

/// Logistic regression trained by full-batch gradient descent on the softmax
/// cross-entropy. Features are standardized internally.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticRegression {
    /// Inverse regularization strength
    pub c: f64,
    pub penalty: Penalty,
    /// Whether to fit intercept
    pub fit_intercept: bool,
    /// Maximum iterations
    pub max_iter: usize,
    /// Convergence tolerance on the gradient norm
    pub tol: f64,
    /// Learning rate
    pub learning_rate: f64,
    /// Coefficients on standardized features, one column per class
    coefficients: Option<Array2<f64>>,
    intercepts: Option<Array1<f64>>,
    feature_means: Array1<f64>,
    feature_scales: Array1<f64>,
    classes: Vec<f64>,
    n_iter: usize,
}

impl Default for LogisticRegression {
    fn default() -> Self {
        Self::new()
    }
}

impl LogisticRegression {
    /// Create a new logistic regression model
    pub fn new() -> Self {
        Self {
            c: 1.0,
            penalty: Penalty::L2,
            fit_intercept: true,
            max_iter: 1000,
            tol: 1e-4,
            learning_rate: 0.1,
            coefficients: None,
            intercepts: None,
            feature_means: Array1::zeros(0),
            feature_scales: Array1::zeros(0),
            classes: Vec::new(),
            n_iter: 0,
        }
    }

    /// Set inverse regularization strength
    pub fn with_c(mut self, c: f64) -> Self {
        self.c = c;
        self
    }

    /// Set maximum iterations
    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    /// Set learning rate
    pub fn with_learning_rate(mut self, lr: f64) -> Self {
        self.learning_rate = lr;
        self
    }

    /// Iterations run by the last fit
    pub fn n_iter(&self) -> usize {
        self.n_iter
    }

    fn standardize(&self, x: &Array2<f64>) -> Array2<f64> {
        (x - &self.feature_means.view().insert_axis(Axis(0))) / &self.feature_scales.view().insert_axis(Axis(0))
    }

    /// Row-wise softmax in place
    fn softmax(z: &mut Array2<f64>) {
        for mut row in z.rows_mut() {
            let max_val = row.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            row.mapv_inplace(|v| (v - max_val).exp());
            let sum = row.sum();
            row /= sum;
        }
    }

    /// Predict probabilities, one column per sorted training class
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let (coefficients, intercepts) = match (&self.coefficients, &self.intercepts) {
            (Some(w), Some(b)) => (w, b),
            _ => return Err(ClassifierError::ModelNotFitted),
        };
        check_features(self.feature_means.len(), x)?;

        let mut logits = self.standardize(x).dot(coefficients) + &intercepts.view().insert_axis(Axis(0));
        Self::softmax(&mut logits);
        Ok(logits)
    }
}

impl FromParams for LogisticRegression {
    fn from_params(params: &Params) -> Result<Self> {
        let mut reader = ParamReader::new("LogisticRegression", params);
        let c = reader.positive_f64("C", 1.0)?;
        let penalty = match reader.choice("penalty", "l2", &["l2", "none"])? {
            "none" => Penalty::None,
            _ => Penalty::L2,
        };
        let fit_intercept = reader.bool("fit_intercept", true)?;
        let max_iter = reader.usize("max_iter", 1000)?;
        let tol = reader.f64("tol", 1e-4)?;
        let learning_rate = reader.positive_f64("learning_rate", 0.1)?;
        reader.finish()?;

        Ok(Self {
            c,
            penalty,
            fit_intercept,
            max_iter,
            tol,
            learning_rate,
            ..Self::new()
        })
    }
}

impl Classifier for LogisticRegression {
    fn algorithm(&self) -> Algorithm {
        Algorithm::LogisticRegression
    }

    fn params(&self) -> Params {
        Params::new()
            .with("C", self.c)
            .with(
                "penalty",
                match self.penalty {
                    Penalty::L2 => "l2",
                    Penalty::None => "none",
                },
            )
            .with("fit_intercept", self.fit_intercept)
            .with("max_iter", self.max_iter)
            .with("tol", self.tol)
            .with("learning_rate", self.learning_rate)
    }

    fn is_fitted(&self) -> bool {
        self.coefficients.is_some()
    }

    /// Fit the model using gradient descent
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_fit_input(x, y)?;
        let n_samples = x.nrows();
        let n_features = x.ncols();
        let classes = unique_classes(y);
        let n_classes = classes.len();
        let encoded = encode_labels(y, &classes)?;

        self.feature_means = x.mean_axis(Axis(0)).unwrap_or_else(|| Array1::zeros(n_features));
        self.feature_scales = x
            .std_axis(Axis(0), 0.0)
            .mapv(|s| if s > 1e-12 { s } else { 1.0 });
        let xs = self.standardize(x);

        let mut targets = Array2::<f64>::zeros((n_samples, n_classes));
        for (i, &label) in encoded.iter().enumerate() {
            targets[[i, label]] = 1.0;
        }

        // Initialize weights
        let mut weights = Array2::<f64>::zeros((n_features, n_classes));
        let mut bias = Array1::<f64>::zeros(n_classes);
        let reg = match self.penalty {
            Penalty::L2 => 1.0 / (self.c * n_samples as f64),
            Penalty::None => 0.0,
        };

        let mut n_iter = self.max_iter;
        for iter in 0..self.max_iter {
            // Forward pass
            let mut proba = xs.dot(&weights) + &bias.view().insert_axis(Axis(0));
            Self::softmax(&mut proba);

            // Compute gradients
            let errors = &proba - &targets;
            let dw = xs.t().dot(&errors) / n_samples as f64 + &weights * reg;
            let db = errors.sum_axis(Axis(0)) / n_samples as f64;

            // Check convergence
            let mut grad_sq = dw.mapv(|v| v * v).sum();
            if self.fit_intercept {
                grad_sq += db.mapv(|v| v * v).sum();
            }
            if grad_sq.sqrt() < self.tol {
                n_iter = iter;
                break;
            }

            // Update weights
            weights.scaled_add(-self.learning_rate, &dw);
            if self.fit_intercept {
                bias.scaled_add(-self.learning_rate, &db);
            }
        }
        debug!(n_iter, n_classes, "LogisticRegression fit finished");

        self.coefficients = Some(weights);
        self.intercepts = Some(bias);
        self.classes = classes;
        self.n_iter = n_iter;
        Ok(())
    }

    /// Predict class labels
    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let proba = self.predict_proba(x)?;
        Ok(proba
            .rows()
            .into_iter()
            .map(|row| self.classes[argmax(&row.to_vec())])
            .collect())
    }
}
