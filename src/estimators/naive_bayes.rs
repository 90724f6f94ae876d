//! Naive Bayes classifiers
//!
//! Gaussian Naive Bayes for continuous features and Multinomial Naive Bayes
//! for count features.

use super::{argmax, check_features, check_fit_input, unique_classes, Classifier, FromParams};
use crate::error::{ClassifierError, Result};
use crate::params::{ParamReader, Params};
use crate::registry::Algorithm;
use ndarray::{Array1, Array2, ArrayView1};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Gaussian Naive Bayes Classifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GaussianNaiveBayes {
    /// Portion of the largest feature variance added to every variance
    pub var_smoothing: f64,
    /// Mean of each feature for each class
    means: Vec<Vec<f64>>,
    /// Variance of each feature for each class
    variances: Vec<Vec<f64>>,
    /// Prior probability of each class
    priors: Vec<f64>,
    classes: Vec<f64>,
    n_features: usize,
}

impl Default for GaussianNaiveBayes {
    fn default() -> Self {
        Self::new()
    }
}

impl GaussianNaiveBayes {
    pub fn new() -> Self {
        Self {
            var_smoothing: 1e-9,
            means: Vec::new(),
            variances: Vec::new(),
            priors: Vec::new(),
            classes: Vec::new(),
            n_features: 0,
        }
    }

    /// Set variance smoothing parameter
    pub fn with_var_smoothing(mut self, smoothing: f64) -> Self {
        self.var_smoothing = smoothing;
        self
    }

    /// Get class priors, aligned with the sorted classes
    pub fn class_priors(&self) -> &[f64] {
        &self.priors
    }

    /// Normalized log probabilities per class
    pub fn predict_log_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if self.classes.is_empty() {
            return Err(ClassifierError::ModelNotFitted);
        }
        check_features(self.n_features, x)?;

        let mut log_probs = Array2::zeros((x.nrows(), self.classes.len()));
        for (i, row) in x.rows().into_iter().enumerate() {
            for j in 0..self.classes.len() {
                log_probs[[i, j]] = self.priors[j].ln() + self.log_likelihood(row, j);
            }
        }
        normalize_log_rows(&mut log_probs);
        Ok(log_probs)
    }

    fn log_likelihood(&self, x: ArrayView1<f64>, class_idx: usize) -> f64 {
        x.iter()
            .zip(self.means[class_idx].iter())
            .zip(self.variances[class_idx].iter())
            .map(|((&xi, &mean), &var)| -0.5 * ((xi - mean).powi(2) / var + var.ln() + (2.0 * PI).ln()))
            .sum()
    }
}

impl FromParams for GaussianNaiveBayes {
    fn from_params(params: &Params) -> Result<Self> {
        let mut reader = ParamReader::new("G-NaiveBayes", params);
        let var_smoothing = reader.f64("var_smoothing", 1e-9)?;
        reader.finish()?;
        if var_smoothing < 0.0 {
            return Err(ClassifierError::invalid_parameter(
                "var_smoothing",
                var_smoothing,
                "must be non-negative",
            ));
        }
        Ok(Self::new().with_var_smoothing(var_smoothing))
    }
}

impl Classifier for GaussianNaiveBayes {
    fn algorithm(&self) -> Algorithm {
        Algorithm::GaussianNaiveBayes
    }

    fn params(&self) -> Params {
        Params::new().with("var_smoothing", self.var_smoothing)
    }

    fn is_fitted(&self) -> bool {
        !self.classes.is_empty()
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_fit_input(x, y)?;
        let n_samples = x.nrows();
        let n_features = x.ncols();
        let classes = unique_classes(y);

        let max_variance = (0..n_features)
            .map(|j| population_variance(x.column(j)))
            .fold(0.0, f64::max);
        let epsilon = (self.var_smoothing * max_variance).max(f64::MIN_POSITIVE);

        let mut means = Vec::with_capacity(classes.len());
        let mut variances = Vec::with_capacity(classes.len());
        let mut priors = Vec::with_capacity(classes.len());

        for &class in &classes {
            // Single-pass Welford's algorithm for mean and variance
            let mut feature_means = vec![0.0; n_features];
            let mut feature_m2 = vec![0.0; n_features];
            let mut count = 0usize;
            for (row, _) in x.rows().into_iter().zip(y.iter()).filter(|(_, &label)| label == class) {
                count += 1;
                for (j, &val) in row.iter().enumerate() {
                    let delta = val - feature_means[j];
                    feature_means[j] += delta / count as f64;
                    feature_m2[j] += delta * (val - feature_means[j]);
                }
            }
            let feature_vars: Vec<f64> = feature_m2.iter().map(|&m2| m2 / count as f64 + epsilon).collect();

            means.push(feature_means);
            variances.push(feature_vars);
            priors.push(count as f64 / n_samples as f64);
        }

        self.means = means;
        self.variances = variances;
        self.priors = priors;
        self.classes = classes;
        self.n_features = n_features;
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let log_probs = self.predict_log_proba(x)?;
        Ok(log_probs
            .rows()
            .into_iter()
            .map(|row| self.classes[argmax(&row.to_vec())])
            .collect())
    }
}

/// Multinomial Naive Bayes (for count data)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MultinomialNaiveBayes {
    /// Additive (Laplace/Lidstone) smoothing parameter
    pub alpha: f64,
    /// Learn class priors; uniform priors otherwise
    pub fit_prior: bool,
    feature_log_probs: Vec<Vec<f64>>,
    class_log_priors: Vec<f64>,
    classes: Vec<f64>,
    n_features: usize,
}

impl Default for MultinomialNaiveBayes {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl MultinomialNaiveBayes {
    pub fn new(alpha: f64) -> Self {
        Self {
            alpha,
            fit_prior: true,
            feature_log_probs: Vec::new(),
            class_log_priors: Vec::new(),
            classes: Vec::new(),
            n_features: 0,
        }
    }

    pub fn predict_log_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if self.classes.is_empty() {
            return Err(ClassifierError::ModelNotFitted);
        }
        check_features(self.n_features, x)?;

        let mut log_probs = Array2::zeros((x.nrows(), self.classes.len()));
        for (i, row) in x.rows().into_iter().enumerate() {
            for j in 0..self.classes.len() {
                let likelihood: f64 = row
                    .iter()
                    .zip(self.feature_log_probs[j].iter())
                    .map(|(&count, &log_p)| count * log_p)
                    .sum();
                log_probs[[i, j]] = self.class_log_priors[j] + likelihood;
            }
        }
        normalize_log_rows(&mut log_probs);
        Ok(log_probs)
    }
}

impl FromParams for MultinomialNaiveBayes {
    fn from_params(params: &Params) -> Result<Self> {
        let mut reader = ParamReader::new("M-NaiveBayes", params);
        let alpha = reader.f64("alpha", 1.0)?;
        let fit_prior = reader.bool("fit_prior", true)?;
        reader.finish()?;
        if alpha < 0.0 {
            return Err(ClassifierError::invalid_parameter("alpha", alpha, "must be non-negative"));
        }
        Ok(Self {
            fit_prior,
            ..Self::new(alpha)
        })
    }
}

impl Classifier for MultinomialNaiveBayes {
    fn algorithm(&self) -> Algorithm {
        Algorithm::MultinomialNaiveBayes
    }

    fn params(&self) -> Params {
        Params::new()
            .with("alpha", self.alpha)
            .with("fit_prior", self.fit_prior)
    }

    fn is_fitted(&self) -> bool {
        !self.classes.is_empty()
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_fit_input(x, y)?;
        if x.iter().any(|&v| v < 0.0) {
            return Err(ClassifierError::DataError(
                "Negative values in data passed to MultinomialNB".to_string(),
            ));
        }
        let n_samples = x.nrows();
        let n_features = x.ncols();
        let classes = unique_classes(y);
        let n_classes = classes.len();

        let mut feature_log_probs = Vec::with_capacity(n_classes);
        let mut class_log_priors = Vec::with_capacity(n_classes);

        for &class in &classes {
            let mut feature_counts = vec![self.alpha; n_features];
            let mut class_count = 0usize;
            for (row, _) in x.rows().into_iter().zip(y.iter()).filter(|(_, &label)| label == class) {
                class_count += 1;
                for (j, &val) in row.iter().enumerate() {
                    feature_counts[j] += val;
                }
            }
            let total: f64 = feature_counts.iter().sum();
            feature_log_probs.push(feature_counts.iter().map(|&c| (c / total).ln()).collect());
            class_log_priors.push(if self.fit_prior {
                (class_count as f64 / n_samples as f64).ln()
            } else {
                -(n_classes as f64).ln()
            });
        }

        self.feature_log_probs = feature_log_probs;
        self.class_log_priors = class_log_priors;
        self.classes = classes;
        self.n_features = n_features;
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let log_probs = self.predict_log_proba(x)?;
        Ok(log_probs
            .rows()
            .into_iter()
            .map(|row| self.classes[argmax(&row.to_vec())])
            .collect())
    }
}

fn population_variance(col: ArrayView1<f64>) -> f64 {
    let n = col.len() as f64;
    if n == 0.0 {
        return 0.0;
    }
    let mean = col.sum() / n;
    col.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n
}

/// Log-sum-exp normalization of each row
fn normalize_log_rows(log_probs: &mut Array2<f64>) {
    for mut row in log_probs.rows_mut() {
        let max_val = row.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let log_sum: f64 = row.iter().map(|&v| (v - max_val).exp()).sum::<f64>().ln();
        row.mapv_inplace(|v| v - max_val - log_sum);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimators::test_data::{accuracy, binary_blobs, three_blobs};
    use ndarray::array;

    #[test]
    fn test_gaussian_nb() {
        let (x, y) = three_blobs();
        let mut model = GaussianNaiveBayes::new();
        model.fit(&x, &y).unwrap();

        let predictions = model.predict(&x).unwrap();
        assert!(accuracy(&y, &predictions) > 0.95);
        assert!((model.class_priors().iter().sum::<f64>() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_gaussian_log_proba_normalized() {
        let (x, y) = binary_blobs();
        let mut model = GaussianNaiveBayes::new();
        model.fit(&x, &y).unwrap();
        let log_probs = model.predict_log_proba(&x).unwrap();
        for row in log_probs.rows() {
            let total: f64 = row.iter().map(|v| v.exp()).sum();
            assert!((total - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_multinomial_nb() {
        let x = array![
            [3.0, 0.0, 1.0],
            [4.0, 1.0, 0.0],
            [5.0, 0.0, 0.0],
            [0.0, 4.0, 1.0],
            [1.0, 5.0, 0.0],
            [0.0, 3.0, 2.0],
        ];
        let y = array![0.0, 0.0, 0.0, 1.0, 1.0, 1.0];
        let mut model = MultinomialNaiveBayes::default();
        model.fit(&x, &y).unwrap();
        assert_eq!(model.predict(&x).unwrap(), y);
    }

    #[test]
    fn test_multinomial_rejects_negative_counts() {
        let x = array![[1.0, -1.0], [0.0, 2.0]];
        let y = array![0.0, 1.0];
        let mut model = MultinomialNaiveBayes::default();
        assert!(matches!(model.fit(&x, &y), Err(ClassifierError::DataError(_))));
    }

    #[test]
    fn test_unknown_key_rejected() {
        let params = Params::new().with("smoothing", 0.5);
        assert!(GaussianNaiveBayes::from_params(&params).is_err());
    }
}
