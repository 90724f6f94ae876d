//! Multi-Layer Perceptron classifier
//!
//! A feedforward network with a softmax output, trained by mini-batch SGD
//! with momentum on the cross-entropy loss.

use super::decision_tree::encode_labels;
use super::{argmax, check_features, check_fit_input, seeded_rng, unique_classes, Classifier, FromParams};
use crate::error::{ClassifierError, Result};
use crate::params::{ParamReader, ParamValue, Params};
use crate::registry::Algorithm;
use ndarray::{Array1, Array2, Axis};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Consecutive epochs without `tol` improvement before training stops
const N_ITER_NO_CHANGE: usize = 10;

/// Hidden layer activation function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Activation {
    /// Rectified Linear Unit
    ReLU,
    /// Sigmoid
    Logistic,
    /// Hyperbolic tangent
    Tanh,
    /// Linear (identity)
    Identity,
}

impl Activation {
    fn name(&self) -> &'static str {
        match self {
            Activation::ReLU => "relu",
            Activation::Logistic => "logistic",
            Activation::Tanh => "tanh",
            Activation::Identity => "identity",
        }
    }

    fn apply(&self, z: &Array2<f64>) -> Array2<f64> {
        match self {
            Activation::ReLU => z.mapv(|v| v.max(0.0)),
            Activation::Logistic => z.mapv(|v| 1.0 / (1.0 + (-v).exp())),
            Activation::Tanh => z.mapv(|v| v.tanh()),
            Activation::Identity => z.clone(),
        }
    }

    /// Derivative expressed through the activation output `a`
    fn derivative(&self, a: &Array2<f64>) -> Array2<f64> {
        match self {
            Activation::ReLU => a.mapv(|v| if v > 0.0 { 1.0 } else { 0.0 }),
            Activation::Logistic => a.mapv(|v| v * (1.0 - v)),
            Activation::Tanh => a.mapv(|v| 1.0 - v * v),
            Activation::Identity => Array2::ones(a.raw_dim()),
        }
    }
}

fn softmax(z: &mut Array2<f64>) {
    for mut row in z.rows_mut() {
        let max = row.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        row.mapv_inplace(|v| (v - max).exp());
        let exp_sum = row.sum();
        row /= exp_sum;
    }
}

/// Multi-Layer Perceptron Classifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MLPClassifier {
    /// Hidden layer sizes
    pub hidden_layer_sizes: Vec<usize>,
    /// Activation function for hidden layers
    pub activation: Activation,
    /// L2 regularization
    pub alpha: f64,
    pub learning_rate_init: f64,
    /// Number of epochs
    pub max_iter: usize,
    pub batch_size: usize,
    pub momentum: f64,
    pub tol: f64,
    pub random_state: Option<u64>,
    weights: Vec<Array2<f64>>,
    biases: Vec<Array1<f64>>,
    feature_means: Array1<f64>,
    feature_scales: Array1<f64>,
    classes: Vec<f64>,
    loss_curve: Vec<f64>,
}

impl Default for MLPClassifier {
    fn default() -> Self {
        Self::new(vec![100])
    }
}

impl MLPClassifier {
    pub fn new(hidden_layer_sizes: Vec<usize>) -> Self {
        Self {
            hidden_layer_sizes,
            activation: Activation::ReLU,
            alpha: 1e-4,
            learning_rate_init: 0.001,
            max_iter: 200,
            batch_size: 200,
            momentum: 0.9,
            tol: 1e-4,
            random_state: None,
            weights: Vec::new(),
            biases: Vec::new(),
            feature_means: Array1::zeros(0),
            feature_scales: Array1::zeros(0),
            classes: Vec::new(),
            loss_curve: Vec::new(),
        }
    }

    pub fn with_activation(mut self, activation: Activation) -> Self {
        self.activation = activation;
        self
    }

    pub fn with_learning_rate(mut self, lr: f64) -> Self {
        self.learning_rate_init = lr;
        self
    }

    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    /// Mean training loss of every epoch run
    pub fn loss_curve(&self) -> &[f64] {
        &self.loss_curve
    }

    /// Predict class probabilities
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if self.weights.is_empty() {
            return Err(ClassifierError::ModelNotFitted);
        }
        check_features(self.feature_means.len(), x)?;
        let mut activations = self.forward(&self.standardize(x));
        activations.pop().ok_or(ClassifierError::ModelNotFitted)
    }

    fn standardize(&self, x: &Array2<f64>) -> Array2<f64> {
        (x - &self.feature_means.view().insert_axis(Axis(0))) / &self.feature_scales.view().insert_axis(Axis(0))
    }

    fn initialize_weights(&mut self, n_features: usize, n_outputs: usize, rng: &mut impl Rng) {
        self.weights.clear();
        self.biases.clear();

        let mut layer_sizes = vec![n_features];
        layer_sizes.extend(&self.hidden_layer_sizes);
        layer_sizes.push(n_outputs);

        for pair in layer_sizes.windows(2) {
            let (n_in, n_out) = (pair[0], pair[1]);
            let scale = (6.0 / (n_in + n_out) as f64).sqrt();
            self.weights
                .push(Array2::from_shape_fn((n_in, n_out), |_| rng.gen_range(-scale..scale)));
            self.biases
                .push(Array1::from_shape_fn(n_out, |_| rng.gen_range(-scale..scale)));
        }
    }

    /// Layer outputs, input first and softmax output last
    fn forward(&self, x: &Array2<f64>) -> Vec<Array2<f64>> {
        let mut activations = vec![x.clone()];
        let last = self.weights.len() - 1;

        for (i, (w, b)) in self.weights.iter().zip(self.biases.iter()).enumerate() {
            let z = activations[i].dot(w) + b;
            let a = if i < last {
                self.activation.apply(&z)
            } else {
                let mut out = z;
                softmax(&mut out);
                out
            };
            activations.push(a);
        }

        activations
    }

    fn backward(&self, y_onehot: &Array2<f64>, activations: &[Array2<f64>]) -> Vec<(Array2<f64>, Array1<f64>)> {
        let n = y_onehot.nrows() as f64;
        let mut gradients = Vec::with_capacity(self.weights.len());

        // Cross-entropy gradient with softmax
        let mut delta = match activations.last() {
            Some(output) => (output - y_onehot) / n,
            None => return gradients,
        };

        for i in (0..self.weights.len()).rev() {
            let grad_w = activations[i].t().dot(&delta) + &self.weights[i] * (self.alpha / n);
            let grad_b = delta.sum_axis(Axis(0));

            if i > 0 {
                delta = delta.dot(&self.weights[i].t()) * self.activation.derivative(&activations[i]);
            }
            gradients.push((grad_w, grad_b));
        }

        gradients.reverse();
        gradients
    }

    fn cross_entropy(proba: &Array2<f64>, y_onehot: &Array2<f64>) -> f64 {
        let n = proba.nrows() as f64;
        -proba
            .iter()
            .zip(y_onehot.iter())
            .filter(|(_, &t)| t > 0.0)
            .map(|(&p, _)| p.max(1e-15).ln())
            .sum::<f64>()
            / n
    }
}

impl FromParams for MLPClassifier {
    fn from_params(params: &Params) -> Result<Self> {
        let mut reader = ParamReader::new("MLP", params);
        let hidden_layer_sizes = match reader.value("hidden_layer_sizes") {
            None => vec![100],
            Some(ParamValue::Int(n)) if *n >= 1 => vec![*n as usize],
            Some(value @ ParamValue::List(items)) => items
                .iter()
                .map(|item| match item.as_i64() {
                    Some(n) if n >= 1 => Ok(n as usize),
                    _ => Err(reader.invalid("hidden_layer_sizes", value, "layer sizes must be positive integers")),
                })
                .collect::<Result<Vec<_>>>()?,
            Some(other) => return Err(reader.invalid("hidden_layer_sizes", other, "expected a sequence of layer sizes")),
        };
        let activation = match reader.choice("activation", "relu", &["relu", "tanh", "logistic", "identity"])? {
            "tanh" => Activation::Tanh,
            "logistic" => Activation::Logistic,
            "identity" => Activation::Identity,
            _ => Activation::ReLU,
        };
        let alpha = reader.f64("alpha", 1e-4)?;
        let learning_rate_init = reader.positive_f64("learning_rate_init", 0.001)?;
        let max_iter = reader.usize("max_iter", 200)?;
        let batch_size = reader.usize("batch_size", 200)?;
        if batch_size == 0 {
            return Err(ClassifierError::invalid_parameter("batch_size", 0, "must be at least 1"));
        }
        let momentum = reader.f64("momentum", 0.9)?;
        if !(0.0..=1.0).contains(&momentum) {
            return Err(ClassifierError::invalid_parameter("momentum", momentum, "must be in [0, 1]"));
        }
        let tol = reader.f64("tol", 1e-4)?;
        let random_state = reader.opt_u64("random_state")?;
        reader.finish()?;

        Ok(Self {
            activation,
            alpha,
            learning_rate_init,
            max_iter,
            batch_size,
            momentum,
            tol,
            random_state,
            ..Self::new(hidden_layer_sizes)
        })
    }
}

impl Classifier for MLPClassifier {
    fn algorithm(&self) -> Algorithm {
        Algorithm::Mlp
    }

    fn params(&self) -> Params {
        Params::new()
            .with("hidden_layer_sizes", self.hidden_layer_sizes.clone())
            .with("activation", self.activation.name())
            .with("alpha", self.alpha)
            .with("learning_rate_init", self.learning_rate_init)
            .with("max_iter", self.max_iter)
            .with("batch_size", self.batch_size)
            .with("momentum", self.momentum)
            .with("tol", self.tol)
            .with("random_state", self.random_state)
    }

    fn is_fitted(&self) -> bool {
        !self.weights.is_empty()
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_fit_input(x, y)?;
        let n_samples = x.nrows();
        let n_features = x.ncols();
        let classes = unique_classes(y);
        let encoded = encode_labels(y, &classes)?;

        let mut rng = seeded_rng(self.random_state);
        self.feature_means = x.mean_axis(Axis(0)).unwrap_or_else(|| Array1::zeros(n_features));
        self.feature_scales = x
            .std_axis(Axis(0), 0.0)
            .mapv(|s| if s > 1e-12 { s } else { 1.0 });
        let xs = self.standardize(x);

        let mut y_onehot = Array2::<f64>::zeros((n_samples, classes.len()));
        for (i, &label) in encoded.iter().enumerate() {
            y_onehot[[i, label]] = 1.0;
        }

        self.initialize_weights(n_features, classes.len(), &mut rng);

        // Initialize velocity for momentum
        let mut velocities_w: Vec<Array2<f64>> = self.weights.iter().map(|w| Array2::zeros(w.raw_dim())).collect();
        let mut velocities_b: Vec<Array1<f64>> = self.biases.iter().map(|b| Array1::zeros(b.len())).collect();

        let batch_size = self.batch_size.min(n_samples);
        let lr = self.learning_rate_init;
        let mut indices: Vec<usize> = (0..n_samples).collect();
        let mut loss_curve = Vec::new();
        let mut best_loss = f64::INFINITY;
        let mut no_improvement = 0;

        for epoch in 0..self.max_iter {
            indices.shuffle(&mut rng);
            let mut epoch_loss = 0.0;

            for batch in indices.chunks(batch_size) {
                let x_batch = xs.select(Axis(0), batch);
                let y_batch = y_onehot.select(Axis(0), batch);

                let activations = self.forward(&x_batch);
                if let Some(output) = activations.last() {
                    epoch_loss += Self::cross_entropy(output, &y_batch) * batch.len() as f64;
                }
                let gradients = self.backward(&y_batch, &activations);

                for (i, (grad_w, grad_b)) in gradients.into_iter().enumerate() {
                    velocities_w[i] = &velocities_w[i] * self.momentum - &grad_w * lr;
                    velocities_b[i] = &velocities_b[i] * self.momentum - &grad_b * lr;
                    self.weights[i] += &velocities_w[i];
                    self.biases[i] += &velocities_b[i];
                }
            }

            let loss = epoch_loss / n_samples as f64;
            loss_curve.push(loss);

            if loss > best_loss - self.tol {
                no_improvement += 1;
            } else {
                no_improvement = 0;
            }
            best_loss = best_loss.min(loss);
            if no_improvement >= N_ITER_NO_CHANGE {
                debug!(epoch, loss, "MLP training loss stopped improving");
                break;
            }
        }

        self.classes = classes;
        self.loss_curve = loss_curve;
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimators::test_data::{accuracy, binary_blobs, three_blobs};

    #[test]
    fn test_mlp_classifier() {
        let (x, y) = binary_blobs();
        let mut mlp = MLPClassifier::new(vec![16])
            .with_learning_rate(0.05)
            .with_random_state(42);
        mlp.fit(&x, &y).unwrap();

        assert_eq!(accuracy(&y, &mlp.predict(&x).unwrap()), 1.0);
        assert!(!mlp.loss_curve().is_empty());
    }

    #[test]
    fn test_mlp_multiclass_proba() {
        let (x, y) = three_blobs();
        let mut mlp = MLPClassifier::new(vec![16, 8])
            .with_activation(Activation::Tanh)
            .with_learning_rate(0.05)
            .with_random_state(7);
        mlp.fit(&x, &y).unwrap();

        let proba = mlp.predict_proba(&x).unwrap();
        assert_eq!(proba.dim(), (18, 3));
        for row in proba.rows() {
            assert!((row.sum() - 1.0).abs() < 1e-9);
        }
        assert!(accuracy(&y, &mlp.predict(&x).unwrap()) > 0.9);
    }

    #[test]
    fn test_activation_functions() {
        let z = Array2::from_shape_vec((2, 3), vec![-1.0, 0.0, 1.0, -2.0, 0.5, 2.0]).unwrap();

        let relu = Activation::ReLU.apply(&z);
        assert_eq!(relu[[0, 0]], 0.0);
        assert_eq!(relu[[0, 2]], 1.0);

        let sigmoid = Activation::Logistic.apply(&z);
        assert!((sigmoid[[0, 1]] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_hidden_layer_sizes_param() {
        let params = Params::new().with("hidden_layer_sizes", vec![64, 32]);
        let mlp = MLPClassifier::from_params(&params).unwrap();
        assert_eq!(mlp.hidden_layer_sizes, vec![64, 32]);
        assert_eq!(mlp.params().get("hidden_layer_sizes").unwrap().to_string(), "(64, 32)");

        let bad = Params::new().with("hidden_layer_sizes", vec![0]);
        assert!(MLPClassifier::from_params(&bad).is_err());
    }
}
