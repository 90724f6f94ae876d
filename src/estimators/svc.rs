//! Support Vector Classifier
//!
//! Binary problems train a single machine with SMO (Sequential Minimal
//! Optimization); more than two classes are handled One-vs-Rest.

use super::{check_features, check_fit_input, seeded_rng, unique_classes, Classifier, FromParams};
use crate::error::{ClassifierError, Result};
use crate::params::{ParamReader, ParamValue, Params};
use crate::registry::Algorithm;
use ndarray::{Array1, Array2, ArrayView1, Axis};
use rand::Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Maximum number of samples for eager kernel matrix computation.
/// Beyond this, training will return an error to prevent OOM.
const MAX_KERNEL_MATRIX_SAMPLES: usize = 10_000;

/// Kernel function type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KernelType {
    /// K(x, y) = x · y
    Linear,
    /// K(x, y) = (γ * x · y + r)^d
    Polynomial,
    /// K(x, y) = exp(-γ * ||x - y||²)
    Rbf,
    /// K(x, y) = tanh(γ * x · y + r)
    Sigmoid,
}

impl KernelType {
    fn name(&self) -> &'static str {
        match self {
            KernelType::Linear => "linear",
            KernelType::Polynomial => "poly",
            KernelType::Rbf => "rbf",
            KernelType::Sigmoid => "sigmoid",
        }
    }
}

/// Kernel coefficient
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Gamma {
    /// `1 / (n_features * X.var())`
    Scale,
    /// `1 / n_features`
    Auto,
    Value(f64),
}

impl Gamma {
    fn resolve(&self, x: &Array2<f64>) -> f64 {
        let n_features = x.ncols().max(1) as f64;
        match *self {
            Gamma::Scale => {
                let n = x.len().max(1) as f64;
                let mean = x.sum() / n;
                let var = x.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
                if var > 0.0 {
                    1.0 / (n_features * var)
                } else {
                    1.0
                }
            }
            Gamma::Auto => 1.0 / n_features,
            Gamma::Value(g) => g,
        }
    }

    fn to_value(self) -> ParamValue {
        match self {
            Gamma::Scale => "scale".into(),
            Gamma::Auto => "auto".into(),
            Gamma::Value(g) => g.into(),
        }
    }
}

/// Kernel with every coefficient resolved
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct Kernel {
    kind: KernelType,
    gamma: f64,
    degree: i32,
    coef0: f64,
}

impl Kernel {
    fn eval(&self, a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
        match self.kind {
            KernelType::Linear => a.dot(&b),
            KernelType::Polynomial => (self.gamma * a.dot(&b) + self.coef0).powi(self.degree),
            KernelType::Rbf => {
                let norm_sq: f64 = a.iter().zip(b.iter()).map(|(u, v)| (u - v).powi(2)).sum();
                (-self.gamma * norm_sq).exp()
            }
            KernelType::Sigmoid => (self.gamma * a.dot(&b) + self.coef0).tanh(),
        }
    }

    /// Gram matrix, rows computed in parallel
    fn matrix(&self, x: &Array2<f64>) -> Array2<f64> {
        let n = x.nrows();
        let rows: Vec<Vec<f64>> = (0..n)
            .into_par_iter()
            .map(|i| (0..n).map(|j| self.eval(x.row(i), x.row(j))).collect())
            .collect();

        let mut k = Array2::zeros((n, n));
        for (i, row) in rows.into_iter().enumerate() {
            for (j, val) in row.into_iter().enumerate() {
                k[[i, j]] = val;
            }
        }
        k
    }
}

/// A single binary machine, positive class against the rest
#[derive(Debug, Clone, Serialize, Deserialize)]
struct BinarySvm {
    support_vectors: Array2<f64>,
    /// `alpha_i * y_i` per support vector
    dual_coef: Array1<f64>,
    bias: f64,
}

impl BinarySvm {
    fn decision(&self, kernel: &Kernel, sample: ArrayView1<f64>) -> f64 {
        self.support_vectors
            .rows()
            .into_iter()
            .zip(self.dual_coef.iter())
            .map(|(sv, &coef)| coef * kernel.eval(sample, sv))
            .sum::<f64>()
            + self.bias
    }
}

/// Support Vector Classifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SVClassifier {
    /// Regularization parameter (C)
    pub c: f64,
    pub kernel: KernelType,
    pub gamma: Gamma,
    pub degree: usize,
    pub coef0: f64,
    /// Tolerance for stopping criterion
    pub tol: f64,
    /// Maximum number of passes over the data
    pub max_iter: usize,
    pub random_state: Option<u64>,
    fitted_kernel: Option<Kernel>,
    machines: Vec<BinarySvm>,
    classes: Vec<f64>,
    n_features: usize,
}

impl Default for SVClassifier {
    fn default() -> Self {
        Self::new(KernelType::Rbf)
    }
}

impl SVClassifier {
    /// Create a new SVM classifier
    pub fn new(kernel: KernelType) -> Self {
        Self {
            c: 1.0,
            kernel,
            gamma: Gamma::Scale,
            degree: 3,
            coef0: 0.0,
            tol: 1e-3,
            max_iter: 1000,
            random_state: None,
            fitted_kernel: None,
            machines: Vec::new(),
            classes: Vec::new(),
            n_features: 0,
        }
    }

    pub fn with_c(mut self, c: f64) -> Self {
        self.c = c;
        self
    }

    pub fn with_gamma(mut self, gamma: Gamma) -> Self {
        self.gamma = gamma;
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    /// Number of support vectors per machine
    pub fn n_support(&self) -> Vec<usize> {
        self.machines.iter().map(|m| m.support_vectors.nrows()).collect()
    }

    /// SMO training algorithm on labels in {-1, +1}
    fn smo_train(&self, x: &Array2<f64>, k: &Array2<f64>, y: &Array1<f64>, seed_offset: u64) -> BinarySvm {
        let n = x.nrows();
        let c = self.c;
        let mut alphas = Array1::<f64>::zeros(n);
        let mut bias = 0.0;
        let mut rng = seeded_rng(self.random_state.map(|s| s.wrapping_add(seed_offset)));

        let decision = |alphas: &Array1<f64>, bias: f64, idx: usize| -> f64 {
            let mut sum = bias;
            for i in 0..n {
                if alphas[i] != 0.0 {
                    sum += alphas[i] * y[i] * k[[i, idx]];
                }
            }
            sum
        };

        let mut passes = 0;
        let max_passes = 5;
        let mut total_iter = 0;

        while n > 1 && passes < max_passes && total_iter < self.max_iter {
            let mut num_changed = 0;

            for i in 0..n {
                let e_i = decision(&alphas, bias, i) - y[i];

                // Check KKT conditions
                if !((y[i] * e_i < -self.tol && alphas[i] < c) || (y[i] * e_i > self.tol && alphas[i] > 0.0)) {
                    continue;
                }

                let j = loop {
                    let j = rng.gen_range(0..n);
                    if j != i {
                        break j;
                    }
                };
                let e_j = decision(&alphas, bias, j) - y[j];

                let alpha_i_old = alphas[i];
                let alpha_j_old = alphas[j];

                // Compute bounds
                let (l, h) = if y[i] != y[j] {
                    ((alphas[j] - alphas[i]).max(0.0), (c + alphas[j] - alphas[i]).min(c))
                } else {
                    ((alphas[i] + alphas[j] - c).max(0.0), (alphas[i] + alphas[j]).min(c))
                };
                if (l - h).abs() < 1e-10 {
                    continue;
                }

                let eta = 2.0 * k[[i, j]] - k[[i, i]] - k[[j, j]];
                if eta >= 0.0 {
                    continue;
                }

                alphas[j] = (alphas[j] - y[j] * (e_i - e_j) / eta).clamp(l, h);
                if (alphas[j] - alpha_j_old).abs() < 1e-5 {
                    continue;
                }
                alphas[i] += y[i] * y[j] * (alpha_j_old - alphas[j]);

                let b1 = bias
                    - e_i
                    - y[i] * (alphas[i] - alpha_i_old) * k[[i, i]]
                    - y[j] * (alphas[j] - alpha_j_old) * k[[i, j]];
                let b2 = bias
                    - e_j
                    - y[i] * (alphas[i] - alpha_i_old) * k[[i, j]]
                    - y[j] * (alphas[j] - alpha_j_old) * k[[j, j]];

                bias = if alphas[i] > 0.0 && alphas[i] < c {
                    b1
                } else if alphas[j] > 0.0 && alphas[j] < c {
                    b2
                } else {
                    (b1 + b2) / 2.0
                };
                num_changed += 1;
            }

            total_iter += 1;
            if num_changed == 0 {
                passes += 1;
            } else {
                passes = 0;
            }
        }

        // Support vectors have alpha > 0
        let support: Vec<usize> = (0..n).filter(|&i| alphas[i] > 1e-8).collect();
        BinarySvm {
            support_vectors: x.select(Axis(0), &support),
            dual_coef: support.iter().map(|&i| alphas[i] * y[i]).collect(),
            bias,
        }
    }

    /// Decision values, one column per machine
    pub fn decision_function(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let kernel = self.fitted_kernel.as_ref().ok_or(ClassifierError::ModelNotFitted)?;
        check_features(self.n_features, x)?;

        let rows: Vec<Vec<f64>> = (0..x.nrows())
            .into_par_iter()
            .map(|i| self.machines.iter().map(|m| m.decision(kernel, x.row(i))).collect())
            .collect();

        let mut scores = Array2::zeros((x.nrows(), self.machines.len()));
        for (i, row) in rows.into_iter().enumerate() {
            for (j, val) in row.into_iter().enumerate() {
                scores[[i, j]] = val;
            }
        }
        Ok(scores)
    }
}

impl FromParams for SVClassifier {
    fn from_params(params: &Params) -> Result<Self> {
        let mut reader = ParamReader::new("SVC", params);
        let c = reader.positive_f64("C", 1.0)?;
        let kernel = match reader.choice("kernel", "rbf", &["linear", "poly", "rbf", "sigmoid"])? {
            "linear" => KernelType::Linear,
            "poly" => KernelType::Polynomial,
            "sigmoid" => KernelType::Sigmoid,
            _ => KernelType::Rbf,
        };
        let gamma = match reader.value("gamma") {
            None => Gamma::Scale,
            Some(ParamValue::Str(s)) if s == "scale" => Gamma::Scale,
            Some(ParamValue::Str(s)) if s == "auto" => Gamma::Auto,
            Some(v) => match v.as_f64() {
                Some(g) if g > 0.0 => Gamma::Value(g),
                _ => return Err(reader.invalid("gamma", v, "expected 'scale', 'auto' or a positive number")),
            },
        };
        let degree = reader.usize("degree", 3)?;
        let coef0 = reader.f64("coef0", 0.0)?;
        let tol = reader.positive_f64("tol", 1e-3)?;
        let max_iter = reader.usize("max_iter", 1000)?;
        let random_state = reader.opt_u64("random_state")?;
        reader.finish()?;

        Ok(Self {
            c,
            gamma,
            degree,
            coef0,
            tol,
            max_iter,
            random_state,
            ..Self::new(kernel)
        })
    }
}

impl Classifier for SVClassifier {
    fn algorithm(&self) -> Algorithm {
        Algorithm::Svc
    }

    fn params(&self) -> Params {
        Params::new()
            .with("C", self.c)
            .with("kernel", self.kernel.name())
            .with("gamma", self.gamma.to_value())
            .with("degree", self.degree)
            .with("coef0", self.coef0)
            .with("tol", self.tol)
            .with("max_iter", self.max_iter)
            .with("random_state", self.random_state)
    }

    fn is_fitted(&self) -> bool {
        self.fitted_kernel.is_some()
    }

    /// Fit the classifier (binary directly, multi-class via One-vs-Rest)
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_fit_input(x, y)?;
        let n = x.nrows();
        if n > MAX_KERNEL_MATRIX_SAMPLES {
            return Err(ClassifierError::InvalidInput(format!(
                "Dataset has {} samples, exceeding the maximum {} for SVM kernel matrix. \
                 Consider subsampling or using a different algorithm.",
                n, MAX_KERNEL_MATRIX_SAMPLES
            )));
        }

        let classes = unique_classes(y);
        if classes.len() < 2 {
            return Err(ClassifierError::InvalidInput(
                "SVM requires at least 2 distinct classes".to_string(),
            ));
        }

        let kernel = Kernel {
            kind: self.kernel,
            gamma: self.gamma.resolve(x),
            degree: self.degree.min(i32::MAX as usize) as i32,
            coef0: self.coef0,
        };
        let k = kernel.matrix(x);

        // Binary problems train one machine for the greater label
        let positives: Vec<f64> = if classes.len() == 2 { vec![classes[1]] } else { classes.clone() };
        let machines: Vec<BinarySvm> = positives
            .iter()
            .enumerate()
            .map(|(idx, &positive)| {
                let y_binary = y.mapv(|v| if v == positive { 1.0 } else { -1.0 });
                self.smo_train(x, &k, &y_binary, idx as u64)
            })
            .collect();

        self.fitted_kernel = Some(kernel);
        self.machines = machines;
        self.classes = classes;
        self.n_features = x.ncols();
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let scores = self.decision_function(x)?;
        let predictions = scores
            .rows()
            .into_iter()
            .map(|row| {
                if self.classes.len() == 2 {
                    if row[0] >= 0.0 {
                        self.classes[1]
                    } else {
                        self.classes[0]
                    }
                } else {
                    self.classes[super::argmax(&row.to_vec())]
                }
            })
            .collect();
        Ok(predictions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimators::test_data::{accuracy, binary_blobs, three_blobs};
    use ndarray::array;

    #[test]
    fn test_svc_binary_rbf() {
        let (x, y) = binary_blobs();
        let mut svc = SVClassifier::default().with_random_state(42);
        svc.fit(&x, &y).unwrap();
        assert_eq!(accuracy(&y, &svc.predict(&x).unwrap()), 1.0);
        assert_eq!(svc.n_support().len(), 1);
    }

    #[test]
    fn test_svc_linear_multiclass() {
        let (x, y) = three_blobs();
        let mut svc = SVClassifier::new(KernelType::Linear).with_random_state(42);
        svc.fit(&x, &y).unwrap();
        assert!(accuracy(&y, &svc.predict(&x).unwrap()) > 0.9);
        assert_eq!(svc.decision_function(&x).unwrap().ncols(), 3);
    }

    #[test]
    fn test_single_class_rejected() {
        let x = array![[0.0], [1.0]];
        let y = array![1.0, 1.0];
        let mut svc = SVClassifier::default();
        assert!(matches!(svc.fit(&x, &y), Err(ClassifierError::InvalidInput(_))));
    }

    #[test]
    fn test_gamma_param() {
        let svc = SVClassifier::from_params(&Params::new().with("gamma", "auto")).unwrap();
        assert_eq!(svc.gamma, Gamma::Auto);
        let svc = SVClassifier::from_params(&Params::new().with("gamma", 0.5)).unwrap();
        assert_eq!(svc.gamma, Gamma::Value(0.5));
        assert!(SVClassifier::from_params(&Params::new().with("gamma", "wide")).is_err());
        assert!(SVClassifier::from_params(&Params::new().with("kernel", "cubic")).is_err());
    }
}
