//! Baseline classifier that ignores the features

use super::{check_fit_input, seeded_rng, unique_classes, Classifier, FromParams};
use crate::error::{ClassifierError, Result};
use crate::params::{ParamReader, ParamValue, Params};
use crate::registry::Algorithm;
use ndarray::{Array1, Array2};
use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Prediction strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DummyStrategy {
    /// Most frequent training label
    Prior,
    /// Most frequent training label
    MostFrequent,
    /// Random labels drawn from the training class distribution
    Stratified,
    /// Random labels drawn uniformly from the training classes
    Uniform,
    /// Always the user-supplied `constant`
    Constant,
}

impl DummyStrategy {
    fn name(&self) -> &'static str {
        match self {
            DummyStrategy::Prior => "prior",
            DummyStrategy::MostFrequent => "most_frequent",
            DummyStrategy::Stratified => "stratified",
            DummyStrategy::Uniform => "uniform",
            DummyStrategy::Constant => "constant",
        }
    }

    fn parse(name: &str) -> Self {
        match name {
            "most_frequent" => DummyStrategy::MostFrequent,
            "stratified" => DummyStrategy::Stratified,
            "uniform" => DummyStrategy::Uniform,
            "constant" => DummyStrategy::Constant,
            _ => DummyStrategy::Prior,
        }
    }
}

/// Dummy classifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DummyClassifier {
    pub strategy: DummyStrategy,
    pub constant: Option<f64>,
    pub random_state: Option<u64>,
    classes: Vec<f64>,
    priors: Vec<f64>,
    /// Seed fixed at fit time so predictions repeat until the next fit
    predict_seed: u64,
    is_fitted: bool,
}

impl DummyClassifier {
    pub fn new(strategy: DummyStrategy) -> Self {
        Self {
            strategy,
            constant: None,
            random_state: None,
            classes: Vec::new(),
            priors: Vec::new(),
            predict_seed: 0,
            is_fitted: false,
        }
    }

    pub fn with_constant(mut self, constant: f64) -> Self {
        self.constant = Some(constant);
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    /// Class priors observed during fit, aligned with the sorted classes
    pub fn class_prior(&self) -> &[f64] {
        &self.priors
    }

    fn most_frequent(&self) -> f64 {
        let mut best = 0;
        for (i, &p) in self.priors.iter().enumerate() {
            if p > self.priors[best] {
                best = i;
            }
        }
        self.classes[best]
    }
}

impl Default for DummyClassifier {
    fn default() -> Self {
        Self::new(DummyStrategy::Prior)
    }
}

impl FromParams for DummyClassifier {
    fn from_params(params: &Params) -> Result<Self> {
        let mut reader = ParamReader::new("Dummy", params);
        let strategy = reader.choice(
            "strategy",
            "prior",
            &["prior", "most_frequent", "stratified", "uniform", "constant"],
        )?;
        let constant = match reader.value("constant") {
            None | Some(ParamValue::None) => None,
            Some(v) => Some(
                v.as_f64()
                    .ok_or_else(|| reader.invalid("constant", v, "expected a class label"))?,
            ),
        };
        let random_state = reader.opt_u64("random_state")?;
        reader.finish()?;

        Ok(Self {
            constant,
            random_state,
            ..Self::new(DummyStrategy::parse(strategy))
        })
    }
}

impl Classifier for DummyClassifier {
    fn algorithm(&self) -> Algorithm {
        Algorithm::Dummy
    }

    fn params(&self) -> Params {
        Params::new()
            .with("strategy", self.strategy.name())
            .with("constant", self.constant)
            .with("random_state", self.random_state)
    }

    fn is_fitted(&self) -> bool {
        self.is_fitted
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_fit_input(x, y)?;

        let classes = unique_classes(y);
        let n = y.len() as f64;
        let priors: Vec<f64> = classes
            .iter()
            .map(|&c| y.iter().filter(|&&v| v == c).count() as f64 / n)
            .collect();

        if self.strategy == DummyStrategy::Constant {
            let constant = self.constant.ok_or_else(|| {
                ClassifierError::ConfigError(
                    "Constant target value has to be specified when the constant strategy is used"
                        .to_string(),
                )
            })?;
            if !classes.contains(&constant) {
                return Err(ClassifierError::ValidationError(format!(
                    "The constant target value {} must be present in the training data",
                    constant
                )));
            }
        }

        self.classes = classes;
        self.priors = priors;
        self.predict_seed = self.random_state.unwrap_or_else(|| seeded_rng(None).gen());
        self.is_fitted = true;
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if !self.is_fitted {
            return Err(ClassifierError::ModelNotFitted);
        }
        let n = x.nrows();

        let predictions = match self.strategy {
            DummyStrategy::Prior | DummyStrategy::MostFrequent => {
                Array1::from_elem(n, self.most_frequent())
            }
            DummyStrategy::Constant => {
                Array1::from_elem(n, self.constant.ok_or(ClassifierError::ModelNotFitted)?)
            }
            DummyStrategy::Stratified => {
                let mut rng = seeded_rng(Some(self.predict_seed));
                let dist = WeightedIndex::new(&self.priors)
                    .map_err(|e| ClassifierError::ComputationError(e.to_string()))?;
                (0..n).map(|_| self.classes[dist.sample(&mut rng)]).collect()
            }
            DummyStrategy::Uniform => {
                let mut rng = seeded_rng(Some(self.predict_seed));
                (0..n)
                    .map(|_| self.classes[rng.gen_range(0..self.classes.len())])
                    .collect()
            }
        };

        Ok(predictions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_prior_predicts_majority() {
        let x = Array2::<f64>::zeros((5, 2));
        let y = array![1.0, 1.0, 0.0, 1.0, 0.0];
        let mut model = DummyClassifier::default();
        model.fit(&x, &y).unwrap();

        let pred = model.predict(&Array2::zeros((3, 2))).unwrap();
        assert_eq!(pred, array![1.0, 1.0, 1.0]);
        assert!((model.class_prior()[1] - 0.6).abs() < 1e-12);
    }

    #[test]
    fn test_two_row_prediction() {
        let x = array![[0.0, 1.0], [1.0, 0.0]];
        let y = array![0.0, 1.0];
        let mut model = DummyClassifier::from_params(&Params::new()).unwrap();
        model.fit(&x, &y).unwrap();
        assert_eq!(model.predict(&x).unwrap().len(), 2);
    }

    #[test]
    fn test_constant_requires_value() {
        let x = Array2::<f64>::zeros((2, 1));
        let y = array![0.0, 1.0];
        let mut model = DummyClassifier::new(DummyStrategy::Constant);
        assert!(model.fit(&x, &y).is_err());

        let mut model = DummyClassifier::new(DummyStrategy::Constant).with_constant(1.0);
        model.fit(&x, &y).unwrap();
        assert_eq!(model.predict(&x).unwrap(), array![1.0, 1.0]);
    }

    #[test]
    fn test_stratified_is_reproducible_with_seed() {
        let x = Array2::<f64>::zeros((50, 1));
        let y: Array1<f64> = (0..50).map(|i| (i % 3) as f64).collect();
        let mut model = DummyClassifier::new(DummyStrategy::Stratified).with_random_state(7);
        model.fit(&x, &y).unwrap();
        assert_eq!(model.predict(&x).unwrap(), model.predict(&x).unwrap());
    }

    #[test]
    fn test_unseeded_predictions_repeat_between_fits() {
        let x = Array2::<f64>::zeros((40, 1));
        let y: Array1<f64> = (0..40).map(|i| (i % 2) as f64).collect();
        for strategy in [DummyStrategy::Stratified, DummyStrategy::Uniform] {
            let mut model = DummyClassifier::new(strategy);
            model.fit(&x, &y).unwrap();
            let first = model.score(&x, &y).unwrap();
            for _ in 0..4 {
                assert_eq!(model.score(&x, &y).unwrap(), first);
            }
            assert_eq!(model.predict(&x).unwrap(), model.predict(&x).unwrap());
        }
    }

    #[test]
    fn test_unknown_strategy_rejected() {
        let params = Params::new().with("strategy", "median");
        assert!(DummyClassifier::from_params(&params).is_err());
    }
}
