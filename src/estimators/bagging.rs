//! Bagging classifier
//!
//! Fits unpruned decision trees on random subsets of the samples and of the
//! features, then averages their class probabilities.

use super::decision_tree::{encode_labels, DecisionTreeClassifier};
use super::{argmax, check_features, check_fit_input, seeded_rng, unique_classes, Classifier, FromParams};
use crate::error::{ClassifierError, Result};
use crate::params::{ParamReader, ParamValue, Params};
use crate::registry::Algorithm;
use ndarray::{Array1, Array2, Axis};
use rand::seq::index::sample;
use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Draw `amount` indices out of `0..population`
pub(crate) fn draw_indices(rng: &mut ChaCha8Rng, population: usize, amount: usize, replace: bool) -> Vec<usize> {
    if replace {
        (0..amount).map(|_| rng.gen_range(0..population)).collect()
    } else {
        sample(rng, population, amount.min(population)).into_vec()
    }
}

/// How many samples or features each estimator sees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum DrawSize {
    Count(usize),
    Fraction(f64),
}

impl DrawSize {
    fn resolve(&self, population: usize) -> usize {
        match *self {
            DrawSize::Count(n) => n,
            DrawSize::Fraction(f) => (f * population as f64) as usize,
        }
        .max(1)
    }

    fn to_value(self) -> ParamValue {
        match self {
            DrawSize::Count(n) => n.into(),
            DrawSize::Fraction(f) => f.into(),
        }
    }

    fn read(reader: &mut ParamReader<'_>, key: &'static str) -> Result<DrawSize> {
        match reader.value(key) {
            None => Ok(DrawSize::Fraction(1.0)),
            Some(ParamValue::Int(n)) if *n >= 1 => Ok(DrawSize::Count(*n as usize)),
            Some(ParamValue::Float(f)) if *f > 0.0 && *f <= 1.0 => Ok(DrawSize::Fraction(*f)),
            Some(other) => Err(reader.invalid(key, other, "expected a positive integer or a fraction in (0, 1]")),
        }
    }
}

/// One fitted member of the ensemble and the features it was trained on
#[derive(Debug, Clone, Serialize, Deserialize)]
struct BaggedTree {
    tree: DecisionTreeClassifier,
    features: Vec<usize>,
}

/// Bagging ensemble of decision trees
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaggingClassifier {
    pub n_estimators: usize,
    pub max_samples: DrawSize,
    pub max_features: DrawSize,
    /// Draw samples with replacement
    pub bootstrap: bool,
    /// Draw features with replacement
    pub bootstrap_features: bool,
    pub random_state: Option<u64>,
    estimators: Vec<BaggedTree>,
    n_features: usize,
    classes: Vec<f64>,
}

impl Default for BaggingClassifier {
    fn default() -> Self {
        Self::new(10)
    }
}

impl BaggingClassifier {
    pub fn new(n_estimators: usize) -> Self {
        Self {
            n_estimators,
            max_samples: DrawSize::Fraction(1.0),
            max_features: DrawSize::Fraction(1.0),
            bootstrap: true,
            bootstrap_features: false,
            random_state: None,
            estimators: Vec::new(),
            n_features: 0,
            classes: Vec::new(),
        }
    }

    pub fn with_max_samples(mut self, max_samples: DrawSize) -> Self {
        self.max_samples = max_samples;
        self
    }

    pub fn with_max_features(mut self, max_features: DrawSize) -> Self {
        self.max_features = max_features;
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    /// Mean of the members' class probabilities
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if self.estimators.is_empty() {
            return Err(ClassifierError::ModelNotFitted);
        }
        check_features(self.n_features, x)?;

        let all_proba: Vec<Array2<f64>> = self
            .estimators
            .par_iter()
            .map(|member| member.tree.predict_proba(&x.select(Axis(1), &member.features)))
            .collect::<Result<_>>()?;

        let mut proba = Array2::zeros((x.nrows(), self.classes.len()));
        for member_proba in &all_proba {
            proba += member_proba;
        }
        proba /= all_proba.len() as f64;
        Ok(proba)
    }

    pub fn n_estimators_fitted(&self) -> usize {
        self.estimators.len()
    }
}

impl FromParams for BaggingClassifier {
    fn from_params(params: &Params) -> Result<Self> {
        let mut reader = ParamReader::new("Bagging", params);
        let n_estimators = reader.usize("n_estimators", 10)?;
        if n_estimators == 0 {
            return Err(ClassifierError::invalid_parameter("n_estimators", 0, "must be at least 1"));
        }
        let max_samples = DrawSize::read(&mut reader, "max_samples")?;
        let max_features = DrawSize::read(&mut reader, "max_features")?;
        let bootstrap = reader.bool("bootstrap", true)?;
        let bootstrap_features = reader.bool("bootstrap_features", false)?;
        let random_state = reader.opt_u64("random_state")?;
        reader.finish()?;

        Ok(Self {
            max_samples,
            max_features,
            bootstrap,
            bootstrap_features,
            random_state,
            ..Self::new(n_estimators)
        })
    }
}

impl Classifier for BaggingClassifier {
    fn algorithm(&self) -> Algorithm {
        Algorithm::Bagging
    }

    fn params(&self) -> Params {
        Params::new()
            .with("n_estimators", self.n_estimators)
            .with("max_samples", self.max_samples.to_value())
            .with("max_features", self.max_features.to_value())
            .with("bootstrap", self.bootstrap)
            .with("bootstrap_features", self.bootstrap_features)
            .with("random_state", self.random_state)
    }

    fn is_fitted(&self) -> bool {
        !self.estimators.is_empty()
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_fit_input(x, y)?;
        let n_samples = x.nrows();
        let n_features = x.ncols();
        let n_draw = self.max_samples.resolve(n_samples);
        let n_feat = self.max_features.resolve(n_features);
        if !self.bootstrap && n_draw > n_samples {
            return Err(ClassifierError::ValidationError(format!(
                "max_samples ({}) must be at most the number of samples ({}) without bootstrap",
                n_draw, n_samples
            )));
        }
        if !self.bootstrap_features && n_feat > n_features {
            return Err(ClassifierError::ValidationError(format!(
                "max_features ({}) must be at most the number of features ({}) without bootstrap_features",
                n_feat, n_features
            )));
        }

        let classes = unique_classes(y);
        let encoded = encode_labels(y, &classes)?;
        let base_seed = self
            .random_state
            .unwrap_or_else(|| seeded_rng(None).next_u64());

        let estimators: Vec<BaggedTree> = (0..self.n_estimators)
            .into_par_iter()
            .map(|idx| -> Result<BaggedTree> {
                let mut rng = ChaCha8Rng::seed_from_u64(base_seed.wrapping_add(idx as u64));

                let mut features = if !self.bootstrap_features && n_feat == n_features {
                    (0..n_features).collect()
                } else {
                    draw_indices(&mut rng, n_features, n_feat, self.bootstrap_features)
                };
                features.sort_unstable();
                let rows = draw_indices(&mut rng, n_samples, n_draw, self.bootstrap);

                let x_sub = x.select(Axis(0), &rows).select(Axis(1), &features);
                let y_sub: Vec<usize> = rows.iter().map(|&i| encoded[i]).collect();

                let mut tree = DecisionTreeClassifier::new().with_random_state(rng.next_u64());
                tree.fit_encoded(&x_sub, &y_sub, &vec![1.0; rows.len()], classes.clone())?;
                Ok(BaggedTree { tree, features })
            })
            .collect::<Result<_>>()?;

        self.estimators = estimators;
        self.n_features = n_features;
        self.classes = classes;
        Ok(())
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
    use crate::estimators::test_data::{accuracy, binary_blobs, three_blobs};

    #[test]
    fn test_bagging_fits_blobs() {
        let (x, y) = three_blobs();
        let mut model = BaggingClassifier::new(10).with_random_state(0);
        model.fit(&x, &y).unwrap();
        assert!(accuracy(&y, &model.predict(&x).unwrap()) > 0.9);
        assert_eq!(model.n_estimators_fitted(), 10);
    }

    #[test]
    fn test_feature_subsampling() {
        let (x, y) = binary_blobs();
        let mut model = BaggingClassifier::new(8)
            .with_max_features(DrawSize::Count(1))
            .with_max_samples(DrawSize::Fraction(0.5))
            .with_random_state(4);
        model.fit(&x, &y).unwrap();
        assert!(model.estimators.iter().all(|m| m.features.len() == 1));
        assert!(accuracy(&y, &model.predict(&x).unwrap()) > 0.9);
    }

    #[test]
    fn test_draw_without_replacement_is_distinct() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut drawn = draw_indices(&mut rng, 10, 10, false);
        drawn.sort_unstable();
        assert_eq!(drawn, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_rejects_oversized_draw_without_bootstrap() {
        let (x, y) = binary_blobs();
        let params = Params::new().with("max_samples", 100).with("bootstrap", false);
        let mut model = BaggingClassifier::from_params(&params).unwrap();
        assert!(matches!(model.fit(&x, &y), Err(ClassifierError::ValidationError(_))));
    }
}
