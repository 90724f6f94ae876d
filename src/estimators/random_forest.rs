//! Random Forest classifier

use super::bagging::draw_indices;
use super::decision_tree::{encode_labels, DecisionTreeClassifier, MaxFeatures};
use super::{argmax, check_features, check_fit_input, seeded_rng, unique_classes, Classifier, FromParams};
use crate::error::{ClassifierError, Result};
use crate::params::{ParamReader, Params};
use crate::registry::Algorithm;
use ndarray::{Array1, Array2, Axis};
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Random Forest model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForestClassifier {
    /// Individual trees
    trees: Vec<DecisionTreeClassifier>,
    /// Number of trees
    pub n_estimators: usize,
    /// Growth settings shared by every tree
    pub tree: DecisionTreeClassifier,
    /// Bootstrap sampling
    pub bootstrap: bool,
    /// Random state
    pub random_state: Option<u64>,
    feature_importances: Option<Array1<f64>>,
    n_features: usize,
    classes: Vec<f64>,
}

impl Default for RandomForestClassifier {
    fn default() -> Self {
        Self::new(100)
    }
}

impl RandomForestClassifier {
    pub fn new(n_estimators: usize) -> Self {
        Self {
            trees: Vec::new(),
            n_estimators,
            tree: DecisionTreeClassifier::new().with_max_features(MaxFeatures::Sqrt),
            bootstrap: true,
            random_state: None,
            feature_importances: None,
            n_features: 0,
            classes: Vec::new(),
        }
    }

    /// Set maximum depth
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.tree.max_depth = Some(depth);
        self
    }

    /// Set max features strategy
    pub fn with_max_features(mut self, max_features: MaxFeatures) -> Self {
        self.tree.max_features = max_features;
        self
    }

    pub fn with_bootstrap(mut self, bootstrap: bool) -> Self {
        self.bootstrap = bootstrap;
        self
    }

    /// Set random state
    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    fn compute_feature_importances(&mut self) {
        if self.trees.is_empty() {
            return;
        }

        let mut total_importances = vec![0.0; self.n_features];
        for tree in &self.trees {
            if let Some(imp) = tree.feature_importances() {
                for (i, &val) in imp.iter().enumerate() {
                    total_importances[i] += val;
                }
            }
        }

        // Normalize
        let total: f64 = total_importances.iter().sum();
        if total > 0.0 {
            for imp in &mut total_importances {
                *imp /= total;
            }
        }

        self.feature_importances = Some(Array1::from_vec(total_importances));
    }

    /// Mean of the trees' class probabilities
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if self.trees.is_empty() {
            return Err(ClassifierError::ModelNotFitted);
        }
        check_features(self.n_features, x)?;

        let all_proba: Vec<Array2<f64>> = self
            .trees
            .par_iter()
            .map(|tree| tree.predict_proba(x))
            .collect::<Result<_>>()?;

        let mut proba = Array2::zeros((x.nrows(), self.classes.len()));
        for tree_proba in &all_proba {
            proba += tree_proba;
        }
        proba /= all_proba.len() as f64;
        Ok(proba)
    }

    /// Get feature importances
    pub fn feature_importances(&self) -> Option<&Array1<f64>> {
        self.feature_importances.as_ref()
    }

    /// Get number of trees
    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }
}

impl FromParams for RandomForestClassifier {
    fn from_params(params: &Params) -> Result<Self> {
        let mut reader = ParamReader::new("RandomForest", params);
        let n_estimators = reader.usize("n_estimators", 100)?;
        if n_estimators == 0 {
            return Err(ClassifierError::invalid_parameter("n_estimators", 0, "must be at least 1"));
        }
        let tree = DecisionTreeClassifier::read_growth_params(&mut reader, MaxFeatures::Sqrt)?;
        let bootstrap = reader.bool("bootstrap", true)?;
        let random_state = reader.opt_u64("random_state")?;
        reader.finish()?;

        Ok(Self {
            tree,
            bootstrap,
            random_state,
            ..Self::new(n_estimators)
        })
    }
}

impl Classifier for RandomForestClassifier {
    fn algorithm(&self) -> Algorithm {
        Algorithm::RandomForest
    }

    fn params(&self) -> Params {
        self.tree
            .growth_params()
            .with("n_estimators", self.n_estimators)
            .with("bootstrap", self.bootstrap)
            .with("random_state", self.random_state)
    }

    fn is_fitted(&self) -> bool {
        !self.trees.is_empty()
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_fit_input(x, y)?;
        let n_samples = x.nrows();
        let classes = unique_classes(y);
        let encoded = encode_labels(y, &classes)?;

        let base_seed = self
            .random_state
            .unwrap_or_else(|| seeded_rng(None).next_u64());

        // Build trees in parallel
        let trees: Vec<DecisionTreeClassifier> = (0..self.n_estimators)
            .into_par_iter()
            .map(|tree_idx| -> Result<DecisionTreeClassifier> {
                let mut rng = ChaCha8Rng::seed_from_u64(base_seed.wrapping_add(tree_idx as u64));
                let mut tree = self.tree.clone().with_random_state(rng.next_u64());

                if self.bootstrap {
                    let sample_indices = draw_indices(&mut rng, n_samples, n_samples, true);
                    let x_boot = x.select(Axis(0), &sample_indices);
                    let y_boot: Vec<usize> = sample_indices.iter().map(|&i| encoded[i]).collect();
                    tree.fit_encoded(&x_boot, &y_boot, &vec![1.0; n_samples], classes.clone())?;
                } else {
                    tree.fit_encoded(x, &encoded, &vec![1.0; n_samples], classes.clone())?;
                }
                Ok(tree)
            })
            .collect::<Result<_>>()?;

        self.trees = trees;
        self.n_features = x.ncols();
        self.classes = classes;
        self.compute_feature_importances();
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
    use ndarray::array;

    #[test]
    fn test_classifier() {
        let (x, y) = binary_blobs();
        let mut rf = RandomForestClassifier::new(10).with_random_state(42);
        rf.fit(&x, &y).unwrap();

        assert!(accuracy(&y, &rf.predict(&x).unwrap()) >= 0.95);
        assert_eq!(rf.n_trees(), 10);
    }

    #[test]
    fn test_predict_proba() {
        let (x, y) = three_blobs();
        let mut rf = RandomForestClassifier::new(10).with_random_state(42);
        rf.fit(&x, &y).unwrap();

        let proba = rf.predict_proba(&x).unwrap();
        assert_eq!(proba.ncols(), 3);
        for row in proba.rows() {
            assert!((row.sum() - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_same_seed_same_forest() {
        let (x, y) = binary_blobs();
        let probe = array![[5.0, 5.0], [4.0, 6.0]];

        let mut a = RandomForestClassifier::new(5).with_random_state(3);
        let mut b = RandomForestClassifier::new(5).with_random_state(3);
        a.fit(&x, &y).unwrap();
        b.fit(&x, &y).unwrap();
        assert_eq!(a.predict_proba(&probe).unwrap(), b.predict_proba(&probe).unwrap());
    }

    #[test]
    fn test_feature_importances() {
        let x = array![[1.0, 0.0], [2.0, 0.0], [3.0, 0.0], [4.0, 0.0]];
        let y = array![0.0, 0.0, 1.0, 1.0];

        let mut rf = RandomForestClassifier::new(10)
            .with_max_features(MaxFeatures::All)
            .with_bootstrap(false)
            .with_random_state(42);
        rf.fit(&x, &y).unwrap();

        let importances = rf.feature_importances().unwrap();
        assert!(importances[0] > importances[1]);
    }

    #[test]
    fn test_params_defaults() {
        let rf = RandomForestClassifier::from_params(&Params::new()).unwrap();
        let params = rf.params();
        assert_eq!(params.get("n_estimators").and_then(|v| v.as_i64()), Some(100));
        assert_eq!(params.get("max_features").and_then(|v| v.as_str()), Some("sqrt"));
    }
}
