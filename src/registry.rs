//! Static catalog of classifier families
//!
//! Every [`Algorithm`] maps to exactly one constructor. The dispatch is an
//! exhaustive `match`, so a family cannot be added to the catalog without a
//! constructor.

use crate::error::{ClassifierError, Result};
use crate::estimators::{
    AdaBoostClassifier, BaggingClassifier, Classifier, DecisionTreeClassifier, DummyClassifier, FromParams,
    GaussianNaiveBayes, KNNClassifier, LogisticRegression, MLPClassifier, MultinomialNaiveBayes,
    RandomForestClassifier, SVClassifier,
};
use crate::params::Params;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Builds an unfitted model from a configuration
pub type Constructor = fn(&Params) -> Result<Box<dyn Classifier>>;

fn build<C: Classifier + FromParams + 'static>(params: &Params) -> Result<Box<dyn Classifier>> {
    Ok(Box::new(C::from_params(params)?))
}

/// Classifier family tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Algorithm {
    Dummy,
    Knn,
    MultinomialNaiveBayes,
    GaussianNaiveBayes,
    Svc,
    DecisionTree,
    RandomForest,
    LogisticRegression,
    Mlp,
    AdaBoost,
    Bagging,
}

impl Algorithm {
    /// Catalog order
    pub const ALL: [Algorithm; 11] = [
        Algorithm::Dummy,
        Algorithm::Knn,
        Algorithm::MultinomialNaiveBayes,
        Algorithm::GaussianNaiveBayes,
        Algorithm::Svc,
        Algorithm::DecisionTree,
        Algorithm::RandomForest,
        Algorithm::LogisticRegression,
        Algorithm::Mlp,
        Algorithm::AdaBoost,
        Algorithm::Bagging,
    ];

    /// Registry name (case-sensitive)
    pub fn name(&self) -> &'static str {
        match self {
            Algorithm::Dummy => "Dummy",
            Algorithm::Knn => "KNN",
            Algorithm::MultinomialNaiveBayes => "M-NaiveBayes",
            Algorithm::GaussianNaiveBayes => "G-NaiveBayes",
            Algorithm::Svc => "SVC",
            Algorithm::DecisionTree => "DecisionTree",
            Algorithm::RandomForest => "RandomForest",
            Algorithm::LogisticRegression => "LogisticRegression",
            Algorithm::Mlp => "MLP",
            Algorithm::AdaBoost => "AdaBoost",
            Algorithm::Bagging => "Bagging",
        }
    }

    pub fn constructor(&self) -> Constructor {
        match self {
            Algorithm::Dummy => build::<DummyClassifier>,
            Algorithm::Knn => build::<KNNClassifier>,
            Algorithm::MultinomialNaiveBayes => build::<MultinomialNaiveBayes>,
            Algorithm::GaussianNaiveBayes => build::<GaussianNaiveBayes>,
            Algorithm::Svc => build::<SVClassifier>,
            Algorithm::DecisionTree => build::<DecisionTreeClassifier>,
            Algorithm::RandomForest => build::<RandomForestClassifier>,
            Algorithm::LogisticRegression => build::<LogisticRegression>,
            Algorithm::Mlp => build::<MLPClassifier>,
            Algorithm::AdaBoost => build::<AdaBoostClassifier>,
            Algorithm::Bagging => build::<BaggingClassifier>,
        }
    }

    /// Construct an unfitted model of this family
    pub fn construct(&self, params: &Params) -> Result<Box<dyn Classifier>> {
        (self.constructor())(params)
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Algorithm {
    type Err = ClassifierError;

    fn from_str(s: &str) -> Result<Self> {
        AlgorithmRegistry::standard().resolve(s)
    }
}

/// Name to constructor mapping over the fixed catalog
#[derive(Debug, Clone, Copy, Default)]
pub struct AlgorithmRegistry;

impl AlgorithmRegistry {
    pub fn standard() -> Self {
        AlgorithmRegistry
    }

    /// Registered names in catalog order
    pub fn names(&self) -> Vec<&'static str> {
        Algorithm::ALL.iter().map(Algorithm::name).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        Algorithm::ALL.iter().any(|a| a.name() == name)
    }

    pub fn resolve(&self, name: &str) -> Result<Algorithm> {
        Algorithm::ALL
            .iter()
            .copied()
            .find(|a| a.name() == name)
            .ok_or_else(|| ClassifierError::UnknownAlgorithm {
                requested: name.to_string(),
                available: self.names().into_iter().map(String::from).collect(),
            })
    }

    pub fn constructor(&self, name: &str) -> Result<Constructor> {
        Ok(self.resolve(name)?.constructor())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_round_trip() {
        for algorithm in Algorithm::ALL {
            assert_eq!(algorithm.name().parse::<Algorithm>().unwrap(), algorithm);
            assert_eq!(algorithm.to_string(), algorithm.name());
        }
    }

    #[test]
    fn test_every_family_constructs_with_defaults() {
        for algorithm in Algorithm::ALL {
            let model = algorithm.construct(&Params::new()).unwrap();
            assert_eq!(model.algorithm(), algorithm);
            assert!(!model.is_fitted());
        }
    }

    #[test]
    fn test_effective_params_rebuild_the_same_family() {
        // Grid candidates are layered on top of `params()`, so every family
        // must accept its own effective configuration.
        for algorithm in Algorithm::ALL {
            let model = algorithm.construct(&Params::new()).unwrap();
            let rebuilt = algorithm.construct(&model.params()).unwrap();
            assert_eq!(rebuilt.params(), model.params(), "{}", algorithm);
        }
    }

    #[test]
    fn test_unknown_name_lists_catalog() {
        let err = AlgorithmRegistry::standard().resolve("Perceptron").unwrap_err();
        match err {
            ClassifierError::UnknownAlgorithm { requested, available } => {
                assert_eq!(requested, "Perceptron");
                assert_eq!(available.len(), 11);
                assert_eq!(available[0], "Dummy");
                assert_eq!(available[10], "Bagging");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_lookup_is_case_sensitive() {
        assert!(AlgorithmRegistry::standard().contains("KNN"));
        assert!(!AlgorithmRegistry::standard().contains("knn"));
        assert!("knn".parse::<Algorithm>().is_err());
    }

    #[test]
    fn test_constructor_applies_params() {
        let ctor = AlgorithmRegistry::standard().constructor("KNN").unwrap();
        let model = ctor(&Params::new().with("n_neighbors", 3)).unwrap();
        assert_eq!(model.params().get("n_neighbors").and_then(|v| v.as_i64()), Some(3));
    }
}
