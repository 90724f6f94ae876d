//! Hyperparameter search capability
//!
//! The facade never tunes a model itself. It hands the current model, a
//! [`ParamGrid`] and [`SearchOptions`] to a [`SearchCapability`] and installs
//! the refitted model from the returned [`SearchOutcome`].

mod cross_validation;
mod grid;

pub use cross_validation::{CVSplit, CVStrategy, CrossValidator};
pub use grid::GridSearchCV;

use crate::error::Result;
use crate::estimators::Classifier;
use crate::metrics::Scoring;
use crate::params::{ParamGrid, Params};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Per-call search settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchOptions {
    /// Worker threads for candidate evaluation
    pub n_jobs: usize,
    /// 0 = silent, 1 = summary, 2 = per candidate, 3 = per fold
    pub verbose: u8,
    pub scoring: Scoring,
    pub cv_folds: usize,
    pub shuffle: bool,
    pub random_state: Option<u64>,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            n_jobs: 4,
            verbose: 1,
            scoring: Scoring::default(),
            cv_folds: 5,
            shuffle: false,
            random_state: None,
        }
    }
}

/// Cross-validated scores of one grid candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateResult {
    /// Grid values of this candidate
    pub params: Params,
    pub mean_test_score: f64,
    pub std_test_score: f64,
    pub mean_train_score: f64,
    /// 1 = best; tied candidates share the lowest rank
    pub rank: usize,
}

/// Everything a completed search reports
#[derive(Debug)]
pub struct SearchOutcome {
    /// Best configuration refitted on the full data
    pub best_model: Box<dyn Classifier>,
    pub best_score: f64,
    pub best_params: Params,
    pub best_index: usize,
    /// One entry per grid candidate, in grid order
    pub candidates: Vec<CandidateResult>,
    pub n_splits: usize,
}

/// Exhaustive hyperparameter search over a grid
pub trait SearchCapability: Send + Sync + fmt::Debug {
    /// Evaluate every candidate of `grid` applied on top of `model`'s
    /// configuration and return the best one refitted on `x`, `y`.
    fn search(
        &self,
        model: &dyn Classifier,
        grid: &ParamGrid,
        x: &Array2<f64>,
        y: &Array1<f64>,
        options: &SearchOptions,
    ) -> Result<SearchOutcome>;
}
