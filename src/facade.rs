//! Uniform classifier facade
//!
//! [`ModelFacade`] picks a family out of the [`AlgorithmRegistry`] by name,
//! builds it from a [`Params`] configuration and forwards fit, predict and
//! score calls to it. Tuning hands the current model to a
//! [`SearchCapability`] and installs the refitted winner.

use crate::config::TuningConfig;
use crate::error::{ClassifierError, Result};
use crate::estimators::Classifier;
use crate::metrics::{ConfusionMatrix, Scoring};
use crate::params::{ParamGrid, Params};
use crate::registry::{Algorithm, AlgorithmRegistry};
use crate::search::{GridSearchCV, SearchCapability, SearchOutcome};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Arguments of a tuning call
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TuneOptions {
    /// Candidate values per parameter. `None` or an empty grid searches the
    /// construction configuration only.
    pub tuning_space: Option<ParamGrid>,
    /// Report only the winner instead of every candidate
    pub best_only: bool,
    /// Ranking metric; the configured default when `None`
    pub scoring: Option<String>,
}

impl TuneOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tuning_space(mut self, grid: ParamGrid) -> Self {
        self.tuning_space = Some(grid);
        self
    }

    pub fn with_best_only(mut self, best_only: bool) -> Self {
        self.best_only = best_only;
        self
    }

    pub fn with_scoring(mut self, scoring: impl Into<String>) -> Self {
        self.scoring = Some(scoring.into());
        self
    }
}

/// Mean cross-validated scores of one candidate
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CandidateScores {
    pub test_score: f64,
    pub train_score: f64,
}

/// Report of a tuning call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TuningResult {
    /// Best mean validation score and the grid values that reached it
    Best { score: f64, params: Params },
    /// Every candidate, keyed by its rendered parameter set
    All(BTreeMap<String, CandidateScores>),
}

impl TuningResult {
    fn from_outcome(outcome: &SearchOutcome, best_only: bool) -> Self {
        if best_only {
            return TuningResult::Best {
                score: outcome.best_score,
                params: outcome.best_params.clone(),
            };
        }
        TuningResult::All(
            outcome
                .candidates
                .iter()
                .map(|c| {
                    (
                        c.params.render(),
                        CandidateScores {
                            test_score: c.mean_test_score,
                            train_score: c.mean_train_score,
                        },
                    )
                })
                .collect(),
        )
    }

    /// Number of reported candidates
    pub fn len(&self) -> usize {
        match self {
            TuningResult::Best { .. } => 1,
            TuningResult::All(scores) => scores.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Result of [`ModelFacade::evaluate`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    /// Same value `score` returns for the batch
    pub score: f64,
    pub confusion: ConfusionMatrix,
}

/// Single entry point over the classifier catalog
#[derive(Debug)]
pub struct ModelFacade {
    algorithm: Algorithm,
    params: Params,
    model: Option<Box<dyn Classifier>>,
    search: Box<dyn SearchCapability>,
    config: TuningConfig,
}

impl ModelFacade {
    /// Look up `name` in the registry and build its model from `params`
    pub fn new(name: &str, params: Params) -> Result<Self> {
        Self::with_config(name, params, TuningConfig::default())
    }

    pub fn with_config(name: &str, params: Params, config: TuningConfig) -> Result<Self> {
        config.validate()?;
        let algorithm = AlgorithmRegistry::standard().resolve(name)?;
        let mut facade = Self::from_algorithm(algorithm, params)?;
        facade.config = config;
        Ok(facade)
    }

    pub fn from_algorithm(algorithm: Algorithm, params: Params) -> Result<Self> {
        let model = algorithm.construct(&params)?;
        debug!(algorithm = %algorithm, params = %params, "Model constructed");
        Ok(Self {
            algorithm,
            params,
            model: Some(model),
            search: Box::new(GridSearchCV::new()),
            config: TuningConfig::default(),
        })
    }

    /// Replace the grid search used by [`tune`](Self::tune)
    pub fn with_search(mut self, search: impl SearchCapability + 'static) -> Self {
        self.search = Box::new(search);
        self
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// Configuration the facade was constructed with
    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn config(&self) -> &TuningConfig {
        &self.config
    }

    fn model_mut(&mut self) -> Result<&mut Box<dyn Classifier>> {
        self.model.as_mut().ok_or(ClassifierError::ModelNotReady)
    }

    /// Train the current model and return it
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<&dyn Classifier> {
        let model = self.model_mut()?;
        model.fit(x, y)?;
        Ok(&**model)
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        self.get_model()?.predict(x)
    }

    /// Mean accuracy on a labelled batch
    pub fn score(&self, x: &Array2<f64>, y: &Array1<f64>) -> Result<f64> {
        self.get_model()?.score(x, y)
    }

    /// Cross-validated grid search. On success the best configuration,
    /// refitted on `x` and `y`, replaces the current model; on failure the
    /// current model stays installed.
    pub fn tune(&mut self, x: &Array2<f64>, y: &Array1<f64>, options: &TuneOptions) -> Result<TuningResult> {
        let grid = match &options.tuning_space {
            Some(grid) if !grid.is_empty() => grid.clone(),
            _ => self.params.to_grid(),
        };
        let scoring: Scoring = options
            .scoring
            .as_deref()
            .unwrap_or(self.config.default_scoring.as_str())
            .parse()?;
        let search_options = self.config.search_options(scoring);

        let outcome = self
            .search
            .search(self.get_model()?, &grid, x, y, &search_options)?;

        info!(
            algorithm = %self.algorithm,
            scoring = %scoring,
            best_score = outcome.best_score,
            best_params = %outcome.best_params,
            "Tuning finished"
        );

        let result = TuningResult::from_outcome(&outcome, options.best_only);
        self.model = Some(outcome.best_model);
        Ok(result)
    }

    /// Current model, or [`ClassifierError::ModelNotReady`] if the slot is empty
    pub fn get_model(&self) -> Result<&dyn Classifier> {
        self.model.as_deref().ok_or(ClassifierError::ModelNotReady)
    }

    /// Remove and return the current model
    pub fn take_model(&mut self) -> Option<Box<dyn Classifier>> {
        self.model.take()
    }

    pub fn clear_model(&mut self) {
        self.model = None;
    }

    /// Predict `x`, tally a `class_num × class_num` confusion matrix against
    /// `y` and score the batch.
    ///
    /// Classes with no true samples in the batch have an undefined
    /// normalized row; they are logged and left as `NaN` in
    /// [`ConfusionMatrix::normalized`].
    pub fn evaluate(&self, x: &Array2<f64>, y: &Array1<f64>, class_num: usize) -> Result<Evaluation> {
        let model = self.get_model()?;
        let y_pred = model.predict(x)?;
        let confusion = ConfusionMatrix::from_labels(y, &y_pred, class_num)?;

        let absent = confusion.absent_classes();
        if !absent.is_empty() {
            warn!(
                ?absent,
                "Classes absent from the evaluation batch; their normalized confusion rows are undefined"
            );
        }

        let score = model.score(x, y)?;
        Ok(Evaluation { score, confusion })
    }
}
