//! Exhaustive cross-validated grid search

use super::{CVSplit, CVStrategy, CandidateResult, CrossValidator, SearchCapability, SearchOptions, SearchOutcome};
use crate::error::{ClassifierError, Result};
use crate::estimators::Classifier;
use crate::metrics::Scoring;
use crate::params::{ParamGrid, Params};
use crate::registry::Algorithm;
use ndarray::{Array1, Array2, Axis};
use rayon::prelude::*;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Train and test scores of one (candidate, fold) fit. `NaN` marks a failure.
#[derive(Debug, Clone, Copy)]
struct FoldScore {
    candidate: usize,
    fold: usize,
    test: f64,
    train: f64,
}

/// Materialized rows of one split
struct FoldData {
    x_train: Array2<f64>,
    y_train: Array1<f64>,
    x_test: Array2<f64>,
    y_test: Array1<f64>,
}

impl FoldData {
    fn new(x: &Array2<f64>, y: &Array1<f64>, split: &CVSplit) -> Self {
        Self {
            x_train: x.select(Axis(0), &split.train_indices),
            y_train: y.select(Axis(0), &split.train_indices),
            x_test: x.select(Axis(0), &split.test_indices),
            y_test: y.select(Axis(0), &split.test_indices),
        }
    }
}

/// Grid search over every candidate with stratified K-fold validation.
///
/// Candidates are scored in a dedicated rayon pool of `n_jobs` threads. A
/// candidate whose fit or scoring fails on some fold gets a `NaN` mean and
/// ranks last; the search only fails when every candidate does.
#[derive(Debug, Clone, Copy, Default)]
pub struct GridSearchCV;

impl GridSearchCV {
    pub fn new() -> Self {
        GridSearchCV
    }

    fn score_fold(
        algorithm: Algorithm,
        params: &Params,
        fold: &FoldData,
        scoring: Scoring,
    ) -> Result<(f64, f64)> {
        let mut model = algorithm.construct(params)?;
        model.fit(&fold.x_train, &fold.y_train)?;
        let test = scoring.score(&fold.y_test, &model.predict(&fold.x_test)?)?;
        let train = scoring.score(&fold.y_train, &model.predict(&fold.x_train)?)?;
        Ok((test, train))
    }
}

impl SearchCapability for GridSearchCV {
    fn search(
        &self,
        model: &dyn Classifier,
        grid: &ParamGrid,
        x: &Array2<f64>,
        y: &Array1<f64>,
        options: &SearchOptions,
    ) -> Result<SearchOutcome> {
        if x.nrows() != y.len() {
            return Err(ClassifierError::ShapeError {
                expected: format!("y length = {}", x.nrows()),
                actual: format!("y length = {}", y.len()),
            });
        }
        if options.n_jobs == 0 {
            return Err(ClassifierError::ConfigError("n_jobs must be at least 1".to_string()));
        }

        let algorithm = model.algorithm();
        let base = model.params();
        let grid_candidates = grid.candidates()?;

        // Build every configuration before fitting anything so bad grid
        // values surface as configuration errors.
        let configs: Vec<Params> = grid_candidates.iter().map(|c| base.merged(c)).collect();
        for config in &configs {
            algorithm.construct(config)?;
        }

        let cv = CrossValidator::new(CVStrategy::StratifiedKFold {
            n_splits: options.cv_folds,
            shuffle: options.shuffle,
        })
        .with_random_state(options.random_state);
        let splits = cv.split(y)?;
        let folds: Vec<FoldData> = splits.iter().map(|split| FoldData::new(x, y, split)).collect();
        let n_splits = folds.len();

        if options.verbose >= 1 {
            info!(
                "Fitting {} folds for each of {} candidates, totalling {} fits",
                n_splits,
                configs.len(),
                n_splits * configs.len()
            );
        }

        let start = Instant::now();
        let tasks: Vec<(usize, usize)> = (0..configs.len())
            .flat_map(|c| (0..n_splits).map(move |f| (c, f)))
            .collect();

        let pool = rayon::ThreadPoolBuilder::new().num_threads(options.n_jobs).build()?;
        let scores: Vec<FoldScore> = pool.install(|| {
            tasks
                .par_iter()
                .map(|&(candidate, fold)| {
                    let result = Self::score_fold(algorithm, &configs[candidate], &folds[fold], options.scoring);
                    let (test, train) = match result {
                        Ok(scores) => scores,
                        Err(e) => {
                            warn!(
                                candidate = %grid_candidates[candidate],
                                fold,
                                error = %e,
                                "Fit failed; score set to NaN"
                            );
                            (f64::NAN, f64::NAN)
                        }
                    };
                    if options.verbose >= 3 {
                        info!(
                            "[CV {}/{}] {}; score=(train={:.3}, test={:.3})",
                            fold + 1,
                            n_splits,
                            grid_candidates[candidate],
                            train,
                            test
                        );
                    }
                    FoldScore { candidate, fold, test, train }
                })
                .collect()
        });

        let mut candidates: Vec<CandidateResult> = grid_candidates
            .iter()
            .enumerate()
            .map(|(idx, params)| {
                let mut test = vec![f64::NAN; n_splits];
                let mut train = vec![f64::NAN; n_splits];
                for score in scores.iter().filter(|s| s.candidate == idx) {
                    test[score.fold] = score.test;
                    train[score.fold] = score.train;
                }
                let mean_test_score = mean(&test);
                CandidateResult {
                    params: params.clone(),
                    mean_test_score,
                    std_test_score: std_dev(&test, mean_test_score),
                    mean_train_score: mean(&train),
                    rank: 0,
                }
            })
            .collect();

        assign_ranks(&mut candidates);

        if options.verbose >= 2 {
            for candidate in &candidates {
                info!(
                    "{}: mean_test_score={:.4} (+/- {:.4}), mean_train_score={:.4}, rank={}",
                    candidate.params,
                    candidate.mean_test_score,
                    candidate.std_test_score,
                    candidate.mean_train_score,
                    candidate.rank
                );
            }
        }

        let best_index = candidates
            .iter()
            .position(|c| c.rank == 1 && !c.mean_test_score.is_nan())
            .ok_or_else(|| {
                ClassifierError::TrainingError(format!(
                    "Every candidate of {} failed on at least one of its {} folds",
                    algorithm, n_splits
                ))
            })?;

        let mut best_model = algorithm.construct(&configs[best_index])?;
        best_model.fit(x, y)?;

        let best = &candidates[best_index];
        debug!(
            algorithm = %algorithm,
            best_index,
            best_score = best.mean_test_score,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Grid search finished"
        );

        Ok(SearchOutcome {
            best_model,
            best_score: best.mean_test_score,
            best_params: best.params.clone(),
            best_index,
            candidates,
            n_splits,
        })
    }
}

/// Mean of the fold scores; `NaN` if any fold failed
fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn std_dev(values: &[f64], mean: f64) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

/// Rank by descending mean test score. Ties share the lowest rank and `NaN`
/// means rank after every scored candidate.
fn assign_ranks(candidates: &mut [CandidateResult]) {
    let scored: Vec<f64> = candidates
        .iter()
        .map(|c| c.mean_test_score)
        .filter(|s| !s.is_nan())
        .collect();
    for candidate in candidates.iter_mut() {
        candidate.rank = if candidate.mean_test_score.is_nan() {
            scored.len() + 1
        } else {
            1 + scored.iter().filter(|&&s| s > candidate.mean_test_score).count()
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimators::test_data::{binary_blobs, three_blobs};
    use crate::estimators::{DummyClassifier, FromParams, KNNClassifier, LogisticRegression};

    fn options() -> SearchOptions {
        SearchOptions {
            n_jobs: 2,
            verbose: 0,
            scoring: Scoring::Accuracy,
            ..SearchOptions::default()
        }
    }

    #[test]
    fn test_grid_search_picks_best_candidate() {
        let (x, y) = binary_blobs();
        let model = LogisticRegression::new();
        // Zero iterations leaves the weights at zero, so every prediction is
        // the first class and each balanced fold scores 0.5.
        let grid = ParamGrid::new().with("max_iter", vec![0, 200]);

        let outcome = GridSearchCV::new().search(&model, &grid, &x, &y, &options()).unwrap();
        assert_eq!(outcome.candidates.len(), 2);
        assert_eq!(outcome.n_splits, 5);
        assert_eq!(outcome.best_index, 1);
        assert_eq!(outcome.best_params, Params::new().with("max_iter", 200));
        assert_eq!(outcome.best_score, 1.0);
        assert!(outcome.best_model.is_fitted());
        assert_eq!(outcome.candidates[1].rank, 1);
        assert_eq!(outcome.candidates[0].rank, 2);
        assert!((outcome.candidates[0].mean_test_score - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_candidates_inherit_model_params() {
        let (x, y) = binary_blobs();
        let model = KNNClassifier::from_params(&Params::new().with("weights", "distance")).unwrap();
        let grid = ParamGrid::new().with("n_neighbors", vec![1, 3]);

        let outcome = GridSearchCV::new().search(&model, &grid, &x, &y, &options()).unwrap();
        let refit = outcome.best_model.params();
        assert_eq!(refit.get("weights").and_then(|v| v.as_str()), Some("distance"));
        // Only the searched keys are reported
        assert_eq!(outcome.best_params.len(), 1);
    }

    #[test]
    fn test_ties_share_rank_and_first_wins() {
        let (x, y) = binary_blobs();
        let model = KNNClassifier::from_params(&Params::new()).unwrap();
        let grid = ParamGrid::new().with("n_neighbors", vec![1, 3]);

        let outcome = GridSearchCV::new().search(&model, &grid, &x, &y, &options()).unwrap();
        assert!(outcome.candidates.iter().all(|c| c.rank == 1));
        assert_eq!(outcome.best_index, 0);
    }

    #[test]
    fn test_invalid_grid_value_fails_before_fitting() {
        let (x, y) = binary_blobs();
        let model = KNNClassifier::from_params(&Params::new()).unwrap();
        let grid = ParamGrid::new().with("weights", vec!["closest"]);

        let err = GridSearchCV::new().search(&model, &grid, &x, &y, &options()).unwrap_err();
        assert!(matches!(err, ClassifierError::InvalidParameter { .. }));
    }

    #[test]
    fn test_all_failed_candidates_is_training_error() {
        // Binary F1 cannot score a three class problem
        let (x, y) = three_blobs();
        let model = DummyClassifier::from_params(&Params::new()).unwrap();
        let opts = SearchOptions {
            scoring: Scoring::F1,
            cv_folds: 3,
            ..options()
        };

        let err = GridSearchCV::new().search(&model, &ParamGrid::new(), &x, &y, &opts).unwrap_err();
        assert!(matches!(err, ClassifierError::TrainingError(_)));
    }

    #[test]
    fn test_too_few_samples_for_folds() {
        let (x, y) = binary_blobs();
        let x = x.slice(ndarray::s![..3, ..]).to_owned();
        let y = y.slice(ndarray::s![..3]).to_owned();
        let model = DummyClassifier::from_params(&Params::new()).unwrap();

        let err = GridSearchCV::new().search(&model, &ParamGrid::new(), &x, &y, &options()).unwrap_err();
        assert!(matches!(err, ClassifierError::ValidationError(_)));
    }

    #[test]
    fn test_assign_ranks_with_nan() {
        let mut candidates: Vec<CandidateResult> = [0.5, f64::NAN, 0.9, 0.5]
            .iter()
            .map(|&score| CandidateResult {
                params: Params::new(),
                mean_test_score: score,
                std_test_score: 0.0,
                mean_train_score: score,
                rank: 0,
            })
            .collect();
        assign_ranks(&mut candidates);
        let ranks: Vec<usize> = candidates.iter().map(|c| c.rank).collect();
        assert_eq!(ranks, vec![2, 4, 1, 2]);
    }
}
