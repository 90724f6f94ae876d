//! K-fold splitters used by the grid search

use crate::error::{ClassifierError, Result};
use ndarray::Array1;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Cross-validation strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CVStrategy {
    /// Contiguous folds over the (optionally shuffled) sample order
    KFold { n_splits: usize, shuffle: bool },
    /// Folds that keep each class's share of the samples
    StratifiedKFold { n_splits: usize, shuffle: bool },
}

impl CVStrategy {
    pub fn n_splits(&self) -> usize {
        match self {
            CVStrategy::KFold { n_splits, .. } | CVStrategy::StratifiedKFold { n_splits, .. } => *n_splits,
        }
    }
}

impl Default for CVStrategy {
    fn default() -> Self {
        CVStrategy::StratifiedKFold { n_splits: 5, shuffle: false }
    }
}

/// A single train/test split
#[derive(Debug, Clone)]
pub struct CVSplit {
    pub train_indices: Vec<usize>,
    pub test_indices: Vec<usize>,
    pub fold_idx: usize,
}

/// Cross-validation splitter
#[derive(Debug, Clone)]
pub struct CrossValidator {
    strategy: CVStrategy,
    random_state: Option<u64>,
}

impl CrossValidator {
    pub fn new(strategy: CVStrategy) -> Self {
        Self {
            strategy,
            random_state: None,
        }
    }

    /// Set random state for reproducible shuffling
    pub fn with_random_state(mut self, seed: Option<u64>) -> Self {
        self.random_state = seed;
        self
    }

    pub fn strategy(&self) -> CVStrategy {
        self.strategy
    }

    /// Generate train/test splits for the labels `y`
    pub fn split(&self, y: &Array1<f64>) -> Result<Vec<CVSplit>> {
        let n_samples = y.len();
        let n_splits = self.strategy.n_splits();
        if n_splits < 2 {
            return Err(ClassifierError::ValidationError(format!(
                "n_splits must be at least 2, got {}",
                n_splits
            )));
        }
        if n_samples < n_splits {
            return Err(ClassifierError::ValidationError(format!(
                "Cannot have number of splits n_splits={} greater than the number of samples: n_samples={}",
                n_splits, n_samples
            )));
        }

        match self.strategy {
            CVStrategy::KFold { n_splits, shuffle } => Ok(self.k_fold_split(n_samples, n_splits, shuffle)),
            CVStrategy::StratifiedKFold { n_splits, shuffle } => Ok(self.stratified_k_fold_split(y, n_splits, shuffle)),
        }
    }

    fn rng(&self) -> ChaCha8Rng {
        match self.random_state {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        }
    }

    fn k_fold_split(&self, n_samples: usize, n_splits: usize, shuffle: bool) -> Vec<CVSplit> {
        let mut indices: Vec<usize> = (0..n_samples).collect();
        if shuffle {
            indices.shuffle(&mut self.rng());
        }

        let base = n_samples / n_splits;
        let remainder = n_samples % n_splits;
        let mut splits = Vec::with_capacity(n_splits);
        let mut current = 0;

        for fold_idx in 0..n_splits {
            let fold_size = if fold_idx < remainder { base + 1 } else { base };
            let test_indices = indices[current..current + fold_size].to_vec();
            let train_indices: Vec<usize> = indices[..current]
                .iter()
                .chain(indices[current + fold_size..].iter())
                .copied()
                .collect();

            splits.push(CVSplit {
                train_indices,
                test_indices,
                fold_idx,
            });
            current += fold_size;
        }

        splits
    }

    /// Samples are dealt round-robin across folds, class by class in
    /// ascending label order, continuing where the previous class stopped so
    /// fold sizes differ by at most one.
    fn stratified_k_fold_split(&self, y: &Array1<f64>, n_splits: usize, shuffle: bool) -> Vec<CVSplit> {
        let mut class_indices: BTreeMap<i64, Vec<usize>> = BTreeMap::new();
        for (idx, &val) in y.iter().enumerate() {
            class_indices.entry(val.round() as i64).or_default().push(idx);
        }

        if shuffle {
            let mut rng = self.rng();
            for indices in class_indices.values_mut() {
                indices.shuffle(&mut rng);
            }
        }

        let mut folds: Vec<Vec<usize>> = vec![Vec::new(); n_splits];
        let mut next_fold = 0;
        for indices in class_indices.values() {
            for &idx in indices {
                folds[next_fold].push(idx);
                next_fold = (next_fold + 1) % n_splits;
            }
        }
        for fold in folds.iter_mut() {
            fold.sort_unstable();
        }

        (0..n_splits)
            .map(|fold_idx| {
                let train_indices: Vec<usize> = folds
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| *i != fold_idx)
                    .flat_map(|(_, f)| f.iter().copied())
                    .collect();
                CVSplit {
                    train_indices,
                    test_indices: folds[fold_idx].clone(),
                    fold_idx,
                }
            })
            .collect()
    }
}
