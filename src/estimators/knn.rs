//! K-Nearest Neighbors classifier
//!
//! Majority (optionally distance-weighted) vote among the closest training
//! samples. Prediction is parallelized over the query rows.

use super::{argmax, check_features, check_fit_input, class_position, unique_classes, Classifier, FromParams};
use crate::error::{ClassifierError, Result};
use crate::params::{ParamReader, Params};
use crate::registry::Algorithm;
use ndarray::{Array1, Array2, ArrayView1};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// Distance metric for KNN
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum DistanceMetric {
    /// Euclidean distance (L2)
    Euclidean,
    /// Manhattan distance (L1)
    Manhattan,
    /// Minkowski distance with parameter p
    Minkowski(f64),
    /// Cosine similarity (converted to distance)
    Cosine,
}

impl Default for DistanceMetric {
    fn default() -> Self {
        Self::Euclidean
    }
}

/// Weighting scheme for neighbors
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum WeightScheme {
    /// All neighbors have equal weight
    Uniform,
    /// Closer neighbors have more weight (inverse distance)
    Distance,
}

impl Default for WeightScheme {
    fn default() -> Self {
        Self::Uniform
    }
}

/// K-Nearest Neighbors Classifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KNNClassifier {
    pub n_neighbors: usize,
    pub weights: WeightScheme,
    pub metric: DistanceMetric,
    metric_name: String,
    p: f64,
    x_train: Option<Array2<f64>>,
    y_train: Option<Array1<f64>>,
    classes: Vec<f64>,
}

impl KNNClassifier {
    pub fn new(n_neighbors: usize) -> Self {
        Self {
            n_neighbors,
            weights: WeightScheme::Uniform,
            metric: DistanceMetric::Euclidean,
            metric_name: "minkowski".to_string(),
            p: 2.0,
            x_train: None,
            y_train: None,
            classes: Vec::new(),
        }
    }

    pub fn with_weights(mut self, weights: WeightScheme) -> Self {
        self.weights = weights;
        self
    }

    /// Class probabilities from the neighbor votes, columns aligned with the sorted classes
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let (x_train, y_train) = self.training_data(x)?;
        let n_classes = self.classes.len();

        let rows: Vec<Vec<f64>> = (0..x.nrows())
            .into_par_iter()
            .map(|i| {
                let neighbors = find_k_nearest(x.row(i), x_train, y_train, self.n_neighbors, self.metric);
                class_votes(&neighbors, &self.classes, self.weights)
            })
            .collect();

        let mut probs = Array2::zeros((x.nrows(), n_classes));
        for (i, votes) in rows.into_iter().enumerate() {
            let total: f64 = votes.iter().sum();
            for (j, v) in votes.into_iter().enumerate() {
                probs[[i, j]] = if total > 0.0 { v / total } else { 0.0 };
            }
        }
        Ok(probs)
    }

    fn training_data(&self, x: &Array2<f64>) -> Result<(&Array2<f64>, &Array1<f64>)> {
        let (x_train, y_train) = match (&self.x_train, &self.y_train) {
            (Some(x_train), Some(y_train)) => (x_train, y_train),
            _ => return Err(ClassifierError::ModelNotFitted),
        };
        check_features(x_train.ncols(), x)?;
        if self.n_neighbors > x_train.nrows() {
            return Err(ClassifierError::ValidationError(format!(
                "Expected n_neighbors <= n_samples_fit, but n_neighbors = {}, n_samples_fit = {}",
                self.n_neighbors,
                x_train.nrows()
            )));
        }
        Ok((x_train, y_train))
    }
}

impl Default for KNNClassifier {
    fn default() -> Self {
        Self::new(5)
    }
}

impl FromParams for KNNClassifier {
    fn from_params(params: &Params) -> Result<Self> {
        let mut reader = ParamReader::new("KNN", params);
        let n_neighbors = reader.usize("n_neighbors", 5)?;
        if n_neighbors == 0 {
            return Err(ClassifierError::invalid_parameter(
                "n_neighbors",
                n_neighbors,
                "must be at least 1",
            ));
        }
        let weights = match reader.choice("weights", "uniform", &["uniform", "distance"])? {
            "distance" => WeightScheme::Distance,
            _ => WeightScheme::Uniform,
        };
        let metric_name = reader.choice(
            "metric",
            "minkowski",
            &["minkowski", "euclidean", "manhattan", "cosine"],
        )?;
        let p = reader.positive_f64("p", 2.0)?;
        reader.finish()?;

        let metric = match metric_name {
            "euclidean" => DistanceMetric::Euclidean,
            "manhattan" => DistanceMetric::Manhattan,
            "cosine" => DistanceMetric::Cosine,
            _ if p == 2.0 => DistanceMetric::Euclidean,
            _ if p == 1.0 => DistanceMetric::Manhattan,
            _ => DistanceMetric::Minkowski(p),
        };

        Ok(Self {
            weights,
            metric,
            metric_name: metric_name.to_string(),
            p,
            ..Self::new(n_neighbors)
        })
    }
}

impl Classifier for KNNClassifier {
    fn algorithm(&self) -> Algorithm {
        Algorithm::Knn
    }

    fn params(&self) -> Params {
        let weights = match self.weights {
            WeightScheme::Uniform => "uniform",
            WeightScheme::Distance => "distance",
        };
        Params::new()
            .with("n_neighbors", self.n_neighbors)
            .with("weights", weights)
            .with("metric", self.metric_name.as_str())
            .with("p", self.p)
    }

    fn is_fitted(&self) -> bool {
        self.x_train.is_some()
    }

    /// Stores the training data
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_fit_input(x, y)?;
        self.x_train = Some(x.to_owned());
        self.y_train = Some(y.to_owned());
        self.classes = unique_classes(y);
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let (x_train, y_train) = self.training_data(x)?;

        let predictions: Vec<f64> = (0..x.nrows())
            .into_par_iter()
            .map(|i| {
                let neighbors = find_k_nearest(x.row(i), x_train, y_train, self.n_neighbors, self.metric);
                let votes = class_votes(&neighbors, &self.classes, self.weights);
                self.classes[argmax(&votes)]
            })
            .collect();

        Ok(Array1::from_vec(predictions))
    }
}

/// Max-heap entry for partial sort (keeps k smallest distances)
#[derive(PartialEq)]
struct DistLabel(f64, f64);

impl Eq for DistLabel {}
impl PartialOrd for DistLabel {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for DistLabel {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.partial_cmp(&other.0).unwrap_or(Ordering::Equal)
    }
}

/// Find k nearest neighbors using a max-heap, O(n log k)
fn find_k_nearest(
    point: ArrayView1<f64>,
    x_train: &Array2<f64>,
    y_train: &Array1<f64>,
    k: usize,
    metric: DistanceMetric,
) -> Vec<(f64, f64)> {
    let mut heap = BinaryHeap::with_capacity(k + 1);

    for (i, row) in x_train.rows().into_iter().enumerate() {
        let dist = compute_distance(point, row, metric);
        if heap.len() < k {
            heap.push(DistLabel(dist, y_train[i]));
        } else if let Some(top) = heap.peek() {
            if dist < top.0 {
                heap.pop();
                heap.push(DistLabel(dist, y_train[i]));
            }
        }
    }

    heap.into_iter().map(|dl| (dl.0, dl.1)).collect()
}

fn compute_distance(a: ArrayView1<f64>, b: ArrayView1<f64>, metric: DistanceMetric) -> f64 {
    match metric {
        DistanceMetric::Euclidean => a
            .iter()
            .zip(b.iter())
            .map(|(ai, bi)| (ai - bi) * (ai - bi))
            .sum::<f64>()
            .sqrt(),
        DistanceMetric::Manhattan => a.iter().zip(b.iter()).map(|(ai, bi)| (ai - bi).abs()).sum(),
        DistanceMetric::Minkowski(p) => a
            .iter()
            .zip(b.iter())
            .map(|(ai, bi)| (ai - bi).abs().powf(p))
            .sum::<f64>()
            .powf(1.0 / p),
        DistanceMetric::Cosine => {
            let mut dot = 0.0;
            let mut norm_a = 0.0;
            let mut norm_b = 0.0;
            for (ai, bi) in a.iter().zip(b.iter()) {
                dot += ai * bi;
                norm_a += ai * ai;
                norm_b += bi * bi;
            }
            let denom = norm_a.sqrt() * norm_b.sqrt();
            if denom > 0.0 { 1.0 - (dot / denom) } else { 1.0 }
        }
    }
}

/// Weighted votes per class, aligned with `classes`. An exact match under
/// distance weighting takes all the weight.
fn class_votes(neighbors: &[(f64, f64)], classes: &[f64], weights: WeightScheme) -> Vec<f64> {
    let mut votes = vec![0.0; classes.len()];
    let exact = weights == WeightScheme::Distance && neighbors.iter().any(|&(d, _)| d == 0.0);
    for &(dist, label) in neighbors {
        let weight = match weights {
            WeightScheme::Uniform => 1.0,
            WeightScheme::Distance if exact => if dist == 0.0 { 1.0 } else { 0.0 },
            WeightScheme::Distance => 1.0 / dist,
        };
        if let Some(idx) = class_position(classes, label) {
            votes[idx] += weight;
        }
    }
    votes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimators::test_data::{accuracy, binary_blobs, three_blobs};
    use ndarray::array;

    #[test]
    fn test_knn_classifier() {
        let (x, y) = binary_blobs();
        let mut knn = KNNClassifier::new(3);
        knn.fit(&x, &y).unwrap();

        let predictions = knn.predict(&x).unwrap();
        assert!(accuracy(&y, &predictions) > 0.9);
    }

    #[test]
    fn test_knn_multiclass_weighted() {
        let (x, y) = three_blobs();
        let params = Params::new().with("n_neighbors", 4).with("weights", "distance");
        let mut knn = KNNClassifier::from_params(&params).unwrap();
        knn.fit(&x, &y).unwrap();

        let predictions = knn.predict(&x).unwrap();
        assert_eq!(predictions, y);
    }

    #[test]
    fn test_predict_proba_rows_sum_to_one() {
        let (x, y) = binary_blobs();
        let mut knn = KNNClassifier::new(5);
        knn.fit(&x, &y).unwrap();
        let probs = knn.predict_proba(&array![[1.0, 1.0], [5.0, 5.0]]).unwrap();
        for row in probs.rows() {
            assert!((row.sum() - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_distance_metrics() {
        let a = array![0.0, 0.0];
        let b = array![3.0, 4.0];
        assert!((compute_distance(a.view(), b.view(), DistanceMetric::Euclidean) - 5.0).abs() < 1e-12);
        assert!((compute_distance(a.view(), b.view(), DistanceMetric::Manhattan) - 7.0).abs() < 1e-12);
        assert!(
            (compute_distance(a.view(), b.view(), DistanceMetric::Minkowski(2.0)) - 5.0).abs() < 1e-9
        );
    }

    #[test]
    fn test_too_many_neighbors() {
        let x = array![[0.0], [1.0]];
        let y = array![0.0, 1.0];
        let mut knn = KNNClassifier::new(5);
        knn.fit(&x, &y).unwrap();
        assert!(matches!(knn.predict(&x), Err(ClassifierError::ValidationError(_))));
    }

    #[test]
    fn test_params_roundtrip() {
        let params = Params::new().with("n_neighbors", 7).with("metric", "manhattan");
        let knn = KNNClassifier::from_params(&params).unwrap();
        assert_eq!(knn.metric, DistanceMetric::Manhattan);
        let rebuilt = KNNClassifier::from_params(&knn.params()).unwrap();
        assert_eq!(rebuilt.n_neighbors, 7);
    }
}
