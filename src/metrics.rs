//! Classification scoring metrics and confusion counting

use crate::error::{ClassifierError, Result};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Positive class of the binary `f1`, `precision` and `recall` scorers
pub const POSITIVE_LABEL: i64 = 1;

/// Objective used to rank candidates during tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scoring {
    Accuracy,
    BalancedAccuracy,
    /// Binary F1 with positive label 1
    F1,
    F1Micro,
    F1Macro,
    F1Weighted,
    /// Binary precision with positive label 1
    Precision,
    PrecisionMacro,
    /// Binary recall with positive label 1
    Recall,
    RecallMacro,
}

impl Scoring {
    pub const ALL: [Scoring; 10] = [
        Scoring::Accuracy,
        Scoring::BalancedAccuracy,
        Scoring::F1,
        Scoring::F1Micro,
        Scoring::F1Macro,
        Scoring::F1Weighted,
        Scoring::Precision,
        Scoring::PrecisionMacro,
        Scoring::Recall,
        Scoring::RecallMacro,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Scoring::Accuracy => "accuracy",
            Scoring::BalancedAccuracy => "balanced_accuracy",
            Scoring::F1 => "f1",
            Scoring::F1Micro => "f1_micro",
            Scoring::F1Macro => "f1_macro",
            Scoring::F1Weighted => "f1_weighted",
            Scoring::Precision => "precision",
            Scoring::PrecisionMacro => "precision_macro",
            Scoring::Recall => "recall",
            Scoring::RecallMacro => "recall_macro",
        }
    }

    /// Score predictions against the true labels (higher is better)
    pub fn score(&self, y_true: &Array1<f64>, y_pred: &Array1<f64>) -> Result<f64> {
        check_same_length(y_true, y_pred)?;
        match self {
            Scoring::Accuracy => accuracy(y_true, y_pred),
            Scoring::F1 | Scoring::Precision | Scoring::Recall => {
                let labels = label_set(y_true, y_pred);
                if labels.len() > 2 {
                    return Err(ClassifierError::ValidationError(format!(
                        "Target is multiclass but '{}' scores a binary problem; use '{}_macro' or 'f1_weighted'",
                        self.name(),
                        self.name()
                    )));
                }
                if labels.len() == 2 && !labels.contains(&POSITIVE_LABEL) {
                    return Err(ClassifierError::ValidationError(format!(
                        "pos_label={} is not a valid label among {:?}; '{}' needs binary labels containing {}",
                        POSITIVE_LABEL,
                        labels,
                        self.name(),
                        POSITIVE_LABEL
                    )));
                }
                let stats = ClassStats::for_label(y_true, y_pred, POSITIVE_LABEL);
                Ok(match self {
                    Scoring::F1 => stats.f1(),
                    Scoring::Precision => stats.precision(),
                    _ => stats.recall(),
                })
            }
            Scoring::F1Micro => accuracy(y_true, y_pred),
            Scoring::F1Macro => Ok(macro_average(y_true, y_pred, ClassStats::f1)),
            Scoring::PrecisionMacro => Ok(macro_average(y_true, y_pred, ClassStats::precision)),
            Scoring::RecallMacro => Ok(macro_average(y_true, y_pred, ClassStats::recall)),
            Scoring::BalancedAccuracy => {
                let classes: BTreeSet<i64> = y_true.iter().map(|&v| v.round() as i64).collect();
                if classes.is_empty() {
                    return Ok(0.0);
                }
                let total: f64 = classes
                    .iter()
                    .map(|&c| ClassStats::for_label(y_true, y_pred, c).recall())
                    .sum();
                Ok(total / classes.len() as f64)
            }
            Scoring::F1Weighted => {
                let n = y_true.len() as f64;
                if n == 0.0 {
                    return Ok(0.0);
                }
                Ok(label_set(y_true, y_pred)
                    .into_iter()
                    .map(|c| {
                        let stats = ClassStats::for_label(y_true, y_pred, c);
                        stats.support() as f64 / n * stats.f1()
                    })
                    .sum())
            }
        }
    }
}

impl Default for Scoring {
    fn default() -> Self {
        Scoring::F1
    }
}

impl fmt::Display for Scoring {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Scoring {
    type Err = ClassifierError;

    fn from_str(s: &str) -> Result<Self> {
        Scoring::ALL
            .iter()
            .copied()
            .find(|scoring| scoring.name() == s)
            .ok_or_else(|| {
                let valid: Vec<&str> = Scoring::ALL.iter().map(Scoring::name).collect();
                ClassifierError::ConfigError(format!(
                    "'{}' is not a valid scoring value. Valid options are: {}",
                    s,
                    valid.join(", ")
                ))
            })
    }
}

/// Fraction of predictions equal to the true label
pub fn accuracy(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> Result<f64> {
    check_same_length(y_true, y_pred)?;
    if y_true.is_empty() {
        return Err(ClassifierError::DataError("Cannot score an empty batch".to_string()));
    }
    let correct = y_true
        .iter()
        .zip(y_pred.iter())
        .filter(|(t, p)| (*t - *p).abs() < 0.5)
        .count();
    Ok(correct as f64 / y_true.len() as f64)
}

fn check_same_length(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> Result<()> {
    if y_true.len() != y_pred.len() {
        return Err(ClassifierError::ShapeError {
            expected: format!("{} predictions", y_true.len()),
            actual: format!("{} predictions", y_pred.len()),
        });
    }
    Ok(())
}

fn label_set(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> BTreeSet<i64> {
    y_true
        .iter()
        .chain(y_pred.iter())
        .map(|&v| v.round() as i64)
        .collect()
}

fn macro_average(y_true: &Array1<f64>, y_pred: &Array1<f64>, metric: fn(&ClassStats) -> f64) -> f64 {
    let labels = label_set(y_true, y_pred);
    if labels.is_empty() {
        return 0.0;
    }
    let total: f64 = labels
        .iter()
        .map(|&c| metric(&ClassStats::for_label(y_true, y_pred, c)))
        .sum();
    total / labels.len() as f64
}

/// One-vs-rest counts for a single label; undefined ratios score 0
struct ClassStats {
    tp: usize,
    fp: usize,
    fn_: usize,
}

impl ClassStats {
    fn for_label(y_true: &Array1<f64>, y_pred: &Array1<f64>, label: i64) -> Self {
        let mut stats = ClassStats { tp: 0, fp: 0, fn_: 0 };
        for (t, p) in y_true.iter().zip(y_pred.iter()) {
            let t_pos = t.round() as i64 == label;
            let p_pos = p.round() as i64 == label;
            match (t_pos, p_pos) {
                (true, true) => stats.tp += 1,
                (false, true) => stats.fp += 1,
                (true, false) => stats.fn_ += 1,
                (false, false) => {}
            }
        }
        stats
    }

    fn support(&self) -> usize {
        self.tp + self.fn_
    }

    fn precision(&self) -> f64 {
        if self.tp + self.fp > 0 {
            self.tp as f64 / (self.tp + self.fp) as f64
        } else {
            0.0
        }
    }

    fn recall(&self) -> f64 {
        if self.tp + self.fn_ > 0 {
            self.tp as f64 / (self.tp + self.fn_) as f64
        } else {
            0.0
        }
    }

    fn f1(&self) -> f64 {
        let denom = 2 * self.tp + self.fp + self.fn_;
        if denom > 0 {
            2.0 * self.tp as f64 / denom as f64
        } else {
            0.0
        }
    }
}

/// Predicted-vs-actual label counts; row = true label, column = predicted label
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    counts: Array2<usize>,
}

impl ConfusionMatrix {
    /// Tally `class_num × class_num` counts. Labels must be integers in `0..class_num`.
    pub fn from_labels(y_true: &Array1<f64>, y_pred: &Array1<f64>, class_num: usize) -> Result<Self> {
        if class_num == 0 {
            return Err(ClassifierError::InvalidInput(
                "class_num must be at least 1".to_string(),
            ));
        }
        check_same_length(y_true, y_pred)?;

        let mut counts = Array2::zeros((class_num, class_num));
        for (&t, &p) in y_true.iter().zip(y_pred.iter()) {
            let row = class_index(t, class_num)?;
            let col = class_index(p, class_num)?;
            counts[[row, col]] += 1;
        }
        Ok(Self { counts })
    }

    pub fn counts(&self) -> &Array2<usize> {
        &self.counts
    }

    pub fn class_num(&self) -> usize {
        self.counts.nrows()
    }

    /// Number of samples whose true label is `class`
    pub fn row_total(&self, class: usize) -> usize {
        self.counts.row(class).sum()
    }

    /// True classes with no samples in the batch
    pub fn absent_classes(&self) -> Vec<usize> {
        (0..self.class_num()).filter(|&c| self.row_total(c) == 0).collect()
    }

    /// Each row divided by its sum. Rows of absent classes are `NaN`.
    pub fn normalized(&self) -> Array2<f64> {
        let mut norm = self.counts.mapv(|c| c as f64);
        for mut row in norm.rows_mut() {
            let total: f64 = row.sum();
            row.mapv_inplace(|v| v / total);
        }
        norm
    }
}

fn class_index(label: f64, class_num: usize) -> Result<usize> {
    if !label.is_finite() || label.fract() != 0.0 || label < 0.0 || label >= class_num as f64 {
        return Err(ClassifierError::InvalidInput(format!(
            "label {} is not a class index in 0..{}",
            label, class_num
        )));
    }
    Ok(label as usize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_accuracy() {
        let y_true = array![1.0, 0.0, 1.0, 1.0, 0.0, 1.0, 0.0, 0.0];
        let y_pred = array![1.0, 0.0, 1.0, 0.0, 0.0, 1.0, 1.0, 0.0];
        assert!((accuracy(&y_true, &y_pred).unwrap() - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_binary_f1() {
        let y_true = array![0.0, 0.0, 1.0, 1.0];
        let y_pred = array![0.0, 1.0, 1.0, 1.0];
        // tp = 2, fp = 1, fn = 0
        let f1 = Scoring::F1.score(&y_true, &y_pred).unwrap();
        assert!((f1 - 0.8).abs() < 1e-12);
        let precision = Scoring::Precision.score(&y_true, &y_pred).unwrap();
        assert!((precision - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(Scoring::Recall.score(&y_true, &y_pred).unwrap(), 1.0);
    }

    #[test]
    fn test_binary_f1_rejects_multiclass() {
        let y_true = array![0.0, 1.0, 2.0];
        let y_pred = array![0.0, 1.0, 2.0];
        assert!(Scoring::F1.score(&y_true, &y_pred).is_err());
        assert_eq!(Scoring::F1Macro.score(&y_true, &y_pred).unwrap(), 1.0);
    }

    #[test]
    fn test_binary_scorers_need_positive_label() {
        let y_true = array![0.0, 2.0, 2.0, 0.0];
        let y_pred = array![0.0, 2.0, 0.0, 0.0];
        for scoring in [Scoring::F1, Scoring::Precision, Scoring::Recall] {
            match scoring.score(&y_true, &y_pred) {
                Err(ClassifierError::ValidationError(msg)) => assert!(msg.contains("pos_label=1")),
                other => panic!("unexpected result for {}: {other:?}", scoring),
            }
        }
        assert_eq!(Scoring::Accuracy.score(&y_true, &y_pred).unwrap(), 0.75);

        // A single-class fold still scores
        let zeros = array![0.0, 0.0];
        assert_eq!(Scoring::F1.score(&zeros, &zeros).unwrap(), 0.0);
    }

    #[test]
    fn test_macro_and_balanced() {
        let y_true = array![0.0, 0.0, 0.0, 1.0];
        let y_pred = array![0.0, 0.0, 0.0, 0.0];
        // recall(0) = 1, recall(1) = 0
        assert!((Scoring::BalancedAccuracy.score(&y_true, &y_pred).unwrap() - 0.5).abs() < 1e-12);
        assert!((Scoring::RecallMacro.score(&y_true, &y_pred).unwrap() - 0.5).abs() < 1e-12);
        assert!((Scoring::F1Micro.score(&y_true, &y_pred).unwrap() - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_scoring_from_str() {
        assert_eq!("f1_weighted".parse::<Scoring>().unwrap(), Scoring::F1Weighted);
        let err = "roc".parse::<Scoring>().unwrap_err();
        assert!(err.to_string().contains("accuracy"));
    }

    #[test]
    fn test_confusion_counts() {
        let y_true = array![0.0, 0.0, 1.0, 1.0];
        let y_pred = array![0.0, 1.0, 1.0, 1.0];
        let conf = ConfusionMatrix::from_labels(&y_true, &y_pred, 2).unwrap();
        assert_eq!(conf.counts(), &array![[1usize, 1], [0, 2]]);

        let norm = conf.normalized();
        assert_eq!(norm, array![[0.5, 0.5], [0.0, 1.0]]);
    }

    #[test]
    fn test_absent_class_row_is_nan() {
        let y_true = array![0.0, 0.0];
        let y_pred = array![0.0, 1.0];
        let conf = ConfusionMatrix::from_labels(&y_true, &y_pred, 3).unwrap();
        assert_eq!(conf.absent_classes(), vec![1, 2]);
        let norm = conf.normalized();
        assert!(norm.row(1).iter().all(|v| v.is_nan()));
        assert!((norm[[0, 0]] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_confusion_rejects_out_of_range_labels() {
        let y_true = array![0.0, 2.0];
        let y_pred = array![0.0, 1.0];
        assert!(ConfusionMatrix::from_labels(&y_true, &y_pred, 2).is_err());
        assert!(ConfusionMatrix::from_labels(&array![0.5], &array![0.0], 2).is_err());
    }
}
