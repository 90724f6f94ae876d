//! Integration test: grid-search tuning through the facade

use kolosal_classifier::prelude::*;
use ndarray::{Array1, Array2};

/// Two well separated diagonal strips, fifteen samples each
fn tuning_data() -> (Array2<f64>, Array1<f64>) {
    let mut data = Vec::new();
    let mut labels = Vec::new();
    for i in 0..15 {
        let offset = i as f64 * 0.05;
        data.extend_from_slice(&[offset, 1.0 - offset]);
        labels.push(0.0);
        data.extend_from_slice(&[4.0 + offset, 5.0 - offset]);
        labels.push(1.0);
    }
    (Array2::from_shape_vec((30, 2), data).unwrap(), Array1::from_vec(labels))
}

fn quiet_config() -> TuningConfig {
    TuningConfig::new().with_n_jobs(2).with_verbose(0)
}

#[test]
fn test_best_only_has_score_and_params_keys() {
    let (x, y) = tuning_data();
    let mut facade = ModelFacade::with_config("KNN", Params::new(), quiet_config()).unwrap();
    let options = TuneOptions::new()
        .with_tuning_space(ParamGrid::new().with("n_neighbors", vec![1, 3, 5]))
        .with_best_only(true);

    let result = facade.tune(&x, &y, &options).unwrap();
    let json = serde_json::to_value(&result).unwrap();
    let mut keys: Vec<&str> = json.as_object().unwrap().keys().map(String::as_str).collect();
    keys.sort_unstable();
    assert_eq!(keys, vec!["params", "score"]);
    assert_eq!(json["score"], serde_json::json!(1.0));
    assert_eq!(json["params"], serde_json::json!({"n_neighbors": 1}));
}

#[test]
fn test_all_results_cover_the_grid() {
    let (x, y) = tuning_data();
    let mut facade = ModelFacade::with_config("KNN", Params::new(), quiet_config()).unwrap();
    let grid = ParamGrid::new()
        .with("n_neighbors", vec![1, 3, 5])
        .with("weights", vec!["uniform", "distance"]);
    let options = TuneOptions::new().with_tuning_space(grid.clone());

    match facade.tune(&x, &y, &options).unwrap() {
        TuningResult::All(scores) => {
            assert_eq!(scores.len(), grid.n_candidates());
            let entry = &scores["n_neighbors=3, weights='distance'"];
            assert_eq!(entry.test_score, 1.0);
            assert_eq!(entry.train_score, 1.0);
        }
        other => panic!("unexpected result: {other:?}"),
    }
}

#[test]
fn test_tune_replaces_model() {
    let (x, y) = tuning_data();
    let mut facade = ModelFacade::with_config("DecisionTree", Params::new(), quiet_config()).unwrap();
    assert!(!facade.get_model().unwrap().is_fitted());

    let options = TuneOptions::new()
        .with_tuning_space(ParamGrid::new().with("max_depth", vec![1, 2]))
        .with_best_only(true)
        .with_scoring("accuracy");
    facade.tune(&x, &y, &options).unwrap();

    let model = facade.get_model().unwrap();
    assert!(model.is_fitted());
    assert_eq!(model.params().get("max_depth").and_then(|v| v.as_i64()), Some(1));
    assert_eq!(facade.score(&x, &y).unwrap(), 1.0);
}

#[test]
fn test_empty_grid_uses_construction_params() {
    let (x, y) = tuning_data();
    let params = Params::new().with("C", 0.5).with("kernel", "linear");
    let mut facade = ModelFacade::with_config("SVC", params, quiet_config()).unwrap();

    let result = facade
        .tune(&x, &y, &TuneOptions::new().with_tuning_space(ParamGrid::new()))
        .unwrap();
    match result {
        TuningResult::All(scores) => {
            let keys: Vec<&String> = scores.keys().collect();
            assert_eq!(keys, vec!["C=0.5, kernel='linear'"]);
        }
        other => panic!("unexpected result: {other:?}"),
    }
}

#[test]
fn test_bad_grid_value_keeps_previous_model() {
    let (x, y) = tuning_data();
    let mut facade = ModelFacade::with_config("KNN", Params::new().with("n_neighbors", 3), quiet_config()).unwrap();
    facade.fit(&x, &y).unwrap();

    let options = TuneOptions::new().with_tuning_space(ParamGrid::new().with("metric", vec!["hamming"]));
    let err = facade.tune(&x, &y, &options).unwrap_err();
    assert!(matches!(err, ClassifierError::InvalidParameter { .. }));
    assert!(facade.get_model().unwrap().is_fitted());
}

#[test]
fn test_repeated_grid_value_is_config_error() {
    let (x, y) = tuning_data();
    let mut facade = ModelFacade::with_config("KNN", Params::new(), quiet_config()).unwrap();
    let options = TuneOptions::new().with_tuning_space(ParamGrid::new().with("n_neighbors", vec![3, 3]));
    assert!(matches!(facade.tune(&x, &y, &options), Err(ClassifierError::ConfigError(_))));
}

#[test]
fn test_binary_f1_without_label_one_fails() {
    let (x, y) = tuning_data();
    let y = y.mapv(|v| v * 2.0);
    let mut facade = ModelFacade::with_config("KNN", Params::new(), quiet_config()).unwrap();
    let grid = ParamGrid::new().with("n_neighbors", vec![1, 3]);

    let f1 = TuneOptions::new().with_tuning_space(grid.clone());
    assert!(matches!(facade.tune(&x, &y, &f1), Err(ClassifierError::TrainingError(_))));

    let accuracy = TuneOptions::new().with_tuning_space(grid).with_scoring("accuracy");
    assert!(facade.tune(&x, &y, &accuracy).is_ok());
}

#[test]
fn test_multiclass_needs_averaged_scoring() {
    let mut data = Vec::new();
    let mut labels = Vec::new();
    for class in 0..3 {
        for i in 0..6 {
            data.extend_from_slice(&[class as f64 * 5.0 + i as f64 * 0.1, 0.0]);
            labels.push(class as f64);
        }
    }
    let x = Array2::from_shape_vec((18, 2), data).unwrap();
    let y = Array1::from_vec(labels);
    let grid = ParamGrid::new().with("n_neighbors", vec![1, 3]);

    let mut facade = ModelFacade::with_config("KNN", Params::new(), quiet_config().with_cv(3)).unwrap();
    let binary = TuneOptions::new().with_tuning_space(grid.clone());
    assert!(matches!(facade.tune(&x, &y, &binary), Err(ClassifierError::TrainingError(_))));

    let macro_f1 = TuneOptions::new()
        .with_tuning_space(grid)
        .with_scoring("f1_macro")
        .with_best_only(true);
    match facade.tune(&x, &y, &macro_f1).unwrap() {
        TuningResult::Best { score, .. } => assert_eq!(score, 1.0),
        other => panic!("unexpected result: {other:?}"),
    }
}

#[test]
fn test_config_file_drives_tuning() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tuning.json");
    quiet_config().with_cv(3).with_default_scoring("accuracy").save(&path).unwrap();

    let config = TuningConfig::load(&path).unwrap();
    let (x, y) = tuning_data();
    let mut facade = ModelFacade::with_config("G-NaiveBayes", Params::new(), config).unwrap();
    let result = facade.tune(&x, &y, &TuneOptions::new().with_best_only(true)).unwrap();
    match result {
        TuningResult::Best { score, params } => {
            assert_eq!(score, 1.0);
            assert!(params.is_empty());
        }
        other => panic!("unexpected result: {other:?}"),
    }
}
