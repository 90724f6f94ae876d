use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use kolosal_classifier::prelude::*;
use ndarray::{Array1, Array2};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

fn create_classification_data(n_rows: usize, n_features: usize) -> (Array2<f64>, Array1<f64>) {
    let mut rng = ChaCha8Rng::seed_from_u64(42);

    let y: Array1<f64> = (0..n_rows).map(|i| (i % 2) as f64).collect();
    let x = Array2::from_shape_fn((n_rows, n_features), |(i, _)| {
        y[i] * 2.0 + rng.gen::<f64>()
    });
    (x, y)
}

fn bench_fit(c: &mut Criterion) {
    let mut group = c.benchmark_group("fit");
    group.sample_size(10);

    let (x, y) = create_classification_data(1000, 10);
    for name in ["KNN", "G-NaiveBayes", "DecisionTree", "LogisticRegression"] {
        group.bench_with_input(BenchmarkId::new("fit", name), &name, |b, name| {
            b.iter(|| {
                let mut facade = ModelFacade::new(name, Params::new()).unwrap();
                facade.fit(black_box(&x), black_box(&y)).unwrap();
            })
        });
    }

    group.finish();
}

fn bench_tuning(c: &mut Criterion) {
    let mut group = c.benchmark_group("tuning");
    group.sample_size(10);

    let (x, y) = create_classification_data(500, 8);
    let grid = ParamGrid::new()
        .with("n_neighbors", vec![1, 3, 5, 7])
        .with("weights", vec!["uniform", "distance"]);

    for n_jobs in [1, 4].iter() {
        group.bench_with_input(BenchmarkId::new("knn_grid", n_jobs), n_jobs, |b, &n_jobs| {
            let config = TuningConfig::new().with_n_jobs(n_jobs).with_verbose(0);
            let options = TuneOptions::new().with_tuning_space(grid.clone());
            b.iter(|| {
                let mut facade = ModelFacade::with_config("KNN", Params::new(), config.clone()).unwrap();
                facade.tune(black_box(&x), black_box(&y), &options).unwrap()
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_fit, bench_tuning);
criterion_main!(benches);
