use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ndarray::{Array1, Array2};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use stackblend::config::StackConfig;
use stackblend::data::Dataset;
use stackblend::stacking::{linear_family, FitOptions, StackBuilder};
use stackblend::training::assign_folds;

fn create_regression_data(n_rows: usize, n_features: usize) -> Dataset {
    let mut rng = ChaCha8Rng::seed_from_u64(0);
    let x = Array2::from_shape_fn((n_rows, n_features), |_| rng.gen::<f64>() * 10.0);
    // Target as sum of features + noise
    let y: Array1<f64> = x
        .rows()
        .into_iter()
        .map(|row| row.sum() + rng.gen::<f64>() * 0.1)
        .collect();
    let names = (0..n_features).map(|i| format!("feature_{}", i)).collect();
    Dataset::new(names, "target", x, y).unwrap()
}

fn bench_linear_family(c: &mut Criterion) {
    let mut group = c.benchmark_group("linear_family");
    group.sample_size(10);

    for n_rows in [500, 2000].iter() {
        let data = create_regression_data(*n_rows, 10);
        let folds = assign_folds(*n_rows, 5, 42).unwrap();
        let grid = linear_family::default_grid();

        group.bench_with_input(BenchmarkId::new("tune", n_rows), &data, |b, data| {
            b.iter(|| {
                linear_family::tune(
                    black_box(data.features()),
                    data.target(),
                    &folds,
                    &grid,
                    &FitOptions::default(),
                )
                .unwrap()
            })
        });
    }

    group.finish();
}

fn bench_full_stack(c: &mut Criterion) {
    let mut group = c.benchmark_group("stack");
    group.sample_size(10);

    for n_rows in [500, 2000].iter() {
        let data = create_regression_data(*n_rows, 10);
        let mut config = StackConfig::new(50, 1.0);
        config.ensemble.repeats = 1;

        group.bench_with_input(BenchmarkId::new("fit", n_rows), &data, |b, data| {
            b.iter(|| StackBuilder::new(config.clone()).fit(black_box(data)).unwrap())
        });
    }

    group.finish();
}

fn bench_prediction(c: &mut Criterion) {
    let mut group = c.benchmark_group("prediction");

    let train = create_regression_data(2000, 10);
    let run = StackBuilder::new(StackConfig::new(50, 1.0)).fit(&train).unwrap();

    for n_rows in [100, 1000, 10000].iter() {
        let data = create_regression_data(*n_rows, 10);
        group.bench_with_input(BenchmarkId::new("predict", n_rows), &data, |b, data| {
            b.iter(|| run.ensemble.predict(black_box(data.features())).unwrap())
        });
    }

    group.finish();
}

criterion_group!(benches, bench_linear_family, bench_full_stack, bench_prediction);
criterion_main!(benches);
