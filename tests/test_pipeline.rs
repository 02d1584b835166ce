//! Integration test: configuration, CSV loading and the full stacking run

use polars::prelude::*;
use stackblend::config::StackConfig;
use stackblend::data::{load_csv, Dataset};
use stackblend::report::{RunReport, ENSEMBLE_ROW};
use stackblend::stacking::StackBuilder;
use stackblend::StackError;
use std::io::Write;
use tempfile::NamedTempFile;

const PARAMS: &str = r#"{
    "cv": {"folds": 4, "seed": 7},
    "tune": {
        "trees": 40,
        "tree_depth": 3,
        "learn_rate": 0.2,
        "linear_grid": [
            {"penalty": 0.01, "mixture": 1.0},
            {"penalty": 0.1, "mixture": 0.5},
            {"penalty": 1.0, "mixture": 0.0}
        ]
    },
    "ensemble": {"alpha": 1.0, "repeats": 2, "n_lambda": 25}
}"#;

fn housing_like_df(n: usize) -> DataFrame {
    let rooms: Vec<f64> = (0..n).map(|i| 3.0 + ((i * 7) % 5) as f64).collect();
    let area: Vec<f64> = (0..n).map(|i| 50.0 + ((i * 13) % 41) as f64 * 2.5).collect();
    let age: Vec<f64> = (0..n).map(|i| ((i * 17) % 60) as f64).collect();
    let price: Vec<f64> = (0..n)
        .map(|i| 20.0 * rooms[i] + 1.5 * area[i] - 0.02 * (age[i] - 30.0).powi(2) + ((i % 5) as f64 - 2.0))
        .collect();
    df!(
        "rooms" => rooms,
        "area" => area,
        "age" => age,
        "price" => price
    )
    .unwrap()
}

fn write_csv(df: &DataFrame) -> NamedTempFile {
    let file = NamedTempFile::new().unwrap();
    let mut handle = file.reopen().unwrap();
    CsvWriter::new(&mut handle).finish(&mut df.clone()).unwrap();
    handle.flush().unwrap();
    file
}

#[test]
fn test_config_file_is_validated() {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(br#"{"tune": {"trees": 10}}"#).unwrap();
    let err = StackConfig::from_file(file.path()).unwrap_err();
    assert!(matches!(err, StackError::InvalidConfiguration(_)));

    let config = StackConfig::from_json_str(PARAMS).unwrap();
    assert_eq!(config.cv.folds, 4);
    assert_eq!(config.linear_grid().len(), 3);
    assert_eq!(config.ensemble.folds, 5);
}

#[test]
fn test_fit_from_csv_and_report() {
    let train_file = write_csv(&housing_like_df(120));
    let test_file = write_csv(&housing_like_df(40));

    let train = Dataset::from_dataframe(&load_csv(train_file.path()).unwrap(), "price").unwrap();
    let test = Dataset::from_dataframe(&load_csv(test_file.path()).unwrap(), "price").unwrap();
    assert_eq!(train.feature_names(), &["rooms".to_string(), "area".to_string(), "age".to_string()]);

    let config = StackConfig::from_json_str(PARAMS).unwrap();
    let result = StackBuilder::new(config).fit(&train);
    assert!(result.is_ok(), "stacking should succeed: {:?}", result.err());
    let run = result.unwrap();

    assert_eq!(run.candidates.len(), 4);
    assert_eq!(run.folds.n_folds(), 4);
    assert!(run.failures.is_empty());

    let evaluation = run.evaluate(&test).unwrap();
    let ensemble_row = evaluation.metrics.get(ENSEMBLE_ROW).unwrap();
    assert!(ensemble_row.rsq > 0.8, "ensemble R² = {}", ensemble_row.rsq);
    assert_eq!(evaluation.metrics.rows().len(), run.ensemble.members().len() + 1);

    let contributions = run.contributions();
    assert_eq!(contributions.len(), run.ensemble.members().len());
    assert!(contributions.iter().all(|c| c.weight > 0.0));

    let report_file = NamedTempFile::new().unwrap();
    RunReport::new(&run, Some(&evaluation)).write_json(report_file.path()).unwrap();
    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(report_file.path()).unwrap()).unwrap();
    assert_eq!(json["members"].as_array().unwrap().len(), 4);
    assert!(json["metrics"].as_array().is_some());
}

#[test]
fn test_same_config_gives_same_ensemble() {
    let train = Dataset::from_dataframe(&housing_like_df(80), "price").unwrap();
    let config = StackConfig::from_json_str(PARAMS).unwrap();

    let a = StackBuilder::new(config.clone()).fit(&train).unwrap();
    let b = StackBuilder::new(config).fit(&train).unwrap();
    assert_eq!(a.folds, b.folds);
    assert_eq!(a.ensemble.blend().members(), b.ensemble.blend().members());
    assert_eq!(
        a.ensemble.predict(train.features()).unwrap(),
        b.ensemble.predict(train.features()).unwrap()
    );
}

#[test]
fn test_predict_frame_uses_training_columns() {
    let train = Dataset::from_dataframe(&housing_like_df(80), "price").unwrap();
    let run = StackBuilder::new(StackConfig::from_json_str(PARAMS).unwrap())
        .fit(&train)
        .unwrap();

    // Column order and the extra target column do not matter
    let df = housing_like_df(10).select(["price", "age", "rooms", "area"]).unwrap();
    let table = run.ensemble.predict_frame(&df).unwrap();
    assert_eq!(table.n_rows(), 10);

    let missing = housing_like_df(10).drop("area").unwrap();
    assert!(matches!(
        run.ensemble.predict_frame(&missing),
        Err(StackError::FeatureNotFound(_))
    ));
}

#[test]
fn test_timeout_drops_every_candidate() {
    let train = Dataset::from_dataframe(&housing_like_df(60), "price").unwrap();
    let mut config = StackConfig::from_json_str(PARAMS).unwrap();
    config.fit.timeout_secs = Some(1e-9);
    let err = StackBuilder::new(config).fit(&train).unwrap_err();
    assert!(matches!(err, StackError::DegenerateBlendError(_)), "{:?}", err);
}
