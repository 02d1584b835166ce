//! Numeric training/test datasets built from polars frames

use crate::error::{Result, StackError};
use ndarray::{Array1, Array2, Axis};
use polars::prelude::*;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// Extract named columns from a DataFrame into a row-major `Array2<f64>`.
///
/// Columns are cast to Float64; a missing column is
/// [`StackError::FeatureNotFound`] and a null value is a [`StackError::DataError`].
pub fn columns_to_array(df: &DataFrame, col_names: &[String]) -> Result<Array2<f64>> {
    let n_rows = df.height();
    let col_data: Vec<Vec<f64>> = col_names
        .iter()
        .map(|name| column_values(df, name))
        .collect::<Result<_>>()?;

    let col_refs: Vec<&[f64]> = col_data.iter().map(|c| c.as_slice()).collect();
    Ok(Array2::from_shape_fn((n_rows, col_names.len()), |(r, c)| col_refs[c][r]))
}

fn column_values(df: &DataFrame, name: &str) -> Result<Vec<f64>> {
    let column = df
        .column(name)
        .map_err(|_| StackError::FeatureNotFound(name.to_string()))?;
    let column_f64 = column.cast(&DataType::Float64)?;
    column_f64
        .f64()?
        .into_iter()
        .enumerate()
        .map(|(row, v)| {
            v.ok_or_else(|| StackError::DataError(format!("column '{}' has a missing value at row {}", name, row)))
        })
        .collect()
}

/// Named numeric features plus a numeric target, rows in file order.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    feature_names: Vec<String>,
    target_name: String,
    features: Array2<f64>,
    target: Array1<f64>,
}

impl Dataset {
    pub fn new(
        feature_names: Vec<String>,
        target_name: impl Into<String>,
        features: Array2<f64>,
        target: Array1<f64>,
    ) -> Result<Self> {
        if features.ncols() != feature_names.len() {
            return Err(StackError::ShapeError {
                expected: format!("{} feature columns", feature_names.len()),
                actual: format!("{} feature columns", features.ncols()),
            });
        }
        if features.nrows() != target.len() {
            return Err(StackError::ShapeError {
                expected: format!("{} target values", features.nrows()),
                actual: format!("{} target values", target.len()),
            });
        }
        if feature_names.is_empty() {
            return Err(StackError::DataError("dataset has no feature columns".to_string()));
        }
        if features.iter().chain(target.iter()).any(|v| !v.is_finite()) {
            return Err(StackError::DataError("dataset contains non-finite values".to_string()));
        }
        Ok(Self {
            feature_names,
            target_name: target_name.into(),
            features,
            target,
        })
    }

    /// Every column except `target` is a feature.
    pub fn from_dataframe(df: &DataFrame, target: &str) -> Result<Self> {
        let feature_names: Vec<String> = df
            .get_column_names()
            .into_iter()
            .filter(|name| name.as_str() != target)
            .map(|s| s.to_string())
            .collect();

        let y = Array1::from_vec(column_values(df, target)?);
        let x = columns_to_array(df, &feature_names)?;
        Self::new(feature_names, target, x, y)
    }

    pub fn features(&self) -> &Array2<f64> {
        &self.features
    }

    pub fn target(&self) -> &Array1<f64> {
        &self.target
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn target_name(&self) -> &str {
        &self.target_name
    }

    pub fn n_rows(&self) -> usize {
        self.target.len()
    }

    pub fn n_features(&self) -> usize {
        self.feature_names.len()
    }

    /// Feature matrix with its columns arranged in the order of `names`.
    pub fn features_by_name(&self, names: &[String]) -> Result<Array2<f64>> {
        let indices: Vec<usize> = names
            .iter()
            .map(|name| {
                self.feature_names
                    .iter()
                    .position(|n| n == name)
                    .ok_or_else(|| StackError::FeatureNotFound(name.clone()))
            })
            .collect::<Result<_>>()?;
        Ok(self.features.select(Axis(1), &indices))
    }

    /// Subset of rows, in the order given
    pub fn select_rows(&self, rows: &[usize]) -> Dataset {
        Dataset {
            feature_names: self.feature_names.clone(),
            target_name: self.target_name.clone(),
            features: self.features.select(Axis(0), rows),
            target: self.target.select(Axis(0), rows),
        }
    }

    /// Seeded random split into `(train, test)`, each keeping file order.
    pub fn train_test_split(&self, test_fraction: f64, seed: u64) -> Result<(Dataset, Dataset)> {
        if !(test_fraction > 0.0 && test_fraction < 1.0) {
            return Err(StackError::InvalidConfiguration(format!(
                "test fraction must be in (0, 1), got {}",
                test_fraction
            )));
        }
        let n = self.n_rows();
        if n < 2 {
            return Err(StackError::DataError("need at least 2 rows to split".to_string()));
        }
        let n_test = ((n as f64 * test_fraction).round() as usize).clamp(1, n - 1);

        let mut indices: Vec<usize> = (0..n).collect();
        indices.shuffle(&mut ChaCha8Rng::seed_from_u64(seed));
        let (test, train) = indices.split_at_mut(n_test);
        test.sort_unstable();
        train.sort_unstable();

        Ok((self.select_rows(train), self.select_rows(test)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame() -> DataFrame {
        DataFrame::new(vec![
            Series::new("a".into(), &[1.0, 2.0, 3.0, 4.0]).into(),
            Series::new("y".into(), &[10i64, 20, 30, 40]).into(),
            Series::new("b".into(), &[0.5, 0.5, 1.5, 1.5]).into(),
        ])
        .unwrap()
    }

    #[test]
    fn test_from_dataframe() {
        let ds = Dataset::from_dataframe(&frame(), "y").unwrap();
        assert_eq!(ds.feature_names(), &["a".to_string(), "b".to_string()]);
        assert_eq!(ds.target().to_vec(), vec![10.0, 20.0, 30.0, 40.0]);
        assert_eq!(ds.features()[[2, 1]], 1.5);
    }

    #[test]
    fn test_missing_target() {
        let err = Dataset::from_dataframe(&frame(), "price").unwrap_err();
        assert!(matches!(err, StackError::FeatureNotFound(_)));
    }

    #[test]
    fn test_features_by_name_reorders_columns() {
        let ds = Dataset::from_dataframe(&frame(), "y").unwrap();
        let x = ds.features_by_name(&["b".to_string(), "a".to_string()]).unwrap();
        assert_eq!(x.row(2).to_vec(), vec![1.5, 3.0]);

        let err = ds.features_by_name(&["c".to_string()]).unwrap_err();
        assert!(matches!(err, StackError::FeatureNotFound(ref name) if name == "c"));
    }

    #[test]
    fn test_null_values_rejected() {
        let df = DataFrame::new(vec![
            Series::new("a".into(), &[Some(1.0), None]).into(),
            Series::new("y".into(), &[1.0, 2.0]).into(),
        ])
        .unwrap();
        let err = Dataset::from_dataframe(&df, "y").unwrap_err();
        assert!(err.to_string().contains("row 1"), "{}", err);
    }

    #[test]
    fn test_train_test_split_partitions_rows() {
        let x = Array2::from_shape_fn((10, 1), |(i, _)| i as f64);
        let y = Array1::from_shape_fn(10, |i| i as f64);
        let ds = Dataset::new(vec!["x".to_string()], "y", x, y).unwrap();

        let (train, test) = ds.train_test_split(0.3, 5).unwrap();
        assert_eq!(test.n_rows(), 3);
        assert_eq!(train.n_rows(), 7);
        let mut all: Vec<f64> = train.target().iter().chain(test.target().iter()).copied().collect();
        all.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(all, (0..10).map(|i| i as f64).collect::<Vec<_>>());

        assert_eq!(ds.train_test_split(0.3, 5).unwrap(), (train, test));
        assert!(ds.train_test_split(1.0, 5).is_err());
    }
}
