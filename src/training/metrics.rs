//! Regression metrics

use crate::error::{Result, StackError};
use ndarray::Array1;
use serde::{Deserialize, Serialize};

/// Metrics for model evaluation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelMetrics {
    /// Mean Squared Error
    pub mse: f64,
    /// Root Mean Squared Error
    pub rmse: f64,
    /// Mean Absolute Error
    pub mae: f64,
    /// R-squared (1 - SS_res / SS_tot)
    pub r2: f64,
    /// Number of evaluated samples
    pub n_samples: usize,
}

impl ModelMetrics {
    /// Compute regression metrics
    pub fn compute_regression(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> Result<Self> {
        if y_true.len() != y_pred.len() {
            return Err(StackError::ShapeError {
                expected: format!("{} predictions", y_true.len()),
                actual: format!("{} predictions", y_pred.len()),
            });
        }
        if y_true.is_empty() {
            return Err(StackError::DataError("cannot score zero rows".to_string()));
        }

        let n = y_true.len() as f64;
        let errors: Vec<f64> = y_true
            .iter()
            .zip(y_pred.iter())
            .map(|(t, p)| t - p)
            .collect();

        let mse: f64 = errors.iter().map(|e| e * e).sum::<f64>() / n;
        let mae: f64 = errors.iter().map(|e| e.abs()).sum::<f64>() / n;

        let y_mean: f64 = y_true.iter().sum::<f64>() / n;
        let ss_tot: f64 = y_true.iter().map(|y| (y - y_mean).powi(2)).sum();
        let ss_res: f64 = errors.iter().map(|e| e.powi(2)).sum();
        let r2 = if ss_tot > 0.0 { 1.0 - ss_res / ss_tot } else { 0.0 };

        Ok(Self {
            mse,
            rmse: mse.sqrt(),
            mae,
            r2,
            n_samples: y_true.len(),
        })
    }
}

/// Loss used to score held-out predictions during cross-validation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LossMetric {
    #[default]
    Rmse,
    Mse,
    Mae,
}

impl LossMetric {
    /// Loss of `y_pred` against `y_true`; lower is better
    pub fn loss(&self, y_true: &Array1<f64>, y_pred: &Array1<f64>) -> Result<f64> {
        let m = ModelMetrics::compute_regression(y_true, y_pred)?;
        Ok(match self {
            LossMetric::Rmse => m.rmse,
            LossMetric::Mse => m.mse,
            LossMetric::Mae => m.mae,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_regression_metrics() {
        let y_true = array![1.0, 2.0, 3.0, 4.0, 5.0];
        let y_pred = array![1.1, 2.0, 2.9, 4.1, 5.0];

        let metrics = ModelMetrics::compute_regression(&y_true, &y_pred).unwrap();

        assert!((metrics.mse - 0.006).abs() < 1e-12);
        assert!((metrics.rmse - 0.006f64.sqrt()).abs() < 1e-12);
        assert!(metrics.r2 > 0.9);
    }

    #[test]
    fn test_loss_metric_selection() {
        let y_true = array![0.0, 0.0];
        let y_pred = array![1.0, 3.0];
        assert!((LossMetric::Mse.loss(&y_true, &y_pred).unwrap() - 5.0).abs() < 1e-12);
        assert!((LossMetric::Rmse.loss(&y_true, &y_pred).unwrap() - 5.0f64.sqrt()).abs() < 1e-12);
        assert!((LossMetric::Mae.loss(&y_true, &y_pred).unwrap() - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_length_mismatch() {
        let err = ModelMetrics::compute_regression(&array![1.0], &array![1.0, 2.0]).unwrap_err();
        assert!(matches!(err, StackError::ShapeError { .. }));
    }
}
