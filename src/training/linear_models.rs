//! Penalized linear models
//!
//! Elastic net in the glmnet parameterization: minimizes
//! `1/(2n)·||y − b0 − Xb||² + penalty·((1−mixture)/2·||b||² + mixture·||b||₁)`
//! by cyclic coordinate descent on internally standardized predictors.
//! Coefficients are always reported on the original feature scale.

use super::Deadline;
use crate::error::{Result, StackError};
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

/// Smallest mixture used when computing the top of a penalty path, so a pure
/// ridge path still starts from a finite value.
const MIN_PATH_MIXTURE: f64 = 1e-3;

/// Soft-threshold operator for the L1 proximal step
fn soft_threshold(val: f64, threshold: f64) -> f64 {
    if val > threshold {
        val - threshold
    } else if val < -threshold {
        val + threshold
    } else {
        0.0
    }
}

/// Column centering and scaling shared by a single fit or a whole path.
struct Standardized {
    x: Array2<f64>,
    y: Array1<f64>,
    x_mean: Array1<f64>,
    x_scale: Array1<f64>,
    y_mean: f64,
    /// x_j^T x_j of the standardized columns (n for non-constant, 0 for constant)
    col_norms: Vec<f64>,
    /// Convergence scale: variance of the centered target
    y_var: f64,
}

impl Standardized {
    fn new(x: &Array2<f64>, y: &Array1<f64>) -> Result<Self> {
        let n_samples = x.nrows();
        if n_samples != y.len() {
            return Err(StackError::ShapeError {
                expected: format!("y length = {}", n_samples),
                actual: format!("y length = {}", y.len()),
            });
        }
        if n_samples == 0 {
            return Err(StackError::DataError("cannot fit on zero rows".to_string()));
        }

        let n = n_samples as f64;
        let x_mean = x
            .mean_axis(Axis(0))
            .ok_or_else(|| StackError::DataError("cannot fit on zero rows".to_string()))?;
        let x_c = x - &x_mean.view().insert_axis(Axis(0));
        let x_scale: Array1<f64> = x_c
            .axis_iter(Axis(1))
            .map(|col| {
                let sd = (col.mapv(|v| v * v).sum() / n).sqrt();
                if sd > 1e-12 {
                    sd
                } else {
                    1.0
                }
            })
            .collect();
        let x_s = x_c / &x_scale.view().insert_axis(Axis(0));

        let y_mean = y.mean().unwrap_or(0.0);
        let y_c = y - y_mean;
        let y_var = y_c.mapv(|v| v * v).sum() / n;

        let col_norms: Vec<f64> = x_s
            .axis_iter(Axis(1))
            .map(|col| {
                let norm = col.mapv(|v| v * v).sum();
                if norm < 1e-12 {
                    0.0
                } else {
                    norm
                }
            })
            .collect();

        Ok(Self {
            x: x_s,
            y: y_c,
            x_mean,
            x_scale,
            y_mean,
            col_norms,
            y_var,
        })
    }

    fn n_samples(&self) -> usize {
        self.x.nrows()
    }

    /// Largest useful penalty: every coefficient is zero at or above it.
    fn max_penalty(&self, mixture: f64) -> f64 {
        let n = self.n_samples() as f64;
        let max_corr = self
            .x
            .axis_iter(Axis(1))
            .map(|col| col.dot(&self.y).abs())
            .fold(0.0f64, f64::max);
        max_corr / (n * mixture.max(MIN_PATH_MIXTURE))
    }

    /// Run coordinate descent in place on standardized coefficients `w`.
    /// Returns the number of sweeps used.
    #[allow(clippy::too_many_arguments)]
    fn coordinate_descent(
        &self,
        w: &mut Array1<f64>,
        penalty: f64,
        mixture: f64,
        non_negative: bool,
        max_iter: usize,
        tol: f64,
        deadline: Option<&Deadline>,
    ) -> Result<usize> {
        let n = self.n_samples() as f64;
        let l1_penalty = penalty * mixture * n;
        let l2_penalty = penalty * (1.0 - mixture) * n;
        let threshold = tol * self.y_var.max(1e-12);

        // Residual maintained incrementally across sweeps
        let mut r = &self.y - &self.x.dot(&*w);

        for iter in 0..max_iter {
            if let Some(deadline) = deadline {
                deadline.check()?;
            }

            let mut max_change = 0.0f64;
            for j in 0..w.len() {
                let norm = self.col_norms[j];
                if norm == 0.0 {
                    w[j] = 0.0;
                    continue;
                }
                let col = self.x.column(j);
                // rho = x_j^T r + norm * w_j
                let rho = col.dot(&r) + norm * w[j];
                let old_wj = w[j];
                let mut new_wj = soft_threshold(rho, l1_penalty) / (norm + l2_penalty);
                if non_negative && new_wj < 0.0 {
                    new_wj = 0.0;
                }
                let delta = new_wj - old_wj;
                if delta != 0.0 {
                    w[j] = new_wj;
                    r.scaled_add(-delta, &col);
                    max_change = max_change.max(norm / n * delta * delta);
                }
            }

            if !max_change.is_finite() {
                return Err(StackError::ConvergenceError { iterations: iter + 1 });
            }
            if max_change < threshold {
                return Ok(iter + 1);
            }
        }

        Err(StackError::ConvergenceError { iterations: max_iter })
    }

    /// Map standardized coefficients back to the original scale.
    fn unstandardize(&self, w: &Array1<f64>) -> (Array1<f64>, f64) {
        let coefficients = w / &self.x_scale;
        let intercept = self.y_mean - coefficients.dot(&self.x_mean);
        (coefficients, intercept)
    }
}

/// Elastic Net Regression (L1 + L2 regularization via coordinate descent)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElasticNetRegression {
    pub coefficients: Option<Array1<f64>>,
    pub intercept: Option<f64>,
    /// Overall regularization strength (λ)
    pub penalty: f64,
    /// L1 share of the penalty (0.0 = ridge, 1.0 = lasso)
    pub mixture: f64,
    /// Constrain coefficients to be non-negative
    pub non_negative: bool,
    pub max_iter: usize,
    pub tol: f64,
    /// Coordinate-descent sweeps used by the last fit
    pub n_iter: usize,
    pub is_fitted: bool,
}

impl Default for ElasticNetRegression {
    fn default() -> Self {
        Self::new(1.0, 0.5)
    }
}

impl ElasticNetRegression {
    pub fn new(penalty: f64, mixture: f64) -> Self {
        Self {
            coefficients: None,
            intercept: None,
            penalty,
            mixture: mixture.clamp(0.0, 1.0),
            non_negative: false,
            max_iter: 10_000,
            tol: 1e-7,
            n_iter: 0,
            is_fitted: false,
        }
    }

    /// Build an already-fitted model from explicit parameters.
    pub fn from_parts(coefficients: Array1<f64>, intercept: f64) -> Self {
        Self {
            coefficients: Some(coefficients),
            intercept: Some(intercept),
            is_fitted: true,
            ..Self::new(0.0, 0.0)
        }
    }

    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    pub fn with_tol(mut self, tol: f64) -> Self {
        self.tol = tol;
        self
    }

    pub fn with_non_negative(mut self, non_negative: bool) -> Self {
        self.non_negative = non_negative;
        self
    }

    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<&mut Self> {
        self.fit_with_deadline(x, y, None)
    }

    /// Fit, aborting with [`StackError::Timeout`] once `deadline` passes.
    pub fn fit_with_deadline(
        &mut self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        deadline: Option<&Deadline>,
    ) -> Result<&mut Self> {
        if !self.penalty.is_finite() || self.penalty < 0.0 {
            return Err(StackError::InvalidConfiguration(format!(
                "penalty must be a non-negative finite number, got {}",
                self.penalty
            )));
        }

        let data = Standardized::new(x, y)?;
        let mut w = Array1::zeros(x.ncols());
        self.n_iter = data.coordinate_descent(
            &mut w,
            self.penalty,
            self.mixture,
            self.non_negative,
            self.max_iter,
            self.tol,
            deadline,
        )?;

        let (coefficients, intercept) = data.unstandardize(&w);
        self.coefficients = Some(coefficients);
        self.intercept = Some(intercept);
        self.is_fitted = true;
        Ok(self)
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let coefficients = match (&self.coefficients, self.is_fitted) {
            (Some(c), true) => c,
            _ => return Err(StackError::ModelNotFitted),
        };
        if x.ncols() != coefficients.len() {
            return Err(StackError::ShapeError {
                expected: format!("{} features", coefficients.len()),
                actual: format!("{} features", x.ncols()),
            });
        }
        Ok(x.dot(coefficients) + self.intercept.unwrap_or(0.0))
    }

    pub fn score(&self, x: &Array2<f64>, y: &Array1<f64>) -> Result<f64> {
        let p = self.predict(x)?;
        let ym = y.mean().unwrap_or(0.0);
        let ss_res = (&p - y).mapv(|v| v * v).sum();
        let ss_tot = y.mapv(|v| (v - ym).powi(2)).sum();
        Ok(if ss_tot == 0.0 { 1.0 } else { 1.0 - ss_res / ss_tot })
    }
}

/// Settings shared by every fit along a penalty path.
#[derive(Debug, Clone, Copy)]
pub struct PathSettings {
    pub mixture: f64,
    pub non_negative: bool,
    pub max_iter: usize,
    pub tol: f64,
}

/// Largest penalty worth trying for `(x, y)`: all coefficients vanish above it.
pub fn max_penalty(x: &Array2<f64>, y: &Array1<f64>, mixture: f64) -> Result<f64> {
    Ok(Standardized::new(x, y)?.max_penalty(mixture))
}

/// `n` log-spaced penalties from `max` down to `max * min_ratio`, decreasing.
pub fn penalty_path(max: f64, n: usize, min_ratio: f64) -> Vec<f64> {
    if n == 0 {
        return Vec::new();
    }
    if n == 1 || max <= 0.0 {
        return vec![max.max(0.0)];
    }
    let log_max = max.ln();
    let log_min = (max * min_ratio).ln();
    (0..n)
        .map(|i| (log_max + (log_min - log_max) * i as f64 / (n - 1) as f64).exp())
        .collect()
}

/// Fit one model per penalty, warm-starting each fit from the previous one.
///
/// `penalties` are visited in the given order; callers pass them decreasing so
/// each warm start is close to the next solution.
pub fn fit_path(
    x: &Array2<f64>,
    y: &Array1<f64>,
    penalties: &[f64],
    settings: PathSettings,
) -> Result<Vec<ElasticNetRegression>> {
    let data = Standardized::new(x, y)?;
    let mut w = Array1::zeros(x.ncols());
    let mut models = Vec::with_capacity(penalties.len());

    for &penalty in penalties {
        let n_iter = data.coordinate_descent(
            &mut w,
            penalty,
            settings.mixture,
            settings.non_negative,
            settings.max_iter,
            settings.tol,
            None,
        )?;
        let (coefficients, intercept) = data.unstandardize(&w);
        models.push(ElasticNetRegression {
            coefficients: Some(coefficients),
            intercept: Some(intercept),
            penalty,
            mixture: settings.mixture,
            non_negative: settings.non_negative,
            max_iter: settings.max_iter,
            tol: settings.tol,
            n_iter,
            is_fitted: true,
        });
    }

    Ok(models)
}
