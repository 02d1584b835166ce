//! Meta-learner over the stack
//!
//! An elastic net of the target on every candidate column, tuned over a
//! decreasing penalty path with seeded repeated k-fold CV. The penalty is
//! chosen by the one-standard-error rule: the largest penalty whose mean CV
//! error is within one standard error of the best. Non-zero weights mark the
//! members that survive into the ensemble.

use super::assembler::StackMatrix;
use super::candidate::{CandidateId, CandidateSpec};
use crate::error::{Result, StackError};
use crate::training::{
    fit_path, max_penalty, penalty_path, CVResults, CVStrategy, CrossValidator, LossMetric, PathSettings,
};
use ndarray::{Array1, Array2, Axis};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Columns with a standard deviation at or below this carry no signal
const MIN_COLUMN_SD: f64 = 1e-12;

/// Meta-learner settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlendSettings {
    /// Elastic-net mixing α in `[0, 1]`
    pub mixture: f64,
    /// Folds per CV repeat
    pub folds: usize,
    /// CV repeats
    pub repeats: usize,
    pub seed: u64,
    /// Length of the generated penalty path
    pub n_lambda: usize,
    /// Smallest generated penalty as a fraction of λ_max
    pub lambda_min_ratio: f64,
    /// Explicit penalties; replaces the generated path
    pub penalties: Option<Vec<f64>>,
    /// Constrain member weights to be non-negative
    pub non_negative: bool,
    pub max_iter: usize,
    pub tol: f64,
}

impl BlendSettings {
    pub fn new(mixture: f64) -> Self {
        Self {
            mixture,
            folds: 5,
            repeats: 3,
            seed: 42,
            n_lambda: 50,
            lambda_min_ratio: 1e-4,
            penalties: None,
            non_negative: true,
            max_iter: 100_000,
            tol: 1e-7,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.mixture) {
            return Err(StackError::InvalidConfiguration(format!(
                "blend mixture must be in [0, 1], got {}",
                self.mixture
            )));
        }
        if self.folds < 2 {
            return Err(StackError::InvalidConfiguration(format!(
                "blend folds must be at least 2, got {}",
                self.folds
            )));
        }
        if self.repeats == 0 {
            return Err(StackError::InvalidConfiguration("blend repeats must be at least 1".to_string()));
        }
        match &self.penalties {
            Some(penalties) => {
                if penalties.is_empty() {
                    return Err(StackError::InvalidConfiguration(
                        "explicit blend penalties must not be empty".to_string(),
                    ));
                }
                if let Some(bad) = penalties.iter().find(|p| !p.is_finite() || **p < 0.0) {
                    return Err(StackError::InvalidConfiguration(format!(
                        "blend penalties must be non-negative and finite, got {}",
                        bad
                    )));
                }
            }
            None => {
                if self.n_lambda == 0 {
                    return Err(StackError::InvalidConfiguration("n_lambda must be at least 1".to_string()));
                }
                if !(self.lambda_min_ratio > 0.0 && self.lambda_min_ratio < 1.0) {
                    return Err(StackError::InvalidConfiguration(format!(
                        "lambda_min_ratio must be in (0, 1), got {}",
                        self.lambda_min_ratio
                    )));
                }
            }
        }
        Ok(())
    }

    fn path_settings(&self) -> PathSettings {
        PathSettings {
            mixture: self.mixture,
            non_negative: self.non_negative,
            max_iter: self.max_iter,
            tol: self.tol,
        }
    }
}

/// One stack column's fate in the blend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlendMember {
    pub spec: CandidateSpec,
    pub weight: f64,
    /// `weight != 0`
    pub retained: bool,
}

/// Cross-validated error along the penalty path
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlendPath {
    /// Penalties, decreasing
    pub penalties: Vec<f64>,
    pub mean_error: Vec<f64>,
    pub std_error: Vec<f64>,
    pub n_resamples: usize,
    pub metric: LossMetric,
    /// Index of the minimum mean error
    pub min_index: usize,
    /// Index chosen by the one-standard-error rule
    pub selected_index: usize,
}

impl BlendPath {
    pub fn lambda_min(&self) -> f64 {
        self.penalties[self.min_index]
    }

    pub fn lambda_1se(&self) -> f64 {
        self.penalties[self.selected_index]
    }
}

/// `(min_index, selected_index)` for errors listed from the largest penalty down.
///
/// `min_index` is the first minimum of `mean_error`; `selected_index` is the
/// first (largest-penalty) index whose mean error is within one standard error
/// of that minimum. Returns `None` for an empty path.
pub fn one_standard_error(mean_error: &[f64], std_error: &[f64]) -> Option<(usize, usize)> {
    let min_index = mean_error
        .iter()
        .enumerate()
        .fold(None, |best: Option<(usize, f64)>, (i, &e)| match best {
            Some((_, b)) if b <= e => best,
            _ => Some((i, e)),
        })?
        .0;
    let threshold = mean_error[min_index] + std_error.get(min_index).copied().unwrap_or(0.0);
    let selected_index = (0..=min_index)
        .find(|&i| mean_error[i] <= threshold)
        .unwrap_or(min_index);
    Some((min_index, selected_index))
}

/// Fitted meta-learner; immutable once built.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlendModel {
    intercept: f64,
    penalty: f64,
    mixture: f64,
    members: Vec<BlendMember>,
    path: Option<BlendPath>,
}

impl BlendModel {
    /// Blend with explicit weights, one per spec in column order.
    pub fn from_weights(intercept: f64, specs: Vec<CandidateSpec>, weights: Vec<f64>) -> Result<Self> {
        if specs.len() != weights.len() {
            return Err(StackError::ShapeError {
                expected: format!("{} weights", specs.len()),
                actual: format!("{} weights", weights.len()),
            });
        }
        if !intercept.is_finite() || weights.iter().any(|w| !w.is_finite()) {
            return Err(StackError::InvalidConfiguration("blend weights must be finite".to_string()));
        }
        let members = specs
            .into_iter()
            .zip(weights)
            .map(|(spec, weight)| BlendMember {
                spec,
                weight,
                retained: weight != 0.0,
            })
            .collect();
        Ok(Self {
            intercept,
            penalty: 0.0,
            mixture: 0.0,
            members,
            path: None,
        })
    }

    pub fn intercept(&self) -> f64 {
        self.intercept
    }

    /// Chosen penalty λ
    pub fn penalty(&self) -> f64 {
        self.penalty
    }

    /// Mixing α
    pub fn mixture(&self) -> f64 {
        self.mixture
    }

    /// Every stack column, in stack order
    pub fn members(&self) -> &[BlendMember] {
        &self.members
    }

    /// Retained members, in stack order
    pub fn retained(&self) -> impl Iterator<Item = &BlendMember> {
        self.members.iter().filter(|m| m.retained)
    }

    pub fn retained_specs(&self) -> Vec<CandidateSpec> {
        self.retained().map(|m| m.spec.clone()).collect()
    }

    pub fn weight(&self, id: &CandidateId) -> Option<f64> {
        self.members.iter().find(|m| m.spec.id() == id).map(|m| m.weight)
    }

    pub fn path(&self) -> Option<&BlendPath> {
        self.path.as_ref()
    }

    /// `intercept + Σ weight_i · column_i` over retained members.
    ///
    /// `member_predictions` has one column per retained member, in stack order.
    pub fn combine(&self, member_predictions: &Array2<f64>) -> Result<Array1<f64>> {
        let weights: Array1<f64> = self.retained().map(|m| m.weight).collect();
        if member_predictions.ncols() != weights.len() {
            return Err(StackError::ShapeError {
                expected: format!("{} member columns", weights.len()),
                actual: format!("{} member columns", member_predictions.ncols()),
            });
        }
        Ok(member_predictions.dot(&weights) + self.intercept)
    }
}

/// Fit the meta-learner on `stack`, scoring resamples with `metric`.
pub fn blend(stack: &StackMatrix, metric: LossMetric, settings: &BlendSettings) -> Result<BlendModel> {
    settings.validate()?;
    let y = stack.target();
    let n_rows = stack.n_rows();

    if n_rows == 0 || y.var(0.0) <= MIN_COLUMN_SD * MIN_COLUMN_SD {
        return Err(StackError::DegenerateBlendError("target has zero variance".to_string()));
    }

    let usable: Vec<usize> = stack
        .predictions()
        .axis_iter(Axis(1))
        .enumerate()
        .filter(|(_, col)| col.iter().all(|v| v.is_finite()) && col.std(0.0) > MIN_COLUMN_SD)
        .map(|(j, _)| j)
        .collect();
    if usable.len() < 2 {
        return Err(StackError::DegenerateBlendError(format!(
            "{} of {} candidate columns are usable; at least 2 are required",
            usable.len(),
            stack.n_candidates()
        )));
    }
    for (j, spec) in stack.specs().iter().enumerate() {
        if !usable.contains(&j) {
            warn!(candidate = %spec.id(), "constant stack column excluded from blend");
        }
    }

    if n_rows < settings.folds {
        return Err(StackError::InvalidConfiguration(format!(
            "{} stack rows are too few for {} blend folds",
            n_rows, settings.folds
        )));
    }

    let x = stack.predictions().select(Axis(1), &usable);
    let path_settings = settings.path_settings();

    let penalties = match &settings.penalties {
        Some(explicit) => {
            let mut penalties = explicit.clone();
            penalties.sort_by(|a, b| b.total_cmp(a));
            penalties.dedup();
            penalties
        }
        None => penalty_path(
            max_penalty(&x, y, settings.mixture)?,
            settings.n_lambda,
            settings.lambda_min_ratio,
        ),
    };

    let splits = CrossValidator::new(CVStrategy::RepeatedKFold {
        n_splits: settings.folds,
        n_repeats: settings.repeats,
    })
    .with_random_state(settings.seed)
    .split(n_rows)?;

    let resample_errors: Vec<Vec<f64>> = splits
        .par_iter()
        .map(|split| {
            let x_train = x.select(Axis(0), &split.train_indices);
            let y_train = y.select(Axis(0), &split.train_indices);
            let x_test = x.select(Axis(0), &split.test_indices);
            let y_test = y.select(Axis(0), &split.test_indices);

            let models = fit_path(&x_train, &y_train, &penalties, path_settings).map_err(|e| {
                StackError::DegenerateBlendError(format!(
                    "meta-learner failed on resample {}: {}",
                    split.fold_idx, e
                ))
            })?;
            models
                .iter()
                .map(|model| metric.loss(&y_test, &model.predict(&x_test)?))
                .collect::<Result<Vec<f64>>>()
        })
        .collect::<Result<_>>()?;

    let per_penalty: Vec<CVResults> = (0..penalties.len())
        .map(|i| CVResults::from_scores(resample_errors.iter().map(|errors| errors[i]).collect()))
        .collect();
    let mean_error: Vec<f64> = per_penalty.iter().map(|r| r.mean_score).collect();
    let std_error: Vec<f64> = per_penalty.iter().map(|r| r.std_error).collect();

    let (min_index, selected_index) = one_standard_error(&mean_error, &std_error)
        .ok_or_else(|| StackError::DegenerateBlendError("empty penalty path".to_string()))?;

    // Warm-start down the path to the chosen penalty on every row
    let refit = fit_path(&x, y, &penalties[..=selected_index], path_settings)
        .map_err(|e| StackError::DegenerateBlendError(format!("meta-learner refit failed: {}", e)))?;
    let chosen = refit
        .last()
        .ok_or_else(|| StackError::DegenerateBlendError("empty penalty path".to_string()))?;
    let coefficients = chosen.coefficients.as_ref().ok_or(StackError::ModelNotFitted)?;

    let mut weights = vec![0.0; stack.n_candidates()];
    for (k, &j) in usable.iter().enumerate() {
        weights[j] = coefficients[k];
    }

    let path = BlendPath {
        penalties: penalties.clone(),
        mean_error,
        std_error,
        n_resamples: splits.len(),
        metric,
        min_index,
        selected_index,
    };
    debug!(
        lambda_min = path.lambda_min(),
        lambda_1se = path.lambda_1se(),
        resamples = path.n_resamples,
        "blend penalty selected"
    );

    let mut model = BlendModel::from_weights(chosen.intercept.unwrap_or(0.0), stack.specs().to_vec(), weights)?;
    model.penalty = penalties[selected_index];
    model.mixture = settings.mixture;
    model.path = Some(path);

    let n_retained = model.retained().count();
    if n_retained == 0 {
        warn!("blend retained no members; ensemble reduces to its intercept");
    }
    info!(
        retained = n_retained,
        candidates = stack.n_candidates(),
        penalty = model.penalty,
        "blend fitted"
    );

    Ok(model)
}
