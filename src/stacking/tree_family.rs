//! Boosted-tree candidate family: a single fixed configuration, resampled once

use super::candidate::{CandidateSpec, FitOptions};
use super::oof::{out_of_fold, OutOfFoldColumn};
use crate::error::Result;
use crate::training::{FoldAssignment, GradientBoostingConfig};
use ndarray::{Array1, Array2};
use tracing::debug;

/// Out-of-fold column for the boosted-tree configuration `config`.
///
/// An invalid configuration is rejected before any fold is fit.
pub fn evaluate(
    x: &Array2<f64>,
    y: &Array1<f64>,
    folds: &FoldAssignment,
    config: &GradientBoostingConfig,
    options: &FitOptions,
) -> Result<OutOfFoldColumn> {
    config.validate()?;
    let spec = CandidateSpec::boosted_tree(1, config.clone());
    let column = out_of_fold(&spec, x, y, folds, options)?;
    debug!(candidate = %spec, "boosted tree resampled");
    Ok(column)
}
