//! Penalized linear candidate family
//!
//! Each grid point is an elastic net with a fixed `(penalty, mixture)`. Every
//! point yields one out-of-fold column; points that fail on any fold are
//! dropped and reported instead of aborting the run.

use super::candidate::{CandidateSpec, FitOptions};
use super::oof::{out_of_fold, OutOfFoldColumn};
use crate::error::{Result, StackError};
use crate::training::FoldAssignment;
use ndarray::{Array1, Array2};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Penalties of the default regular grid
pub const DEFAULT_PENALTIES: [f64; 4] = [0.001, 0.01, 0.1, 1.0];
/// Mixtures of the default regular grid
pub const DEFAULT_MIXTURES: [f64; 3] = [0.0, 0.5, 1.0];

/// One elastic-net hyperparameter setting
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LinearGridPoint {
    pub penalty: f64,
    pub mixture: f64,
}

impl LinearGridPoint {
    pub fn new(penalty: f64, mixture: f64) -> Self {
        Self { penalty, mixture }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.penalty.is_finite() || self.penalty < 0.0 {
            return Err(StackError::InvalidConfiguration(format!(
                "linear penalty must be a non-negative finite number, got {}",
                self.penalty
            )));
        }
        if !(0.0..=1.0).contains(&self.mixture) {
            return Err(StackError::InvalidConfiguration(format!(
                "linear mixture must be in [0, 1], got {}",
                self.mixture
            )));
        }
        Ok(())
    }
}

/// Cartesian grid, penalties varying fastest within each mixture.
pub fn regular_grid(penalties: &[f64], mixtures: &[f64]) -> Vec<LinearGridPoint> {
    mixtures
        .iter()
        .flat_map(|&mixture| penalties.iter().map(move |&penalty| LinearGridPoint::new(penalty, mixture)))
        .collect()
}

/// The 4 × 3 grid used when no explicit grid is configured
pub fn default_grid() -> Vec<LinearGridPoint> {
    regular_grid(&DEFAULT_PENALTIES, &DEFAULT_MIXTURES)
}

/// Candidate specs for a grid, ids numbered from 1 in grid order
pub fn grid_specs(grid: &[LinearGridPoint]) -> Vec<CandidateSpec> {
    grid.iter()
        .enumerate()
        .map(|(i, point)| CandidateSpec::linear(i + 1, point.penalty, point.mixture))
        .collect()
}

/// Surviving columns plus the grid points that were dropped
#[derive(Debug)]
pub struct TuneResult {
    /// Successful columns, in grid order
    pub columns: Vec<OutOfFoldColumn>,
    /// One [`StackError::CandidateFitFailure`] per dropped grid point
    pub failures: Vec<StackError>,
}

impl TuneResult {
    pub fn specs(&self) -> Vec<&CandidateSpec> {
        self.columns.iter().map(|c| c.spec()).collect()
    }
}

/// Produce one out-of-fold column per grid point.
pub fn tune(
    x: &Array2<f64>,
    y: &Array1<f64>,
    folds: &FoldAssignment,
    grid: &[LinearGridPoint],
    options: &FitOptions,
) -> Result<TuneResult> {
    if grid.is_empty() {
        return Err(StackError::InvalidConfiguration(
            "linear grid must contain at least one point".to_string(),
        ));
    }
    for point in grid {
        point.validate()?;
    }

    let specs = grid_specs(grid);
    let results: Vec<Result<OutOfFoldColumn>> = specs
        .par_iter()
        .map(|spec| out_of_fold(spec, x, y, folds, options))
        .collect();

    let mut columns = Vec::with_capacity(specs.len());
    let mut failures = Vec::new();
    for (spec, result) in specs.iter().zip(results) {
        match result {
            Ok(column) => {
                debug!(candidate = %spec, "linear candidate resampled");
                columns.push(column);
            }
            Err(e) if e.is_recoverable() => {
                warn!(candidate = %spec.id(), error = %e, "dropping linear candidate");
                failures.push(e);
            }
            Err(e) => return Err(e),
        }
    }

    Ok(TuneResult { columns, failures })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::assign_folds;

    fn data() -> (Array2<f64>, Array1<f64>) {
        let x = Array2::from_shape_fn((60, 3), |(i, j)| ((i * (j + 3)) % 13) as f64);
        let y: Array1<f64> = x
            .rows()
            .into_iter()
            .map(|r| 2.0 * r[0] - r[1] + 0.1 * r[2])
            .collect();
        (x, y)
    }

    #[test]
    fn test_default_grid_layout() {
        let grid = default_grid();
        assert_eq!(grid.len(), 12);
        assert_eq!(grid[0], LinearGridPoint::new(0.001, 0.0));
        assert_eq!(grid[4], LinearGridPoint::new(0.001, 0.5));
        let specs = grid_specs(&grid);
        assert_eq!(specs[11].id().as_str(), "linear_reg_12");
    }

    #[test]
    fn test_tune_yields_one_column_per_point() {
        let (x, y) = data();
        let folds = assign_folds(60, 5, 1).unwrap();
        let grid = regular_grid(&[0.01, 0.1], &[0.0, 1.0]);
        let result = tune(&x, &y, &folds, &grid, &FitOptions::default()).unwrap();
        assert_eq!(result.columns.len(), 4);
        assert!(result.failures.is_empty());
        for column in &result.columns {
            assert_eq!(column.len(), 60);
            assert!(column.predictions().iter().all(|p| p.is_finite()));
        }
    }

    #[test]
    fn test_non_converging_point_is_dropped() {
        let (x, y) = data();
        let folds = assign_folds(60, 5, 1).unwrap();
        let grid = vec![LinearGridPoint::new(1e-6, 0.5)];
        let options = FitOptions {
            max_iter: 1,
            tol: 1e-30,
            budget: None,
        };
        let result = tune(&x, &y, &folds, &grid, &options).unwrap();
        assert!(result.columns.is_empty());
        assert_eq!(result.failures.len(), 1);
        assert!(matches!(
            result.failures[0],
            StackError::CandidateFitFailure { fold: Some(_), .. }
        ));
    }

    #[test]
    fn test_failing_point_leaves_siblings_intact() {
        let (x, y) = data();
        let folds = assign_folds(60, 5, 1).unwrap();
        // A penalty this large zeroes every coefficient on the first sweep
        let grid = vec![
            LinearGridPoint::new(1e6, 1.0),
            LinearGridPoint::new(1e-6, 0.5),
            LinearGridPoint::new(1e6, 0.5),
        ];
        let options = FitOptions {
            max_iter: 1,
            tol: 1e-30,
            budget: None,
        };
        let result = tune(&x, &y, &folds, &grid, &options).unwrap();

        let ids: Vec<&str> = result.columns.iter().map(|c| c.id().as_str()).collect();
        assert_eq!(ids, vec!["linear_reg_01", "linear_reg_03"]);
        assert_eq!(result.failures.len(), 1);
        assert!(matches!(
            &result.failures[0],
            StackError::CandidateFitFailure { candidate, .. } if candidate == "linear_reg_02"
        ));
    }

    #[test]
    fn test_invalid_grid_rejected() {
        let (x, y) = data();
        let folds = assign_folds(60, 5, 1).unwrap();
        let err = tune(&x, &y, &folds, &[LinearGridPoint::new(0.1, 1.5)], &FitOptions::default()).unwrap_err();
        assert!(matches!(err, StackError::InvalidConfiguration(_)));
        assert!(tune(&x, &y, &folds, &[], &FitOptions::default()).is_err());
    }
}
