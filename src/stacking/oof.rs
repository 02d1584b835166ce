//! Out-of-fold prediction driver shared by both candidate families

use super::candidate::{CandidateId, CandidateSpec, FitOptions};
use crate::error::{Result, StackError};
use crate::training::FoldAssignment;
use ndarray::{Array1, Array2, Axis};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Held-out predictions of one candidate, one value per training row.
///
/// Every value was produced by a model fit on the other folds. The column
/// carries the fold ids it was computed under so the assembler can prove
/// alignment with the shared [`FoldAssignment`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutOfFoldColumn {
    spec: CandidateSpec,
    predictions: Array1<f64>,
    folds: Vec<usize>,
}

impl OutOfFoldColumn {
    pub fn new(spec: CandidateSpec, predictions: Array1<f64>, folds: Vec<usize>) -> Self {
        Self {
            spec,
            predictions,
            folds,
        }
    }

    pub fn spec(&self) -> &CandidateSpec {
        &self.spec
    }

    pub fn id(&self) -> &CandidateId {
        self.spec.id()
    }

    pub fn predictions(&self) -> &Array1<f64> {
        &self.predictions
    }

    /// Fold ids the predictions were computed under
    pub fn folds(&self) -> &[usize] {
        &self.folds
    }

    pub fn len(&self) -> usize {
        self.predictions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.predictions.is_empty()
    }
}

/// Fill one prediction per row by fitting on `k-1` folds and predicting the held-out one.
///
/// `fit_predict(fold, x_train, y_train, x_test)` must return one prediction per
/// test row. Folds run in parallel; a failure on any fold fails the whole column
/// and is reported against the lowest failing fold.
pub fn cross_predict<F>(
    candidate: &CandidateId,
    x: &Array2<f64>,
    y: &Array1<f64>,
    folds: &FoldAssignment,
    fit_predict: F,
) -> Result<Array1<f64>>
where
    F: Fn(usize, &Array2<f64>, &Array1<f64>, &Array2<f64>) -> Result<Array1<f64>> + Sync,
{
    if x.nrows() != y.len() || y.len() != folds.n_rows() {
        return Err(StackError::AlignmentError(format!(
            "{} feature rows, {} targets and {} fold entries do not match",
            x.nrows(),
            y.len(),
            folds.n_rows()
        )));
    }

    let fold_results: Vec<Result<(Vec<usize>, Array1<f64>)>> = folds
        .splits()
        .into_par_iter()
        .map(|split| {
            let fold = split.fold_idx;
            let x_train = x.select(Axis(0), &split.train_indices);
            let y_train = y.select(Axis(0), &split.train_indices);
            let x_test = x.select(Axis(0), &split.test_indices);

            let predictions = fit_predict(fold, &x_train, &y_train, &x_test)
                .map_err(|e| StackError::candidate_failure(candidate.as_str(), Some(fold), e))?;

            if predictions.len() != split.test_indices.len() {
                return Err(StackError::candidate_failure(
                    candidate.as_str(),
                    Some(fold),
                    StackError::ShapeError {
                        expected: format!("{} predictions", split.test_indices.len()),
                        actual: format!("{} predictions", predictions.len()),
                    },
                ));
            }
            if predictions.iter().any(|p| !p.is_finite()) {
                return Err(StackError::candidate_failure(
                    candidate.as_str(),
                    Some(fold),
                    StackError::DataError("non-finite held-out prediction".to_string()),
                ));
            }
            Ok((split.test_indices, predictions))
        })
        .collect();

    let mut column = Array1::zeros(y.len());
    for result in fold_results {
        let (test_indices, predictions) = result?;
        for (local, &row) in test_indices.iter().enumerate() {
            column[row] = predictions[local];
        }
    }
    Ok(column)
}

/// Out-of-fold column for a concrete candidate specification.
pub fn out_of_fold(
    spec: &CandidateSpec,
    x: &Array2<f64>,
    y: &Array1<f64>,
    folds: &FoldAssignment,
    options: &FitOptions,
) -> Result<OutOfFoldColumn> {
    let predictions = cross_predict(spec.id(), x, y, folds, |_, x_train, y_train, x_test| {
        spec.fit(x_train, y_train, options)?.predict(x_test)
    })?;
    Ok(OutOfFoldColumn::new(spec.clone(), predictions, folds.as_slice().to_vec()))
}
