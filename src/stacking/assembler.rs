//! Stack assembly: out-of-fold columns joined row-aligned with the target

use super::candidate::{CandidateId, CandidateSpec};
use super::oof::OutOfFoldColumn;
use crate::error::{Result, StackError};
use crate::training::FoldAssignment;
use ndarray::{Array1, Array2, ArrayView1};
use std::collections::HashSet;

/// Target plus one held-out prediction column per candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct StackMatrix {
    target: Array1<f64>,
    predictions: Array2<f64>,
    specs: Vec<CandidateSpec>,
    folds: Vec<usize>,
}

impl StackMatrix {
    pub fn target(&self) -> &Array1<f64> {
        &self.target
    }

    /// `n_rows × n_candidates`, columns in [`StackMatrix::specs`] order
    pub fn predictions(&self) -> &Array2<f64> {
        &self.predictions
    }

    pub fn specs(&self) -> &[CandidateSpec] {
        &self.specs
    }

    /// Fold id of each row
    pub fn row_folds(&self) -> &[usize] {
        &self.folds
    }

    pub fn n_rows(&self) -> usize {
        self.target.len()
    }

    pub fn n_candidates(&self) -> usize {
        self.specs.len()
    }

    pub fn column(&self, id: &CandidateId) -> Option<ArrayView1<'_, f64>> {
        self.specs
            .iter()
            .position(|s| s.id() == id)
            .map(|j| self.predictions.column(j))
    }
}

/// Join the target with each column, in the order given.
///
/// Fails with [`StackError::AlignmentError`] when a column's length or fold
/// assignment differs from `folds`, when a value is non-finite, or when two
/// columns share an id.
pub fn assemble(target: &Array1<f64>, folds: &FoldAssignment, columns: &[OutOfFoldColumn]) -> Result<StackMatrix> {
    let n_rows = target.len();
    if folds.n_rows() != n_rows {
        return Err(StackError::AlignmentError(format!(
            "target has {} rows but the fold assignment covers {}",
            n_rows,
            folds.n_rows()
        )));
    }

    let mut seen = HashSet::with_capacity(columns.len());
    for column in columns {
        let id = column.id();
        if !seen.insert(id) {
            return Err(StackError::AlignmentError(format!("duplicate candidate column {}", id)));
        }
        if column.len() != n_rows {
            return Err(StackError::AlignmentError(format!(
                "column {} has {} rows, expected {}",
                id,
                column.len(),
                n_rows
            )));
        }
        if column.folds() != folds.as_slice() {
            return Err(StackError::AlignmentError(format!(
                "column {} was resampled under a different fold assignment",
                id
            )));
        }
        if let Some(row) = column.predictions().iter().position(|p| !p.is_finite()) {
            return Err(StackError::AlignmentError(format!(
                "column {} has a non-finite value at row {}",
                id, row
            )));
        }
    }

    let mut predictions = Array2::zeros((n_rows, columns.len()));
    for (j, column) in columns.iter().enumerate() {
        predictions.column_mut(j).assign(column.predictions());
    }

    Ok(StackMatrix {
        target: target.clone(),
        predictions,
        specs: columns.iter().map(|c| c.spec().clone()).collect(),
        folds: folds.as_slice().to_vec(),
    })
}
