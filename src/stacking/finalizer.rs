//! Refit of retained candidates on the full training set

use super::candidate::{CandidateId, CandidateSpec, FitOptions, FittedCandidate};
use crate::error::{Result, StackError};
use ndarray::{Array1, Array2};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

/// A candidate spec with its model fit on every training row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalizedModel {
    spec: CandidateSpec,
    model: FittedCandidate,
}

impl FinalizedModel {
    pub fn new(spec: CandidateSpec, model: FittedCandidate) -> Self {
        Self { spec, model }
    }

    pub fn spec(&self) -> &CandidateSpec {
        &self.spec
    }

    pub fn model(&self) -> &FittedCandidate {
        &self.model
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        self.model.predict(x)
    }
}

/// Finalized models keyed by candidate id
pub type FinalizedModels = BTreeMap<CandidateId, FinalizedModel>;

/// Refit each spec with its exact hyperparameters on `(x, y)`.
///
/// Fits run in parallel. If any fails, the error names the first failing spec
/// in the order given and no models are returned.
pub fn finalize(
    specs: &[CandidateSpec],
    x: &Array2<f64>,
    y: &Array1<f64>,
    options: &FitOptions,
) -> Result<FinalizedModels> {
    let fitted: Vec<Result<FittedCandidate>> = specs
        .par_iter()
        .map(|spec| spec.fit(x, y, options))
        .collect();

    let mut finalized = FinalizedModels::new();
    for (spec, result) in specs.iter().zip(fitted) {
        let model = result.map_err(|e| StackError::FinalizationError {
            candidate: spec.id().to_string(),
            reason: e.to_string(),
        })?;
        if finalized
            .insert(spec.id().clone(), FinalizedModel::new(spec.clone(), model))
            .is_some()
        {
            return Err(StackError::FinalizationError {
                candidate: spec.id().to_string(),
                reason: "candidate listed twice".to_string(),
            });
        }
    }

    info!(models = finalized.len(), rows = x.nrows(), "finalized retained candidates");
    Ok(finalized)
}
