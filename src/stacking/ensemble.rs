//! Fitted stacked ensemble

use super::blender::BlendModel;
use super::candidate::CandidateId;
use super::finalizer::{FinalizedModel, FinalizedModels};
use crate::data::columns_to_array;
use crate::error::{Result, StackError};
use ndarray::{Array1, Array2, ArrayView1};
use polars::prelude::DataFrame;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Member and combined predictions for a batch of rows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionTable {
    /// Retained member ids, in stack order
    pub member_ids: Vec<CandidateId>,
    /// `n_rows × n_members`, columns in `member_ids` order
    pub members: Array2<f64>,
    /// Blended prediction per row
    pub ensemble: Array1<f64>,
}

impl PredictionTable {
    pub fn n_rows(&self) -> usize {
        self.ensemble.len()
    }

    pub fn member(&self, id: &CandidateId) -> Option<ArrayView1<'_, f64>> {
        self.member_ids
            .iter()
            .position(|m| m == id)
            .map(|j| self.members.column(j))
    }
}

/// Retained finalized models combined by the blend weights.
///
/// Owns its models and blend exclusively; nothing mutates them after
/// construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ensemble {
    feature_names: Vec<String>,
    blend: BlendModel,
    members: Vec<FinalizedModel>,
}

impl Ensemble {
    /// Pair every retained blend member with its finalized model.
    ///
    /// Fails with [`StackError::FinalizationError`] when a retained member has
    /// no finalized model or was finalized with different hyperparameters.
    pub fn new(blend: BlendModel, mut finalized: FinalizedModels, feature_names: Vec<String>) -> Result<Self> {
        let mut members = Vec::new();
        for member in blend.retained() {
            let id = member.spec.id();
            let model = finalized.remove(id).ok_or_else(|| StackError::FinalizationError {
                candidate: id.to_string(),
                reason: "retained member has no finalized model".to_string(),
            })?;
            if model.spec() != &member.spec {
                return Err(StackError::FinalizationError {
                    candidate: id.to_string(),
                    reason: "finalized hyperparameters differ from the blended candidate".to_string(),
                });
            }
            members.push(model);
        }
        if !finalized.is_empty() {
            debug!(unused = finalized.len(), "ignoring finalized models outside the blend");
        }

        Ok(Self {
            feature_names,
            blend,
            members,
        })
    }

    pub fn blend(&self) -> &BlendModel {
        &self.blend
    }

    pub fn members(&self) -> &[FinalizedModel] {
        &self.members
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    /// Predict every retained member and their blend for `x`.
    pub fn predict(&self, x: &Array2<f64>) -> Result<PredictionTable> {
        if x.ncols() != self.feature_names.len() {
            return Err(StackError::ShapeError {
                expected: format!("{} features", self.feature_names.len()),
                actual: format!("{} features", x.ncols()),
            });
        }

        let columns: Vec<Array1<f64>> = self
            .members
            .par_iter()
            .map(|member| member.predict(x))
            .collect::<Result<_>>()?;

        let mut members = Array2::zeros((x.nrows(), columns.len()));
        for (j, column) in columns.iter().enumerate() {
            members.column_mut(j).assign(column);
        }
        let ensemble = self.blend.combine(&members)?;

        Ok(PredictionTable {
            member_ids: self.members.iter().map(|m| m.spec().id().clone()).collect(),
            members,
            ensemble,
        })
    }

    /// Predict from a frame holding (at least) the training feature columns.
    pub fn predict_frame(&self, df: &DataFrame) -> Result<PredictionTable> {
        let x = columns_to_array(df, &self.feature_names)?;
        self.predict(&x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stacking::candidate::{CandidateSpec, FittedCandidate};
    use crate::training::ElasticNetRegression;
    use ndarray::array;
    use polars::prelude::*;

    /// Members that ignore their input and predict a constant
    fn constant_member(index: usize, value: f64) -> FinalizedModel {
        FinalizedModel::new(
            CandidateSpec::linear(index, 0.1, 0.5),
            FittedCandidate::Linear(ElasticNetRegression::from_parts(array![0.0], value)),
        )
    }

    fn ensemble() -> Ensemble {
        let a = constant_member(1, 10.0);
        let b = constant_member(2, 20.0);
        let blend = BlendModel::from_weights(2.0, vec![a.spec().clone(), b.spec().clone()], vec![0.7, 0.3]).unwrap();
        let finalized: FinalizedModels = [a, b].into_iter().map(|m| (m.spec().id().clone(), m)).collect();
        Ensemble::new(blend, finalized, vec!["x".to_string()]).unwrap()
    }

    #[test]
    fn test_weighted_combination() {
        let table = ensemble().predict(&array![[0.0], [5.0]]).unwrap();
        assert_eq!(table.member_ids.len(), 2);
        assert_eq!(table.members.row(0).to_vec(), vec![10.0, 20.0]);
        assert!((table.ensemble[0] - 15.0).abs() < 1e-12);
        assert!((table.ensemble[1] - 15.0).abs() < 1e-12);
    }

    #[test]
    fn test_predict_is_pure() {
        let ens = ensemble();
        let x = array![[1.0], [2.0], [3.0]];
        assert_eq!(ens.predict(&x).unwrap(), ens.predict(&x).unwrap());
    }

    #[test]
    fn test_missing_finalized_model_refused() {
        let a = constant_member(1, 10.0);
        let b = constant_member(2, 20.0);
        let blend = BlendModel::from_weights(0.0, vec![a.spec().clone(), b.spec().clone()], vec![0.5, 0.5]).unwrap();
        let finalized: FinalizedModels = [(a.spec().id().clone(), a)].into_iter().collect();
        let err = Ensemble::new(blend, finalized, vec!["x".to_string()]).unwrap_err();
        match err {
            StackError::FinalizationError { candidate, .. } => assert_eq!(candidate, "linear_reg_02"),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_pruned_member_not_required() {
        let a = constant_member(1, 10.0);
        let b = constant_member(2, 20.0);
        let blend = BlendModel::from_weights(1.0, vec![a.spec().clone(), b.spec().clone()], vec![0.0, 0.5]).unwrap();
        let finalized: FinalizedModels = [(b.spec().id().clone(), b)].into_iter().collect();
        let ens = Ensemble::new(blend, finalized, vec!["x".to_string()]).unwrap();
        let table = ens.predict(&array![[0.0]]).unwrap();
        assert_eq!(table.member_ids, vec![CandidateId::new("linear_reg_02")]);
        assert!((table.ensemble[0] - 11.0).abs() < 1e-12);
    }

    #[test]
    fn test_wrong_feature_count() {
        let err = ensemble().predict(&array![[1.0, 2.0]]).unwrap_err();
        assert!(matches!(err, StackError::ShapeError { .. }));
    }

    #[test]
    fn test_predict_frame_selects_by_name() {
        let df = DataFrame::new(vec![
            Series::new("other".into(), &[9.0, 9.0]).into(),
            Series::new("x".into(), &[1.0, 2.0]).into(),
        ])
        .unwrap();
        let table = ensemble().predict_frame(&df).unwrap();
        assert_eq!(table.n_rows(), 2);

        let missing = DataFrame::new(vec![Series::new("y".into(), &[1.0]).into()]).unwrap();
        assert!(matches!(
            ensemble().predict_frame(&missing),
            Err(StackError::FeatureNotFound(_))
        ));
    }
}
