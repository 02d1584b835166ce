//! Candidate specifications and their fitted models

use crate::error::{Result, StackError};
use crate::training::{Deadline, ElasticNetRegression, GradientBoostingConfig, GradientBoostingRegressor};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Stable identifier of one stack column, e.g. `linear_reg_03` or `boost_tree_1`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CandidateId(String);

impl CandidateId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CandidateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Model family a candidate belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateFamily {
    LinearReg,
    BoostTree,
}

impl CandidateFamily {
    pub fn name(&self) -> &'static str {
        match self {
            CandidateFamily::LinearReg => "linear_reg",
            CandidateFamily::BoostTree => "boost_tree",
        }
    }
}

impl fmt::Display for CandidateFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Concrete hyperparameters of one candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "snake_case")]
pub enum CandidateParams {
    /// Elastic net with glmnet-style `penalty` (λ) and `mixture` (L1 share)
    Linear { penalty: f64, mixture: f64 },
    /// Gradient-boosted regression trees
    BoostedTree(GradientBoostingConfig),
}

/// A (family, hyperparameter setting) pair identifying one stack contributor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateSpec {
    id: CandidateId,
    params: CandidateParams,
}

impl CandidateSpec {
    /// Linear candidate for 1-based grid position `index`
    pub fn linear(index: usize, penalty: f64, mixture: f64) -> Self {
        Self {
            id: CandidateId::new(format!("{}_{:02}", CandidateFamily::LinearReg.name(), index)),
            params: CandidateParams::Linear { penalty, mixture },
        }
    }

    /// Boosted-tree candidate for 1-based position `index`
    pub fn boosted_tree(index: usize, config: GradientBoostingConfig) -> Self {
        Self {
            id: CandidateId::new(format!("{}_{}", CandidateFamily::BoostTree.name(), index)),
            params: CandidateParams::BoostedTree(config),
        }
    }

    pub fn id(&self) -> &CandidateId {
        &self.id
    }

    pub fn params(&self) -> &CandidateParams {
        &self.params
    }

    pub fn family(&self) -> CandidateFamily {
        match self.params {
            CandidateParams::Linear { .. } => CandidateFamily::LinearReg,
            CandidateParams::BoostedTree(_) => CandidateFamily::BoostTree,
        }
    }

    /// Fit this exact specification on `(x, y)`.
    pub fn fit(&self, x: &Array2<f64>, y: &Array1<f64>, options: &FitOptions) -> Result<FittedCandidate> {
        let deadline = Deadline::from_budget(options.budget);
        match &self.params {
            CandidateParams::Linear { penalty, mixture } => {
                let mut model = ElasticNetRegression::new(*penalty, *mixture)
                    .with_max_iter(options.max_iter)
                    .with_tol(options.tol);
                model.fit_with_deadline(x, y, deadline.as_ref())?;
                Ok(FittedCandidate::Linear(model))
            }
            CandidateParams::BoostedTree(config) => {
                let mut model = GradientBoostingRegressor::new(config.clone());
                model.fit_with_deadline(x, y, deadline.as_ref())?;
                Ok(FittedCandidate::BoostedTree(model))
            }
        }
    }
}

impl fmt::Display for CandidateSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.params {
            CandidateParams::Linear { penalty, mixture } => {
                write!(f, "{} (penalty={}, mixture={})", self.id, penalty, mixture)
            }
            CandidateParams::BoostedTree(config) => write!(
                f,
                "{} (trees={}, learn_rate={}, tree_depth={})",
                self.id, config.n_estimators, config.learning_rate, config.max_depth
            ),
        }
    }
}

/// Solver limits applied to every candidate fit
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitOptions {
    /// Coordinate-descent sweep limit for linear candidates
    pub max_iter: usize,
    /// Coordinate-descent convergence tolerance
    pub tol: f64,
    /// Wall-clock budget per fit
    pub budget: Option<Duration>,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            max_iter: 10_000,
            tol: 1e-7,
            budget: None,
        }
    }
}

/// Typed result of fitting a candidate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum FittedCandidate {
    Linear(ElasticNetRegression),
    BoostedTree(GradientBoostingRegressor),
}

impl FittedCandidate {
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let predictions = match self {
            FittedCandidate::Linear(model) => model.predict(x)?,
            FittedCandidate::BoostedTree(model) => model.predict(x)?,
        };
        if predictions.iter().any(|p| !p.is_finite()) {
            return Err(StackError::DataError("model produced non-finite predictions".to_string()));
        }
        Ok(predictions)
    }
}
