//! Model training module
//!
//! Provides the model substrate the stacking layer builds on:
//! - Fold assignment and cross-validation splitters
//! - Elastic net regression (coordinate descent, penalty paths)
//! - Regression trees and gradient boosting
//! - Regression metrics

pub mod cross_validation;
pub mod decision_tree;
pub mod gradient_boosting;
pub mod linear_models;
pub mod metrics;

pub use cross_validation::{assign_folds, CVResults, CVSplit, CVStrategy, CrossValidator, FoldAssignment};
pub use decision_tree::{DecisionTree, TreeNode};
pub use gradient_boosting::{GradientBoostingConfig, GradientBoostingRegressor};
pub use linear_models::{fit_path, max_penalty, penalty_path, ElasticNetRegression, PathSettings};
pub use metrics::{LossMetric, ModelMetrics};

use crate::error::{Result, StackError};
use std::time::{Duration, Instant};

/// Wall-clock budget for a single fit, checked between iterations.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    at: Instant,
    limit: Duration,
}

impl Deadline {
    /// Deadline `limit` from now
    pub fn after(limit: Duration) -> Self {
        Self {
            at: Instant::now() + limit,
            limit,
        }
    }

    /// `Some(deadline)` when a budget is configured
    pub fn from_budget(limit: Option<Duration>) -> Option<Self> {
        limit.map(Self::after)
    }

    /// Err once the budget is spent
    pub fn check(&self) -> Result<()> {
        if Instant::now() >= self.at {
            Err(StackError::Timeout {
                limit_ms: self.limit.as_millis(),
            })
        } else {
            Ok(())
        }
    }
}
