//! Stackblend - Stacked regression ensembles
//!
//! This crate builds a stacked ensemble for a numeric target:
//! - Penalized linear candidates over a hyperparameter grid and a boosted-tree
//!   candidate, each resampled into out-of-fold predictions on shared folds
//! - An elastic-net meta-learner tuned with repeated k-fold CV and the
//!   one-standard-error rule
//! - Refit of the retained candidates and weighted prediction on new data
//!
//! # Modules
//!
//! - [`training`] - Fold assignment, elastic net, regression trees, gradient boosting
//! - [`stacking`] - Candidate families, stack assembly, blending, finalization
//! - [`config`] - JSON run configuration
//! - [`data`] - CSV loading and dataset conversion
//! - [`report`] - Metrics and contribution tables
//! - [`cli`] - Command-line interface

// Core error handling
pub mod error;

// Core ML modules
pub mod training;
pub mod stacking;

// Configuration and data
pub mod config;
pub mod data;
pub mod report;

// Services
pub mod cli;

pub use error::{Result, StackError};

/// Re-export commonly used types
pub mod prelude {
    // Error handling
    pub use crate::error::{Result, StackError};

    // Configuration and data
    pub use crate::config::StackConfig;
    pub use crate::data::{load_csv, Dataset};

    // Training
    pub use crate::training::{
        assign_folds, ElasticNetRegression, FoldAssignment, GradientBoostingConfig, GradientBoostingRegressor,
        LossMetric,
    };

    // Stacking
    pub use crate::stacking::{
        assemble, blend, finalize, BlendModel, BlendSettings, CandidateSpec, Ensemble, FitOptions,
        LinearGridPoint, PredictionTable, StackBuilder, StackedRun,
    };

    // Reporting
    pub use crate::report::{Contribution, MetricsTable};
}
