//! Run configuration
//!
//! A JSON document with four sections. Only `tune.trees` and
//! `ensemble.alpha` are required:
//!
//! ```json
//! {
//!   "cv":       { "folds": 5, "seed": 42 },
//!   "tune":     { "trees": 500, "learn_rate": 0.3, "linear_grid": [{ "penalty": 0.01, "mixture": 0.5 }] },
//!   "ensemble": { "alpha": 1.0, "repeats": 3, "metric": "rmse" },
//!   "fit":      { "timeout_secs": 120 }
//! }
//! ```
//!
//! Unknown keys are rejected so a typo never silently falls back to a default.

use crate::error::{Result, StackError};
use crate::stacking::{default_grid, BlendSettings, FitOptions, LinearGridPoint};
use crate::training::{GradientBoostingConfig, LossMetric};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Outer resampling used for the out-of-fold columns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CvSection {
    #[serde(default = "default_folds")]
    pub folds: usize,
    #[serde(default = "default_seed")]
    pub seed: u64,
}

impl Default for CvSection {
    fn default() -> Self {
        Self {
            folds: default_folds(),
            seed: default_seed(),
        }
    }
}

/// Candidate family hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TuneSection {
    /// Boosting rounds
    pub trees: usize,
    #[serde(default = "default_learn_rate")]
    pub learn_rate: f64,
    #[serde(default = "default_tree_depth")]
    pub tree_depth: usize,
    /// Minimum rows per leaf
    #[serde(default = "default_min_n")]
    pub min_n: usize,
    /// Row subsample ratio per tree
    #[serde(default = "default_ratio")]
    pub sample_size: f64,
    /// L2 shrinkage on leaf values
    #[serde(default = "default_ratio")]
    pub lambda: f64,
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default = "default_grid")]
    pub linear_grid: Vec<LinearGridPoint>,
    #[serde(default = "default_max_iter")]
    pub max_iter: usize,
    #[serde(default = "default_tol")]
    pub tol: f64,
}

/// Meta-learner settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EnsembleSection {
    /// Elastic-net mixing α of the blend
    pub alpha: f64,
    #[serde(default = "default_folds")]
    pub folds: usize,
    #[serde(default = "default_repeats")]
    pub repeats: usize,
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default = "default_n_lambda")]
    pub n_lambda: usize,
    #[serde(default = "default_lambda_min_ratio")]
    pub lambda_min_ratio: f64,
    #[serde(default)]
    pub penalties: Option<Vec<f64>>,
    #[serde(default = "default_true")]
    pub non_negative: bool,
    #[serde(default)]
    pub metric: LossMetric,
}

/// Limits applied to every individual fit
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FitSection {
    #[serde(default)]
    pub timeout_secs: Option<f64>,
}

/// Full run configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StackConfig {
    #[serde(default)]
    pub cv: CvSection,
    pub tune: TuneSection,
    pub ensemble: EnsembleSection,
    #[serde(default)]
    pub fit: FitSection,
}

fn default_folds() -> usize {
    5
}
fn default_seed() -> u64 {
    42
}
fn default_learn_rate() -> f64 {
    0.3
}
fn default_tree_depth() -> usize {
    6
}
fn default_min_n() -> usize {
    1
}
fn default_ratio() -> f64 {
    1.0
}
fn default_max_iter() -> usize {
    10_000
}
fn default_tol() -> f64 {
    1e-7
}
fn default_repeats() -> usize {
    3
}
fn default_n_lambda() -> usize {
    50
}
fn default_lambda_min_ratio() -> f64 {
    1e-4
}
fn default_true() -> bool {
    true
}

impl StackConfig {
    /// Configuration with every optional key at its default
    pub fn new(trees: usize, alpha: f64) -> Self {
        Self {
            cv: CvSection::default(),
            tune: TuneSection {
                trees,
                learn_rate: default_learn_rate(),
                tree_depth: default_tree_depth(),
                min_n: default_min_n(),
                sample_size: default_ratio(),
                lambda: default_ratio(),
                seed: default_seed(),
                linear_grid: default_grid(),
                max_iter: default_max_iter(),
                tol: default_tol(),
            },
            ensemble: EnsembleSection {
                alpha,
                folds: default_folds(),
                repeats: default_repeats(),
                seed: default_seed(),
                n_lambda: default_n_lambda(),
                lambda_min_ratio: default_lambda_min_ratio(),
                penalties: None,
                non_negative: true,
                metric: LossMetric::default(),
            },
            fit: FitSection::default(),
        }
    }

    /// Parse and validate a JSON document
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| StackError::InvalidConfiguration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Range checks for every section; runs before any fit.
    pub fn validate(&self) -> Result<()> {
        if self.cv.folds < 2 {
            return Err(StackError::InvalidConfiguration(format!(
                "cv.folds must be at least 2, got {}",
                self.cv.folds
            )));
        }
        if self.tune.tree_depth == 0 {
            return Err(StackError::InvalidConfiguration("tune.tree_depth must be at least 1".to_string()));
        }
        if self.tune.min_n == 0 {
            return Err(StackError::InvalidConfiguration("tune.min_n must be at least 1".to_string()));
        }
        if self.tune.max_iter == 0 || !(self.tune.tol > 0.0) {
            return Err(StackError::InvalidConfiguration(
                "tune.max_iter and tune.tol must be positive".to_string(),
            ));
        }
        self.boosted_tree_config().validate()?;

        if self.tune.linear_grid.is_empty() {
            return Err(StackError::InvalidConfiguration("tune.linear_grid must not be empty".to_string()));
        }
        for point in &self.tune.linear_grid {
            point.validate()?;
        }

        if !(0.0..=1.0).contains(&self.ensemble.alpha) {
            return Err(StackError::InvalidConfiguration(format!(
                "ensemble.alpha must be in [0, 1], got {}",
                self.ensemble.alpha
            )));
        }
        self.blend_settings().validate()?;

        if let Some(secs) = self.fit.timeout_secs {
            if !(secs.is_finite() && secs > 0.0) {
                return Err(StackError::InvalidConfiguration(format!(
                    "fit.timeout_secs must be positive, got {}",
                    secs
                )));
            }
        }
        Ok(())
    }

    /// Gradient boosting configuration of the tree family
    pub fn boosted_tree_config(&self) -> GradientBoostingConfig {
        GradientBoostingConfig {
            n_estimators: self.tune.trees,
            learning_rate: self.tune.learn_rate,
            max_depth: self.tune.tree_depth,
            min_samples_leaf: self.tune.min_n,
            subsample: self.tune.sample_size,
            colsample_bytree: 1.0,
            reg_lambda: self.tune.lambda,
            random_state: Some(self.tune.seed),
        }
    }

    pub fn linear_grid(&self) -> &[LinearGridPoint] {
        &self.tune.linear_grid
    }

    /// Solver limits for candidate fits
    pub fn fit_options(&self) -> FitOptions {
        FitOptions {
            max_iter: self.tune.max_iter,
            tol: self.tune.tol,
            budget: self.fit_budget(),
        }
    }

    pub fn fit_budget(&self) -> Option<Duration> {
        self.fit.timeout_secs.map(Duration::from_secs_f64)
    }

    pub fn blend_settings(&self) -> BlendSettings {
        BlendSettings {
            folds: self.ensemble.folds,
            repeats: self.ensemble.repeats,
            seed: self.ensemble.seed,
            n_lambda: self.ensemble.n_lambda,
            lambda_min_ratio: self.ensemble.lambda_min_ratio,
            penalties: self.ensemble.penalties.clone(),
            non_negative: self.ensemble.non_negative,
            ..BlendSettings::new(self.ensemble.alpha)
        }
    }

    pub fn metric(&self) -> LossMetric {
        self.ensemble.metric
    }
}
