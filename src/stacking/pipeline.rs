//! End-to-end stacking run driven by a [`StackConfig`]

use super::assembler::{assemble, StackMatrix};
use super::blender::blend;
use super::candidate::{CandidateFamily, CandidateSpec, FitOptions};
use super::ensemble::Ensemble;
use super::finalizer::{finalize, FinalizedModels};
use super::{linear_family, tree_family};
use crate::config::StackConfig;
use crate::data::Dataset;
use crate::error::{Result, StackError};
use crate::report::{contributions, Contribution, Evaluation, MetricsTable};
use crate::training::{assign_folds, FoldAssignment};
use std::time::Instant;
use tracing::{info, warn};

/// Out-of-fold stage of a run: the shared folds, the assembled stack and the
/// candidates that were dropped on the way.
#[derive(Debug)]
pub struct Resampled {
    pub folds: FoldAssignment,
    pub stack: StackMatrix,
    pub failures: Vec<StackError>,
}

/// A fitted stack together with what happened while building it
#[derive(Debug)]
pub struct StackedRun {
    pub ensemble: Ensemble,
    pub folds: FoldAssignment,
    /// Every stacked candidate, in column order
    pub candidates: Vec<CandidateSpec>,
    /// Candidates dropped during resampling
    pub failures: Vec<StackError>,
}

impl StackedRun {
    /// Blend weight of every retained member
    pub fn contributions(&self) -> Vec<Contribution> {
        contributions(self.ensemble.blend())
    }

    /// Score the ensemble and each retained member on held-out data.
    ///
    /// Test features are matched to the training features by name.
    pub fn evaluate(&self, test: &Dataset) -> Result<Evaluation> {
        let x = test.features_by_name(self.ensemble.feature_names())?;
        let predictions = self.ensemble.predict(&x)?;
        let metrics = MetricsTable::from_predictions(test.target(), &predictions)?;
        Ok(Evaluation { metrics, predictions })
    }
}

/// Builds stacked ensembles from a validated configuration.
pub struct StackBuilder {
    config: StackConfig,
    linear_options: Option<FitOptions>,
    tree_options: Option<FitOptions>,
}

impl StackBuilder {
    pub fn new(config: StackConfig) -> Self {
        Self {
            config,
            linear_options: None,
            tree_options: None,
        }
    }

    /// Override the fit options derived from the config for linear candidates.
    pub fn with_linear_options(mut self, options: FitOptions) -> Self {
        self.linear_options = Some(options);
        self
    }

    /// Override the fit options derived from the config for the boosted tree.
    pub fn with_tree_options(mut self, options: FitOptions) -> Self {
        self.tree_options = Some(options);
        self
    }

    pub fn config(&self) -> &StackConfig {
        &self.config
    }

    /// Fit options used for every fit of a family, in resampling and refit
    pub fn fit_options(&self, family: CandidateFamily) -> FitOptions {
        let custom = match family {
            CandidateFamily::LinearReg => self.linear_options,
            CandidateFamily::BoostTree => self.tree_options,
        };
        custom.unwrap_or_else(|| self.config.fit_options())
    }

    /// Draw folds, run both candidate families and assemble their columns.
    ///
    /// Recoverable candidate failures are collected; at least two columns
    /// must survive.
    pub fn resample(&self, train: &Dataset) -> Result<Resampled> {
        self.config.validate()?;
        let x = train.features();
        let y = train.target();

        let folds = assign_folds(train.n_rows(), self.config.cv.folds, self.config.cv.seed)?;
        info!(
            rows = train.n_rows(),
            features = train.n_features(),
            folds = folds.n_folds(),
            linear_candidates = self.config.linear_grid().len(),
            "resampling candidates"
        );

        let linear_options = self.fit_options(CandidateFamily::LinearReg);
        let tree_options = self.fit_options(CandidateFamily::BoostTree);
        let boost = self.config.boosted_tree_config();
        let (linear, tree) = rayon::join(
            || linear_family::tune(x, y, &folds, self.config.linear_grid(), &linear_options),
            || tree_family::evaluate(x, y, &folds, &boost, &tree_options),
        );

        let linear = linear?;
        let mut columns = linear.columns;
        let mut failures = linear.failures;
        match tree {
            Ok(column) => columns.push(column),
            Err(e) if e.is_recoverable() => {
                warn!(error = %e, "dropping boosted tree candidate");
                failures.push(e);
            }
            Err(e) => return Err(e),
        }

        if columns.len() < 2 {
            return Err(StackError::DegenerateBlendError(format!(
                "only {} candidate column(s) survived resampling, {} failed",
                columns.len(),
                failures.len()
            )));
        }

        let stack = assemble(y, &folds, &columns)?;
        info!(candidates = stack.n_candidates(), dropped = failures.len(), "stack assembled");
        Ok(Resampled { folds, stack, failures })
    }

    /// Run the full sequence: resample, blend, finalize, build the ensemble.
    pub fn fit(&self, train: &Dataset) -> Result<StackedRun> {
        let start = Instant::now();
        let Resampled { folds, stack, failures } = self.resample(train)?;

        let blend_model = blend(&stack, self.config.metric(), &self.config.blend_settings())?;
        let candidates = stack.specs().to_vec();
        drop(stack);

        // Family order matches column order
        let mut finalized = FinalizedModels::new();
        for family in [CandidateFamily::LinearReg, CandidateFamily::BoostTree] {
            let specs: Vec<CandidateSpec> = blend_model
                .retained_specs()
                .into_iter()
                .filter(|spec| spec.family() == family)
                .collect();
            if !specs.is_empty() {
                finalized.extend(finalize(&specs, train.features(), train.target(), &self.fit_options(family))?);
            }
        }
        let ensemble = Ensemble::new(blend_model, finalized, train.feature_names().to_vec())?;

        info!(
            members = ensemble.members().len(),
            candidates = candidates.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "stacked ensemble fitted"
        );

        Ok(StackedRun {
            ensemble,
            folds,
            candidates,
            failures,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stacking::LinearGridPoint;
    use ndarray::{Array1, Array2, Axis};
    use std::time::Duration;

    fn dataset(n: usize) -> Dataset {
        let x = Array2::from_shape_fn((n, 3), |(i, j)| (((i + 1) * (j + 2) * 7) % 19) as f64 / 3.0);
        let y: Array1<f64> = x
            .rows()
            .into_iter()
            .map(|r| 3.0 * r[0] - r[1] + (r[2] - 3.0).powi(2))
            .collect();
        Dataset::new(vec!["a".into(), "b".into(), "c".into()], "y", x, y).unwrap()
    }

    fn config() -> StackConfig {
        let mut config = StackConfig::new(30, 1.0);
        config.tune.linear_grid = vec![LinearGridPoint::new(0.01, 1.0), LinearGridPoint::new(0.1, 0.0)];
        config.tune.tree_depth = 3;
        config.ensemble.repeats = 1;
        config.ensemble.n_lambda = 20;
        config
    }

    #[test]
    fn test_resample_layout() {
        let resampled = StackBuilder::new(config()).resample(&dataset(60)).unwrap();
        let ids: Vec<&str> = resampled.stack.specs().iter().map(|s| s.id().as_str()).collect();
        assert_eq!(ids, vec!["linear_reg_01", "linear_reg_02", "boost_tree_1"]);
        assert_eq!(resampled.stack.n_rows(), 60);
        assert!(resampled.failures.is_empty());
    }

    #[test]
    fn test_fit_and_evaluate() {
        let train = dataset(80);
        let run = StackBuilder::new(config()).fit(&train).unwrap();
        assert_eq!(run.candidates.len(), 3);
        assert!(!run.ensemble.members().is_empty());

        let evaluation = run.evaluate(&dataset(30)).unwrap();
        assert_eq!(evaluation.predictions.n_rows(), 30);
        assert!(evaluation.metrics.get("ensemble").is_some());
        let rows = evaluation.metrics.rows();
        assert!(rows.windows(2).all(|w| w[0].rsq >= w[1].rsq));
    }

    #[test]
    fn test_all_linear_failures_leave_too_few_columns() {
        let mut config = config();
        config.tune.max_iter = 1;
        config.tune.tol = 1e-30;
        let err = StackBuilder::new(config).resample(&dataset(40)).unwrap_err();
        assert!(matches!(err, StackError::DegenerateBlendError(_)), "{:?}", err);
    }

    #[test]
    fn test_tree_failure_drops_only_the_tree() {
        let train = dataset(80);
        let tree_options = FitOptions {
            budget: Some(Duration::ZERO),
            ..Default::default()
        };
        let builder = StackBuilder::new(config()).with_tree_options(tree_options);
        assert_eq!(builder.fit_options(CandidateFamily::LinearReg), FitOptions::default());

        let result = builder.fit(&train);
        assert!(result.is_ok(), "linear columns should carry the stack: {:?}", result.err());
        let run = result.unwrap();

        let ids: Vec<&str> = run.candidates.iter().map(|s| s.id().as_str()).collect();
        assert_eq!(ids, vec!["linear_reg_01", "linear_reg_02"]);
        assert_eq!(run.failures.len(), 1);
        match &run.failures[0] {
            StackError::CandidateFitFailure { candidate, fold, .. } => {
                assert_eq!(candidate, "boost_tree_1");
                assert!(fold.is_some());
            }
            other => panic!("unexpected failure {:?}", other),
        }
        assert!(run
            .ensemble
            .members()
            .iter()
            .all(|m| m.spec().family() == CandidateFamily::LinearReg));
    }

    #[test]
    fn test_evaluate_matches_features_by_name() {
        let run = StackBuilder::new(config()).fit(&dataset(80)).unwrap();
        let test = dataset(30);
        let expected = run.evaluate(&test).unwrap();

        let order = [2, 0, 1];
        let shuffled = Dataset::new(
            order.iter().map(|&j| test.feature_names()[j].clone()).collect(),
            "y",
            test.features().select(Axis(1), &order),
            test.target().clone(),
        )
        .unwrap();
        let evaluation = run.evaluate(&shuffled).unwrap();
        assert_eq!(evaluation.predictions, expected.predictions);

        let renamed = Dataset::new(
            vec!["a".into(), "b".into(), "z".into()],
            "y",
            test.features().clone(),
            test.target().clone(),
        )
        .unwrap();
        assert!(matches!(run.evaluate(&renamed), Err(StackError::FeatureNotFound(_))));
    }
}
