//! Tables handed to external reporting

use crate::error::Result;
use crate::stacking::{BlendMember, BlendModel, BlendPath, CandidateFamily, CandidateId, PredictionTable, StackedRun};
use crate::training::ModelMetrics;
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Row label of the blended prediction in a [`MetricsTable`]
pub const ENSEMBLE_ROW: &str = "ensemble";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsRow {
    pub model: String,
    pub rmse: f64,
    pub rsq: f64,
}

/// Per-model test metrics, best R² first
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetricsTable {
    rows: Vec<MetricsRow>,
}

impl MetricsTable {
    /// Score the ensemble and every member column of `predictions` against `y_true`.
    pub fn from_predictions(y_true: &Array1<f64>, predictions: &PredictionTable) -> Result<Self> {
        let mut rows = Vec::with_capacity(predictions.member_ids.len() + 1);

        let m = ModelMetrics::compute_regression(y_true, &predictions.ensemble)?;
        rows.push(MetricsRow {
            model: ENSEMBLE_ROW.to_string(),
            rmse: m.rmse,
            rsq: m.r2,
        });
        for (id, column) in predictions.member_ids.iter().zip(predictions.members.columns()) {
            let m = ModelMetrics::compute_regression(y_true, &column.to_owned())?;
            rows.push(MetricsRow {
                model: id.to_string(),
                rmse: m.rmse,
                rsq: m.r2,
            });
        }

        rows.sort_by(|a, b| b.rsq.total_cmp(&a.rsq));
        Ok(Self { rows })
    }

    pub fn rows(&self) -> &[MetricsRow] {
        &self.rows
    }

    pub fn get(&self, model: &str) -> Option<&MetricsRow> {
        self.rows.iter().find(|r| r.model == model)
    }
}

/// Blend weight of one retained member
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contribution {
    pub candidate: CandidateId,
    pub family: CandidateFamily,
    pub weight: f64,
    /// `|weight|` as a fraction of the summed absolute weights
    pub share: f64,
}

/// Retained members by descending weight
pub fn contributions(blend: &BlendModel) -> Vec<Contribution> {
    let total: f64 = blend.retained().map(|m| m.weight.abs()).sum();
    let mut rows: Vec<Contribution> = blend
        .retained()
        .map(|m| Contribution {
            candidate: m.spec.id().clone(),
            family: m.spec.family(),
            weight: m.weight,
            share: if total > 0.0 { m.weight.abs() / total } else { 0.0 },
        })
        .collect();
    rows.sort_by(|a, b| b.weight.total_cmp(&a.weight));
    rows
}

/// Held-out scoring of a fitted stack
#[derive(Debug, Clone, Serialize)]
pub struct Evaluation {
    pub metrics: MetricsTable,
    pub predictions: PredictionTable,
}

/// Everything the CLI writes to its JSON report
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub intercept: f64,
    pub penalty: f64,
    pub mixture: f64,
    pub members: Vec<BlendMember>,
    pub contributions: Vec<Contribution>,
    pub path: Option<BlendPath>,
    pub failures: Vec<String>,
    pub metrics: Option<MetricsTable>,
}

impl RunReport {
    pub fn new(run: &StackedRun, evaluation: Option<&Evaluation>) -> Self {
        let blend = run.ensemble.blend();
        Self {
            intercept: blend.intercept(),
            penalty: blend.penalty(),
            mixture: blend.mixture(),
            members: blend.members().to_vec(),
            contributions: run.contributions(),
            path: blend.path().cloned(),
            failures: run.failures.iter().map(|e| e.to_string()).collect(),
            metrics: evaluation.map(|e| e.metrics.clone()),
        }
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}
