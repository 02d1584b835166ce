//! Stackblend CLI Module
//!
//! Command-line interface for fitting stacked ensembles and checking
//! hyperparameter documents.

use clap::{Parser, Subcommand};
use colored::*;
use polars::prelude::*;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::config::StackConfig;
use crate::data::{load_csv, Dataset};
use crate::report::{Evaluation, RunReport};
use crate::stacking::{PredictionTable, StackBuilder};

// ─── Styling helpers ───────────────────────────────────────────────────────────

fn dim(s: &str) -> ColoredString { s.truecolor(100, 100, 100) }
fn accent(s: &str) -> ColoredString { s.truecolor(120, 170, 255) }
fn muted(s: &str) -> ColoredString { s.truecolor(140, 140, 140) }
fn ok(s: &str) -> ColoredString { s.truecolor(100, 210, 120) }

fn step_ok(msg: &str) {
    println!("  {} {}", ok("✓"), msg);
}

fn step_warn(msg: &str) {
    println!("  {} {}", "!".yellow(), msg);
}

fn step_run(msg: &str) {
    print!("  {} {}... ", accent("›"), msg);
}

fn step_done(detail: &str) {
    println!("{} {}", ok("done"), dim(detail));
}

fn section(title: &str) {
    println!();
    println!("  {}", title.white().bold());
    println!("  {}", dim(&"─".repeat(56)));
}

// ─── CLI definition ────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "stackblend")]
#[command(author = "KolosalAI")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Stacked regression ensembles with elastic-net blending")]
#[command(long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Fit a stacked ensemble and report its test metrics
    Fit {
        /// Training data (CSV)
        #[arg(long)]
        train: PathBuf,

        /// Target column name
        #[arg(short, long)]
        target: String,

        /// Hyperparameter document (JSON)
        #[arg(short, long)]
        params: PathBuf,

        /// Held-out test data (CSV)
        #[arg(long, conflicts_with = "test_fraction")]
        test: Option<PathBuf>,

        /// Hold out this fraction of the training rows for testing
        #[arg(long)]
        test_fraction: Option<f64>,

        /// Seed of the train/test split
        #[arg(long, default_value = "42")]
        split_seed: u64,

        /// JSON report file
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// CSV file for the test-set predictions
        #[arg(long)]
        predictions: Option<PathBuf>,
    },

    /// Validate a hyperparameter document and print it with defaults filled in
    CheckParams {
        /// Hyperparameter document (JSON)
        #[arg(short, long)]
        params: PathBuf,
    },
}

/// Options of the `fit` subcommand
pub struct FitArgs<'a> {
    pub train: &'a Path,
    pub target: &'a str,
    pub params: &'a Path,
    pub test: Option<&'a Path>,
    pub test_fraction: Option<f64>,
    pub split_seed: u64,
    pub output: Option<&'a Path>,
    pub predictions: Option<&'a Path>,
}

// ─── Commands ──────────────────────────────────────────────────────────────────

fn load_dataset(path: &Path, target: &str) -> anyhow::Result<Dataset> {
    step_run(&format!("Loading {}", path.display()));
    let start = Instant::now();
    let df = load_csv(path)?;
    let dataset = Dataset::from_dataframe(&df, target)?;
    step_done(&format!(
        "{} rows × {} features in {:?}",
        dataset.n_rows(),
        dataset.n_features(),
        start.elapsed()
    ));
    Ok(dataset)
}

pub fn cmd_fit(args: FitArgs<'_>) -> anyhow::Result<()> {
    section("Fit");

    let config = StackConfig::from_file(args.params)?;
    step_ok(&format!(
        "Parameters: {} trees, {} linear candidates, α = {}",
        config.tune.trees,
        config.linear_grid().len(),
        config.ensemble.alpha
    ));

    let full = load_dataset(args.train, args.target)?;
    let (train, test) = match (args.test, args.test_fraction) {
        (Some(path), _) => (full, Some(load_dataset(path, args.target)?)),
        (None, Some(fraction)) => {
            let (train, test) = full.train_test_split(fraction, args.split_seed)?;
            step_ok(&format!("Split {} train / {} test rows", train.n_rows(), test.n_rows()));
            (train, Some(test))
        }
        (None, None) => (full, None),
    };

    step_run("Fitting stack");
    let start = Instant::now();
    let run = StackBuilder::new(config).fit(&train)?;
    step_done(&format!("{:?}", start.elapsed()));

    for failure in &run.failures {
        step_warn(&failure.to_string());
    }

    let blend = run.ensemble.blend();
    section("Blend");
    println!("  {:<16} {}", muted("Penalty"), format!("{:.6}", blend.penalty()).white());
    println!("  {:<16} {}", muted("Intercept"), format!("{:.4}", blend.intercept()).white());
    for c in run.contributions() {
        println!(
            "  {:<16} {} {}",
            muted(c.candidate.as_str()),
            format!("{:>8.4}", c.weight).white().bold(),
            dim(&format!("{:.1}%", c.share * 100.0))
        );
    }
    let pruned = blend.members().iter().filter(|m| !m.retained).count();
    if pruned > 0 {
        println!("  {}", dim(&format!("{} candidate(s) pruned", pruned)));
    }

    let evaluation = match &test {
        Some(test) => {
            let evaluation = run.evaluate(test)?;
            print_metrics(&evaluation);
            Some(evaluation)
        }
        None => None,
    };

    if let Some(path) = args.output {
        RunReport::new(&run, evaluation.as_ref()).write_json(path)?;
        step_ok(&format!("Report → {}", path.display()));
    }
    if let (Some(path), Some(evaluation)) = (args.predictions, &evaluation) {
        write_predictions(path, &evaluation.predictions)?;
        step_ok(&format!("Predictions → {}", path.display()));
    }

    println!();
    Ok(())
}

fn print_metrics(evaluation: &Evaluation) {
    section("Test metrics");
    println!("  {:<16} {:>10} {:>10}", muted("Model"), muted("RMSE"), muted("R²"));
    for row in evaluation.metrics.rows() {
        println!(
            "  {:<16} {:>10} {:>10}",
            row.model,
            format!("{:.4}", row.rmse).white(),
            format!("{:.4}", row.rsq).white().bold()
        );
    }
}

fn write_predictions(path: &Path, table: &PredictionTable) -> anyhow::Result<()> {
    let mut columns: Vec<Column> = table
        .member_ids
        .iter()
        .zip(table.members.columns())
        .map(|(id, values)| Series::new(id.as_str().into(), values.to_vec()).into())
        .collect();
    columns.push(Series::new("ensemble".into(), table.ensemble.to_vec()).into());

    let mut df = DataFrame::new(columns)?;
    let mut file = std::fs::File::create(path)?;
    CsvWriter::new(&mut file).finish(&mut df)?;
    Ok(())
}

pub fn cmd_check_params(params: &Path) -> anyhow::Result<()> {
    section("Check params");
    let config = StackConfig::from_file(params)?;
    step_ok(&format!("{} is valid", params.display()));
    println!("{}", config.to_json_string()?);
    Ok(())
}
