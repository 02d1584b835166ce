//! Stackblend - Main Entry Point
//!
//! Fits stacked regression ensembles from the command line.

use clap::Parser;
use stackblend::cli::{cmd_check_params, cmd_fit, Cli, Commands, FitArgs};

fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stackblend=info".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Fit {
            train,
            target,
            params,
            test,
            test_fraction,
            split_seed,
            output,
            predictions,
        } => {
            cmd_fit(FitArgs {
                train: &train,
                target: &target,
                params: &params,
                test: test.as_deref(),
                test_fraction,
                split_seed,
                output: output.as_deref(),
                predictions: predictions.as_deref(),
            })?;
        }
        Commands::CheckParams { params } => {
            cmd_check_params(&params)?;
        }
    }

    Ok(())
}
