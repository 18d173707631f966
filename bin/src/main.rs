//! CLI for the quarterly ETF rebalancer.
//!
//! This binary runs a rebalance for a given quarter, runs the current quarter
//! on a schedule when it has not been produced yet, and prints the effective
//! configuration.

mod pipeline;

use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use rebalance_data::{AppConfig, DataError, FileUniverse, FrenchLibrary, Result, YahooPriceProvider, load_config};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "etf-rebalancer")]
#[command(about = "Quarterly ETF rebalancing with two-stage mean-variance optimization", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file (default: rebalancer.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Hide the download progress bar
    #[arg(long, global = true)]
    quiet: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Rebalance the quarter containing a date
    Rebalance {
        /// Date inside the target quarter (YYYY-MM-DD)
        #[arg(long)]
        asof: NaiveDate,
    },
    /// Rebalance the most recent quarter unless its weights already exist
    Schedule {
        /// Reference date (default: today)
        #[arg(long)]
        today: Option<NaiveDate>,
    },
    /// Print the effective configuration as TOML
    Config {
        /// Also write it to this file
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

fn main() -> ExitCode {
    init_logging();
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            match e.core_kind() {
                Some(kind) => error!(error = %e, %kind, "rebalance failed"),
                None => error!(error = %e, kind = "input", "rebalance failed"),
            }
            exit_code(&e)
        }
    }
}

/// 2 for bad inputs or configuration, 1 for optimization, regression and
/// other failures.
fn exit_code(error: &DataError) -> ExitCode {
    if error.is_input_error() { ExitCode::from(2) } else { ExitCode::FAILURE }
}

/// Log to stderr, filtered by `RUST_LOG` (default: info).
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<()> {
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Rebalance { asof } => rebalance(&config, asof, cli.quiet),
        Commands::Schedule { today } => {
            let today = today.unwrap_or_else(|| Local::now().date_naive());
            match pipeline::pending_rebalance(&config, today)? {
                Some(rebalance_date) => rebalance(&config, rebalance_date, cli.quiet),
                None => Ok(()),
            }
        }
        Commands::Config { output } => {
            print!("{}", config.to_toml()?);
            if let Some(path) = output {
                config.save(&path)?;
                info!(path = %path.display(), "saved configuration");
            }
            Ok(())
        }
    }
}

fn rebalance(config: &AppConfig, asof: NaiveDate, quiet: bool) -> Result<()> {
    let universe = FileUniverse::new(&config.data.universe_file);
    let prices = YahooPriceProvider::new()?.with_progress(!quiet);
    let factors = FrenchLibrary::new()?;
    let sources = pipeline::Sources {
        universe: &universe,
        prices: &prices,
        factors: &factors,
    };
    let paths = pipeline::run_rebalance(config, &sources, asof)?;
    println!("{}", paths.weights.display());
    println!("{}", paths.report.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_rebalance() {
        let cli = Cli::try_parse_from(["etf-rebalancer", "--config", "alt.toml", "rebalance", "--asof", "2024-05-15"])
            .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("alt.toml")));
        assert!(matches!(
            cli.command,
            Commands::Rebalance { asof } if asof == NaiveDate::from_ymd_opt(2024, 5, 15).unwrap()
        ));
    }

    #[test]
    fn test_parse_schedule_defaults() {
        let cli = Cli::try_parse_from(["etf-rebalancer", "schedule", "--quiet"]).unwrap();
        assert!(cli.quiet);
        assert!(cli.config.is_none());
        assert!(matches!(cli.command, Commands::Schedule { today: None }));
    }

    #[test]
    fn test_exit_codes_follow_error_kind() {
        use rebalance_core::RebalanceError;

        let regression = DataError::Core(RebalanceError::RegressionSample { required: 7, available: 5 });
        assert_eq!(regression.core_kind(), Some(rebalance_core::ErrorKind::Regression));
        assert_eq!(exit_code(&regression), ExitCode::FAILURE);

        let config = DataError::Core(RebalanceError::InvalidConfig("max_positions".into()));
        assert_eq!(exit_code(&config), ExitCode::from(2));

        let download = DataError::FactorDownload("offline".into());
        assert_eq!(download.core_kind(), None);
        assert_eq!(exit_code(&download), ExitCode::from(2));
    }

    #[test]
    fn test_rejects_bad_date() {
        assert!(Cli::try_parse_from(["etf-rebalancer", "rebalance", "--asof", "15/05/2024"]).is_err());
        assert!(Cli::try_parse_from(["etf-rebalancer", "rebalance"]).is_err());
    }
}
