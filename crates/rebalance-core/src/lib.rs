#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/etf-rebalancer/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod calendar;
pub mod error;
pub mod optimizer;
pub mod panel;
pub mod portfolio;
pub mod regression;
pub mod returns;
pub mod selection;
pub mod stats;

// Re-export core types
pub use error::{ErrorKind, RebalanceError, Result};
pub use optimizer::{
    Allocation, MeanVarianceProblem, OptimizerConfig, SolveStage, SolverSettings,
    TwoStageOptimizer, pragmatic_cardinality_mv, solve_mean_variance,
};
pub use panel::{DATE_COLUMN, Panel, PriceTable, ReturnMatrix};
pub use portfolio::{ReturnSeries, WeightVector, portfolio_returns};
pub use regression::{FactorTable, RegressionResult, run_factor_regression};
pub use returns::{filter_min_observations, monthly_returns, require_observations};
pub use selection::{RankedAsset, Selection, select_top_n};
pub use stats::PortfolioStats;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
