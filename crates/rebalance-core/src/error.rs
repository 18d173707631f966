//! Error types for the rebalancing core.

use crate::optimizer::SolveStage;
use derive_more::Display;
use thiserror::Error;

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, RebalanceError>;

/// Broad class of a [`RebalanceError`].
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// An asset has too little history; it is excluded, not fatal
    #[display("insufficient data")]
    InsufficientData,
    /// The two-stage optimizer could not produce weights
    #[display("optimization failure")]
    Optimization,
    /// The factor regression could not be estimated
    #[display("regression failure")]
    Regression,
    /// A configuration value is out of range
    #[display("invalid configuration")]
    Configuration,
    /// Malformed panels, dates or frames
    #[display("invalid data")]
    Data,
}

/// Errors that can occur while ranking, optimizing or regressing.
#[derive(Debug, Error)]
pub enum RebalanceError {
    /// Fewer observations than an operation needs
    #[error("Insufficient data: need {required} observations, got {available}")]
    InsufficientData {
        /// Required number of observations
        required: usize,
        /// Available number of observations
        available: usize,
    },

    /// The optimizer was handed no assets
    #[error("Optimization failed: candidate set is empty")]
    EmptyUniverse,

    /// The weight cap cannot be satisfied by a fully invested portfolio
    #[error("Optimization infeasible: {assets} assets with max weight {max_weight} cannot sum to 1")]
    Infeasible {
        /// Number of assets in the problem
        assets: usize,
        /// Per-asset weight cap
        max_weight: f64,
    },

    /// The QP solver did not produce a solution
    #[error("Optimization failed in {stage} stage: {reason}")]
    SolverFailure {
        /// Stage that failed
        stage: SolveStage,
        /// Why the solve failed
        reason: String,
    },

    /// Every weight came out non-positive after clipping or pruning
    #[error("Optimization produced non-positive weights in {stage} stage")]
    DegenerateWeights {
        /// Stage that produced the weights
        stage: SolveStage,
    },

    /// The portfolio and factor series share no usable periods
    #[error("Regression failed: joined sample is empty")]
    EmptySample,

    /// The joined sample leaves no residual degrees of freedom
    #[error("Regression failed: need {required} joined observations, got {available}")]
    RegressionSample {
        /// Minimum number of joined periods
        required: usize,
        /// Joined periods with complete data
        available: usize,
    },

    /// The regression design matrix is singular
    #[error("Regression failed: design matrix with {columns} columns is rank deficient")]
    RankDeficient {
        /// Number of regressors including the intercept
        columns: usize,
    },

    /// Vector or matrix dimensions do not line up
    #[error("Dimension mismatch for {context}: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// What was being built
        context: String,
        /// Expected dimension
        expected: usize,
        /// Actual dimension
        actual: usize,
    },

    /// A panel violates its row/column invariants
    #[error("Invalid panel: {0}")]
    InvalidPanel(String),

    /// A parameter is outside its allowed range
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Trading calendar lookup failed
    #[error("Calendar error: {0}")]
    Calendar(String),

    /// Polars DataFrame error
    #[error("DataFrame error: {0}")]
    Polars(#[from] polars::error::PolarsError),
}

impl RebalanceError {
    /// Classify the error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InsufficientData { .. } => ErrorKind::InsufficientData,
            Self::EmptyUniverse
            | Self::Infeasible { .. }
            | Self::SolverFailure { .. }
            | Self::DegenerateWeights { .. } => ErrorKind::Optimization,
            Self::EmptySample | Self::RegressionSample { .. } | Self::RankDeficient { .. } => {
                ErrorKind::Regression
            }
            Self::InvalidConfig(_) => ErrorKind::Configuration,
            Self::DimensionMismatch { .. }
            | Self::InvalidPanel(_)
            | Self::Calendar(_)
            | Self::Polars(_) => ErrorKind::Data,
        }
    }

    /// Returns whether this error must abort the whole rebalance run.
    ///
    /// Only insufficient history is non-fatal; callers filter such assets out
    /// instead of failing.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        !matches!(self.kind(), ErrorKind::InsufficientData)
    }

    /// Returns whether this error came from the optimizer.
    #[must_use]
    pub const fn is_optimization_failure(&self) -> bool {
        matches!(self.kind(), ErrorKind::Optimization)
    }

    /// Returns whether this error came from the factor regression.
    #[must_use]
    pub const fn is_regression_failure(&self) -> bool {
        matches!(self.kind(), ErrorKind::Regression)
    }
}
