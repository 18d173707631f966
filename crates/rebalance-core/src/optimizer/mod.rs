//! Two-stage cardinality-constrained mean-variance optimizer.
//!
//! True cardinality-constrained mean-variance optimization is a mixed-integer
//! problem. The optimizer approximates it in two stages that call the same QP
//! routine:
//!
//! 1. **Full**: solve `max mu'w - lambda * w'Sw` subject to `w >= 0`,
//!    `sum(w) = 1`, `w <= max_weight` over every candidate.
//! 2. **Reduced**: keep the `max_positions` largest stage-1 weights and
//!    re-solve the identical problem from scratch over those assets only.
//!
//! Stage-2 weights below [`MIN_FINAL_WEIGHT`] are dropped, at most
//! `max_positions` survive, and the remainder is renormalized. The result is
//! not guaranteed to be the global cardinality-constrained optimum.

mod qp;

use crate::{
    RebalanceError, Result, ReturnMatrix, WeightVector,
    stats::{column_means, sample_covariance},
};
use derive_more::Display;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Stage-2 weights at or below this value are dropped.
pub const MIN_FINAL_WEIGHT: f64 = 1e-6;

/// Slack allowed when checking that the weight cap admits a full allocation.
const FEASIBILITY_SLACK: f64 = 1e-12;

/// Which of the two solves is running.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SolveStage {
    /// Relaxed solve over every candidate
    Full,
    /// Re-solve over the cardinality-reduced subset
    Reduced,
}

/// Interior-point controls passed to clarabel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverSettings {
    /// Iteration budget per solve (default: 200)
    pub max_iterations: u32,
    /// Duality-gap and feasibility tolerance (default: 1e-8)
    pub tolerance: f64,
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            max_iterations: 200,
            tolerance: 1e-8,
        }
    }
}

/// Configuration for the two-stage optimizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    /// Risk-aversion coefficient lambda (default: 5.0)
    pub risk_aversion: f64,
    /// Per-asset weight cap in (0, 1] (default: 0.2)
    pub max_weight: f64,
    /// Maximum number of positions in the final portfolio (default: 10)
    pub max_positions: usize,
    /// QP solver controls
    pub solver: SolverSettings,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            risk_aversion: 5.0,
            max_weight: 0.2,
            max_positions: 10,
            solver: SolverSettings::default(),
        }
    }
}

impl OptimizerConfig {
    /// Check parameter ranges.
    pub fn validate(&self) -> Result<()> {
        if !(self.risk_aversion.is_finite() && self.risk_aversion >= 0.0) {
            return Err(RebalanceError::InvalidConfig(format!(
                "risk_aversion must be finite and >= 0, got {}",
                self.risk_aversion
            )));
        }
        if !(self.max_weight > 0.0 && self.max_weight <= 1.0) {
            return Err(RebalanceError::InvalidConfig(format!(
                "max_weight must be in (0, 1], got {}",
                self.max_weight
            )));
        }
        if self.max_positions == 0 {
            return Err(RebalanceError::InvalidConfig(
                "max_positions must be greater than 0".to_string(),
            ));
        }
        // Stage 2 holds at most max_positions assets, each capped at max_weight.
        if (self.max_positions as f64) * self.max_weight < 1.0 - FEASIBILITY_SLACK {
            return Err(RebalanceError::InvalidConfig(format!(
                "max_positions * max_weight must be >= 1, got {} * {}",
                self.max_positions, self.max_weight
            )));
        }
        if self.solver.max_iterations == 0 {
            return Err(RebalanceError::InvalidConfig(
                "solver.max_iterations must be greater than 0".to_string(),
            ));
        }
        if !(self.solver.tolerance.is_finite() && self.solver.tolerance > 0.0) {
            return Err(RebalanceError::InvalidConfig(format!(
                "solver.tolerance must be finite and > 0, got {}",
                self.solver.tolerance
            )));
        }
        Ok(())
    }
}

/// Sample moments of a candidate return matrix.
#[derive(Debug, Clone)]
pub struct MeanVarianceProblem {
    /// Asset identifiers, in matrix column order
    pub assets: Vec<String>,
    /// Sample mean return per asset
    pub expected_returns: Array1<f64>,
    /// Pairwise-complete sample covariance
    pub covariance: Array2<f64>,
}

impl MeanVarianceProblem {
    /// Estimate moments from a return matrix.
    pub fn from_returns(returns: &ReturnMatrix) -> Self {
        Self {
            assets: returns.assets().to_vec(),
            expected_returns: column_means(returns),
            covariance: sample_covariance(returns),
        }
    }
}

/// Solve the capped long-only mean-variance QP for one stage.
///
/// Weights are clipped at zero and renormalized to absorb solver noise.
pub fn solve_mean_variance(
    returns: &ReturnMatrix,
    config: &OptimizerConfig,
    stage: SolveStage,
) -> Result<WeightVector> {
    let n = returns.n_assets();
    if n == 0 {
        return Err(RebalanceError::EmptyUniverse);
    }
    if (n as f64) * config.max_weight < 1.0 - FEASIBILITY_SLACK {
        return Err(RebalanceError::Infeasible {
            assets: n,
            max_weight: config.max_weight,
        });
    }

    let problem = MeanVarianceProblem::from_returns(returns);
    let raw = qp::solve(
        &problem.expected_returns,
        &problem.covariance,
        config.risk_aversion,
        config.max_weight,
        &config.solver,
    )
    .map_err(|e| RebalanceError::SolverFailure {
        stage,
        reason: e.to_string(),
    })?;

    let clipped: Vec<f64> = raw.iter().map(|w| w.max(0.0)).collect();
    let weights = WeightVector::from_parts(&problem.assets, &clipped)
        .normalized()
        .ok_or(RebalanceError::DegenerateWeights { stage })?;

    debug!(
        %stage,
        assets = n,
        nonzero = weights.above(0.0).len(),
        "solved mean-variance stage"
    );
    Ok(weights)
}

/// Output of the two-stage optimizer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Allocation {
    /// Stage-1 weights over every candidate, in candidate order
    pub full: WeightVector,
    /// Assets carried into stage 2, largest stage-1 weight first
    pub selected: Vec<String>,
    /// Raw stage-2 weights over the selected assets
    pub reduced: WeightVector,
    /// Final pruned and renormalized weights, largest first
    pub weights: WeightVector,
}

/// Two-stage cardinality-constrained mean-variance optimizer.
#[derive(Debug, Clone, Default)]
pub struct TwoStageOptimizer {
    config: OptimizerConfig,
}

impl TwoStageOptimizer {
    /// Create an optimizer with the given configuration.
    pub const fn with_config(config: OptimizerConfig) -> Self {
        Self { config }
    }

    /// Returns the current configuration.
    pub const fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    /// Run both stages over a candidate return matrix.
    pub fn optimize(&self, returns: &ReturnMatrix) -> Result<Allocation> {
        self.config.validate()?;

        let full = solve_mean_variance(returns, &self.config, SolveStage::Full)?;
        let selected: Vec<String> = full
            .top(self.config.max_positions)
            .assets()
            .into_iter()
            .map(str::to_string)
            .collect();

        let reduced_returns = returns.select(&selected)?;
        let reduced = solve_mean_variance(&reduced_returns, &self.config, SolveStage::Reduced)?;

        let weights = reduced
            .above(MIN_FINAL_WEIGHT)
            .top(self.config.max_positions)
            .normalized()
            .ok_or(RebalanceError::DegenerateWeights {
                stage: SolveStage::Reduced,
            })?;

        info!(
            candidates = returns.n_assets(),
            selected = selected.len(),
            positions = weights.len(),
            "optimized portfolio"
        );

        Ok(Allocation {
            full,
            selected,
            reduced,
            weights,
        })
    }
}

/// Optimize with the given parameters and default solver settings.
pub fn pragmatic_cardinality_mv(
    returns: &ReturnMatrix,
    risk_aversion: f64,
    max_weight: f64,
    max_positions: usize,
) -> Result<WeightVector> {
    let optimizer = TwoStageOptimizer::with_config(OptimizerConfig {
        risk_aversion,
        max_weight,
        max_positions,
        ..OptimizerConfig::default()
    });
    Ok(optimizer.optimize(returns)?.weights)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Panel;
    use approx::assert_relative_eq;
    use chrono::NaiveDate;
    use ndarray::array;
    use rand::{SeedableRng, rngs::StdRng};
    use rand_distr::{Distribution, Normal};

    fn months(n: usize) -> Vec<NaiveDate> {
        (0..n)
            .map(|i| {
                NaiveDate::from_ymd_opt(2020, 1, 31)
                    .unwrap()
                    .checked_add_months(chrono::Months::new(u32::try_from(i).unwrap()))
                    .unwrap()
            })
            .collect()
    }

    fn three_assets() -> ReturnMatrix {
        Panel::new(
            months(6),
            vec!["A".into(), "B".into(), "C".into()],
            array![
                [0.02, 0.01, -0.01],
                [0.03, -0.01, 0.02],
                [-0.01, 0.02, 0.01],
                [0.04, 0.00, 0.00],
                [0.01, 0.01, 0.03],
                [0.02, -0.02, 0.01]
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_config_validation() {
        assert!(OptimizerConfig::default().validate().is_ok());
        for config in [
            OptimizerConfig { max_weight: 0.0, ..Default::default() },
            OptimizerConfig { max_weight: 1.5, ..Default::default() },
            OptimizerConfig { risk_aversion: -1.0, ..Default::default() },
            OptimizerConfig { max_positions: 0, ..Default::default() },
            OptimizerConfig {
                solver: SolverSettings { tolerance: 0.0, ..Default::default() },
                ..Default::default()
            },
        ] {
            assert!(matches!(config.validate(), Err(RebalanceError::InvalidConfig(_))));
        }
    }

    #[test]
    fn test_config_rejects_unreachable_full_allocation() {
        let short = OptimizerConfig {
            max_weight: 0.2,
            max_positions: 4,
            ..Default::default()
        };
        let err = short.validate().unwrap_err();
        assert!(matches!(&err, RebalanceError::InvalidConfig(msg) if msg.contains("max_positions * max_weight")));
        assert!(TwoStageOptimizer::with_config(short).optimize(&three_assets()).is_err());

        let exact = OptimizerConfig {
            max_weight: 0.2,
            max_positions: 5,
            ..Default::default()
        };
        assert!(exact.validate().is_ok());
    }

    #[test]
    fn test_empty_universe_is_fatal() {
        let returns = Panel::empty(Vec::new());
        let err = TwoStageOptimizer::default().optimize(&returns).unwrap_err();
        assert!(matches!(err, RebalanceError::EmptyUniverse));
        assert!(err.is_optimization_failure());
        assert!(err.is_fatal());
    }

    #[test]
    fn test_infeasible_cap() {
        let config = OptimizerConfig {
            max_weight: 0.2,
            ..Default::default()
        };
        let err = solve_mean_variance(&three_assets(), &config, SolveStage::Full).unwrap_err();
        assert!(matches!(err, RebalanceError::Infeasible { assets: 3, .. }));
    }

    #[test]
    fn test_stage_weights_respect_constraints() {
        let config = OptimizerConfig {
            risk_aversion: 2.0,
            max_weight: 0.5,
            max_positions: 2,
            ..Default::default()
        };
        let allocation = TwoStageOptimizer::with_config(config)
            .optimize(&three_assets())
            .unwrap();

        assert_eq!(allocation.full.len(), 3);
        assert_eq!(allocation.selected.len(), 2);
        assert_relative_eq!(allocation.full.sum(), 1.0, epsilon = 1e-9);
        assert!(allocation.full.max_weight() <= 0.5 + 1e-6);

        let weights = &allocation.weights;
        assert!(weights.len() <= 2);
        assert_relative_eq!(weights.sum(), 1.0, epsilon = 1e-9);
        assert!(weights.iter().all(|(_, w)| w >= 0.0 && w <= 0.5 + 1e-6));
        // Two assets capped at 0.5 must both be fully used.
        assert_relative_eq!(weights.max_weight(), 0.5, epsilon = 1e-6);
    }

    #[test]
    fn test_risk_neutral_picks_highest_means() {
        let config = OptimizerConfig {
            risk_aversion: 0.0,
            max_weight: 0.5,
            max_positions: 3,
            ..Default::default()
        };
        let allocation = TwoStageOptimizer::with_config(config)
            .optimize(&three_assets())
            .unwrap();

        // Means: A = 0.0183, B = 0.0017, C = 0.01
        assert_relative_eq!(allocation.weights.get("A").unwrap(), 0.5, epsilon = 1e-6);
        assert_relative_eq!(allocation.weights.get("C").unwrap(), 0.5, epsilon = 1e-6);
        assert!(allocation.weights.get("B").is_none());
    }

    #[test]
    fn test_single_asset_takes_everything() {
        let returns = three_assets().select(&["A"]).unwrap();
        let config = OptimizerConfig {
            max_weight: 1.0,
            ..Default::default()
        };
        let allocation = TwoStageOptimizer::with_config(config).optimize(&returns).unwrap();
        assert_eq!(allocation.weights.assets(), vec!["A"]);
        assert_relative_eq!(allocation.weights.sum(), 1.0);
    }

    #[test]
    fn test_non_finite_moments_fail_the_solve() {
        let returns = Panel::new(
            months(2),
            vec!["A".into(), "B".into()],
            array![[0.01, f64::NAN], [0.02, 0.01]],
        )
        .unwrap();
        let config = OptimizerConfig {
            max_weight: 1.0,
            ..Default::default()
        };
        let err = solve_mean_variance(&returns, &config, SolveStage::Full).unwrap_err();
        assert!(matches!(err, RebalanceError::SolverFailure { stage: SolveStage::Full, .. }));
    }

    fn gaussian_returns(periods: usize, assets: usize, seed: u64) -> ReturnMatrix {
        let mut rng = StdRng::seed_from_u64(seed);
        let normal = Normal::new(0.01, 0.05).unwrap();
        let values = Array2::from_shape_fn((periods, assets), |_| normal.sample(&mut rng));
        let names = (0..assets).map(|j| format!("ETF{j:02}")).collect();
        Panel::new(months(periods), names, values).unwrap()
    }

    #[test]
    fn test_random_universe_satisfies_constraints() {
        let returns = gaussian_returns(60, 20, 42);
        let weights = pragmatic_cardinality_mv(&returns, 3.0, 0.2, 10).unwrap();

        assert!(!weights.is_empty());
        assert!(weights.len() <= 10);
        assert_relative_eq!(weights.sum(), 1.0, epsilon = 1e-5);
        for (asset, weight) in weights.iter() {
            assert!(weight <= 0.2 + 1e-4, "{asset} has weight {weight}");
            assert!(weight >= -1e-8, "{asset} has weight {weight}");
            assert!(returns.position(asset).is_some());
        }
    }

    #[test]
    fn test_optimize_is_deterministic() {
        let returns = gaussian_returns(48, 12, 7);
        let optimizer = TwoStageOptimizer::with_config(OptimizerConfig {
            risk_aversion: 3.0,
            max_weight: 0.25,
            max_positions: 5,
            ..Default::default()
        });
        let first = optimizer.optimize(&returns).unwrap();
        let second = optimizer.optimize(&returns).unwrap();
        assert_eq!(first, second);
    }
}
