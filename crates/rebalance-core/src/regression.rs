//! Five-factor alpha regression.
//!
//! Portfolio excess returns are regressed on the Fama-French five factors
//! with an intercept:
//!
//! `r_p - RF = alpha + b1 MKT + b2 SMB + b3 HML + b4 RMW + b5 CMA + e`
//!
//! The intercept is the monthly alpha; its t-statistic uses the classical
//! OLS standard error `sqrt(s^2 (X'X)^-1_00)` with `s^2 = RSS / (n - 6)`.

use crate::{
    Panel, RebalanceError, Result, ReturnSeries,
    stats::annualize_return,
};
use chrono::{Datelike, NaiveDate};
use nalgebra::{DMatrix, DVector};
use ndarray::Array2;
use polars::prelude::DataFrame;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Factor column names, in regression order.
pub const FACTOR_NAMES: [&str; 5] = ["Mkt-RF", "SMB", "HML", "RMW", "CMA"];

/// Risk-free rate column name.
pub const RISK_FREE: &str = "RF";

/// Regressors including the intercept.
const REGRESSORS: usize = FACTOR_NAMES.len() + 1;

/// Relative pivot size below which `X'X` is treated as singular.
const PIVOT_TOLERANCE: f64 = 1e-10;

/// Monthly factor returns and risk-free rate, as fractions.
#[derive(Debug, Clone, PartialEq)]
pub struct FactorTable {
    periods: Vec<NaiveDate>,
    factors: Array2<f64>,
    risk_free: Vec<f64>,
}

impl FactorTable {
    /// Build a table from periods, a `(periods, 5)` factor matrix in
    /// [`FACTOR_NAMES`] order and the risk-free rate.
    pub fn new(periods: Vec<NaiveDate>, factors: Array2<f64>, risk_free: Vec<f64>) -> Result<Self> {
        if factors.ncols() != FACTOR_NAMES.len() {
            return Err(RebalanceError::DimensionMismatch {
                context: "factor columns".to_string(),
                expected: FACTOR_NAMES.len(),
                actual: factors.ncols(),
            });
        }
        for (context, actual) in [("factor rows", factors.nrows()), ("risk-free rows", risk_free.len())] {
            if actual != periods.len() {
                return Err(RebalanceError::DimensionMismatch {
                    context: context.to_string(),
                    expected: periods.len(),
                    actual,
                });
            }
        }
        // Regression rows are matched by calendar month.
        let mut months = HashSet::with_capacity(periods.len());
        if let Some(duplicate) = periods.iter().find(|date| !months.insert((date.year(), date.month()))) {
            return Err(RebalanceError::InvalidPanel(format!(
                "factor table has more than one row for {}-{:02}",
                duplicate.year(),
                duplicate.month()
            )));
        }
        Ok(Self {
            periods,
            factors,
            risk_free,
        })
    }

    /// Pick the factor and risk-free columns out of a panel.
    pub fn from_panel(panel: &Panel) -> Result<Self> {
        let mut columns = Vec::with_capacity(REGRESSORS);
        for name in FACTOR_NAMES.iter().chain(std::iter::once(&RISK_FREE)) {
            columns.push(panel.position(name).ok_or_else(|| {
                RebalanceError::InvalidPanel(format!("factor table is missing column {name}"))
            })?);
        }
        let values = panel.values();
        let factors = Array2::from_shape_fn((panel.n_periods(), FACTOR_NAMES.len()), |(i, k)| {
            values[[i, columns[k]]]
        });
        let risk_free = values.column(columns[FACTOR_NAMES.len()]).to_vec();

        Self::new(panel.dates().to_vec(), factors, risk_free)
    }

    /// Read a table from a DataFrame with a period column, the five factor
    /// columns and `RF`, already expressed as fractions.
    pub fn from_frame(df: &DataFrame, date_column: &str) -> Result<Self> {
        Self::from_panel(&Panel::from_frame(df, date_column)?)
    }

    /// Period labels.
    pub fn periods(&self) -> &[NaiveDate] {
        &self.periods
    }

    /// Number of periods.
    pub fn len(&self) -> usize {
        self.periods.len()
    }

    /// True when the table has no periods.
    pub fn is_empty(&self) -> bool {
        self.periods.is_empty()
    }

    /// First and last period, if any.
    pub fn span(&self) -> Option<(NaiveDate, NaiveDate)> {
        self.periods.first().copied().zip(self.periods.last().copied())
    }
}

/// Alpha estimate from the factor regression.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegressionResult {
    /// Intercept, monthly
    pub alpha_monthly: f64,
    /// Intercept compounded to a year: `(1 + alpha)^12 - 1`
    pub alpha_annualized: f64,
    /// t-statistic of the intercept
    pub alpha_tstat: f64,
    /// Observations used
    pub n_obs: usize,
    /// Factor loadings in [`FACTOR_NAMES`] order
    pub betas: Vec<(String, f64)>,
    /// Coefficient of determination
    pub r_squared: f64,
}

/// Regress portfolio excess returns on the five factors.
///
/// Periods are matched by calendar month; months missing from either side or
/// holding a non-finite value are skipped.
pub fn run_factor_regression(portfolio: &ReturnSeries, factors: &FactorTable) -> Result<RegressionResult> {
    let by_month: HashMap<(i32, u32), usize> = factors
        .periods
        .iter()
        .enumerate()
        .map(|(i, date)| ((date.year(), date.month()), i))
        .collect();

    let mut rows: Vec<usize> = Vec::new();
    let mut excess: Vec<f64> = Vec::new();
    for (date, value) in portfolio.iter() {
        let Some(&i) = by_month.get(&(date.year(), date.month())) else {
            continue;
        };
        let risk_free = factors.risk_free[i];
        let complete = value.is_finite()
            && risk_free.is_finite()
            && factors.factors.row(i).iter().all(|f| f.is_finite());
        if complete {
            rows.push(i);
            excess.push(value - risk_free);
        }
    }

    let n = rows.len();
    if n == 0 {
        return Err(RebalanceError::EmptySample);
    }
    if n <= REGRESSORS {
        return Err(RebalanceError::RegressionSample {
            required: REGRESSORS + 1,
            available: n,
        });
    }

    let x = DMatrix::from_fn(n, REGRESSORS, |r, c| {
        if c == 0 { 1.0 } else { factors.factors[[rows[r], c - 1]] }
    });
    let y = DVector::from_vec(excess);

    let xt = x.transpose();
    let gram = &xt * &x;
    let max_diagonal = gram.diagonal().max();
    let cholesky = gram
        .cholesky()
        .ok_or(RebalanceError::RankDeficient { columns: REGRESSORS })?;
    let min_pivot = cholesky.l_dirty().diagonal().min();
    if min_pivot * min_pivot <= PIVOT_TOLERANCE * max_diagonal {
        return Err(RebalanceError::RankDeficient { columns: REGRESSORS });
    }

    let coefficients = cholesky.solve(&(&xt * &y));
    let residuals = &y - &x * &coefficients;
    let rss = residuals.norm_squared();
    let y_mean = y.mean();
    let tss: f64 = y.iter().map(|v| (v - y_mean).powi(2)).sum();

    let sigma2 = rss / (n - REGRESSORS) as f64;
    let inverse = cholesky.inverse();
    let alpha = coefficients[0];
    let alpha_se = (sigma2 * inverse[(0, 0)]).sqrt();

    let result = RegressionResult {
        alpha_monthly: alpha,
        alpha_annualized: annualize_return(alpha),
        alpha_tstat: alpha / alpha_se,
        n_obs: n,
        betas: FACTOR_NAMES
            .iter()
            .enumerate()
            .map(|(k, name)| ((*name).to_string(), coefficients[k + 1]))
            .collect(),
        r_squared: if tss > 0.0 { 1.0 - rss / tss } else { f64::NAN },
    };

    debug!(
        n_obs = n,
        alpha = result.alpha_monthly,
        tstat = result.alpha_tstat,
        "fitted factor regression"
    );
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::Months;
    use rand::{SeedableRng, rngs::StdRng};
    use rand_distr::{Distribution, Normal};
    use rstest::rstest;

    fn month_ends(n: usize) -> Vec<NaiveDate> {
        (0..n)
            .map(|i| {
                NaiveDate::from_ymd_opt(2020, 1, 31)
                    .unwrap()
                    .checked_add_months(Months::new(u32::try_from(i).unwrap()))
                    .unwrap()
            })
            .collect()
    }

    fn synthetic_factors(n: usize, rng: &mut StdRng) -> FactorTable {
        let market = Normal::new(0.005, 0.02).unwrap();
        let style = Normal::new(0.0, 0.01).unwrap();
        let factors = Array2::from_shape_fn((n, 5), |(_, k)| {
            if k == 0 { market.sample(rng) } else { style.sample(rng) }
        });
        FactorTable::new(month_ends(n), factors, vec![0.001; n]).unwrap()
    }

    #[test]
    fn test_recovers_alpha_and_beta() {
        let mut rng = StdRng::seed_from_u64(0);
        let n = 120;
        let table = synthetic_factors(n, &mut rng);
        let noise = Normal::new(0.0, 0.002).unwrap();

        let values: Vec<f64> = (0..n)
            .map(|i| 0.002 + 0.8 * table.factors[[i, 0]] + table.risk_free[i] + noise.sample(&mut rng))
            .collect();
        let portfolio = ReturnSeries::new(month_ends(n), values).unwrap();

        let result = run_factor_regression(&portfolio, &table).unwrap();
        assert_eq!(result.n_obs, n);
        // Standard error of alpha is roughly 0.002 / sqrt(120) ~ 0.0002.
        assert!((result.alpha_monthly - 0.002).abs() < 0.001);
        assert!((result.betas[0].1 - 0.8).abs() < 0.05);
        assert!(result.alpha_tstat.is_finite());
        assert!(result.alpha_tstat > 2.0);
        assert_relative_eq!(
            result.alpha_annualized,
            (1.0 + result.alpha_monthly).powi(12) - 1.0,
            epsilon = 1e-12
        );
        assert!(result.r_squared > 0.9);
    }

    #[test]
    fn test_joins_on_month_and_skips_missing() {
        let mut rng = StdRng::seed_from_u64(7);
        let n = 36;
        let table = synthetic_factors(n, &mut rng);

        // Portfolio dated mid-month, one period missing and one beyond the table.
        let dates: Vec<NaiveDate> = month_ends(n + 1)
            .into_iter()
            .map(|d| d.with_day(15).unwrap())
            .collect();
        let mut values: Vec<f64> = (0..=n).map(|i| 0.01 + 0.001 * (i % 5) as f64).collect();
        values[3] = f64::NAN;
        let portfolio = ReturnSeries::new(dates, values).unwrap();

        let result = run_factor_regression(&portfolio, &table).unwrap();
        assert_eq!(result.n_obs, n - 1);
    }

    #[test]
    fn test_empty_join_fails() {
        let mut rng = StdRng::seed_from_u64(1);
        let table = synthetic_factors(12, &mut rng);
        let dates = vec![NaiveDate::from_ymd_opt(1999, 1, 31).unwrap()];
        let portfolio = ReturnSeries::new(dates, vec![0.01]).unwrap();

        let err = run_factor_regression(&portfolio, &table).unwrap_err();
        assert!(matches!(err, RebalanceError::EmptySample));
        assert!(err.is_regression_failure());
    }

    #[rstest]
    #[case(5)]
    #[case(6)]
    fn test_too_few_observations_is_fatal(#[case] n: usize) {
        let mut rng = StdRng::seed_from_u64(2);
        let table = synthetic_factors(n, &mut rng);
        let portfolio = ReturnSeries::new(month_ends(n), vec![0.01; n]).unwrap();

        let err = run_factor_regression(&portfolio, &table).unwrap_err();
        assert!(matches!(err, RebalanceError::RegressionSample { required: 7, available } if available == n));
        assert!(err.is_regression_failure());
        assert!(err.is_fatal());
        assert_eq!(err.kind(), crate::ErrorKind::Regression);
    }

    #[test]
    fn test_duplicate_month_rejected() {
        let periods = vec![
            NaiveDate::from_ymd_opt(2024, 1, 30).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
            NaiveDate::from_ymd_opt(2024, 2, 29).unwrap(),
        ];
        let err = FactorTable::new(periods, Array2::zeros((3, 5)), vec![0.0; 3]).unwrap_err();
        assert!(matches!(err, RebalanceError::InvalidPanel(msg) if msg.contains("2024-01")));
    }

    #[test]
    fn test_constant_factor_is_rank_deficient() {
        let n = 24;
        let factors = Array2::from_shape_fn((n, 5), |(i, k)| if k == 2 { 0.01 } else { (i * (k + 1)) as f64 * 1e-3 });
        let table = FactorTable::new(month_ends(n), factors, vec![0.0; n]).unwrap();
        let portfolio = ReturnSeries::new(month_ends(n), vec![0.01; n]).unwrap();

        assert!(matches!(
            run_factor_regression(&portfolio, &table),
            Err(RebalanceError::RankDeficient { columns: 6 })
        ));
    }

    #[test]
    fn test_from_panel_requires_all_columns() {
        let panel = Panel::new(
            month_ends(1),
            vec!["Mkt-RF".into(), "RF".into()],
            ndarray::array![[0.01, 0.001]],
        )
        .unwrap();
        assert!(matches!(
            FactorTable::from_panel(&panel),
            Err(RebalanceError::InvalidPanel(_))
        ));
    }
}
