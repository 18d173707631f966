//! Sample moments and realized portfolio statistics.

use crate::ReturnMatrix;
use ndarray::{Array1, Array2};
use serde::Serialize;

/// Periods per year for monthly data.
pub const PERIODS_PER_YEAR: i32 = 12;

/// Compound a per-period return to an annual one: `(1 + r)^12 - 1`.
pub fn annualize_return(periodic: f64) -> f64 {
    (1.0 + periodic).powi(PERIODS_PER_YEAR) - 1.0
}

/// Scale a per-period volatility to an annual one: `sigma * sqrt(12)`.
pub fn annualize_volatility(periodic: f64) -> f64 {
    periodic * f64::from(PERIODS_PER_YEAR).sqrt()
}

/// Mean of the finite values; `NaN` when there are none.
pub fn mean(values: &[f64]) -> f64 {
    let (sum, count) = values
        .iter()
        .filter(|v| v.is_finite())
        .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    if count == 0 { f64::NAN } else { sum / count as f64 }
}

/// Sample standard deviation (one delta degree of freedom) of the finite
/// values; `NaN` with fewer than two.
pub fn sample_std(values: &[f64]) -> f64 {
    let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.len() < 2 {
        return f64::NAN;
    }
    let m = mean(&finite);
    let ss: f64 = finite.iter().map(|v| (v - m).powi(2)).sum();
    (ss / (finite.len() - 1) as f64).sqrt()
}

/// Per-asset mean return, skipping missing periods.
pub fn column_means(returns: &ReturnMatrix) -> Array1<f64> {
    returns
        .values()
        .columns()
        .into_iter()
        .map(|column| mean(&column.to_vec()))
        .collect()
}

/// Sample covariance matrix using pairwise-complete observations.
///
/// Each entry uses the periods where both assets have a return, with one
/// delta degree of freedom; pairs with fewer than two common periods are
/// `NaN`.
pub fn sample_covariance(returns: &ReturnMatrix) -> Array2<f64> {
    let values = returns.values();
    let n = values.ncols();
    let mut cov = Array2::from_elem((n, n), f64::NAN);

    for a in 0..n {
        for b in a..n {
            let pairs: Vec<(f64, f64)> = values
                .column(a)
                .iter()
                .zip(values.column(b).iter())
                .filter(|(x, y)| x.is_finite() && y.is_finite())
                .map(|(x, y)| (*x, *y))
                .collect();
            if pairs.len() < 2 {
                continue;
            }
            let count = pairs.len() as f64;
            let mean_a = pairs.iter().map(|p| p.0).sum::<f64>() / count;
            let mean_b = pairs.iter().map(|p| p.1).sum::<f64>() / count;
            let cross: f64 = pairs.iter().map(|(x, y)| (x - mean_a) * (y - mean_b)).sum();
            let value = cross / (count - 1.0);
            cov[[a, b]] = value;
            cov[[b, a]] = value;
        }
    }

    cov
}

/// Risk and return summary of a realized monthly return series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PortfolioStats {
    /// Mean monthly return
    pub mean_monthly: f64,
    /// Monthly volatility (sample standard deviation)
    pub vol_monthly: f64,
    /// Monthly Sharpe ratio, `NaN` when volatility is zero
    pub sharpe_monthly: f64,
    /// Compounded annual return
    pub mean_annual: f64,
    /// Annualized volatility
    pub vol_annual: f64,
    /// Annualized Sharpe ratio, `NaN` when volatility is zero
    pub sharpe_annual: f64,
}

impl PortfolioStats {
    /// Compute statistics for a monthly return series.
    ///
    /// Sharpe ratios are raw (no risk-free adjustment).
    pub fn from_returns(returns: &[f64]) -> Self {
        let mean_monthly = mean(returns);
        let vol_monthly = sample_std(returns);
        let mean_annual = annualize_return(mean_monthly);
        let vol_annual = annualize_volatility(vol_monthly);

        Self {
            mean_monthly,
            vol_monthly,
            sharpe_monthly: ratio(mean_monthly, vol_monthly),
            mean_annual,
            vol_annual,
            sharpe_annual: ratio(mean_annual, vol_annual),
        }
    }
}

fn ratio(numerator: f64, volatility: f64) -> f64 {
    if volatility > 0.0 {
        numerator / volatility
    } else {
        f64::NAN
    }
}
