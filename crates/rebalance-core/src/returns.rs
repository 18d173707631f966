//! Price-to-return transforms and history filters.

use crate::{Panel, RebalanceError, Result, ReturnMatrix, calendar::month_end, panel::PriceTable};
use chrono::{Datelike, NaiveDate};
use ndarray::Array2;
use tracing::{debug, info};

/// Monthly simple returns from a daily price table.
///
/// For each calendar month the last non-missing price per asset is taken; the
/// return for month `m` is `p(m) / p(m-1) - 1` when both months have a price
/// and missing otherwise. Rows are labelled with the last calendar day of the
/// month. Rows without a single valid return are dropped, so the first month
/// of the table never appears. An empty table yields an empty matrix.
pub fn monthly_returns(prices: &PriceTable) -> ReturnMatrix {
    if prices.n_periods() == 0 {
        return Panel::empty(prices.assets().to_vec());
    }

    let values = prices.values();
    let mut months: Vec<NaiveDate> = Vec::new();
    let mut month_closes: Vec<Vec<f64>> = Vec::new();

    for (i, date) in prices.dates().iter().enumerate() {
        let label = month_end(date.year(), date.month()).unwrap_or(*date);
        if months.last() != Some(&label) {
            months.push(label);
            month_closes.push(vec![f64::NAN; prices.n_assets()]);
        }
        if let Some(closes) = month_closes.last_mut() {
            for (close, price) in closes.iter_mut().zip(values.row(i)) {
                if price.is_finite() {
                    *close = *price;
                }
            }
        }
    }

    let n_returns = months.len().saturating_sub(1);
    let mut returns = Array2::from_elem((n_returns, prices.n_assets()), f64::NAN);
    for m in 1..months.len() {
        for j in 0..prices.n_assets() {
            let previous = month_closes[m - 1][j];
            let current = month_closes[m][j];
            if previous.is_finite() && current.is_finite() && previous != 0.0 {
                returns[[m - 1, j]] = current / previous - 1.0;
            }
        }
    }

    let dates = months.into_iter().skip(1).collect();
    // Months are distinct and increasing because the price dates are.
    match Panel::new(dates, prices.assets().to_vec(), returns) {
        Ok(panel) => {
            let panel = panel.drop_empty_rows();
            debug!(
                periods = panel.n_periods(),
                assets = panel.n_assets(),
                "computed monthly returns"
            );
            panel
        }
        Err(_) => Panel::empty(prices.assets().to_vec()),
    }
}

/// Check that an asset has at least `required` observations.
pub const fn require_observations(available: usize, required: usize) -> Result<()> {
    if available < required {
        return Err(RebalanceError::InsufficientData { required, available });
    }
    Ok(())
}

/// Remove assets with fewer than `min_observations` non-missing returns.
///
/// Entirely missing columns are always removed. Short histories are excluded
/// here rather than reported as failures.
pub fn filter_min_observations(returns: &ReturnMatrix, min_observations: usize) -> ReturnMatrix {
    let required = min_observations.max(1);
    let mut counts = returns.observation_counts().into_iter();
    let mut dropped: Vec<String> = Vec::new();

    let eligible = returns.retain_columns(|asset, _| {
        let available = counts.next().unwrap_or(0);
        match require_observations(available, required) {
            Ok(()) => true,
            Err(e) => {
                debug!(%asset, reason = %e, "excluding asset");
                dropped.push(asset.to_string());
                false
            }
        }
    });

    if !dropped.is_empty() {
        info!(
            excluded = dropped.len(),
            min_observations = required,
            assets = ?dropped,
            "excluded assets with insufficient history"
        );
    }

    eligible
}
