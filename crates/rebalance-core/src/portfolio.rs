//! Weight vectors and realized portfolio return series.

use crate::{RebalanceError, Result, ReturnMatrix};
use chrono::NaiveDate;
use serde::Serialize;

/// Non-negative allocation per asset.
///
/// Entries keep the order they were built in; [`WeightVector::sorted_descending`]
/// gives the presentation order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WeightVector {
    entries: Vec<(String, f64)>,
}

impl WeightVector {
    /// Build from `(asset, weight)` pairs.
    ///
    /// Weights must be finite and non-negative, assets unique.
    pub fn new(entries: Vec<(String, f64)>) -> Result<Self> {
        if let Some((asset, weight)) = entries.iter().find(|(_, w)| !w.is_finite() || *w < 0.0) {
            return Err(RebalanceError::InvalidConfig(format!(
                "weight for {asset} must be finite and non-negative, got {weight}"
            )));
        }
        for (i, (asset, _)) in entries.iter().enumerate() {
            if entries[..i].iter().any(|(other, _)| other == asset) {
                return Err(RebalanceError::InvalidConfig(format!(
                    "duplicate weight for {asset}"
                )));
            }
        }
        Ok(Self { entries })
    }

    /// Pair assets with weights positionally.
    pub(crate) fn from_parts<S: AsRef<str>>(assets: &[S], weights: &[f64]) -> Self {
        Self {
            entries: assets
                .iter()
                .zip(weights)
                .map(|(asset, weight)| (asset.as_ref().to_string(), *weight))
                .collect(),
        }
    }

    /// Weight of an asset, if present.
    pub fn get(&self, asset: &str) -> Option<f64> {
        self.entries.iter().find(|(a, _)| a == asset).map(|(_, w)| *w)
    }

    /// Iterate over `(asset, weight)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> + '_ {
        self.entries.iter().map(|(a, w)| (a.as_str(), *w))
    }

    /// Asset identifiers in entry order.
    pub fn assets(&self) -> Vec<&str> {
        self.entries.iter().map(|(a, _)| a.as_str()).collect()
    }

    /// Weights in entry order.
    pub fn weights(&self) -> Vec<f64> {
        self.entries.iter().map(|(_, w)| *w).collect()
    }

    /// Number of positions.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when there are no positions.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total weight.
    pub fn sum(&self) -> f64 {
        self.entries.iter().map(|(_, w)| w).sum()
    }

    /// Largest weight, 0 when empty.
    pub fn max_weight(&self) -> f64 {
        self.entries.iter().map(|(_, w)| *w).fold(0.0, f64::max)
    }

    /// Entries ordered by weight, largest first; ties keep entry order.
    #[must_use]
    pub fn sorted_descending(&self) -> Self {
        let mut entries = self.entries.clone();
        entries.sort_by(|a, b| b.1.total_cmp(&a.1));
        Self { entries }
    }

    /// The `k` largest entries, largest first.
    #[must_use]
    pub fn top(&self, k: usize) -> Self {
        let mut sorted = self.sorted_descending();
        sorted.entries.truncate(k);
        sorted
    }

    /// Keep entries strictly above `threshold`.
    #[must_use]
    pub fn above(&self, threshold: f64) -> Self {
        Self {
            entries: self
                .entries
                .iter()
                .filter(|(_, w)| *w > threshold)
                .cloned()
                .collect(),
        }
    }

    /// Rescale to sum to one; `None` when the total is not positive.
    pub fn normalized(&self) -> Option<Self> {
        let total = self.sum();
        (total > 0.0 && total.is_finite()).then(|| Self {
            entries: self
                .entries
                .iter()
                .map(|(a, w)| (a.clone(), w / total))
                .collect(),
        })
    }
}

/// Dated sequence of portfolio returns.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReturnSeries {
    dates: Vec<NaiveDate>,
    values: Vec<f64>,
}

impl ReturnSeries {
    /// Build a series from parallel date and value vectors.
    pub fn new(dates: Vec<NaiveDate>, values: Vec<f64>) -> Result<Self> {
        if dates.len() != values.len() {
            return Err(RebalanceError::DimensionMismatch {
                context: "return series".to_string(),
                expected: dates.len(),
                actual: values.len(),
            });
        }
        Ok(Self { dates, values })
    }

    /// Period labels.
    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    /// Returns per period.
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Number of periods.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True when the series has no periods.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterate over `(date, return)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (NaiveDate, f64)> + '_ {
        self.dates.iter().copied().zip(self.values.iter().copied())
    }
}

/// Realized portfolio returns: per period, the weighted sum of asset returns.
///
/// Missing asset returns contribute nothing to the period's sum. Every
/// weighted asset must be a column of `returns`.
pub fn portfolio_returns(returns: &ReturnMatrix, weights: &WeightVector) -> Result<ReturnSeries> {
    let columns = weights
        .iter()
        .map(|(asset, weight)| {
            returns
                .position(asset)
                .map(|j| (j, weight))
                .ok_or_else(|| RebalanceError::InvalidPanel(format!("no returns for weighted asset {asset}")))
        })
        .collect::<Result<Vec<_>>>()?;

    let values = returns.values();
    let series: Vec<f64> = values
        .rows()
        .into_iter()
        .map(|row| {
            columns
                .iter()
                .map(|&(j, weight)| (row[j], weight))
                .filter(|(r, _)| r.is_finite())
                .map(|(r, w)| r * w)
                .sum()
        })
        .collect();

    ReturnSeries::new(returns.dates().to_vec(), series)
}
