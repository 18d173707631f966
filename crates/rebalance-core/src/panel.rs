//! Dated asset panels.
//!
//! A [`Panel`] is a chronologically ordered table with one row per period and
//! one column per asset. Daily price tables and monthly return matrices share
//! this representation. Missing observations are stored as `NaN`.

use crate::{RebalanceError, Result, calendar::parse_period_date};
use chrono::NaiveDate;
use ndarray::{Array2, ArrayView1, ArrayView2, Axis};
use polars::prelude::*;
use std::collections::{BTreeMap, BTreeSet, HashSet};

/// Name of the period column used when converting to and from DataFrames.
pub const DATE_COLUMN: &str = "date";

/// Chronological table of per-asset observations.
#[derive(Debug, Clone, PartialEq)]
pub struct Panel {
    dates: Vec<NaiveDate>,
    assets: Vec<String>,
    values: Array2<f64>,
}

/// Daily adjusted close prices, one column per asset.
pub type PriceTable = Panel;

/// Periodic simple returns, one column per asset.
pub type ReturnMatrix = Panel;

impl Panel {
    /// Build a panel, checking its invariants.
    ///
    /// Dates must be strictly increasing, asset identifiers unique, and
    /// `values` must have shape `(dates.len(), assets.len())`.
    pub fn new(dates: Vec<NaiveDate>, assets: Vec<String>, values: Array2<f64>) -> Result<Self> {
        if values.nrows() != dates.len() {
            return Err(RebalanceError::DimensionMismatch {
                context: "panel rows".to_string(),
                expected: dates.len(),
                actual: values.nrows(),
            });
        }
        if values.ncols() != assets.len() {
            return Err(RebalanceError::DimensionMismatch {
                context: "panel columns".to_string(),
                expected: assets.len(),
                actual: values.ncols(),
            });
        }
        if let Some(pair) = dates.windows(2).find(|pair| pair[0] >= pair[1]) {
            return Err(RebalanceError::InvalidPanel(format!(
                "dates must be strictly increasing, found {} followed by {}",
                pair[0], pair[1]
            )));
        }
        let mut seen = HashSet::with_capacity(assets.len());
        if let Some(duplicate) = assets.iter().find(|asset| !seen.insert(asset.as_str())) {
            return Err(RebalanceError::InvalidPanel(format!(
                "duplicate asset column: {duplicate}"
            )));
        }

        Ok(Self {
            dates,
            assets,
            values,
        })
    }

    /// A panel with the given assets and no rows.
    pub fn empty(assets: Vec<String>) -> Self {
        let width = assets.len();
        Self {
            dates: Vec::new(),
            assets,
            values: Array2::zeros((0, width)),
        }
    }

    /// Align per-asset series on the union of their dates.
    ///
    /// Periods an asset does not report are filled with `NaN`. When a series
    /// repeats a date, the last value wins.
    pub fn from_series<I>(series: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, Vec<(NaiveDate, f64)>)>,
    {
        let series: Vec<(String, BTreeMap<NaiveDate, f64>)> = series
            .into_iter()
            .map(|(asset, points)| (asset, points.into_iter().collect()))
            .collect();

        let dates: Vec<NaiveDate> = series
            .iter()
            .flat_map(|(_, points)| points.keys().copied())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let mut values = Array2::from_elem((dates.len(), series.len()), f64::NAN);
        for (j, (_, points)) in series.iter().enumerate() {
            for (i, date) in dates.iter().enumerate() {
                if let Some(value) = points.get(date) {
                    values[[i, j]] = *value;
                }
            }
        }

        let assets = series.into_iter().map(|(asset, _)| asset).collect();
        Self::new(dates, assets, values)
    }

    /// Read a panel from a DataFrame with a period column and one numeric
    /// column per asset.
    ///
    /// The period column may hold dates, `YYYY-MM-DD` strings or `YYYYMM`
    /// integers. Rows are sorted chronologically; nulls become `NaN`.
    pub fn from_frame(df: &DataFrame, date_column: &str) -> Result<Self> {
        let raw_dates = df
            .column(date_column)?
            .as_materialized_series()
            .cast(&DataType::String)?;

        let mut dates = Vec::with_capacity(df.height());
        for raw in raw_dates.str()?.into_iter() {
            let raw = raw.ok_or_else(|| {
                RebalanceError::InvalidPanel(format!("null value in column {date_column}"))
            })?;
            dates.push(parse_period_date(raw)?);
        }

        let assets: Vec<String> = df
            .get_column_names()
            .into_iter()
            .filter(|name| name.as_str() != date_column)
            .map(|name| name.to_string())
            .collect();

        let mut values = Array2::from_elem((df.height(), assets.len()), f64::NAN);
        for (j, asset) in assets.iter().enumerate() {
            let column = df
                .column(asset)?
                .as_materialized_series()
                .cast(&DataType::Float64)?;
            for (i, value) in column.f64()?.into_iter().enumerate() {
                values[[i, j]] = value.unwrap_or(f64::NAN);
            }
        }

        let mut order: Vec<usize> = (0..dates.len()).collect();
        order.sort_by_key(|&i| dates[i]);
        let sorted_dates = order.iter().map(|&i| dates[i]).collect();
        let sorted_values = values.select(Axis(0), &order);

        Self::new(sorted_dates, assets, sorted_values)
    }

    /// Period labels, oldest first.
    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    /// Asset identifiers in column order.
    pub fn assets(&self) -> &[String] {
        &self.assets
    }

    /// Observation matrix of shape `(periods, assets)`.
    pub fn values(&self) -> ArrayView2<'_, f64> {
        self.values.view()
    }

    /// Number of periods (rows).
    pub fn n_periods(&self) -> usize {
        self.dates.len()
    }

    /// Number of assets (columns).
    pub fn n_assets(&self) -> usize {
        self.assets.len()
    }

    /// True when the panel has no rows or no columns.
    pub fn is_empty(&self) -> bool {
        self.dates.is_empty() || self.assets.is_empty()
    }

    /// Column index of an asset.
    pub fn position(&self, asset: &str) -> Option<usize> {
        self.assets.iter().position(|a| a == asset)
    }

    /// Observations for one asset.
    pub fn column(&self, asset: &str) -> Option<ArrayView1<'_, f64>> {
        self.position(asset).map(|j| self.values.column(j))
    }

    /// Number of non-missing observations per asset, in column order.
    pub fn observation_counts(&self) -> Vec<usize> {
        self.values
            .columns()
            .into_iter()
            .map(|column| column.iter().filter(|v| v.is_finite()).count())
            .collect()
    }

    /// Restrict to the given assets, in the given order.
    pub fn select<S: AsRef<str>>(&self, assets: &[S]) -> Result<Self> {
        let indices = assets
            .iter()
            .map(|asset| {
                self.position(asset.as_ref()).ok_or_else(|| {
                    RebalanceError::InvalidPanel(format!("unknown asset: {}", asset.as_ref()))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Self::new(
            self.dates.clone(),
            assets.iter().map(|a| a.as_ref().to_string()).collect(),
            self.values.select(Axis(1), &indices),
        )
    }

    /// Keep the columns for which `keep` returns true.
    pub fn retain_columns<F>(&self, mut keep: F) -> Self
    where
        F: FnMut(&str, ArrayView1<'_, f64>) -> bool,
    {
        let indices: Vec<usize> = (0..self.assets.len())
            .filter(|&j| keep(&self.assets[j], self.values.column(j)))
            .collect();

        Self {
            dates: self.dates.clone(),
            assets: indices.iter().map(|&j| self.assets[j].clone()).collect(),
            values: self.values.select(Axis(1), &indices),
        }
    }

    /// Keep the rows for which `keep` returns true.
    pub fn retain_rows<F>(&self, mut keep: F) -> Self
    where
        F: FnMut(NaiveDate, ArrayView1<'_, f64>) -> bool,
    {
        let indices: Vec<usize> = (0..self.dates.len())
            .filter(|&i| keep(self.dates[i], self.values.row(i)))
            .collect();

        Self {
            dates: indices.iter().map(|&i| self.dates[i]).collect(),
            assets: self.assets.clone(),
            values: self.values.select(Axis(0), &indices),
        }
    }

    /// Drop rows where every asset is missing.
    pub fn drop_empty_rows(&self) -> Self {
        self.retain_rows(|_, row| row.iter().any(|v| v.is_finite()))
    }
}
