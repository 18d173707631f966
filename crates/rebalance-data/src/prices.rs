//! Adjusted close prices.

use crate::{DataError, Result};
use chrono::{DateTime, NaiveDate, NaiveTime};
use indicatif::{ProgressBar, ProgressStyle};
use rebalance_core::PriceTable;
use std::collections::BTreeMap;
use std::fmt;
use time::OffsetDateTime;
use tokio::runtime::{Builder, Runtime};
use tracing::{info, warn};
use yahoo_finance_api as yahoo;

/// Source of daily adjusted close prices.
pub trait PriceProvider {
    /// Daily adjusted closes for `tickers` on `start <= date < end`.
    ///
    /// Tickers without data are omitted from the table rather than failing
    /// the call.
    fn adjusted_close(&self, tickers: &[String], start: NaiveDate, end: NaiveDate) -> Result<PriceTable>;
}

/// Downloads adjusted closes from Yahoo Finance, one ticker at a time.
pub struct YahooPriceProvider {
    connector: yahoo::YahooConnector,
    runtime: Runtime,
    show_progress: bool,
}

impl fmt::Debug for YahooPriceProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("YahooPriceProvider")
            .field("show_progress", &self.show_progress)
            .finish_non_exhaustive()
    }
}

impl YahooPriceProvider {
    /// Create a provider with its own single-threaded runtime.
    pub fn new() -> Result<Self> {
        let connector = yahoo::YahooConnector::new().map_err(|e| DataError::Yahoo(e.to_string()))?;
        let runtime = Builder::new_current_thread().enable_all().build()?;
        Ok(Self {
            connector,
            runtime,
            show_progress: true,
        })
    }

    /// Toggle the download progress bar.
    #[must_use]
    pub const fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    fn progress_bar(&self, len: usize) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        let bar = ProgressBar::new(len as u64);
        if let Ok(style) = ProgressStyle::with_template("{spinner} [{bar:40}] {pos}/{len} {msg}") {
            bar.set_style(style.progress_chars("=> "));
        }
        bar
    }

    fn history(&self, ticker: &str, start: OffsetDateTime, end: OffsetDateTime) -> Result<Vec<(NaiveDate, f64)>> {
        let response = self
            .runtime
            .block_on(self.connector.get_quote_history(ticker, start, end))
            .map_err(|e| DataError::Yahoo(format!("{ticker}: {e}")))?;
        let quotes = response
            .quotes()
            .map_err(|e| DataError::Yahoo(format!("{ticker}: {e}")))?;

        // Later quotes for the same session replace earlier ones.
        let points: BTreeMap<NaiveDate, f64> = quotes
            .iter()
            .filter_map(|quote| {
                let seconds = i64::try_from(quote.timestamp).ok()?;
                let date = DateTime::from_timestamp(seconds, 0)?.date_naive();
                quote.adjclose.is_finite().then_some((date, quote.adjclose))
            })
            .collect();
        Ok(points.into_iter().collect())
    }
}

impl PriceProvider for YahooPriceProvider {
    fn adjusted_close(&self, tickers: &[String], start: NaiveDate, end: NaiveDate) -> Result<PriceTable> {
        let from = to_offset_datetime(start)?;
        let to = to_offset_datetime(end)?;
        let bar = self.progress_bar(tickers.len());

        let mut series = Vec::with_capacity(tickers.len());
        let mut failed = Vec::new();
        for ticker in tickers {
            bar.set_message(ticker.clone());
            match self.history(ticker, from, to) {
                Ok(points) => {
                    let points: Vec<(NaiveDate, f64)> =
                        points.into_iter().filter(|(date, _)| *date >= start && *date < end).collect();
                    if points.is_empty() {
                        failed.push(ticker.clone());
                    } else {
                        series.push((ticker.clone(), points));
                    }
                }
                Err(e) => {
                    warn!(%ticker, error = %e, "price download failed");
                    failed.push(ticker.clone());
                }
            }
            bar.inc(1);
        }
        bar.finish_and_clear();

        if !failed.is_empty() {
            warn!(count = failed.len(), tickers = ?failed, "omitting tickers without prices");
        }
        info!(fetched = series.len(), requested = tickers.len(), %start, %end, "downloaded prices");
        Ok(PriceTable::from_series(series)?)
    }
}

/// Midnight UTC of `date`.
fn to_offset_datetime(date: NaiveDate) -> Result<OffsetDateTime> {
    let seconds = date.and_time(NaiveTime::MIN).and_utc().timestamp();
    OffsetDateTime::from_unix_timestamp(seconds).map_err(|e| DataError::InvalidDate(format!("{date}: {e}")))
}
