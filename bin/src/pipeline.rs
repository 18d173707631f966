//! End-to-end quarterly rebalance.

use chrono::NaiveDate;
use rebalance_core::{
    PortfolioStats, TwoStageOptimizer,
    calendar::{first_trading_day_of_quarter, lookback_start, most_recent_rebalance_date, quarter_label},
    filter_min_observations, monthly_returns, portfolio_returns, run_factor_regression, select_top_n,
};
use rebalance_data::{
    AppConfig, FactorSource, PriceProvider, RebalanceReport, ReportPaths, ReportWriter, Result, UniverseProvider,
    load_or_fetch_factor_table,
};
use tracing::info;

/// Input collaborators of one rebalance run.
pub(crate) struct Sources<'a, U, P, F> {
    pub(crate) universe: &'a U,
    pub(crate) prices: &'a P,
    pub(crate) factors: &'a F,
}

/// Run the rebalance for the quarter containing `asof` and write its outputs.
pub(crate) fn run_rebalance<U, P, F>(
    config: &AppConfig,
    sources: &Sources<'_, U, P, F>,
    asof: NaiveDate,
) -> Result<ReportPaths>
where
    U: UniverseProvider,
    P: PriceProvider,
    F: FactorSource,
{
    let rebalance_date = first_trading_day_of_quarter(asof)?;
    let window_start = lookback_start(rebalance_date, config.selection.lookback_years)?;
    let window_end = rebalance_date;
    let label = quarter_label(rebalance_date);
    info!(%label, %rebalance_date, %window_start, %window_end, "starting rebalance");

    let factors = load_or_fetch_factor_table(sources.factors, &config.data.factor_file, config.data.factor_units)?;
    let tickers = sources.universe.universe()?;
    let price_table = sources.prices.adjusted_close(&tickers, window_start, window_end)?;

    let returns = filter_min_observations(&monthly_returns(&price_table), config.selection.min_observations);
    let candidates = select_top_n(&returns, config.selection.top_n)?;
    let candidate_returns = returns.select(&candidates.assets())?.drop_empty_rows();
    info!(
        universe = tickers.len(),
        priced = price_table.n_assets(),
        eligible = returns.n_assets(),
        candidates = candidates.len(),
        "selected candidates"
    );

    let allocation = TwoStageOptimizer::with_config(config.optimizer.clone()).optimize(&candidate_returns)?;
    let series = portfolio_returns(&candidate_returns, &allocation.weights)?;
    let stats = PortfolioStats::from_returns(series.values());
    let regression = run_factor_regression(&series, &factors)?;

    let report = RebalanceReport {
        label,
        rebalance_date,
        window_start,
        window_end,
        max_positions: config.optimizer.max_positions,
        candidates,
        allocation,
        stats,
        regression,
    };
    ReportWriter::new(&config.data.results_dir).write(&report)
}

/// Rebalance date still to be run as of `today`, or `None` when its weights
/// already exist.
pub(crate) fn pending_rebalance(config: &AppConfig, today: NaiveDate) -> Result<Option<NaiveDate>> {
    let rebalance_date = most_recent_rebalance_date(today)?;
    let label = quarter_label(rebalance_date);
    let weights = ReportWriter::new(&config.data.results_dir).paths(&label).weights;

    if weights.exists() {
        info!(%label, path = %weights.display(), "rebalance already exists");
        return Ok(None);
    }
    info!(%label, %rebalance_date, "rebalance pending");
    Ok(Some(rebalance_date))
}
