//! Rebalance outputs: weights CSV, markdown report and JSON summary.

use crate::Result;
use chrono::{Datelike, NaiveDate};
use polars::prelude::*;
use rebalance_core::{Allocation, PortfolioStats, RegressionResult, Selection, WeightVector};
use serde::Serialize;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::info;

/// Everything produced by one rebalance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RebalanceReport {
    /// Quarter label, e.g. `2024Q2`
    pub label: String,
    /// First trading day of the quarter
    pub rebalance_date: NaiveDate,
    /// Start of the estimation window
    pub window_start: NaiveDate,
    /// End of the estimation window (exclusive)
    pub window_end: NaiveDate,
    /// Position limit the weights were built under
    pub max_positions: usize,
    /// Ranked candidates with trailing compounded returns
    pub candidates: Selection,
    /// Stage-1 weights, the assets carried into stage 2, and the final weights
    pub allocation: Allocation,
    /// In-sample statistics of the weighted portfolio
    pub stats: PortfolioStats,
    /// Five-factor regression of the weighted portfolio
    pub regression: RegressionResult,
}

/// Files written for one rebalance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportPaths {
    /// `weights_{label}.csv`
    pub weights: PathBuf,
    /// `report_{label}.md`
    pub report: PathBuf,
    /// `summary_{label}.json`
    pub summary: PathBuf,
}

/// Writes rebalance outputs into a results directory.
#[derive(Debug, Clone)]
pub struct ReportWriter {
    dir: PathBuf,
}

impl ReportWriter {
    /// Write into `dir`, creating it on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Results directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Paths of the outputs for `label`.
    pub fn paths(&self, label: &str) -> ReportPaths {
        ReportPaths {
            weights: self.dir.join(format!("weights_{label}.csv")),
            report: self.dir.join(format!("report_{label}.md")),
            summary: self.dir.join(format!("summary_{label}.json")),
        }
    }

    /// Write all three outputs.
    pub fn write(&self, report: &RebalanceReport) -> Result<ReportPaths> {
        fs::create_dir_all(&self.dir)?;
        let paths = self.paths(&report.label);

        write_weights_csv(&report.allocation.weights, &paths.weights)?;
        fs::write(&paths.report, render_markdown(report))?;
        fs::write(&paths.summary, serde_json::to_string_pretty(report)?)?;

        info!(
            weights = %paths.weights.display(),
            report = %paths.report.display(),
            summary = %paths.summary.display(),
            "saved rebalance outputs"
        );
        Ok(paths)
    }
}

/// Write `ticker,weight` rows.
pub fn write_weights_csv(weights: &WeightVector, path: &Path) -> Result<()> {
    let mut df = DataFrame::new(vec![
        Column::new("ticker".into(), weights.assets()),
        Column::new("weight".into(), weights.weights()),
    ])?;
    let mut file = File::create(path)?;
    CsvWriter::new(&mut file).include_header(true).finish(&mut df)?;
    Ok(())
}

fn percent(value: f64, decimals: usize) -> String {
    format!("{:.*}%", decimals, value * 100.0)
}

/// Human-readable summary of a rebalance.
pub fn render_markdown(report: &RebalanceReport) -> String {
    let stats = &report.stats;
    let regression = &report.regression;
    let mut lines = vec![
        format!("# Rebalance Report {}", report.label),
        String::new(),
        format!("- Rebalance date: {}", report.rebalance_date),
        format!("- Window: {} to {}", report.window_start, report.window_end),
        String::new(),
        format!(
            "## Top {} ETFs by trailing {}Y compounded return",
            report.candidates.len(),
            window_years(report)
        ),
    ];
    lines.extend(
        report
            .candidates
            .iter()
            .map(|ranked| format!("- {}: {}", ranked.asset, percent(ranked.score, 2))),
    );

    lines.push(String::new());
    lines.push(format!(
        "## Final portfolio weights (<= {} ETFs)",
        report.max_positions
    ));
    lines.extend(
        report
            .allocation
            .weights
            .iter()
            .map(|(asset, weight)| format!("- {asset}: {}", percent(weight, 2))),
    );

    let allocation = &report.allocation;
    lines.push(String::new());
    lines.push(format!(
        "## Optimizer stages ({} candidates, {} carried into stage 2)",
        allocation.full.len(),
        allocation.selected.len()
    ));
    lines.extend(allocation.selected.iter().map(|asset| {
        format!(
            "- {asset}: stage 1 {}, stage 2 {}",
            percent(allocation.full.get(asset).unwrap_or(0.0), 2),
            percent(allocation.reduced.get(asset).unwrap_or(0.0), 2)
        )
    }));

    lines.extend([
        String::new(),
        "## In-sample metrics".to_string(),
        format!("- Expected return (monthly): {}", percent(stats.mean_monthly, 4)),
        format!("- Volatility (monthly): {}", percent(stats.vol_monthly, 4)),
        format!("- Sharpe (monthly): {:.4}", stats.sharpe_monthly),
        format!("- Expected return (annualized): {}", percent(stats.mean_annual, 4)),
        format!("- Volatility (annualized): {}", percent(stats.vol_annual, 4)),
        format!("- Sharpe (annualized): {:.4}", stats.sharpe_annual),
        String::new(),
        "## Fama-French 5-factor alpha".to_string(),
        format!("- Alpha (monthly): {}", percent(regression.alpha_monthly, 4)),
        format!("- Alpha (annualized): {}", percent(regression.alpha_annualized, 4)),
        format!("- Alpha t-stat: {:.4}", regression.alpha_tstat),
        format!("- Regression observations: {}", regression.n_obs),
        format!("- R-squared: {:.4}", regression.r_squared),
    ]);
    lines.extend(
        regression
            .betas
            .iter()
            .map(|(factor, beta)| format!("- Beta {factor}: {beta:.4}")),
    );

    lines.extend([
        String::new(),
        "## Notes / limitations".to_string(),
        "- Adjusted close from Yahoo Finance is used as a proxy for total return.".to_string(),
        "- The universe may carry survivorship bias depending on how the ticker list is maintained."
            .to_string(),
        "- Data quality and missing observations can affect rankings and optimization.".to_string(),
        "- Optimization is a pragmatic two-stage approximation of the cardinality constraint."
            .to_string(),
        String::new(),
    ]);

    lines.join("\n")
}

fn window_years(report: &RebalanceReport) -> i32 {
    report.window_end.year() - report.window_start.year()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rebalance_core::{Panel, select_top_n};

    fn sample_report() -> RebalanceReport {
        let dates = vec![
            NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
            NaiveDate::from_ymd_opt(2024, 2, 29).unwrap(),
        ];
        let returns = Panel::new(
            dates,
            vec!["SPY".into(), "TLT".into()],
            ndarray::array![[0.02, -0.01], [0.01, 0.03]],
        )
        .unwrap();

        RebalanceReport {
            label: "2024Q2".to_string(),
            rebalance_date: NaiveDate::from_ymd_opt(2024, 4, 1).unwrap(),
            window_start: NaiveDate::from_ymd_opt(2019, 4, 1).unwrap(),
            window_end: NaiveDate::from_ymd_opt(2024, 4, 1).unwrap(),
            max_positions: 10,
            candidates: select_top_n(&returns, 2).unwrap(),
            allocation: Allocation {
                full: WeightVector::new(vec![("SPY".into(), 0.55), ("TLT".into(), 0.45)]).unwrap(),
                selected: vec!["SPY".into(), "TLT".into()],
                reduced: WeightVector::new(vec![("SPY".into(), 0.6), ("TLT".into(), 0.4)]).unwrap(),
                weights: WeightVector::new(vec![("SPY".into(), 0.6), ("TLT".into(), 0.4)]).unwrap(),
            },
            stats: PortfolioStats::from_returns(&[0.008, 0.018]),
            regression: RegressionResult {
                alpha_monthly: 0.001,
                alpha_annualized: 1.001f64.powi(12) - 1.0,
                alpha_tstat: 1.25,
                n_obs: 59,
                betas: vec![("Mkt-RF".into(), 0.9)],
                r_squared: 0.8,
            },
        }
    }

    #[test]
    fn test_markdown_sections() {
        let markdown = render_markdown(&sample_report());
        assert!(markdown.starts_with("# Rebalance Report 2024Q2"));
        assert!(markdown.contains("## Top 2 ETFs by trailing 5Y compounded return"));
        assert!(markdown.contains("- SPY: 60.00%"));
        assert!(markdown.contains("## Final portfolio weights (<= 10 ETFs)"));
        assert!(markdown.contains("## Optimizer stages (2 candidates, 2 carried into stage 2)"));
        assert!(markdown.contains("- TLT: stage 1 45.00%, stage 2 40.00%"));
        assert!(markdown.contains("- Alpha (monthly): 0.1000%"));
        assert!(markdown.contains("- Regression observations: 59"));
        assert!(markdown.contains("## Notes / limitations"));
    }

    #[test]
    fn test_writes_all_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ReportWriter::new(dir.path().join("results"));
        let paths = writer.write(&sample_report()).unwrap();

        assert_eq!(paths, writer.paths("2024Q2"));
        let csv = fs::read_to_string(&paths.weights).unwrap();
        let mut lines = csv.lines();
        assert_eq!(lines.next(), Some("ticker,weight"));
        assert_eq!(lines.next(), Some("SPY,0.6"));
        assert_eq!(lines.next(), Some("TLT,0.4"));

        let summary: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&paths.summary).unwrap()).unwrap();
        assert_eq!(summary["label"], "2024Q2");
        assert_eq!(summary["regression"]["n_obs"], 59);
        assert_eq!(summary["allocation"]["selected"], serde_json::json!(["SPY", "TLT"]));
        assert_eq!(summary["allocation"]["full"]["entries"][1][1], 0.45);
        assert!(paths.report.exists());
    }
}
