//! TOML configuration for a rebalance run.
//!
//! Every field has a default, so an absent file or an empty table is a valid
//! configuration:
//!
//! ```toml
//! [optimizer]
//! risk_aversion = 5.0
//! max_weight = 0.2
//! max_positions = 10
//!
//! [selection]
//! top_n = 50
//! min_observations = 12
//! lookback_years = 5
//!
//! [data]
//! universe_file = "ETF_universe.csv"
//! factor_file = "data/ff5_monthly.csv"
//! factor_units = "percent"
//! results_dir = "results"
//! ```

use crate::{DataError, Result};
use derive_more::Display;
use rebalance_core::{OptimizerConfig, RebalanceError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Configuration file read when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "rebalancer.toml";

/// Complete configuration of a rebalance run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Optimizer parameters
    pub optimizer: OptimizerConfig,
    /// Candidate selection parameters
    pub selection: SelectionSettings,
    /// Input and output locations
    pub data: DataSettings,
}

/// Candidate selection parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionSettings {
    /// Candidates kept by trailing return (default: 50)
    pub top_n: usize,
    /// Monthly returns an asset needs to be eligible (default: 12)
    pub min_observations: usize,
    /// Length of the estimation window in years (default: 5)
    pub lookback_years: u32,
}

impl Default for SelectionSettings {
    fn default() -> Self {
        Self {
            top_n: 50,
            min_observations: 12,
            lookback_years: 5,
        }
    }
}

/// Scale of the values in the factor file.
#[derive(Debug, Display, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FactorUnits {
    /// Percent, as published by the Kenneth French data library
    #[default]
    #[display("percent")]
    Percent,
    /// Already fractional returns
    #[display("fraction")]
    Fraction,
}

/// Input and output locations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataSettings {
    /// Ticker list, `.csv` (first column) or plain text
    pub universe_file: PathBuf,
    /// Monthly five-factor CSV
    pub factor_file: PathBuf,
    /// Scale of the factor file values
    pub factor_units: FactorUnits,
    /// Directory receiving weights, reports and summaries
    pub results_dir: PathBuf,
}

impl Default for DataSettings {
    fn default() -> Self {
        Self {
            universe_file: PathBuf::from("ETF_universe.csv"),
            factor_file: PathBuf::from("data/ff5_monthly.csv"),
            factor_units: FactorUnits::Percent,
            results_dir: PathBuf::from("results"),
        }
    }
}

impl AppConfig {
    /// Check every parameter range.
    pub fn validate(&self) -> Result<()> {
        self.optimizer.validate()?;
        let invalid = |message: &str| DataError::Core(RebalanceError::InvalidConfig(message.to_string()));
        if self.selection.top_n == 0 {
            return Err(invalid("top_n must be positive"));
        }
        if self.selection.min_observations == 0 {
            return Err(invalid("min_observations must be positive"));
        }
        if self.selection.lookback_years == 0 {
            return Err(invalid("lookback_years must be positive"));
        }
        Ok(())
    }

    /// Parse and validate a TOML document.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Render as a TOML document.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Write the configuration to a TOML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        fs::write(path, self.to_toml()?)?;
        Ok(())
    }
}

/// Load the configuration at `path`, or [`DEFAULT_CONFIG_FILE`] when `None`.
///
/// A missing file yields the defaults.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    let path = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));
    if !path.exists() {
        info!(path = %path.display(), "configuration file not found, using defaults");
        return Ok(AppConfig::default());
    }

    info!(path = %path.display(), "loading configuration");
    AppConfig::from_toml(&fs::read_to_string(path)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.optimizer.max_positions, 10);
        assert_eq!(config.selection.top_n, 50);
        assert_eq!(config.selection.min_observations, 12);
        assert_eq!(config.data.factor_units, FactorUnits::Percent);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_document_keeps_defaults() {
        let config = AppConfig::from_toml(
            r#"
            [optimizer]
            max_weight = 0.25

            [data]
            factor_units = "fraction"
            "#,
        )
        .unwrap();
        assert!((config.optimizer.max_weight - 0.25).abs() < f64::EPSILON);
        assert!((config.optimizer.risk_aversion - 5.0).abs() < f64::EPSILON);
        assert_eq!(config.data.factor_units, FactorUnits::Fraction);
        assert_eq!(config.data.results_dir, PathBuf::from("results"));
    }

    #[test]
    fn test_round_trip() {
        let mut config = AppConfig::default();
        config.selection.top_n = 30;
        config.optimizer.solver.max_iterations = 500;
        let parsed = AppConfig::from_toml(&config.to_toml().unwrap()).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_rejects_invalid_values() {
        assert!(AppConfig::from_toml("[selection]\ntop_n = 0").is_err());
        assert!(AppConfig::from_toml("[optimizer]\nmax_weight = 1.5").is_err());
        assert!(matches!(
            AppConfig::from_toml("[data]\nfactor_units = \"basis\""),
            Err(DataError::TomlParse(_))
        ));
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(Some(&dir.path().join("absent.toml"))).unwrap();
        assert_eq!(config, AppConfig::default());
    }
}
