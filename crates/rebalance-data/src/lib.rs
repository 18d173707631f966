#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/etf-rebalancer/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod factors;
pub mod prices;
pub mod report;
pub mod universe;

// Re-export collaborator types
pub use config::{AppConfig, DataSettings, FactorUnits, SelectionSettings, load_config};
pub use error::{DataError, Result};
pub use factors::{FactorSource, FrenchLibrary, load_factor_table, load_or_fetch_factor_table};
pub use prices::{PriceProvider, YahooPriceProvider};
pub use report::{RebalanceReport, ReportPaths, ReportWriter};
pub use universe::{FileUniverse, UniverseProvider};
