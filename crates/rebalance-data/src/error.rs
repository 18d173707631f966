//! Error types for the data collaborators.

use rebalance_core::{ErrorKind, RebalanceError};
use std::path::PathBuf;
use thiserror::Error;

/// Result type for data operations.
pub type Result<T> = std::result::Result<T, DataError>;

/// Errors raised while loading inputs or writing outputs.
#[derive(Debug, Error)]
pub enum DataError {
    /// Error from the computational core
    #[error(transparent)]
    Core(#[from] RebalanceError),

    /// Filesystem error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Polars DataFrame error
    #[error("DataFrame error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    /// Configuration file could not be parsed
    #[error("Invalid configuration file: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// Configuration could not be rendered
    #[error("Failed to render configuration: {0}")]
    TomlRender(#[from] toml::ser::Error),

    /// JSON summary could not be written
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Price download failed
    #[error("Yahoo Finance error: {0}")]
    Yahoo(String),

    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Downloaded archive could not be read
    #[error("Zip archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// Downloaded factor data has an unexpected layout
    #[error("Factor download error: {0}")]
    FactorDownload(String),

    /// Universe file does not exist
    #[error("Universe file not found: {}", .0.display())]
    UniverseNotFound(PathBuf),

    /// Factor file does not exist
    #[error("Factor file not found: {}", .0.display())]
    FactorFileNotFound(PathBuf),

    /// A date could not be parsed or converted
    #[error("Invalid date: {0}")]
    InvalidDate(String),

    /// An input file lacks a required column
    #[error("Missing column {column} in {}", .path.display())]
    MissingColumn {
        /// Column name
        column: String,
        /// File that was read
        path: PathBuf,
    },
}

impl DataError {
    /// Classification of a core error; `None` for file, download and
    /// rendering errors raised here.
    #[must_use]
    pub const fn core_kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Core(e) => Some(e.kind()),
            _ => None,
        }
    }

    /// Returns whether the error comes from the inputs (files, downloads,
    /// configuration) rather than from the optimizer or regression.
    #[must_use]
    pub const fn is_input_error(&self) -> bool {
        matches!(self.core_kind(), None | Some(ErrorKind::Configuration))
    }
}
