//! Universe of candidate tickers.

use crate::{DataError, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Source of the candidate ticker list.
pub trait UniverseProvider {
    /// Upper-cased, unique tickers in file order.
    fn universe(&self) -> Result<Vec<String>>;
}

/// Ticker list stored in a file.
///
/// `.csv` files contribute their first column, skipping a `ticker` or
/// `symbol` header; any other file is read one ticker per line. Blank lines
/// and lines starting with `#` are ignored.
#[derive(Debug, Clone)]
pub struct FileUniverse {
    path: PathBuf,
}

impl FileUniverse {
    /// Read tickers from `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the ticker file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn is_csv(&self) -> bool {
        self.path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"))
    }
}

impl UniverseProvider for FileUniverse {
    fn universe(&self) -> Result<Vec<String>> {
        if !self.path.exists() {
            return Err(DataError::UniverseNotFound(self.path.clone()));
        }
        let tickers = parse_tickers(&fs::read_to_string(&self.path)?, self.is_csv());
        debug!(path = %self.path.display(), count = tickers.len(), "loaded universe");
        Ok(tickers)
    }
}

/// Extract tickers from file content.
pub fn parse_tickers(content: &str, csv: bool) -> Vec<String> {
    let mut tickers: Vec<String> = Vec::new();
    let mut first = true;

    for line in content.lines().map(str::trim) {
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let field = if csv {
            line.split(',').next().unwrap_or_default().trim().trim_matches('"').trim()
        } else {
            line
        };
        let is_header = first
            && csv
            && (field.eq_ignore_ascii_case("ticker") || field.eq_ignore_ascii_case("symbol"));
        first = false;
        if field.is_empty() || is_header {
            continue;
        }

        let ticker = field.to_uppercase();
        if !tickers.contains(&ticker) {
            tickers.push(ticker);
        }
    }

    tickers
}
