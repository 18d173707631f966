//! Monthly Fama-French five-factor file.
//!
//! The file is read from `factor_file`. When it is absent, the monthly block
//! of the Kenneth French library's `F-F_Research_Data_5_Factors_2x3` dataset
//! is downloaded, normalized and written there first.

use crate::{DataError, Result, config::FactorUnits};
use polars::prelude::*;
use rebalance_core::{
    DATE_COLUMN, FactorTable,
    regression::{FACTOR_NAMES, RISK_FREE},
};
use std::fs::{self, File};
use std::io::{Cursor, Read};
use std::path::Path;
use tracing::info;

/// Zipped CSV of the five-factor (2x3) research returns.
pub const FRENCH_FIVE_FACTOR_URL: &str =
    "https://mba.tuck.dartmouth.edu/pages/faculty/ken.french/ftp/F-F_Research_Data_5_Factors_2x3_CSV.zip";

/// Decimal places kept when caching a downloaded table.
const CACHE_FLOAT_PRECISION: usize = 8;

/// Source of the published five-factor CSV body.
pub trait FactorSource {
    /// The unzipped CSV text, monthly block first, values in percent.
    fn five_factor_csv(&self) -> Result<String>;
}

/// Downloads the five-factor dataset from the Kenneth French data library.
#[derive(Debug, Clone)]
pub struct FrenchLibrary {
    client: reqwest::blocking::Client,
    url: String,
}

impl FrenchLibrary {
    /// Client for [`FRENCH_FIVE_FACTOR_URL`].
    pub fn new() -> Result<Self> {
        Self::with_url(FRENCH_FIVE_FACTOR_URL)
    }

    /// Client for a mirror of the zipped CSV.
    pub fn with_url(url: impl Into<String>) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(concat!("etf-rebalancer/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client, url: url.into() })
    }
}

impl FactorSource for FrenchLibrary {
    fn five_factor_csv(&self) -> Result<String> {
        info!(url = %self.url, "downloading factor data");
        let bytes = self.client.get(&self.url).send()?.error_for_status()?.bytes()?;
        extract_csv(&bytes)
    }
}

/// First CSV member of a zip archive, as text.
pub fn extract_csv(bytes: &[u8]) -> Result<String> {
    let mut archive = ::zip::ZipArchive::new(Cursor::new(bytes))?;
    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        if entry.name().to_ascii_lowercase().ends_with(".csv") {
            let mut body = String::new();
            entry.read_to_string(&mut body)?;
            return Ok(body);
        }
    }
    Err(DataError::FactorDownload("archive holds no CSV file".to_string()))
}

/// Load the factor table from a CSV file.
///
/// The period column is `date` when present, otherwise the first column; it
/// may hold `YYYY-MM-DD` dates or `YYYYMM` integers. The five factor columns
/// and `RF` are required, anything else is ignored. Percent values are
/// converted to fractions.
pub fn load_factor_table(path: &Path, units: FactorUnits) -> Result<FactorTable> {
    if !path.exists() {
        return Err(DataError::FactorFileNotFound(path.to_path_buf()));
    }

    let df = CsvReadOptions::default()
        .with_has_header(true)
        .try_into_reader_with_file_path(Some(path.to_path_buf()))?
        .finish()?;

    let df = normalize_factor_frame(df, units, path)?;
    let table = FactorTable::from_frame(&df, DATE_COLUMN)?;
    if let Some((first, last)) = table.span() {
        info!(path = %path.display(), periods = table.len(), %first, %last, %units, "loaded factor table");
    }
    Ok(table)
}

/// Load the factor table, downloading it from `source` into `path` first when
/// the file does not exist.
///
/// The cached file is written in `units` so later runs read it unchanged.
pub fn load_or_fetch_factor_table<S: FactorSource>(
    source: &S,
    path: &Path,
    units: FactorUnits,
) -> Result<FactorTable> {
    if !path.exists() {
        let monthly = parse_french_monthly(&source.five_factor_csv()?, path)?;
        write_factor_cache(monthly, path, units)?;
        info!(path = %path.display(), "cached factor data");
    }
    load_factor_table(path, units)
}

/// Monthly block of a French library CSV body, as fractions with a `date`
/// column of `YYYYMM` periods.
///
/// The block starts at the first `,Mkt-RF,...` header and ends at the first
/// line that is not a `YYYYMM` row; the annual block after it is ignored.
pub fn parse_french_monthly(body: &str, path: &Path) -> Result<DataFrame> {
    let mut lines = body.lines().map(str::trim);
    let header = lines
        .by_ref()
        .find(|line| line.starts_with(",Mkt-RF"))
        .ok_or_else(|| DataError::FactorDownload("no monthly factor header".to_string()))?;

    let mut block = String::from(header);
    block.push('\n');
    let mut rows = 0usize;
    for line in lines {
        let Some((period, _)) = line.split_once(',') else { break };
        if period.len() != 6 || !period.bytes().all(|b| b.is_ascii_digit()) {
            break;
        }
        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        block.push_str(&fields.join(","));
        block.push('\n');
        rows += 1;
    }
    if rows == 0 {
        return Err(DataError::FactorDownload("monthly factor block is empty".to_string()));
    }

    let df = CsvReadOptions::default()
        .with_has_header(true)
        .into_reader_with_file_handle(Cursor::new(block.into_bytes()))
        .finish()?;
    normalize_factor_frame(df, FactorUnits::Percent, path)
}

/// Write a normalized (fraction) factor frame to `path` in `units`.
fn write_factor_cache(df: DataFrame, path: &Path, units: FactorUnits) -> Result<()> {
    let scale = match units {
        FactorUnits::Percent => 100.0,
        FactorUnits::Fraction => 1.0,
    };
    let mut exprs = vec![col(DATE_COLUMN)];
    exprs.extend(
        FACTOR_NAMES
            .iter()
            .copied()
            .chain([RISK_FREE])
            .map(|column| (col(column) * lit(scale)).alias(column)),
    );
    let mut df = df.lazy().select(exprs).collect()?;

    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let mut file = File::create(path)?;
    CsvWriter::new(&mut file)
        .include_header(true)
        .with_float_precision(Some(CACHE_FLOAT_PRECISION))
        .finish(&mut df)?;
    Ok(())
}

/// Keep the period and factor columns, renamed and scaled to fractions.
pub fn normalize_factor_frame(df: DataFrame, units: FactorUnits, path: &Path) -> Result<DataFrame> {
    let names: Vec<String> = df.get_column_names().iter().map(|name| name.to_string()).collect();
    let date_column = names
        .iter()
        .find(|name| name.as_str() == DATE_COLUMN)
        .or_else(|| names.first())
        .cloned()
        .ok_or_else(|| DataError::MissingColumn {
            column: DATE_COLUMN.to_string(),
            path: path.to_path_buf(),
        })?;

    let value_columns: Vec<&str> = FACTOR_NAMES.iter().copied().chain([RISK_FREE]).collect();
    for column in &value_columns {
        if !names.iter().any(|name| name.trim() == *column) {
            return Err(DataError::MissingColumn {
                column: (*column).to_string(),
                path: path.to_path_buf(),
            });
        }
    }

    let scale = match units {
        FactorUnits::Percent => 100.0,
        FactorUnits::Fraction => 1.0,
    };
    let mut df = df;
    if date_column != DATE_COLUMN {
        df.rename(&date_column, DATE_COLUMN.into())?;
    }
    let mut exprs = vec![col(DATE_COLUMN)];
    for column in &value_columns {
        let source = names
            .iter()
            .find(|name| name.trim() == *column)
            .map_or(*column, String::as_str);
        exprs.push((col(source).cast(DataType::Float64) / lit(scale)).alias(*column));
    }

    Ok(df.lazy().select(exprs).collect()?)
}
