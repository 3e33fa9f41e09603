//! Candle loading for backtests.
//!
//! Accepts either a Parquet artifact written by a backfill run or a CSV with
//! `Date`, `Time`, optional `Timezone`, `Open`, `High`, `Low`, `Close` and
//! optional `Volume` columns (header names are matched case-insensitively;
//! extra columns such as `Return` are ignored). Missing volume reads as zero.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{NaiveDate, NaiveTime};
use thiserror::Error;
use tracing::{info, warn};

use intralab_core::data::{load_artifact, ArtifactError};
use intralab_core::domain::{Candle, TIME_FORMAT};

/// Errors from the data loading layer.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to open {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("CSV error in {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("{path}: missing required column '{column}'")]
    MissingColumn { path: PathBuf, column: &'static str },

    #[error("{path}: row {row}: {reason}")]
    BadRow {
        path: PathBuf,
        row: usize,
        reason: String,
    },

    #[error(transparent)]
    Artifact(#[from] ArtifactError),

    #[error("unsupported input '{0}': expected a .parquet or .csv file")]
    UnsupportedFormat(PathBuf),

    #[error("no candles in {0}")]
    Empty(PathBuf),
}

/// On-disk candle formats the loader understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    Parquet,
    Csv,
}

impl InputFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "parquet" => Some(InputFormat::Parquet),
            "csv" => Some(InputFormat::Csv),
            _ => None,
        }
    }
}

/// Load a candle series from `path`, dispatching on the file extension.
///
/// The result is strictly increasing in time; an empty file is an error.
pub fn load_candles(path: &Path) -> Result<Vec<Candle>, LoadError> {
    let format = InputFormat::from_path(path)
        .ok_or_else(|| LoadError::UnsupportedFormat(path.to_path_buf()))?;

    let candles = match format {
        InputFormat::Parquet => load_artifact(path)?,
        InputFormat::Csv => {
            let file = File::open(path).map_err(|source| LoadError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            read_candles_csv(file, path)?
        }
    };

    if candles.is_empty() {
        return Err(LoadError::Empty(path.to_path_buf()));
    }
    info!(
        path = %path.display(),
        candles = candles.len(),
        first = %candles[0].timestamp(),
        last = %candles[candles.len() - 1].timestamp(),
        "loaded candles"
    );
    Ok(candles)
}

/// Column positions resolved from the CSV header.
struct Columns {
    date: usize,
    time: usize,
    timezone: Option<usize>,
    open: usize,
    high: usize,
    low: usize,
    close: usize,
    volume: Option<usize>,
}

impl Columns {
    fn resolve(headers: &csv::StringRecord, path: &Path) -> Result<Self, LoadError> {
        let find = |name: &str| {
            headers
                .iter()
                .position(|h| h.trim().eq_ignore_ascii_case(name))
        };
        let require = |name: &'static str| {
            find(name).ok_or_else(|| LoadError::MissingColumn {
                path: path.to_path_buf(),
                column: name,
            })
        };
        Ok(Self {
            date: require("date")?,
            time: require("time")?,
            timezone: find("timezone"),
            open: require("open")?,
            high: require("high")?,
            low: require("low")?,
            close: require("close")?,
            volume: find("volume"),
        })
    }
}

/// Parse candles from CSV text. `source` is used only in error messages.
///
/// Rows are sorted by timestamp and repeated timestamps keep their first row.
pub fn read_candles_csv<R: io::Read>(reader: R, source: &Path) -> Result<Vec<Candle>, LoadError> {
    let csv_err = |e: csv::Error| LoadError::Csv {
        path: source.to_path_buf(),
        source: e,
    };

    let mut rdr = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
    let headers = rdr.headers().map_err(csv_err)?.clone();
    let cols = Columns::resolve(&headers, source)?;

    let mut candles = Vec::new();
    for (i, record) in rdr.records().enumerate() {
        let record = record.map_err(csv_err)?;
        // Header is line 1.
        let row = i + 2;
        let candle = parse_row(&record, &cols).map_err(|reason| LoadError::BadRow {
            path: source.to_path_buf(),
            row,
            reason,
        })?;
        candles.push(candle);
    }

    let before = candles.len();
    candles.sort_by_key(Candle::timestamp);
    candles.dedup_by_key(|c| c.timestamp());
    if candles.len() < before {
        warn!(
            path = %source.display(),
            dropped = before - candles.len(),
            "dropped rows with repeated timestamps"
        );
    }
    Ok(candles)
}

fn parse_row(record: &csv::StringRecord, cols: &Columns) -> Result<Candle, String> {
    let field = |idx: usize, name: &str| {
        record
            .get(idx)
            .map(str::trim)
            .ok_or_else(|| format!("missing {name} field"))
    };
    let price = |idx: usize, name: &str| -> Result<f64, String> {
        let raw = field(idx, name)?;
        raw.parse::<f64>()
            .map_err(|_| format!("{name} '{raw}' is not a number"))
    };

    let date_raw = field(cols.date, "date")?;
    let date = NaiveDate::parse_from_str(date_raw, "%Y-%m-%d")
        .map_err(|_| format!("date '{date_raw}' is not YYYY-MM-DD"))?;
    let time = parse_time(field(cols.time, "time")?)?;

    let timezone = match cols.timezone {
        Some(idx) => record.get(idx).map(str::trim).unwrap_or("").to_string(),
        None => String::new(),
    };
    let volume = match cols.volume.and_then(|idx| record.get(idx)).map(str::trim) {
        None | Some("") => 0,
        Some(raw) => parse_volume(raw).ok_or_else(|| format!("volume '{raw}' is invalid"))?,
    };

    Ok(Candle {
        date,
        time,
        timezone,
        open: price(cols.open, "open")?,
        high: price(cols.high, "high")?,
        low: price(cols.low, "low")?,
        close: price(cols.close, "close")?,
        volume,
    })
}

fn parse_time(raw: &str) -> Result<NaiveTime, String> {
    NaiveTime::parse_from_str(raw, TIME_FORMAT)
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M"))
        .map_err(|_| format!("time '{raw}' is not HH:MM[:SS]"))
}

/// Whole-number volume, accepting a trailing `.0` as pandas writes it.
fn parse_volume(raw: &str) -> Option<u64> {
    if let Ok(v) = raw.parse::<u64>() {
        return Some(v);
    }
    let v = raw.parse::<f64>().ok()?;
    (v.is_finite() && v >= 0.0 && v.fract() == 0.0).then_some(v as u64)
}
