//! Parquet artifact for a merged backfill series.
//!
//! Layout: `{dir}/{SYMBOL}_{INTERVAL}_{first}_{last}.parquet` plus a
//! `{...}.meta.json` sidecar carrying the BLAKE3 hash of the candles.
//! Writes are atomic (write to .tmp, rename into place).

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use super::provider::Instrument;
use crate::domain::{is_strictly_increasing, Candle, TIME_FORMAT};

const COLUMNS: [&str; 8] = [
    "date", "time", "timezone", "open", "high", "low", "close", "volume",
];

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parquet error: {0}")]
    Parquet(String),

    #[error("artifact validation failed: {0}")]
    Validation(String),

    #[error("metadata error: {0}")]
    Meta(String),

    #[error("nothing to write: series is empty")]
    Empty,
}

impl ArtifactError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        ArtifactError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Sidecar describing one artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactMeta {
    pub symbol: String,
    pub interval: String,
    pub first_date: NaiveDate,
    pub last_date: NaiveDate,
    pub candle_count: usize,
    pub data_hash: String,
    pub written_at: NaiveDateTime,
}

/// Directory holding backfill artifacts.
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// `{symbol}_{interval}_{first}_{last}.parquet`
    pub fn file_name(instrument: &Instrument, first: NaiveDate, last: NaiveDate) -> String {
        format!(
            "{}_{}_{}_{}.parquet",
            instrument.symbol,
            instrument.interval,
            first.format("%Y-%m-%d"),
            last.format("%Y-%m-%d")
        )
    }

    pub fn meta_path(path: &Path) -> PathBuf {
        path.with_extension("meta.json")
    }

    /// Write `candles` as one artifact covering `[first, last]`.
    pub fn write(
        &self,
        instrument: &Instrument,
        first: NaiveDate,
        last: NaiveDate,
        candles: &[Candle],
    ) -> Result<PathBuf, ArtifactError> {
        if candles.is_empty() {
            return Err(ArtifactError::Empty);
        }
        fs::create_dir_all(&self.dir).map_err(|e| ArtifactError::io(&self.dir, e))?;

        let path = self.dir.join(Self::file_name(instrument, first, last));
        let tmp_path = path.with_extension("parquet.tmp");

        let mut df = candles_to_dataframe(candles)?;
        write_parquet(&mut df, &tmp_path)?;
        fs::rename(&tmp_path, &path).map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            ArtifactError::io(&path, e)
        })?;

        let meta = ArtifactMeta {
            symbol: instrument.symbol.clone(),
            interval: instrument.interval.to_string(),
            first_date: first,
            last_date: last,
            candle_count: candles.len(),
            data_hash: hash_candles(candles)?,
            written_at: chrono::Local::now().naive_local(),
        };
        let meta_json = serde_json::to_string_pretty(&meta)
            .map_err(|e| ArtifactError::Meta(format!("serialize: {e}")))?;
        let meta_path = Self::meta_path(&path);
        fs::write(&meta_path, meta_json).map_err(|e| ArtifactError::io(&meta_path, e))?;

        info!(path = %path.display(), candles = candles.len(), "artifact written");
        Ok(path)
    }

    /// Artifacts in the store for `instrument`, sorted by file name.
    pub fn list(&self, instrument: &Instrument) -> Result<Vec<PathBuf>, ArtifactError> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let prefix = format!("{}_{}_", instrument.symbol, instrument.interval);
        let entries = fs::read_dir(&self.dir).map_err(|e| ArtifactError::io(&self.dir, e))?;

        let mut paths = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| ArtifactError::io(&self.dir, e))?.path();
            let matches = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(&prefix) && n.ends_with(".parquet"));
            if matches {
                paths.push(path);
            }
        }
        paths.sort();
        Ok(paths)
    }

    /// The artifact holding the most candles for `instrument`; ties go to the
    /// most recently written. Files without a readable sidecar rank last.
    pub fn most_complete(&self, instrument: &Instrument) -> Result<Option<PathBuf>, ArtifactError> {
        let mut best: Option<(Option<(usize, NaiveDateTime)>, PathBuf)> = None;
        for path in self.list(instrument)? {
            let rank = match read_meta(&path) {
                Ok(meta) => meta.map(|m| (m.candle_count, m.written_at)),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "ignoring unreadable sidecar");
                    None
                }
            };
            if best.as_ref().map_or(true, |(top, _)| rank >= *top) {
                best = Some((rank, path));
            }
        }
        Ok(best.map(|(_, path)| path))
    }
}

/// Read the sidecar next to an artifact, if there is one.
pub fn read_meta(path: &Path) -> Result<Option<ArtifactMeta>, ArtifactError> {
    let meta_path = ArtifactStore::meta_path(path);
    if !meta_path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(&meta_path).map_err(|e| ArtifactError::io(&meta_path, e))?;
    serde_json::from_str(&content)
        .map(Some)
        .map_err(|e| ArtifactError::Meta(format!("{}: {e}", meta_path.display())))
}

/// Load and validate an artifact. When a sidecar is present its hash must match.
pub fn load_artifact(path: &Path) -> Result<Vec<Candle>, ArtifactError> {
    let file = fs::File::open(path).map_err(|e| ArtifactError::io(path, e))?;
    let df = ParquetReader::new(file)
        .finish()
        .map_err(|e| ArtifactError::Parquet(format!("read {}: {e}", path.display())))?;

    if df.height() == 0 {
        return Err(ArtifactError::Validation("empty parquet file".into()));
    }
    for name in COLUMNS {
        if df.column(name).is_err() {
            return Err(ArtifactError::Validation(format!("missing column '{name}'")));
        }
    }

    let candles = dataframe_to_candles(&df)?;
    if !is_strictly_increasing(&candles) {
        return Err(ArtifactError::Validation(
            "timestamps are not strictly increasing".into(),
        ));
    }

    if let Some(meta) = read_meta(path)? {
        let hash = hash_candles(&candles)?;
        if hash != meta.data_hash {
            return Err(ArtifactError::Validation(format!(
                "hash mismatch: sidecar {} vs data {hash}",
                meta.data_hash
            )));
        }
    }
    Ok(candles)
}

fn hash_candles(candles: &[Candle]) -> Result<String, ArtifactError> {
    let bytes =
        serde_json::to_vec(candles).map_err(|e| ArtifactError::Meta(format!("hash input: {e}")))?;
    Ok(blake3::hash(&bytes).to_hex().to_string())
}

// ── Parquet I/O helpers ─────────────────────────────────────────────

fn epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or_default()
}

fn candles_to_dataframe(candles: &[Candle]) -> Result<DataFrame, ArtifactError> {
    let epoch = epoch();
    let dates: Vec<i32> = candles
        .iter()
        .map(|c| (c.date - epoch).num_days() as i32)
        .collect();
    let times: Vec<String> = candles
        .iter()
        .map(|c| c.time.format(TIME_FORMAT).to_string())
        .collect();
    let zones: Vec<String> = candles.iter().map(|c| c.timezone.clone()).collect();
    let opens: Vec<f64> = candles.iter().map(|c| c.open).collect();
    let highs: Vec<f64> = candles.iter().map(|c| c.high).collect();
    let lows: Vec<f64> = candles.iter().map(|c| c.low).collect();
    let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
    let volumes: Vec<u64> = candles.iter().map(|c| c.volume).collect();

    DataFrame::new(vec![
        Column::new("date".into(), dates)
            .cast(&DataType::Date)
            .map_err(|e| ArtifactError::Parquet(format!("date cast: {e}")))?,
        Column::new("time".into(), times),
        Column::new("timezone".into(), zones),
        Column::new("open".into(), opens),
        Column::new("high".into(), highs),
        Column::new("low".into(), lows),
        Column::new("close".into(), closes),
        Column::new("volume".into(), volumes),
    ])
    .map_err(|e| ArtifactError::Parquet(format!("dataframe creation: {e}")))
}

fn write_parquet(df: &mut DataFrame, path: &Path) -> Result<(), ArtifactError> {
    let file = fs::File::create(path).map_err(|e| ArtifactError::io(path, e))?;
    ParquetWriter::new(file)
        .finish(df)
        .map_err(|e| ArtifactError::Parquet(format!("write: {e}")))?;
    Ok(())
}

fn dataframe_to_candles(df: &DataFrame) -> Result<Vec<Candle>, ArtifactError> {
    let col = |name: &str| {
        df.column(name)
            .map_err(|e| ArtifactError::Parquet(format!("column {name}: {e}")))
    };
    let type_err = |name: &str, e: PolarsError| {
        ArtifactError::Validation(format!("{name} column type: {e}"))
    };

    let date_ca = col("date")?.date().map_err(|e| type_err("date", e))?;
    let time_ca = col("time")?.str().map_err(|e| type_err("time", e))?;
    let zone_ca = col("timezone")?.str().map_err(|e| type_err("timezone", e))?;
    let open_ca = col("open")?.f64().map_err(|e| type_err("open", e))?;
    let high_ca = col("high")?.f64().map_err(|e| type_err("high", e))?;
    let low_ca = col("low")?.f64().map_err(|e| type_err("low", e))?;
    let close_ca = col("close")?.f64().map_err(|e| type_err("close", e))?;
    let vol_ca = col("volume")?.u64().map_err(|e| type_err("volume", e))?;

    let epoch = epoch();
    let n = df.height();
    let mut candles = Vec::with_capacity(n);

    for i in 0..n {
        let null = |name: &str| ArtifactError::Validation(format!("null {name} at row {i}"));
        let days = date_ca.get(i).ok_or_else(|| null("date"))?;
        let raw_time = time_ca.get(i).ok_or_else(|| null("time"))?;
        let time = NaiveTime::parse_from_str(raw_time, TIME_FORMAT)
            .map_err(|e| ArtifactError::Validation(format!("bad time '{raw_time}' at row {i}: {e}")))?;

        candles.push(Candle {
            date: epoch + chrono::Duration::days(i64::from(days)),
            time,
            timezone: zone_ca.get(i).unwrap_or_default().to_string(),
            open: open_ca.get(i).ok_or_else(|| null("open"))?,
            high: high_ca.get(i).ok_or_else(|| null("high"))?,
            low: low_ca.get(i).ok_or_else(|| null("low"))?,
            close: close_ca.get(i).ok_or_else(|| null("close"))?,
            volume: vol_ca.get(i).unwrap_or(0),
        });
    }
    Ok(candles)
}
