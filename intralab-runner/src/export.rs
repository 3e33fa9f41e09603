//! CSV and JSON artifacts for backtests and fetched candles.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

use intralab_core::domain::{Candle, TradeRecord, TIME_FORMAT};

use crate::analytics::{PerformanceSummary, TradeSummary};

/// Trade tape, one row per closed round trip.
pub fn export_trades_csv(trades: &[TradeRecord]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([
        "side",
        "entry_bar",
        "entry_time",
        "entry_price",
        "exit_bar",
        "exit_time",
        "exit_price",
        "exit_reason",
        "size",
        "pnl",
        "bars_held",
    ])?;

    for t in trades {
        wtr.write_record([
            &format!("{:?}", t.side),
            &t.entry_bar.to_string(),
            &t.entry_time.to_string(),
            &format!("{:.2}", t.entry_price),
            &t.exit_bar.to_string(),
            &t.exit_time.to_string(),
            &format!("{:.2}", t.exit_price),
            &t.exit_reason.to_string(),
            &format!("{}", t.size),
            &format!("{:.2}", t.pnl),
            &t.bars_held.to_string(),
        ])?;
    }

    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

/// Bar-by-bar equity, stamped with each candle's time.
pub fn export_equity_csv(candles: &[Candle], equity_curve: &[f64]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(["bar_index", "time", "equity"])?;
    for (i, (candle, eq)) in candles.iter().zip(equity_curve).enumerate() {
        wtr.write_record([
            &i.to_string(),
            &candle.timestamp().to_string(),
            &format!("{:.2}", eq),
        ])?;
    }
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

/// Candles in the fetch-script layout, with an open-to-close `Return` column
/// formatted as `x.xx %`.
pub fn export_candles_csv(candles: &[Candle]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([
        "Date", "Time", "Timezone", "Open", "High", "Low", "Close", "Volume", "Return",
    ])?;
    for c in candles {
        wtr.write_record([
            &c.date.format("%Y-%m-%d").to_string(),
            &c.time.format(TIME_FORMAT).to_string(),
            &c.timezone,
            &c.open.to_string(),
            &c.high.to_string(),
            &c.low.to_string(),
            &c.close.to_string(),
            &c.volume.to_string(),
            &format!("{:.2} %", c.return_pct()),
        ])?;
    }
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

/// Write `candles` as CSV next to `artifact` (same stem, `.csv`).
pub fn write_candles_csv(artifact: &Path, candles: &[Candle]) -> Result<PathBuf> {
    let path = artifact.with_extension("csv");
    let csv = export_candles_csv(candles)?;
    fs::write(&path, csv).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(path)
}

#[derive(Debug, Serialize)]
struct SummaryFile<'a> {
    data: &'a Path,
    trades: &'a TradeSummary,
    performance: &'a PerformanceSummary,
    signal_count: usize,
    bar_count: usize,
    rejected_orders: usize,
}

/// Everything written for one backtest.
pub struct BacktestArtifacts<'a> {
    pub data: &'a Path,
    pub candles: &'a [Candle],
    pub trades: &'a [TradeRecord],
    pub equity_curve: &'a [f64],
    pub summary: &'a TradeSummary,
    pub performance: &'a PerformanceSummary,
    pub signal_count: usize,
    pub rejected_orders: usize,
}

/// Save `trades.csv`, `equity.csv` and `summary.json` into
/// `output_dir/{data file stem}/`. Returns the created directory.
pub fn save_artifacts(artifacts: &BacktestArtifacts<'_>, output_dir: &Path) -> Result<PathBuf> {
    let stem = artifacts
        .data
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("backtest");
    let dir = output_dir.join(stem);
    fs::create_dir_all(&dir).with_context(|| format!("failed to create {}", dir.display()))?;

    let trades = export_trades_csv(artifacts.trades)?;
    fs::write(dir.join("trades.csv"), trades).context("failed to write trades.csv")?;

    let equity = export_equity_csv(artifacts.candles, artifacts.equity_curve)?;
    fs::write(dir.join("equity.csv"), equity).context("failed to write equity.csv")?;

    let summary = SummaryFile {
        data: artifacts.data,
        trades: artifacts.summary,
        performance: artifacts.performance,
        signal_count: artifacts.signal_count,
        bar_count: artifacts.candles.len(),
        rejected_orders: artifacts.rejected_orders,
    };
    let json = serde_json::to_string_pretty(&summary).context("failed to serialize summary")?;
    fs::write(dir.join("summary.json"), json).context("failed to write summary.json")?;

    Ok(dir)
}
