//! Job wiring: config + data source → backfill, config + candles → backtest.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{info, warn};

use intralab_core::data::{
    ArtifactError, ArtifactStore, Backfill, BackfillPlan, BackfillProgress, BackfillReport,
    CandleSource, MissingRangeLog, Pacer,
};
use intralab_core::domain::{Candle, DateRange};
use intralab_core::engine::{run_strategy, EngineError, RunResult};

use crate::analytics::{PerformanceSummary, TradeSummary};
use crate::config::{ConfigError, IntraLabConfig};
use crate::data_loader::{load_candles, LoadError};
use crate::export::{save_artifacts, write_candles_csv, BacktestArtifacts};
use crate::report::render_report;

/// Errors from the runner.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("data error: {0}")]
    Data(#[from] LoadError),
    #[error("artifact error: {0}")]
    Artifact(#[from] ArtifactError),
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),
    #[error("no candle input: pass --data, set [backtest] data, or run a backfill into {0}")]
    NoInput(PathBuf),
    #[error("export failed: {0}")]
    Export(String),
}

// ─── Backfill ───────────────────────────────────────────────────────

/// Which ranges a backfill job covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackfillMode {
    /// `[backfill] start_year .. end_year`.
    Configured,
    /// An explicit span, still split into chunks.
    Span(DateRange),
    /// Exactly the ranges recorded in the missing-range log.
    RetryMissing,
}

/// A backfill ready to run: plan, target ranges and output locations.
pub struct BackfillJob {
    plan: BackfillPlan,
    ranges: Vec<DateRange>,
    retry_missing: bool,
    store: ArtifactStore,
    log: MissingRangeLog,
    write_csv: bool,
}

/// What a backfill job produced.
#[derive(Debug)]
pub struct BackfillSummary {
    pub report: BackfillReport,
    pub artifact: Option<PathBuf>,
    pub csv: Option<PathBuf>,
    pub log_path: PathBuf,
}

impl BackfillJob {
    /// Resolve ranges without touching the network or the log file.
    pub fn prepare(config: &IntraLabConfig, mode: BackfillMode) -> Result<Self, RunError> {
        let output_dir = &config.backfill.output_dir;
        let log = MissingRangeLog::in_dir(output_dir);

        let (plan, ranges, retry_missing) = match mode {
            BackfillMode::Configured => {
                let plan = config.backfill_plan()?;
                let ranges = plan.chunks();
                (plan, ranges, false)
            }
            BackfillMode::Span(span) => {
                let plan = config.backfill_plan_for(span)?;
                let ranges = plan.chunks();
                (plan, ranges, false)
            }
            BackfillMode::RetryMissing => {
                let ranges = log.read()?;
                (config.backfill_plan()?, ranges, true)
            }
        };

        Ok(Self {
            plan,
            ranges,
            retry_missing,
            store: ArtifactStore::new(output_dir),
            log,
            write_csv: false,
        })
    }

    /// Also write the merged series as CSV next to the Parquet artifact.
    pub fn with_csv(mut self, write_csv: bool) -> Self {
        self.write_csv = write_csv;
        self
    }

    pub fn plan(&self) -> &BackfillPlan {
        &self.plan
    }

    pub fn ranges(&self) -> &[DateRange] {
        &self.ranges
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Fetch every range, then persist the artifact and the missing-range log.
    ///
    /// In retry mode the log stays untouched until the artifact is written,
    /// then holds only the ranges that are still missing.
    pub fn run(
        &self,
        source: &dyn CandleSource,
        pacer: &dyn Pacer,
        progress: &dyn BackfillProgress,
    ) -> Result<BackfillSummary, RunError> {
        if self.retry_missing {
            let logged = self.log.read()?;
            if logged != self.ranges {
                warn!(
                    prepared = self.ranges.len(),
                    logged = logged.len(),
                    "missing-range log changed since the job was prepared"
                );
            }
        }

        let report = Backfill::new(source, pacer, progress).run_ranges(&self.plan, &self.ranges);

        let instrument = &self.plan.instrument;
        let artifact = if self.retry_missing {
            report.persist_resumed(instrument, &self.store, &self.log)?
        } else {
            report.persist(instrument, &self.store, &self.log)?
        };
        let csv = match (&artifact, self.write_csv) {
            (Some(path), true) => Some(
                write_candles_csv(path, report.series.candles())
                    .map_err(|e| RunError::Export(format!("{e:#}")))?,
            ),
            _ => None,
        };

        info!(
            fetched = report.chunks_fetched(),
            total = report.chunks_total(),
            missing = report.missing.len(),
            candles = report.series.len(),
            "backfill job complete"
        );

        Ok(BackfillSummary {
            report,
            artifact,
            csv,
            log_path: self.log.path().to_path_buf(),
        })
    }
}

// ─── Backtest ───────────────────────────────────────────────────────

/// Result of replaying one candle file through the strategy.
#[derive(Debug)]
pub struct BacktestOutcome {
    pub data: PathBuf,
    pub candles: Vec<Candle>,
    pub run: RunResult,
    pub summary: TradeSummary,
    pub performance: PerformanceSummary,
}

impl BacktestOutcome {
    pub fn report(&self) -> String {
        render_report(&self.summary, &self.performance)
    }

    /// Write trades, equity and summary files under `output_dir`.
    pub fn save(&self, output_dir: &Path) -> Result<PathBuf, RunError> {
        let artifacts = BacktestArtifacts {
            data: &self.data,
            candles: &self.candles,
            trades: &self.run.trades,
            equity_curve: &self.run.equity_curve,
            summary: &self.summary,
            performance: &self.performance,
            signal_count: self.run.signal_count,
            rejected_orders: self.run.rejected_orders,
        };
        save_artifacts(&artifacts, output_dir).map_err(|e| RunError::Export(format!("{e:#}")))
    }
}

/// Pick the candle input: an explicit path, then `[backtest] data`, then the
/// artifact with the most candles for the configured instrument.
pub fn resolve_data_path(
    config: &IntraLabConfig,
    explicit: Option<&Path>,
) -> Result<PathBuf, RunError> {
    if let Some(path) = explicit.or(config.backtest.data.as_deref()) {
        return Ok(path.to_path_buf());
    }
    let store = ArtifactStore::new(&config.backfill.output_dir);
    store
        .most_complete(&config.instrument())?
        .ok_or_else(|| RunError::NoInput(config.backfill.output_dir.clone()))
}

/// Load `data` and run the configured strategy over it.
pub fn run_backtest(config: &IntraLabConfig, data: &Path) -> Result<BacktestOutcome, RunError> {
    let candles = load_candles(data)?;
    backtest_candles(config, data.to_path_buf(), candles)
}

/// Run the configured strategy over already-loaded candles.
pub fn backtest_candles(
    config: &IntraLabConfig,
    data: PathBuf,
    candles: Vec<Candle>,
) -> Result<BacktestOutcome, RunError> {
    let params = config.strategy_params();
    let run_config = config.run_config();
    let run = run_strategy(&candles, &params, &run_config)?;

    let summary = TradeSummary::from_trades(&run.trades);
    let performance = PerformanceSummary::compute(&run.equity_curve, run.initial_cash);
    info!(
        trades = summary.total,
        win_probability = summary.win_probability,
        final_value = performance.final_value,
        "backtest complete"
    );

    Ok(BacktestOutcome {
        data,
        candles,
        run,
        summary,
        performance,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn config_in(dir: &Path) -> IntraLabConfig {
        let mut config = IntraLabConfig::default();
        config.backfill.output_dir = dir.to_path_buf();
        config
    }

    #[test]
    fn configured_mode_covers_the_year_span() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_in(dir.path());
        config.backfill.start_year = 2024;
        config.backfill.end_year = 2025;
        let job = BackfillJob::prepare(&config, BackfillMode::Configured).unwrap();
        assert_eq!(job.ranges().len(), 13);
        assert_eq!(job.ranges()[0].from, d(2024, 1, 1));
    }

    #[test]
    fn span_mode_uses_the_given_window() {
        let dir = tempfile::tempdir().unwrap();
        let span = DateRange::new(d(2025, 1, 1), d(2025, 1, 31)).unwrap();
        let job = BackfillJob::prepare(&config_in(dir.path()), BackfillMode::Span(span)).unwrap();
        assert_eq!(job.ranges(), &[span]);
    }

    #[test]
    fn retry_mode_reads_without_consuming_the_log() {
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("missing_data.log");
        std::fs::write(&log_path, "Missing data: 2024-01-31 to 2024-03-01\n").unwrap();

        let job = BackfillJob::prepare(&config_in(dir.path()), BackfillMode::RetryMissing).unwrap();
        assert_eq!(
            job.ranges(),
            &[DateRange::new(d(2024, 1, 31), d(2024, 3, 1)).unwrap()]
        );
        assert!(log_path.exists());
    }

    #[test]
    fn retry_mode_with_no_log_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let job = BackfillJob::prepare(&config_in(dir.path()), BackfillMode::RetryMissing).unwrap();
        assert!(job.is_empty());
    }

    #[test]
    fn explicit_data_path_wins() {
        let mut config = IntraLabConfig::default();
        config.backtest.data = Some(PathBuf::from("from_config.csv"));
        assert_eq!(
            resolve_data_path(&config, Some(Path::new("cli.csv"))).unwrap(),
            PathBuf::from("cli.csv")
        );
        assert_eq!(
            resolve_data_path(&config, None).unwrap(),
            PathBuf::from("from_config.csv")
        );
    }

    #[test]
    fn no_input_anywhere_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = resolve_data_path(&config_in(dir.path()), None).unwrap_err();
        assert!(matches!(err, RunError::NoInput(_)));
    }
}
