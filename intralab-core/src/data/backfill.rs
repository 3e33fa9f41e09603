//! Backfill orchestrator: walks a multi-year span in fixed chunks, fetching each
//! with retries, merging the results and recording ranges that could not be
//! recovered.

use std::path::PathBuf;
use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use tracing::{error, info};

use super::artifact::{ArtifactError, ArtifactStore};
use super::missing_log::MissingRangeLog;
use super::provider::{CandleRequest, CandleSource, Instrument};
use super::retry::{fetch_with_retry, Pacer, RetryOutcome, RetryPolicy};
use crate::domain::{Candle, DateRange, MissingRange};

/// Trading-session bounds used for each request window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl Default for SessionWindow {
    fn default() -> Self {
        Self {
            start: NaiveTime::from_hms_opt(9, 0, 0).unwrap_or(NaiveTime::MIN),
            end: NaiveTime::from_hms_opt(15, 30, 0).unwrap_or(NaiveTime::MIN),
        }
    }
}

impl SessionWindow {
    /// `fromdate`/`todate` for a half-open chunk: first day at session start,
    /// last day inside the chunk at session end.
    pub fn bounds(&self, range: &DateRange) -> (NaiveDateTime, NaiveDateTime) {
        (
            range.from.and_time(self.start),
            range.last_day().and_time(self.end),
        )
    }
}

/// Everything a backfill run needs to know up front.
#[derive(Debug, Clone)]
pub struct BackfillPlan {
    pub instrument: Instrument,
    pub span: DateRange,
    pub chunk_days: u32,
    pub retry: RetryPolicy,
    pub request_interval: Duration,
    pub session: SessionWindow,
}

impl BackfillPlan {
    pub fn new(instrument: Instrument, span: DateRange) -> Self {
        Self {
            instrument,
            span,
            chunk_days: 30,
            retry: RetryPolicy::default(),
            request_interval: Duration::from_millis(400),
            session: SessionWindow::default(),
        }
    }

    pub fn chunks(&self) -> Vec<DateRange> {
        self.span.split(self.chunk_days)
    }

    pub fn request_for(&self, range: &DateRange) -> CandleRequest {
        let (from, to) = self.session.bounds(range);
        CandleRequest::for_instrument(&self.instrument, from, to)
    }
}

/// Result of processing one chunk.
#[derive(Debug, Clone, PartialEq)]
pub enum ChunkOutcome {
    Fetched {
        range: DateRange,
        candles: usize,
        attempts: u32,
    },
    Missing(MissingRange),
}

impl ChunkOutcome {
    pub fn range(&self) -> &DateRange {
        match self {
            ChunkOutcome::Fetched { range, .. } => range,
            ChunkOutcome::Missing(missing) => &missing.range,
        }
    }

    pub fn is_fetched(&self) -> bool {
        matches!(self, ChunkOutcome::Fetched { .. })
    }
}

/// Chronological concatenation of every successfully fetched chunk.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergedSeries {
    candles: Vec<Candle>,
    first_date: Option<NaiveDate>,
    last_date: Option<NaiveDate>,
    dropped_overlap: usize,
}

impl MergedSeries {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a normalized chunk. Candles not strictly after the last merged
    /// timestamp are dropped and counted. Returns the number appended.
    pub fn append(&mut self, range: &DateRange, candles: Vec<Candle>) -> usize {
        let mut appended = 0;
        for candle in candles {
            if let Some(last) = self.candles.last() {
                if candle.timestamp() <= last.timestamp() {
                    self.dropped_overlap += 1;
                    continue;
                }
            }
            self.candles.push(candle);
            appended += 1;
        }

        if self.first_date.is_none() {
            self.first_date = Some(range.from);
        }
        self.last_date = Some(self.last_date.map_or(range.to, |d| d.max(range.to)));
        appended
    }

    pub fn candles(&self) -> &[Candle] {
        &self.candles
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    /// Start of the first successful chunk.
    pub fn first_date(&self) -> Option<NaiveDate> {
        self.first_date
    }

    /// End of the latest successful chunk.
    pub fn last_date(&self) -> Option<NaiveDate> {
        self.last_date
    }

    pub fn dropped_overlap(&self) -> usize {
        self.dropped_overlap
    }
}

/// Summary of a completed backfill run.
#[derive(Debug)]
pub struct BackfillReport {
    pub series: MergedSeries,
    pub missing: Vec<MissingRange>,
    pub outcomes: Vec<ChunkOutcome>,
}

impl BackfillReport {
    pub fn chunks_total(&self) -> usize {
        self.outcomes.len()
    }

    pub fn chunks_fetched(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_fetched()).count()
    }

    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }

    /// Write the merged series (when non-empty) and append missing ranges to
    /// the log. Returns the artifact path, if one was written.
    pub fn persist(
        &self,
        instrument: &Instrument,
        store: &ArtifactStore,
        log: &MissingRangeLog,
    ) -> Result<Option<PathBuf>, ArtifactError> {
        log.append(&self.missing)?;
        self.write_artifact(instrument, store)
    }

    /// Persist a run that retried the ranges in `log`. The artifact is written
    /// first; only then is the log rewritten to the ranges still missing, so
    /// an interrupted resume leaves the log as it was.
    pub fn persist_resumed(
        &self,
        instrument: &Instrument,
        store: &ArtifactStore,
        log: &MissingRangeLog,
    ) -> Result<Option<PathBuf>, ArtifactError> {
        let artifact = self.write_artifact(instrument, store)?;
        log.replace(&self.missing)?;
        Ok(artifact)
    }

    fn write_artifact(
        &self,
        instrument: &Instrument,
        store: &ArtifactStore,
    ) -> Result<Option<PathBuf>, ArtifactError> {
        match (self.series.first_date(), self.series.last_date()) {
            (Some(first), Some(last)) if !self.series.is_empty() => store
                .write(instrument, first, last, self.series.candles())
                .map(Some),
            _ => Ok(None),
        }
    }
}

/// Progress callback for backfill runs.
pub trait BackfillProgress {
    fn on_chunk_start(&self, range: &DateRange, index: usize, total: usize);

    fn on_chunk_complete(&self, outcome: &ChunkOutcome, index: usize, total: usize);

    fn on_run_complete(&self, report: &BackfillReport);
}

/// Prints one line per chunk to stdout.
pub struct StdoutProgress;

impl BackfillProgress for StdoutProgress {
    fn on_chunk_start(&self, range: &DateRange, index: usize, total: usize) {
        println!("[{}/{}] Fetching {range}...", index + 1, total);
    }

    fn on_chunk_complete(&self, outcome: &ChunkOutcome, _index: usize, _total: usize) {
        match outcome {
            ChunkOutcome::Fetched {
                candles, attempts, ..
            } => println!("  OK: {candles} candles ({attempts} attempt(s))"),
            ChunkOutcome::Missing(missing) => {
                println!("  MISSING: {} ({})", missing.range, missing.reason)
            }
        }
    }

    fn on_run_complete(&self, report: &BackfillReport) {
        println!(
            "\nBackfill complete: {}/{} chunks fetched, {} candles, {} missing",
            report.chunks_fetched(),
            report.chunks_total(),
            report.series.len(),
            report.missing.len()
        );
    }
}

/// Reports nothing.
pub struct SilentProgress;

impl BackfillProgress for SilentProgress {
    fn on_chunk_start(&self, _range: &DateRange, _index: usize, _total: usize) {}

    fn on_chunk_complete(&self, _outcome: &ChunkOutcome, _index: usize, _total: usize) {}

    fn on_run_complete(&self, _report: &BackfillReport) {}
}

/// Sequential chunked backfill over one source.
pub struct Backfill<'a> {
    source: &'a dyn CandleSource,
    pacer: &'a dyn Pacer,
    progress: &'a dyn BackfillProgress,
}

impl<'a> Backfill<'a> {
    pub fn new(
        source: &'a dyn CandleSource,
        pacer: &'a dyn Pacer,
        progress: &'a dyn BackfillProgress,
    ) -> Self {
        Self {
            source,
            pacer,
            progress,
        }
    }

    /// Backfill the plan's whole span.
    pub fn run(&self, plan: &BackfillPlan) -> BackfillReport {
        self.run_ranges(plan, &plan.chunks())
    }

    /// Backfill exactly `ranges`, in order. Used to resume from a missing-range log.
    pub fn run_ranges(&self, plan: &BackfillPlan, ranges: &[DateRange]) -> BackfillReport {
        let total = ranges.len();
        let mut series = MergedSeries::new();
        let mut missing = Vec::new();
        let mut outcomes = Vec::with_capacity(total);

        info!(
            source = self.source.name(),
            symbol = %plan.instrument.symbol,
            interval = %plan.instrument.interval,
            chunks = total,
            "starting backfill"
        );

        for (i, range) in ranges.iter().enumerate() {
            self.progress.on_chunk_start(range, i, total);

            let outcome = self.fetch_chunk(plan, range, &mut series);
            if let ChunkOutcome::Missing(m) = &outcome {
                missing.push(m.clone());
            }
            self.progress.on_chunk_complete(&outcome, i, total);
            outcomes.push(outcome);

            self.pacer.pause(plan.request_interval);
        }

        let report = BackfillReport {
            series,
            missing,
            outcomes,
        };
        info!(
            fetched = report.chunks_fetched(),
            missing = report.missing.len(),
            candles = report.series.len(),
            dropped_overlap = report.series.dropped_overlap(),
            "backfill finished"
        );
        self.progress.on_run_complete(&report);
        report
    }

    fn fetch_chunk(
        &self,
        plan: &BackfillPlan,
        range: &DateRange,
        series: &mut MergedSeries,
    ) -> ChunkOutcome {
        let request = plan.request_for(range);
        match fetch_with_retry(self.source, &request, &plan.retry, self.pacer) {
            RetryOutcome::Succeeded { candles, attempts } => {
                let appended = series.append(range, candles);
                info!(%range, candles = appended, attempts, "chunk fetched");
                ChunkOutcome::Fetched {
                    range: *range,
                    candles: appended,
                    attempts,
                }
            }
            RetryOutcome::Exhausted {
                attempts,
                last_error,
            } => {
                error!(%range, attempts, error = %last_error, "chunk exhausted retries");
                ChunkOutcome::Missing(MissingRange {
                    range: *range,
                    attempts,
                    reason: last_error.to_string(),
                })
            }
            RetryOutcome::Aborted { attempts, error } => {
                error!(%range, attempts, %error, "chunk failed permanently");
                ChunkOutcome::Missing(MissingRange {
                    range: *range,
                    attempts,
                    reason: error.to_string(),
                })
            }
        }
    }
}
