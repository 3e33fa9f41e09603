//! Historical data acquisition: source trait, normalizer, retrying backfill,
//! SmartAPI client and on-disk artifacts.

pub mod artifact;
pub mod backfill;
pub mod missing_log;
pub mod normalize;
pub mod provider;
pub mod retry;
pub mod smartapi;

pub use artifact::{load_artifact, read_meta, ArtifactError, ArtifactMeta, ArtifactStore};
pub use backfill::{
    Backfill, BackfillPlan, BackfillProgress, BackfillReport, ChunkOutcome, MergedSeries,
    SessionWindow, SilentProgress, StdoutProgress,
};
pub use missing_log::MissingRangeLog;
pub use normalize::{normalize, parse_record, split_timestamp, NormalizeError, TimestampParts};
pub use provider::{CandleRequest, CandleSource, DataError, Instrument, Interval, RawRecord};
pub use retry::{
    fetch_with_retry, FetchOutcome, Pacer, RecordingPacer, RetryOutcome, RetryPolicy, ThreadPacer,
};
pub use smartapi::{SmartApiClient, SmartApiCredentials};
