//! Candle source trait, request types and structured error types.
//!
//! The `CandleSource` trait abstracts over the remote historical-data API so the
//! backfill orchestrator can be driven by the SmartAPI client in production and
//! by a scripted source in tests.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use super::normalize::NormalizeError;

/// One raw provider record: `[timestamp, open, high, low, close, volume?]`.
///
/// Kept as untyped JSON values so the normalizer can report a precise
/// `MalformedRecord` instead of failing deserialization of the whole response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawRecord(pub Vec<serde_json::Value>);

impl RawRecord {
    pub fn fields(&self) -> &[serde_json::Value] {
        &self.0
    }
}

/// Candle interval accepted by the historical API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Interval {
    OneMinute,
    ThreeMinute,
    FiveMinute,
    TenMinute,
    FifteenMinute,
    ThirtyMinute,
    OneHour,
    OneDay,
}

impl Interval {
    pub fn as_str(self) -> &'static str {
        match self {
            Interval::OneMinute => "ONE_MINUTE",
            Interval::ThreeMinute => "THREE_MINUTE",
            Interval::FiveMinute => "FIVE_MINUTE",
            Interval::TenMinute => "TEN_MINUTE",
            Interval::FifteenMinute => "FIFTEEN_MINUTE",
            Interval::ThirtyMinute => "THIRTY_MINUTE",
            Interval::OneHour => "ONE_HOUR",
            Interval::OneDay => "ONE_DAY",
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Interval {
    type Err = DataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ONE_MINUTE" => Ok(Interval::OneMinute),
            "THREE_MINUTE" => Ok(Interval::ThreeMinute),
            "FIVE_MINUTE" => Ok(Interval::FiveMinute),
            "TEN_MINUTE" => Ok(Interval::TenMinute),
            "FIFTEEN_MINUTE" => Ok(Interval::FifteenMinute),
            "THIRTY_MINUTE" => Ok(Interval::ThirtyMinute),
            "ONE_HOUR" => Ok(Interval::OneHour),
            "ONE_DAY" => Ok(Interval::OneDay),
            other => Err(DataError::Other(format!("unknown interval '{other}'"))),
        }
    }
}

/// The instrument being backfilled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instrument {
    pub exchange: String,
    pub symbol: String,
    pub token: String,
    pub interval: Interval,
}

impl Instrument {
    /// NIFTY 50 index, one-minute candles.
    pub fn nifty_one_minute() -> Self {
        Self {
            exchange: "NSE".into(),
            symbol: "NIFTY".into(),
            token: "99926000".into(),
            interval: Interval::OneMinute,
        }
    }
}

/// One historical-candle request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandleRequest {
    pub exchange: String,
    pub symbol_token: String,
    pub interval: Interval,
    pub from: NaiveDateTime,
    pub to: NaiveDateTime,
}

impl CandleRequest {
    pub fn for_instrument(instrument: &Instrument, from: NaiveDateTime, to: NaiveDateTime) -> Self {
        Self {
            exchange: instrument.exchange.clone(),
            symbol_token: instrument.token.clone(),
            interval: instrument.interval,
            from,
            to,
        }
    }
}

/// Structured error types for data operations.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("rate limited by provider: {0}")]
    RateLimited(String),

    #[error("provider returned HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("response format changed: {0}")]
    ResponseFormatChanged(String),

    #[error("authentication required: {0}")]
    AuthenticationRequired(String),

    #[error("instrument not found: token {token}")]
    InstrumentNotFound { token: String },

    #[error("no data received")]
    EmptyResponse,

    #[error(transparent)]
    Malformed(#[from] NormalizeError),

    #[error("data error: {0}")]
    Other(String),
}

impl DataError {
    /// Whether another attempt at the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            DataError::AuthenticationRequired(_) | DataError::InstrumentNotFound { .. }
        )
    }
}

/// Remote historical-data source.
///
/// Implementations perform exactly one request per call; retries, pacing and
/// normalization are the orchestrator's job.
pub trait CandleSource {
    /// Human-readable name of this source.
    fn name(&self) -> &str;

    /// Fetch raw candle records for one request window.
    fn fetch(&self, request: &CandleRequest) -> Result<Vec<RawRecord>, DataError>;
}

impl<S: CandleSource + ?Sized> CandleSource for &S {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn fetch(&self, request: &CandleRequest) -> Result<Vec<RawRecord>, DataError> {
        (**self).fetch(request)
    }
}
