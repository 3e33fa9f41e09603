//! Candle: one normalized OHLCV observation for a one-minute bucket.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

/// Time-of-day format for every textual rendering of `Candle::time`.
/// Sub-second digits appear only when present.
pub const TIME_FORMAT: &str = "%H:%M:%S%.f";

/// OHLCV candle for a single instrument and a single minute.
///
/// `timezone` holds the provider's offset suffix verbatim (`+05:30`), or an
/// empty string when the provider sent none. It is never defaulted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub timezone: String,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

impl Candle {
    /// Local wall-clock timestamp used for ordering within a series.
    pub fn timestamp(&self) -> NaiveDateTime {
        self.date.and_time(self.time)
    }

    /// Re-join date, time and offset into the provider's timestamp string.
    pub fn raw_timestamp(&self) -> String {
        format!(
            "{}T{}{}",
            self.date.format("%Y-%m-%d"),
            self.time.format(TIME_FORMAT),
            self.timezone
        )
    }

    /// Returns true if any price field is NaN.
    pub fn is_void(&self) -> bool {
        self.open.is_nan() || self.high.is_nan() || self.low.is_nan() || self.close.is_nan()
    }

    /// Basic OHLC sanity check: high >= low, both bracket open and close.
    pub fn is_sane(&self) -> bool {
        if self.is_void() {
            return false;
        }
        self.high >= self.low
            && self.high >= self.open
            && self.high >= self.close
            && self.low <= self.open
            && self.low <= self.close
            && self.open > 0.0
            && self.close > 0.0
    }

    /// Open-to-close return in percent, rounded to two decimals.
    pub fn return_pct(&self) -> f64 {
        if self.open == 0.0 {
            return 0.0;
        }
        (((self.close - self.open) / self.open) * 100.0 * 100.0).round() / 100.0
    }
}

/// Check the strict-ordering invariant of a candle series.
pub fn is_strictly_increasing(candles: &[Candle]) -> bool {
    candles
        .windows(2)
        .all(|w| w[0].timestamp() < w[1].timestamp())
}
