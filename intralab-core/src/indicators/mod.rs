//! Indicators computed over a whole candle series before the bar loop.

pub mod sma;

pub use sma::Sma;

use crate::domain::Candle;

/// A single-series indicator aligned to its input.
///
/// `compute` returns one value per candle; values before `lookback()` (and any
/// window touching a NaN close) are NaN.
pub trait Indicator {
    fn name(&self) -> &str;

    /// Number of leading candles without a value.
    fn lookback(&self) -> usize;

    fn compute(&self, candles: &[Candle]) -> Vec<f64>;
}

/// Minute candles with the given closes, starting 2025-01-06 09:15.
#[cfg(test)]
pub fn make_candles(closes: &[f64]) -> Vec<Candle> {
    let start = chrono::NaiveDate::from_ymd_opt(2025, 1, 6)
        .unwrap()
        .and_hms_opt(9, 15, 0)
        .unwrap();
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let ts = start + chrono::Duration::minutes(i as i64);
            let open = if i == 0 { close } else { closes[i - 1] };
            Candle {
                date: ts.date(),
                time: ts.time(),
                timezone: "+05:30".into(),
                open,
                high: open.max(close),
                low: open.min(close),
                close,
                volume: 0,
            }
        })
        .collect()
}

#[cfg(test)]
pub fn assert_approx(actual: f64, expected: f64, epsilon: f64) {
    assert!(
        (actual - expected).abs() < epsilon,
        "assert_approx failed: actual={actual}, expected={expected}, epsilon={epsilon}"
    );
}

#[cfg(test)]
pub const DEFAULT_EPSILON: f64 = 1e-10;
