//! Short/long SMA crossover detection.
//!
//! CrossUp fires on the bar where the short average moves from at-or-below the
//! long average (previous bar) to strictly above it (current bar). CrossDown is
//! the mirror image. No event while either average is undefined on the current
//! or previous bar.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::Candle;
use crate::indicators::{Indicator, Sma};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Crossover {
    CrossUp,
    CrossDown,
    None,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignalError {
    #[error("invalid crossover windows: short={short}, long={long} (need 1 <= short < long)")]
    InvalidWindows { short: usize, long: usize },
}

#[derive(Debug, Clone)]
pub struct CrossoverDetector {
    short: Sma,
    long: Sma,
}

impl CrossoverDetector {
    pub fn new(short: usize, long: usize) -> Result<Self, SignalError> {
        if short == 0 || short >= long {
            return Err(SignalError::InvalidWindows { short, long });
        }
        Ok(Self {
            short: Sma::new(short),
            long: Sma::new(long),
        })
    }

    pub fn short_window(&self) -> usize {
        self.short.period()
    }

    pub fn long_window(&self) -> usize {
        self.long.period()
    }

    /// First index at which an event can be emitted.
    pub fn warmup(&self) -> usize {
        self.long.lookback() + 1
    }

    /// One event per candle.
    pub fn detect(&self, candles: &[Candle]) -> Vec<Crossover> {
        let short = self.short.compute(candles);
        let long = self.long.compute(candles);
        classify(&short, &long)
    }
}

/// Pairwise crossover classification of two aligned average series.
pub fn classify(short: &[f64], long: &[f64]) -> Vec<Crossover> {
    let n = short.len().min(long.len());
    let mut events = vec![Crossover::None; n];

    for i in 1..n {
        let (s_prev, l_prev) = (short[i - 1], long[i - 1]);
        let (s_cur, l_cur) = (short[i], long[i]);
        if [s_prev, l_prev, s_cur, l_cur].iter().any(|v| v.is_nan()) {
            continue;
        }

        events[i] = if s_prev <= l_prev && s_cur > l_cur {
            Crossover::CrossUp
        } else if s_prev >= l_prev && s_cur < l_cur {
            Crossover::CrossDown
        } else {
            Crossover::None
        };
    }
    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::make_candles;

    #[test]
    fn rejects_bad_windows() {
        assert!(CrossoverDetector::new(0, 5).is_err());
        assert!(CrossoverDetector::new(5, 5).is_err());
        assert!(CrossoverDetector::new(6, 5).is_err());
        assert!(CrossoverDetector::new(10, 50).is_ok());
    }

    #[test]
    fn classify_cross_up_and_down() {
        let short = [1.0, 2.0, 3.0, 2.0, 1.0];
        let long = [2.0, 2.0, 2.0, 2.0, 2.0];
        let events = classify(&short, &long);
        assert_eq!(
            events,
            vec![
                Crossover::None,
                Crossover::None,
                Crossover::CrossUp,
                Crossover::None,
                Crossover::CrossDown,
            ]
        );
    }

    #[test]
    fn touching_then_crossing_counts() {
        // equal on the previous bar still allows a cross
        let events = classify(&[2.0, 2.5], &[2.0, 2.0]);
        assert_eq!(events[1], Crossover::CrossUp);
    }

    #[test]
    fn undefined_averages_emit_nothing() {
        let events = classify(&[f64::NAN, 3.0, 1.0], &[2.0, f64::NAN, 2.0]);
        assert!(events.iter().all(|e| *e == Crossover::None));
    }

    #[test]
    fn first_signal_is_at_long_window() {
        let detector = CrossoverDetector::new(10, 50).unwrap();
        assert_eq!(detector.warmup(), 50);

        // Flat for 50 bars (0..=49), then a sharp rise: short crosses above long at index 50.
        let mut closes = vec![100.0; 50];
        closes.extend(std::iter::repeat(110.0).take(10));
        let events = detector.detect(&make_candles(&closes));

        assert_eq!(events.len(), 60);
        assert!(events[..50].iter().all(|e| *e == Crossover::None));
        assert_eq!(events[50], Crossover::CrossUp);
        assert!(events[51..].iter().all(|e| *e == Crossover::None));
    }

    #[test]
    fn falling_series_crosses_down() {
        let detector = CrossoverDetector::new(2, 4).unwrap();
        let events = detector.detect(&make_candles(&[10.0, 10.0, 10.0, 10.0, 9.0, 8.0]));
        assert_eq!(events[4], Crossover::CrossDown);
    }
}
