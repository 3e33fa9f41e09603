//! Simple moving average of closes.
//!
//! First valid value at index `period - 1`.

use super::Indicator;
use crate::domain::Candle;

#[derive(Debug, Clone)]
pub struct Sma {
    period: usize,
    name: String,
}

impl Sma {
    /// `period` is clamped to at least 1.
    pub fn new(period: usize) -> Self {
        let period = period.max(1);
        Self {
            period,
            name: format!("sma_{period}"),
        }
    }

    pub fn period(&self) -> usize {
        self.period
    }
}

impl Indicator for Sma {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period - 1
    }

    fn compute(&self, candles: &[Candle]) -> Vec<f64> {
        let n = candles.len();
        let mut out = vec![f64::NAN; n];
        let period = self.period;

        // Running sum over finite closes and a count of NaNs inside the window.
        let mut sum = 0.0;
        let mut nans = 0usize;

        for i in 0..n {
            let entering = candles[i].close;
            if entering.is_nan() {
                nans += 1;
            } else {
                sum += entering;
            }

            if i >= period {
                let leaving = candles[i - period].close;
                if leaving.is_nan() {
                    nans -= 1;
                } else {
                    sum -= leaving;
                }
            }

            if i + 1 >= period && nans == 0 {
                out[i] = sum / period as f64;
            }
        }
        out
    }
}
