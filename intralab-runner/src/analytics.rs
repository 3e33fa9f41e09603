//! Trade analytics: pure functions over closed trades and the equity curve.

use serde::{Deserialize, Serialize};

use intralab_core::domain::{PositionSide, TradeRecord};

/// Counts over closed round trips.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TradeSummary {
    pub total: usize,
    pub long: usize,
    pub short: usize,
    pub winners: usize,
    pub losers: usize,
    /// Winners as a percentage of all closed trades; 0 with no trades.
    pub win_probability: f64,
}

impl TradeSummary {
    /// Summarize closed trades. A trade with zero pnl counts as a winner.
    pub fn from_trades(trades: &[TradeRecord]) -> Self {
        let total = trades.len();
        let long = trades
            .iter()
            .filter(|t| t.side == PositionSide::Long)
            .count();
        let winners = trades.iter().filter(|t| t.is_winner()).count();
        let win_probability = if total == 0 {
            0.0
        } else {
            winners as f64 / total as f64 * 100.0
        };
        Self {
            total,
            long,
            short: total - long,
            winners,
            losers: total - winners,
            win_probability,
        }
    }
}

/// Account-level figures from one run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PerformanceSummary {
    pub initial_cash: f64,
    pub final_value: f64,
    pub net_pnl: f64,
    /// Fraction: (final - initial) / initial.
    pub total_return: f64,
    /// Fraction, zero or negative.
    pub max_drawdown: f64,
}

impl PerformanceSummary {
    pub fn compute(equity_curve: &[f64], initial_cash: f64) -> Self {
        let final_value = equity_curve.last().copied().unwrap_or(initial_cash);
        Self {
            initial_cash,
            final_value,
            net_pnl: final_value - initial_cash,
            total_return: total_return(initial_cash, final_value),
            max_drawdown: max_drawdown(equity_curve),
        }
    }
}

/// (final - initial) / initial, or 0 for a non-positive starting value.
pub fn total_return(initial: f64, final_value: f64) -> f64 {
    if initial <= 0.0 || !initial.is_finite() {
        return 0.0;
    }
    (final_value - initial) / initial
}

/// Largest peak-to-trough decline as a (negative) fraction of the peak.
pub fn max_drawdown(equity_curve: &[f64]) -> f64 {
    let mut peak = f64::NEG_INFINITY;
    let mut max_dd = 0.0_f64;
    for &eq in equity_curve {
        if eq > peak {
            peak = eq;
        }
        if peak > 0.0 {
            max_dd = max_dd.min((eq - peak) / peak);
        }
    }
    max_dd
}
