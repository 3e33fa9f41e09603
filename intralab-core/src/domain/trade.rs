//! TradeRecord: a closed round trip from entry fill to exit fill.

use super::order::ExitReason;
use super::position::PositionSide;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub side: PositionSide,

    // ── Entry ──
    pub entry_bar: usize,
    pub entry_time: NaiveDateTime,
    pub entry_price: f64,

    // ── Exit ──
    pub exit_bar: usize,
    pub exit_time: NaiveDateTime,
    pub exit_price: f64,
    pub exit_reason: ExitReason,

    pub size: f64,
    pub pnl: f64,
    pub bars_held: usize,
}

impl TradeRecord {
    /// Return on the trade as a fraction of entry notional.
    pub fn return_pct(&self) -> f64 {
        if self.entry_price == 0.0 || self.size == 0.0 {
            return 0.0;
        }
        self.pnl / (self.entry_price * self.size)
    }

    /// Breakeven trades count as winners.
    pub fn is_winner(&self) -> bool {
        self.pnl >= 0.0
    }
}
