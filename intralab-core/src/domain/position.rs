use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::order::OrderSide;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionSide {
    Long,
    Short,
}

impl PositionSide {
    /// Order side that opens a position of this side.
    pub fn entry_side(self) -> OrderSide {
        match self {
            PositionSide::Long => OrderSide::Buy,
            PositionSide::Short => OrderSide::Sell,
        }
    }

    /// Order side that closes a position of this side.
    pub fn exit_side(self) -> OrderSide {
        match self {
            PositionSide::Long => OrderSide::Sell,
            PositionSide::Short => OrderSide::Buy,
        }
    }

    fn direction(self) -> f64 {
        match self {
            PositionSide::Long => 1.0,
            PositionSide::Short => -1.0,
        }
    }
}

/// The single open position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub side: PositionSide,
    pub entry_price: f64,
    pub size: f64,
    pub entry_bar: usize,
    pub entry_time: NaiveDateTime,
}

impl Position {
    /// Price at which the profit target is reached.
    pub fn target_price(&self, target: f64) -> f64 {
        match self.side {
            PositionSide::Long => self.entry_price * (1.0 + target),
            PositionSide::Short => self.entry_price * (1.0 - target),
        }
    }

    /// Price at which the stop-loss is reached.
    pub fn stop_price(&self, stop_loss: f64) -> f64 {
        match self.side {
            PositionSide::Long => self.entry_price * (1.0 - stop_loss),
            PositionSide::Short => self.entry_price * (1.0 + stop_loss),
        }
    }

    pub fn unrealized_pnl(&self, price: f64) -> f64 {
        self.side.direction() * self.size * (price - self.entry_price)
    }
}
