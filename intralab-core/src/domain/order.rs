//! Market orders submitted by the strategy state machine.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Monotonic order identifier, unique within one backtest run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OrderId(pub u64);

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

/// Why a position was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitReason {
    Target,
    StopLoss,
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitReason::Target => f.write_str("target"),
            ExitReason::StopLoss => f.write_str("stop_loss"),
        }
    }
}

/// Whether an order opens or closes the position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderIntent {
    Entry,
    Exit(ExitReason),
}

/// Lifecycle of an order: created `Pending`, settled exactly once by the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    Pending,
    Filled,
    Rejected,
}

/// A single market order. At most one is outstanding at any time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub side: OrderSide,
    pub intent: OrderIntent,
    pub size: f64,
    pub status: OrderStatus,
    pub submitted_bar: usize,
}

impl Order {
    pub fn new(id: OrderId, side: OrderSide, intent: OrderIntent, size: f64, bar: usize) -> Self {
        Self {
            id,
            side,
            intent,
            size,
            status: OrderStatus::Pending,
            submitted_bar: bar,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == OrderStatus::Pending
    }
}
