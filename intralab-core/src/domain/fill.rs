use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::order::{OrderId, OrderSide};

/// Execution report for a filled market order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    pub order_id: OrderId,
    pub side: OrderSide,
    pub price: f64,
    pub size: f64,
    pub bar_index: usize,
    pub time: NaiveDateTime,
}

/// What the broker reports back for the outstanding order.
#[derive(Debug, Clone, PartialEq)]
pub enum OrderEvent {
    Filled(Fill),
    Rejected { order_id: OrderId, reason: String },
}
