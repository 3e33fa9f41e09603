//! Domain types for IntraLab

pub mod candle;
pub mod fill;
pub mod order;
pub mod position;
pub mod range;
pub mod trade;

pub use candle::{is_strictly_increasing, Candle, TIME_FORMAT};
pub use fill::{Fill, OrderEvent};
pub use order::{ExitReason, Order, OrderId, OrderIntent, OrderSide, OrderStatus};
pub use position::{Position, PositionSide};
pub use range::{DateRange, MissingRange};
pub use trade::TradeRecord;
