//! Simulated market-order broker.
//!
//! Holds at most one pending order. `process` returns the fill or rejection
//! synchronously once the order's fill bar is reached, and keeps the settled
//! order with its final status.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::state::EngineError;
use crate::domain::{Candle, Fill, Order, OrderEvent, OrderStatus};

/// When a market order submitted on bar `i` is filled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FillTiming {
    /// Open of bar `i + 1`.
    #[default]
    NextBarOpen,
    /// Close of bar `i`.
    SameBarClose,
}

#[derive(Debug, Default)]
pub struct SimulatedBroker {
    timing: FillTiming,
    pending: Option<Order>,
    settled: Vec<Order>,
}

impl SimulatedBroker {
    pub fn new(timing: FillTiming) -> Self {
        Self {
            timing,
            pending: None,
            settled: Vec::new(),
        }
    }

    pub fn timing(&self) -> FillTiming {
        self.timing
    }

    pub fn pending(&self) -> Option<&Order> {
        self.pending.as_ref()
    }

    /// Orders already filled or rejected, in settlement order.
    pub fn settled(&self) -> &[Order] {
        &self.settled
    }

    /// Every order seen, settled ones first, then the one still pending.
    pub fn into_orders(self) -> Vec<Order> {
        let mut orders = self.settled;
        orders.extend(self.pending);
        orders
    }

    pub fn submit(&mut self, order: Order) -> Result<(), EngineError> {
        if !order.is_pending() {
            return Err(EngineError::InvariantViolation(format!(
                "order {} submitted with status {:?}",
                order.id, order.status
            )));
        }
        if let Some(existing) = &self.pending {
            return Err(EngineError::InvariantViolation(format!(
                "order {} submitted while {} is pending",
                order.id, existing.id
            )));
        }
        self.pending = Some(order);
        Ok(())
    }

    /// Settle the pending order against `candle` (bar `bar_index`) if due.
    pub fn process(&mut self, bar_index: usize, candle: &Candle) -> Option<OrderEvent> {
        let due = match (&self.pending, self.timing) {
            (Some(order), FillTiming::NextBarOpen) => bar_index > order.submitted_bar,
            (Some(order), FillTiming::SameBarClose) => bar_index >= order.submitted_bar,
            (None, _) => false,
        };
        if !due {
            return None;
        }
        let mut order = self.pending.take()?;

        let price = match self.timing {
            FillTiming::NextBarOpen => candle.open,
            FillTiming::SameBarClose => candle.close,
        };

        let event = if !price.is_finite() || price <= 0.0 {
            debug!(bar = bar_index, order = %order.id, price, "order rejected");
            order.status = OrderStatus::Rejected;
            OrderEvent::Rejected {
                order_id: order.id,
                reason: format!("no valid fill price ({price}) at bar {bar_index}"),
            }
        } else {
            order.status = OrderStatus::Filled;
            OrderEvent::Filled(Fill {
                order_id: order.id,
                side: order.side,
                price,
                size: order.size,
                bar_index,
                time: candle.timestamp(),
            })
        };
        self.settled.push(order);
        Some(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{OrderId, OrderIntent, OrderSide};
    use crate::indicators::make_candles;

    fn buy(bar: usize) -> Order {
        Order::new(OrderId(1), OrderSide::Buy, OrderIntent::Entry, 1.0, bar)
    }

    #[test]
    fn next_bar_open_waits_one_bar() {
        let candles = make_candles(&[100.0, 101.0, 102.0]);
        let mut broker = SimulatedBroker::new(FillTiming::NextBarOpen);
        broker.submit(buy(0)).unwrap();

        assert!(broker.process(0, &candles[0]).is_none());
        match broker.process(1, &candles[1]) {
            Some(OrderEvent::Filled(fill)) => {
                assert_eq!(fill.price, candles[1].open);
                assert_eq!(fill.bar_index, 1);
                assert_eq!(fill.time, candles[1].timestamp());
            }
            other => panic!("expected fill, got {other:?}"),
        }
        assert!(broker.pending().is_none());
        assert_eq!(broker.settled()[0].status, OrderStatus::Filled);
    }

    #[test]
    fn same_bar_close_fills_immediately() {
        let candles = make_candles(&[100.0, 101.0]);
        let mut broker = SimulatedBroker::new(FillTiming::SameBarClose);
        broker.submit(buy(1)).unwrap();
        match broker.process(1, &candles[1]) {
            Some(OrderEvent::Filled(fill)) => assert_eq!(fill.price, 101.0),
            other => panic!("expected fill, got {other:?}"),
        }
    }

    #[test]
    fn invalid_price_rejects() {
        let mut candles = make_candles(&[100.0, 101.0]);
        candles[1].open = f64::NAN;
        let mut broker = SimulatedBroker::new(FillTiming::NextBarOpen);
        broker.submit(buy(0)).unwrap();
        assert!(matches!(
            broker.process(1, &candles[1]),
            Some(OrderEvent::Rejected { order_id: OrderId(1), .. })
        ));
        assert!(broker.pending().is_none());
        assert_eq!(broker.settled()[0].status, OrderStatus::Rejected);
    }

    #[test]
    fn settled_order_cannot_be_resubmitted() {
        let candles = make_candles(&[100.0, 101.0]);
        let mut broker = SimulatedBroker::new(FillTiming::SameBarClose);
        broker.submit(buy(0)).unwrap();
        broker.process(0, &candles[0]);

        let filled = broker.settled()[0].clone();
        assert!(matches!(
            broker.submit(filled),
            Err(EngineError::InvariantViolation(_))
        ));
    }

    #[test]
    fn into_orders_keeps_the_unsettled_order_pending() {
        let candles = make_candles(&[100.0, 101.0]);
        let mut broker = SimulatedBroker::new(FillTiming::NextBarOpen);
        broker.submit(buy(0)).unwrap();
        broker.process(1, &candles[1]);
        broker
            .submit(Order::new(OrderId(2), OrderSide::Sell, OrderIntent::Entry, 1.0, 1))
            .unwrap();

        let statuses: Vec<OrderStatus> = broker.into_orders().iter().map(|o| o.status).collect();
        assert_eq!(statuses, vec![OrderStatus::Filled, OrderStatus::Pending]);
    }

    #[test]
    fn second_submission_is_violation() {
        let mut broker = SimulatedBroker::default();
        broker.submit(buy(0)).unwrap();
        assert!(matches!(
            broker.submit(buy(0)),
            Err(EngineError::InvariantViolation(_))
        ));
    }

    #[test]
    fn default_timing_is_next_bar_open() {
        assert_eq!(SimulatedBroker::default().timing(), FillTiming::NextBarOpen);
    }
}
