//! Position/order state machine.
//!
//! One explicit `StrategyState` value, advanced only by `on_bar`, `on_fill`
//! and `on_reject`. At most one order is outstanding and at most one position
//! is open at any time.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::domain::{
    ExitReason, Fill, Order, OrderEvent, OrderId, OrderIntent, OrderSide, Position,
    PositionSide, TradeRecord,
};
use crate::signals::{Crossover, SignalError};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid strategy parameters: {0}")]
    InvalidParams(String),

    #[error("state machine invariant violated: {0}")]
    InvariantViolation(String),

    #[error(transparent)]
    Signal(#[from] SignalError),
}

/// Strategy thresholds and windows.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyParams {
    /// Profit target as a fraction of entry price.
    pub target: f64,
    /// Stop loss as a fraction of entry price.
    pub stop_loss: f64,
    pub short_window: usize,
    pub long_window: usize,
    /// Units per order.
    pub size: f64,
}

impl Default for StrategyParams {
    fn default() -> Self {
        Self {
            target: 0.003,
            stop_loss: 0.001,
            short_window: 10,
            long_window: 50,
            size: 1.0,
        }
    }
}

impl StrategyParams {
    pub fn validate(&self) -> Result<(), EngineError> {
        let positive = |v: f64| v.is_finite() && v > 0.0;
        if !positive(self.target) {
            return Err(EngineError::InvalidParams(format!(
                "target must be > 0, got {}",
                self.target
            )));
        }
        if !positive(self.stop_loss) || self.stop_loss >= 1.0 {
            return Err(EngineError::InvalidParams(format!(
                "stop_loss must be in (0, 1), got {}",
                self.stop_loss
            )));
        }
        if !positive(self.size) {
            return Err(EngineError::InvalidParams(format!(
                "size must be > 0, got {}",
                self.size
            )));
        }
        if self.short_window == 0 || self.short_window >= self.long_window {
            return Err(SignalError::InvalidWindows {
                short: self.short_window,
                long: self.long_window,
            }
            .into());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StrategyState {
    Flat,
    AwaitingEntryFill { order: Order, side: PositionSide },
    Open(Position),
    AwaitingExitFill { position: Position, order: Order },
}

impl StrategyState {
    pub fn is_flat(&self) -> bool {
        matches!(self, StrategyState::Flat)
    }

    pub fn pending_order(&self) -> Option<&Order> {
        match self {
            StrategyState::AwaitingEntryFill { order, .. }
            | StrategyState::AwaitingExitFill { order, .. } => Some(order),
            _ => None,
        }
    }

    pub fn position(&self) -> Option<&Position> {
        match self {
            StrategyState::Open(position) | StrategyState::AwaitingExitFill { position, .. } => {
                Some(position)
            }
            _ => None,
        }
    }
}

pub struct StrategyMachine {
    params: StrategyParams,
    state: StrategyState,
    next_order_id: u64,
}

impl StrategyMachine {
    pub fn new(params: StrategyParams) -> Result<Self, EngineError> {
        params.validate()?;
        Ok(Self {
            params,
            state: StrategyState::Flat,
            next_order_id: 1,
        })
    }

    pub fn state(&self) -> &StrategyState {
        &self.state
    }

    /// Decide on one bar. Returns the order to submit, if any.
    pub fn on_bar(
        &mut self,
        bar_index: usize,
        signal: Crossover,
        close: f64,
    ) -> Result<Option<Order>, EngineError> {
        let state = std::mem::replace(&mut self.state, StrategyState::Flat);
        let (next, order) = match state {
            pending @ (StrategyState::AwaitingEntryFill { .. }
            | StrategyState::AwaitingExitFill { .. }) => (pending, None),

            StrategyState::Flat => {
                let side = match signal {
                    Crossover::CrossUp => Some(PositionSide::Long),
                    Crossover::CrossDown => Some(PositionSide::Short),
                    Crossover::None => None,
                };
                match side {
                    Some(side) => {
                        let order = self.new_order(side.entry_side(), OrderIntent::Entry, bar_index);
                        debug!(bar = bar_index, order = %order.id, ?side, "entry submitted");
                        (
                            StrategyState::AwaitingEntryFill {
                                order: order.clone(),
                                side,
                            },
                            Some(order),
                        )
                    }
                    None => (StrategyState::Flat, None),
                }
            }

            StrategyState::Open(position) => match self.exit_reason(&position, close) {
                Some(reason) => {
                    let order = self.new_order(
                        position.side.exit_side(),
                        OrderIntent::Exit(reason),
                        bar_index,
                    );
                    debug!(bar = bar_index, order = %order.id, %reason, close, "exit submitted");
                    (
                        StrategyState::AwaitingExitFill {
                            position,
                            order: order.clone(),
                        },
                        Some(order),
                    )
                }
                None => (StrategyState::Open(position), None),
            },
        };
        self.state = next;
        Ok(order)
    }

    /// Target first, then stop.
    fn exit_reason(&self, position: &Position, close: f64) -> Option<ExitReason> {
        let target = position.target_price(self.params.target);
        let stop = position.stop_price(self.params.stop_loss);
        let (hit_target, hit_stop) = match position.side {
            PositionSide::Long => (close >= target, close <= stop),
            PositionSide::Short => (close <= target, close >= stop),
        };
        if hit_target {
            Some(ExitReason::Target)
        } else if hit_stop {
            Some(ExitReason::StopLoss)
        } else {
            None
        }
    }

    fn new_order(&mut self, side: OrderSide, intent: OrderIntent, bar: usize) -> Order {
        let id = OrderId(self.next_order_id);
        self.next_order_id += 1;
        Order::new(id, side, intent, self.params.size, bar)
    }

    /// Apply a fill for the outstanding order. Returns the closed trade on an
    /// exit fill.
    pub fn on_fill(&mut self, fill: &Fill) -> Result<Option<TradeRecord>, EngineError> {
        let state = std::mem::replace(&mut self.state, StrategyState::Flat);
        match state {
            StrategyState::AwaitingEntryFill { order, side } => {
                if let Err(e) = check_fill(&order, fill) {
                    self.state = StrategyState::AwaitingEntryFill { order, side };
                    return Err(e);
                }
                debug!(bar = fill.bar_index, price = fill.price, ?side, "entry filled");
                self.state = StrategyState::Open(Position {
                    side,
                    entry_price: fill.price,
                    size: fill.size,
                    entry_bar: fill.bar_index,
                    entry_time: fill.time,
                });
                Ok(None)
            }
            StrategyState::AwaitingExitFill { position, order } => {
                if let Err(e) = check_fill(&order, fill) {
                    self.state = StrategyState::AwaitingExitFill { position, order };
                    return Err(e);
                }
                let exit_reason = match order.intent {
                    OrderIntent::Exit(reason) => reason,
                    OrderIntent::Entry => {
                        self.state = StrategyState::AwaitingExitFill { position, order };
                        return Err(EngineError::InvariantViolation(
                            "exit state holds an entry order".into(),
                        ));
                    }
                };
                let trade = TradeRecord {
                    side: position.side,
                    entry_bar: position.entry_bar,
                    entry_time: position.entry_time,
                    entry_price: position.entry_price,
                    exit_bar: fill.bar_index,
                    exit_time: fill.time,
                    exit_price: fill.price,
                    exit_reason,
                    size: position.size,
                    pnl: position.unrealized_pnl(fill.price),
                    bars_held: fill.bar_index.saturating_sub(position.entry_bar),
                };
                debug!(bar = fill.bar_index, price = fill.price, pnl = trade.pnl, "exit filled");
                Ok(Some(trade))
            }
            other => {
                self.state = other;
                Err(EngineError::InvariantViolation(format!(
                    "fill for order {} with no order pending",
                    fill.order_id
                )))
            }
        }
    }

    /// Undo the outstanding order: entry → Flat, exit → back to Open.
    pub fn on_reject(&mut self, order_id: OrderId) -> Result<(), EngineError> {
        let state = std::mem::replace(&mut self.state, StrategyState::Flat);
        match state {
            StrategyState::AwaitingEntryFill { order, .. } if order.id == order_id => {
                debug!(order = %order_id, "entry rejected");
                Ok(())
            }
            StrategyState::AwaitingExitFill { position, order } if order.id == order_id => {
                debug!(order = %order_id, "exit rejected");
                self.state = StrategyState::Open(position);
                Ok(())
            }
            other => {
                self.state = other;
                Err(EngineError::InvariantViolation(format!(
                    "rejection for order {order_id} which is not pending"
                )))
            }
        }
    }

    /// Dispatch a broker event.
    pub fn on_event(&mut self, event: &OrderEvent) -> Result<Option<TradeRecord>, EngineError> {
        match event {
            OrderEvent::Filled(fill) => self.on_fill(fill),
            OrderEvent::Rejected { order_id, .. } => self.on_reject(*order_id).map(|()| None),
        }
    }
}

fn check_fill(order: &Order, fill: &Fill) -> Result<(), EngineError> {
    if order.id != fill.order_id {
        return Err(EngineError::InvariantViolation(format!(
            "fill for order {} but {} is pending",
            fill.order_id, order.id
        )));
    }
    if order.side != fill.side {
        return Err(EngineError::InvariantViolation(format!(
            "fill side {:?} does not match order {} side {:?}",
            fill.side, order.id, order.side
        )));
    }
    Ok(())
}
