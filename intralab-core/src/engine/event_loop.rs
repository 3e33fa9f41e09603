//! Bar-by-bar strategy replay.
//!
//! Per bar:
//! 1. The broker settles any order due at this bar; the event goes to the
//!    state machine.
//! 2. The state machine decides on this bar's signal and close; a new order is
//!    submitted (and settled at once under `SameBarClose`).
//! 3. Equity is marked to market at the close.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::broker::{FillTiming, SimulatedBroker};
use super::state::{EngineError, StrategyMachine, StrategyParams};
use crate::domain::{Candle, Fill, Order, OrderEvent, OrderStatus, Position, TradeRecord};
use crate::signals::{Crossover, CrossoverDetector};

/// Account-level settings for one replay.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub initial_cash: f64,
    pub fill_timing: FillTiming,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            initial_cash: 100_000.0,
            fill_timing: FillTiming::NextBarOpen,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunResult {
    /// Closed round trips, in exit order.
    pub trades: Vec<TradeRecord>,
    pub fills: Vec<Fill>,
    /// Every submitted order with its final status; one left `Pending` if the
    /// data ran out before it could fill.
    pub orders: Vec<Order>,
    /// Equity at each bar close.
    pub equity_curve: Vec<f64>,
    /// Position still open when the data ran out (not counted as a trade).
    pub open_position: Option<Position>,
    pub initial_cash: f64,
    pub final_value: f64,
    pub bar_count: usize,
    pub signal_count: usize,
    pub rejected_orders: usize,
}

impl RunResult {
    pub fn realized_pnl(&self) -> f64 {
        self.trades.iter().map(|t| t.pnl).sum()
    }
}

/// Replay `candles` through the crossover strategy.
pub fn run_strategy(
    candles: &[Candle],
    params: &StrategyParams,
    config: &RunConfig,
) -> Result<RunResult, EngineError> {
    let detector = CrossoverDetector::new(params.short_window, params.long_window)?;
    let signals = detector.detect(candles);
    let mut machine = StrategyMachine::new(*params)?;
    let mut broker = SimulatedBroker::new(config.fill_timing);

    let mut ledger = Ledger::default();
    let mut equity_curve = Vec::with_capacity(candles.len());
    let mut last_close = f64::NAN;

    for (i, candle) in candles.iter().enumerate() {
        if let Some(event) = broker.process(i, candle) {
            ledger.deliver(event, &mut machine)?;
        }

        if let Some(order) = machine.on_bar(i, signals[i], candle.close)? {
            broker.submit(order)?;
            if let Some(event) = broker.process(i, candle) {
                ledger.deliver(event, &mut machine)?;
            }
        }

        if candle.close.is_finite() {
            last_close = candle.close;
        }
        let unrealized = match machine.state().position() {
            Some(position) if last_close.is_finite() => position.unrealized_pnl(last_close),
            _ => 0.0,
        };
        equity_curve.push(config.initial_cash + ledger.realized + unrealized);
    }

    let open_position = machine.state().position().cloned();
    if let Some(position) = &open_position {
        debug!(side = ?position.side, entry = position.entry_price, "position open at end of data");
    }

    let orders = broker.into_orders();
    let rejected_orders = orders
        .iter()
        .filter(|o| o.status == OrderStatus::Rejected)
        .count();
    let final_value = equity_curve.last().copied().unwrap_or(config.initial_cash);
    let signal_count = signals.iter().filter(|s| **s != Crossover::None).count();
    info!(
        bars = candles.len(),
        signals = signal_count,
        trades = ledger.trades.len(),
        final_value,
        "strategy run complete"
    );

    Ok(RunResult {
        trades: ledger.trades,
        fills: ledger.fills,
        orders,
        equity_curve,
        open_position,
        initial_cash: config.initial_cash,
        final_value,
        bar_count: candles.len(),
        signal_count,
        rejected_orders,
    })
}

/// Broker events collected over a run.
#[derive(Default)]
struct Ledger {
    trades: Vec<TradeRecord>,
    fills: Vec<Fill>,
    realized: f64,
}

impl Ledger {
    fn deliver(&mut self, event: OrderEvent, machine: &mut StrategyMachine) -> Result<(), EngineError> {
        if let OrderEvent::Filled(fill) = &event {
            self.fills.push(fill.clone());
        }
        if let Some(trade) = machine.on_event(&event)? {
            self.realized += trade.pnl;
            self.trades.push(trade);
        }
        Ok(())
    }
}
