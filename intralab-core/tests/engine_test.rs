//! End-to-end strategy replay scenarios.

use chrono::{Duration, NaiveDate};

use intralab_core::domain::{Candle, ExitReason, OrderIntent, OrderSide, OrderStatus, PositionSide};
use intralab_core::engine::{run_strategy, FillTiming, RunConfig, StrategyParams};

/// Minute candles where each open equals the previous close.
fn candles_from_closes(closes: &[f64]) -> Vec<Candle> {
    let start = NaiveDate::from_ymd_opt(2025, 1, 6)
        .unwrap()
        .and_hms_opt(9, 15, 0)
        .unwrap();
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let ts = start + Duration::minutes(i as i64);
            let open = if i == 0 { close } else { closes[i - 1] };
            Candle {
                date: ts.date(),
                time: ts.time(),
                timezone: "+05:30".into(),
                open,
                high: open.max(close),
                low: open.min(close),
                close,
                volume: 0,
            }
        })
        .collect()
}

/// 60 bars: flat at 100 through bar 50, then +0.5% per bar. The only
/// crossover (10 over 50) is at bar 51.
fn rising_after_bar_50() -> Vec<f64> {
    (0..60)
        .map(|i| {
            if i <= 50 {
                100.0
            } else {
                100.0 * 1.005_f64.powi(i - 50)
            }
        })
        .collect()
}

#[test]
fn single_crossover_same_bar_fill() {
    let candles = candles_from_closes(&rising_after_bar_50());
    let config = RunConfig {
        fill_timing: FillTiming::SameBarClose,
        ..RunConfig::default()
    };
    let result = run_strategy(&candles, &StrategyParams::default(), &config).unwrap();

    assert_eq!(result.signal_count, 1);
    assert_eq!(result.trades.len(), 1);
    assert!(result.open_position.is_none());

    let trade = &result.trades[0];
    assert_eq!(trade.side, PositionSide::Long);
    assert_eq!(trade.entry_bar, 51);
    assert_eq!(trade.entry_price, candles[51].close);

    // First bar whose close reaches entry * 1.003.
    let threshold = trade.entry_price * 1.003;
    let first_hit = (52..60).find(|&i| candles[i].close >= threshold).unwrap();
    assert_eq!(trade.exit_bar, first_hit);
    assert_eq!(trade.exit_reason, ExitReason::Target);
    assert!(trade.pnl > 0.0);
}

#[test]
fn single_crossover_next_bar_open_fill() {
    let candles = candles_from_closes(&rising_after_bar_50());
    let result =
        run_strategy(&candles, &StrategyParams::default(), &RunConfig::default()).unwrap();

    assert_eq!(result.trades.len(), 1);
    let trade = &result.trades[0];

    // Signal on bar 51, fill at bar 52's open (= bar 51's close here).
    assert_eq!(trade.entry_bar, 52);
    assert_eq!(trade.entry_price, candles[52].open);
    assert_eq!(trade.exit_reason, ExitReason::Target);
    // Exit decided on bar 52's close, filled at bar 53's open.
    assert_eq!(trade.exit_bar, 53);
    assert_eq!(trade.exit_price, candles[53].open);

    assert_eq!(result.fills.len(), 2);
    assert_eq!(result.fills[0].side, OrderSide::Buy);
    assert_eq!(result.fills[1].side, OrderSide::Sell);

    assert_eq!(result.orders.len(), 2);
    assert!(result.orders.iter().all(|o| o.status == OrderStatus::Filled));
    assert_eq!(result.orders[0].intent, OrderIntent::Entry);
    assert_eq!(result.orders[1].intent, OrderIntent::Exit(ExitReason::Target));
    assert_eq!(result.rejected_orders, 0);
}

#[test]
fn order_submitted_on_last_bar_stays_pending() {
    // Cross up on the last bar; a next-bar-open order has no bar to fill on.
    let mut closes = vec![100.0; 51];
    closes.push(100.1);
    let candles = candles_from_closes(&closes);
    let result =
        run_strategy(&candles, &StrategyParams::default(), &RunConfig::default()).unwrap();

    assert!(result.fills.is_empty());
    assert_eq!(result.orders.len(), 1);
    assert_eq!(result.orders[0].status, OrderStatus::Pending);
    assert!(result.open_position.is_none());
}

#[test]
fn equity_tracks_realized_pnl() {
    let candles = candles_from_closes(&rising_after_bar_50());
    let result =
        run_strategy(&candles, &StrategyParams::default(), &RunConfig::default()).unwrap();

    assert_eq!(result.equity_curve.len(), 60);
    assert_eq!(result.equity_curve[0], 100_000.0);
    let expected = 100_000.0 + result.realized_pnl();
    assert!((result.final_value - expected).abs() < 1e-9);
}

#[test]
fn falling_market_opens_short_and_stops_out() {
    // Flat, then a drop creates a cross down; price then rebounds above the stop.
    let mut closes = vec![100.0; 51];
    closes.push(99.0);
    closes.push(99.5);
    closes.extend(std::iter::repeat(99.5).take(7));
    let candles = candles_from_closes(&closes);
    let config = RunConfig {
        fill_timing: FillTiming::SameBarClose,
        ..RunConfig::default()
    };
    let result = run_strategy(&candles, &StrategyParams::default(), &config).unwrap();

    let trade = &result.trades[0];
    assert_eq!(trade.side, PositionSide::Short);
    assert_eq!(trade.entry_price, 99.0);
    assert_eq!(trade.exit_reason, ExitReason::StopLoss);
    assert!(trade.pnl < 0.0);
}

#[test]
fn open_position_at_end_is_not_a_trade() {
    // Cross up on the last bar only.
    let mut closes = vec![100.0; 51];
    closes.push(100.1);
    let candles = candles_from_closes(&closes);
    let config = RunConfig {
        fill_timing: FillTiming::SameBarClose,
        ..RunConfig::default()
    };
    let result = run_strategy(&candles, &StrategyParams::default(), &config).unwrap();

    assert!(result.trades.is_empty());
    let open = result.open_position.unwrap();
    assert_eq!(open.side, PositionSide::Long);
    assert_eq!(open.entry_price, 100.1);
}

#[test]
fn custom_windows_and_size() {
    let params = StrategyParams {
        short_window: 2,
        long_window: 4,
        size: 10.0,
        ..StrategyParams::default()
    };
    let candles = candles_from_closes(&[10.0, 10.0, 10.0, 10.0, 10.0, 11.0, 12.0, 13.0]);
    let config = RunConfig {
        fill_timing: FillTiming::SameBarClose,
        ..RunConfig::default()
    };
    let result = run_strategy(&candles, &params, &config).unwrap();

    let trade = &result.trades[0];
    assert_eq!(trade.entry_bar, 5);
    assert_eq!(trade.size, 10.0);
    assert_eq!(trade.exit_bar, 6);
    assert!((trade.pnl - 10.0).abs() < 1e-9);
}
