//! IntraLab Core: intraday candle backfill and crossover strategy replay.
//!
//! - Domain types (candles, date ranges, orders, fills, positions, trades)
//! - Candle normalizer and the chunked, retrying backfill orchestrator
//! - SmartAPI historical-data client and Parquet artifacts
//! - SMA indicator and crossover detection
//! - Position/order state machine, simulated broker and bar loop

pub mod data;
pub mod domain;
pub mod engine;
pub mod indicators;
pub mod signals;

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: domain and engine types can cross threads.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        require_send::<domain::Candle>();
        require_sync::<domain::Candle>();
        require_send::<domain::DateRange>();
        require_sync::<domain::DateRange>();
        require_send::<domain::Order>();
        require_sync::<domain::Order>();
        require_send::<domain::Fill>();
        require_sync::<domain::Fill>();
        require_send::<domain::Position>();
        require_sync::<domain::Position>();
        require_send::<domain::TradeRecord>();
        require_sync::<domain::TradeRecord>();

        require_send::<data::DataError>();
        require_sync::<data::DataError>();
        require_send::<data::MergedSeries>();
        require_sync::<data::MergedSeries>();

        require_send::<engine::StrategyParams>();
        require_sync::<engine::StrategyParams>();
        require_send::<engine::RunResult>();
        require_sync::<engine::RunResult>();
    }

    /// Compile-time check: signals see candles only, never position or equity.
    #[allow(dead_code)]
    fn crossover_detection_takes_candles_only(
        detector: &signals::CrossoverDetector,
        candles: &[domain::Candle],
    ) -> Vec<signals::Crossover> {
        detector.detect(candles)
    }
}
