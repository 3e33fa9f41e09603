//! IntraLab Runner: job wiring on top of `intralab-core`.
//!
//! - TOML configuration and SmartAPI credentials
//! - Candle loading from Parquet artifacts or CSV
//! - Backfill job (full span, single window, or missing-range retry)
//! - Backtest job with trade analytics, text report and CSV/JSON artifacts

pub mod analytics;
pub mod config;
pub mod credentials;
pub mod data_loader;
pub mod export;
pub mod report;
pub mod runner;

pub use analytics::{max_drawdown, total_return, PerformanceSummary, TradeSummary};
pub use config::{
    BackfillConfig, BacktestConfig, ConfigError, InstrumentConfig, IntraLabConfig, StrategyConfig,
};
pub use credentials::{credentials_from, credentials_from_env, load_env_file, DEFAULT_ENV_FILE};
pub use data_loader::{load_candles, read_candles_csv, InputFormat, LoadError};
pub use report::{render_report, summary_table};
pub use runner::{
    backtest_candles, resolve_data_path, run_backtest, BackfillJob, BackfillMode, BackfillSummary,
    BacktestOutcome, RunError,
};
