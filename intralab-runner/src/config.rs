//! TOML configuration for backfill and backtest jobs.
//!
//! Every field has a default, so an empty file (or no file at all) yields the
//! NIFTY one-minute setup with the 10/50 crossover strategy.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use intralab_core::data::{BackfillPlan, Instrument, Interval, RetryPolicy, SessionWindow};
use intralab_core::domain::DateRange;
use intralab_core::engine::{FillTiming, RunConfig, StrategyParams};

const SESSION_TIME_FORMAT: &str = "%H:%M";

/// Errors from loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),

    #[error("missing credential: environment variable {0} is not set")]
    MissingCredential(&'static str),

    #[error("failed to load env file {path}: {reason}")]
    EnvFile { path: PathBuf, reason: String },
}

/// Top-level configuration file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntraLabConfig {
    pub instrument: InstrumentConfig,
    pub backfill: BackfillConfig,
    pub strategy: StrategyConfig,
    pub backtest: BacktestConfig,
}

/// `[instrument]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstrumentConfig {
    pub exchange: String,
    pub symbol: String,
    pub token: String,
    pub interval: Interval,
}

impl Default for InstrumentConfig {
    fn default() -> Self {
        let nifty = Instrument::nifty_one_minute();
        Self {
            exchange: nifty.exchange,
            symbol: nifty.symbol,
            token: nifty.token,
            interval: nifty.interval,
        }
    }
}

/// `[backfill]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackfillConfig {
    /// First calendar year fetched (from January 1st).
    pub start_year: i32,
    /// Exclusive: the span ends on January 1st of this year.
    pub end_year: i32,
    pub chunk_days: u32,
    pub max_attempts: u32,
    pub retry_backoff_ms: u64,
    pub request_interval_ms: u64,
    /// `HH:MM`
    pub session_start: String,
    /// `HH:MM`
    pub session_end: String,
    pub output_dir: PathBuf,
}

impl Default for BackfillConfig {
    fn default() -> Self {
        Self {
            start_year: 2005,
            end_year: 2025,
            chunk_days: 30,
            max_attempts: 3,
            retry_backoff_ms: 5_000,
            request_interval_ms: 400,
            session_start: "09:00".into(),
            session_end: "15:30".into(),
            output_dir: PathBuf::from("h_data"),
        }
    }
}

impl BackfillConfig {
    pub fn session(&self) -> Result<SessionWindow, ConfigError> {
        let start = parse_session_time("session_start", &self.session_start)?;
        let end = parse_session_time("session_end", &self.session_end)?;
        if start >= end {
            return Err(ConfigError::Invalid(format!(
                "session_start ({}) must be before session_end ({})",
                self.session_start, self.session_end
            )));
        }
        Ok(SessionWindow { start, end })
    }

    pub fn span(&self) -> Result<DateRange, ConfigError> {
        DateRange::years(self.start_year, self.end_year).ok_or_else(|| {
            ConfigError::Invalid(format!(
                "start_year ({}) must be before end_year ({})",
                self.start_year, self.end_year
            ))
        })
    }
}

fn parse_session_time(field: &str, value: &str) -> Result<NaiveTime, ConfigError> {
    NaiveTime::parse_from_str(value, SESSION_TIME_FORMAT)
        .map_err(|e| ConfigError::Invalid(format!("{field} '{value}' is not HH:MM: {e}")))
}

/// `[strategy]`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyConfig {
    pub target: f64,
    pub stop_loss: f64,
    pub short_window: usize,
    pub long_window: usize,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        let params = StrategyParams::default();
        Self {
            target: params.target,
            stop_loss: params.stop_loss,
            short_window: params.short_window,
            long_window: params.long_window,
        }
    }
}

/// `[backtest]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BacktestConfig {
    pub initial_cash: f64,
    pub size: f64,
    pub fill_timing: FillTiming,
    /// Candle input (Parquet artifact or CSV). The CLI may supply it instead.
    pub data: Option<PathBuf>,
    pub output_dir: PathBuf,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            initial_cash: RunConfig::default().initial_cash,
            size: StrategyParams::default().size,
            fill_timing: FillTiming::default(),
            data: None,
            output_dir: PathBuf::from("results"),
        }
    }
}

impl IntraLabConfig {
    /// Load and validate a config file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse and validate a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values no job can run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.instrument.symbol.trim().is_empty() || self.instrument.token.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "instrument symbol and token must not be empty".into(),
            ));
        }

        let b = &self.backfill;
        b.span()?;
        b.session()?;
        if b.chunk_days == 0 {
            return Err(ConfigError::Invalid("chunk_days must be at least 1".into()));
        }
        if b.max_attempts == 0 {
            return Err(ConfigError::Invalid("max_attempts must be at least 1".into()));
        }

        self.strategy_params()
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;

        let cash = self.backtest.initial_cash;
        if !cash.is_finite() || cash <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "initial_cash must be positive, got {cash}"
            )));
        }
        Ok(())
    }

    pub fn instrument(&self) -> Instrument {
        Instrument {
            exchange: self.instrument.exchange.clone(),
            symbol: self.instrument.symbol.clone(),
            token: self.instrument.token.clone(),
            interval: self.instrument.interval,
        }
    }

    /// Backfill plan over the configured years.
    pub fn backfill_plan(&self) -> Result<BackfillPlan, ConfigError> {
        self.backfill_plan_for(self.backfill.span()?)
    }

    /// Backfill plan over an explicit span, keeping every other setting.
    pub fn backfill_plan_for(&self, span: DateRange) -> Result<BackfillPlan, ConfigError> {
        let b = &self.backfill;
        let mut plan = BackfillPlan::new(self.instrument(), span);
        plan.chunk_days = b.chunk_days;
        plan.retry = RetryPolicy {
            max_attempts: b.max_attempts,
            backoff: Duration::from_millis(b.retry_backoff_ms),
        };
        plan.request_interval = Duration::from_millis(b.request_interval_ms);
        plan.session = b.session()?;
        Ok(plan)
    }

    pub fn strategy_params(&self) -> StrategyParams {
        StrategyParams {
            target: self.strategy.target,
            stop_loss: self.strategy.stop_loss,
            short_window: self.strategy.short_window,
            long_window: self.strategy.long_window,
            size: self.backtest.size,
        }
    }

    pub fn run_config(&self) -> RunConfig {
        RunConfig {
            initial_cash: self.backtest.initial_cash,
            fill_timing: self.backtest.fill_timing,
        }
    }
}
