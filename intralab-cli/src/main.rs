//! IntraLab CLI: backfill, backtest and missing-range commands.
//!
//! Commands:
//! - `backfill`: fetch minute candles from SmartAPI in 30-day chunks and
//!   persist them as Parquet, plus a missing-range log
//! - `backtest`: replay a Parquet artifact or CSV through the crossover
//!   strategy and print the trade summary
//! - `missing`: list ranges recorded in the missing-range log

use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use intralab_core::data::{
    missing_log::format_line, read_meta, MissingRangeLog, SmartApiClient, StdoutProgress,
    ThreadPacer,
};
use intralab_core::domain::DateRange;
use intralab_core::engine::FillTiming;
use intralab_runner::{
    credentials_from_env, load_env_file, resolve_data_path, run_backtest, BackfillJob,
    BackfillMode, IntraLabConfig, DEFAULT_ENV_FILE,
};

/// Read when `--config` is not given and the file exists.
const DEFAULT_CONFIG_FILE: &str = "intralab.toml";

#[derive(Parser)]
#[command(
    name = "intralab",
    version,
    about = "IntraLab: intraday candle backfill and crossover backtesting"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch historical candles from SmartAPI and store them as Parquet.
    Backfill {
        /// Path to a TOML config file. Defaults to ./intralab.toml if present.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Fetch a single window starting on this date (YYYY-MM-DD). Requires --to.
        #[arg(long)]
        from: Option<NaiveDate>,

        /// End of the single window, exclusive (YYYY-MM-DD). Requires --from.
        #[arg(long)]
        to: Option<NaiveDate>,

        /// Override [backfill] start_year.
        #[arg(long)]
        start_year: Option<i32>,

        /// Override [backfill] end_year (exclusive).
        #[arg(long)]
        end_year: Option<i32>,

        /// Re-fetch exactly the ranges listed in the missing-range log.
        #[arg(long, default_value_t = false)]
        retry_missing: bool,

        /// Also write the merged candles as CSV with a Return column.
        #[arg(long, default_value_t = false)]
        csv: bool,

        /// Override [backfill] output_dir.
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Env file holding API_KEY, CLIENT_CODE, MPIN and TOTP_SECRET.
        #[arg(long, default_value = DEFAULT_ENV_FILE)]
        env_file: PathBuf,
    },
    /// Replay candles through the crossover strategy and report the trades.
    Backtest {
        /// Path to a TOML config file. Defaults to ./intralab.toml if present.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Parquet artifact or CSV. Defaults to [backtest] data, then the
        /// newest artifact in the backfill output directory.
        #[arg(long)]
        data: Option<PathBuf>,

        /// Profit target as a fraction of entry price (e.g. 0.003).
        #[arg(long)]
        target: Option<f64>,

        /// Stop loss as a fraction of entry price (e.g. 0.001).
        #[arg(long)]
        stop_loss: Option<f64>,

        /// Short moving-average window.
        #[arg(long)]
        short_window: Option<usize>,

        /// Long moving-average window.
        #[arg(long)]
        long_window: Option<usize>,

        /// Units per order.
        #[arg(long)]
        size: Option<f64>,

        /// Starting cash.
        #[arg(long)]
        initial_cash: Option<f64>,

        /// When orders fill: next-bar-open or same-bar-close.
        #[arg(long, value_parser = parse_fill_timing)]
        fill_timing: Option<FillTiming>,

        /// Override [backtest] output_dir.
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Print the summary only; write no CSV/JSON artifacts.
        #[arg(long, default_value_t = false)]
        no_save: bool,
    },
    /// List ranges recorded in the missing-range log, plus stored artifacts.
    Missing {
        /// Path to a TOML config file. Defaults to ./intralab.toml if present.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Override [backfill] output_dir.
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Backfill {
            config,
            from,
            to,
            start_year,
            end_year,
            retry_missing,
            csv,
            output_dir,
            env_file,
        } => {
            let mut config = load_config(config.as_deref())?;
            if let Some(year) = start_year {
                config.backfill.start_year = year;
            }
            if let Some(year) = end_year {
                config.backfill.end_year = year;
            }
            if let Some(dir) = output_dir {
                config.backfill.output_dir = dir;
            }
            config.validate()?;
            let mode = backfill_mode(retry_missing, from, to)?;
            run_backfill(&config, mode, csv, &env_file)
        }
        Commands::Backtest {
            config,
            data,
            target,
            stop_loss,
            short_window,
            long_window,
            size,
            initial_cash,
            fill_timing,
            output_dir,
            no_save,
        } => {
            let mut config = load_config(config.as_deref())?;
            let strategy = &mut config.strategy;
            if let Some(v) = target {
                strategy.target = v;
            }
            if let Some(v) = stop_loss {
                strategy.stop_loss = v;
            }
            if let Some(v) = short_window {
                strategy.short_window = v;
            }
            if let Some(v) = long_window {
                strategy.long_window = v;
            }
            let backtest = &mut config.backtest;
            if let Some(v) = size {
                backtest.size = v;
            }
            if let Some(v) = initial_cash {
                backtest.initial_cash = v;
            }
            if let Some(v) = fill_timing {
                backtest.fill_timing = v;
            }
            if let Some(dir) = output_dir {
                backtest.output_dir = dir;
            }
            config.validate()?;
            run_backtest_cmd(&config, data.as_deref(), no_save)
        }
        Commands::Missing { config, output_dir } => {
            let mut config = load_config(config.as_deref())?;
            if let Some(dir) = output_dir {
                config.backfill.output_dir = dir;
            }
            run_missing(&config)
        }
    }
}

/// `RUST_LOG` wins; otherwise info for the intralab crates.
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("intralab=info")),
        )
        .with_target(false)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<IntraLabConfig> {
    match path {
        Some(path) => IntraLabConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display())),
        None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
            IntraLabConfig::from_file(Path::new(DEFAULT_CONFIG_FILE))
                .with_context(|| format!("loading config {DEFAULT_CONFIG_FILE}"))
        }
        None => Ok(IntraLabConfig::default()),
    }
}

fn backfill_mode(
    retry_missing: bool,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
) -> Result<BackfillMode> {
    match (retry_missing, from, to) {
        (true, None, None) => Ok(BackfillMode::RetryMissing),
        (true, _, _) => bail!("--retry-missing cannot be combined with --from/--to"),
        (false, Some(from), Some(to)) => DateRange::new(from, to)
            .map(BackfillMode::Span)
            .ok_or_else(|| anyhow!("--from ({from}) must be before --to ({to})")),
        (false, None, None) => Ok(BackfillMode::Configured),
        _ => bail!("--from and --to must be given together"),
    }
}

fn parse_fill_timing(s: &str) -> Result<FillTiming, String> {
    match s.to_ascii_lowercase().replace('_', "-").as_str() {
        "next-bar-open" => Ok(FillTiming::NextBarOpen),
        "same-bar-close" => Ok(FillTiming::SameBarClose),
        other => Err(format!(
            "unknown fill timing '{other}' (expected next-bar-open or same-bar-close)"
        )),
    }
}

fn run_backfill(
    config: &IntraLabConfig,
    mode: BackfillMode,
    csv: bool,
    env_file: &Path,
) -> Result<()> {
    let job = BackfillJob::prepare(config, mode)?.with_csv(csv);
    if job.is_empty() {
        println!(
            "Nothing to fetch: no ranges in {}",
            MissingRangeLog::in_dir(&config.backfill.output_dir)
                .path()
                .display()
        );
        return Ok(());
    }

    load_env_file(env_file)?;
    let credentials = credentials_from_env()?;
    let client = SmartApiClient::connect(&credentials).context("SmartAPI login failed")?;
    info!(
        symbol = %job.plan().instrument.symbol,
        ranges = job.ranges().len(),
        "session established"
    );

    let summary = job.run(&client, &ThreadPacer, &StdoutProgress)?;

    match &summary.artifact {
        Some(path) => println!("Data saved to {}", path.display()),
        None => println!("No candles fetched; no artifact written."),
    }
    if let Some(path) = &summary.csv {
        println!("CSV saved to {}", path.display());
    }
    if !summary.report.is_complete() {
        println!(
            "{} range(s) logged to {} (rerun with --retry-missing)",
            summary.report.missing.len(),
            summary.log_path.display()
        );
    }
    Ok(())
}

fn run_backtest_cmd(config: &IntraLabConfig, data: Option<&Path>, no_save: bool) -> Result<()> {
    let data = resolve_data_path(config, data)?;
    let outcome = run_backtest(config, &data)?;

    println!();
    println!("=== Backtest: {} ===", data.display());
    println!(
        "Bars: {}  Signals: {}  Rejected orders: {}",
        outcome.run.bar_count, outcome.run.signal_count, outcome.run.rejected_orders
    );
    if let Some(position) = &outcome.run.open_position {
        println!(
            "Open at end of data: {:?} from {:.2} (not counted)",
            position.side, position.entry_price
        );
    }
    println!();
    print!("{}", outcome.report());

    if !no_save {
        let dir = outcome.save(&config.backtest.output_dir)?;
        println!("Artifacts saved to: {}", dir.display());
    }
    Ok(())
}

fn run_missing(config: &IntraLabConfig) -> Result<()> {
    let dir = &config.backfill.output_dir;
    let log = MissingRangeLog::in_dir(dir);
    let ranges = log.read()?;

    if ranges.is_empty() {
        println!("No missing ranges in {}", log.path().display());
    } else {
        println!("{} missing range(s) in {}:", ranges.len(), log.path().display());
        for range in &ranges {
            println!("  {}", format_line(range));
        }
        let days: i64 = ranges.iter().map(DateRange::days).sum();
        println!("Total: {days} day(s)");
    }

    let store = intralab_core::data::ArtifactStore::new(dir);
    let artifacts = store.list(&config.instrument())?;
    if !artifacts.is_empty() {
        println!();
        println!("{:<50} {:>10}", "Artifact", "Candles");
        println!("{}", "-".repeat(61));
        for path in &artifacts {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let count = match read_meta(path)? {
                Some(meta) => meta.candle_count.to_string(),
                None => "(no meta)".into(),
            };
            println!("{name:<50} {count:>10}");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn backfill_flags_parse() {
        let cli = Cli::try_parse_from([
            "intralab",
            "backfill",
            "--from",
            "2025-01-01",
            "--to",
            "2025-01-31",
            "--csv",
        ])
        .unwrap();
        match cli.command {
            Commands::Backfill { from, to, csv, .. } => {
                assert_eq!(from, Some(d(2025, 1, 1)));
                assert_eq!(to, Some(d(2025, 1, 31)));
                assert!(csv);
            }
            _ => panic!("expected backfill"),
        }
    }

    #[test]
    fn mode_selection() {
        assert_eq!(
            backfill_mode(false, None, None).unwrap(),
            BackfillMode::Configured
        );
        assert_eq!(
            backfill_mode(true, None, None).unwrap(),
            BackfillMode::RetryMissing
        );
        assert_eq!(
            backfill_mode(false, Some(d(2025, 1, 1)), Some(d(2025, 1, 31))).unwrap(),
            BackfillMode::Span(DateRange::new(d(2025, 1, 1), d(2025, 1, 31)).unwrap())
        );
        assert!(backfill_mode(false, Some(d(2025, 1, 1)), None).is_err());
        assert!(backfill_mode(true, Some(d(2025, 1, 1)), Some(d(2025, 1, 31))).is_err());
        assert!(backfill_mode(false, Some(d(2025, 1, 31)), Some(d(2025, 1, 1))).is_err());
    }

    #[test]
    fn fill_timing_spellings() {
        assert_eq!(
            parse_fill_timing("same-bar-close").unwrap(),
            FillTiming::SameBarClose
        );
        assert_eq!(
            parse_fill_timing("NEXT_BAR_OPEN").unwrap(),
            FillTiming::NextBarOpen
        );
        assert!(parse_fill_timing("whenever").is_err());
    }

    #[test]
    fn backtest_overrides_parse() {
        let cli = Cli::try_parse_from([
            "intralab",
            "backtest",
            "--data",
            "h_data/x.csv",
            "--fill-timing",
            "same-bar-close",
            "--short-window",
            "5",
            "--no-save",
        ])
        .unwrap();
        match cli.command {
            Commands::Backtest {
                data,
                fill_timing,
                short_window,
                no_save,
                ..
            } => {
                assert_eq!(data, Some(PathBuf::from("h_data/x.csv")));
                assert_eq!(fill_timing, Some(FillTiming::SameBarClose));
                assert_eq!(short_window, Some(5));
                assert!(no_save);
            }
            _ => panic!("expected backtest"),
        }
    }
}
