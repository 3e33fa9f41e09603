//! Plain-text backtest summary.

use std::fmt::Write;

use crate::analytics::{PerformanceSummary, TradeSummary};

const LABEL_WIDTH: usize = 38;
const VALUE_WIDTH: usize = 15;

fn border(out: &mut String) {
    let _ = writeln!(
        out,
        "+{}+{}+",
        "-".repeat(LABEL_WIDTH + 2),
        "-".repeat(VALUE_WIDTH + 2)
    );
}

fn row(out: &mut String, label: &str, value: &str) {
    let _ = writeln!(out, "| {label:<LABEL_WIDTH$} | {value:<VALUE_WIDTH$} |");
}

/// The trade-count table.
pub fn summary_table(summary: &TradeSummary) -> String {
    let mut out = String::new();
    border(&mut out);
    row(&mut out, "Metric", "Value");
    border(&mut out);
    row(&mut out, "Total Closed Trades", &summary.total.to_string());
    row(&mut out, "Long Trades", &summary.long.to_string());
    row(&mut out, "Short Trades", &summary.short.to_string());
    row(&mut out, "Winning Trades", &summary.winners.to_string());
    row(&mut out, "Losing Trades", &summary.losers.to_string());
    row(
        &mut out,
        "Winning Probability (%)",
        &format!("{:.2}%", summary.win_probability),
    );
    border(&mut out);
    out
}

/// Portfolio values, the trade table and the equity figures.
pub fn render_report(summary: &TradeSummary, performance: &PerformanceSummary) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Starting Portfolio Value: {:.2}",
        performance.initial_cash
    );
    let _ = writeln!(out, "Final Portfolio Value: {:.2}", performance.final_value);
    out.push('\n');
    out.push_str(&summary_table(summary));

    border(&mut out);
    row(&mut out, "Net PnL", &format!("{:.2}", performance.net_pnl));
    row(
        &mut out,
        "Total Return (%)",
        &format!("{:.2}%", performance.total_return * 100.0),
    );
    row(
        &mut out,
        "Max Drawdown (%)",
        &format!("{:.2}%", performance.max_drawdown * 100.0),
    );
    border(&mut out);
    out
}
