use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use panel_core::RebalanceFreq;

use crate::commission::CommissionSchedule;
use crate::margin::MarginSchedule;

/// Whether the engine runs a single long book or a market-neutral
/// long+short book (§4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BookMode {
    LongOnly,
    MarketNeutral,
}

/// Static configuration for one [`crate::engine::BacktestEngine`] run
/// (§4.5). Holds no market data — only the knobs that shape the day-loop.
#[derive(Debug, Clone)]
pub struct BacktestConfig {
    pub top_n: usize,
    pub holding_period: Option<usize>,
    pub rebalance_freq: RebalanceFreq,
    pub initial_capital: Decimal,
    pub book_mode: BookMode,
    pub commission_schedule: CommissionSchedule,
    pub margin_schedule: MarginSchedule,
    pub short_margin_rate: f64,
    /// Minimum order size in whole shares; real fills are truncated to a
    /// multiple of this (the A-share 100-share lot convention).
    pub lot_size: u64,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            top_n: 10,
            holding_period: None,
            rebalance_freq: RebalanceFreq::Daily,
            initial_capital: Decimal::new(1_000_000, 0),
            book_mode: BookMode::LongOnly,
            commission_schedule: CommissionSchedule::default(),
            margin_schedule: MarginSchedule::default(),
            short_margin_rate: 0.10,
            lot_size: 100,
        }
    }
}

/// One row of the mark-to-market snapshot recorded every trading date
/// (§4.5 step 1).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EquityPoint {
    pub date: chrono::NaiveDate,
    pub cash: Decimal,
    pub long_mv: Decimal,
    pub short_mv: Decimal,
    pub short_pnl: Decimal,
    pub short_interest: Decimal,
    pub total: Decimal,
}

/// Full output of one backtest run.
#[derive(Debug, Clone)]
pub struct BacktestOutput {
    pub equity_curve: Vec<EquityPoint>,
    pub trades: Vec<crate::cost_analyzer::Trade>,
    pub daily_returns: Vec<f64>,
    pub sharpe_ratio: Option<f64>,
    pub max_drawdown: f64,
}

/// Wraps a single strategy-variant run for the parallel backtester facade
/// (C10, §4.10).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestResult {
    pub success: bool,
    pub result: Option<BacktestSummary>,
    pub error: Option<String>,
    pub execution_time_ms: u64,
}

/// Serializable subset of [`BacktestOutput`] used for cross-process/
/// cross-task reporting, where a `Trade`/`EquityPoint` vector would be
/// unnecessarily heavy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestSummary {
    pub final_equity: Decimal,
    pub total_return: f64,
    pub sharpe_ratio: Option<f64>,
    pub max_drawdown: f64,
    pub trade_count: usize,
}

impl From<&BacktestOutput> for BacktestSummary {
    fn from(output: &BacktestOutput) -> Self {
        let initial = output
            .equity_curve
            .first()
            .map(|p| p.total)
            .unwrap_or(Decimal::ZERO);
        let last = output
            .equity_curve
            .last()
            .map(|p| p.total)
            .unwrap_or(Decimal::ZERO);
        let total_return = if initial != Decimal::ZERO {
            use rust_decimal::prelude::ToPrimitive;
            ((last - initial) / initial).to_f64().unwrap_or(0.0)
        } else {
            0.0
        };
        Self {
            final_equity: last,
            total_return,
            sharpe_ratio: output.sharpe_ratio,
            max_drawdown: output.max_drawdown,
            trade_count: output.trades.len(),
        }
    }
}
