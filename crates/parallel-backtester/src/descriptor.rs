//! Serialisable task descriptors and the factory registry that rebuilds
//! a strategy composition inside each worker (§4.10) — grounded on
//! `original_source/core/src/backtest/parallel_backtester.py`'s pattern
//! of shipping a class name + config dict rather than a live object
//! across the task boundary.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use backtest_engine::BacktestConfig;
use panel_core::CoreError;
use strategy_protocol::Composer;

/// One (strategy, params) pair to run against the shared market data
/// (§4.10). Carries only plain data — the composer itself is rebuilt by
/// a [`StrategyFactory`] inside the worker that picks up the task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDescriptor {
    pub task_id: String,
    pub strategy_type: String,
    pub config: Value,
    pub engine_config: SerializableEngineConfig,
}

/// `BacktestConfig` minus its non-serialisable slippage model, which the
/// runner attaches separately (§4.10 "engine/backtest kwargs").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerializableEngineConfig {
    pub top_n: usize,
    pub holding_period: Option<usize>,
    pub rebalance_freq: panel_core::RebalanceFreq,
    pub initial_capital: rust_decimal::Decimal,
    pub book_mode: backtest_engine::BookMode,
    pub short_margin_rate: f64,
    pub lot_size: u64,
}

impl From<&BacktestConfig> for SerializableEngineConfig {
    fn from(c: &BacktestConfig) -> Self {
        Self {
            top_n: c.top_n,
            holding_period: c.holding_period,
            rebalance_freq: c.rebalance_freq,
            initial_capital: c.initial_capital,
            book_mode: c.book_mode,
            short_margin_rate: c.short_margin_rate,
            lot_size: c.lot_size,
        }
    }
}

impl SerializableEngineConfig {
    /// Reattaches commission/margin schedules to rebuild a full
    /// [`BacktestConfig`] inside the worker.
    pub fn into_engine_config(
        self,
        commission_schedule: backtest_engine::CommissionSchedule,
        margin_schedule: backtest_engine::MarginSchedule,
    ) -> BacktestConfig {
        BacktestConfig {
            top_n: self.top_n,
            holding_period: self.holding_period,
            rebalance_freq: self.rebalance_freq,
            initial_capital: self.initial_capital,
            book_mode: self.book_mode,
            commission_schedule,
            margin_schedule,
            short_margin_rate: self.short_margin_rate,
            lot_size: self.lot_size,
        }
    }
}

/// Builds a fresh [`Composer`] from a strategy-type tag and its JSON
/// config. Implementations must not capture any shared mutable state —
/// each call produces an independent strategy instance so two workers
/// running the same `strategy_type` concurrently never interfere.
pub trait StrategyFactory: Send + Sync {
    fn build(&self, config: &Value) -> Result<Composer, CoreError>;
}

impl<F> StrategyFactory for F
where
    F: Fn(&Value) -> Result<Composer, CoreError> + Send + Sync,
{
    fn build(&self, config: &Value) -> Result<Composer, CoreError> {
        self(config)
    }
}

/// Maps `strategy_type` tags to the factory that knows how to rebuild
/// that composition from a config blob.
#[derive(Clone, Default)]
pub struct FactoryRegistry {
    factories: HashMap<String, Arc<dyn StrategyFactory>>,
}

impl FactoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, strategy_type: impl Into<String>, factory: Arc<dyn StrategyFactory>) {
        self.factories.insert(strategy_type.into(), factory);
    }

    pub fn build(&self, strategy_type: &str, config: &Value) -> Result<Composer, CoreError> {
        let factory = self.factories.get(strategy_type).ok_or_else(|| {
            CoreError::InvalidInput(format!("no strategy factory registered for {strategy_type}"))
        })?;
        factory.build(config)
    }
}
