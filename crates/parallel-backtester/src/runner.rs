//! Dispatches a batch of [`TaskDescriptor`]s through `parallel-exec` and
//! rebuilds each strategy inside its worker (§4.10). Declared with a
//! `ParallelProcess` backend tag to match the spec's "process backend"
//! wording; the executor itself only ever provisions OS threads (no
//! process-backend implementation exists in this core — see
//! `parallel-exec::ExecutorBackend`), so cross-task isolation here comes
//! from rebuilding the composer per task rather than from real process
//! boundaries.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use backtest_engine::{BacktestConfig, BacktestEngine, BacktestResult, BacktestSummary, CommissionSchedule, MarginSchedule, SlippageModel};
use panel_core::{OhlcvPanel, PricePanel, StockCode};
use parallel_exec::{ExecutorBackend, ParallelExecutor, WorkerCount};
use strategy_protocol::Composer;

use crate::descriptor::{FactoryRegistry, TaskDescriptor};
use crate::signal_builder::build_score_panel;

/// Shared, read-only market data passed to every worker. Workers never
/// mutate it (§5 Shared resources); cloning the `Arc` is the only copy
/// that crosses the task boundary.
pub struct MarketData {
    pub prices: PricePanel,
    pub stock_data: HashMap<StockCode, OhlcvPanel>,
}

pub struct ParallelBacktester {
    executor: ParallelExecutor,
    factories: FactoryRegistry,
    commission_schedule: CommissionSchedule,
    margin_schedule: MarginSchedule,
    slippage_factory: Arc<dyn Fn() -> Box<dyn SlippageModel> + Send + Sync>,
}

impl ParallelBacktester {
    pub fn new(
        factories: FactoryRegistry,
        commission_schedule: CommissionSchedule,
        margin_schedule: MarginSchedule,
        slippage_factory: Arc<dyn Fn() -> Box<dyn SlippageModel> + Send + Sync>,
    ) -> Self {
        Self {
            executor: ParallelExecutor::new(ExecutorBackend::ParallelProcess, WorkerCount::AllButOne, true),
            factories,
            commission_schedule,
            margin_schedule,
            slippage_factory,
        }
    }

    pub fn with_worker_count(mut self, workers: WorkerCount) -> Self {
        self.executor = ParallelExecutor::new(ExecutorBackend::ParallelProcess, workers, true);
        self
    }

    /// Runs every task in `tasks` against the same `market_data`, in
    /// input order regardless of worker completion order (§5 Ordering
    /// guarantees). A task that panics or errors never aborts its peers
    /// — its slot carries `BacktestResult { success: false, .. }`.
    pub fn run_batch(&self, tasks: Vec<TaskDescriptor>, market_data: Arc<MarketData>) -> Vec<BacktestResult> {
        let factories = self.factories.clone();
        let commission_schedule = self.commission_schedule.clone();
        let margin_schedule = self.margin_schedule.clone();
        let slippage_factory = Arc::clone(&self.slippage_factory);

        let results = self.executor.map(
            tasks,
            move |task| {
                run_one_task(
                    &task,
                    &market_data,
                    &factories,
                    &commission_schedule,
                    &margin_schedule,
                    slippage_factory.as_ref(),
                )
            },
            true,
        );

        results.unwrap_or_default()
    }
}

fn run_one_task(
    task: &TaskDescriptor,
    market_data: &MarketData,
    factories: &FactoryRegistry,
    commission_schedule: &CommissionSchedule,
    margin_schedule: &MarginSchedule,
    slippage_factory: &(dyn Fn() -> Box<dyn SlippageModel> + Send + Sync),
) -> Result<BacktestResult, String> {
    let started = Instant::now();

    let outcome = (|| -> Result<BacktestSummary, String> {
        let composer = factories
            .build(&task.strategy_type, &task.config)
            .map_err(|e| e.to_string())?;

        let calendar = market_data.prices.calendar();
        let signals = build_score_panel(&composer, &market_data.prices, &market_data.stock_data, calendar)
            .map_err(|e| e.to_string())?;

        let engine_config: BacktestConfig = task
            .engine_config
            .clone()
            .into_engine_config(commission_schedule.clone(), margin_schedule.clone());

        let Composer { exit, .. } = composer;
        let engine = BacktestEngine::new(engine_config, slippage_factory())
            .with_exit_strategy(exit, market_data.stock_data.clone());
        let output = engine
            .run(&signals, &market_data.prices)
            .map_err(|e| e.to_string())?;

        Ok(BacktestSummary::from(&output))
    })();

    let execution_time_ms = started.elapsed().as_millis() as u64;
    Ok(match outcome {
        Ok(summary) => BacktestResult {
            success: true,
            result: Some(summary),
            error: None,
            execution_time_ms,
        },
        Err(message) => BacktestResult {
            success: false,
            result: None,
            error: Some(message),
            execution_time_ms,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{SerializableEngineConfig, StrategyFactory};
    use backtest_engine::{BookMode, FixedSlippage};
    use chrono::NaiveDate;
    use panel_core::{CoreError, RebalanceFreq, ScorePanel, TradingCalendar};
    use serde_json::Value;
    use strategy_protocol::params::ParamSchema;
    use strategy_protocol::traits::{EntryStrategy, ExitStrategy, PositionView, StockSelector, StrategyMetadata};

    struct AllInSelector;
    impl StrategyMetadata for AllInSelector {
        fn id(&self) -> &str {
            "all_in"
        }
        fn name(&self) -> &str {
            "All-in"
        }
        fn get_parameters(&self) -> ParamSchema {
            ParamSchema::default()
        }
        fn params(&self) -> HashMap<String, Value> {
            HashMap::new()
        }
    }
    impl StockSelector for AllInSelector {
        fn select(&self, _date: NaiveDate, market_data: &PricePanel) -> Result<Vec<StockCode>, CoreError> {
            Ok(market_data.stocks())
        }
    }
    impl EntryStrategy for AllInSelector {
        fn generate_entry_signals(
            &self,
            candidate_stocks: &[StockCode],
            _stock_data: &HashMap<StockCode, OhlcvPanel>,
            _date: NaiveDate,
        ) -> Result<HashMap<StockCode, f64>, CoreError> {
            Ok(candidate_stocks.iter().map(|s| (s.clone(), 1.0)).collect())
        }
    }
    impl ExitStrategy for AllInSelector {
        fn generate_exit_signals(
            &self,
            _positions: &HashMap<StockCode, PositionView>,
            _stock_data: &HashMap<StockCode, OhlcvPanel>,
            _date: NaiveDate,
        ) -> Result<Vec<StockCode>, CoreError> {
            Ok(vec![])
        }
    }

    fn dates(n: i64) -> Vec<NaiveDate> {
        let start = NaiveDate::from_ymd_opt(2023, 1, 2).unwrap();
        (0..n).map(|i| start + chrono::Duration::days(i)).collect()
    }

    fn sample_market_data() -> Arc<MarketData> {
        let calendar = TradingCalendar::new(dates(10)).unwrap();
        let mut prices = PricePanel::new(calendar.clone());
        for (i, d) in calendar.as_slice().iter().enumerate() {
            prices.insert("A", *d, 10.0 + i as f64);
        }
        Arc::new(MarketData {
            prices,
            stock_data: HashMap::new(),
        })
    }

    fn registry() -> FactoryRegistry {
        let mut registry = FactoryRegistry::new();
        let factory: Arc<dyn StrategyFactory> = Arc::new(|_config: &Value| -> Result<Composer, CoreError> {
            Composer::new(
                Box::new(AllInSelector),
                Box::new(AllInSelector),
                Box::new(AllInSelector),
                RebalanceFreq::Daily,
            )
        });
        registry.register("all_in", factory);
        registry
    }

    fn task(id: &str) -> TaskDescriptor {
        TaskDescriptor {
            task_id: id.to_string(),
            strategy_type: "all_in".to_string(),
            config: Value::Null,
            engine_config: SerializableEngineConfig::from(&BacktestConfig {
                top_n: 1,
                book_mode: BookMode::LongOnly,
                ..Default::default()
            }),
        }
    }

    #[test]
    fn runs_a_batch_and_preserves_task_order() {
        let backtester = ParallelBacktester::new(
            registry(),
            CommissionSchedule::default(),
            MarginSchedule::default(),
            Arc::new(|| Box::new(FixedSlippage { pct: 0.0 }) as Box<dyn SlippageModel>),
        );
        let tasks = vec![task("t1"), task("t2"), task("t3")];
        let results = backtester.run_batch(tasks, sample_market_data());
        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|r| r.success));
    }

    #[test]
    fn unknown_strategy_type_fails_that_task_only() {
        let backtester = ParallelBacktester::new(
            registry(),
            CommissionSchedule::default(),
            MarginSchedule::default(),
            Arc::new(|| Box::new(FixedSlippage { pct: 0.0 }) as Box<dyn SlippageModel>),
        );
        let mut bad = task("bad");
        bad.strategy_type = "does_not_exist".to_string();
        let results = backtester.run_batch(vec![bad, task("good")], sample_market_data());
        assert_eq!(results.len(), 2);
        assert!(!results[0].success);
        assert!(results[1].success);
    }

    #[test]
    fn empty_panel_produces_empty_score_panel_without_error() {
        let calendar = TradingCalendar::new(dates(3)).unwrap();
        let prices = PricePanel::new(calendar.clone());
        let scores = ScorePanel::new(calendar);
        assert!(scores.row(*prices.calendar().as_slice().first().unwrap()).is_empty());
    }
}
