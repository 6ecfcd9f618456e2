pub mod descriptor;
pub mod report;
pub mod runner;
pub mod signal_builder;

pub use descriptor::{FactoryRegistry, SerializableEngineConfig, StrategyFactory, TaskDescriptor};
pub use report::{ComparisonReport, ComparisonRow};
pub use runner::{MarketData, ParallelBacktester};
pub use signal_builder::build_score_panel;
