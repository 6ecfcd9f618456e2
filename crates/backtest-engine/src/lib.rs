pub mod commission;
pub mod cost_analyzer;
pub mod engine;
pub mod margin;
pub mod models;
pub mod performance;
pub mod slippage;

pub use commission::*;
pub use cost_analyzer::*;
pub use engine::*;
pub use margin::*;
pub use models::*;
pub use performance::*;
pub use slippage::*;
