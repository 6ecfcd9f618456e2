use std::collections::HashMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;

use panel_core::{CoreError, OhlcvPanel, PricePanel, StockCode};

use crate::params::ParamSchema;

/// Read-only view of one open position passed into [`ExitStrategy`]
/// callbacks. Deliberately independent of `portfolio-core`'s storage
/// representation so a strategy can be evaluated without taking a
/// dependency on how the engine keeps its books.
#[derive(Debug, Clone, Copy)]
pub struct PositionView {
    pub shares: u64,
    pub entry_price: Decimal,
    pub entry_date: NaiveDate,
    pub current_price: Decimal,
    pub is_short: bool,
}

impl PositionView {
    /// Unrealized return as a fraction of entry price, sign-adjusted for
    /// direction (positive is favorable regardless of long/short).
    pub fn unrealized_return(&self) -> f64 {
        let entry = self.entry_price.to_string().parse::<f64>().unwrap_or(0.0);
        let current = self.current_price.to_string().parse::<f64>().unwrap_or(0.0);
        if entry == 0.0 {
            return 0.0;
        }
        if self.is_short {
            (entry - current) / entry
        } else {
            (current - entry) / entry
        }
    }
}

/// A strategy component's stable identity plus its parameter contract
/// (§3 Strategy metadata). Every [`StockSelector`], [`EntryStrategy`], and
/// [`ExitStrategy`] implementation carries one of these.
pub trait StrategyMetadata: Send + Sync {
    fn id(&self) -> &str;
    fn name(&self) -> &str;
    fn get_parameters(&self) -> ParamSchema;
    fn params(&self) -> HashMap<String, serde_json::Value>;
}

/// Picks candidate stocks on a rebalance date (§4.7). Called on rebalance
/// dates only — the backtest engine never invokes `select` between
/// rebalances.
pub trait StockSelector: StrategyMetadata {
    fn select(&self, date: NaiveDate, market_data: &PricePanel) -> Result<Vec<StockCode>, CoreError>;
}

/// Assigns entry weights to a set of candidates already chosen by the
/// selector (§4.7). Weights need not sum to one; the engine normalizes
/// before sizing orders.
pub trait EntryStrategy: StrategyMetadata {
    fn generate_entry_signals(
        &self,
        candidate_stocks: &[StockCode],
        stock_data: &HashMap<StockCode, OhlcvPanel>,
        date: NaiveDate,
    ) -> Result<HashMap<StockCode, f64>, CoreError>;
}

/// Decides which currently-held stocks should be exited on a given date
/// (§4.7). Receives a read-only view of each open position; returns the
/// subset that should be closed.
pub trait ExitStrategy: StrategyMetadata {
    fn generate_exit_signals(
        &self,
        positions: &HashMap<StockCode, PositionView>,
        stock_data: &HashMap<StockCode, OhlcvPanel>,
        date: NaiveDate,
    ) -> Result<Vec<StockCode>, CoreError>;
}
