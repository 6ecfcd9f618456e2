use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use panel_core::StockCode;

/// An open long position (§3). Created by a buy; augmented by a subsequent
/// buy via the weighted-average cost law (Testable Property 4); removed in
/// full on a complete sell, or shrunk proportionally on a partial sell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LongPosition {
    pub stock: StockCode,
    pub shares: u64,
    pub avg_entry_price: Decimal,
    pub entry_date: NaiveDate,
    pub current_price: Decimal,
}

impl LongPosition {
    pub fn new(stock: impl Into<StockCode>, shares: u64, price: Decimal, date: NaiveDate) -> Self {
        Self {
            stock: stock.into(),
            shares,
            avg_entry_price: price,
            entry_date: date,
            current_price: price,
        }
    }

    /// Merge an additional buy into this position using the weighted-average
    /// cost law: `new_avg = (old_shares*old_avg + add_shares*fill_price) /
    /// (old_shares + add_shares)`. `entry_date` is left untouched — it
    /// always records the *first* buy's date (Scenario S3).
    pub fn merge_buy(&mut self, add_shares: u64, fill_price: Decimal) {
        let old_shares = Decimal::from(self.shares);
        let new_shares_total = self.shares + add_shares;
        let weighted = old_shares * self.avg_entry_price
            + Decimal::from(add_shares) * fill_price;
        self.avg_entry_price = weighted / Decimal::from(new_shares_total);
        self.shares = new_shares_total;
    }

    pub fn market_value(&self, price: Decimal) -> Decimal {
        price * Decimal::from(self.shares)
    }

    /// Trading days (index positions in `all_dates`) this position has been
    /// held as of `today`, used by `stocks_to_sell`'s holding-period check.
    pub fn holding_days(&self, today_index: usize, entry_index: usize) -> usize {
        today_index.saturating_sub(entry_index)
    }
}

/// An open short position (§3). Accrues interest continuously on a 360-day
/// year basis until closed by a buy-to-cover.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShortPosition {
    pub stock: StockCode,
    pub shares: u64,
    pub entry_price: Decimal,
    pub entry_date: NaiveDate,
    pub margin_rate: f64,
    pub initial_notional: Decimal,
}

impl ShortPosition {
    pub fn new(
        stock: impl Into<StockCode>,
        shares: u64,
        entry_price: Decimal,
        entry_date: NaiveDate,
        margin_rate: f64,
    ) -> Self {
        let initial_notional = entry_price * Decimal::from(shares);
        Self {
            stock: stock.into(),
            shares,
            entry_price,
            entry_date,
            margin_rate,
            initial_notional,
        }
    }

    /// Unrealized price P&L as of `current_price`: `(entry - current) * shares`.
    pub fn price_pnl(&self, current_price: Decimal) -> Decimal {
        (self.entry_price - current_price) * Decimal::from(self.shares)
    }

    /// Accrued interest on the initial notional, 360-day year basis
    /// (Scenario S4): `notional * margin_rate * days / 360`.
    pub fn accrued_interest(&self, as_of: NaiveDate) -> Decimal {
        let days = (as_of - self.entry_date).num_days().max(0);
        let rate = Decimal::try_from(self.margin_rate).unwrap_or_default();
        self.initial_notional * rate * Decimal::from(days) / Decimal::from(360)
    }

    /// Net P&L including interest drag: `price_pnl - accrued_interest`.
    pub fn net_pnl(&self, current_price: Decimal, as_of: NaiveDate) -> Decimal {
        self.price_pnl(current_price) - self.accrued_interest(as_of)
    }

    /// Required margin: `notional * margin_ratio` (default 50% per §4.2).
    pub fn required_margin(&self, margin_ratio: Decimal) -> Decimal {
        self.initial_notional * margin_ratio
    }
}
