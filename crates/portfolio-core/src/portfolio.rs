use std::collections::{HashMap, HashSet};

use chrono::NaiveDate;
use rust_decimal::Decimal;

use panel_core::{CoreError, StockCode};

use crate::positions::{LongPosition, ShortPosition};

/// Snapshot of the short book's valuation as of a single date (§4.4).
#[derive(Debug, Clone, Copy, Default)]
pub struct ShortMetrics {
    pub notional: Decimal,
    pub unrealized_price_pnl: Decimal,
    pub accrued_interest: Decimal,
}

impl ShortMetrics {
    pub fn net_pnl(&self) -> Decimal {
        self.unrealized_price_pnl - self.accrued_interest
    }
}

/// What removing shares from a position releases back to the caller, so the
/// engine can compute realized P&L and commission/tax against the correct
/// cost basis without the portfolio needing to know about trading costs.
#[derive(Debug, Clone, Copy)]
pub struct ClosedLot {
    pub shares: u64,
    pub cost_basis: Decimal,
}

/// In-memory account state: cash plus the long and short books (§3).
///
/// A `Portfolio` never reads a clock or a data source; every query takes
/// the prices and date it should value against, so re-running the same
/// sequence of operations against the same inputs always reaches the same
/// state.
#[derive(Debug, Clone)]
pub struct Portfolio {
    pub cash: Decimal,
    pub long_positions: HashMap<StockCode, LongPosition>,
    pub short_positions: HashMap<StockCode, ShortPosition>,
    pub initial_capital: Decimal,
}

impl Portfolio {
    pub fn new(initial_capital: Decimal) -> Self {
        Self {
            cash: initial_capital,
            long_positions: HashMap::new(),
            short_positions: HashMap::new(),
            initial_capital,
        }
    }

    /// Debit or credit cash. Refuses any mutation that would push cash
    /// negative (Testable Property 2) — the caller must size orders against
    /// available cash *before* calling this.
    pub fn update_cash(&mut self, delta: Decimal) -> Result<(), CoreError> {
        let new_cash = self.cash + delta;
        if new_cash < Decimal::ZERO {
            return Err(CoreError::InvalidInput(format!(
                "cash would go negative: {} + {} = {}",
                self.cash, delta, new_cash
            )));
        }
        self.cash = new_cash;
        Ok(())
    }

    /// Open or add to a long position at `fill_price` on `date`. Merging
    /// uses the weighted-average cost law and preserves the original entry
    /// date (Testable Property 4, Scenario S3).
    pub fn add_long(
        &mut self,
        stock: impl Into<StockCode>,
        shares: u64,
        fill_price: Decimal,
        date: NaiveDate,
    ) {
        let stock = stock.into();
        self.long_positions
            .entry(stock.clone())
            .and_modify(|p| p.merge_buy(shares, fill_price))
            .or_insert_with(|| LongPosition::new(stock, shares, fill_price, date));
    }

    /// Reduce (or fully close) a long position. Errors if the position
    /// doesn't exist or holds fewer shares than requested (Testable
    /// Property 3: a position's share count is never negative).
    pub fn remove_long(
        &mut self,
        stock: &str,
        shares: u64,
    ) -> Result<ClosedLot, CoreError> {
        let pos = self.long_positions.get_mut(stock).ok_or_else(|| {
            CoreError::InvalidInput(format!("no long position in {stock} to sell"))
        })?;
        if shares > pos.shares {
            return Err(CoreError::InvalidInput(format!(
                "cannot sell {shares} shares of {stock}, only {} held",
                pos.shares
            )));
        }
        let cost_basis = pos.avg_entry_price;
        if shares == pos.shares {
            self.long_positions.remove(stock);
        } else {
            pos.shares -= shares;
        }
        Ok(ClosedLot { shares, cost_basis })
    }

    /// Open or add to a short position. Unlike longs, repeated shorts on the
    /// same stock are kept as independent lots rather than weight-averaged,
    /// since each carries its own interest-accrual clock from its own entry
    /// date; a second short on an already-shorted stock replaces the
    /// existing lot only if the caller has already closed it.
    pub fn add_short(
        &mut self,
        stock: impl Into<StockCode>,
        shares: u64,
        entry_price: Decimal,
        date: NaiveDate,
        margin_rate: f64,
    ) {
        let stock = stock.into();
        self.short_positions
            .insert(stock.clone(), ShortPosition::new(stock, shares, entry_price, date, margin_rate));
    }

    /// Close (cover) a short position in full. Partial covers are not
    /// modeled: the margin desk in this book treats a short as a single
    /// lot closed atomically.
    pub fn remove_short(&mut self, stock: &str) -> Result<ShortPosition, CoreError> {
        self.short_positions
            .remove(stock)
            .ok_or_else(|| CoreError::InvalidInput(format!("no short position in {stock} to cover")))
    }

    /// Total mark-to-market value of the long book at `prices`. Stocks
    /// without a price on the given date are valued at their
    /// last-recorded `current_price` rather than dropped, so a single
    /// trading halt doesn't erase a position from equity.
    pub fn long_holdings_value(&self, prices: &HashMap<StockCode, Decimal>) -> Decimal {
        self.long_positions
            .values()
            .map(|p| {
                let px = prices.get(&p.stock).copied().unwrap_or(p.current_price);
                p.market_value(px)
            })
            .sum()
    }

    /// Mark-to-market snapshot of the short book as of `as_of`.
    pub fn short_metrics(
        &self,
        prices: &HashMap<StockCode, Decimal>,
        as_of: NaiveDate,
    ) -> ShortMetrics {
        let mut m = ShortMetrics::default();
        for pos in self.short_positions.values() {
            let px = prices.get(&pos.stock).copied().unwrap_or(pos.entry_price);
            m.notional += pos.initial_notional;
            m.unrealized_price_pnl += pos.price_pnl(px);
            m.accrued_interest += pos.accrued_interest(as_of);
        }
        m
    }

    /// Total account equity: cash plus long market value plus the short
    /// book's net unrealized P&L (interest-adjusted).
    pub fn total_value(&self, prices: &HashMap<StockCode, Decimal>, as_of: NaiveDate) -> Decimal {
        self.cash + self.long_holdings_value(prices) + self.short_metrics(prices, as_of).net_pnl()
    }

    /// Longs to exit on `today`: held stocks that either fell out of the
    /// new top-selection set, or have reached `holding_period` trading
    /// days since entry. `date_index` maps a calendar date to its position
    /// in the trading calendar, used to measure holding period in trading
    /// days rather than wall-clock days.
    pub fn stocks_to_sell(
        &self,
        new_top: &HashSet<StockCode>,
        today: NaiveDate,
        holding_period: Option<usize>,
        date_index: impl Fn(NaiveDate) -> Option<usize>,
    ) -> Vec<StockCode> {
        let today_idx = date_index(today);
        self.long_positions
            .values()
            .filter(|p| {
                let fell_out = !new_top.contains(&p.stock);
                let aged_out = match (holding_period, today_idx, date_index(p.entry_date)) {
                    (Some(hp), Some(t), Some(e)) => t.saturating_sub(e) >= hp,
                    _ => false,
                };
                fell_out || aged_out
            })
            .map(|p| p.stock.clone())
            .collect()
    }

    /// Shorts to cover on `today`: symmetric to [`Self::stocks_to_sell`] but
    /// over the short book, using the same new-selection-set and
    /// holding-period rule.
    pub fn shorts_to_cover(
        &self,
        new_top: &HashSet<StockCode>,
        today: NaiveDate,
        holding_period: Option<usize>,
        date_index: impl Fn(NaiveDate) -> Option<usize>,
    ) -> Vec<StockCode> {
        let today_idx = date_index(today);
        self.short_positions
            .values()
            .filter(|p| {
                let fell_out = !new_top.contains(&p.stock);
                let aged_out = match (holding_period, today_idx, date_index(p.entry_date)) {
                    (Some(hp), Some(t), Some(e)) => t.saturating_sub(e) >= hp,
                    _ => false,
                };
                fell_out || aged_out
            })
            .map(|p| p.stock.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn cash_never_goes_negative() {
        let mut pf = Portfolio::new(dec!(1000));
        assert!(pf.update_cash(dec!(-1500)).is_err());
        assert_eq!(pf.cash, dec!(1000));
        assert!(pf.update_cash(dec!(-1000)).is_ok());
        assert_eq!(pf.cash, dec!(0));
    }

    #[test]
    fn add_long_merges_with_weighted_average_cost() {
        let mut pf = Portfolio::new(dec!(100000));
        pf.add_long("AAA", 1000, dec!(10), d(2024, 1, 2));
        pf.add_long("AAA", 500, dec!(12), d(2024, 1, 3));
        let pos = &pf.long_positions["AAA"];
        assert_eq!(pos.shares, 1500);
        assert_eq!(pos.entry_date, d(2024, 1, 2));
        let expected = (dec!(1000) * dec!(10) + dec!(500) * dec!(12)) / dec!(1500);
        assert_eq!(pos.avg_entry_price, expected);
    }

    #[test]
    fn remove_long_rejects_oversell_and_full_close_removes_position() {
        let mut pf = Portfolio::new(dec!(100000));
        pf.add_long("AAA", 100, dec!(10), d(2024, 1, 2));
        assert!(pf.remove_long("AAA", 200).is_err());
        let lot = pf.remove_long("AAA", 100).unwrap();
        assert_eq!(lot.shares, 100);
        assert_eq!(lot.cost_basis, dec!(10));
        assert!(!pf.long_positions.contains_key("AAA"));
    }

    #[test]
    fn stocks_to_sell_flags_fell_out_and_aged_out() {
        let mut pf = Portfolio::new(dec!(100000));
        pf.add_long("AAA", 100, dec!(10), d(2024, 1, 2));
        pf.add_long("BBB", 100, dec!(10), d(2024, 1, 2));
        let dates = vec![d(2024, 1, 2), d(2024, 1, 3), d(2024, 1, 4), d(2024, 1, 5)];
        let idx = |date: NaiveDate| dates.iter().position(|&x| x == date);

        let new_top: HashSet<StockCode> = ["AAA".into()].into_iter().collect();
        let to_sell = pf.stocks_to_sell(&new_top, d(2024, 1, 4), Some(10), idx);
        assert_eq!(to_sell, vec!["BBB".to_string()]);

        let to_sell_aged = pf.stocks_to_sell(&new_top, d(2024, 1, 5), Some(2), idx);
        let mut sorted = to_sell_aged.clone();
        sorted.sort();
        assert_eq!(sorted, vec!["AAA".to_string(), "BBB".to_string()]);
    }

    #[test]
    fn total_value_sums_cash_long_and_short_net_pnl() {
        let mut pf = Portfolio::new(dec!(100000));
        pf.update_cash(dec!(-20000)).unwrap();
        pf.add_long("AAA", 1000, dec!(10), d(2024, 1, 2));
        pf.add_short("BBB", 500, dec!(20), d(2024, 1, 2), 0.0);

        let mut prices = HashMap::new();
        prices.insert("AAA".to_string(), dec!(11));
        prices.insert("BBB".to_string(), dec!(18));

        let total = pf.total_value(&prices, d(2024, 1, 2));
        // cash 80000 + long 1000*11=11000 + short (20-18)*500=1000 (no interest, same day)
        assert_eq!(total, dec!(80000) + dec!(11000) + dec!(1000));
    }
}
