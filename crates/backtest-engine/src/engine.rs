use std::collections::{HashMap, HashSet};

use chrono::NaiveDate;
use rust_decimal::prelude::*;
use rust_decimal::Decimal;

use panel_core::{CoreError, OhlcvPanel, PricePanel, ScorePanel, StockCode, TradingCalendar};
use portfolio_core::Portfolio;
use strategy_protocol::traits::{ExitStrategy, PositionView};

use crate::cost_analyzer::{Trade, TradeAction};
use crate::models::{BacktestConfig, BacktestOutput, BookMode, EquityPoint};
use crate::performance;
use crate::slippage::{FillContext, SlippageModel};

/// Day-loop state machine over a score panel and a price panel (§4.5).
///
/// Holds no market data of its own — `run` takes the signals and prices
/// for one pass and returns a fresh [`BacktestOutput`]. A single instance
/// is reused across runs (different data, same cost/sizing rules) or
/// across the chunks of one run in [`Self::run_chunked`].
pub struct BacktestEngine {
    config: BacktestConfig,
    slippage: Box<dyn SlippageModel>,
    exit: Option<(Box<dyn ExitStrategy>, HashMap<StockCode, OhlcvPanel>)>,
}

impl BacktestEngine {
    pub fn new(config: BacktestConfig, slippage: Box<dyn SlippageModel>) -> Self {
        Self { config, slippage, exit: None }
    }

    /// Wires the three-layer protocol's exit layer into the day-loop: at
    /// every rebalance date, currently-held positions are offered to
    /// `exit.generate_exit_signals` alongside the usual top-N/holding-period
    /// sell decision, and anything it names is force-exited even if it
    /// would otherwise stay in the book.
    pub fn with_exit_strategy(
        mut self,
        exit: Box<dyn ExitStrategy>,
        stock_data: HashMap<StockCode, OhlcvPanel>,
    ) -> Self {
        self.exit = Some((exit, stock_data));
        self
    }

    /// Run the full backtest over the common intersection of `signals`
    /// and `prices`' date indices.
    pub fn run(&self, signals: &ScorePanel, prices: &PricePanel) -> Result<BacktestOutput, CoreError> {
        let dates = signals.calendar().intersect(prices.calendar());
        if dates.is_empty() {
            return Err(CoreError::InvalidInput(
                "signals and prices share no common trading dates".to_string(),
            ));
        }
        let calendar = TradingCalendar::new(dates.clone())?;

        let mut portfolio = Portfolio::new(self.config.initial_capital);
        let mut trades = Vec::new();
        let equity_curve = self.simulate_window(&dates, &calendar, signals, prices, &mut portfolio, &mut trades);

        Ok(self.finish(equity_curve, trades))
    }

    /// Chunked variant (§4.5 Chunked mode): slices the date axis into
    /// windows of `chunk_size` with a `holding_period`-sized overlap on
    /// both sides, carrying portfolio state across window boundaries, and
    /// keeps only each window's non-overlap interior in the output — the
    /// equity series this produces should equal [`Self::run`]'s modulo
    /// numerical noise (Testable Property 7).
    pub fn run_chunked(
        &self,
        signals: &ScorePanel,
        prices: &PricePanel,
        chunk_size: usize,
        overlap: usize,
    ) -> Result<BacktestOutput, CoreError> {
        let dates = signals.calendar().intersect(prices.calendar());
        if dates.is_empty() {
            return Err(CoreError::InvalidInput(
                "signals and prices share no common trading dates".to_string(),
            ));
        }
        if chunk_size == 0 {
            return Err(CoreError::InvalidInput("chunk_size must be positive".to_string()));
        }
        let calendar = TradingCalendar::new(dates.clone())?;

        let mut portfolio = Portfolio::new(self.config.initial_capital);
        let mut all_equity = Vec::new();
        let mut all_trades = Vec::new();

        let n = dates.len();
        let mut interior_start = 0usize;
        while interior_start < n {
            let interior_end = (interior_start + chunk_size).min(n);
            let window_start = interior_start.saturating_sub(overlap);
            let window_end = (interior_end + overlap).min(n);
            let window_dates = &dates[window_start..window_end];

            let mut window_trades = Vec::new();
            let window_equity =
                self.simulate_window(window_dates, &calendar, signals, prices, &mut portfolio, &mut window_trades);

            let interior_lo = dates[interior_start];
            let interior_hi = dates[interior_end - 1];
            all_equity.extend(
                window_equity
                    .into_iter()
                    .filter(|p| p.date >= interior_lo && p.date <= interior_hi),
            );
            all_trades.extend(
                window_trades
                    .into_iter()
                    .filter(|t| t.date >= interior_lo && t.date <= interior_hi),
            );

            interior_start = interior_end;
        }

        Ok(self.finish(all_equity, all_trades))
    }

    fn finish(&self, equity_curve: Vec<EquityPoint>, trades: Vec<Trade>) -> BacktestOutput {
        let values: Vec<f64> = equity_curve
            .iter()
            .map(|p| p.total.to_f64().unwrap_or(0.0))
            .collect();
        let daily_returns = performance::daily_returns(&values);
        let sharpe_ratio = performance::sharpe_ratio(&daily_returns, 0.02);
        let (max_drawdown, _) = performance::max_drawdown(&values);
        BacktestOutput {
            equity_curve,
            trades,
            daily_returns,
            sharpe_ratio,
            max_drawdown,
        }
    }

    /// Core day loop over `window_dates`, using `full_calendar` for T+1
    /// and holding-period lookups so a window boundary never changes the
    /// fill date a decision would have had in an unchunked run.
    fn simulate_window(
        &self,
        window_dates: &[NaiveDate],
        full_calendar: &TradingCalendar,
        signals: &ScorePanel,
        prices: &PricePanel,
        portfolio: &mut Portfolio,
        trades_out: &mut Vec<Trade>,
    ) -> Vec<EquityPoint> {
        let rebalance_set: HashSet<NaiveDate> = full_calendar
            .rebalance_dates(self.config.rebalance_freq)
            .into_iter()
            .collect();

        let mut equity_curve = Vec::with_capacity(window_dates.len());

        for &d in window_dates {
            let prices_today = self.prices_at(prices, d);

            let short_metrics = portfolio.short_metrics(&prices_today, d);
            let long_mv = portfolio.long_holdings_value(&prices_today);
            let total = portfolio.cash + long_mv + short_metrics.net_pnl();
            equity_curve.push(EquityPoint {
                date: d,
                cash: portfolio.cash,
                long_mv,
                short_mv: short_metrics.notional,
                short_pnl: short_metrics.unrealized_price_pnl,
                short_interest: short_metrics.accrued_interest,
                total,
            });

            if !rebalance_set.contains(&d) {
                continue;
            }

            let Some(d_next) = full_calendar.next_after(d) else {
                continue; // last index: decision dropped, nothing to fill.
            };

            self.rebalance(
                d,
                d_next,
                signals,
                prices,
                full_calendar,
                portfolio,
                trades_out,
            );
        }

        equity_curve
    }

    fn prices_at(&self, prices: &PricePanel, date: NaiveDate) -> HashMap<StockCode, Decimal> {
        prices
            .row(date)
            .into_iter()
            .filter_map(|(stock, px)| Decimal::from_f64(px).map(|d| (stock, d)))
            .collect()
    }

    fn ranked_scores(&self, signals: &ScorePanel, date: NaiveDate) -> Vec<(StockCode, f64)> {
        let mut row: Vec<(StockCode, f64)> = signals
            .row(date)
            .into_iter()
            .filter(|(_, score)| !score.is_nan())
            .collect();
        row.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        row
    }

    fn rebalance(
        &self,
        decision_date: NaiveDate,
        fill_date: NaiveDate,
        signals: &ScorePanel,
        prices: &PricePanel,
        calendar: &TradingCalendar,
        portfolio: &mut Portfolio,
        trades_out: &mut Vec<Trade>,
    ) {
        let ranked = self.ranked_scores(signals, decision_date);
        let top_n = self.config.top_n.min(ranked.len());
        let new_top: HashSet<StockCode> = ranked[..top_n].iter().map(|(s, _)| s.clone()).collect();

        let bottom_set: HashSet<StockCode> = if self.config.book_mode == BookMode::MarketNeutral {
            let bottom_n = self.config.top_n.min(ranked.len());
            ranked[ranked.len() - bottom_n..]
                .iter()
                .map(|(s, _)| s.clone())
                .collect()
        } else {
            HashSet::new()
        };

        let date_index = |d: NaiveDate| calendar.index_of(d);
        let decision_prices = self.prices_at(prices, decision_date);
        let exit_flagged = self.exit_flagged_stocks(decision_date, portfolio, &decision_prices);

        let mut sell_list = portfolio.stocks_to_sell(&new_top, decision_date, self.config.holding_period, date_index);
        for stock in &exit_flagged {
            if portfolio.long_positions.contains_key(stock) && !sell_list.contains(stock) {
                sell_list.push(stock.clone());
            }
        }
        let mut cover_list = if self.config.book_mode == BookMode::MarketNeutral {
            portfolio.shorts_to_cover(&bottom_set, decision_date, self.config.holding_period, date_index)
        } else {
            Vec::new()
        };
        for stock in &exit_flagged {
            if portfolio.short_positions.contains_key(stock) && !cover_list.contains(stock) {
                cover_list.push(stock.clone());
            }
        }

        let fill_prices = self.prices_at(prices, fill_date);

        for stock in &sell_list {
            self.execute_sell(stock, fill_date, &fill_prices, portfolio, trades_out);
        }
        for stock in &cover_list {
            self.execute_cover(stock, fill_date, &fill_prices, portfolio, trades_out);
        }

        // Both halves of the market-neutral book are funded from the same
        // pre-rebalance cash figure, captured before the buy loop runs.
        let pre_rebalance_cash = portfolio.cash;

        let currently_long: HashSet<StockCode> = portfolio.long_positions.keys().cloned().collect();
        let buy_list: Vec<StockCode> = new_top.difference(&currently_long).cloned().collect();
        if !buy_list.is_empty() {
            let allocation_pool = if self.config.book_mode == BookMode::MarketNeutral {
                pre_rebalance_cash / Decimal::from(2)
            } else {
                pre_rebalance_cash
            };
            let per_stock_budget = allocation_pool / Decimal::from(buy_list.len() as u64);
            for stock in &buy_list {
                self.execute_buy(stock, fill_date, &fill_prices, per_stock_budget, portfolio, trades_out);
            }
        }

        if self.config.book_mode == BookMode::MarketNeutral {
            let currently_short: HashSet<StockCode> = portfolio.short_positions.keys().cloned().collect();
            let short_list: Vec<StockCode> = bottom_set.difference(&currently_short).cloned().collect();
            if !short_list.is_empty() {
                let allocation_pool = pre_rebalance_cash / Decimal::from(2);
                let per_stock_budget = allocation_pool / Decimal::from(short_list.len() as u64);
                for stock in &short_list {
                    self.execute_short(stock, fill_date, &fill_prices, per_stock_budget, portfolio, trades_out);
                }
            }
        }
    }

    /// Runs the exit layer (if wired via [`Self::with_exit_strategy`])
    /// against every currently-held position and returns the stocks it
    /// names, regardless of whether the top-N/holding-period rule would
    /// otherwise keep them. Positions and OHLCV history are both truncated
    /// to `date` so the exit layer never sees future data.
    fn exit_flagged_stocks(
        &self,
        date: NaiveDate,
        portfolio: &Portfolio,
        decision_prices: &HashMap<StockCode, Decimal>,
    ) -> HashSet<StockCode> {
        let Some((exit, stock_data)) = self.exit.as_ref() else {
            return HashSet::new();
        };

        let mut positions: HashMap<StockCode, PositionView> = HashMap::new();
        for (stock, pos) in &portfolio.long_positions {
            let current_price = decision_prices.get(stock).copied().unwrap_or(pos.avg_entry_price);
            positions.insert(
                stock.clone(),
                PositionView {
                    shares: pos.shares,
                    entry_price: pos.avg_entry_price,
                    entry_date: pos.entry_date,
                    current_price,
                    is_short: false,
                },
            );
        }
        for (stock, pos) in &portfolio.short_positions {
            let current_price = decision_prices.get(stock).copied().unwrap_or(pos.entry_price);
            positions.insert(
                stock.clone(),
                PositionView {
                    shares: pos.shares,
                    entry_price: pos.entry_price,
                    entry_date: pos.entry_date,
                    current_price,
                    is_short: true,
                },
            );
        }
        if positions.is_empty() {
            return HashSet::new();
        }

        let truncated_data: HashMap<StockCode, OhlcvPanel> = positions
            .keys()
            .filter_map(|stock| stock_data.get(stock).map(|panel| (stock.clone(), panel.truncated_to(date))))
            .collect();

        match exit.generate_exit_signals(&positions, &truncated_data, date) {
            Ok(flagged) => flagged.into_iter().collect(),
            Err(err) => {
                tracing::warn!(date = %date, error = %err, "exit strategy failed; no forced exits this rebalance");
                HashSet::new()
            }
        }
    }

    fn execute_sell(
        &self,
        stock: &str,
        fill_date: NaiveDate,
        fill_prices: &HashMap<StockCode, Decimal>,
        portfolio: &mut Portfolio,
        trades_out: &mut Vec<Trade>,
    ) {
        let Some(&reference_price) = fill_prices.get(stock) else {
            return;
        };
        let shares = match portfolio.long_positions.get(stock) {
            Some(p) => p.shares,
            None => return,
        };
        let ctx = FillContext {
            order_shares: Decimal::from(shares),
            reference_price,
            is_buy: false,
            ..Default::default()
        };
        let actual_price = self.slippage.actual_price(&ctx);

        if portfolio.remove_long(stock, shares).is_err() {
            return;
        }
        let notional = actual_price * Decimal::from(shares);
        let cost = self.config.commission_schedule.total_cost(notional, true);
        let _ = portfolio.update_cash(notional - cost);

        trades_out.push(Trade {
            date: fill_date,
            stock: stock.to_string(),
            action: TradeAction::Sell,
            shares,
            fill_price: actual_price,
            commission: self.config.commission_schedule.commission(notional),
            stamp_tax: self.config.commission_schedule.stamp_tax(notional, true),
            slippage: (actual_price - reference_price).abs() * Decimal::from(shares),
        });
    }

    fn execute_cover(
        &self,
        stock: &str,
        fill_date: NaiveDate,
        fill_prices: &HashMap<StockCode, Decimal>,
        portfolio: &mut Portfolio,
        trades_out: &mut Vec<Trade>,
    ) {
        let Some(&reference_price) = fill_prices.get(stock) else {
            return;
        };
        let shares = match portfolio.short_positions.get(stock) {
            Some(p) => p.shares,
            None => return,
        };
        let ctx = FillContext {
            order_shares: Decimal::from(shares),
            reference_price,
            is_buy: true,
            ..Default::default()
        };
        let actual_price = self.slippage.actual_price(&ctx);

        let Ok(short) = portfolio.remove_short(stock) else {
            return;
        };
        let notional = actual_price * Decimal::from(shares);
        let cost = self.config.commission_schedule.total_cost(notional, false);
        let margin_released = self.config.margin_schedule.required_margin(short.initial_notional);
        let pnl = short.net_pnl(actual_price, fill_date);
        let _ = portfolio.update_cash(margin_released + pnl - cost);

        trades_out.push(Trade {
            date: fill_date,
            stock: stock.to_string(),
            action: TradeAction::CoverShort,
            shares,
            fill_price: actual_price,
            commission: self.config.commission_schedule.commission(notional),
            stamp_tax: Decimal::ZERO,
            slippage: (actual_price - reference_price).abs() * Decimal::from(shares),
        });
    }

    fn execute_buy(
        &self,
        stock: &str,
        fill_date: NaiveDate,
        fill_prices: &HashMap<StockCode, Decimal>,
        budget: Decimal,
        portfolio: &mut Portfolio,
        trades_out: &mut Vec<Trade>,
    ) {
        let Some(&reference_price) = fill_prices.get(stock) else {
            return;
        };
        if reference_price <= Decimal::ZERO || budget <= Decimal::ZERO {
            return;
        }
        let lot = Decimal::from(self.config.lot_size);
        let est_shares = ((budget / reference_price) / lot).floor() * lot;
        let est_shares_u64 = est_shares.to_u64().unwrap_or(0);
        if est_shares_u64 < self.config.lot_size {
            return;
        }

        let ctx = FillContext {
            order_shares: est_shares,
            reference_price,
            is_buy: true,
            ..Default::default()
        };
        let actual_price = self.slippage.actual_price(&ctx);

        // Refine the share count against the actual fill price, in case
        // slippage pushed the affordable quantity below the estimate.
        let refined_shares = ((budget / actual_price) / lot).floor() * lot;
        let shares_u64 = refined_shares.to_u64().unwrap_or(0).min(est_shares_u64);
        if shares_u64 < self.config.lot_size {
            return;
        }

        let notional = actual_price * Decimal::from(shares_u64);
        let cost = self.config.commission_schedule.total_cost(notional, false);
        if notional + cost > portfolio.cash {
            return;
        }
        if portfolio.update_cash(-(notional + cost)).is_err() {
            return;
        }
        portfolio.add_long(stock, shares_u64, actual_price, fill_date);

        trades_out.push(Trade {
            date: fill_date,
            stock: stock.to_string(),
            action: TradeAction::Buy,
            shares: shares_u64,
            fill_price: actual_price,
            commission: self.config.commission_schedule.commission(notional),
            stamp_tax: Decimal::ZERO,
            slippage: (actual_price - reference_price).abs() * Decimal::from(shares_u64),
        });
    }

    fn execute_short(
        &self,
        stock: &str,
        fill_date: NaiveDate,
        fill_prices: &HashMap<StockCode, Decimal>,
        budget: Decimal,
        portfolio: &mut Portfolio,
        trades_out: &mut Vec<Trade>,
    ) {
        let Some(&reference_price) = fill_prices.get(stock) else {
            return;
        };
        if reference_price <= Decimal::ZERO || budget <= Decimal::ZERO {
            return;
        }
        let lot = Decimal::from(self.config.lot_size);
        let est_shares = ((budget / reference_price) / lot).floor() * lot;
        let shares_u64 = est_shares.to_u64().unwrap_or(0);
        if shares_u64 < self.config.lot_size {
            return;
        }

        let ctx = FillContext {
            order_shares: est_shares,
            reference_price,
            is_buy: false,
            ..Default::default()
        };
        let actual_price = self.slippage.actual_price(&ctx);
        let notional = actual_price * Decimal::from(shares_u64);
        let cost = self.config.commission_schedule.total_cost(notional, true);
        let required_margin = self.config.margin_schedule.required_margin(notional);

        if required_margin + cost > portfolio.cash {
            return;
        }
        if portfolio.update_cash(-(required_margin + cost)).is_err() {
            return;
        }
        portfolio.add_short(stock, shares_u64, actual_price, fill_date, self.config.short_margin_rate);

        trades_out.push(Trade {
            date: fill_date,
            stock: stock.to_string(),
            action: TradeAction::ShortSell,
            shares: shares_u64,
            fill_price: actual_price,
            commission: self.config.commission_schedule.commission(notional),
            stamp_tax: self.config.commission_schedule.stamp_tax(notional, true),
            slippage: (actual_price - reference_price).abs() * Decimal::from(shares_u64),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slippage::FixedSlippage;
    use panel_core::RebalanceFreq;
    use rust_decimal_macros::dec;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn ten_dates() -> Vec<NaiveDate> {
        (1..=10).map(|i| d(2024, 1, i)).collect()
    }

    /// Scenario S1 — long-only toy backtest, T+1 verified.
    #[test]
    fn scenario_s1_long_only_t_plus_one() {
        let dates = ten_dates();
        let cal = TradingCalendar::new(dates.clone()).unwrap();

        let mut prices: PricePanel = PricePanel::new(cal.clone());
        let mut scores: ScorePanel = ScorePanel::new(cal.clone());
        for (i, &date) in dates.iter().enumerate() {
            let a_price = 10.0 + i as f64;
            let b_price = 20.0 - i as f64;
            let c_price = 15.0;
            prices.insert("A", date, a_price);
            prices.insert("B", date, b_price);
            prices.insert("C", date, c_price);
            scores.insert("A", date, 3.0);
            scores.insert("B", date, 1.0);
            scores.insert("C", date, 2.0);
        }

        let config = BacktestConfig {
            top_n: 1,
            holding_period: Some(3),
            rebalance_freq: RebalanceFreq::Daily,
            initial_capital: dec!(100000),
            book_mode: BookMode::LongOnly,
            short_margin_rate: 0.0,
            lot_size: 100,
            ..BacktestConfig::default()
        };
        let engine = BacktestEngine::new(config, Box::new(FixedSlippage { pct: 0.0 }));
        let output = engine.run(&scores, &prices).unwrap();

        let buys: Vec<&Trade> = output
            .trades
            .iter()
            .filter(|t| t.action == TradeAction::Buy)
            .collect();
        assert!(!buys.is_empty());
        let first_buy = buys[0];
        assert_eq!(first_buy.stock, "A");
        assert_eq!(first_buy.date, dates[1]); // dates[i+1], not dates[0]

        let price_a_at_fill = 10.0 + 1.0;
        let expected_shares = ((100000.0 / price_a_at_fill) / 100.0).floor() as u64 * 100;
        assert_eq!(first_buy.shares, expected_shares);
    }

    #[test]
    fn chunked_run_matches_unchunked_equity_total() {
        let dates = ten_dates();
        let cal = TradingCalendar::new(dates.clone()).unwrap();
        let mut prices: PricePanel = PricePanel::new(cal.clone());
        let mut scores: ScorePanel = ScorePanel::new(cal.clone());
        for (i, &date) in dates.iter().enumerate() {
            prices.insert("A", date, 10.0 + i as f64 * 0.1);
            scores.insert("A", date, 1.0);
        }

        let config = BacktestConfig {
            top_n: 1,
            holding_period: Some(2),
            rebalance_freq: RebalanceFreq::Daily,
            initial_capital: dec!(100000),
            ..BacktestConfig::default()
        };
        let engine = BacktestEngine::new(config.clone(), Box::new(FixedSlippage { pct: 0.0 }));
        let full = engine.run(&scores, &prices).unwrap();

        let engine2 = BacktestEngine::new(config, Box::new(FixedSlippage { pct: 0.0 }));
        let chunked = engine2.run_chunked(&scores, &prices, 4, 2).unwrap();

        let full_last = full.equity_curve.last().unwrap().total;
        let chunked_last = chunked.equity_curve.last().unwrap().total;
        assert_eq!(full_last, chunked_last);
    }
}
