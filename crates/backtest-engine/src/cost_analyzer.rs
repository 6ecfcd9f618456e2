use std::collections::HashMap;

use chrono::NaiveDate;
use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use panel_core::StockCode;

/// One trade record (§3). Append-only: the engine writes these once per
/// fill and never mutates or reads them back to decide future behavior —
/// they drive cost analytics only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeAction {
    Buy,
    Sell,
    ShortSell,
    CoverShort,
}

impl TradeAction {
    pub fn is_sell_side(self) -> bool {
        matches!(self, TradeAction::Sell | TradeAction::ShortSell)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub date: NaiveDate,
    pub stock: StockCode,
    pub action: TradeAction,
    pub shares: u64,
    pub fill_price: Decimal,
    pub commission: Decimal,
    pub stamp_tax: Decimal,
    pub slippage: Decimal,
}

impl Trade {
    pub fn notional(&self) -> Decimal {
        self.fill_price * Decimal::from(self.shares)
    }

    pub fn total_cost(&self) -> Decimal {
        self.commission + self.stamp_tax + self.slippage
    }
}

/// Per-stock aggregation of trading costs.
#[derive(Debug, Clone, Copy, Default)]
pub struct CostBreakdown {
    pub commission: Decimal,
    pub stamp_tax: Decimal,
    pub slippage: Decimal,
    pub notional: Decimal,
}

/// Owns the full trade log of a completed backtest run and aggregates it
/// into cost analytics (§4.6). The trade log exclusively belongs to this
/// type — nothing else in the engine reads it back.
pub struct CostAnalyzer<'a> {
    trades: &'a [Trade],
}

impl<'a> CostAnalyzer<'a> {
    pub fn new(trades: &'a [Trade]) -> Self {
        Self { trades }
    }

    pub fn total_commission(&self) -> Decimal {
        self.trades.iter().map(|t| t.commission).sum()
    }

    pub fn total_stamp_tax(&self) -> Decimal {
        self.trades.iter().map(|t| t.stamp_tax).sum()
    }

    pub fn total_slippage(&self) -> Decimal {
        self.trades.iter().map(|t| t.slippage).sum()
    }

    pub fn by_stock(&self) -> HashMap<StockCode, CostBreakdown> {
        let mut out: HashMap<StockCode, CostBreakdown> = HashMap::new();
        for t in self.trades {
            let entry = out.entry(t.stock.clone()).or_default();
            entry.commission += t.commission;
            entry.stamp_tax += t.stamp_tax;
            entry.slippage += t.slippage;
            entry.notional += t.notional();
        }
        out
    }

    /// Cumulative total cost series in chronological order, one entry per
    /// distinct trade date (not per calendar day).
    pub fn by_day_cumulative(&self) -> Vec<(NaiveDate, Decimal)> {
        let mut by_day: HashMap<NaiveDate, Decimal> = HashMap::new();
        for t in self.trades {
            *by_day.entry(t.date).or_insert(Decimal::ZERO) += t.total_cost();
        }
        let mut days: Vec<NaiveDate> = by_day.keys().copied().collect();
        days.sort();

        let mut running = Decimal::ZERO;
        days.into_iter()
            .map(|d| {
                running += by_day[&d];
                (d, running)
            })
            .collect()
    }

    /// Annualized turnover: `Σ|trade_notional| / mean_equity / years`.
    pub fn turnover(&self, equity_curve: &[Decimal], years: f64) -> f64 {
        if equity_curve.is_empty() || years <= 0.0 {
            return 0.0;
        }
        let total_notional: Decimal = self.trades.iter().map(|t| t.notional()).sum();
        let mean_equity: Decimal =
            equity_curve.iter().copied().sum::<Decimal>() / Decimal::from(equity_curve.len());
        if mean_equity <= Decimal::ZERO {
            return 0.0;
        }
        let ratio = (total_notional / mean_equity).to_f64().unwrap_or(0.0);
        ratio / years
    }

    /// Cost drag: the return that would have been earned without trading
    /// costs, minus the return actually earned with them.
    pub fn cost_drag(&self, return_without_cost: f64, return_with_cost: f64) -> f64 {
        return_without_cost - return_with_cost
    }

    /// Replays `equity_curve` (same order as [`Self::by_day_cumulative`]'s
    /// trade dates map onto it) under a cost multiplier: `1.0` reproduces
    /// the recorded series, `0.0` answers "what if costs were free",
    /// `0.5` answers "what if costs were halved". Adds back the
    /// proportionally removed cost to each day's equity.
    pub fn simulate_scenario(
        &self,
        equity_curve: &[(NaiveDate, Decimal)],
        cost_multiplier: f64,
    ) -> Vec<(NaiveDate, Decimal)> {
        let cumulative = self.by_day_cumulative();
        let cumulative_cost_at: HashMap<NaiveDate, Decimal> = cumulative.into_iter().collect();

        let mut last_known = Decimal::ZERO;
        let adjustment_fraction = Decimal::from_f64(1.0 - cost_multiplier).unwrap_or(Decimal::ZERO);

        equity_curve
            .iter()
            .map(|(date, equity)| {
                if let Some(cost) = cumulative_cost_at.get(date) {
                    last_known = *cost;
                }
                (*date, *equity + last_known * adjustment_fraction)
            })
            .collect()
    }
}
