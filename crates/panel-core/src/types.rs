use std::collections::HashMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Opaque stock identifier. The only structural assumption is equality
/// comparison for keying into panel columns and position maps (§3).
pub type StockCode = String;

/// A sorted, de-duplicated trading-date index shared by every panel frame
/// and consulted by the backtest engine as the sole source of "what day
/// is it" (§9 Design Notes — no wall-clock access anywhere in the core).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradingCalendar {
    dates: Vec<NaiveDate>,
}

impl TradingCalendar {
    /// Build a calendar from raw dates, sorting and rejecting duplicates
    /// (invariant (i) of §3: the date index must be strictly increasing).
    pub fn new(mut dates: Vec<NaiveDate>) -> Result<Self, CoreError> {
        dates.sort();
        let before = dates.len();
        dates.dedup();
        if dates.len() != before {
            return Err(CoreError::InvalidInput(
                "duplicate trading dates in calendar".to_string(),
            ));
        }
        Ok(Self { dates })
    }

    pub fn as_slice(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn index_of(&self, date: NaiveDate) -> Option<usize> {
        self.dates.binary_search(&date).ok()
    }

    /// The date immediately following `date` in this calendar, if any —
    /// the T+1 fill date used throughout §4.5.
    pub fn next_after(&self, date: NaiveDate) -> Option<NaiveDate> {
        let i = self.index_of(date)?;
        self.dates.get(i + 1).copied()
    }

    /// Intersection with another calendar, preserving sorted order —
    /// the "common intersection of signals.index and prices.index" the
    /// backtest engine iterates over.
    pub fn intersect(&self, other: &TradingCalendar) -> Vec<NaiveDate> {
        let other_set: std::collections::HashSet<NaiveDate> =
            other.dates.iter().copied().collect();
        self.dates
            .iter()
            .copied()
            .filter(|d| other_set.contains(d))
            .collect()
    }

    /// Rebalance dates for a given frequency tag (§4.3).
    pub fn rebalance_dates(&self, freq: RebalanceFreq) -> Vec<NaiveDate> {
        use chrono::Datelike;
        match freq {
            RebalanceFreq::Daily => self.dates.clone(),
            RebalanceFreq::Weekly => self
                .dates
                .iter()
                .copied()
                .filter(|d| d.weekday() == chrono::Weekday::Mon)
                .collect(),
            RebalanceFreq::Monthly => {
                let mut out = Vec::new();
                let mut seen_months: std::collections::HashSet<(i32, u32)> =
                    std::collections::HashSet::new();
                for d in &self.dates {
                    if seen_months.insert((d.year(), d.month())) {
                        out.push(*d);
                    }
                }
                out
            }
        }
    }
}

/// Rebalance frequency code (§6 — exactly `D`, `W`, `M`; anything else is
/// rejected by the strategy Composer).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RebalanceFreq {
    #[serde(rename = "D")]
    Daily,
    #[serde(rename = "W")]
    Weekly,
    #[serde(rename = "M")]
    Monthly,
}

impl RebalanceFreq {
    pub fn parse(code: &str) -> Result<Self, CoreError> {
        match code {
            "D" => Ok(RebalanceFreq::Daily),
            "W" => Ok(RebalanceFreq::Weekly),
            "M" => Ok(RebalanceFreq::Monthly),
            other => Err(CoreError::InvalidInput(format!(
                "unknown rebalance frequency code: {other}"
            ))),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            RebalanceFreq::Daily => "D",
            RebalanceFreq::Weekly => "W",
            RebalanceFreq::Monthly => "M",
        }
    }
}

/// A single OHLCV observation for one stock on one date.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OhlcvBar {
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// A wide panel frame indexed by `(date, stock)` (§3). A missing cell is an
/// absent observation — never zero — represented by simply not inserting a
/// value rather than by storing a sentinel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Panel<V> {
    calendar: TradingCalendar,
    columns: HashMap<StockCode, HashMap<NaiveDate, V>>,
}

impl<V: Clone> Panel<V> {
    pub fn new(calendar: TradingCalendar) -> Self {
        Self {
            calendar,
            columns: HashMap::new(),
        }
    }

    pub fn calendar(&self) -> &TradingCalendar {
        &self.calendar
    }

    pub fn insert(&mut self, stock: &str, date: NaiveDate, value: V) {
        self.columns
            .entry(stock.to_string())
            .or_default()
            .insert(date, value);
    }

    pub fn get(&self, stock: &str, date: NaiveDate) -> Option<&V> {
        self.columns.get(stock)?.get(&date)
    }

    pub fn stocks(&self) -> Vec<StockCode> {
        let mut s: Vec<StockCode> = self.columns.keys().cloned().collect();
        s.sort();
        s
    }

    /// Every `(stock, value)` observed on `date`, in no particular order.
    pub fn row(&self, date: NaiveDate) -> Vec<(StockCode, V)> {
        self.columns
            .iter()
            .filter_map(|(stock, col)| col.get(&date).map(|v| (stock.clone(), v.clone())))
            .collect()
    }

    /// Restrict a panel to rows at or before `as_of` — used to prove the
    /// look-ahead prohibition (Testable Property 5): a strategy callback's
    /// output must be unchanged when this is applied ahead of it.
    pub fn truncated_to(&self, as_of: NaiveDate) -> Panel<V> {
        let mut out = Panel {
            calendar: self.calendar.clone(),
            columns: HashMap::new(),
        };
        for (stock, col) in &self.columns {
            let filtered: HashMap<NaiveDate, V> = col
                .iter()
                .filter(|(d, _)| **d <= as_of)
                .map(|(d, v)| (*d, v.clone()))
                .collect();
            out.columns.insert(stock.clone(), filtered);
        }
        out
    }
}

/// Closing-price panel. `PricePanel` in the spec.
pub type PricePanel = Panel<f64>;
/// Full OHLCV panel, one column-set per stock.
pub type OhlcvPanel = Panel<OhlcvBar>;
/// Trading signal panel: values ∈ {−1 sell, 0 hold, +1 buy}.
pub type SignalPanel = Panel<i8>;
/// Cross-sectional score panel: values ∈ ℝ ∪ {NaN}.
pub type ScorePanel = Panel<f64>;

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn calendar_rejects_duplicates() {
        let dates = vec![d(2024, 1, 2), d(2024, 1, 2)];
        assert!(TradingCalendar::new(dates).is_err());
    }

    #[test]
    fn calendar_sorts_and_finds_next() {
        let cal = TradingCalendar::new(vec![d(2024, 1, 3), d(2024, 1, 2)]).unwrap();
        assert_eq!(cal.as_slice(), &[d(2024, 1, 2), d(2024, 1, 3)]);
        assert_eq!(cal.next_after(d(2024, 1, 2)), Some(d(2024, 1, 3)));
        assert_eq!(cal.next_after(d(2024, 1, 3)), None);
    }

    #[test]
    fn weekly_rebalance_picks_mondays() {
        let cal = TradingCalendar::new(vec![
            d(2024, 1, 1), // Monday
            d(2024, 1, 2),
            d(2024, 1, 3),
            d(2024, 1, 8), // Monday
        ])
        .unwrap();
        let weekly = cal.rebalance_dates(RebalanceFreq::Weekly);
        assert_eq!(weekly, vec![d(2024, 1, 1), d(2024, 1, 8)]);
    }

    #[test]
    fn monthly_rebalance_picks_first_of_month() {
        let cal = TradingCalendar::new(vec![d(2024, 1, 2), d(2024, 1, 31), d(2024, 2, 1)]).unwrap();
        let monthly = cal.rebalance_dates(RebalanceFreq::Monthly);
        assert_eq!(monthly, vec![d(2024, 1, 2), d(2024, 2, 1)]);
    }

    #[test]
    fn missing_cell_is_absent_not_zero() {
        let cal = TradingCalendar::new(vec![d(2024, 1, 2)]).unwrap();
        let mut panel: PricePanel = Panel::new(cal);
        panel.insert("AAA", d(2024, 1, 2), 10.0);
        assert_eq!(panel.get("AAA", d(2024, 1, 2)), Some(&10.0));
        assert_eq!(panel.get("BBB", d(2024, 1, 2)), None);
    }

    #[test]
    fn truncation_implements_lookahead_prohibition() {
        let cal = TradingCalendar::new(vec![d(2024, 1, 1), d(2024, 1, 2), d(2024, 1, 3)]).unwrap();
        let mut panel: PricePanel = Panel::new(cal);
        panel.insert("AAA", d(2024, 1, 1), 10.0);
        panel.insert("AAA", d(2024, 1, 2), 11.0);
        panel.insert("AAA", d(2024, 1, 3), 999.0);

        let truncated = panel.truncated_to(d(2024, 1, 2));
        assert_eq!(truncated.get("AAA", d(2024, 1, 2)), Some(&11.0));
        assert_eq!(truncated.get("AAA", d(2024, 1, 3)), None);
    }
}
