//! `future_return = prices.pct_change(h).shift(-h)` (§4.8 "IC"). Shared by
//! IC computation and layering, both of which need the same forward-looking
//! cross-section.

use chrono::NaiveDate;

use panel_core::{PricePanel, ScorePanel, StockCode};

/// One cross-section: every stock with both a factor value and a forward
/// return observed on `date`.
pub struct Cohort {
    pub date: NaiveDate,
    pub rows: Vec<(StockCode, f64, f64)>, // (stock, factor_value, forward_return)
}

/// Dates on which a forward return `h` steps ahead is computable against
/// `calendar`, i.e. every date except the trailing `h`.
pub fn horizon_dates(calendar: &[NaiveDate], horizon: usize) -> Vec<NaiveDate> {
    if horizon == 0 || calendar.len() <= horizon {
        return Vec::new();
    }
    calendar[..calendar.len() - horizon].to_vec()
}

/// Forward return of `stock` from `date` to `horizon` trading days later,
/// against the shared `calendar` index (not the stock's own observed
/// dates) — matches `pct_change(h)` computed along the panel's date axis.
pub fn forward_return(
    prices: &PricePanel,
    calendar: &[NaiveDate],
    date_index: usize,
    horizon: usize,
    stock: &str,
) -> Option<f64> {
    let future_date = *calendar.get(date_index + horizon)?;
    let date = calendar[date_index];
    let p0 = *prices.get(stock, date)?;
    let p1 = *prices.get(stock, future_date)?;
    if p0 == 0.0 || !p0.is_finite() || !p1.is_finite() {
        return None;
    }
    Some((p1 - p0) / p0)
}

/// Every `(stock, factor_value, forward_return)` triple observable on
/// `calendar[date_index]`, with NaN/non-finite factor values dropped.
pub fn build_cohort(
    factor: &ScorePanel,
    prices: &PricePanel,
    calendar: &[NaiveDate],
    date_index: usize,
    horizon: usize,
) -> Cohort {
    let date = calendar[date_index];
    let rows = factor
        .row(date)
        .into_iter()
        .filter(|(_, v)| v.is_finite())
        .filter_map(|(stock, value)| {
            let fwd = forward_return(prices, calendar, date_index, horizon, &stock)?;
            Some((stock, value, fwd))
        })
        .collect();
    Cohort { date, rows }
}
