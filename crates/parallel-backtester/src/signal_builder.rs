//! Turns a rebuilt [`Composer`] into the [`ScorePanel`] the backtest
//! engine consumes, by invoking the selector/entry layers on each
//! rebalance date. This is the seam where strategy-protocol trait
//! objects meet the engine: the engine itself stays signal-agnostic
//! (§4.5) and only this facade walks the three-layer protocol.

use std::collections::HashMap;

use panel_core::{CoreError, OhlcvPanel, PricePanel, ScorePanel, StockCode, TradingCalendar};
use strategy_protocol::Composer;

/// Builds per-date entry scores for every rebalance date in `calendar`.
/// `stock_data` is truncated to each decision date before the entry
/// layer sees it (Testable Property 5: look-ahead prohibition) even
/// though the selector/entry traits don't enforce this themselves.
pub fn build_score_panel(
    composer: &Composer,
    prices: &PricePanel,
    stock_data: &HashMap<StockCode, OhlcvPanel>,
    calendar: &TradingCalendar,
) -> Result<ScorePanel, CoreError> {
    let mut scores = ScorePanel::new(calendar.clone());
    let rebalance_dates = calendar.rebalance_dates(composer.rebalance_freq);

    for date in rebalance_dates {
        let candidates = composer.selector.select(date, &prices.truncated_to(date))?;
        if candidates.is_empty() {
            continue;
        }

        let truncated_data: HashMap<StockCode, OhlcvPanel> = candidates
            .iter()
            .filter_map(|stock| stock_data.get(stock).map(|panel| (stock.clone(), panel.truncated_to(date))))
            .collect();

        let weights = composer
            .entry
            .generate_entry_signals(&candidates, &truncated_data, date)?;

        for (stock, weight) in weights {
            scores.insert(&stock, date, weight);
        }
    }

    Ok(scores)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use panel_core::RebalanceFreq;
    use serde_json::Value;
    use strategy_protocol::params::ParamSchema;
    use strategy_protocol::traits::{EntryStrategy, ExitStrategy, PositionView, StockSelector, StrategyMetadata};

    struct AllInSelector;
    impl StrategyMetadata for AllInSelector {
        fn id(&self) -> &str {
            "all_in"
        }
        fn name(&self) -> &str {
            "All-in Selector"
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

    #[test]
    fn assigns_scores_on_every_daily_rebalance_date() {
        let calendar = TradingCalendar::new(dates(5)).unwrap();
        let mut prices = PricePanel::new(calendar.clone());
        for d in calendar.as_slice() {
            prices.insert("A", *d, 10.0);
        }

        let composer = Composer::new(
            Box::new(AllInSelector),
            Box::new(AllInSelector),
            Box::new(AllInSelector),
            RebalanceFreq::Daily,
        )
        .unwrap();

        let scores = build_score_panel(&composer, &prices, &HashMap::new(), &calendar).unwrap();
        for d in calendar.as_slice() {
            assert_eq!(scores.get("A", *d), Some(&1.0));
        }
    }

    #[test]
    fn empty_candidate_set_leaves_date_unscored() {
        struct EmptySelector;
        impl StrategyMetadata for EmptySelector {
            fn id(&self) -> &str {
                "empty"
            }
            fn name(&self) -> &str {
                "Empty"
            }
            fn get_parameters(&self) -> ParamSchema {
                ParamSchema::default()
            }
            fn params(&self) -> HashMap<String, Value> {
                HashMap::new()
            }
        }
        impl StockSelector for EmptySelector {
            fn select(&self, _date: NaiveDate, _market_data: &PricePanel) -> Result<Vec<StockCode>, CoreError> {
                Ok(vec![])
            }
        }
        impl EntryStrategy for EmptySelector {
            fn generate_entry_signals(
                &self,
                _candidate_stocks: &[StockCode],
                _stock_data: &HashMap<StockCode, OhlcvPanel>,
                _date: NaiveDate,
            ) -> Result<HashMap<StockCode, f64>, CoreError> {
                Ok(HashMap::new())
            }
        }
        impl ExitStrategy for EmptySelector {
            fn generate_exit_signals(
                &self,
                _positions: &HashMap<StockCode, PositionView>,
                _stock_data: &HashMap<StockCode, OhlcvPanel>,
                _date: NaiveDate,
            ) -> Result<Vec<StockCode>, CoreError> {
                Ok(vec![])
            }
        }

        let calendar = TradingCalendar::new(dates(3)).unwrap();
        let prices = PricePanel::new(calendar.clone());
        let composer = Composer::new(
            Box::new(EmptySelector),
            Box::new(EmptySelector),
            Box::new(EmptySelector),
            RebalanceFreq::Daily,
        )
        .unwrap();

        let scores = build_score_panel(&composer, &prices, &HashMap::new(), &calendar).unwrap();
        for d in calendar.as_slice() {
            assert_eq!(scores.get("A", *d), None);
        }
    }
}
