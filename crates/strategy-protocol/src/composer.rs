use serde_json::{json, Value};

use panel_core::{CoreError, RebalanceFreq};

use crate::traits::{EntryStrategy, ExitStrategy, StockSelector, StrategyMetadata};

/// Owns one concrete implementation of each of the three layers plus a
/// rebalance frequency (§4.7). Never shares implementation via
/// inheritance — each layer is a boxed trait object the composer
/// delegates to.
pub struct Composer {
    pub selector: Box<dyn StockSelector>,
    pub entry: Box<dyn EntryStrategy>,
    pub exit: Box<dyn ExitStrategy>,
    pub rebalance_freq: RebalanceFreq,
}

impl Composer {
    /// Composes the three layers, validating each sub-strategy's current
    /// `params()` against its own `get_parameters()` schema before the
    /// composition is usable (§4.7 Parameter validation contract).
    /// `rebalance_freq` has no runtime check beyond this — `RebalanceFreq`
    /// is a closed enum over {Daily, Weekly, Monthly}, so the type system
    /// already rules out any other value.
    pub fn new(
        selector: Box<dyn StockSelector>,
        entry: Box<dyn EntryStrategy>,
        exit: Box<dyn ExitStrategy>,
        rebalance_freq: RebalanceFreq,
    ) -> Result<Self, CoreError> {
        selector
            .get_parameters()
            .validate(&selector.params())
            .map_err(|e| CoreError::InvalidInput(format!("selector '{}': {e}", selector.id())))?;
        entry
            .get_parameters()
            .validate(&entry.params())
            .map_err(|e| CoreError::InvalidInput(format!("entry '{}': {e}", entry.id())))?;
        exit.get_parameters()
            .validate(&exit.params())
            .map_err(|e| CoreError::InvalidInput(format!("exit '{}': {e}", exit.id())))?;

        Ok(Self {
            selector,
            entry,
            exit,
            rebalance_freq,
        })
    }

    /// Composition identifier: `{selector.id}__{entry.id}__{exit.id}__{freq}`.
    pub fn composition_id(&self) -> String {
        format!(
            "{}__{}__{}__{}",
            self.selector.id(),
            self.entry.id(),
            self.exit.id(),
            self.rebalance_freq.code()
        )
    }

    fn layer_metadata(name: &str, component: &dyn StrategyMetadata) -> Value {
        json!({
            "layer": name,
            "id": component.id(),
            "name": component.name(),
            "schema": component.get_parameters(),
            "params": component.params(),
        })
    }

    /// Machine-readable metadata bundle aggregating all three sub-strategies'
    /// schemas and current params, keyed by layer.
    pub fn metadata(&self) -> Value {
        json!({
            "composition_id": self.composition_id(),
            "rebalance_freq": self.rebalance_freq.code(),
            "layers": [
                Self::layer_metadata("selector", self.selector.as_ref()),
                Self::layer_metadata("entry", self.entry.as_ref()),
                Self::layer_metadata("exit", self.exit.as_ref()),
            ],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::ParamSchema;
    use crate::traits::PositionView;
    use chrono::NaiveDate;
    use panel_core::{CoreError, OhlcvPanel, PricePanel, StockCode};
    use std::collections::HashMap;

    struct StubSelector;
    impl StrategyMetadata for StubSelector {
        fn id(&self) -> &str {
            "momentum"
        }
        fn name(&self) -> &str {
            "Momentum Selector"
        }
        fn get_parameters(&self) -> ParamSchema {
            ParamSchema::default()
        }
        fn params(&self) -> HashMap<String, Value> {
            HashMap::new()
        }
    }
    impl StockSelector for StubSelector {
        fn select(&self, _date: NaiveDate, _market_data: &PricePanel) -> Result<Vec<StockCode>, CoreError> {
            Ok(vec![])
        }
    }

    struct StubEntry;
    impl StrategyMetadata for StubEntry {
        fn id(&self) -> &str {
            "immediate"
        }
        fn name(&self) -> &str {
            "Immediate Entry"
        }
        fn get_parameters(&self) -> ParamSchema {
            ParamSchema::default()
        }
        fn params(&self) -> HashMap<String, Value> {
            HashMap::new()
        }
    }
    impl EntryStrategy for StubEntry {
        fn generate_entry_signals(
            &self,
            _candidate_stocks: &[StockCode],
            _stock_data: &HashMap<StockCode, OhlcvPanel>,
            _date: NaiveDate,
        ) -> Result<HashMap<StockCode, f64>, CoreError> {
            Ok(HashMap::new())
        }
    }

    struct StubExit;
    impl StrategyMetadata for StubExit {
        fn id(&self) -> &str {
            "time_based"
        }
        fn name(&self) -> &str {
            "Time-based Exit"
        }
        fn get_parameters(&self) -> ParamSchema {
            ParamSchema::default()
        }
        fn params(&self) -> HashMap<String, Value> {
            HashMap::new()
        }
    }
    impl ExitStrategy for StubExit {
        fn generate_exit_signals(
            &self,
            _positions: &HashMap<StockCode, PositionView>,
            _stock_data: &HashMap<StockCode, OhlcvPanel>,
            _date: NaiveDate,
        ) -> Result<Vec<StockCode>, CoreError> {
            Ok(vec![])
        }
    }

    #[test]
    fn composition_id_joins_layer_ids_and_freq() {
        let composer = Composer::new(
            Box::new(StubSelector),
            Box::new(StubEntry),
            Box::new(StubExit),
            RebalanceFreq::Weekly,
        )
        .unwrap();
        assert_eq!(composer.composition_id(), "momentum__immediate__time_based__W");
    }

    #[test]
    fn metadata_bundles_three_layers() {
        let composer = Composer::new(
            Box::new(StubSelector),
            Box::new(StubEntry),
            Box::new(StubExit),
            RebalanceFreq::Daily,
        )
        .unwrap();
        let meta = composer.metadata();
        assert_eq!(meta["layers"].as_array().unwrap().len(), 3);
    }
}
