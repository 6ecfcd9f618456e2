//! Quantile layering test (§4.8 "Layering"). Splits each day's cross-section
//! into `n_layers` equal-count groups by factor value, tracks per-layer
//! forward return over time, then aggregates.

use panel_core::{CoreError, PricePanel, ScorePanel};
use parallel_exec::partition_by_count;

use crate::corr_math::spearman;
use crate::forward_returns::{build_cohort, horizon_dates};
use crate::types::{AnalysisConfig, LayerResult, LayeringReport};

fn aggregate(returns: &[f64]) -> LayerResult {
    let (mean, std) = crate::corr_math::mean_std(returns);
    let sharpe = if std != 0.0 {
        mean / std * (252.0_f64).sqrt()
    } else {
        0.0
    };
    let win_rate = if returns.is_empty() {
        0.0
    } else {
        returns.iter().filter(|r| **r > 0.0).count() as f64 / returns.len() as f64
    };
    LayerResult {
        mean_return: mean,
        std,
        sharpe,
        win_rate,
        periods: returns.len(),
    }
}

pub fn layering_test(
    factor: &ScorePanel,
    prices: &PricePanel,
    config: &AnalysisConfig,
) -> Result<LayeringReport, CoreError> {
    if config.n_layers < 2 {
        return Err(CoreError::InvalidInput(
            "layering test requires at least 2 layers".to_string(),
        ));
    }
    let calendar = factor.calendar().intersect(prices.calendar());
    let dates = horizon_dates(&calendar, config.horizon);

    let mut per_layer_returns: Vec<Vec<f64>> = vec![Vec::new(); config.n_layers];
    let mut long_short_returns: Vec<f64> = Vec::new();

    for (idx, _date) in dates.iter().enumerate() {
        let mut cohort = build_cohort(factor, prices, &calendar, idx, config.horizon);
        if cohort.rows.len() < config.n_layers {
            continue;
        }
        cohort
            .rows
            .sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap());

        let groups = partition_by_count(&cohort.rows, config.n_layers);
        let layer_means: Vec<f64> = groups
            .iter()
            .map(|g| {
                let sum: f64 = g.iter().map(|(_, _, r)| *r).sum();
                sum / g.len() as f64
            })
            .collect();

        for (layer_idx, mean) in layer_means.iter().enumerate() {
            per_layer_returns[layer_idx].push(*mean);
        }

        if config.long_short {
            if let (Some(top), Some(bottom)) = (layer_means.last(), layer_means.first()) {
                long_short_returns.push(top - bottom);
            }
        }
    }

    let layers: Vec<LayerResult> = per_layer_returns.iter().map(|r| aggregate(r)).collect();

    let ranks: Vec<f64> = (1..=layers.len()).map(|r| r as f64).collect();
    let layer_means: Vec<f64> = layers.iter().map(|l| l.mean_return).collect();
    let monotonicity = spearman(&ranks, &layer_means).unwrap_or(0.0);

    let long_short = if config.long_short {
        Some(aggregate(&long_short_returns))
    } else {
        None
    };

    Ok(LayeringReport {
        layers,
        monotonicity,
        long_short,
    })
}
