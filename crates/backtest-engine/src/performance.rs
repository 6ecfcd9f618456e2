/// Pure performance statistics computed over an equity curve or its
/// derived return series. No state, no I/O — the engine calls these once
/// per completed run.

/// Daily simple returns from an equity (or price) series.
pub fn daily_returns(values: &[f64]) -> Vec<f64> {
    if values.len() < 2 {
        return Vec::new();
    }
    values
        .windows(2)
        .filter_map(|w| {
            if w[0] != 0.0 {
                Some((w[1] - w[0]) / w[0])
            } else {
                None
            }
        })
        .collect()
}

/// Annualized Sharpe ratio: `(mean_excess / std) * sqrt(252)`.
pub fn sharpe_ratio(returns: &[f64], rf_annual: f64) -> Option<f64> {
    if returns.len() < 3 {
        return None;
    }
    let rf_daily = rf_annual / 252.0;
    let n = returns.len() as f64;
    let mean: f64 = returns.iter().sum::<f64>() / n;
    let excess = mean - rf_daily;
    let variance: f64 = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (n - 1.0);
    let std_dev = variance.sqrt();
    if std_dev < 1e-12 {
        return None;
    }
    Some((excess / std_dev) * 252.0_f64.sqrt())
}

/// Sortino ratio: like Sharpe but the denominator only counts downside
/// deviation below the daily risk-free rate.
pub fn sortino_ratio(returns: &[f64], rf_annual: f64) -> Option<f64> {
    if returns.len() < 3 {
        return None;
    }
    let rf_daily = rf_annual / 252.0;
    let n = returns.len() as f64;
    let mean: f64 = returns.iter().sum::<f64>() / n;
    let excess = mean - rf_daily;

    let downside: Vec<f64> = returns
        .iter()
        .filter(|&&r| r < rf_daily)
        .map(|r| (r - rf_daily).powi(2))
        .collect();

    if downside.is_empty() {
        return None;
    }
    let downside_dev = (downside.iter().sum::<f64>() / (n - 1.0)).sqrt();
    if downside_dev < 1e-12 {
        return None;
    }
    Some((excess / downside_dev) * 252.0_f64.sqrt())
}

/// (max_drawdown_pct, current_drawdown_pct) from an equity curve, both
/// expressed as positive fractions.
pub fn max_drawdown(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let mut peak = values[0];
    let mut max_dd = 0.0_f64;
    for &v in values {
        if v > peak {
            peak = v;
        }
        if peak > 0.0 {
            let dd = (peak - v) / peak;
            if dd > max_dd {
                max_dd = dd;
            }
        }
    }
    let current_dd = if peak > 0.0 {
        (peak - values[values.len() - 1]) / peak
    } else {
        0.0
    };
    (max_dd, current_dd)
}

/// Rolling annualized volatility over the trailing `window` returns.
pub fn rolling_volatility(returns: &[f64], window: usize) -> Option<f64> {
    if returns.len() < window || window < 2 {
        return None;
    }
    let tail = &returns[returns.len() - window..];
    let n = tail.len() as f64;
    let mean: f64 = tail.iter().sum::<f64>() / n;
    let variance: f64 = tail.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (n - 1.0);
    Some(variance.sqrt() * 252.0_f64.sqrt())
}

/// Historical (non-parametric) Value-at-Risk at `confidence`, returned as
/// a positive loss fraction.
pub fn var_historical(returns: &[f64], confidence: f64) -> Option<f64> {
    if returns.len() < 10 {
        return None;
    }
    let mut sorted: Vec<f64> = returns.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let idx = ((1.0 - confidence) * sorted.len() as f64).floor() as usize;
    let idx = idx.min(sorted.len() - 1);
    Some(-sorted[idx])
}

/// Historical CVaR (expected shortfall) beyond the VaR cutoff.
pub fn cvar_historical(returns: &[f64], confidence: f64) -> Option<f64> {
    if returns.len() < 10 {
        return None;
    }
    let mut sorted: Vec<f64> = returns.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let cutoff = ((1.0 - confidence) * sorted.len() as f64).floor() as usize;
    let cutoff = cutoff.max(1).min(sorted.len());
    let tail = &sorted[..cutoff];
    let mean: f64 = tail.iter().sum::<f64>() / tail.len() as f64;
    Some(-mean)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn daily_returns_computes_pct_change() {
        let r = daily_returns(&[100.0, 110.0, 99.0]);
        assert!((r[0] - 0.10).abs() < 1e-9);
        assert!((r[1] - (-0.10)).abs() < 1e-9);
    }

    #[test]
    fn max_drawdown_tracks_peak_to_trough() {
        let (max_dd, current_dd) = max_drawdown(&[100.0, 120.0, 90.0, 110.0]);
        assert!((max_dd - 0.25).abs() < 1e-9);
        assert!((current_dd - (120.0 - 110.0) / 120.0).abs() < 1e-9);
    }

    #[test]
    fn sharpe_ratio_none_on_zero_variance() {
        assert!(sharpe_ratio(&[0.001, 0.001, 0.001], 0.02).is_none());
    }
}
