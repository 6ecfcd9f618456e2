//! Factor-weight combination (§4.8 "Combination"). Given an IC study per
//! factor, produce a weight vector under one of four methods.

use std::collections::{BTreeSet, HashMap};

use chrono::NaiveDate;

use panel_core::CoreError;

use crate::corr_math::mean_std;
use crate::types::{CombinationMethod, ICResult, OptimizationResult};

/// Dates common to every factor's IC series, in order.
fn aligned_dates(ic_results: &HashMap<String, ICResult>) -> Vec<NaiveDate> {
    let mut common: Option<BTreeSet<NaiveDate>> = None;
    for result in ic_results.values() {
        let dates: BTreeSet<NaiveDate> = result.ic_series.iter().map(|(d, _)| *d).collect();
        common = Some(match common {
            Some(existing) => existing.intersection(&dates).cloned().collect(),
            None => dates,
        });
    }
    common.unwrap_or_default().into_iter().collect()
}

/// `factor_name -> ic_value_by_date` lookup, for O(1) alignment.
fn series_maps(ic_results: &HashMap<String, ICResult>) -> HashMap<&str, HashMap<NaiveDate, f64>> {
    ic_results
        .iter()
        .map(|(name, result)| {
            let map: HashMap<NaiveDate, f64> = result.ic_series.iter().copied().collect();
            (name.as_str(), map)
        })
        .collect()
}

/// The weighted-combination IC series over the aligned dates, given a
/// per-factor weight map.
fn combined_series(
    names: &[String],
    weights: &HashMap<String, f64>,
    maps: &HashMap<&str, HashMap<NaiveDate, f64>>,
    dates: &[NaiveDate],
) -> Vec<f64> {
    dates
        .iter()
        .map(|date| {
            names
                .iter()
                .map(|name| weights[name] * maps[name.as_str()][date])
                .sum()
        })
        .collect()
}

fn objective(series: &[f64]) -> f64 {
    let (mean, std) = mean_std(series);
    if std != 0.0 {
        mean / std
    } else {
        0.0
    }
}

/// Project `w` onto the bounded simplex `{w : sum(w) = 1, lo <= w_i <= hi}`
/// via bisection on the shift applied before clamping (standard simplex
/// projection, generalised with box bounds).
fn project_to_bounded_simplex(w: &mut [f64], lo: f64, hi: f64) {
    let n = w.len();
    if n == 0 {
        return;
    }
    let mut tau_lo = w.iter().cloned().fold(f64::INFINITY, f64::min) - hi;
    let mut tau_hi = w.iter().cloned().fold(f64::NEG_INFINITY, f64::max) - lo;

    let sum_at = |tau: f64| -> f64 {
        w.iter().map(|v| (v - tau).clamp(lo, hi)).sum::<f64>()
    };

    for _ in 0..100 {
        let tau_mid = (tau_lo + tau_hi) / 2.0;
        if sum_at(tau_mid) > 1.0 {
            tau_lo = tau_mid;
        } else {
            tau_hi = tau_mid;
        }
    }
    let tau = (tau_lo + tau_hi) / 2.0;
    for v in w.iter_mut() {
        *v = (*v - tau).clamp(lo, hi);
    }
    let total: f64 = w.iter().sum();
    if total > 0.0 {
        for v in w.iter_mut() {
            *v /= total;
        }
    }
}

/// Numerical max-ICIR optimisation: projected gradient ascent over the
/// bounded simplex, starting from equal weights (§4.8).
fn optimize_max_icir(
    names: &[String],
    maps: &HashMap<&str, HashMap<NaiveDate, f64>>,
    dates: &[NaiveDate],
    min_weight: f64,
    max_weight: f64,
) -> HashMap<String, f64> {
    let n = names.len();
    let mut w = vec![1.0 / n as f64; n];
    let step = 0.05;
    let eps = 1e-4;

    for _ in 0..200 {
        let weight_map: HashMap<String, f64> =
            names.iter().cloned().zip(w.iter().copied()).collect();
        let base = objective(&combined_series(names, &weight_map, maps, dates));

        let mut grad = vec![0.0; n];
        for i in 0..n {
            let mut bumped = w.clone();
            bumped[i] += eps;
            let bumped_map: HashMap<String, f64> =
                names.iter().cloned().zip(bumped.iter().copied()).collect();
            let bumped_obj = objective(&combined_series(names, &bumped_map, maps, dates));
            grad[i] = (bumped_obj - base) / eps;
        }

        for i in 0..n {
            w[i] += step * grad[i];
        }
        project_to_bounded_simplex(&mut w, min_weight, max_weight);
    }

    names.iter().cloned().zip(w.into_iter()).collect()
}

pub fn combine(
    ic_results: &HashMap<String, ICResult>,
    method: CombinationMethod,
    min_weight: f64,
    max_weight: f64,
) -> Result<OptimizationResult, CoreError> {
    if ic_results.is_empty() {
        return Err(CoreError::InvalidInput(
            "combination requires at least one factor".to_string(),
        ));
    }
    let names: Vec<String> = {
        let mut n: Vec<String> = ic_results.keys().cloned().collect();
        n.sort();
        n
    };
    let n = names.len();

    let weights: HashMap<String, f64> = match method {
        CombinationMethod::Equal => names.iter().map(|name| (name.clone(), 1.0 / n as f64)).collect(),
        CombinationMethod::IcWeighted => {
            let total: f64 = names.iter().map(|name| ic_results[name].mean.abs()).sum();
            if total == 0.0 {
                names.iter().map(|name| (name.clone(), 1.0 / n as f64)).collect()
            } else {
                names
                    .iter()
                    .map(|name| (name.clone(), ic_results[name].mean.abs() / total))
                    .collect()
            }
        }
        CombinationMethod::IrWeighted => {
            let positive_total: f64 = names
                .iter()
                .map(|name| ic_results[name].ir)
                .filter(|ir| *ir > 0.0)
                .sum();
            if positive_total <= 0.0 {
                names.iter().map(|name| (name.clone(), 1.0 / n as f64)).collect()
            } else {
                names
                    .iter()
                    .map(|name| {
                        let ir = ic_results[name].ir;
                        let w = if ir > 0.0 { ir / positive_total } else { 0.0 };
                        (name.clone(), w)
                    })
                    .collect()
            }
        }
        CombinationMethod::MaxIcir => {
            let dates = aligned_dates(ic_results);
            let maps = series_maps(ic_results);
            if dates.is_empty() {
                names.iter().map(|name| (name.clone(), 1.0 / n as f64)).collect()
            } else {
                optimize_max_icir(&names, &maps, &dates, min_weight, max_weight)
            }
        }
    };

    let dates = aligned_dates(ic_results);
    let maps = series_maps(ic_results);
    let series = if dates.is_empty() {
        Vec::new()
    } else {
        combined_series(&names, &weights, &maps, &dates)
    };
    let (ic_mean, ic_std) = mean_std(&series);
    let ic_ir = if ic_std != 0.0 { ic_mean / ic_std } else { 0.0 };

    Ok(OptimizationResult {
        weights,
        objective_value: ic_ir,
        ic_mean,
        ic_ir,
        method,
    })
}
