//! Overall factor score (§4.8 "Overall score"): a 100-point weighted
//! rubric over IC magnitude, ICIR, positive rate, and monotonicity.

use crate::types::{ICResult, LayeringReport};

const IC_MAGNITUDE_WEIGHT: f64 = 40.0;
const ICIR_WEIGHT: f64 = 30.0;
const POSITIVE_RATE_WEIGHT: f64 = 15.0;
const MONOTONICITY_WEIGHT: f64 = 15.0;

/// Tiered bucket score for `|IC mean|`, out of [`IC_MAGNITUDE_WEIGHT`].
fn ic_magnitude_score(ic_mean: f64) -> f64 {
    let m = ic_mean.abs();
    if m >= 0.05 {
        IC_MAGNITUDE_WEIGHT
    } else if m >= 0.03 {
        IC_MAGNITUDE_WEIGHT * 0.75
    } else if m >= 0.02 {
        IC_MAGNITUDE_WEIGHT * 0.5
    } else if m >= 0.01 {
        IC_MAGNITUDE_WEIGHT * 0.25
    } else {
        0.0
    }
}

/// Tiered bucket score for `|ICIR|`, out of [`ICIR_WEIGHT`].
fn icir_score(ic_ir: f64) -> f64 {
    let ir = ic_ir.abs();
    if ir >= 0.5 {
        ICIR_WEIGHT
    } else if ir >= 0.3 {
        ICIR_WEIGHT * 0.75
    } else if ir >= 0.15 {
        ICIR_WEIGHT * 0.4
    } else if ir >= 0.05 {
        ICIR_WEIGHT * 0.15
    } else {
        0.0
    }
}

/// Linear in the distance of `positive_rate` from 0.5 (consistently one
/// direction is what matters, not which direction), out of
/// [`POSITIVE_RATE_WEIGHT`].
fn positive_rate_score(positive_rate: f64) -> f64 {
    let distance = (positive_rate - 0.5).abs() * 2.0;
    POSITIVE_RATE_WEIGHT * distance.min(1.0)
}

/// Linear in `|monotonicity|`, out of [`MONOTONICITY_WEIGHT`].
fn monotonicity_score(monotonicity: f64) -> f64 {
    MONOTONICITY_WEIGHT * monotonicity.abs().min(1.0)
}

pub fn overall_score(ic: Option<&ICResult>, layering: Option<&LayeringReport>) -> f64 {
    let ic_part = ic
        .map(|r| ic_magnitude_score(r.mean) + icir_score(r.ir) + positive_rate_score(r.positive_rate))
        .unwrap_or(0.0);
    let mono_part = layering
        .map(|l| monotonicity_score(l.monotonicity))
        .unwrap_or(0.0);
    ic_part + mono_part
}

pub fn recommendation(score: f64) -> String {
    if score >= 80.0 {
        "strong factor: stable, significant predictive power — suitable for production use"
    } else if score >= 60.0 {
        "moderate factor: meaningful signal — consider combining with other factors"
    } else if score >= 40.0 {
        "weak factor: marginal signal — use with caution and further validation"
    } else {
        "no significant predictive power — reject"
    }
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn strong_ic() -> ICResult {
        ICResult {
            mean: 0.06,
            std: 0.1,
            ir: 0.6,
            positive_rate: 0.7,
            t_stat: 4.0,
            p_value: 0.001,
            ic_series: vec![(d(2022, 1, 1), 0.06)],
        }
    }

    #[test]
    fn strong_factor_scores_above_production_threshold() {
        let score = overall_score(Some(&strong_ic()), None);
        assert!(score >= 80.0, "expected strong score, got {score}");
        assert!(recommendation(score).contains("production"));
    }

    #[test]
    fn flat_ic_scores_near_zero() {
        let flat = ICResult {
            mean: 0.0,
            std: 0.1,
            ir: 0.0,
            positive_rate: 0.5,
            t_stat: 0.0,
            p_value: 1.0,
            ic_series: vec![],
        };
        let score = overall_score(Some(&flat), None);
        assert_eq!(score, 0.0);
        assert!(recommendation(score).contains("reject"));
    }
}
