//! Information-coefficient computation (§4.8 "IC"). Split across workers by
//! date-chunk once the date count reaches 100; the serial and parallel
//! paths must agree element-wise (Testable Property 10).

use chrono::NaiveDate;

use panel_core::{CoreError, PricePanel, ScorePanel};
use parallel_exec::{partition_by_count, ExecutorBackend, ParallelExecutor, WorkerCount};

use crate::corr_math::{correlate, mean_std, t_test_against_zero, CorrelationMethod};
use crate::forward_returns::{build_cohort, horizon_dates};
use crate::types::ICResult;

const PARALLEL_THRESHOLD: usize = 100;

/// Per-date IC for one cross-section, or `None` if fewer than
/// `min_samples` non-NaN pairs were observable that day.
fn ic_at(
    factor: &ScorePanel,
    prices: &PricePanel,
    calendar: &[NaiveDate],
    date_index: usize,
    horizon: usize,
    method: CorrelationMethod,
    min_samples: usize,
) -> Option<(NaiveDate, f64)> {
    let cohort = build_cohort(factor, prices, calendar, date_index, horizon);
    if cohort.rows.len() < min_samples {
        return None;
    }
    let xs: Vec<f64> = cohort.rows.iter().map(|(_, f, _)| *f).collect();
    let ys: Vec<f64> = cohort.rows.iter().map(|(_, _, r)| *r).collect();
    let ic = correlate(method, &xs, &ys)?;
    Some((cohort.date, ic))
}

/// Double-loop reference implementation, exercised by the equivalence test
/// against [`ic_series`] (Testable Property 10).
pub fn ic_series_reference(
    factor: &ScorePanel,
    prices: &PricePanel,
    horizon: usize,
    method: CorrelationMethod,
    min_samples: usize,
) -> Vec<(NaiveDate, f64)> {
    let calendar = factor.calendar().intersect(prices.calendar());
    let dates = horizon_dates(&calendar, horizon);
    let mut out = Vec::new();
    for date in &dates {
        let idx = calendar.iter().position(|d| d == date).unwrap();
        if let Some(pair) = ic_at(factor, prices, &calendar, idx, horizon, method, min_samples) {
            out.push(pair);
        }
    }
    out
}

/// The vectorised (chunked, optionally parallel) IC series computation.
/// Always returns results in chronological order regardless of which
/// worker finished first (§5 Ordering guarantees).
pub fn ic_series(
    factor: &ScorePanel,
    prices: &PricePanel,
    horizon: usize,
    method: CorrelationMethod,
    min_samples: usize,
    parallel: bool,
) -> Result<Vec<(NaiveDate, f64)>, CoreError> {
    let calendar = factor.calendar().intersect(prices.calendar());
    let dates = horizon_dates(&calendar, horizon);
    if dates.is_empty() {
        return Ok(Vec::new());
    }

    let indices: Vec<usize> = (0..dates.len()).collect();
    let n_workers = WorkerCount::AllButOne.resolve();
    let executor = ParallelExecutor::with_options(
        ExecutorBackend::ParallelThread,
        WorkerCount::Fixed(n_workers),
        parallel && dates.len() >= PARALLEL_THRESHOLD,
        1,
        None,
    );

    let chunks = partition_by_count(&indices, n_workers.max(1));
    let results = executor
        .map(
            chunks,
            |chunk| {
                let mut out = Vec::with_capacity(chunk.len());
                for idx in chunk {
                    if let Some(pair) =
                        ic_at(factor, prices, &calendar, idx, horizon, method, min_samples)
                    {
                        out.push(pair);
                    }
                }
                Ok::<_, String>(out)
            },
            false,
        )
        .map_err(|e| CoreError::ComputationDegeneracy(e.to_string()))?;

    Ok(results.into_iter().flatten().collect())
}

/// Summary statistics over an already-computed IC series (§4.8 "IC").
pub fn summarize(ic_series: Vec<(NaiveDate, f64)>) -> ICResult {
    let values: Vec<f64> = ic_series.iter().map(|(_, v)| *v).collect();
    let (mean, std) = mean_std(&values);
    let ir = if std != 0.0 { mean / std } else { 0.0 };
    let positive_rate = if values.is_empty() {
        0.0
    } else {
        values.iter().filter(|v| **v > 0.0).count() as f64 / values.len() as f64
    };
    let (t_stat, p_value) = t_test_against_zero(mean, std, values.len());
    ICResult {
        mean,
        std,
        ir,
        positive_rate,
        t_stat,
        p_value,
        ic_series,
    }
}
