//! Ties IC, layering, correlation, and scoring into one
//! [`FactorAnalysisReport`] per factor, plus the parallel `batch_analyze`
//! entry point (§1 "Batch analyze").

use std::collections::HashMap;

use panel_core::{CoreError, PricePanel, ScorePanel};
use parallel_exec::{ExecutorBackend, ParallelExecutor, WorkerCount};

use crate::correlation::build_correlation_matrix;
use crate::ic;
use crate::layering::layering_test;
use crate::score::{overall_score, recommendation};
use crate::types::{AnalysisConfig, CorrelationMode, FactorAnalysisReport};

pub struct FactorAnalyzer {
    pub config: AnalysisConfig,
}

impl FactorAnalyzer {
    pub fn new(config: AnalysisConfig) -> Self {
        Self { config }
    }

    /// IC + layering + scoring for one factor. `parallel_ic` controls
    /// whether the IC date-chunks may themselves run in parallel — callers
    /// running many factors concurrently (`batch_analyze`) pass `false` to
    /// avoid nested thread-pool contention.
    pub fn analyze_factor(
        &self,
        name: &str,
        factor: &ScorePanel,
        prices: &PricePanel,
        parallel_ic: bool,
    ) -> Result<FactorAnalysisReport, CoreError> {
        let series = ic::ic_series(
            factor,
            prices,
            self.config.horizon,
            self.config.method,
            self.config.min_samples,
            parallel_ic,
        )?;
        let ic_result = ic::summarize(series);
        let layering = layering_test(factor, prices, &self.config)?;

        let score = overall_score(Some(&ic_result), Some(&layering));
        Ok(FactorAnalysisReport {
            factor_name: name.to_string(),
            ic_result: Some(ic_result),
            layering: Some(layering),
            correlation_matrix: None,
            optimization: None,
            overall_score: score,
            recommendation: recommendation(score),
        })
    }

    /// Analyzes every factor in `factors` concurrently via the shared
    /// executor, with nested parallelism disabled inside each worker, then
    /// attaches one shared correlation matrix to every report (§1).
    pub fn batch_analyze(
        &self,
        factors: &HashMap<String, ScorePanel>,
        prices: &PricePanel,
    ) -> Result<HashMap<String, FactorAnalysisReport>, CoreError> {
        let mut names: Vec<String> = factors.keys().cloned().collect();
        names.sort();

        let executor =
            ParallelExecutor::new(ExecutorBackend::ParallelThread, WorkerCount::AllButOne, true);
        let results = executor
            .map(
                names.clone(),
                |name| {
                    self.analyze_factor(&name, &factors[&name], prices, false)
                        .map_err(|e| e.to_string())
                },
                false,
            )
            .map_err(|e| CoreError::ComputationDegeneracy(e.to_string()))?;

        let correlation = if names.len() >= 2 {
            build_correlation_matrix(&names, factors, CorrelationMode::Mean).ok()
        } else {
            None
        };

        let mut out = HashMap::with_capacity(names.len());
        for (name, mut report) in names.into_iter().zip(results.into_iter()) {
            report.correlation_matrix = correlation.clone();
            out.insert(name, report);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use panel_core::{Panel, TradingCalendar};

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn sample_panels(seed_offset: f64) -> (ScorePanel, PricePanel) {
        let dates: Vec<NaiveDate> = (0..40)
            .map(|i| d(2023, 1, 1) + chrono::Duration::days(i as i64))
            .collect();
        let calendar = TradingCalendar::new(dates.clone()).unwrap();
        let mut factor: ScorePanel = Panel::new(calendar.clone());
        let mut prices: PricePanel = Panel::new(calendar);
        for (i, date) in dates.iter().enumerate() {
            for s in 0..8 {
                let stock = format!("S{s}");
                factor.insert(&stock, *date, (s as f64) + seed_offset);
                prices.insert(&stock, *date, 100.0 + (s as f64) * (i as f64 + 1.0) * 0.1);
            }
        }
        (factor, prices)
    }

    #[test]
    fn analyze_factor_produces_a_complete_report() {
        let analyzer = FactorAnalyzer::new(AnalysisConfig::default());
        let (factor, prices) = sample_panels(0.0);
        let report = analyzer
            .analyze_factor("momentum", &factor, &prices, false)
            .unwrap();
        assert_eq!(report.factor_name, "momentum");
        assert!(report.ic_result.is_some());
        assert!(report.layering.is_some());
        assert!(report.overall_score >= 0.0 && report.overall_score <= 100.0);
    }

    #[test]
    fn batch_analyze_attaches_the_same_correlation_matrix_to_every_report() {
        let analyzer = FactorAnalyzer::new(AnalysisConfig::default());
        let (factor_a, prices) = sample_panels(0.0);
        let (factor_b, _) = sample_panels(1.0);
        let mut factors = HashMap::new();
        factors.insert("a".to_string(), factor_a);
        factors.insert("b".to_string(), factor_b);

        let reports = analyzer.batch_analyze(&factors, &prices).unwrap();
        assert_eq!(reports.len(), 2);
        let corr_a = reports["a"].correlation_matrix.as_ref().unwrap();
        let corr_b = reports["b"].correlation_matrix.as_ref().unwrap();
        assert_eq!(corr_a.matrix, corr_b.matrix);
    }
}
