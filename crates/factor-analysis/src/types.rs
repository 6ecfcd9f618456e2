//! Analysis artefacts produced by this crate (§1 "Analysis artefacts").

use std::collections::HashMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::corr_math::CorrelationMethod;

/// Result of an information-coefficient study over one factor (§4.8).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ICResult {
    pub mean: f64,
    pub std: f64,
    pub ir: f64,
    pub positive_rate: f64,
    pub t_stat: f64,
    pub p_value: f64,
    pub ic_series: Vec<(NaiveDate, f64)>,
}

/// Aggregated forward-return statistics for one quantile layer (§4.8).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LayerResult {
    pub mean_return: f64,
    pub std: f64,
    pub sharpe: f64,
    pub win_rate: f64,
    pub periods: usize,
}

/// Full layering-test output: the layers plus a monotonicity check and an
/// optional top-minus-bottom synthetic layer (§4.8).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayeringReport {
    pub layers: Vec<LayerResult>,
    /// Spearman correlation between layer rank (1..=n) and `mean_return`.
    pub monotonicity: f64,
    pub long_short: Option<LayerResult>,
}

/// A symmetric factor-to-factor correlation matrix (§4.8 "Correlation").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrelationMatrix {
    pub factor_names: Vec<String>,
    pub matrix: Vec<Vec<f64>>,
}

/// One above-threshold factor pair surfaced by [`CorrelationMatrix::find_high_pairs`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HighCorrelationPair {
    pub factor_a: String,
    pub factor_b: String,
    pub correlation: f64,
}

/// Method used to combine per-factor IC series into portfolio weights
/// (§4.8 "Combination").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CombinationMethod {
    Equal,
    IcWeighted,
    IrWeighted,
    MaxIcir,
}

impl CombinationMethod {
    pub fn label(&self) -> &'static str {
        match self {
            CombinationMethod::Equal => "equal",
            CombinationMethod::IcWeighted => "ic_weighted",
            CombinationMethod::IrWeighted => "ir_weighted",
            CombinationMethod::MaxIcir => "max_icir",
        }
    }
}

/// Result of combining multiple factors' IC series into one weight vector
/// (§4.8 "Combination").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationResult {
    pub weights: HashMap<String, f64>,
    pub objective_value: f64,
    pub ic_mean: f64,
    pub ic_ir: f64,
    pub method: CombinationMethod,
}

/// Mode used by [`crate::correlation::build_correlation_matrix`] (§4.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CorrelationMode {
    /// Stack all (date, stock) factor values into one vector per factor,
    /// then correlate the stacked vectors directly.
    Concat,
    /// Compute a per-date cross-sectional correlation matrix and average
    /// across dates.
    Mean,
}

/// Full per-factor report (§1 "Analysis artefacts").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FactorAnalysisReport {
    pub factor_name: String,
    pub ic_result: Option<ICResult>,
    pub layering: Option<LayeringReport>,
    pub correlation_matrix: Option<CorrelationMatrix>,
    pub optimization: Option<OptimizationResult>,
    pub overall_score: f64,
    pub recommendation: String,
}

/// Knobs shared by every factor study in one [`crate::analyzer::FactorAnalyzer`]
/// run (§4.8).
#[derive(Debug, Clone, Copy)]
pub struct AnalysisConfig {
    pub horizon: usize,
    pub method: CorrelationMethod,
    pub min_samples: usize,
    pub n_layers: usize,
    pub long_short: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            horizon: 5,
            method: CorrelationMethod::Pearson,
            min_samples: 10,
            n_layers: 5,
            long_short: true,
        }
    }
}
