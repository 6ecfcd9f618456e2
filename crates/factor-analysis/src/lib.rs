pub mod analyzer;
pub mod combination;
pub mod corr_math;
pub mod correlation;
pub mod forward_returns;
pub mod ic;
pub mod layering;
pub mod score;
pub mod types;

pub use analyzer::*;
pub use combination::combine;
pub use corr_math::CorrelationMethod;
pub use correlation::build_correlation_matrix;
pub use forward_returns::{build_cohort, forward_return, horizon_dates, Cohort};
pub use ic::{ic_series, ic_series_reference, summarize};
pub use layering::layering_test;
pub use score::{overall_score, recommendation};
pub use types::*;
