use thiserror::Error;

/// Error taxonomy shared by every core component (§7 of the platform spec).
///
/// Variants name error *kinds*, not component-specific failure modes — each
/// crate's own errors convert into one of these so the C9 `Response`
/// envelope can carry a stable `error_code`.
#[derive(Error, Debug, Clone)]
pub enum CoreError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("data unavailable: {0}")]
    DataUnavailable(String),

    #[error("external dependency failure: {0}")]
    ExternalDependency(String),

    #[error("computation degeneracy: {0}")]
    ComputationDegeneracy(String),

    #[error("security violation: {0}")]
    SecurityViolation(String),

    #[error("resource exhaustion: {0}")]
    ResourceExhaustion(String),
}

impl CoreError {
    /// Machine-readable code for the `Response.error_code` field.
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::InvalidInput(_) => "INVALID_INPUT",
            CoreError::DataUnavailable(_) => "DATA_UNAVAILABLE",
            CoreError::ExternalDependency(_) => "EXTERNAL_DEPENDENCY_FAILURE",
            CoreError::ComputationDegeneracy(_) => "COMPUTATION_DEGENERACY",
            CoreError::SecurityViolation(_) => "SECURITY_VIOLATION",
            CoreError::ResourceExhaustion(_) => "RESOURCE_EXHAUSTION",
        }
    }
}
