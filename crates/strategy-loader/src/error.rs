use thiserror::Error;

/// Error taxonomy for the dynamic strategy loader (§4.9, §7). Every
/// variant maps onto the shared `CoreError` kind so the C9 `Response`
/// envelope carries a stable `error_code`; the mapping is exact rather
/// than lossy so a caller can still tell a hash mismatch from a forbidden
/// import even though both are "security violation" at the `CoreError`
/// level.
#[derive(Error, Debug, Clone)]
pub enum LoaderError {
    #[error("strategy record disabled or unvalidated: {0}")]
    RecordNotEligible(String),

    #[error("code hash mismatch: expected {expected}, got {actual}")]
    HashMismatch { expected: String, actual: String },

    #[error("syntax error: {0}")]
    SyntaxError(String),

    #[error("forbidden import: {0}")]
    ForbiddenImport(String),

    #[error("forbidden call: {0}")]
    ForbiddenCall(String),

    #[error("forbidden attribute access: {0}")]
    ForbiddenAttribute(String),

    #[error("forbidden substring ({group}): {pattern}")]
    ForbiddenSubstring { group: String, pattern: String },

    #[error("sandbox build failed: {0}")]
    SandboxFailure(String),

    #[error("strategy class does not implement the expected protocol: {0}")]
    ProtocolMismatch(String),

    #[error("resource limit exceeded: {0}")]
    ResourceExhausted(String),
}

impl LoaderError {
    /// Machine-readable code for the `Response.error_code` field and for
    /// audit-log `violation_type` fields (§6, §7).
    pub fn code(&self) -> &'static str {
        match self {
            LoaderError::RecordNotEligible(_) => "RECORD_NOT_ELIGIBLE",
            LoaderError::HashMismatch { .. } => "HASH_MISMATCH",
            LoaderError::SyntaxError(_) => "SYNTAX_ERROR",
            LoaderError::ForbiddenImport(_) => "FORBIDDEN_IMPORT",
            LoaderError::ForbiddenCall(_) => "FORBIDDEN_CALL",
            LoaderError::ForbiddenAttribute(_) => "FORBIDDEN_ATTRIBUTE",
            LoaderError::ForbiddenSubstring { .. } => "FORBIDDEN_SUBSTRING",
            LoaderError::SandboxFailure(_) => "SANDBOX_FAILURE",
            LoaderError::ProtocolMismatch(_) => "PROTOCOL_MISMATCH",
            LoaderError::ResourceExhausted(_) => "RESOURCE_EXHAUSTED",
        }
    }

    /// Whether this error represents an adversarial/security event rather
    /// than a benign validation failure — gates whether a
    /// `security_violation` audit record is written (§7).
    pub fn is_security_violation(&self) -> bool {
        !matches!(self, LoaderError::RecordNotEligible(_))
    }
}

impl From<LoaderError> for panel_core::CoreError {
    fn from(err: LoaderError) -> Self {
        match err {
            LoaderError::ResourceExhausted(msg) => panel_core::CoreError::ResourceExhaustion(msg),
            LoaderError::RecordNotEligible(msg) => panel_core::CoreError::InvalidInput(msg),
            other => panel_core::CoreError::SecurityViolation(other.to_string()),
        }
    }
}
