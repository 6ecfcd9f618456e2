//! Loader registry input records (§6 "Loader registry inputs").

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    Passed,
    Failed,
    Pending,
}

/// A predefined-class strategy, parameterised by a JSON config blob rather
/// than by source code. Never touches the four-stage pipeline — only
/// code-backed strategies do.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigBackedStrategy {
    pub id: String,
    pub name: String,
    pub strategy_type: String,
    pub config: serde_json::Value,
    pub config_hash: String,
    pub version: u32,
    pub is_active: bool,
}

/// An AI- or user-supplied strategy carrying its own source code, which
/// must clear every stage of §4.9 before it is ever parsed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeBackedStrategy {
    pub id: String,
    pub strategy_name: String,
    pub class_name: String,
    pub generated_code: Vec<u8>,
    pub code_hash: String,
    pub validation_status: ValidationStatus,
    pub test_status: String,
    pub is_enabled: bool,
    pub version: u32,
    /// Passed to the strategy class's constructor as `config=` on
    /// instantiation, so the class's own schema check re-runs every load.
    #[serde(default)]
    pub params: serde_json::Value,
}

impl CodeBackedStrategy {
    /// The loader refuses these records before any code is touched (§6).
    pub fn eligible_for_load(&self) -> bool {
        self.is_enabled && !matches!(self.validation_status, ValidationStatus::Failed)
    }

    pub fn source(&self) -> Result<String, crate::error::LoaderError> {
        String::from_utf8(self.generated_code.clone())
            .map_err(|e| crate::error::LoaderError::SandboxFailure(format!("non-utf8 source: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(is_enabled: bool, status: ValidationStatus) -> CodeBackedStrategy {
        CodeBackedStrategy {
            id: "s1".to_string(),
            strategy_name: "demo".to_string(),
            class_name: "Demo".to_string(),
            generated_code: b"pass".to_vec(),
            code_hash: "abc".to_string(),
            validation_status: status,
            test_status: "unknown".to_string(),
            is_enabled,
            version: 1,
            params: serde_json::Value::Null,
        }
    }

    #[test]
    fn disabled_record_is_not_eligible() {
        assert!(!sample(false, ValidationStatus::Passed).eligible_for_load());
    }

    #[test]
    fn failed_validation_is_not_eligible() {
        assert!(!sample(true, ValidationStatus::Failed).eligible_for_load());
    }

    #[test]
    fn enabled_and_not_failed_is_eligible() {
        assert!(sample(true, ValidationStatus::Pending).eligible_for_load());
        assert!(sample(true, ValidationStatus::Passed).eligible_for_load());
    }
}
