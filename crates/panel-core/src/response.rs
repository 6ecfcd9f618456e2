use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CoreError;

/// Response status tag (§6 — Response envelope).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Success,
    Warning,
    Error,
}

/// Unified response envelope every public core operation returns (§6, §9).
///
/// Serialisation omits absent fields (`message`, `error`, `error_code`,
/// `metadata`) so a success response doesn't carry empty error keys and
/// vice versa — this is the structure Testable Property 9 (round-trip)
/// checks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response<T> {
    pub status: ResponseStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(skip_serializing_if = "HashMap::is_empty", default)]
    pub metadata: HashMap<String, Value>,
}

impl<T> Response<T> {
    pub fn success(data: T, message: impl Into<String>) -> Self {
        Self {
            status: ResponseStatus::Success,
            data: Some(data),
            message: Some(message.into()),
            error: None,
            error_code: None,
            metadata: HashMap::new(),
        }
    }

    pub fn success_with(data: T, message: impl Into<String>, metadata: HashMap<String, Value>) -> Self {
        Self {
            status: ResponseStatus::Success,
            data: Some(data),
            message: Some(message.into()),
            error: None,
            error_code: None,
            metadata,
        }
    }

    pub fn warning(data: Option<T>, message: impl Into<String>) -> Self {
        Self {
            status: ResponseStatus::Warning,
            data,
            message: Some(message.into()),
            error: None,
            error_code: None,
            metadata: HashMap::new(),
        }
    }

    pub fn error(error: impl Into<String>, error_code: impl Into<String>) -> Self {
        Self {
            status: ResponseStatus::Error,
            data: None,
            message: None,
            error: Some(error.into()),
            error_code: Some(error_code.into()),
            metadata: HashMap::new(),
        }
    }

    pub fn from_core_error(err: &CoreError) -> Self {
        Self::error(err.to_string(), err.code())
    }

    pub fn is_success(&self) -> bool {
        self.status == ResponseStatus::Success
    }

    pub fn is_warning(&self) -> bool {
        self.status == ResponseStatus::Warning
    }

    pub fn is_error(&self) -> bool {
        self.status == ResponseStatus::Error
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}
