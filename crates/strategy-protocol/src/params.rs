use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use panel_core::CoreError;

/// Declared type of one parameter slot in a [`ParamSchema`] (§3 Strategy
/// metadata).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    Integer,
    Float,
    Boolean,
    String,
    Select,
}

/// One entry in a strategy component's declared parameter schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParamSpec {
    pub name: String,
    pub label: String,
    #[serde(rename = "type")]
    pub param_type: ParamType,
    pub default: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
    pub description: String,
}

impl ParamSpec {
    pub fn new(name: &str, label: &str, param_type: ParamType, default: Value, description: &str) -> Self {
        Self {
            name: name.to_string(),
            label: label.to_string(),
            param_type,
            default,
            min: None,
            max: None,
            options: None,
            description: description.to_string(),
        }
    }

    pub fn with_range(mut self, min: f64, max: f64) -> Self {
        self.min = Some(min);
        self.max = Some(max);
        self
    }

    pub fn with_options(mut self, options: &[&str]) -> Self {
        self.options = Some(options.iter().map(|s| s.to_string()).collect());
        self
    }
}

/// A strategy component's static parameter contract: the schema every
/// submitted `params` map is validated against on construction (§4.7
/// Parameter validation contract).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParamSchema {
    pub specs: Vec<ParamSpec>,
}

impl ParamSchema {
    pub fn new(specs: Vec<ParamSpec>) -> Self {
        Self { specs }
    }

    /// Validate `params` against this schema: unknown keys are rejected,
    /// numeric ranges enforced, `select` options checked, and type
    /// mismatches rejected. Any failure surfaces before the owning
    /// component becomes usable.
    pub fn validate(&self, params: &HashMap<String, Value>) -> Result<(), CoreError> {
        let known: std::collections::HashSet<&str> =
            self.specs.iter().map(|s| s.name.as_str()).collect();
        for key in params.keys() {
            if !known.contains(key.as_str()) {
                return Err(CoreError::InvalidInput(format!(
                    "unknown parameter '{key}'"
                )));
            }
        }

        for spec in &self.specs {
            let value = params.get(&spec.name).unwrap_or(&spec.default);
            self.validate_one(spec, value)?;
        }
        Ok(())
    }

    fn validate_one(&self, spec: &ParamSpec, value: &Value) -> Result<(), CoreError> {
        match spec.param_type {
            ParamType::Integer => {
                let n = value.as_i64().ok_or_else(|| {
                    CoreError::InvalidInput(format!("'{}' must be an integer", spec.name))
                })?;
                self.check_range(spec, n as f64)?;
            }
            ParamType::Float => {
                let n = value.as_f64().ok_or_else(|| {
                    CoreError::InvalidInput(format!("'{}' must be a float", spec.name))
                })?;
                self.check_range(spec, n)?;
            }
            ParamType::Boolean => {
                value.as_bool().ok_or_else(|| {
                    CoreError::InvalidInput(format!("'{}' must be a boolean", spec.name))
                })?;
            }
            ParamType::String => {
                value.as_str().ok_or_else(|| {
                    CoreError::InvalidInput(format!("'{}' must be a string", spec.name))
                })?;
            }
            ParamType::Select => {
                let s = value.as_str().ok_or_else(|| {
                    CoreError::InvalidInput(format!("'{}' must be a string", spec.name))
                })?;
                let options = spec.options.as_ref().ok_or_else(|| {
                    CoreError::InvalidInput(format!("'{}' has no declared options", spec.name))
                })?;
                if !options.iter().any(|o| o == s) {
                    return Err(CoreError::InvalidInput(format!(
                        "'{}' value '{s}' is not one of {options:?}",
                        spec.name
                    )));
                }
            }
        }
        Ok(())
    }

    fn check_range(&self, spec: &ParamSpec, n: f64) -> Result<(), CoreError> {
        if let Some(min) = spec.min {
            if n < min {
                return Err(CoreError::InvalidInput(format!(
                    "'{}' = {n} is below minimum {min}",
                    spec.name
                )));
            }
        }
        if let Some(max) = spec.max {
            if n > max {
                return Err(CoreError::InvalidInput(format!(
                    "'{}' = {n} is above maximum {max}",
                    spec.name
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> ParamSchema {
        ParamSchema::new(vec![
            ParamSpec::new("lookback", "Lookback", ParamType::Integer, json!(20), "days")
                .with_range(1.0, 252.0),
            ParamSpec::new("mode", "Mode", ParamType::Select, json!("momentum"), "selection mode")
                .with_options(&["momentum", "value"]),
        ])
    }

    #[test]
    fn rejects_unknown_key() {
        let mut params = HashMap::new();
        params.insert("bogus".to_string(), json!(1));
        assert!(schema().validate(&params).is_err());
    }

    #[test]
    fn enforces_numeric_range() {
        let mut params = HashMap::new();
        params.insert("lookback".to_string(), json!(400));
        assert!(schema().validate(&params).is_err());
    }

    #[test]
    fn enforces_select_options() {
        let mut params = HashMap::new();
        params.insert("mode".to_string(), json!("nonsense"));
        assert!(schema().validate(&params).is_err());
    }

    #[test]
    fn accepts_valid_params() {
        let mut params = HashMap::new();
        params.insert("lookback".to_string(), json!(60));
        params.insert("mode".to_string(), json!("value"));
        assert!(schema().validate(&params).is_ok());
    }
}
