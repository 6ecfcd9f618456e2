//! Top-level orchestrator for the four-stage dynamic-strategy pipeline
//! (§4.9): hash verification, AST static analysis, substring pattern
//! check, then a sandboxed `pyo3` build that instantiates the strategy
//! class inside a restricted builtins namespace and confirms it exposes
//! the domain method its declared protocol requires.

use std::sync::Arc;

use pyo3::prelude::*;
use pyo3::types::{PyDict, PyList};

use crate::audit::{AuditEvent, AuditLogger};
use crate::cache::{LoadedStrategy, StrategyCache};
use crate::error::LoaderError;
use crate::registry::CodeBackedStrategy;
use crate::resource_limiter::{apply_rlimits, run_with_deadline, ResourceLimits};
use crate::sanitizer::{pattern_check, static_analysis, verify_hash};

/// Which `strategy-protocol` trait the loaded class must satisfy,
/// checked by attribute probing rather than a Python-side `issubclass`
/// (the sandbox namespace never gets the real base classes — see
/// [`required_method`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolKind {
    StockSelector,
    EntryStrategy,
    ExitStrategy,
}

impl ProtocolKind {
    fn required_method(self) -> &'static str {
        match self {
            ProtocolKind::StockSelector => "select",
            ProtocolKind::EntryStrategy => "generate_entry_signals",
            ProtocolKind::ExitStrategy => "generate_exit_signals",
        }
    }
}

pub struct StrategyLoader {
    cache: StrategyCache,
    audit: Arc<AuditLogger>,
    limits: ResourceLimits,
    strict_pattern_mode: bool,
}

impl StrategyLoader {
    pub fn new(audit: Arc<AuditLogger>) -> Self {
        Self {
            cache: StrategyCache::new(),
            audit,
            limits: ResourceLimits::default(),
            strict_pattern_mode: true,
        }
    }

    pub fn with_limits(mut self, limits: ResourceLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Runs the full pipeline for `record`, returning a cache hit when
    /// the record's current `code_hash` already has a validated entry.
    pub fn load(
        &self,
        record: &CodeBackedStrategy,
        protocol: ProtocolKind,
    ) -> Result<LoadedStrategy, LoaderError> {
        if let Some(cached) = self.cache.get(&record.id, &record.code_hash) {
            self.log(&record.id, AuditEvent::CacheEvent {
                timestamp: chrono::Utc::now(),
                strategy_id: record.id.clone(),
                hit: true,
            });
            return Ok(cached);
        }
        self.log(&record.id, AuditEvent::CacheEvent {
            timestamp: chrono::Utc::now(),
            strategy_id: record.id.clone(),
            hit: false,
        });

        match self.load_uncached(record, protocol) {
            Ok(strategy) => {
                self.cache.insert(strategy.clone());
                self.log(&record.id, AuditEvent::StrategyLoad {
                    timestamp: chrono::Utc::now(),
                    strategy_id: record.id.clone(),
                    success: true,
                    detail: None,
                });
                Ok(strategy)
            }
            Err(err) => {
                if err.is_security_violation() {
                    self.log(&record.id, AuditEvent::security_violation(&record.id, &err));
                }
                self.log(&record.id, AuditEvent::StrategyLoad {
                    timestamp: chrono::Utc::now(),
                    strategy_id: record.id.clone(),
                    success: false,
                    detail: Some(err.to_string()),
                });
                Err(err)
            }
        }
    }

    fn load_uncached(
        &self,
        record: &CodeBackedStrategy,
        protocol: ProtocolKind,
    ) -> Result<LoadedStrategy, LoaderError> {
        if !record.eligible_for_load() {
            return Err(LoaderError::RecordNotEligible(format!(
                "record {} is disabled or failed validation",
                record.id
            )));
        }

        let source = record.source()?;

        // Stage 1.
        verify_hash(&source, &record.code_hash)?;
        // Stage 2.
        static_analysis(&source)?;
        // Stage 3.
        pattern_check(&source, self.strict_pattern_mode)?;

        // Stage 4, wall-clock and rlimit bounded.
        let class_name = record.class_name.clone();
        let strategy_name = record.strategy_name.clone();
        let params = record.params.clone();
        let record_id = record.id.clone();
        let limits = self.limits;
        let py_object = run_with_deadline(&self.limits, move || {
            apply_rlimits(&limits)?;
            sandboxed_build(&source, &class_name, &strategy_name, &params, protocol).map_err(|e| {
                LoaderError::SandboxFailure(format!("{record_id}: {e}"))
            })
        })?;

        Ok(LoadedStrategy {
            record_id: record.id.clone(),
            code_hash: record.code_hash.clone(),
            class_name: record.class_name.clone(),
            py_object: Arc::new(py_object),
        })
    }

    fn log(&self, strategy_id: &str, event: AuditEvent) {
        if let Err(e) = self.audit.log(&event) {
            tracing::warn!(strategy_id, error = %e, "failed to write audit event");
        }
    }
}

/// Restricted builtins exposed to sandboxed code. Deliberately a small
/// allow-list rather than the full `__builtins__` module — anything not
/// named here is simply absent from the namespace the strategy class
/// body executes in, which is a second line of defense behind the §6
/// deny-list already enforced in stages 2-3.
const SAFE_BUILTINS: &[&str] = &[
    "len", "range", "enumerate", "zip", "map", "filter", "sum", "min", "max", "abs", "round",
    "sorted", "reversed", "list", "dict", "set", "tuple", "str", "int", "float", "bool", "print",
    "isinstance", "True", "False", "None",
];

fn sandboxed_build(
    source: &str,
    class_name: &str,
    strategy_name: &str,
    params: &serde_json::Value,
    protocol: ProtocolKind,
) -> PyResult<Py<PyAny>> {
    Python::attach(|py| {
        let restricted_builtins = PyDict::new(py);
        let real_builtins = py.import("builtins")?;
        for name in SAFE_BUILTINS {
            if let Ok(value) = real_builtins.getattr(*name) {
                restricted_builtins.set_item(*name, value)?;
            }
        }

        let globals = PyDict::new(py);
        globals.set_item("__builtins__", restricted_builtins)?;
        globals.set_item("__name__", "__strategy__")?;

        let code = std::ffi::CString::new(source).map_err(|e| {
            pyo3::exceptions::PyValueError::new_err(format!("source contains a NUL byte: {e}"))
        })?;
        py.run(&code, Some(&globals), None)?;

        let class = globals.get_item(class_name)?.ok_or_else(|| {
            pyo3::exceptions::PyAttributeError::new_err(format!(
                "class {class_name} not defined by strategy source"
            ))
        })?;

        // Instantiate with the supplied params so the class's own schema
        // check re-runs on every load, not just `call0()`.
        let kwargs = PyDict::new(py);
        kwargs.set_item("name", strategy_name)?;
        kwargs.set_item("config", json_to_py(py, params)?)?;
        let instance = class.call((), Some(&kwargs))?;

        let method_name = protocol.required_method();
        if !instance.hasattr(method_name)? {
            return Err(pyo3::exceptions::PyTypeError::new_err(format!(
                "strategy class {class_name} does not implement {method_name}"
            )));
        }

        Ok(instance.unbind())
    })
}

/// Converts a `serde_json::Value` into the equivalent Python object inside
/// `py`, so a strategy's `config=` kwarg sees plain dicts/lists/scalars.
fn json_to_py(py: Python<'_>, value: &serde_json::Value) -> PyResult<PyObject> {
    use serde_json::Value;
    match value {
        Value::Null => Ok(py.None()),
        Value::Bool(b) => Ok(b.into_pyobject(py).unwrap().to_owned().into_any().unbind()),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(i.into_pyobject(py).unwrap().into_any().unbind())
            } else {
                let f = n.as_f64().unwrap_or(0.0);
                Ok(f.into_pyobject(py).unwrap().into_any().unbind())
            }
        }
        Value::String(s) => Ok(s.into_pyobject(py).unwrap().into_any().unbind()),
        Value::Array(items) => {
            let converted: Vec<PyObject> = items
                .iter()
                .map(|item| json_to_py(py, item))
                .collect::<PyResult<_>>()?;
            Ok(PyList::new(py, converted)?.into_any().unbind())
        }
        Value::Object(map) => {
            let dict = PyDict::new(py);
            for (k, v) in map {
                dict.set_item(k, json_to_py(py, v)?)?;
            }
            Ok(dict.into_any().unbind())
        }
    }
}

/// Convenience wrapper producing a `ProtocolMismatch` rather than a
/// generic sandbox failure when the probed method is absent — used by
/// callers that want the more specific `LoaderError` variant.
pub fn confirm_protocol(instance: &Bound<'_, PyAny>, protocol: ProtocolKind) -> Result<(), LoaderError> {
    let method_name = protocol.required_method();
    let has_method = instance
        .hasattr(method_name)
        .map_err(|e| LoaderError::SandboxFailure(e.to_string()))?;
    if has_method {
        Ok(())
    } else {
        Err(LoaderError::ProtocolMismatch(format!(
            "missing {method_name}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ValidationStatus;
    use sha2::{Digest, Sha256};
    use tempfile_free_audit_dir as audit_dir;

    mod tempfile_free_audit_dir {
        use std::path::PathBuf;

        pub fn unique(tag: &str) -> PathBuf {
            let mut dir = std::env::temp_dir();
            dir.push(format!("strategy-loader-loader-test-{tag}-{}", std::process::id()));
            dir
        }
    }

    fn hash_of(code: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(code.as_bytes());
        hex::encode(hasher.finalize())
    }

    fn record(code: &str, class_name: &str) -> CodeBackedStrategy {
        CodeBackedStrategy {
            id: "strat-1".to_string(),
            strategy_name: "demo".to_string(),
            class_name: class_name.to_string(),
            generated_code: code.as_bytes().to_vec(),
            code_hash: hash_of(code),
            validation_status: ValidationStatus::Passed,
            test_status: "passed".to_string(),
            is_enabled: true,
            version: 1,
            params: serde_json::Value::Null,
        }
    }

    #[test]
    fn rejects_forbidden_import_before_touching_sandbox_scenario_s5() {
        let code = "import os\nclass Strategy:\n    def select(self, date, market_data):\n        return []\n";
        let rec = record(code, "Strategy");
        let audit = Arc::new(AuditLogger::new(audit_dir::unique("s5")).unwrap());
        let loader = StrategyLoader::new(audit);
        let err = loader.load(&rec, ProtocolKind::StockSelector).unwrap_err();
        assert!(matches!(err, LoaderError::ForbiddenImport(_)));
    }

    #[test]
    fn disabled_record_never_reaches_sanitizer() {
        let code = "class Strategy:\n    def select(self, date, market_data):\n        return []\n";
        let mut rec = record(code, "Strategy");
        rec.is_enabled = false;
        let audit = Arc::new(AuditLogger::new(audit_dir::unique("disabled")).unwrap());
        let loader = StrategyLoader::new(audit);
        let err = loader.load(&rec, ProtocolKind::StockSelector).unwrap_err();
        assert!(matches!(err, LoaderError::RecordNotEligible(_)));
    }

    #[test]
    fn loads_a_valid_strategy_and_passes_params_into_the_constructor() {
        pyo3::prepare_freethreaded_python();
        let code = "class Strategy:\n    def __init__(self, name, config):\n        self.name = name\n        self.top_n = config['top_n']\n    def select(self, date, market_data):\n        return []\n";
        let mut rec = record(code, "Strategy");
        rec.params = serde_json::json!({"top_n": 10});
        let audit = Arc::new(AuditLogger::new(audit_dir::unique("valid-with-params")).unwrap());
        let loader = StrategyLoader::new(audit);
        let loaded = loader.load(&rec, ProtocolKind::StockSelector).unwrap();
        assert_eq!(loaded.record_id, "strat-1");
    }

    #[test]
    fn hash_mismatch_is_caught_before_ast_analysis() {
        let code = "class Strategy:\n    def select(self, date, market_data):\n        return []\n";
        let mut rec = record(code, "Strategy");
        rec.code_hash = "0000".to_string();
        let audit = Arc::new(AuditLogger::new(audit_dir::unique("hash-mismatch")).unwrap());
        let loader = StrategyLoader::new(audit);
        let err = loader.load(&rec, ProtocolKind::StockSelector).unwrap_err();
        assert!(matches!(err, LoaderError::HashMismatch { .. }));
    }
}
