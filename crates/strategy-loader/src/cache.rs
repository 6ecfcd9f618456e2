//! Strategy cache keyed by record id, backed by `dashmap::DashMap` for
//! per-key locking so a cache lookup never holds a guard across a
//! strategy's own Python execution (§5 concurrency note).

use std::sync::Arc;

use dashmap::DashMap;

/// A loaded, sandbox-verified strategy handle. Cheaply cloneable — the
/// pyo3 object itself is reference-counted by the interpreter.
#[derive(Clone)]
pub struct LoadedStrategy {
    pub record_id: String,
    pub code_hash: String,
    pub class_name: String,
    pub py_object: Arc<pyo3::Py<pyo3::PyAny>>,
}

#[derive(Default)]
pub struct StrategyCache {
    entries: DashMap<String, LoadedStrategy>,
}

impl StrategyCache {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Returns the cached strategy only if its hash still matches —
    /// a changed `code_hash` for the same record id is treated as a
    /// miss rather than served stale, so re-validated code always goes
    /// back through the four-stage pipeline.
    pub fn get(&self, record_id: &str, code_hash: &str) -> Option<LoadedStrategy> {
        self.entries.get(record_id).and_then(|entry| {
            if entry.code_hash == code_hash {
                Some(entry.clone())
            } else {
                None
            }
        })
    }

    pub fn insert(&self, strategy: LoadedStrategy) {
        self.entries.insert(strategy.record_id.clone(), strategy);
    }

    pub fn invalidate(&self, record_id: &str) {
        self.entries.remove(record_id);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
