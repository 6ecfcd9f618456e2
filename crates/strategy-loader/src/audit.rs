//! Append-only JSONL audit trail, one file per UTC day, grounded on
//! `audit_logger.py`'s event shapes and query surface.

use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::LoaderError;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum AuditEvent {
    StrategyLoad {
        timestamp: DateTime<Utc>,
        strategy_id: String,
        success: bool,
        detail: Option<String>,
    },
    StrategyExecution {
        timestamp: DateTime<Utc>,
        strategy_id: String,
        duration_ms: u64,
        success: bool,
    },
    SecurityViolation {
        timestamp: DateTime<Utc>,
        strategy_id: String,
        /// Always "high" (§7) — the variant itself carries no other level.
        severity: String,
        violation_type: String,
        detail: String,
    },
    CacheEvent {
        timestamp: DateTime<Utc>,
        strategy_id: String,
        hit: bool,
    },
    ResourceUsage {
        timestamp: DateTime<Utc>,
        strategy_id: String,
        cpu_seconds: f64,
        peak_memory_bytes: u64,
    },
}

impl AuditEvent {
    fn timestamp(&self) -> DateTime<Utc> {
        match self {
            AuditEvent::StrategyLoad { timestamp, .. }
            | AuditEvent::StrategyExecution { timestamp, .. }
            | AuditEvent::SecurityViolation { timestamp, .. }
            | AuditEvent::CacheEvent { timestamp, .. }
            | AuditEvent::ResourceUsage { timestamp, .. } => *timestamp,
        }
    }

    pub fn security_violation(strategy_id: impl Into<String>, err: &LoaderError) -> Self {
        AuditEvent::SecurityViolation {
            timestamp: Utc::now(),
            strategy_id: strategy_id.into(),
            severity: "high".to_string(),
            violation_type: err.code().to_string(),
            detail: err.to_string(),
        }
    }
}

pub struct AuditLogger {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

#[derive(Debug, Default, Serialize)]
pub struct AuditStatistics {
    pub total_events: usize,
    pub security_violations: usize,
    pub failed_loads: usize,
    pub successful_loads: usize,
}

impl AuditLogger {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, LoaderError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .map_err(|e| LoaderError::SandboxFailure(format!("cannot create audit dir: {e}")))?;
        Ok(Self {
            dir,
            write_lock: Mutex::new(()),
        })
    }

    fn path_for(&self, date: NaiveDate) -> PathBuf {
        self.dir.join(format!("audit-{}.jsonl", date.format("%Y-%m-%d")))
    }

    pub fn log(&self, event: &AuditEvent) -> Result<(), LoaderError> {
        let path = self.path_for(event.timestamp().date_naive());
        let line = serde_json::to_string(event)
            .map_err(|e| LoaderError::SandboxFailure(format!("audit serialize failed: {e}")))?;

        let _guard = self.write_lock.lock().unwrap();
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| LoaderError::SandboxFailure(format!("audit file open failed: {e}")))?;
        writeln!(file, "{line}")
            .map_err(|e| LoaderError::SandboxFailure(format!("audit write failed: {e}")))?;
        Ok(())
    }

    /// Reads every event across every day-file in the audit directory,
    /// oldest file first, preserving intra-file append order.
    pub fn query_events(&self) -> Result<Vec<AuditEvent>, LoaderError> {
        let mut files: Vec<PathBuf> = fs::read_dir(&self.dir)
            .map_err(|e| LoaderError::SandboxFailure(format!("audit dir read failed: {e}")))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().map(|ext| ext == "jsonl").unwrap_or(false))
            .collect();
        files.sort();

        let mut events = Vec::new();
        for path in files {
            events.extend(read_events(&path)?);
        }
        Ok(events)
    }

    pub fn get_statistics(&self) -> Result<AuditStatistics, LoaderError> {
        let events = self.query_events()?;
        let mut stats = AuditStatistics::default();
        for event in &events {
            stats.total_events += 1;
            match event {
                AuditEvent::SecurityViolation { .. } => stats.security_violations += 1,
                AuditEvent::StrategyLoad { success, .. } => {
                    if *success {
                        stats.successful_loads += 1;
                    } else {
                        stats.failed_loads += 1;
                    }
                }
                _ => {}
            }
        }
        Ok(stats)
    }
}

fn read_events(path: &Path) -> Result<Vec<AuditEvent>, LoaderError> {
    let file = fs::File::open(path)
        .map_err(|e| LoaderError::SandboxFailure(format!("audit file read failed: {e}")))?;
    let reader = BufReader::new(file);
    let mut events = Vec::new();
    for line in reader.lines() {
        let line = line.map_err(|e| LoaderError::SandboxFailure(format!("audit line read failed: {e}")))?;
        if line.trim().is_empty() {
            continue;
        }
        let value: Value = serde_json::from_str(&line)
            .map_err(|e| LoaderError::SandboxFailure(format!("audit line parse failed: {e}")))?;
        let event: AuditEvent = serde_json::from_value(value)
            .map_err(|e| LoaderError::SandboxFailure(format!("audit event parse failed: {e}")))?;
        events.push(event);
    }
    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir(tag: &str) -> PathBuf {
        let mut dir = std::env::temp_dir();
        dir.push(format!("strategy-loader-audit-test-{tag}-{}", std::process::id()));
        dir
    }

    #[test]
    fn logs_and_queries_a_security_violation() {
        let dir = temp_dir("sec-violation");
        let logger = AuditLogger::new(&dir).unwrap();
        let err = LoaderError::ForbiddenImport("os".to_string());
        logger.log(&AuditEvent::security_violation("s1", &err)).unwrap();

        let events = logger.query_events().unwrap();
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], AuditEvent::SecurityViolation { .. }));

        let stats = logger.get_statistics().unwrap();
        assert_eq!(stats.security_violations, 1);
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn tracks_load_success_and_failure_counts() {
        let dir = temp_dir("load-counts");
        let logger = AuditLogger::new(&dir).unwrap();
        logger
            .log(&AuditEvent::StrategyLoad {
                timestamp: Utc::now(),
                strategy_id: "s1".to_string(),
                success: true,
                detail: None,
            })
            .unwrap();
        logger
            .log(&AuditEvent::StrategyLoad {
                timestamp: Utc::now(),
                strategy_id: "s2".to_string(),
                success: false,
                detail: Some("bad hash".to_string()),
            })
            .unwrap();

        let stats = logger.get_statistics().unwrap();
        assert_eq!(stats.successful_loads, 1);
        assert_eq!(stats.failed_loads, 1);
        let _ = fs::remove_dir_all(&dir);
    }
}
