use std::fs::{create_dir_all, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OpenFlags};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::config::ObservabilitySection;

use super::error::FailureClass;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum Remediation {
    RetryScheduled { delay_ms: u64 },
    Abort,
}

#[derive(Debug, Clone, Serialize)]
pub struct FailureContext {
    pub timestamp: DateTime<Utc>,
    pub run_id: Uuid,
    pub resource: String,
    pub pattern: String,
    pub class: FailureClass,
    pub error_message: String,
    pub attempt: usize,
    pub remediation: Remediation,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunContext {
    pub timestamp: DateTime<Utc>,
    pub run_id: Uuid,
    pub resource: String,
    pub target: String,
    pub requested: usize,
    pub collected: usize,
    pub cycles: u64,
    pub outcome: String,
    pub duration_ms: i64,
}

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Append-only failure log plus a sqlite table of runs and failures.
#[derive(Debug)]
pub struct CollectTelemetry {
    log: Mutex<File>,
    db_path: PathBuf,
    flags: OpenFlags,
}

impl CollectTelemetry {
    pub fn new(
        log_path: impl AsRef<Path>,
        db_path: impl AsRef<Path>,
    ) -> Result<Self, TelemetryError> {
        let log_path = log_path.as_ref().to_path_buf();
        if let Some(parent) = log_path.parent() {
            create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)?;
        let db_path = db_path.as_ref().to_path_buf();
        if let Some(parent) = db_path.parent() {
            create_dir_all(parent)?;
        }
        let telemetry = Self {
            log: Mutex::new(file),
            db_path,
            flags: OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE,
        };
        telemetry.initialize_db()?;
        Ok(telemetry)
    }

    /// Builds telemetry when both sinks are configured; paths resolve against `base_dir`.
    pub fn from_config(
        section: &ObservabilitySection,
        base_dir: &Path,
    ) -> Result<Option<Self>, TelemetryError> {
        match (&section.failure_log, &section.metrics_db) {
            (Some(log), Some(db)) => Ok(Some(Self::new(base_dir.join(log), base_dir.join(db))?)),
            _ => Ok(None),
        }
    }

    fn initialize_db(&self) -> Result<(), TelemetryError> {
        let conn = self.open_db()?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS collect_failures (
                ts DATETIME DEFAULT CURRENT_TIMESTAMP,
                run_id TEXT,
                resource TEXT,
                pattern TEXT,
                class TEXT,
                error_message TEXT,
                attempt INTEGER,
                remediation TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_collect_failures_ts ON collect_failures(ts DESC);
            CREATE TABLE IF NOT EXISTS collect_runs (
                ts DATETIME DEFAULT CURRENT_TIMESTAMP,
                run_id TEXT,
                resource TEXT,
                target TEXT,
                requested INTEGER,
                collected INTEGER,
                cycles INTEGER,
                outcome TEXT,
                duration_ms INTEGER
            );
            CREATE INDEX IF NOT EXISTS idx_collect_runs_ts ON collect_runs(ts DESC);",
        )?;
        Ok(())
    }

    fn open_db(&self) -> Result<Connection, TelemetryError> {
        Ok(Connection::open_with_flags(&self.db_path, self.flags)?)
    }

    pub fn record_failure(&self, failure: &FailureContext) -> Result<(), TelemetryError> {
        let json = serde_json::to_string(failure)?;
        if let Ok(mut guard) = self.log.lock() {
            writeln!(guard, "{json}")?;
            guard.flush()?;
        }
        let conn = self.open_db()?;
        conn.execute(
            "INSERT INTO collect_failures (run_id, resource, pattern, class, error_message, attempt, remediation)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                failure.run_id.to_string(),
                failure.resource,
                failure.pattern,
                failure.class.to_string(),
                failure.error_message,
                failure.attempt as i64,
                serde_json::to_string(&failure.remediation)?,
            ],
        )?;
        Ok(())
    }

    pub fn record_run(&self, run: &RunContext) -> Result<(), TelemetryError> {
        let conn = self.open_db()?;
        conn.execute(
            "INSERT INTO collect_runs (
                run_id, resource, target, requested, collected, cycles, outcome, duration_ms
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                run.run_id.to_string(),
                run.resource,
                run.target,
                run.requested as i64,
                run.collected as i64,
                run.cycles as i64,
                run.outcome,
                run.duration_ms,
            ],
        )?;
        Ok(())
    }

    pub fn database_path(&self) -> &Path {
        &self.db_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn telemetry_persists_entries() {
        let dir = tempdir().unwrap();
        let log_path = dir.path().join("logs/failures.jsonl");
        let db_path = dir.path().join("data/metrics.sqlite");
        let telemetry = CollectTelemetry::new(&log_path, &db_path).unwrap();
        let run_id = Uuid::new_v4();

        telemetry
            .record_failure(&FailureContext {
                timestamp: Utc::now(),
                run_id,
                resource: "likers".into(),
                pattern: "GET /api/v1/media/*/likers/".into(),
                class: FailureClass::Transient,
                error_message: "no captured response matched".into(),
                attempt: 1,
                remediation: Remediation::RetryScheduled { delay_ms: 1_000 },
            })
            .unwrap();
        telemetry
            .record_run(&RunContext {
                timestamp: Utc::now(),
                run_id,
                resource: "likers".into(),
                target: "3179223655971394742".into(),
                requested: 0,
                collected: 12,
                cycles: 1,
                outcome: "cursor_exhausted".into(),
                duration_ms: 5_400,
            })
            .unwrap();

        let log_contents = std::fs::read_to_string(&log_path).unwrap();
        assert!(log_contents.contains("retry_scheduled"));

        let conn = Connection::open(&db_path).unwrap();
        let failures: i64 = conn
            .query_row("SELECT COUNT(*) FROM collect_failures", [], |row| row.get(0))
            .unwrap();
        assert_eq!(failures, 1);
        let collected: i64 = conn
            .query_row("SELECT collected FROM collect_runs", [], |row| row.get(0))
            .unwrap();
        assert_eq!(collected, 12);
    }

    #[test]
    fn from_config_requires_both_sinks() {
        let dir = tempdir().unwrap();
        let partial = ObservabilitySection {
            failure_log: Some("failures.jsonl".into()),
            metrics_db: None,
        };
        assert!(CollectTelemetry::from_config(&partial, dir.path())
            .unwrap()
            .is_none());
        let full = ObservabilitySection {
            failure_log: Some("failures.jsonl".into()),
            metrics_db: Some("metrics.sqlite".into()),
        };
        let telemetry = CollectTelemetry::from_config(&full, dir.path())
            .unwrap()
            .unwrap();
        assert!(telemetry.database_path().starts_with(dir.path()));
    }
}
