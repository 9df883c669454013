//! Embedded SQLite store — connection handling, migrations, maintenance.
//!
//! Every read and write is a short transaction on a fresh connection opened
//! with WAL journaling and a 5-second busy timeout, so concurrent scheduled
//! jobs serialise at the store instead of sharing in-memory state. Typed row
//! access for each table lives in the submodules (`scores`, `model`, `slots`,
//! `state`, `alerts`); this module owns open/migrate and nightly maintenance.

mod alerts;
mod model;
mod scores;
mod slots;
mod state;

pub use alerts::{AlertStatus, PendingAlert};
pub use scores::DailyScore;
pub use state::keys;

use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

use crate::types::{DATE_FORMAT, TS_FORMAT};

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

// ============================================================================
// Migrations
// ============================================================================

/// Migration scripts, applied transactionally in strictly increasing version
/// order. Column names and order are load-bearing: existing deployments read
/// these tables directly.
const MIGRATIONS: &[(i64, &str)] = &[
    (
        1,
        "
        -- Schema version 1: core tables

        CREATE TABLE IF NOT EXISTS sensor_events (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            timestamp   TEXT NOT NULL,
            sensor_id   TEXT NOT NULL,
            channel     TEXT NOT NULL,
            event_type  TEXT NOT NULL DEFAULT 'state_change',
            value       TEXT,
            created_at  TEXT DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_events_ts ON sensor_events(timestamp);
        CREATE INDEX IF NOT EXISTS idx_events_channel ON sensor_events(channel, timestamp);

        CREATE TABLE IF NOT EXISTS slot_summary (
            date        TEXT NOT NULL,
            slot        INTEGER NOT NULL,
            channel     TEXT NOT NULL,
            active      INTEGER NOT NULL DEFAULT 0,
            event_count INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (date, slot, channel)
        );

        CREATE TABLE IF NOT EXISTS daily_scores (
            date              TEXT PRIMARY KEY,
            train_days        INTEGER,
            nll_presence      REAL,
            nll_fridge        REAL,
            nll_bathroom      REAL,
            nll_door          REAL,
            nll_total         REAL,
            expected_count    REAL,
            observed_count    INTEGER,
            count_z           REAL,
            composite_z       REAL,
            alert_level       INTEGER DEFAULT 0,
            aw_accuracy       REAL,
            aw_balanced_acc   REAL,
            aw_active_recall  REAL,
            is_learning       INTEGER DEFAULT 1,
            created_at        TEXT DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS model_state (
            slot        INTEGER NOT NULL,
            channel     TEXT NOT NULL,
            alpha       REAL NOT NULL DEFAULT 1,
            beta        REAL NOT NULL DEFAULT 1,
            last_updated TEXT,
            PRIMARY KEY (slot, channel)
        );
        ",
    ),
    (
        2,
        "
        -- Schema version 2: system state and acknowledgement tracking

        CREATE TABLE IF NOT EXISTS system_state (
            key         TEXT PRIMARY KEY,
            value       TEXT NOT NULL,
            updated_at  TEXT DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS pending_alerts (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            alert_level INTEGER NOT NULL,
            message     TEXT NOT NULL,
            timestamp   TEXT NOT NULL,
            status      TEXT NOT NULL DEFAULT 'pending'
        );
        ",
    ),
];

// ============================================================================
// Store
// ============================================================================

/// Handle to the on-disk store. Cheap to clone; each operation opens its own
/// short-lived connection.
#[derive(Debug, Clone)]
pub struct Store {
    path: PathBuf,
}

impl Store {
    /// Open (creating parent directories if needed) and migrate the store.
    /// Idempotent: already-applied migrations are skipped.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir)?;
            }
        }

        let store = Self { path };
        store.migrate()?;
        Ok(store)
    }

    /// Path the store was opened at.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open a connection with the standard pragmas.
    pub(crate) fn conn(&self) -> Result<Connection, StoreError> {
        let conn = Connection::open(&self.path)?;
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA foreign_keys=ON;
             PRAGMA busy_timeout=5000;",
        )?;
        Ok(conn)
    }

    fn migrate(&self) -> Result<(), StoreError> {
        let conn = self.conn()?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS schema_version (
                version     INTEGER PRIMARY KEY,
                applied_at  TEXT DEFAULT (datetime('now'))
            )",
            [],
        )?;

        let current: i64 = conn.query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |row| row.get(0),
        )?;

        for &(version, sql) in MIGRATIONS {
            if version <= current {
                continue;
            }
            let tx = conn.unchecked_transaction()?;
            tx.execute_batch(sql)?;
            tx.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])?;
            tx.commit()?;
            info!(version, "applied schema migration");
        }

        let final_version: i64 = conn.query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |row| row.get(0),
        )?;
        info!(schema_version = final_version, path = %self.path.display(), "store ready");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Nightly maintenance
    // ------------------------------------------------------------------

    /// Delete sensor events older than `retention_days` (midnight cutoff).
    pub fn cleanup_old_events(
        &self,
        retention_days: i64,
        now: NaiveDateTime,
    ) -> Result<usize, StoreError> {
        let cutoff_day = now.date() - chrono::Duration::days(retention_days);
        let cutoff = format!("{}T00:00:00", cutoff_day.format(DATE_FORMAT));
        let conn = self.conn()?;
        let deleted = conn.execute("DELETE FROM sensor_events WHERE timestamp < ?1", [&cutoff])?;
        if deleted > 0 {
            info!(deleted, retention_days, "purged old sensor events");
        }
        Ok(deleted)
    }

    /// WAL checkpoint, preferred over VACUUM on small boards for its lower
    /// I/O footprint.
    pub fn run_maintenance(&self) -> Result<(), StoreError> {
        let conn = self.conn()?;
        conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
        info!("store maintenance complete: WAL checkpoint (TRUNCATE)");
        Ok(())
    }
}

// ============================================================================
// Timestamp helpers
// ============================================================================

pub(crate) fn fmt_ts(ts: NaiveDateTime) -> String {
    ts.format(TS_FORMAT).to_string()
}

pub(crate) fn parse_ts(raw: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw, TS_FORMAT).ok()
}

pub(crate) fn fmt_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

pub(crate) fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw, DATE_FORMAT).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> (tempfile::TempDir, Store) {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = Store::open(dir.path().join("test.db")).expect("open store");
        (dir, store)
    }

    #[test]
    fn migrations_are_idempotent() {
        let (dir, store) = temp_store();
        // Re-opening must not re-apply or fail.
        let again = Store::open(dir.path().join("test.db")).expect("reopen");
        let conn = again.conn().expect("conn");
        let version: i64 = conn
            .query_row("SELECT MAX(version) FROM schema_version", [], |r| r.get(0))
            .expect("version");
        assert_eq!(version, 2);
        drop(store);
    }

    #[test]
    fn all_tables_exist_after_migration() {
        let (_dir, store) = temp_store();
        let conn = store.conn().expect("conn");
        for table in [
            "sensor_events",
            "slot_summary",
            "daily_scores",
            "model_state",
            "system_state",
            "pending_alerts",
            "schema_version",
        ] {
            let found: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
                    [table],
                    |r| r.get(0),
                )
                .expect("query");
            assert_eq!(found, 1, "missing table {table}");
        }
    }

    #[test]
    fn timestamp_helpers_roundtrip() {
        let ts = chrono::NaiveDate::from_ymd_opt(2025, 3, 1)
            .and_then(|d| d.and_hms_opt(14, 30, 5))
            .expect("valid");
        assert_eq!(fmt_ts(ts), "2025-03-01T14:30:05");
        assert_eq!(parse_ts(&fmt_ts(ts)), Some(ts));
        assert_eq!(parse_ts("garbage"), None);
    }
}
