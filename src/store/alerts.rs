//! `pending_alerts` access — the dead-man's-switch ledger.
//!
//! Every level-3 notification gets a row here before it is sent. The row
//! leaves `pending` exactly once: either the caregiver acknowledges it, or
//! the escalation job pages the emergency contacts and marks it `escalated`.

use chrono::NaiveDateTime;
use rusqlite::{params, OptionalExtension, Row};

use super::{fmt_ts, parse_ts, Store, StoreError};

/// Lifecycle state of a pending alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertStatus {
    Pending,
    Acknowledged,
    Escalated,
}

impl AlertStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            AlertStatus::Pending => "pending",
            AlertStatus::Acknowledged => "acknowledged",
            AlertStatus::Escalated => "escalated",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pending" => Some(AlertStatus::Pending),
            "acknowledged" => Some(AlertStatus::Acknowledged),
            "escalated" => Some(AlertStatus::Escalated),
            _ => None,
        }
    }
}

/// One `pending_alerts` row.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingAlert {
    pub id: i64,
    pub alert_level: i64,
    pub message: String,
    pub timestamp: Option<NaiveDateTime>,
    pub status: AlertStatus,
}

fn alert_from_row(row: &Row<'_>) -> rusqlite::Result<PendingAlert> {
    let ts_raw: String = row.get("timestamp")?;
    let status_raw: String = row.get("status")?;
    Ok(PendingAlert {
        id: row.get("id")?,
        alert_level: row.get("alert_level")?,
        message: row.get("message")?,
        timestamp: parse_ts(&ts_raw),
        status: AlertStatus::parse(&status_raw).unwrap_or(AlertStatus::Pending),
    })
}

impl Store {
    /// Record a new pending alert; returns its id for the ack payload.
    pub fn insert_pending_alert(
        &self,
        alert_level: i64,
        message: &str,
        timestamp: NaiveDateTime,
    ) -> Result<i64, StoreError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO pending_alerts (alert_level, message, timestamp, status)
             VALUES (?1, ?2, ?3, 'pending')",
            params![alert_level, message, fmt_ts(timestamp)],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Fetch one alert by id.
    pub fn pending_alert(&self, id: i64) -> Result<Option<PendingAlert>, StoreError> {
        let conn = self.conn()?;
        let alert = conn
            .query_row(
                "SELECT id, alert_level, message, timestamp, status
                 FROM pending_alerts WHERE id = ?1",
                [id],
                alert_from_row,
            )
            .optional()?;
        Ok(alert)
    }

    /// Acknowledge an alert. Only a `pending` row can be acknowledged, so an
    /// ack arriving after escalation changes nothing. Returns whether a row
    /// flipped.
    pub fn acknowledge_alert(&self, id: i64) -> Result<bool, StoreError> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE pending_alerts SET status = 'acknowledged'
             WHERE id = ?1 AND status = 'pending'",
            [id],
        )?;
        Ok(changed > 0)
    }

    /// Alerts still pending at or before the cutoff — the escalation set.
    pub fn expired_pending_alerts(
        &self,
        cutoff: NaiveDateTime,
    ) -> Result<Vec<PendingAlert>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, alert_level, message, timestamp, status
             FROM pending_alerts
             WHERE status = 'pending' AND timestamp <= ?1
             ORDER BY id",
        )?;
        let rows = stmt.query_map([fmt_ts(cutoff)], alert_from_row)?;
        let mut alerts = Vec::new();
        for row in rows {
            alerts.push(row?);
        }
        Ok(alerts)
    }

    /// Mark an alert escalated. Guarded on `pending` so a racing ack wins.
    pub fn mark_alert_escalated(&self, id: i64) -> Result<bool, StoreError> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE pending_alerts SET status = 'escalated'
             WHERE id = ?1 AND status = 'pending'",
            [id],
        )?;
        Ok(changed > 0)
    }

    /// Drop alert rows older than the cutoff regardless of status.
    pub fn cleanup_old_pending_alerts(
        &self,
        cutoff: NaiveDateTime,
    ) -> Result<usize, StoreError> {
        let conn = self.conn()?;
        let deleted = conn.execute(
            "DELETE FROM pending_alerts WHERE timestamp < ?1",
            [fmt_ts(cutoff)],
        )?;
        Ok(deleted)
    }
}
