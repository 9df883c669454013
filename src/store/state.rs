//! Key/value system state — vacation mode, fall tracking, messenger cursor.
//!
//! Every cross-restart flag lives here rather than in process memory, so a
//! crash or redeploy never desynchronises the alerting state.

use super::{Store, StoreError};
use rusqlite::OptionalExtension;

/// Well-known keys. Free-form keys are allowed but discouraged.
pub mod keys {
    pub const VACATION_MODE: &str = "vacation_mode";
    pub const ALERT_RATE_STATE: &str = "alert_rate_state";
    pub const LAST_BATHROOM_TIME: &str = "last_bathroom_time";
    pub const TELEGRAM_LAST_OFFSET: &str = "telegram_last_offset";
    pub const MORNING_ALERT_COUNT: &str = "morning_alert_count";
}

impl Store {
    /// Read a state value. `None` when the key has never been written.
    pub fn state(&self, key: &str) -> Result<Option<String>, StoreError> {
        let conn = self.conn()?;
        let value = conn
            .query_row(
                "SELECT value FROM system_state WHERE key = ?1",
                [key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    /// Write a state value (upsert).
    pub fn set_state(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO system_state (key, value, updated_at)
             VALUES (?1, ?2, datetime('now'))",
            [key, value],
        )?;
        Ok(())
    }

    /// Is vacation mode on? The persisted flag wins; the config seed only
    /// applies until the flag is first written.
    pub fn vacation_mode(&self, config_seed: bool) -> Result<bool, StoreError> {
        match self.state(keys::VACATION_MODE)? {
            Some(raw) if !raw.is_empty() => {
                let lowered = raw.to_lowercase();
                Ok(lowered == "true" || lowered == "1" || lowered == "yes")
            }
            _ => Ok(config_seed),
        }
    }

    /// Persist the vacation flag.
    pub fn set_vacation_mode(&self, on: bool) -> Result<(), StoreError> {
        self.set_state(keys::VACATION_MODE, if on { "true" } else { "false" })
    }
}
