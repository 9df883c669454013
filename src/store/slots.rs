//! `sensor_events` and `slot_summary` access.
//!
//! Events are written by the ingestion side and read by the real-time checks,
//! the daily summary and the trend regression. Slot rows are the aggregator's
//! 15-minute rollup and the learner's only input.

use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::{params, OptionalExtension};
use std::collections::HashMap;

use super::{fmt_date, fmt_ts, parse_ts, Store, StoreError};
use crate::types::{Channel, SensorEvent, SlotGrid, SLOTS_PER_DAY};

impl Store {
    // ------------------------------------------------------------------
    // sensor_events
    // ------------------------------------------------------------------

    /// Append an accepted sensor event.
    pub fn insert_event(&self, event: &SensorEvent) -> Result<(), StoreError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO sensor_events (timestamp, sensor_id, channel, event_type, value)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                fmt_ts(event.timestamp),
                event.sensor_id,
                event.channel.as_str(),
                event.event_type,
                event.value,
            ],
        )?;
        Ok(())
    }

    /// Number of events in `[from, to)`.
    pub fn count_events_between(
        &self,
        from: NaiveDateTime,
        to: NaiveDateTime,
    ) -> Result<i64, StoreError> {
        let conn = self.conn()?;
        let count = conn.query_row(
            "SELECT COUNT(*) FROM sensor_events WHERE timestamp >= ?1 AND timestamp < ?2",
            [fmt_ts(from), fmt_ts(to)],
            |r| r.get(0),
        )?;
        Ok(count)
    }

    /// Latest event timestamp at or after `from`, if any.
    pub fn last_event_since(
        &self,
        from: NaiveDateTime,
    ) -> Result<Option<NaiveDateTime>, StoreError> {
        let conn = self.conn()?;
        let raw: Option<String> = conn
            .query_row(
                "SELECT MAX(timestamp) FROM sensor_events WHERE timestamp >= ?1",
                [fmt_ts(from)],
                |r| r.get(0),
            )
            .optional()?
            .flatten();
        Ok(raw.as_deref().and_then(parse_ts))
    }

    /// Per-channel event counts in `[from, to)`. Unknown channel strings are
    /// skipped.
    pub fn channel_counts_between(
        &self,
        from: NaiveDateTime,
        to: NaiveDateTime,
    ) -> Result<HashMap<Channel, i64>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT channel, COUNT(*) FROM sensor_events
             WHERE timestamp >= ?1 AND timestamp < ?2
             GROUP BY channel",
        )?;
        let rows = stmt.query_map([fmt_ts(from), fmt_ts(to)], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;

        let mut counts = HashMap::new();
        for row in rows {
            let (raw, count) = row?;
            if let Some(channel) = Channel::parse(&raw) {
                counts.insert(channel, count);
            }
        }
        Ok(counts)
    }

    /// Daily event counts for one channel since `from` (inclusive), keyed by
    /// date string. Days without events are absent; callers zero-fill.
    pub fn daily_event_counts(
        &self,
        channel: Channel,
        from: NaiveDate,
    ) -> Result<HashMap<String, i64>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT substr(timestamp, 1, 10) AS day, COUNT(*) FROM sensor_events
             WHERE channel = ?1 AND timestamp >= ?2
             GROUP BY day",
        )?;
        let from_ts = format!("{}T00:00:00", fmt_date(from));
        let rows = stmt.query_map(params![channel.as_str(), from_ts], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;

        let mut counts = HashMap::new();
        for row in rows {
            let (day, count) = row?;
            counts.insert(day, count);
        }
        Ok(counts)
    }

    // ------------------------------------------------------------------
    // slot_summary
    // ------------------------------------------------------------------

    /// Upsert one slot cell with its activity for the closed window.
    pub fn upsert_slot(
        &self,
        date: NaiveDate,
        slot: usize,
        channel: Channel,
        event_count: i64,
    ) -> Result<(), StoreError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO slot_summary (date, slot, channel, active, event_count)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT (date, slot, channel) DO UPDATE SET
             active = excluded.active, event_count = excluded.event_count",
            params![
                fmt_date(date),
                slot as i64,
                channel.as_str(),
                i64::from(event_count > 0),
                event_count,
            ],
        )?;
        Ok(())
    }

    /// Zero-fill every missing (slot, channel) cell of a day. Existing rows
    /// are kept (`INSERT OR IGNORE`), so a late fill never destroys data.
    pub fn fill_missing_slots(&self, date: NaiveDate) -> Result<usize, StoreError> {
        let conn = self.conn()?;
        let tx = conn.unchecked_transaction()?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO slot_summary (date, slot, channel, active, event_count)
                 VALUES (?1, ?2, ?3, 0, 0)",
            )?;
            let date_str = fmt_date(date);
            for slot in 0..SLOTS_PER_DAY {
                for ch in Channel::ALL {
                    inserted += stmt.execute(params![date_str, slot as i64, ch.as_str()])?;
                }
            }
        }
        tx.commit()?;
        Ok(inserted)
    }

    /// The day's occupancy grid. `None` when the day has no rows at all
    /// (nothing to learn from); missing cells read as inactive.
    pub fn slot_grid(&self, date: NaiveDate) -> Result<Option<SlotGrid>, StoreError> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare("SELECT slot, channel, active FROM slot_summary WHERE date = ?1")?;
        let rows = stmt.query_map([fmt_date(date)], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
            ))
        })?;

        let mut grid = SlotGrid::empty();
        let mut any = false;
        for row in rows {
            let (slot, channel_raw, active) = row?;
            any = true;
            let Some(channel) = Channel::parse(&channel_raw) else {
                continue;
            };
            if let Ok(slot) = usize::try_from(slot) {
                if active == 1 {
                    grid.set(channel, slot, true);
                }
            }
        }
        Ok(any.then_some(grid))
    }
}
