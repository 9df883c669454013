//! `daily_scores` access — one row per processed day.
//!
//! The learner inserts the row with `composite_z = 0, alert_level = 0`; the
//! scorer overwrites those two fields in place. Baseline queries only ever
//! consider normal, post-learning days.

use chrono::NaiveDate;
use rusqlite::{params, OptionalExtension, Row};

use super::{fmt_date, parse_date, Store, StoreError};
use crate::types::Channel;

/// One `daily_scores` row.
#[derive(Debug, Clone, PartialEq)]
pub struct DailyScore {
    pub date: NaiveDate,
    /// Ordinal of this training day (1-based)
    pub train_days: i64,
    /// Per-channel surprise, indexed by [`Channel::index`]
    pub nll_per_channel: [f64; Channel::COUNT],
    pub nll_total: f64,
    pub expected_count: f64,
    pub observed_count: i64,
    pub count_z: f64,
    pub composite_z: f64,
    pub alert_level: i64,
    pub aw_accuracy: f64,
    pub aw_balanced_acc: f64,
    pub aw_active_recall: f64,
    pub is_learning: bool,
}

impl DailyScore {
    pub fn nll(&self, channel: Channel) -> f64 {
        self.nll_per_channel[channel.index()]
    }
}

fn score_from_row(row: &Row<'_>) -> rusqlite::Result<DailyScore> {
    let date_raw: String = row.get("date")?;
    Ok(DailyScore {
        date: parse_date(&date_raw).unwrap_or_default(),
        train_days: row.get::<_, Option<i64>>("train_days")?.unwrap_or(0),
        nll_per_channel: [
            row.get::<_, Option<f64>>("nll_presence")?.unwrap_or(0.0),
            row.get::<_, Option<f64>>("nll_fridge")?.unwrap_or(0.0),
            row.get::<_, Option<f64>>("nll_bathroom")?.unwrap_or(0.0),
            row.get::<_, Option<f64>>("nll_door")?.unwrap_or(0.0),
        ],
        nll_total: row.get::<_, Option<f64>>("nll_total")?.unwrap_or(0.0),
        expected_count: row.get::<_, Option<f64>>("expected_count")?.unwrap_or(0.0),
        observed_count: row.get::<_, Option<i64>>("observed_count")?.unwrap_or(0),
        count_z: row.get::<_, Option<f64>>("count_z")?.unwrap_or(0.0),
        composite_z: row.get::<_, Option<f64>>("composite_z")?.unwrap_or(0.0),
        alert_level: row.get::<_, Option<i64>>("alert_level")?.unwrap_or(0),
        aw_accuracy: row.get::<_, Option<f64>>("aw_accuracy")?.unwrap_or(0.0),
        aw_balanced_acc: row.get::<_, Option<f64>>("aw_balanced_acc")?.unwrap_or(0.0),
        aw_active_recall: row.get::<_, Option<f64>>("aw_active_recall")?.unwrap_or(0.0),
        is_learning: row.get::<_, Option<i64>>("is_learning")?.unwrap_or(1) == 1,
    })
}

/// Connection-level insert, shared with the learner's single-transaction
/// commit path.
pub(crate) fn insert_score_on(
    conn: &rusqlite::Connection,
    score: &DailyScore,
) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO daily_scores (
            date, train_days,
            nll_presence, nll_fridge, nll_bathroom, nll_door, nll_total,
            expected_count, observed_count, count_z,
            composite_z, alert_level,
            aw_accuracy, aw_balanced_acc, aw_active_recall,
            is_learning
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
        params![
            fmt_date(score.date),
            score.train_days,
            score.nll_per_channel[Channel::Presence.index()],
            score.nll_per_channel[Channel::Fridge.index()],
            score.nll_per_channel[Channel::Bathroom.index()],
            score.nll_per_channel[Channel::Door.index()],
            score.nll_total,
            score.expected_count,
            score.observed_count,
            score.count_z,
            score.composite_z,
            score.alert_level,
            score.aw_accuracy,
            score.aw_balanced_acc,
            score.aw_active_recall,
            i64::from(score.is_learning),
        ],
    )?;
    Ok(())
}

impl Store {
    /// Insert or replace a day's score row.
    pub fn insert_score(&self, score: &DailyScore) -> Result<(), StoreError> {
        let conn = self.conn()?;
        insert_score_on(&conn, score)?;
        Ok(())
    }

    /// The row for one date, if processed.
    pub fn score_for(&self, date: NaiveDate) -> Result<Option<DailyScore>, StoreError> {
        let conn = self.conn()?;
        let score = conn
            .query_row(
                "SELECT * FROM daily_scores WHERE date = ?1",
                [fmt_date(date)],
                score_from_row,
            )
            .optional()?;
        Ok(score)
    }

    /// Most recently processed day.
    pub fn latest_score(&self) -> Result<Option<DailyScore>, StoreError> {
        let conn = self.conn()?;
        let score = conn
            .query_row(
                "SELECT * FROM daily_scores ORDER BY date DESC LIMIT 1",
                [],
                score_from_row,
            )
            .optional()?;
        Ok(score)
    }

    /// Overwrite the scorer-owned fields of an existing row.
    pub fn set_score_result(
        &self,
        date: NaiveDate,
        composite_z: f64,
        alert_level: i64,
    ) -> Result<(), StoreError> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE daily_scores SET composite_z = ?1, alert_level = ?2 WHERE date = ?3",
            params![composite_z, alert_level, fmt_date(date)],
        )?;
        Ok(())
    }

    /// Number of processed days so far.
    pub fn score_count(&self) -> Result<i64, StoreError> {
        let conn = self.conn()?;
        let count = conn.query_row("SELECT COUNT(*) FROM daily_scores", [], |r| r.get(0))?;
        Ok(count)
    }

    /// `nll_total` of the most recent normal, post-learning days (newest
    /// first), excluding the day currently being scored.
    pub fn normal_nll_history(
        &self,
        max_days: i64,
        exclude_date: NaiveDate,
    ) -> Result<Vec<f64>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT nll_total FROM daily_scores
             WHERE alert_level = 0 AND is_learning = 0 AND date != ?1
             ORDER BY date DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![fmt_date(exclude_date), max_days], |row| {
            row.get::<_, Option<f64>>(0)
        })?;
        let mut values = Vec::new();
        for row in rows {
            if let Some(v) = row? {
                values.push(v);
            }
        }
        Ok(values)
    }

    /// Per-channel mean NLL across normal, post-learning days, plus the
    /// number of days that contributed. `None` when no qualifying day exists.
    pub fn channel_nll_means(
        &self,
        exclude_date: NaiveDate,
    ) -> Result<Option<(i64, [f64; Channel::COUNT])>, StoreError> {
        let conn = self.conn()?;
        let result = conn
            .query_row(
                "SELECT
                    COUNT(*) as n,
                    AVG(nll_presence), AVG(nll_fridge),
                    AVG(nll_bathroom), AVG(nll_door)
                 FROM daily_scores
                 WHERE alert_level = 0 AND is_learning = 0 AND date != ?1",
                [fmt_date(exclude_date)],
                |row| {
                    let n: i64 = row.get(0)?;
                    let means = [
                        row.get::<_, Option<f64>>(1)?.unwrap_or(0.0),
                        row.get::<_, Option<f64>>(2)?.unwrap_or(0.0),
                        row.get::<_, Option<f64>>(3)?.unwrap_or(0.0),
                        row.get::<_, Option<f64>>(4)?.unwrap_or(0.0),
                    ];
                    Ok((n, means))
                },
            )
            .optional()?;
        Ok(result.filter(|(n, _)| *n > 0))
    }
}
