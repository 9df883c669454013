//! `model_state` access — the persisted Beta posteriors.
//!
//! One row per (slot, channel) cell, seeded with the configured prior on the
//! learner's first run and rewritten exactly once per processed day.

use chrono::NaiveDate;
use rusqlite::params;

use super::{fmt_date, Store, StoreError};
use crate::learner::beta::{BetaPosterior, RoutineModel};
use crate::types::{Channel, SLOTS_PER_DAY};

impl Store {
    /// Load the persisted model. `None` when `model_state` has never been
    /// seeded. Rows with unknown channels or out-of-range slots are ignored;
    /// missing cells fall back to the prior.
    pub fn load_model(
        &self,
        prior_alpha: f64,
        prior_beta: f64,
    ) -> Result<Option<RoutineModel>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT slot, channel, alpha, beta FROM model_state")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, f64>(2)?,
                row.get::<_, f64>(3)?,
            ))
        })?;

        let mut model = RoutineModel::seeded(prior_alpha, prior_beta);
        let mut any = false;
        for row in rows {
            let (slot, channel_raw, alpha, beta) = row?;
            any = true;
            let Some(channel) = Channel::parse(&channel_raw) else {
                continue;
            };
            let Ok(slot) = usize::try_from(slot) else {
                continue;
            };
            if slot < SLOTS_PER_DAY {
                model.set(channel, slot, BetaPosterior::new(alpha, beta));
            }
        }

        Ok(any.then_some(model))
    }

    /// Seed every (slot, channel) cell with the prior, in one transaction.
    pub fn init_model(&self, prior_alpha: f64, prior_beta: f64) -> Result<(), StoreError> {
        let conn = self.conn()?;
        let tx = conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO model_state (slot, channel, alpha, beta) VALUES (?1, ?2, ?3, ?4)",
            )?;
            for ch in Channel::ALL {
                for slot in 0..SLOTS_PER_DAY {
                    stmt.execute(params![slot as i64, ch.as_str(), prior_alpha, prior_beta])?;
                }
            }
        }
        tx.commit()?;
        tracing::info!(
            rows = Channel::COUNT * SLOTS_PER_DAY,
            "model_state seeded with prior"
        );
        Ok(())
    }

    /// Persist an updated model, stamping every cell with the processed date.
    pub fn save_model(&self, model: &RoutineModel, date: NaiveDate) -> Result<(), StoreError> {
        let conn = self.conn()?;
        let tx = conn.unchecked_transaction()?;
        save_model_on(&tx, model, date)?;
        tx.commit()?;
        Ok(())
    }

    /// The learner's commit point: updated posteriors and the new score row
    /// land in one transaction, so a crash mid-write can never leave a day
    /// half-processed.
    pub fn commit_learning(
        &self,
        model: &RoutineModel,
        date: NaiveDate,
        score: &super::DailyScore,
    ) -> Result<(), StoreError> {
        let conn = self.conn()?;
        let tx = conn.unchecked_transaction()?;
        save_model_on(&tx, model, date)?;
        super::scores::insert_score_on(&tx, score)?;
        tx.commit()?;
        Ok(())
    }
}

/// Connection-level model write, shared with [`Store::commit_learning`].
pub(crate) fn save_model_on(
    conn: &rusqlite::Connection,
    model: &RoutineModel,
    date: NaiveDate,
) -> rusqlite::Result<()> {
    let mut stmt = conn.prepare(
        "UPDATE model_state SET alpha = ?1, beta = ?2, last_updated = ?3
         WHERE slot = ?4 AND channel = ?5",
    )?;
    let date_str = fmt_date(date);
    for (ch, slot, posterior) in model.iter() {
        stmt.execute(params![
            posterior.alpha,
            posterior.beta,
            date_str,
            slot as i64,
            ch.as_str()
        ])?;
    }
    Ok(())
}
