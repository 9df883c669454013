//! Alert manager — the notification decision engine.
//!
//! Everything between "the detector found something" and "a phone buzzed"
//! happens here: training-maturity gates, per-tier cooldowns, explanation
//! generation, the morning-alert daily cap, and the level-3 acknowledgement
//! ledger with its escalation path.
//!
//! The parsed rate state is only a cache; the authoritative copy always
//! lives in `system_state` under `alert_rate_state`, so cooldowns survive
//! restarts.

use chrono::{Duration, NaiveDate, NaiveDateTime};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{error, info, warn};

use super::notifier::Notifier;
use super::templates;
use crate::config::AppConfig;
use crate::learner::current_ci_width;
use crate::store::{keys, Store, StoreError};
use crate::types::{AlertKind, Channel, RealtimeAlert, DATE_FORMAT};

/// Below this many training days no alert leaves the house.
const MIN_ALERT_TRAIN_DAYS: i64 = 7;

/// From this training day on, all tiers are allowed; before it, only tier 1.
const FULL_ALERT_TRAIN_DAYS: i64 = 15;

/// Real-time checks do not depend on model maturity; they rate-limit as a
/// fully trained system would.
const REALTIME_ASSUMED_TRAIN_DAYS: i64 = 15;

/// A channel whose NLL exceeds its historical mean by this ratio gets named
/// in the explanation.
const EXPLANATION_NLL_RATIO: f64 = 1.5;

/// Count-z below which the low-total-activity sentence is added.
const EXPLANATION_COUNT_Z: f64 = -2.0;

/// Minimum normal days before per-channel explanations are attempted.
const EXPLANATION_MIN_DAYS: i64 = 3;

/// Fixed confidence figure for the learning-complete notice.
const LEARNING_COMPLETE_CONFIDENCE: f64 = 85.0;

pub struct AlertManager {
    store: Store,
    notifier: Arc<dyn Notifier>,
    config: Arc<AppConfig>,
    /// Lazily hydrated cache of `alert_rate_state`; `None` until first use
    rate_state: Mutex<Option<HashMap<i64, NaiveDateTime>>>,
}

impl AlertManager {
    pub fn new(store: Store, notifier: Arc<dyn Notifier>, config: Arc<AppConfig>) -> Self {
        Self {
            store,
            notifier,
            config,
            rate_state: Mutex::new(None),
        }
    }

    // ------------------------------------------------------------------
    // Rate limiting
    // ------------------------------------------------------------------

    /// Should an alert at this tier go out now?
    ///
    /// Rules, in order: no tier-0 alerts; nothing before training day 7;
    /// only tier 1 before day 15; a jump to a higher tier than anything
    /// sent before always goes out; otherwise the per-tier cooldown decides.
    /// Every permit records and persists the emission time.
    pub fn should_send(&self, alert_level: i64, train_days: i64, now: NaiveDateTime) -> bool {
        if alert_level <= 0 {
            return false;
        }
        if train_days < MIN_ALERT_TRAIN_DAYS {
            return false;
        }
        if train_days < FULL_ALERT_TRAIN_DAYS && alert_level > 1 {
            return false;
        }

        let mut guard = self.lock_rate_state();
        if guard.is_none() {
            *guard = Some(self.load_rate_state());
        }
        let Some(state) = guard.as_mut() else {
            return false;
        };

        // Escalation to a tier above everything previously sent bypasses
        // the cooldown entirely.
        let last_max = state.keys().copied().max().unwrap_or(0);
        if alert_level > last_max && last_max > 0 {
            state.insert(alert_level, now);
            self.persist_rate_state(state);
            return true;
        }

        if let Some(last) = state.get(&alert_level) {
            if now - *last < Duration::hours(self.config.alerts.cooldown_hours) {
                return false;
            }
        }

        state.insert(alert_level, now);
        self.persist_rate_state(state);
        true
    }

    fn lock_rate_state(&self) -> MutexGuard<'_, Option<HashMap<i64, NaiveDateTime>>> {
        self.rate_state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Hydrate from `alert_rate_state`, format `level:ISO;level:ISO;...`.
    /// Unparseable fragments are dropped with a warning.
    fn load_rate_state(&self) -> HashMap<i64, NaiveDateTime> {
        let raw = match self.store.state(keys::ALERT_RATE_STATE) {
            Ok(Some(raw)) => raw,
            Ok(None) => return HashMap::new(),
            Err(err) => {
                warn!(error = %err, "could not read alert_rate_state, starting empty");
                return HashMap::new();
            }
        };

        let mut state = HashMap::new();
        for pair in raw.split(';').filter(|p| !p.is_empty()) {
            let parsed = pair.split_once(':').and_then(|(level, ts)| {
                Some((level.parse::<i64>().ok()?, crate::store::parse_ts(ts)?))
            });
            match parsed {
                Some((level, ts)) => {
                    state.insert(level, ts);
                }
                None => warn!(fragment = %pair, "discarding unparseable alert_rate_state entry"),
            }
        }
        state
    }

    fn persist_rate_state(&self, state: &HashMap<i64, NaiveDateTime>) {
        let mut parts: Vec<(i64, NaiveDateTime)> = state.iter().map(|(k, v)| (*k, *v)).collect();
        parts.sort_by_key(|(level, _)| *level);
        let serialized = parts
            .iter()
            .map(|(level, ts)| format!("{level}:{}", crate::store::fmt_ts(*ts)))
            .collect::<Vec<_>>()
            .join(";");
        if let Err(err) = self.store.set_state(keys::ALERT_RATE_STATE, &serialized) {
            warn!(error = %err, "could not persist alert_rate_state");
        }
    }

    /// Morning-silence daily cap, persisted as `date:count` so a restart
    /// mid-morning cannot double the quota.
    pub fn morning_allowed(&self, date: NaiveDate) -> bool {
        let date_str = date.format(DATE_FORMAT).to_string();
        let count = match self.store.state(keys::MORNING_ALERT_COUNT) {
            Ok(Some(raw)) => match raw.split_once(':') {
                Some((d, c)) if d == date_str => c.parse::<u32>().unwrap_or(0),
                _ => 0,
            },
            _ => 0,
        };

        if count >= self.config.alerts.morning_max_per_day {
            return false;
        }
        if let Err(err) = self
            .store
            .set_state(keys::MORNING_ALERT_COUNT, &format!("{date_str}:{}", count + 1))
        {
            warn!(error = %err, "could not persist morning_alert_count");
        }
        true
    }

    // ------------------------------------------------------------------
    // Explanation generation
    // ------------------------------------------------------------------

    /// Human-readable explanation for a day's anomaly: which channels were
    /// unusually surprising, and whether total activity collapsed.
    pub fn generate_explanation(&self, date: NaiveDate) -> String {
        let Ok(Some(row)) = self.store.score_for(date) else {
            return "No detail available.".to_string();
        };

        let history = match self.store.channel_nll_means(date) {
            Ok(history) => history,
            Err(err) => {
                warn!(error = %err, "explanation history query failed");
                None
            }
        };
        let Some((n_days, means)) = history else {
            return "Not enough history yet for a detailed analysis.".to_string();
        };
        if n_days < EXPLANATION_MIN_DAYS {
            return "Not enough history yet for a detailed analysis.".to_string();
        }

        let mut lines = Vec::new();
        for channel in Channel::ALL {
            let mean = means[channel.index()];
            if mean > 0.0 && row.nll(channel) / mean > EXPLANATION_NLL_RATIO {
                lines.push(format!(
                    "{} activity is lower than expected.",
                    channel.label()
                ));
            }
        }

        if row.count_z < EXPLANATION_COUNT_Z {
            lines.push(format!(
                "Total activity is very low ({} events, expected ≈ {:.0}).",
                row.observed_count, row.expected_count
            ));
        }

        if lines.is_empty() {
            "General activity pattern differs from normal.".to_string()
        } else {
            lines.join("\n")
        }
    }

    // ------------------------------------------------------------------
    // Handlers
    // ------------------------------------------------------------------

    /// Daily alert decision, run right after scoring.
    pub async fn handle_daily_score(&self, date: NaiveDate, now: NaiveDateTime) {
        let row = match self.store.score_for(date) {
            Ok(Some(row)) => row,
            Ok(None) => return,
            Err(err) => {
                warn!(error = %err, "could not read daily score");
                return;
            }
        };

        if row.alert_level <= 0 {
            return;
        }
        if !self.should_send(row.alert_level, row.train_days, now) {
            info!(date = %date, level = row.alert_level, "daily alert suppressed by rate limiter");
            return;
        }

        let explanation = self.generate_explanation(date);
        let text = templates::render_alert(
            row.alert_level,
            &date.format(DATE_FORMAT).to_string(),
            row.composite_z,
            &explanation,
        );
        if text.is_empty() {
            return;
        }

        if row.alert_level >= 3 {
            if let Err(err) = self.emit_with_ack(&text, row.alert_level, now).await {
                error!(error = %err, "could not record pending alert");
            }
        } else {
            self.notifier.send_to_all(&text).await;
        }
        info!(date = %date, level = row.alert_level, "daily alert sent");
    }

    /// Real-time alert routing. Morning silence has its own daily cap, the
    /// gentle silence alert uses the general limiter, and fall suspicion
    /// goes straight to the acknowledgement path — its once-per-episode
    /// guarantee lives in the check itself, and a dead-man's switch that
    /// stays quiet on a second episode would be wrong.
    pub async fn handle_realtime_alert(&self, alert: &RealtimeAlert, now: NaiveDateTime) {
        match alert.kind {
            AlertKind::MorningSilence => {
                if !self.morning_allowed(now.date()) {
                    return;
                }
                let text =
                    templates::render_morning_silence(&now.format("%H:%M").to_string());
                self.notifier.send_to_all(&text).await;
                info!("morning silence alert sent");
            }
            AlertKind::ExtendedSilence => {
                if !self.should_send(i64::from(alert.level), REALTIME_ASSUMED_TRAIN_DAYS, now) {
                    return;
                }
                let text = templates::render_extended_silence(&alert.message);
                self.notifier.send_to_all(&text).await;
                info!("extended silence alert sent");
            }
            AlertKind::FallSuspicion => {
                let text = templates::render_fall_suspicion(&alert.message);
                match self.emit_with_ack(&text, i64::from(alert.level), now).await {
                    Ok(id) => warn!(alert_id = id, "fall suspicion alert sent, awaiting ack"),
                    Err(err) => error!(error = %err, "could not record fall suspicion alert"),
                }
            }
        }
    }

    /// 22:00 daily summary: latest score, today's event counts, and the
    /// model's current confidence.
    pub async fn handle_daily_summary(&self, now: NaiveDateTime) {
        let today = now.date();
        let latest = match self.store.latest_score() {
            Ok(latest) => latest,
            Err(err) => {
                warn!(error = %err, "could not read latest score for summary");
                None
            }
        };
        let (composite_z, alert_level, train_days) = latest
            .map(|row| (row.composite_z, row.alert_level, row.train_days))
            .unwrap_or((0.0, 0, 0));

        let midnight = today.and_hms_opt(0, 0, 0).unwrap_or(now);
        let event_counts = self
            .store
            .channel_counts_between(midnight, now)
            .unwrap_or_default();

        let ci_width = current_ci_width(&self.store, &self.config, train_days);

        let text = templates::render_daily_summary(
            &today.format(DATE_FORMAT).to_string(),
            composite_z,
            alert_level,
            train_days,
            ci_width,
            &event_counts,
        );
        self.notifier.send_to_all(&text).await;
        info!(date = %today, "daily summary sent");
    }

    /// One-shot learning milestones after days 7 and 14.
    pub async fn handle_learning_milestone(&self, now: NaiveDateTime) {
        let yesterday = now.date() - Duration::days(1);
        let Ok(Some(row)) = self.store.score_for(yesterday) else {
            return;
        };

        match row.train_days {
            7 => {
                let text = templates::render_learning_progress(
                    &yesterday.format(DATE_FORMAT).to_string(),
                    7,
                    1.0 / 7.0,
                    "First week complete! Basic alerts are now active.",
                );
                self.notifier.send_to_all(&text).await;
                info!("learning milestone sent: day 7");
            }
            14 => {
                let text = templates::render_learning_complete(LEARNING_COMPLETE_CONFIDENCE);
                self.notifier.send_to_all(&text).await;
                info!("learning milestone sent: day 14");
            }
            _ => {}
        }
    }

    // ------------------------------------------------------------------
    // Acknowledgement & escalation
    // ------------------------------------------------------------------

    /// Persist a pending alert, then send it with the acknowledgement
    /// button. The row goes in first: a crash after the insert leaves a
    /// pending row the escalation job will pick up, which fails safe.
    pub async fn emit_with_ack(
        &self,
        message: &str,
        level: i64,
        now: NaiveDateTime,
    ) -> Result<i64, StoreError> {
        let id = self.store.insert_pending_alert(level, message, now)?;
        self.notifier.send_to_all_with_ack(message, id).await;
        Ok(id)
    }

    /// Escalate every pending alert older than the timeout to the emergency
    /// contacts. With no emergency contacts configured this is a no-op and
    /// rows stay pending (nightly maintenance reaps them eventually).
    pub async fn escalate_expired(&self, now: NaiveDateTime) -> Result<usize, StoreError> {
        let emergency_ids = &self.config.messenger.emergency_chat_ids;
        if emergency_ids.is_empty() {
            return Ok(0);
        }

        let timeout = self.config.messenger.escalation_minutes;
        let cutoff = now - Duration::minutes(timeout);
        let mut escalated = 0;
        for alert in self.store.expired_pending_alerts(cutoff)? {
            let text = templates::render_escalation(timeout, &alert.message);
            for chat_id in emergency_ids {
                self.notifier.send(chat_id, &text).await;
            }
            if self.store.mark_alert_escalated(alert.id)? {
                escalated += 1;
                warn!(
                    alert_id = alert.id,
                    contacts = emergency_ids.len(),
                    "unacknowledged alert escalated"
                );
            }
        }
        Ok(escalated)
    }
}
