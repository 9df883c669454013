//! Real-time silence and fall checks, run every 30 minutes.
//!
//! Three stateless evaluators over recent events. Each returns at most one
//! alert; the alert manager decides whether it actually goes out.
//!
//! - Morning vital sign: nothing at all since midnight by the morning check
//!   hour is a serious sign (level 2).
//! - Extended silence: hours of daytime quiet after a normal morning is a
//!   gentle check (level 1).
//! - Fall suspicion: bathroom entered, no movement anywhere else since, for
//!   too long (level 3). Fires at most once per episode.

use chrono::{NaiveDateTime, Timelike};
use tracing::warn;

use crate::config::AppConfig;
use crate::store::{keys, Store, StoreError};
use crate::types::{AlertKind, RealtimeAlert};

/// Morning vital-sign check. Only meaningful between the morning check hour
/// and the end of the awake window.
pub fn check_morning_vital_sign(
    store: &Store,
    config: &AppConfig,
    now: NaiveDateTime,
) -> Result<Option<RealtimeAlert>, StoreError> {
    if now.hour() < config.alerts.morning_check_hour {
        return Ok(None);
    }
    if now.hour() >= config.model.awake_end_hour {
        return Ok(None);
    }

    let midnight = midnight_of(now);
    let count = store.count_events_between(midnight, now)?;
    if count > 0 {
        return Ok(None);
    }

    Ok(Some(RealtimeAlert {
        kind: AlertKind::MorningSilence,
        level: 2,
        message: format!(
            "No sensor activity at all since {}:00 this morning.",
            config.alerts.morning_check_hour
        ),
        last_event_time: None,
    }))
}

/// Extended-silence check. Only runs inside the awake window.
pub fn check_extended_silence(
    store: &Store,
    config: &AppConfig,
    now: NaiveDateTime,
) -> Result<Option<RealtimeAlert>, StoreError> {
    if now.hour() < config.model.awake_start_hour || now.hour() >= config.model.awake_end_hour {
        return Ok(None);
    }

    let midnight = midnight_of(now);
    let Some(last) = store.last_event_since(midnight)? else {
        // No events at all today. The morning check owns that situation once
        // its hour arrives; before then there is nothing useful to say.
        return Ok(None);
    };

    let silence = now - last;
    let threshold = chrono::Duration::hours(config.alerts.silence_threshold_hours);
    if silence < threshold {
        return Ok(None);
    }

    let hours_silent = silence.num_minutes() as f64 / 60.0;
    Ok(Some(RealtimeAlert {
        kind: AlertKind::ExtendedSilence,
        level: 1,
        message: format!("No sensor activity for the last {hours_silent:.1} hours."),
        last_event_time: Some(last),
    }))
}

/// Fall-suspicion check. The ingestion side keeps `last_bathroom_time` set
/// while the resident is (apparently) still in the bathroom; if that state
/// is older than the configured limit, something may have happened in there.
/// The state is cleared on emission so one episode pages exactly once.
pub fn check_fall_suspicion(
    store: &Store,
    config: &AppConfig,
    now: NaiveDateTime,
) -> Result<Option<RealtimeAlert>, StoreError> {
    let limit_minutes = config.alerts.fall_detection_minutes;
    if limit_minutes <= 0 {
        return Ok(None);
    }

    let Some(raw) = store.state(keys::LAST_BATHROOM_TIME)? else {
        return Ok(None);
    };
    if raw.is_empty() {
        return Ok(None);
    }
    let Some(entered) = crate::store::parse_ts(&raw) else {
        warn!(value = %raw, "unparseable last_bathroom_time, clearing");
        store.set_state(keys::LAST_BATHROOM_TIME, "")?;
        return Ok(None);
    };

    if now - entered < chrono::Duration::minutes(limit_minutes) {
        return Ok(None);
    }

    let minutes = (now - entered).num_minutes();
    store.set_state(keys::LAST_BATHROOM_TIME, "")?;

    Ok(Some(RealtimeAlert {
        kind: AlertKind::FallSuspicion,
        level: 3,
        message: format!(
            "Bathroom entered {minutes} minutes ago with no movement elsewhere since. Possible fall."
        ),
        last_event_time: Some(entered),
    }))
}

/// Run all real-time checks. Returns the alerts that fired (possibly empty).
pub fn run_realtime_checks(
    store: &Store,
    config: &AppConfig,
    now: NaiveDateTime,
) -> Result<Vec<RealtimeAlert>, StoreError> {
    let mut alerts = Vec::new();
    if let Some(alert) = check_morning_vital_sign(store, config, now)? {
        alerts.push(alert);
    }
    if let Some(alert) = check_extended_silence(store, config, now)? {
        alerts.push(alert);
    }
    if let Some(alert) = check_fall_suspicion(store, config, now)? {
        alerts.push(alert);
    }
    Ok(alerts)
}

fn midnight_of(now: NaiveDateTime) -> NaiveDateTime {
    now.date().and_hms_opt(0, 0, 0).unwrap_or(now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::fmt_ts;
    use crate::types::{Channel, SensorEvent};
    use chrono::NaiveDate;

    fn setup() -> (tempfile::TempDir, Store, AppConfig) {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = Store::open(dir.path().join("realtime.db")).expect("open");
        (dir, store, AppConfig::default())
    }

    fn ts(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 3, 20)
            .and_then(|d| d.and_hms_opt(h, m, 0))
            .expect("valid time")
    }

    fn record(store: &Store, at: NaiveDateTime, channel: Channel) {
        store
            .insert_event(&SensorEvent::state_change(at, "sensor", channel))
            .expect("insert");
    }

    // --- morning vital sign ---

    #[test]
    fn morning_check_waits_for_its_hour() {
        let (_dir, store, config) = setup();
        assert!(check_morning_vital_sign(&store, &config, ts(10, 59))
            .expect("check")
            .is_none());
    }

    #[test]
    fn morning_silence_fires_after_check_hour() {
        let (_dir, store, config) = setup();
        let alert = check_morning_vital_sign(&store, &config, ts(11, 0))
            .expect("check")
            .expect("alert");
        assert_eq!(alert.kind, AlertKind::MorningSilence);
        assert_eq!(alert.level, 2);
    }

    #[test]
    fn any_event_suppresses_morning_silence() {
        let (_dir, store, config) = setup();
        record(&store, ts(7, 30), Channel::Presence);
        assert!(check_morning_vital_sign(&store, &config, ts(11, 30))
            .expect("check")
            .is_none());
    }

    #[test]
    fn morning_check_stops_at_awake_end() {
        let (_dir, store, config) = setup();
        assert!(check_morning_vital_sign(&store, &config, ts(23, 0))
            .expect("check")
            .is_none());
    }

    // --- extended silence ---

    #[test]
    fn extended_silence_outside_awake_window_is_ignored() {
        let (_dir, store, config) = setup();
        record(&store, ts(0, 30), Channel::Presence);
        assert!(check_extended_silence(&store, &config, ts(4, 0))
            .expect("check")
            .is_none());
        assert!(check_extended_silence(&store, &config, ts(23, 30))
            .expect("check")
            .is_none());
    }

    #[test]
    fn extended_silence_fires_after_threshold() {
        let (_dir, store, config) = setup();
        record(&store, ts(9, 0), Channel::Presence);

        assert!(check_extended_silence(&store, &config, ts(11, 30))
            .expect("check")
            .is_none());

        let alert = check_extended_silence(&store, &config, ts(12, 0))
            .expect("check")
            .expect("alert");
        assert_eq!(alert.kind, AlertKind::ExtendedSilence);
        assert_eq!(alert.level, 1);
        assert_eq!(alert.last_event_time, Some(ts(9, 0)));
    }

    #[test]
    fn no_events_today_defers_to_morning_check() {
        let (_dir, store, config) = setup();
        // Before and after the morning hour: silence with zero events is the
        // morning check's call.
        assert!(check_extended_silence(&store, &config, ts(9, 0))
            .expect("check")
            .is_none());
        assert!(check_extended_silence(&store, &config, ts(14, 0))
            .expect("check")
            .is_none());
    }

    #[test]
    fn yesterdays_events_do_not_count() {
        let (_dir, store, config) = setup();
        let yesterday = NaiveDate::from_ymd_opt(2025, 3, 19)
            .and_then(|d| d.and_hms_opt(20, 0, 0))
            .expect("valid");
        record(&store, yesterday, Channel::Presence);
        assert!(check_extended_silence(&store, &config, ts(9, 0))
            .expect("check")
            .is_none());
    }

    // --- fall suspicion ---

    #[test]
    fn fall_check_disabled_when_configured_off() {
        let (_dir, store, mut config) = setup();
        config.alerts.fall_detection_minutes = 0;
        store
            .set_state(keys::LAST_BATHROOM_TIME, &fmt_ts(ts(9, 0)))
            .expect("set");
        assert!(check_fall_suspicion(&store, &config, ts(12, 0))
            .expect("check")
            .is_none());
    }

    #[test]
    fn fall_fires_once_per_episode() {
        let (_dir, store, config) = setup();
        store
            .set_state(keys::LAST_BATHROOM_TIME, &fmt_ts(ts(9, 0)))
            .expect("set");

        // 45-minute default not yet reached.
        assert!(check_fall_suspicion(&store, &config, ts(9, 30))
            .expect("check")
            .is_none());

        let alert = check_fall_suspicion(&store, &config, ts(10, 0))
            .expect("check")
            .expect("alert");
        assert_eq!(alert.kind, AlertKind::FallSuspicion);
        assert_eq!(alert.level, 3);

        // State was cleared: the same episode cannot fire again.
        assert!(check_fall_suspicion(&store, &config, ts(10, 30))
            .expect("check")
            .is_none());
    }

    #[test]
    fn unparseable_fall_state_is_discarded() {
        let (_dir, store, config) = setup();
        store
            .set_state(keys::LAST_BATHROOM_TIME, "not-a-timestamp")
            .expect("set");
        assert!(check_fall_suspicion(&store, &config, ts(12, 0))
            .expect("check")
            .is_none());
        assert_eq!(
            store.state(keys::LAST_BATHROOM_TIME).expect("read").as_deref(),
            Some("")
        );
    }

    // --- combined ---

    #[test]
    fn combined_run_collects_independent_alerts() {
        let (_dir, store, config) = setup();
        store
            .set_state(keys::LAST_BATHROOM_TIME, &fmt_ts(ts(9, 0)))
            .expect("set");

        // Noon, zero events: morning silence + fall suspicion, but no
        // extended silence (that defers to the morning check).
        let alerts = run_realtime_checks(&store, &config, ts(12, 0)).expect("run");
        let kinds: Vec<AlertKind> = alerts.iter().map(|a| a.kind).collect();
        assert_eq!(kinds, vec![AlertKind::MorningSilence, AlertKind::FallSuspicion]);
    }
}
