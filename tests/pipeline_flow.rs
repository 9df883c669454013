//! Whole-pipeline run: weeks of a stable routine flow through slot fill,
//! learning and scoring; then one silent day must page the caregivers.

use std::sync::Arc;

use carewatch::alerter::{AlertManager, Notifier, RecordingNotifier};
use carewatch::config::AppConfig;
use carewatch::detector::scorer::score_day;
use carewatch::learner::run_daily_learning;
use carewatch::store::{AlertStatus, Store};
use carewatch::types::Channel;
use chrono::{Duration, NaiveDate, NaiveDateTime};

/// The resident's fixed routine, as active slots per channel.
const PRESENCE_SLOTS: std::ops::Range<usize> = 24..92;
const FRIDGE_SLOTS: [usize; 3] = [28, 48, 72];
const BATHROOM_SLOTS: [usize; 3] = [26, 50, 80];
const DOOR_SLOTS: [usize; 2] = [32, 70];

fn date(day_offset: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 3, 1).expect("valid date") + Duration::days(i64::from(day_offset))
}

fn at(d: NaiveDate, h: u32, m: u32) -> NaiveDateTime {
    d.and_hms_opt(h, m, 0).expect("valid time")
}

/// Write one normal day's slot grid.
fn write_routine_day(store: &Store, d: NaiveDate) {
    for slot in PRESENCE_SLOTS {
        store.upsert_slot(d, slot, Channel::Presence, 2).expect("upsert");
    }
    for slot in FRIDGE_SLOTS {
        store.upsert_slot(d, slot, Channel::Fridge, 1).expect("upsert");
    }
    for slot in BATHROOM_SLOTS {
        store.upsert_slot(d, slot, Channel::Bathroom, 1).expect("upsert");
    }
    for slot in DOOR_SLOTS {
        store.upsert_slot(d, slot, Channel::Door, 1).expect("upsert");
    }
    store.fill_missing_slots(d).expect("fill");
}

/// Run the nightly pipeline (fill was done when the day was written).
fn process_day(store: &Store, config: &AppConfig, d: NaiveDate) {
    run_daily_learning(store, config, d).expect("learn");
    score_day(store, config, d).expect("score");
}

#[tokio::test]
async fn a_silent_day_after_weeks_of_routine_pages_the_caregiver() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = Store::open(dir.path().join("pipeline.db")).expect("open");

    let mut config = AppConfig::default();
    config.messenger.chat_ids = vec!["111".to_string()];
    let config = Arc::new(config);

    let notifier = Arc::new(RecordingNotifier::new(vec!["111".to_string()]));
    let manager = AlertManager::new(
        store.clone(),
        Arc::clone(&notifier) as Arc<dyn Notifier>,
        Arc::clone(&config),
    );

    // 25 days of the same routine.
    for offset in 0..25 {
        let d = date(offset);
        write_routine_day(&store, d);
        process_day(&store, &config, d);
    }

    // Invariants after 25 processed days.
    let model = store.load_model(1.0, 1.0).expect("load").expect("present");
    for (_, _, p) in model.iter() {
        assert!(
            (p.alpha + p.beta - 27.0).abs() < 1e-9,
            "posterior mass must be prior + one per day"
        );
    }
    for offset in 0..25 {
        let row = store.score_for(date(offset)).expect("read").expect("present");
        assert_eq!(row.train_days, i64::from(offset) + 1);
        assert_eq!(row.is_learning, row.train_days <= 14);
        assert_eq!(row.alert_level, 0, "routine day {offset} must stay quiet");
    }

    // Day 26: nothing happens in the flat at all.
    let silent = date(25);
    store.fill_missing_slots(silent).expect("fill");
    run_daily_learning(&store, &config, silent).expect("learn");
    let outcome = score_day(&store, &config, silent)
        .expect("score")
        .expect("row present");

    assert!(outcome.count_risk > 4.0, "count_risk = {}", outcome.count_risk);
    assert_eq!(outcome.alert_level, 3);

    // The alert manager turns the score into a paged, ack-tracked message.
    manager.handle_daily_score(silent, at(silent, 0, 20) + Duration::days(1)).await;

    let sent = notifier.sent();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].text.contains("URGENT"));
    let alert_id = sent[0].ack_alert_id.expect("level-3 alert carries an ack button");
    let pending = store.pending_alert(alert_id).expect("read").expect("present");
    assert_eq!(pending.status, AlertStatus::Pending);
    assert_eq!(pending.alert_level, 3);

    // The explanation names the collapsed activity.
    assert!(sent[0].text.contains("activity is lower than expected")
        || sent[0].text.contains("Total activity is very low"));
}

#[tokio::test]
async fn learner_is_idempotent_under_a_scheduler_double_fire() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = Store::open(dir.path().join("idempotent.db")).expect("open");
    let config = AppConfig::default();

    let d = date(0);
    write_routine_day(&store, d);
    run_daily_learning(&store, &config, d).expect("learn");
    run_daily_learning(&store, &config, d).expect("learn again");

    let model = store.load_model(1.0, 1.0).expect("load").expect("present");
    for (_, _, p) in model.iter() {
        assert!((p.alpha + p.beta - 3.0).abs() < 1e-9);
    }
    assert_eq!(store.score_count().expect("count"), 1);
}

#[tokio::test]
async fn cooldown_survives_a_process_restart() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = Store::open(dir.path().join("restart.db")).expect("open");
    let config = Arc::new(AppConfig::default());
    let t1 = at(date(0), 14, 0);

    {
        let notifier = Arc::new(RecordingNotifier::new(vec!["111".to_string()]));
        let manager = AlertManager::new(
            store.clone(),
            notifier as Arc<dyn Notifier>,
            Arc::clone(&config),
        );
        assert!(manager.should_send(2, 15, t1));
    }

    // "Restart": a brand-new manager over a re-opened store.
    let store = Store::open(dir.path().join("restart.db")).expect("reopen");
    let notifier = Arc::new(RecordingNotifier::new(vec!["111".to_string()]));
    let manager = AlertManager::new(store, notifier as Arc<dyn Notifier>, config);

    assert!(!manager.should_send(2, 15, t1 + Duration::hours(3)));
    assert!(manager.should_send(2, 15, t1 + Duration::hours(6)));
}
