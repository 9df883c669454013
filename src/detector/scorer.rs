//! Daily anomaly scoring — the 00:20 pipeline.
//!
//! Turns the learner's raw metrics into a one-sided composite risk and an
//! alert tier, then overwrites the score row in place. One-sidedness is the
//! core of the design: only a worse-than-usual model fit counts as risk, and
//! only less-than-expected activity counts as risk. A lively visit from the
//! grandchildren must never page anyone.

use chrono::NaiveDate;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::detector::history::normal_stats;
use crate::detector::thresholds::alert_level;
use crate::store::{Store, StoreError};

/// Baseline window: at most this many recent normal days.
const BASELINE_MAX_DAYS: i64 = 30;

/// Outcome of scoring one day.
#[derive(Debug, Clone, PartialEq)]
pub struct AnomalyOutcome {
    pub date: NaiveDate,
    /// One-sided NLL z-score (0 when the baseline is not ready)
    pub nll_z: f64,
    /// Raw count deviation carried over from the learner
    pub count_z: f64,
    /// One-sided low-activity risk, `max(0, -count_z)`
    pub count_risk: f64,
    /// `max(nll_z, count_risk)`
    pub composite_z: f64,
    /// Tier after the learning-phase cap
    pub alert_level: i64,
}

/// Score one day and update its `daily_scores` row. Returns `None` when the
/// learner has not produced a row for the date.
pub fn score_day(
    store: &Store,
    config: &AppConfig,
    target_date: NaiveDate,
) -> Result<Option<AnomalyOutcome>, StoreError> {
    let Some(row) = store.score_for(target_date)? else {
        warn!(date = %target_date, "no daily score row to score");
        return Ok(None);
    };

    let history = normal_stats(
        store,
        BASELINE_MAX_DAYS,
        config.alerts.min_train_days,
        target_date,
    )?;

    // One-sided: only a worse-than-baseline fit is risk.
    let nll_z = if history.ready {
        ((row.nll_total - history.mean_nll) / history.std_nll).max(0.0)
    } else {
        0.0
    };

    // One-sided: only "fewer events than expected" is risk.
    let count_risk = (-row.count_z).max(0.0);

    let composite_z = nll_z.max(count_risk);

    let mut level = alert_level(composite_z, &config.alerts);

    // During the learning phase the model is still soft; cap at a gentle
    // check so a half-trained posterior cannot page the emergency list.
    if row.is_learning {
        level = level.min(1);
    }

    store.set_score_result(target_date, composite_z, level)?;

    let outcome = AnomalyOutcome {
        date: target_date,
        nll_z,
        count_z: row.count_z,
        count_risk,
        composite_z,
        alert_level: level,
    };

    info!(
        date = %target_date,
        nll_z,
        count_risk,
        composite_z,
        alert_level = level,
        baseline_days = history.n_days,
        "daily anomaly score"
    );

    Ok(Some(outcome))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::DailyScore;
    use crate::types::Channel;

    fn setup() -> (tempfile::TempDir, Store, AppConfig) {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = Store::open(dir.path().join("scorer.db")).expect("open");
        (dir, store, AppConfig::default())
    }

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, day).expect("valid date")
    }

    fn day(d: NaiveDate, nll_total: f64, count_z: f64, is_learning: bool) -> DailyScore {
        DailyScore {
            date: d,
            train_days: 20,
            nll_per_channel: [nll_total / 4.0; Channel::COUNT],
            nll_total,
            expected_count: 40.0,
            observed_count: 40,
            count_z,
            composite_z: 0.0,
            alert_level: 0,
            aw_accuracy: 0.9,
            aw_balanced_acc: 0.8,
            aw_active_recall: 0.7,
            is_learning,
        }
    }

    fn seed_baseline(store: &Store, n: u32, nll: f64) {
        for i in 0..n {
            store.insert_score(&day(date(1 + i), nll, 0.3, false)).expect("insert");
        }
    }

    #[test]
    fn no_row_returns_none() {
        let (_dir, store, config) = setup();
        assert_eq!(score_day(&store, &config, date(1)).expect("score"), None);
    }

    #[test]
    fn baseline_not_ready_zeroes_nll_contribution() {
        let (_dir, store, config) = setup();
        // Only 3 normal days — below min_train_days.
        seed_baseline(&store, 3, 50.0);
        store.insert_score(&day(date(20), 500.0, 0.0, false)).expect("insert");

        let outcome = score_day(&store, &config, date(20))
            .expect("score")
            .expect("present");
        assert!((outcome.nll_z - 0.0).abs() < 1e-12);
        assert!((outcome.composite_z - 0.0).abs() < 1e-12);
        assert_eq!(outcome.alert_level, 0);
    }

    #[test]
    fn unusually_good_fit_is_not_risk() {
        let (_dir, store, config) = setup();
        seed_baseline(&store, 10, 50.0);
        // Much better fit than usual: nll way below the mean.
        store.insert_score(&day(date(20), 10.0, 0.5, false)).expect("insert");

        let outcome = score_day(&store, &config, date(20))
            .expect("score")
            .expect("present");
        assert!((outcome.nll_z - 0.0).abs() < 1e-12);
        assert!((outcome.count_risk - 0.0).abs() < 1e-12);
        assert_eq!(outcome.alert_level, 0);
    }

    #[test]
    fn busy_day_is_not_risk() {
        let (_dir, store, config) = setup();
        seed_baseline(&store, 10, 50.0);
        store.insert_score(&day(date(20), 50.0, 3.0, false)).expect("insert");

        let outcome = score_day(&store, &config, date(20))
            .expect("score")
            .expect("present");
        assert!((outcome.count_risk - 0.0).abs() < 1e-12);
        assert_eq!(outcome.alert_level, 0);
    }

    #[test]
    fn quiet_day_raises_count_risk() {
        let (_dir, store, config) = setup();
        seed_baseline(&store, 10, 50.0);
        store.insert_score(&day(date(20), 50.0, -3.5, false)).expect("insert");

        let outcome = score_day(&store, &config, date(20))
            .expect("score")
            .expect("present");
        assert!((outcome.count_risk - 3.5).abs() < 1e-12);
        assert!((outcome.composite_z - 3.5).abs() < 1e-12);
        assert_eq!(outcome.alert_level, 2);
    }

    #[test]
    fn learning_phase_caps_at_level_one() {
        let (_dir, store, config) = setup();
        seed_baseline(&store, 10, 50.0);
        store.insert_score(&day(date(20), 70.0, -4.0, true)).expect("insert");

        let outcome = score_day(&store, &config, date(20))
            .expect("score")
            .expect("present");
        assert!(outcome.composite_z > 4.0);
        assert_eq!(outcome.alert_level, 1);
    }

    #[test]
    fn score_row_is_updated_in_place() {
        let (_dir, store, config) = setup();
        seed_baseline(&store, 10, 50.0);
        store.insert_score(&day(date(20), 50.0, -8.0, false)).expect("insert");

        score_day(&store, &config, date(20)).expect("score");
        let row = store.score_for(date(20)).expect("read").expect("present");
        assert!((row.composite_z - 8.0).abs() < 1e-12);
        assert_eq!(row.alert_level, 3);
    }

    #[test]
    fn rescoring_excludes_the_target_from_its_own_baseline() {
        let (_dir, store, config) = setup();
        seed_baseline(&store, 7, 50.0);
        store.insert_score(&day(date(20), 50.0, 0.0, false)).expect("insert");

        // Scoring uses only the 7 seeded days, so the target's own row (which
        // would make std zero) cannot contaminate its baseline.
        let outcome = score_day(&store, &config, date(20))
            .expect("score")
            .expect("present");
        assert_eq!(outcome.alert_level, 0);
    }
}
