//! Daily routine learning — the 00:15 pipeline.
//!
//! For yesterday: read the slot grid, compute metrics against the pre-update
//! model, condition the posteriors on the day, and commit model + score row
//! in one transaction. Order matters: the day's NLL measures how much today
//! surprised *yesterday's* model, so metrics must run before the update.

use chrono::NaiveDate;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::learner::beta::RoutineModel;
use crate::learner::metrics::{calculate_daily_metrics, DailyMetrics};
use crate::store::{DailyScore, Store, StoreError};

/// What the learning run did. Missing data is an outcome, not an error —
/// the scheduler never sees a failure for an empty day.
#[derive(Debug, Clone, PartialEq)]
pub enum LearnOutcome {
    /// The day was processed and persisted
    Processed {
        train_days: i64,
        metrics: DailyMetrics,
    },
    /// A score row already exists for the date; nothing was touched
    AlreadyProcessed,
    /// No slot rows exist for the date; nothing to learn
    NoSlotData,
}

/// Run the learning pipeline for one date.
pub fn run_daily_learning(
    store: &Store,
    config: &AppConfig,
    target_date: NaiveDate,
) -> Result<LearnOutcome, StoreError> {
    // Idempotence guard: re-running a processed date must have no effect,
    // otherwise alpha+beta would grow by more than one per day.
    if store.score_for(target_date)?.is_some() {
        info!(date = %target_date, "already processed, skipping");
        return Ok(LearnOutcome::AlreadyProcessed);
    }

    let Some(grid) = store.slot_grid(target_date)? else {
        warn!(date = %target_date, "no slot data for date");
        return Ok(LearnOutcome::NoSlotData);
    };

    let prior_a = config.model.prior_alpha;
    let prior_b = config.model.prior_beta;
    let model = match store.load_model(prior_a, prior_b)? {
        Some(model) => model,
        None => {
            store.init_model(prior_a, prior_b)?;
            RoutineModel::seeded(prior_a, prior_b)
        }
    };

    // Metrics against the PRE-update model.
    let metrics = calculate_daily_metrics(
        &grid,
        &model,
        config.awake_start_slot(),
        config.awake_end_slot(),
    );

    let updated = model.updated(&grid);

    let train_days = store.score_count()? + 1;
    let is_learning = train_days <= config.model.learning_days;
    let score = DailyScore {
        date: target_date,
        train_days,
        nll_per_channel: metrics.nll_per_channel,
        nll_total: metrics.nll_total,
        expected_count: metrics.expected_count,
        observed_count: metrics.observed_count,
        count_z: metrics.count_z,
        // The scorer owns these two; it overwrites them at 00:20.
        composite_z: 0.0,
        alert_level: 0,
        aw_accuracy: metrics.aw_accuracy,
        aw_balanced_acc: metrics.aw_balanced_acc,
        aw_active_recall: metrics.aw_active_recall,
        is_learning,
    };

    store.commit_learning(&updated, target_date, &score)?;

    info!(
        date = %target_date,
        train_days,
        nll_total = metrics.nll_total,
        observed = metrics.observed_count,
        is_learning,
        "daily learning complete"
    );

    Ok(LearnOutcome::Processed {
        train_days,
        metrics,
    })
}

/// Average posterior credible-interval width, used by the daily summary.
/// Falls back to the cosmetic `max(0.05, 1/train_days)` only when the model
/// has never been seeded.
pub fn current_ci_width(store: &Store, config: &AppConfig, train_days: i64) -> f64 {
    match store.load_model(config.model.prior_alpha, config.model.prior_beta) {
        Ok(Some(model)) => model.avg_ci_width(),
        _ => (1.0 / train_days.max(1) as f64).max(0.05),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Channel;

    fn setup() -> (tempfile::TempDir, Store, AppConfig) {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = Store::open(dir.path().join("learner.db")).expect("open");
        (dir, store, AppConfig::default())
    }

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, day).expect("valid date")
    }

    /// Write a day where presence is active over the awake window.
    fn write_day(store: &Store, d: NaiveDate) {
        for slot in 24..92 {
            store.upsert_slot(d, slot, Channel::Presence, 2).expect("upsert");
        }
        store.fill_missing_slots(d).expect("fill");
    }

    #[test]
    fn first_run_seeds_model_and_inserts_score() {
        let (_dir, store, config) = setup();
        write_day(&store, date(1));

        let outcome = run_daily_learning(&store, &config, date(1)).expect("learn");
        let LearnOutcome::Processed { train_days, .. } = outcome else {
            panic!("expected Processed, got {outcome:?}");
        };
        assert_eq!(train_days, 1);

        let score = store.score_for(date(1)).expect("read").expect("present");
        assert_eq!(score.train_days, 1);
        assert!(score.is_learning);
        assert_eq!(score.alert_level, 0);
        assert!((score.composite_z - 0.0).abs() < 1e-12);

        // Posteriors moved: active presence slots got alpha bumped.
        let model = store.load_model(1.0, 1.0).expect("load").expect("present");
        let p = model.posterior(Channel::Presence, 30);
        assert!((p.alpha - 2.0).abs() < 1e-12);
        assert!((p.beta - 1.0).abs() < 1e-12);
    }

    #[test]
    fn rerun_is_a_no_op() {
        let (_dir, store, config) = setup();
        write_day(&store, date(1));

        run_daily_learning(&store, &config, date(1)).expect("learn");
        let model_before = store.load_model(1.0, 1.0).expect("load").expect("present");

        let outcome = run_daily_learning(&store, &config, date(1)).expect("relearn");
        assert_eq!(outcome, LearnOutcome::AlreadyProcessed);

        let model_after = store.load_model(1.0, 1.0).expect("load").expect("present");
        assert_eq!(model_before, model_after);
        assert_eq!(store.score_count().expect("count"), 1);
    }

    #[test]
    fn missing_day_is_a_sentinel_not_an_error() {
        let (_dir, store, config) = setup();
        let outcome = run_daily_learning(&store, &config, date(1)).expect("learn");
        assert_eq!(outcome, LearnOutcome::NoSlotData);
        assert_eq!(store.score_count().expect("count"), 0);
        assert!(store.load_model(1.0, 1.0).expect("load").is_none());
    }

    #[test]
    fn posterior_mass_grows_by_exactly_one_per_day() {
        let (_dir, store, config) = setup();
        for day in 1..=3 {
            write_day(&store, date(day));
            run_daily_learning(&store, &config, date(day)).expect("learn");
        }

        let model = store.load_model(1.0, 1.0).expect("load").expect("present");
        for (_, _, p) in model.iter() {
            // prior mass 2.0 + one observation per processed day
            assert!((p.alpha + p.beta - 5.0).abs() < 1e-12);
        }
    }

    #[test]
    fn metrics_are_computed_against_the_pre_update_model() {
        let (_dir, store, config) = setup();

        // Day 1 trains the model on an all-quiet day.
        store.fill_missing_slots(date(1)).expect("fill");
        run_daily_learning(&store, &config, date(1)).expect("learn");

        // Day 2 identical: under the pre-update model (which saw one quiet
        // day), every cell has p = 1/3, so the NLL is 384 * -ln(2/3).
        store.fill_missing_slots(date(2)).expect("fill");
        let outcome = run_daily_learning(&store, &config, date(2)).expect("learn");
        let LearnOutcome::Processed { metrics, .. } = outcome else {
            panic!("expected Processed");
        };
        let expected_nll = 384.0 * -(2.0f64 / 3.0).ln();
        assert!(
            (metrics.nll_total - expected_nll).abs() < 1e-6,
            "nll_total = {}, expected {}",
            metrics.nll_total,
            expected_nll
        );
    }

    #[test]
    fn learning_flag_clears_after_the_learning_window() {
        let (_dir, store, mut config) = setup();
        config.model.learning_days = 2;

        for day in 1..=3 {
            write_day(&store, date(day));
            run_daily_learning(&store, &config, date(day)).expect("learn");
        }

        assert!(store.score_for(date(1)).expect("r").expect("p").is_learning);
        assert!(store.score_for(date(2)).expect("r").expect("p").is_learning);
        assert!(!store.score_for(date(3)).expect("r").expect("p").is_learning);
    }
}
