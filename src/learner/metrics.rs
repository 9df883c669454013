//! Daily metric computation — NLL, count deviation, awake-window accuracy,
//! credible-interval width.
//!
//! Pure computation: takes a day's slot grid and a model, returns numbers.
//! No store access. Callers must pass the PRE-update model; the whole point
//! of the daily NLL is "how much did today surprise yesterday's model".

use crate::learner::beta::{BinaryObservable, RoutineModel};
use crate::types::{Channel, SlotGrid, SLOTS_PER_DAY};

/// All metrics the learner writes into one `daily_scores` row.
#[derive(Debug, Clone, PartialEq)]
pub struct DailyMetrics {
    /// Per-channel surprise, indexed by [`Channel::index`]
    pub nll_per_channel: [f64; Channel::COUNT],
    /// Sum of the per-channel surprises
    pub nll_total: f64,
    /// Expected number of active cells under the model
    pub expected_count: f64,
    /// Observed number of active cells
    pub observed_count: i64,
    /// Normalised count deviation, (observed - expected) / sqrt(variance)
    pub count_z: f64,
    /// Awake-window prediction accuracy
    pub aw_accuracy: f64,
    /// (sensitivity + specificity) / 2 over the awake window
    pub aw_balanced_acc: f64,
    /// Recall on active cells (sensitivity)
    pub aw_active_recall: f64,
    /// Mean 90% credible-interval width across all cells
    pub avg_ci_width: f64,
}

impl DailyMetrics {
    /// Surprise for one channel.
    pub fn nll(&self, channel: Channel) -> f64 {
        self.nll_per_channel[channel.index()]
    }
}

/// Compute every daily metric against the given (pre-update) model.
///
/// `awake_start_slot..awake_end_slot` bounds the accuracy window; slots
/// outside it (night) are excluded from the accuracy triplet only.
pub fn calculate_daily_metrics(
    grid: &SlotGrid,
    model: &RoutineModel,
    awake_start_slot: usize,
    awake_end_slot: usize,
) -> DailyMetrics {
    // a) Per-channel NLL
    let mut nll_per_channel = [0.0; Channel::COUNT];
    for ch in Channel::ALL {
        nll_per_channel[ch.index()] = (0..SLOTS_PER_DAY)
            .map(|s| model.posterior(ch, s).nll(grid.get(ch, s) == 1))
            .sum();
    }
    let nll_total = nll_per_channel.iter().sum();

    // b) Event-count deviation
    let mut expected = 0.0;
    let mut variance = 0.0;
    for (_, _, posterior) in model.iter() {
        let p = posterior.probability();
        expected += p;
        variance += p * (1.0 - p);
    }
    let observed = grid.active_count();
    let count_z = if variance > 0.0 {
        (observed as f64 - expected) / variance.sqrt()
    } else {
        0.0
    };

    // c) Awake-window accuracy
    let (aw_accuracy, aw_balanced_acc, aw_active_recall) =
        awake_accuracy(grid, model, awake_start_slot, awake_end_slot);

    DailyMetrics {
        nll_per_channel,
        nll_total,
        expected_count: expected,
        observed_count: observed,
        count_z,
        aw_accuracy,
        aw_balanced_acc,
        aw_active_recall,
        avg_ci_width: model.avg_ci_width(),
    }
}

/// Accuracy triplet over the awake window. The model predicts a cell active
/// iff its mean is at least 0.5.
fn awake_accuracy(
    grid: &SlotGrid,
    model: &RoutineModel,
    awake_start_slot: usize,
    awake_end_slot: usize,
) -> (f64, f64, f64) {
    let mut tp = 0u32;
    let mut tn = 0u32;
    let mut fp = 0u32;
    let mut fn_ = 0u32;

    for ch in Channel::ALL {
        for s in awake_start_slot..awake_end_slot.min(SLOTS_PER_DAY) {
            let predicted = model.posterior(ch, s).probability() >= 0.5;
            let actual = grid.get(ch, s) == 1;
            match (predicted, actual) {
                (true, true) => tp += 1,
                (false, false) => tn += 1,
                (true, false) => fp += 1,
                (false, true) => fn_ += 1,
            }
        }
    }

    let total = tp + tn + fp + fn_;
    let accuracy = if total > 0 {
        f64::from(tp + tn) / f64::from(total)
    } else {
        0.0
    };
    let sensitivity = if tp + fn_ > 0 {
        f64::from(tp) / f64::from(tp + fn_)
    } else {
        0.0
    };
    let specificity = if tn + fp > 0 {
        f64::from(tn) / f64::from(tn + fp)
    } else {
        0.0
    };

    (accuracy, (sensitivity + specificity) / 2.0, sensitivity)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::learner::beta::BetaPosterior;

    /// A model that is certain presence slot 24 is active and everything
    /// else inactive.
    fn confident_model() -> RoutineModel {
        let mut model = RoutineModel::seeded(1.0, 99.0);
        model.set(Channel::Presence, 24, BetaPosterior::new(99.0, 1.0));
        model
    }

    #[test]
    fn perfect_day_has_low_nll() {
        let model = confident_model();
        let mut grid = SlotGrid::empty();
        grid.set(Channel::Presence, 24, true);

        let m = calculate_daily_metrics(&grid, &model, 24, 92);

        // Every cell matched its prediction: total surprise stays small.
        assert!(m.nll_total < 10.0, "nll_total = {}", m.nll_total);
        assert_eq!(m.observed_count, 1);
        assert!((m.aw_accuracy - 1.0).abs() < 1e-12);
        assert!((m.aw_active_recall - 1.0).abs() < 1e-12);
    }

    #[test]
    fn surprising_day_has_higher_nll_than_expected_day() {
        let model = confident_model();

        let mut expected_grid = SlotGrid::empty();
        expected_grid.set(Channel::Presence, 24, true);
        let expected_m = calculate_daily_metrics(&expected_grid, &model, 24, 92);

        // The one slot the model was sure about stays silent.
        let silent_m = calculate_daily_metrics(&SlotGrid::empty(), &model, 24, 92);

        assert!(silent_m.nll_total > expected_m.nll_total);
        assert!(silent_m.nll(Channel::Presence) > expected_m.nll(Channel::Presence));
    }

    #[test]
    fn count_z_sign_follows_activity_direction() {
        let model = RoutineModel::seeded(5.0, 5.0); // every cell p = 0.5

        let quiet = calculate_daily_metrics(&SlotGrid::empty(), &model, 24, 92);
        assert!(quiet.count_z < 0.0);

        let mut busy_grid = SlotGrid::empty();
        for ch in Channel::ALL {
            for s in 0..SLOTS_PER_DAY {
                busy_grid.set(ch, s, true);
            }
        }
        let busy = calculate_daily_metrics(&busy_grid, &model, 24, 92);
        assert!(busy.count_z > 0.0);

        // expected = 384 * 0.5
        assert!((quiet.expected_count - 192.0).abs() < 1e-9);
        assert_eq!(busy.observed_count, 384);
    }

    #[test]
    fn count_z_stays_finite_for_extreme_models() {
        let model = RoutineModel::seeded(1e9, 1e-9);
        let m = calculate_daily_metrics(&SlotGrid::empty(), &model, 24, 92);
        assert!(m.count_z.is_finite());
    }

    #[test]
    fn balanced_accuracy_penalises_one_sided_predictions() {
        // Model predicts everything inactive; day has a little activity.
        let model = RoutineModel::seeded(1.0, 99.0);
        let mut grid = SlotGrid::empty();
        grid.set(Channel::Presence, 30, true);
        grid.set(Channel::Fridge, 40, true);

        let m = calculate_daily_metrics(&grid, &model, 24, 92);

        // Raw accuracy is high (almost everything is a true negative)...
        assert!(m.aw_accuracy > 0.9);
        // ...but recall on active slots is zero, dragging balanced accuracy
        // to 0.5.
        assert!((m.aw_active_recall - 0.0).abs() < 1e-12);
        assert!((m.aw_balanced_acc - 0.5).abs() < 1e-12);
    }
}
