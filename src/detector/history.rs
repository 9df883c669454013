//! Rolling normal-day baseline statistics.
//!
//! The scorer compares each day's surprise against the most recent normal,
//! post-learning days. Days that themselves alerted are excluded so one bad
//! week cannot quietly become the new normal.

use chrono::NaiveDate;
use statrs::statistics::Statistics;

use crate::store::{Store, StoreError};

/// Baseline over recent normal days. `ready == false` means the scorer must
/// not use the NLL z-score yet.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryStats {
    pub ready: bool,
    pub mean_nll: f64,
    pub std_nll: f64,
    pub n_days: usize,
}

impl HistoryStats {
    fn not_ready() -> Self {
        Self {
            ready: false,
            mean_nll: 0.0,
            std_nll: 1.0,
            n_days: 0,
        }
    }
}

/// Compute baseline statistics from up to `max_days` recent normal days
/// (`alert_level = 0`, `is_learning = 0`), excluding the day being scored.
/// Fewer than `min_days` qualifying rows means not ready.
pub fn normal_stats(
    store: &Store,
    max_days: i64,
    min_days: i64,
    exclude_date: NaiveDate,
) -> Result<HistoryStats, StoreError> {
    let nlls = store.normal_nll_history(max_days, exclude_date)?;

    if (nlls.len() as i64) < min_days {
        return Ok(HistoryStats::not_ready());
    }

    let mean_nll = nlls.iter().mean();
    let mut std_nll = if nlls.len() > 1 {
        nlls.iter().std_dev()
    } else {
        1.0
    };

    // All-identical history would divide by zero downstream.
    if std_nll == 0.0 {
        std_nll = 1.0;
    }

    Ok(HistoryStats {
        ready: true,
        mean_nll,
        std_nll,
        n_days: nlls.len(),
    })
}
