//! Long-horizon frailty trends — weekly OLS slope per channel.
//!
//! Looks for slow drifts the daily scorer is blind to: a creeping rise in
//! bathroom visits or a creeping decline in general movement over weeks.
//! Plain least squares over daily event counts, missing days zero-filled so
//! a quiet week cannot silently shorten the series.

use chrono::{Duration, NaiveDateTime};
use std::collections::HashMap;

use crate::store::{Store, StoreError};
use crate::types::{Channel, DATE_FORMAT};

/// OLS slope of `values` against x = 0..n-1.
pub fn linear_regression_slope(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }
    let x_mean = (n - 1) as f64 / 2.0;
    let y_mean = values.iter().sum::<f64>() / n as f64;
    let mut numerator = 0.0;
    let mut denominator = 0.0;
    for (i, y) in values.iter().enumerate() {
        let dx = i as f64 - x_mean;
        numerator += dx * (y - y_mean);
        denominator += dx * dx;
    }
    if denominator == 0.0 {
        0.0
    } else {
        numerator / denominator
    }
}

/// Daily event counts for one channel over the trailing window, oldest
/// first, calendar-complete (days without events contribute 0).
fn daily_counts(
    store: &Store,
    channel: Channel,
    days: i64,
    now: NaiveDateTime,
) -> Result<Vec<f64>, StoreError> {
    let today = now.date();
    let from = today - Duration::days(days);
    let by_day = store.daily_event_counts(channel, from)?;

    let mut series = Vec::with_capacity(days as usize);
    for offset in 0..days {
        let day = from + Duration::days(offset);
        let key = day.format(DATE_FORMAT).to_string();
        series.push(*by_day.get(&key).unwrap_or(&0) as f64);
    }
    Ok(series)
}

/// Per-channel trend slopes over the trailing window. A channel is omitted
/// when fewer than `min_days` of its window have any events at all — a
/// regression over an empty series says nothing.
pub fn analyze_all_trends(
    store: &Store,
    days: i64,
    min_days: i64,
    now: NaiveDateTime,
) -> Result<HashMap<Channel, f64>, StoreError> {
    let mut trends = HashMap::new();
    for channel in Channel::ALL {
        let series = daily_counts(store, channel, days, now)?;
        let populated = series.iter().filter(|&&v| v > 0.0).count() as i64;
        if populated < min_days {
            continue;
        }
        trends.insert(channel, linear_regression_slope(&series));
    }
    Ok(trends)
}
