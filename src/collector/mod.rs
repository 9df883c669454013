//! Event intake and 15-minute slot aggregation.
//!
//! The MQTT transport lives outside this process; what it must do on every
//! accepted event is captured by [`record_event`]. The aggregator rolls
//! events up into `slot_summary` on the quarter hour, and the nightly
//! zero-fill guarantees every completed day has all 96x4 cells.

use chrono::{Duration, NaiveDateTime, Timelike};
use tracing::{debug, info};

use crate::store::{fmt_ts, keys, Store, StoreError};
use crate::types::{slot_of, Channel, SensorEvent};

/// Persist an accepted, debounced event and maintain the fall-tracking
/// state: a bathroom event arms it, any other channel disarms it (the
/// resident evidently left the bathroom).
pub fn record_event(store: &Store, event: &SensorEvent) -> Result<(), StoreError> {
    store.insert_event(event)?;

    if event.channel == Channel::Bathroom {
        store.set_state(keys::LAST_BATHROOM_TIME, &fmt_ts(event.timestamp))?;
    } else {
        let armed = store
            .state(keys::LAST_BATHROOM_TIME)?
            .is_some_and(|v| !v.is_empty());
        if armed {
            store.set_state(keys::LAST_BATHROOM_TIME, "")?;
        }
    }
    Ok(())
}

/// Aggregate the slot containing `now` into `slot_summary`, upserting every
/// channel (zero-filled when quiet).
///
/// The scheduler calls this with `now - 1 minute`: a job firing at :15
/// must summarise the 00-14 window, not the one that just began. If the job
/// fires more than a minute late, a few events may land in the next slot —
/// accepted drift.
pub fn aggregate_current_slot(store: &Store, now: NaiveDateTime) -> Result<(), StoreError> {
    let date = now.date();
    let slot = slot_of(now);
    let slot_start = now
        .date()
        .and_hms_opt(now.hour(), (now.minute() / 15) * 15, 0)
        .unwrap_or(now);
    let slot_end = slot_start + Duration::minutes(15);

    let counts = store.channel_counts_between(slot_start, slot_end)?;
    for channel in Channel::ALL {
        let count = counts.get(&channel).copied().unwrap_or(0);
        store.upsert_slot(date, slot, channel, count)?;
    }

    if counts.is_empty() {
        debug!(date = %date, slot, "slot closed quiet");
    } else {
        info!(date = %date, slot, channels = counts.len(), "slot summary updated");
    }
    Ok(())
}
