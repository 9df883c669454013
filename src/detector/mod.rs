//! Anomaly detection — daily scoring against a rolling baseline plus
//! real-time silence/fall checks.
//!
//! The detector reads what the learner committed and publishes only to the
//! store; the alert manager re-reads from the store. No in-memory hand-off,
//! so a crash between scoring and alerting loses nothing.

pub mod history;
pub mod realtime;
pub mod scorer;
pub mod thresholds;
pub mod trend;

pub use history::{normal_stats, HistoryStats};
pub use realtime::{
    check_extended_silence, check_fall_suspicion, check_morning_vital_sign, run_realtime_checks,
};
pub use scorer::{score_day, AnomalyOutcome};
pub use thresholds::alert_level;
