//! CAREWATCH: Home Routine Intelligence
//!
//! Watches a single elderly person's home through a handful of presence and
//! contact sensors, learns the daily routine, and notifies caregivers when
//! something deviates.
//!
//! ## Architecture
//!
//! - **Learner**: Beta-Binomial posterior per (slot, channel), updated nightly
//! - **Detector**: one-sided composite risk against a rolling normal-day
//!   baseline, plus real-time silence/fall checks
//! - **Alerter**: rate-limited, tiered notifications with dead-man's-switch
//!   escalation over Telegram
//! - **Scheduler**: wall-clock local-time job dispatch

pub mod alerter;
pub mod collector;
pub mod config;
pub mod detector;
pub mod jobs;
pub mod learner;
pub mod store;
pub mod types;

// Re-export the configuration root
pub use config::AppConfig;

// Re-export commonly used types
pub use types::{AlertKind, Channel, RealtimeAlert, SensorEvent, SlotGrid, SLOTS_PER_DAY};

// Re-export the store handle
pub use store::{AlertStatus, DailyScore, PendingAlert, Store, StoreError};

// Re-export learner components
pub use learner::{BetaPosterior, BinaryObservable, CredibleLevel, DailyMetrics, RoutineModel};

// Re-export detector components
pub use detector::{AnomalyOutcome, HistoryStats};

// Re-export alerting components
pub use alerter::{AlertManager, Notifier, RecordingNotifier, TelegramNotifier};
