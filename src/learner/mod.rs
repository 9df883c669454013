//! Routine learner — Beta-Binomial posterior maintenance and daily metrics.
//!
//! The learner owns `model_state` and the learner-side fields of
//! `daily_scores`. It runs once per night, after the previous day's slot
//! grid is complete.

pub mod beta;
pub mod daily;
pub mod metrics;

pub use beta::{BetaPosterior, BinaryObservable, CredibleLevel, RoutineModel};
pub use daily::{current_ci_width, run_daily_learning, LearnOutcome};
pub use metrics::{calculate_daily_metrics, DailyMetrics};
