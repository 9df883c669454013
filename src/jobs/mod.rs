//! Scheduled job bodies and their registration table.
//!
//! Each job is a thin wrapper over the corresponding subsystem: it supplies
//! the clock, applies the vacation gate where the job is user-facing, and
//! logs-and-swallows failures so one bad cycle never takes down the
//! scheduler or blocks the jobs after it.

pub mod scheduler;

use chrono::{Duration, Local, NaiveDate, NaiveDateTime, Weekday};
use std::sync::Arc;
use tracing::{error, info};

use crate::alerter::{process_inbound, AlertManager, Notifier};
use crate::collector;
use crate::config::AppConfig;
use crate::detector::{realtime, scorer, trend};
use crate::learner;
use crate::store::Store;
use crate::types::Channel;
use self::scheduler::{Schedule, Scheduler};

/// Pending-alert rows older than this are reaped nightly, whatever their
/// status.
const PENDING_ALERT_RETENTION_DAYS: i64 = 30;

/// Everything a job closure needs. Cheap to clone into each task.
#[derive(Clone)]
pub struct JobContext {
    pub store: Store,
    pub config: Arc<AppConfig>,
    pub manager: Arc<AlertManager>,
    pub notifier: Arc<dyn Notifier>,
}

impl JobContext {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }

    fn yesterday(&self) -> NaiveDate {
        self.now().date() - Duration::days(1)
    }

    /// Vacation gate for the user-facing jobs. Defaults to "not on
    /// vacation" if the flag cannot be read — silently skipping the whole
    /// pipeline is the worse failure mode.
    fn on_vacation(&self) -> bool {
        match self.store.vacation_mode(self.config.system.vacation_mode) {
            Ok(on) => on,
            Err(err) => {
                error!(error = %err, "could not read vacation flag");
                false
            }
        }
    }
}

// ============================================================================
// Job bodies
// ============================================================================

/// Close the previous 15-minute slot. The one-minute backdate makes a job
/// firing at :15 aggregate the 00-14 window, not the one just begun.
pub async fn slot_aggregation_job(ctx: &JobContext) {
    let adjusted = ctx.now() - Duration::minutes(1);
    if let Err(err) = collector::aggregate_current_slot(&ctx.store, adjusted) {
        error!(error = %err, "slot aggregation failed");
    }
}

/// 00:05 — zero-fill yesterday's grid so the learner sees all 96x4 cells.
pub async fn fill_missing_slots_job(ctx: &JobContext) {
    let yesterday = ctx.yesterday();
    match ctx.store.fill_missing_slots(yesterday) {
        Ok(inserted) if inserted > 0 => {
            info!(date = %yesterday, inserted, "zero-filled missing slots");
        }
        Ok(_) => {}
        Err(err) => error!(error = %err, "slot zero-fill failed"),
    }
}

/// 00:15 — learn yesterday's routine, unless on vacation.
pub async fn daily_learning_job(ctx: &JobContext) {
    if ctx.on_vacation() {
        info!("vacation mode active, skipping daily learning");
        return;
    }
    if let Err(err) = learner::run_daily_learning(&ctx.store, &ctx.config, ctx.yesterday()) {
        error!(error = %err, "daily learning failed");
    }
}

/// 00:20 — score yesterday, then let the alert manager act on the result.
pub async fn daily_scoring_job(ctx: &JobContext) {
    if ctx.on_vacation() {
        info!("vacation mode active, skipping daily scoring");
        return;
    }
    let yesterday = ctx.yesterday();
    if let Err(err) = scorer::score_day(&ctx.store, &ctx.config, yesterday) {
        error!(error = %err, "daily scoring failed");
        return;
    }
    ctx.manager.handle_daily_score(yesterday, ctx.now()).await;
    ctx.manager.handle_learning_milestone(ctx.now()).await;
}

/// Every 30 minutes — silence and fall checks.
pub async fn realtime_checks_job(ctx: &JobContext) {
    if ctx.on_vacation() {
        return;
    }
    let now = ctx.now();
    match realtime::run_realtime_checks(&ctx.store, &ctx.config, now) {
        Ok(alerts) => {
            for alert in alerts {
                info!(kind = %alert.kind, level = alert.level, "real-time alert raised");
                ctx.manager.handle_realtime_alert(&alert, now).await;
            }
        }
        Err(err) => error!(error = %err, "real-time checks failed"),
    }
}

/// 22:00 — the daily summary message.
pub async fn daily_summary_job(ctx: &JobContext) {
    if ctx.on_vacation() {
        info!("vacation mode active, skipping daily summary");
        return;
    }
    ctx.manager.handle_daily_summary(ctx.now()).await;
}

/// Every 2 minutes — escalate unacknowledged emergency alerts.
pub async fn escalation_check_job(ctx: &JobContext) {
    if let Err(err) = ctx.manager.escalate_expired(ctx.now()).await {
        error!(error = %err, "escalation check failed");
    }
}

/// 03:00 — retention cleanup and a WAL checkpoint.
pub async fn nightly_maintenance_job(ctx: &JobContext) {
    let now = ctx.now();
    let events = match ctx
        .store
        .cleanup_old_events(ctx.config.database.retention_days, now)
    {
        Ok(deleted) => deleted,
        Err(err) => {
            error!(error = %err, "event retention cleanup failed");
            0
        }
    };
    let alerts = match ctx
        .store
        .cleanup_old_pending_alerts(now - Duration::days(PENDING_ALERT_RETENTION_DAYS))
    {
        Ok(deleted) => deleted,
        Err(err) => {
            error!(error = %err, "pending alert cleanup failed");
            0
        }
    };
    if let Err(err) = ctx.store.run_maintenance() {
        error!(error = %err, "store maintenance failed");
    }
    info!(events, alerts, "nightly maintenance complete");
}

/// Sunday 10:00 — long-horizon frailty trend report.
pub async fn weekly_trend_job(ctx: &JobContext) {
    let trends = match trend::analyze_all_trends(
        &ctx.store,
        ctx.config.system.trend_analysis_days,
        ctx.config.system.trend_min_days,
        ctx.now(),
    ) {
        Ok(trends) => trends,
        Err(err) => {
            error!(error = %err, "trend analysis failed");
            return;
        }
    };

    match compose_trend_report(&trends, &ctx.config) {
        Some(report) => {
            ctx.notifier.send_to_all(&report).await;
            info!("weekly frailty report sent");
        }
        None => info!("weekly frailty report: trends normal, nothing to send"),
    }
}

/// Every 30 seconds — drain inbound acks and commands.
pub async fn inbound_poll_job(ctx: &JobContext) {
    if let Err(err) = process_inbound(&*ctx.notifier, &ctx.store, &ctx.config, ctx.now()).await {
        error!(error = %err, "inbound processing failed");
    }
}

/// Render the weekly report, or `None` when no trend crosses its threshold.
fn compose_trend_report(
    trends: &std::collections::HashMap<Channel, f64>,
    config: &AppConfig,
) -> Option<String> {
    let window = config.system.trend_analysis_days;
    let mut sections = Vec::new();

    if let Some(&slope) = trends.get(&Channel::Bathroom) {
        if slope > config.system.trend_bathroom_threshold {
            sections.push(format!(
                "📈 Bathroom usage has been trending up over the last {window} days \
                 (slope: +{slope:.2}). This can be an early sign of a urinary or \
                 digestive issue."
            ));
        }
    }
    if let Some(&slope) = trends.get(&Channel::Presence) {
        if slope < config.system.trend_presence_threshold {
            sections.push(format!(
                "📉 Overall movement around the home has been trending down over the \
                 last {window} days (slope: {slope:.2}). This can be an early sign of \
                 fatigue or low spirits."
            ));
        }
    }

    if sections.is_empty() {
        None
    } else {
        Some(format!(
            "🏥 <b>Weekly Frailty Report</b>\n\n{}",
            sections.join("\n\n")
        ))
    }
}

// ============================================================================
// Registration
// ============================================================================

/// Wire every job to its trigger. The daily pipeline order (fill 00:05 →
/// learn 00:15 → score 00:20) is guaranteed by the wall-clock offsets.
pub fn register_all(scheduler: &mut Scheduler, ctx: &JobContext) {
    macro_rules! job {
        ($id:literal, $schedule:expr, $body:ident) => {{
            let ctx = ctx.clone();
            scheduler.register($id, $schedule, move || {
                let ctx = ctx.clone();
                async move { $body(&ctx).await }
            });
        }};
    }

    job!("slot_aggregator", Schedule::EveryMinutes(15), slot_aggregation_job);
    job!("fill_missing_slots", Schedule::Daily { hour: 0, minute: 5 }, fill_missing_slots_job);
    job!("daily_learning", Schedule::Daily { hour: 0, minute: 15 }, daily_learning_job);
    job!("daily_scoring", Schedule::Daily { hour: 0, minute: 20 }, daily_scoring_job);
    job!("realtime_checks", Schedule::EveryMinutes(30), realtime_checks_job);
    job!("daily_summary", Schedule::Daily { hour: 22, minute: 0 }, daily_summary_job);
    job!("escalation_check", Schedule::EveryMinutes(2), escalation_check_job);
    job!("nightly_maintenance", Schedule::Daily { hour: 3, minute: 0 }, nightly_maintenance_job);
    job!(
        "weekly_trend",
        Schedule::Weekly {
            weekday: Weekday::Sun,
            hour: 10,
            minute: 0
        },
        weekly_trend_job
    );
    job!("inbound_poll", Schedule::EverySeconds(30), inbound_poll_job);
}
