//! Wall-clock job scheduler.
//!
//! One spawned task per job. Each task sleeps until the next local-time
//! trigger, runs the job to completion, then computes the following trigger.
//! Because the next fire is computed only after the run returns, a job is
//! always serial with itself: any instance that would overlap an in-flight
//! run simply does not happen.

use chrono::{DateTime, Datelike, Duration, Local, NaiveDateTime, Timelike, Weekday};
use futures::future::BoxFuture;
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Minutes in a day.
const DAY_MINUTES: u32 = 24 * 60;

/// When a job should fire, in local wall-clock terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schedule {
    /// Every day at `hour:minute`.
    Daily { hour: u32, minute: u32 },
    /// On every minute boundary where `minutes_since_midnight % n == 0`.
    /// `n` must divide 60 for hour-aligned firing (15 → :00 :15 :30 :45).
    EveryMinutes(u32),
    /// Free-running interval, unaligned. For pollers.
    EverySeconds(i64),
    /// Once a week, e.g. Sunday 10:00.
    Weekly {
        weekday: Weekday,
        hour: u32,
        minute: u32,
    },
}

impl Schedule {
    /// The first trigger strictly after `now` (pure wall-clock arithmetic).
    pub fn next_naive_after(&self, now: NaiveDateTime) -> NaiveDateTime {
        match *self {
            Schedule::Daily { hour, minute } => {
                let today = at(now.date(), hour, minute);
                if today > now {
                    today
                } else {
                    at(now.date() + Duration::days(1), hour, minute)
                }
            }
            Schedule::EveryMinutes(n) => {
                let n = n.max(1);
                let elapsed = now.hour() * 60 + now.minute();
                let next = (elapsed / n + 1) * n;
                if next >= DAY_MINUTES {
                    at(now.date() + Duration::days(1), 0, 0)
                } else {
                    at(now.date(), next / 60, next % 60)
                }
            }
            Schedule::EverySeconds(secs) => now + Duration::seconds(secs.max(1)),
            Schedule::Weekly {
                weekday,
                hour,
                minute,
            } => {
                let days_ahead = i64::from(
                    (7 + weekday.num_days_from_monday()
                        - now.date().weekday().num_days_from_monday())
                        % 7,
                );
                let candidate = at(now.date() + Duration::days(days_ahead), hour, minute);
                if candidate > now {
                    candidate
                } else {
                    candidate + Duration::days(7)
                }
            }
        }
    }

    /// The next trigger in local time, stepping over DST gaps if the naive
    /// instant does not exist.
    pub fn next_after(&self, now: DateTime<Local>) -> DateTime<Local> {
        let mut naive = self.next_naive_after(now.naive_local());
        for _ in 0..4 {
            match naive.and_local_timezone(Local) {
                chrono::LocalResult::Single(dt) | chrono::LocalResult::Ambiguous(dt, _) => {
                    return dt;
                }
                chrono::LocalResult::None => naive += Duration::hours(1),
            }
        }
        now + Duration::hours(1)
    }
}

fn at(date: chrono::NaiveDate, hour: u32, minute: u32) -> NaiveDateTime {
    date.and_hms_opt(hour, minute, 0).unwrap_or_default()
}

// ============================================================================
// Scheduler
// ============================================================================

type JobFn = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

struct Job {
    id: &'static str,
    schedule: Schedule,
    run: JobFn,
}

/// Registry of scheduled jobs; consumed by [`Scheduler::spawn_all`].
#[derive(Default)]
pub struct Scheduler {
    jobs: Vec<Job>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a job. The closure is re-invoked for every trigger.
    pub fn register<F, Fut>(&mut self, id: &'static str, schedule: Schedule, job: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        self.jobs.push(Job {
            id,
            schedule,
            run: Arc::new(move || Box::pin(job())),
        });
    }

    /// Spawn one supervised task per job. Tasks run until cancelled.
    pub fn spawn_all(self, tasks: &mut JoinSet<&'static str>, cancel: &CancellationToken) {
        info!(jobs = self.jobs.len(), "scheduler starting");
        for job in self.jobs {
            let cancel = cancel.clone();
            tasks.spawn(async move {
                loop {
                    let next = job.schedule.next_after(Local::now());
                    let wait = (next - Local::now())
                        .to_std()
                        .unwrap_or(std::time::Duration::ZERO);
                    debug!(id = job.id, next = %next, "job sleeping until next trigger");

                    tokio::select! {
                        _ = cancel.cancelled() => {
                            info!(id = job.id, "job shutting down");
                            return job.id;
                        }
                        _ = tokio::time::sleep(wait) => {
                            debug!(id = job.id, "job firing");
                            (job.run)().await;
                        }
                    }
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn dt(day: u32, h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 3, day)
            .and_then(|d| d.and_hms_opt(h, m, s))
            .expect("valid time")
    }

    #[test]
    fn daily_fires_today_or_tomorrow() {
        let schedule = Schedule::Daily { hour: 0, minute: 15 };
        assert_eq!(schedule.next_naive_after(dt(20, 0, 0, 0)), dt(20, 0, 15, 0));
        assert_eq!(schedule.next_naive_after(dt(20, 0, 15, 0)), dt(21, 0, 15, 0));
        assert_eq!(schedule.next_naive_after(dt(20, 23, 59, 59)), dt(21, 0, 15, 0));
    }

    #[test]
    fn every_fifteen_minutes_aligns_to_quarter_hours() {
        let schedule = Schedule::EveryMinutes(15);
        assert_eq!(schedule.next_naive_after(dt(20, 10, 0, 0)), dt(20, 10, 15, 0));
        assert_eq!(schedule.next_naive_after(dt(20, 10, 14, 59)), dt(20, 10, 15, 0));
        assert_eq!(schedule.next_naive_after(dt(20, 10, 15, 0)), dt(20, 10, 30, 0));
        assert_eq!(schedule.next_naive_after(dt(20, 23, 50, 0)), dt(21, 0, 0, 0));
    }

    #[test]
    fn every_two_minutes_rolls_within_the_hour() {
        let schedule = Schedule::EveryMinutes(2);
        assert_eq!(schedule.next_naive_after(dt(20, 9, 57, 30)), dt(20, 9, 58, 0));
        assert_eq!(schedule.next_naive_after(dt(20, 9, 58, 0)), dt(20, 10, 0, 0));
    }

    #[test]
    fn weekly_finds_the_right_sunday() {
        // 2025-03-20 is a Thursday; the next Sunday is the 23rd.
        let schedule = Schedule::Weekly {
            weekday: Weekday::Sun,
            hour: 10,
            minute: 0,
        };
        assert_eq!(schedule.next_naive_after(dt(20, 9, 0, 0)), dt(23, 10, 0, 0));
        // On Sunday after the trigger: a week later.
        assert_eq!(schedule.next_naive_after(dt(23, 10, 0, 0)), dt(30, 10, 0, 0));
        // On Sunday before the trigger: later today.
        assert_eq!(schedule.next_naive_after(dt(23, 8, 0, 0)), dt(23, 10, 0, 0));
    }

    #[test]
    fn every_seconds_is_free_running() {
        let schedule = Schedule::EverySeconds(30);
        assert_eq!(schedule.next_naive_after(dt(20, 10, 0, 7)), dt(20, 10, 0, 37));
    }

    #[tokio::test(start_paused = true)]
    async fn spawned_jobs_stop_on_cancel() {
        let mut scheduler = Scheduler::new();
        scheduler.register("noop", Schedule::EverySeconds(3600), || async {});

        let cancel = CancellationToken::new();
        let mut tasks = JoinSet::new();
        scheduler.spawn_all(&mut tasks, &cancel);

        cancel.cancel();
        let finished = tasks.join_next().await.expect("one task").expect("no panic");
        assert_eq!(finished, "noop");
    }
}
