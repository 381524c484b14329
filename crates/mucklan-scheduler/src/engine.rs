//! Scheduler Engine: checks job slots and fires due duties.
//! Uses tokio::interval for ticking (sleeps between checks).
//! Jobs fire one at a time, so two rotations can never overlap.

use std::future::Future;

use chrono::{Duration, Local, NaiveDateTime};
use mucklan_core::error::Result;
use tokio::time::MissedTickBehavior;

use crate::jobs::{Job, JobKind};

/// The scheduler engine: owns the jobs and decides which ones fire.
pub struct SchedulerEngine {
    jobs: Vec<Job>,
    misfire_grace: Duration,
}

impl SchedulerEngine {
    /// Create an engine and compute every job's first slot after `now`.
    pub fn new(jobs: Vec<Job>, misfire_grace_secs: u64, now: NaiveDateTime) -> Self {
        let mut engine = Self {
            jobs,
            misfire_grace: Duration::seconds(misfire_grace_secs as i64),
        };
        for job in engine.jobs.iter_mut() {
            job.next_run = job.schedule.next_after(now);
            match job.next_run {
                Some(next) => tracing::info!("📅 Job '{}' ({}) next at {}", job.kind, job.schedule, next),
                None => tracing::warn!("⚠️ Job '{}' ({}) never fires", job.kind, job.schedule),
            }
        }
        engine
    }

    /// List all jobs.
    pub fn jobs(&self) -> &[Job] {
        &self.jobs
    }

    /// Earliest upcoming slot among enabled jobs.
    pub fn next_due(&self) -> Option<(JobKind, NaiveDateTime)> {
        self.jobs
            .iter()
            .filter(|j| j.enabled)
            .filter_map(|j| j.next_run.map(|n| (j.kind, n)))
            .min_by_key(|(_, n)| *n)
    }

    /// Tick: called periodically. Returns the jobs to run now, in job order.
    ///
    /// A slot noticed more than the misfire grace after it passed is skipped,
    /// not run late. Either way the job moves on to its next slot after `now`,
    /// so a long pause never produces a burst of catch-up runs.
    pub fn tick(&mut self, now: NaiveDateTime) -> Vec<JobKind> {
        let mut fired = Vec::new();

        for job in self.jobs.iter_mut() {
            if !job.is_due(now) {
                continue;
            }
            let Some(slot) = job.next_run else { continue };

            if now - slot > self.misfire_grace {
                job.missed_count += 1;
                tracing::warn!(
                    "⏭️ Job '{}' missed its {} slot by {}s, skipping",
                    job.kind,
                    slot,
                    (now - slot).num_seconds()
                );
            } else {
                tracing::info!("🔔 Job triggered: '{}'", job.kind);
                job.run_count += 1;
                fired.push(job.kind);
            }
            job.next_run = job.schedule.next_after(now);
        }

        fired
    }
}

/// Run the scheduler loop until the surrounding task is dropped.
///
/// `runner` performs one duty and returns a short summary for the log.
/// Failures are logged and the loop keeps going.
pub async fn spawn_scheduler<F, Fut>(mut engine: SchedulerEngine, runner: F, check_interval_secs: u64)
where
    F: Fn(JobKind) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<String>> + Send,
{
    tracing::info!("⏰ Scheduler started (check every {}s)", check_interval_secs);

    let mut interval = tokio::time::interval(std::time::Duration::from_secs(check_interval_secs));
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        interval.tick().await;

        let fired = engine.tick(Local::now().naive_local());
        for kind in fired {
            match runner(kind).await {
                Ok(summary) => tracing::info!("✅ [{}] {}", kind, summary),
                Err(e) => tracing::warn!("⚠️ [{}] failed: {}", kind, e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(d: u32, h: u32, mi: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, d)
            .unwrap()
            .and_hms_opt(h, mi, s)
            .unwrap()
    }

    fn engine(now: NaiveDateTime) -> SchedulerEngine {
        let jobs = vec![
            Job::new(JobKind::BillCheck, "0 15 25 * *").unwrap(),
            Job::new(JobKind::BillReminder, "0 13 20-25 * *").unwrap(),
        ];
        SchedulerEngine::new(jobs, 300, now)
    }

    #[test]
    fn test_next_slots_on_start() {
        let engine = engine(at(19, 12, 0, 0));
        assert_eq!(engine.jobs()[0].next_run, Some(at(25, 15, 0, 0)));
        assert_eq!(engine.jobs()[1].next_run, Some(at(20, 13, 0, 0)));
        assert_eq!(engine.next_due(), Some((JobKind::BillReminder, at(20, 13, 0, 0))));
    }

    #[test]
    fn test_tick_fires_due_job_once() {
        let mut engine = engine(at(19, 12, 0, 0));
        assert!(engine.tick(at(20, 12, 59, 50)).is_empty());

        assert_eq!(engine.tick(at(20, 13, 0, 10)), vec![JobKind::BillReminder]);
        assert!(engine.tick(at(20, 13, 0, 30)).is_empty());
        assert_eq!(engine.jobs()[1].run_count, 1);
        assert_eq!(engine.jobs()[1].next_run, Some(at(21, 13, 0, 0)));
    }

    #[test]
    fn test_late_within_grace_still_fires() {
        let mut engine = engine(at(19, 12, 0, 0));
        assert_eq!(engine.tick(at(20, 13, 4, 59)), vec![JobKind::BillReminder]);
    }

    #[test]
    fn test_misfire_is_skipped_and_rescheduled() {
        let mut engine = engine(at(19, 12, 0, 0));
        assert!(engine.tick(at(20, 13, 5, 1)).is_empty());
        let reminder = &engine.jobs()[1];
        assert_eq!(reminder.missed_count, 1);
        assert_eq!(reminder.run_count, 0);
        assert_eq!(reminder.next_run, Some(at(21, 13, 0, 0)));
    }

    #[test]
    fn test_long_pause_does_not_burst() {
        let mut engine = engine(at(19, 12, 0, 0));
        // Asleep from the 19th to the 25th just after 15:00: one run each at most.
        let fired = engine.tick(at(25, 15, 1, 0));
        assert_eq!(fired, vec![JobKind::BillCheck]);
        assert_eq!(engine.jobs()[1].missed_count, 1);
    }

    #[test]
    fn test_disabled_job_never_fires() {
        let mut reminder = Job::new(JobKind::BillReminder, "0 13 20-25 * *").unwrap();
        reminder.enabled = false;
        let jobs = vec![Job::new(JobKind::BillCheck, "0 15 25 * *").unwrap(), reminder];
        let mut engine = SchedulerEngine::new(jobs, 300, at(19, 12, 0, 0));
        assert!(engine.tick(at(20, 13, 0, 0)).is_empty());
        assert_eq!(engine.next_due(), Some((JobKind::BillCheck, at(25, 15, 0, 0))));
    }
}
