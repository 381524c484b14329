//! Job definitions: the periodic duties and when they run.

use chrono::NaiveDateTime;
use mucklan_core::config::MucklanConfig;
use mucklan_core::error::Result;
use serde::{Deserialize, Serialize};

use crate::cron::CronSchedule;

/// The duties the household assistant performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// Advance the cleaning rotation and DM everyone their area.
    Rotation,
    /// Read this month's bills and announce the rent.
    BillCheck,
    /// Nudge the bill manager if no bills are posted yet.
    BillReminder,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Rotation => "rotation",
            JobKind::BillCheck => "bill_check",
            JobKind::BillReminder => "bill_reminder",
        }
    }
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A scheduled duty.
#[derive(Debug, Clone)]
pub struct Job {
    pub kind: JobKind,
    pub schedule: CronSchedule,
    /// Next slot, local time. `None` when the schedule never fires again.
    pub next_run: Option<NaiveDateTime>,
    pub run_count: u32,
    pub missed_count: u32,
    pub enabled: bool,
}

impl Job {
    /// Create a job from a cron expression. `next_run` is set when the engine starts.
    pub fn new(kind: JobKind, expression: &str) -> Result<Self> {
        Ok(Self {
            kind,
            schedule: CronSchedule::parse(expression)?,
            next_run: None,
            run_count: 0,
            missed_count: 0,
            enabled: true,
        })
    }

    /// Check if this job's slot has arrived.
    pub fn is_due(&self, now: NaiveDateTime) -> bool {
        if !self.enabled {
            return false;
        }
        match self.next_run {
            Some(next) => now >= next,
            None => false,
        }
    }
}

/// Jobs for every duty present in the configuration.
pub fn jobs_from_config(config: &MucklanConfig) -> Result<Vec<Job>> {
    let mut jobs = Vec::new();
    if let Some(chores) = &config.chores {
        jobs.push(Job::new(JobKind::Rotation, &chores.schedule)?);
    }
    if let Some(bills) = &config.bills {
        jobs.push(Job::new(JobKind::BillCheck, &bills.announce_schedule)?);
        jobs.push(Job::new(JobKind::BillReminder, &bills.reminder_schedule)?);
    }
    Ok(jobs)
}
