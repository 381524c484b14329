//! # Mucklan Scheduler
//!
//! Cron-style timing for the household's periodic duties.
//!
//! ## Architecture
//! ```text
//! SchedulerEngine (tokio interval)
//!   ├── Rotation:     "0 10 * * 0"     → weekly cleaning rotation
//!   ├── BillCheck:    "0 15 25 * *"    → rent announcement
//!   ├── BillReminder: "0 13 20-25 * *" → nudge the bill manager
//!   └── on trigger → runner(JobKind)  (one job at a time)
//! ```
//!
//! Slots that pass while the process is down or busy are skipped once the
//! misfire grace has elapsed, never replayed.

pub mod cron;
pub mod engine;
pub mod jobs;

pub use cron::CronSchedule;
pub use engine::{SchedulerEngine, spawn_scheduler};
pub use jobs::{Job, JobKind, jobs_from_config};
