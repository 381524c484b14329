//! # Mucklan Agent
//!
//! The household assistant: owns the configuration, the chat channel, the
//! document reader and the state store, and carries out each duty.
//!
//! - **Rotation**: assign areas, save the next counter, DM everyone, announce.
//! - **Bill check**: read this month's PDF bills, split the rent, announce it.
//! - **Reminder**: nudge the bill manager while no bills are posted.
//! - **Commands**: `"<prefix> räkningar"` / `"<prefix> bills"` run a bill check.

pub mod command;
pub mod household;

pub use command::{Command, parse_command};
pub use household::{BillCheckOutcome, Household, ReminderOutcome, RotationOutcome, month_start};
