//! Cron expression parser.
//! Supports: "MIN HOUR DOM MON DOW" (5-field, no seconds)
//! Items: *, */N, N, A-B, A-B/N, N/S, comma lists; month and weekday names.
//! Weekdays are 0-6 from Sunday (7 is also Sunday).
//! Example: "0 13 20-25 * *" = 13:00 on the 20th to the 25th of every month
//!
//! Day matching follows classic cron: when both DOM and DOW are restricted,
//! a day matching either one qualifies.

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, Timelike};
use mucklan_core::error::{MucklanError, Result};

/// Long enough to reach the next Feb 29 across a skipped leap year.
const MAX_SEARCH_DAYS: u32 = 366 * 9;

const MONTH_NAMES: [&str; 12] = [
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];
const DAY_NAMES: [&str; 7] = ["sun", "mon", "tue", "wed", "thu", "fri", "sat"];

/// A parsed cron expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronSchedule {
    expression: String,
    minutes: u64,
    hours: u64,
    days_of_month: u64,
    months: u64,
    days_of_week: u64,
    dom_restricted: bool,
    dow_restricted: bool,
}

impl CronSchedule {
    pub fn parse(expression: &str) -> Result<Self> {
        let parts: Vec<&str> = expression.split_whitespace().collect();
        if parts.len() != 5 {
            return Err(MucklanError::Schedule(format!(
                "invalid cron expression '{expression}' (need 5 fields: MIN HOUR DOM MON DOW)"
            )));
        }

        let field = |idx: usize, min: u32, max: u32, names: &[&str]| {
            parse_field(parts[idx], min, max, names).map_err(|e| {
                MucklanError::Schedule(format!("cron '{expression}' field {}: {e}", idx + 1))
            })
        };

        let minutes = field(0, 0, 59, &[])?;
        let hours = field(1, 0, 23, &[])?;
        let days_of_month = field(2, 1, 31, &[])?;
        let months = field(3, 1, 12, &MONTH_NAMES)?;
        let mut days_of_week = field(4, 0, 7, &DAY_NAMES)?;
        if days_of_week & (1u64 << 7) != 0 {
            days_of_week = (days_of_week & !(1u64 << 7)) | 1;
        }

        Ok(Self {
            expression: expression.to_string(),
            minutes,
            hours,
            days_of_month,
            months,
            days_of_week,
            dom_restricted: !parts[2].starts_with('*'),
            dow_restricted: !parts[4].starts_with('*'),
        })
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// First matching minute strictly after `after`.
    pub fn next_after(&self, after: NaiveDateTime) -> Option<NaiveDateTime> {
        let start = (after + Duration::minutes(1))
            .with_second(0)?
            .with_nanosecond(0)?;
        let mut date = start.date();

        for _ in 0..MAX_SEARCH_DAYS {
            if self.day_matches(date) {
                let first_day = date == start.date();
                let h0 = if first_day { start.hour() } else { 0 };
                for h in (h0..24).filter(|h| has(self.hours, *h)) {
                    let m0 = if first_day && h == start.hour() { start.minute() } else { 0 };
                    if let Some(m) = (m0..60).find(|m| has(self.minutes, *m)) {
                        return date.and_hms_opt(h, m, 0);
                    }
                }
            }
            date = date.succ_opt()?;
        }
        None
    }

    /// Whether `at` (minute resolution) is a scheduled slot.
    pub fn matches(&self, at: NaiveDateTime) -> bool {
        self.day_matches(at.date()) && has(self.hours, at.hour()) && has(self.minutes, at.minute())
    }

    fn day_matches(&self, date: NaiveDate) -> bool {
        if !has(self.months, date.month()) {
            return false;
        }
        let dom = has(self.days_of_month, date.day());
        let dow = has(self.days_of_week, date.weekday().num_days_from_sunday());
        match (self.dom_restricted, self.dow_restricted) {
            (true, true) => dom || dow,
            _ => dom && dow,
        }
    }
}

impl std::fmt::Display for CronSchedule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.expression)
    }
}

fn has(mask: u64, value: u32) -> bool {
    mask & (1u64 << value) != 0
}

/// Parse a cron field into a bitmask of matching values.
fn parse_field(field: &str, min: u32, max: u32, names: &[&str]) -> std::result::Result<u64, String> {
    let mut mask = 0u64;
    for item in field.split(',') {
        let (range, step) = match item.split_once('/') {
            Some((r, s)) => {
                let step: u32 = s.parse().map_err(|_| format!("bad step '{s}'"))?;
                if step == 0 {
                    return Err("step must be positive".into());
                }
                (r, step)
            }
            None => (item, 1),
        };

        let (lo, hi) = if range == "*" {
            (min, max)
        } else if let Some((a, b)) = range.split_once('-') {
            (value(a, min, max, names)?, value(b, min, max, names)?)
        } else {
            let v = value(range, min, max, names)?;
            // "N/S" runs from N to the end of the range.
            if item.contains('/') { (v, max) } else { (v, v) }
        };
        if lo > hi {
            return Err(format!("empty range '{range}'"));
        }

        for v in (lo..=hi).step_by(step as usize) {
            mask |= 1u64 << v;
        }
    }
    Ok(mask)
}

fn value(token: &str, min: u32, max: u32, names: &[&str]) -> std::result::Result<u32, String> {
    let lower = token.to_ascii_lowercase();
    let v = match names.iter().position(|n| *n == lower) {
        // Month names start at 1, weekday names at 0.
        Some(idx) => idx as u32 + min,
        None => token.parse().map_err(|_| format!("bad value '{token}'"))?,
    };
    if v < min || v > max {
        return Err(format!("{v} out of range {min}-{max}"));
    }
    Ok(v)
}
