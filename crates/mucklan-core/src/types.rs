//! Shared value types: residents, money, chat messages and attachments.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque chat account handle of a resident.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResidentId(pub String);

impl ResidentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResidentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ResidentId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Currency amount stored as minor units (öre, cents).
///
/// Two-decimal precision throughout. Arithmetic is checked: sums and
/// differences of amounts read from documents or config go through the
/// `checked_*` methods, which return `None` on overflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    pub const ZERO: Money = Money(0);

    pub const fn from_minor(minor: i64) -> Self {
        Self(minor)
    }

    /// Whole-unit literal. Panics on overflow; untrusted values use
    /// [`Money::checked_from_major`].
    pub const fn from_major(major: i64) -> Self {
        Self(major * 100)
    }

    pub fn checked_from_major(major: i64) -> Option<Self> {
        major.checked_mul(100).map(Money)
    }

    pub const fn minor(self) -> i64 {
        self.0
    }

    /// Whole major units, truncated toward zero.
    pub const fn major(self) -> i64 {
        self.0 / 100
    }

    /// Fractional part in minor units (always non-negative).
    pub const fn cents(self) -> i64 {
        (self.0 % 100).abs()
    }

    pub fn checked_add(self, other: Money) -> Option<Money> {
        self.0.checked_add(other.0).map(Money)
    }

    pub fn checked_sub(self, other: Money) -> Option<Money> {
        self.0.checked_sub(other.0).map(Money)
    }

    pub fn checked_mul(self, factor: i64) -> Option<Money> {
        self.0.checked_mul(factor).map(Money)
    }

    /// Sum of `amounts`, or `None` if it does not fit.
    pub fn checked_sum(amounts: impl IntoIterator<Item = Money>) -> Option<Money> {
        amounts.into_iter().try_fold(Money::ZERO, Money::checked_add)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(f, "{sign}{}.{:02}", (self.0 / 100).abs(), self.cents())
    }
}

/// A file attached to a chat message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub id: String,
    pub filename: String,
    pub url: String,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub size: u64,
}

impl Attachment {
    /// Whether the attachment looks like a PDF document.
    pub fn is_pdf(&self) -> bool {
        if let Some(ct) = &self.content_type {
            if ct.starts_with("application/pdf") {
                return true;
            }
        }
        self.filename.to_lowercase().ends_with(".pdf")
    }
}

/// A message received from the chat platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncomingMessage {
    pub channel_id: String,
    pub author_id: String,
    pub author_name: Option<String>,
    pub content: String,
    /// Sent by a bot account (including ourselves).
    pub from_bot: bool,
    pub timestamp: DateTime<Utc>,
}
