//! Bill amount extraction from invoice page text.
//!
//! A small, fixed set of recurring invoice senders is supported. Each sender
//! format is an [`AmountRule`]; rules are tried in [`RULES`] order on each
//! page, and the first page with any match decides the amount. Formats can
//! co-match on the same text, so the order is part of the contract:
//!
//! | # | rule                   | shape                                      |
//! |---|------------------------|--------------------------------------------|
//! | 1 | `reference_space_pair` | `<ref 5-25 digits>  1234 56 `              |
//! | 2 | `reference_hash_pair`  | `<ref 5-25 digits>  #  1234 56 `           |
//! | 3 | `amount_due_dot`       | `Summa att betala  1234.56`                |
//! | 4 | `total_comma_kr`       | `TOTALSUMMA 1234,56 kr`                    |
//!
//! Digits are ASCII `0-9` only; runs of other Unicode decimal digits
//! never match, since they could not be converted to an amount anyway.
//! No plausibility check is made on the result.

use std::sync::LazyLock;

use mucklan_core::error::{MucklanError, Result};
use mucklan_core::types::Money;
use regex::Regex;
use serde::Serialize;

/// Rule names in priority order.
pub const RULES: [&str; 4] = [
    "reference_space_pair",
    "reference_hash_pair",
    "amount_due_dot",
    "total_comma_kr",
];

/// One invoice-format convention: a pattern capturing `(integer, fraction)`.
#[derive(Debug)]
pub struct AmountRule {
    pub name: &'static str,
    pattern: Regex,
}

impl AmountRule {
    fn new(name: &'static str, pattern: &str) -> Self {
        Self {
            name,
            pattern: Regex::new(pattern).expect("amount rule pattern must compile"),
        }
    }

    /// Amount matched by this rule on `page`, if any.
    pub fn apply(&self, page: &str) -> Option<Money> {
        let caps = self.pattern.captures(page)?;
        parse_amount(caps.get(1)?.as_str(), caps.get(2)?.as_str())
    }
}

static AMOUNT_RULES: LazyLock<Vec<AmountRule>> = LazyLock::new(|| {
    vec![
        AmountRule::new(RULES[0], r"\s[0-9]{5,25}\s+([0-9]+)\s([0-9]{2})\s"),
        AmountRule::new(RULES[1], r"\s[0-9]{5,25}\s+#\s+([0-9]+)\s([0-9]+)\s"),
        AmountRule::new(RULES[2], r"Summa att betala\s+([0-9]+)\.([0-9]+)"),
        AmountRule::new(RULES[3], r"TOTALSUMMA\s+([0-9]+),([0-9]+)\s+kr"),
    ]
});

/// All rules, in priority order.
pub fn rules() -> &'static [AmountRule] {
    &AMOUNT_RULES
}

/// An amount pulled out of one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractedAmount {
    pub amount: Money,
    /// Name of the rule that matched.
    pub rule: &'static str,
    /// Zero-based page index.
    pub page: usize,
}

/// Find the billed amount in a document's pages.
pub fn extract<S: AsRef<str>>(pages: &[S]) -> Result<ExtractedAmount> {
    for (page_no, page) in pages.iter().enumerate() {
        let text = page.as_ref();
        for rule in rules() {
            if let Some(amount) = rule.apply(text) {
                tracing::debug!("🔎 {} matched {} on page {}", rule.name, amount, page_no + 1);
                return Ok(ExtractedAmount {
                    amount,
                    rule: rule.name,
                    page: page_no,
                });
            }
        }
    }
    Err(MucklanError::NoAmountFound)
}

/// Read `integer` and `fraction` digit groups as `integer.fraction`.
///
/// One fraction digit is tenths; more than two are rounded half-up.
/// Returns `None` if the integer part overflows.
pub fn parse_amount(integer: &str, fraction: &str) -> Option<Money> {
    let major: i64 = integer.parse().ok()?;
    let digits: Vec<i64> = fraction
        .bytes()
        .filter(u8::is_ascii_digit)
        .map(|b| i64::from(b - b'0'))
        .collect();

    let mut cents = match digits.as_slice() {
        [] => 0,
        [d] => d * 10,
        [d1, d2, ..] => d1 * 10 + d2,
    };
    if digits.get(2).is_some_and(|d| *d >= 5) {
        cents += 1;
    }

    major.checked_mul(100)?.checked_add(cents).map(Money::from_minor)
}
