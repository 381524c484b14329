//! Rent splitting.
//!
//! `total` is the sum of the month's bills. Every payer group in the policy
//! owes a per-head share in whole currency units:
//!
//! - flat groups pay their configured fee;
//! - formula groups pay `ceil((total - deduction) / heads)`.
//!
//! Ceiling rounding favors the household: the collected sum can exceed
//! `total` by less than one unit per formula head. The residual is reported
//! in [`RentBreakdown::residual`] and left uncorrected. When the total is
//! below the deduction the formula share goes negative and is kept as is.
//!
//! All sums are checked; a month whose figures do not fit in `i64` minor
//! units fails with [`MucklanError::AmountOverflow`].

use mucklan_core::config::{RentPolicy, ShareRule};
use mucklan_core::error::{MucklanError, Result};
use mucklan_core::types::Money;
use serde::Serialize;

/// What one payer group owes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Share {
    pub group: String,
    pub heads: u32,
    /// Amount each member of the group pays.
    pub per_head: Money,
}

impl Share {
    /// Amount the whole group pays, `None` on overflow.
    pub fn group_total(&self) -> Option<Money> {
        self.per_head.checked_mul(i64::from(self.heads))
    }
}

/// Monthly total plus the per-group breakdown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RentBreakdown {
    pub total: Money,
    /// Individual bill amounts, in the order they were found.
    pub bills: Vec<Money>,
    /// In policy order.
    pub shares: Vec<Share>,
    /// Everything the groups pay together.
    pub collected: Money,
    /// Collected minus total. Positive when rounding favored the household.
    pub residual: Money,
}

impl RentBreakdown {
    /// Share of a named payer group.
    pub fn share(&self, group: &str) -> Result<&Share> {
        self.shares
            .iter()
            .find(|s| s.group == group)
            .ok_or_else(|| MucklanError::UnknownPayerGroup(group.to_string()))
    }
}

/// Split the month's bills according to `policy`.
///
/// Empty `amounts` is not an error: the total is zero and shares follow from
/// the flat fees and deductions alone.
pub fn split(amounts: &[Money], policy: &RentPolicy) -> Result<RentBreakdown> {
    policy.validate()?;
    let total = Money::checked_sum(amounts.iter().copied())
        .ok_or_else(|| overflow("sum of the bills"))?;

    let shares = policy
        .groups
        .iter()
        .map(|group| {
            let per_head = match group.share {
                ShareRule::Flat(fee) => Money::checked_from_major(fee),
                ShareRule::Formula { deduction } => Money::checked_from_major(deduction)
                    .and_then(|d| total.checked_sub(d))
                    .and_then(|remaining| {
                        Money::checked_from_major(div_ceil(remaining.minor(), i64::from(group.heads) * 100))
                    }),
            }
            .ok_or_else(|| overflow(&format!("share of '{}'", group.name)))?;
            Ok(Share {
                group: group.name.clone(),
                heads: group.heads,
                per_head,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let collected = shares
        .iter()
        .try_fold(Money::ZERO, |acc, share| acc.checked_add(share.group_total()?))
        .ok_or_else(|| overflow("sum of the shares"))?;
    let residual = collected
        .checked_sub(total)
        .ok_or_else(|| overflow("rounding residual"))?;

    Ok(RentBreakdown {
        total,
        bills: amounts.to_vec(),
        shares,
        collected,
        residual,
    })
}

fn overflow(what: &str) -> MucklanError {
    MucklanError::AmountOverflow(format!("{what} does not fit in an amount"))
}

/// Ceiling division for a positive divisor.
fn div_ceil(n: i64, d: i64) -> i64 {
    let q = n / d;
    if n % d > 0 { q + 1 } else { q }
}
