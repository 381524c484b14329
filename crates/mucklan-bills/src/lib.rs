//! # Mucklan Bills
//!
//! Monthly rent from posted invoices.
//!
//! ```text
//! PDF bytes ──► PdfReader ──► page text ──► extract() ──► amount
//!                                   (ordered AmountRules)     │
//!                  amounts of the month ──► split(policy) ──► RentBreakdown
//!                                                              │
//!                                               rent_announcement()
//! ```

pub mod announce;
pub mod document;
pub mod extract;
pub mod split;

pub use announce::{rent_announcement, unreadable_notice};
pub use document::PdfReader;
pub use extract::{AmountRule, ExtractedAmount, extract};
pub use split::{RentBreakdown, Share, split};
