//! Chat message rendering for the monthly rent announcement.

use crate::split::RentBreakdown;

/// Announcement posted in the rent channel.
pub fn rent_announcement(breakdown: &RentBreakdown, currency: &str) -> String {
    let bills = breakdown
        .bills
        .iter()
        .map(|b| format!("{b} {currency}"))
        .collect::<Vec<_>>()
        .join(", ");

    let mut msg = format!(
        "This month the total rent is ```{} {currency}```\nEach bill is: ```{bills}```\n",
        breakdown.total
    );
    for share in &breakdown.shares {
        let verb = if share.heads > 1 { "each pay" } else { "pays" };
        msg.push_str(&format!(
            "{} {verb} ```{} {currency}```\n",
            share.group,
            share.per_head.major()
        ));
    }
    msg
}

/// Direct message to the bill manager when some documents could not be read.
pub fn unreadable_notice(files: &[String]) -> String {
    format!(
        "I couldn't find an amount in {} bill(s) this month, so rent was not announced: {}. \
         Please check the files or post the amounts manually.",
        files.len(),
        files.join(", ")
    )
}
