//! Chat commands addressed to the assistant.

/// Command words accepted after the prefix.
const BILL_WORDS: [&str; 2] = ["räkningar", "bills"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Run the bill check now and post the rent.
    Bills,
}

/// Parse `"<prefix> <word>"`, ignoring case and surrounding whitespace.
pub fn parse_command(prefix: &str, content: &str) -> Option<Command> {
    let content = content.trim().to_lowercase();
    let prefix = prefix.trim().to_lowercase();
    if prefix.is_empty() {
        return None;
    }

    let rest = content.strip_prefix(&prefix)?;
    // "/husräkningar" is not a command.
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }

    let words: Vec<&str> = rest.split_whitespace().collect();
    match words.as_slice() {
        [word] if BILL_WORDS.contains(word) => Some(Command::Bills),
        _ => None,
    }
}
