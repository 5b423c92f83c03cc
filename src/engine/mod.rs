//! The two scheduled engines that act on the roster.

pub mod replies;
pub mod send;

pub use replies::{ReplyReport, ReplySyncEngine};
pub use send::{SendEngine, SendOptions, SendReport};

use crate::util::truncate;

/// Longest error text written into a stage's notes.
pub const NOTE_ERROR_LIMIT: usize = 500;

/// Append a line to a notes cell.
pub fn append_note(existing: &str, line: &str) -> String {
    let existing = existing.trim_end();
    if existing.is_empty() {
        line.to_string()
    } else {
        format!("{existing}\n{line}")
    }
}

/// Error text as recorded in the roster.
pub fn note_error(error: &impl std::fmt::Display) -> String {
    truncate(&error.to_string(), NOTE_ERROR_LIMIT)
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_note_joins_lines() {
        assert_eq!(append_note("", "first"), "first");
        assert_eq!(append_note("first\n", "second"), "first\nsecond");
    }

    #[test]
    fn note_error_is_bounded() {
        let long = "x".repeat(2000);
        assert!(note_error(&long).len() <= NOTE_ERROR_LIMIT);
    }
}
