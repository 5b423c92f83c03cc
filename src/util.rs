//! Small text helpers shared by the engines and the chat bridge.

use std::cmp::Ordering;

/// Compare two snowflake-style identifiers without parsing them as numbers.
///
/// Shorter ids are older; equal-length ids compare lexicographically.
/// Valid for any decimal id without leading zeros, whatever its magnitude.
pub fn compare_ids(a: &str, b: &str) -> Ordering {
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

/// Largest char boundary in `s` that is `<= index`.
fn floor_boundary(s: &str, index: usize) -> usize {
    let mut end = index.min(s.len());
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    end
}

/// Truncate to at most `max` bytes, marking the cut with `...`.
pub fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let end = floor_boundary(s, max.saturating_sub(3));
    format!("{}...", &s[..end])
}

/// Split a long message into chunks of at most `max_len` bytes,
/// preferring newline then space boundaries.
pub fn split_message(text: &str, max_len: usize) -> Vec<String> {
    if text.len() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut remaining = text;

    while !remaining.is_empty() {
        if remaining.len() <= max_len {
            chunks.push(remaining.to_string());
            break;
        }

        let limit = floor_boundary(remaining, max_len);
        let chunk = &remaining[..limit];
        let split_at = chunk
            .rfind('\n')
            .or_else(|| chunk.rfind(' '))
            .unwrap_or(limit);

        // Infinite loop guard
        let split_at = if split_at == 0 { limit.max(1) } else { split_at };
        let split_at = if remaining.is_char_boundary(split_at) {
            split_at
        } else {
            remaining
                .char_indices()
                .nth(1)
                .map(|(i, _)| i)
                .unwrap_or(remaining.len())
        };

        chunks.push(remaining[..split_at].to_string());
        remaining = remaining[split_at..].trim_start();
    }

    chunks
}
