//! Utility functions and helpers.

pub mod http;
pub mod log;

/// Truncate text to at most `max_chars` characters, appending an ellipsis
/// when something was cut.
pub fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
