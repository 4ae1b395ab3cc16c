//! Shared utility functions.

/// Maximum length for miner-provided strings in log lines
pub const MAX_LOG_FIELD_LEN: usize = 256;

/// Sanitize an untrusted string for safe logging.
///
/// Replaces control characters (newlines, tabs, ANSI escapes) with spaces
/// and truncates to `MAX_LOG_FIELD_LEN` characters.
pub fn sanitize_for_log(s: &str) -> String {
    truncate(s, MAX_LOG_FIELD_LEN)
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect()
}

/// Truncate to at most `max_chars` characters without splitting a code point
pub fn truncate(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
