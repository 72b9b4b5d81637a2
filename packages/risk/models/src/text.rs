//! Text helpers shared by the HTTP clients.

/// Shortens `s` to at most `max_len` bytes for logging, cutting on a
/// char boundary and appending `...` when anything was dropped.
#[must_use]
pub fn truncate_for_log(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        return s.to_string();
    }
    let mut end = max_len;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &s[..end])
}
