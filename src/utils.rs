//! Small shared helpers.

/// Truncate a string to at most `max_chars` characters, appending "..."
/// when anything was cut. Counts characters, not bytes, so multi-byte
/// content (the plans are Russian) never splits mid-character.
pub fn truncate_str(s: &str, max_chars: usize) -> String {
    // cheap filter: byte length bounds char count from above
    if s.len() <= max_chars {
        return s.to_string();
    }
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    if max_chars <= 3 {
        return ".".repeat(max_chars);
    }
    let kept: String = s.chars().take(max_chars - 3).collect();
    format!("{}...", kept)
}
