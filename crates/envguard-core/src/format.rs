//! Formatting utilities

/// Pluralize a noun for a count (e.g., "1 error", "3 errors")
pub fn count(n: usize, noun: &str) -> String {
    if n == 1 {
        format!("{} {}", n, noun)
    } else {
        format!("{} {}s", n, noun)
    }
}

/// Truncate a string to max length with ellipsis
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else if max_len <= 3 {
        "...".to_string()
    } else {
        let head: String = s.chars().take(max_len - 3).collect();
        format!("{}...", head)
    }
}

/// Pad a name to a column width
pub fn pad(s: &str, width: usize) -> String {
    format!("{:<width$}", s, width = width)
}
