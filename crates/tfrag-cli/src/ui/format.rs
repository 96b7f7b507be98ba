//! Text helpers for CLI output.

/// Truncate to `max_len` characters, ending in `...` when cut.
///
/// ```ignore
/// assert_eq!(truncate_str("azurerm_storage_account", 10), "azurerm...");
/// ```
pub fn truncate_str(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        return s.to_string();
    }
    if max_len <= 3 {
        return ".".repeat(max_len);
    }
    let kept: String = s.chars().take(max_len - 3).collect();
    format!("{}...", kept)
}

/// Collapse whitespace runs, newlines included, into single spaces.
pub fn single_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Document count, or `-` when the collection is missing.
pub fn format_count(count: Option<usize>) -> String {
    count.map_or_else(|| "-".to_string(), |n| format_thousands(n as u64))
}

pub fn format_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut result = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result
}
