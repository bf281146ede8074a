//! Display helpers for condensed output

const KB: f64 = 1e3;
const MB: f64 = KB * 1e3;
const GB: f64 = MB * 1e3;
const TB: f64 = GB * 1e3;

/// Marker placed between the kept head and tail of a truncated expression
pub const TRUNCATION_MARKER: &str = "...[truncated]...";

/// Characters reserved for the marker when sizing the kept head/tail
const TRUNCATION_RESERVE: usize = 20;

/// Format bytes to human-readable string (decimal units, MB floor)
pub fn format_bytes(bytes: Option<f64>) -> String {
    let bytes = bytes.filter(|b| b.is_finite()).unwrap_or(0.0);

    if bytes >= TB {
        format!("{:.2} TB", bytes / TB)
    } else if bytes >= GB {
        format!("{:.2} GB", bytes / GB)
    } else {
        format!("{:.2} MB", bytes / MB)
    }
}

pub fn format_byte_count(bytes: u64) -> String {
    format_bytes(Some(bytes as f64))
}

/// Bound an expression to `limit` characters, keeping its head and tail
///
/// Strings at or under the limit are returned unchanged. Longer strings keep
/// `(limit - 20) / 2` characters from each end around [`TRUNCATION_MARKER`].
pub fn truncate_expression(expression: &str, limit: usize) -> String {
    let char_count = expression.chars().count();
    if char_count <= limit {
        return expression.to_string();
    }

    let keep = limit.saturating_sub(TRUNCATION_RESERVE) / 2;
    let head: String = expression.chars().take(keep).collect();
    let tail: String = expression.chars().skip(char_count - keep).collect();

    format!("{}{}{}", head, TRUNCATION_MARKER, tail)
}
