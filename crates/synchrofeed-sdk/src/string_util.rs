/// String helpers used across the listener.
pub struct StringUtil;

impl StringUtil {
    /// Convert a string to a boolean.
    ///
    /// Valid true values: `"1"`, `"true"`, `"yes"` (case-insensitive).
    /// Valid false values: `"0"`, `"false"`, `"no"` (case-insensitive).
    /// Returns `None` for unrecognized values.
    pub fn convert_to_bool(value: &str) -> Option<bool> {
        match value.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" => Some(true),
            "0" | "false" | "no" => Some(false),
            _ => None,
        }
    }

    /// Case-insensitive equality that also folds non-ASCII letters, so feed
    /// names like `"Öffentlich"` and `"öffentlich"` compare equal.
    pub fn equals_ignore_case(a: &str, b: &str) -> bool {
        if a.is_ascii() && b.is_ascii() {
            return a.eq_ignore_ascii_case(b);
        }
        a.to_lowercase() == b.to_lowercase()
    }

    /// Shorten `input` to at most `max_chars` characters for log output,
    /// appending `...` when something was cut.
    pub fn truncate_for_log(input: &str, max_chars: usize) -> String {
        match input.char_indices().nth(max_chars) {
            Some((idx, _)) => format!("{}...", &input[..idx]),
            None => input.to_string(),
        }
    }
}
