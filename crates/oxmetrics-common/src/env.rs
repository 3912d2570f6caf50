//! Parsers for values supplied through environment variables.

/// Parses a whole-second duration written as `"10"` or `"10s"`.
///
/// ```
/// use oxmetrics_common::env::parse_secs;
///
/// assert_eq!(parse_secs("10"), Some(10));
/// assert_eq!(parse_secs(" 3s "), Some(3));
/// assert_eq!(parse_secs("soon"), None);
/// ```
pub fn parse_secs(raw: &str) -> Option<u64> {
    let raw = raw.trim();
    raw.strip_suffix('s').unwrap_or(raw).parse().ok()
}

/// Accepts `true`/`false`, `1`/`0` and `yes`/`no`, case-insensitively.
pub fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}
