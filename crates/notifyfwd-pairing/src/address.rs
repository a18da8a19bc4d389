//! Server address normalization

/// Scheme prepended to bare host entries
pub const DEFAULT_SCHEME: &str = "http://";

/// Turn a user-entered host into a base URL.
///
/// Entries already starting with `http://` or `https://` (exact, case-sensitive)
/// are returned unchanged; anything else gets `http://` prepended. Hostname
/// syntax is not validated, so a malformed entry surfaces later as a
/// connection failure.
pub fn normalize(raw: &str) -> String {
    if raw.starts_with("http://") || raw.starts_with("https://") {
        raw.to_string()
    } else {
        format!("{}{}", DEFAULT_SCHEME, raw)
    }
}

/// Join a normalized base URL and an API path
pub(crate) fn endpoint(base_url: &str, path: &str) -> String {
    format!("{}{}", base_url, path)
}
