//! Storage key derivation for user identifiers

/// Maximum length of a sanitized key
pub const MAX_KEY_LEN: usize = 50;

/// Key used when an identifier has no alphanumeric characters at all
pub const ANONYMOUS_KEY: &str = "anonymous";

/// Keep only ASCII alphanumeric characters and cap the result at 50.
///
/// Lossy: distinct identifiers may map to the same key.
pub fn sanitize_key(user_id: &str) -> String {
    user_id
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .take(MAX_KEY_LEN)
        .collect()
}

/// Sanitized key, falling back to [`ANONYMOUS_KEY`] when nothing survives
pub fn storage_key(user_id: &str) -> String {
    let key = sanitize_key(user_id);
    if key.is_empty() {
        ANONYMOUS_KEY.to_string()
    } else {
        key
    }
}
