//! Shared-secret bearer credential verification for job/admin triggers.

use subtle::ConstantTimeEq;

/// Compare a presented bearer token against the configured secret in
/// constant time.
pub fn bearer_token_matches(presented: &str, expected: &str) -> bool {
    // ct_eq requires equal lengths; differing lengths are a mismatch anyway.
    if presented.len() != expected.len() {
        return false;
    }
    presented.as_bytes().ct_eq(expected.as_bytes()).into()
}

/// Extract the token from an `Authorization: Bearer <token>` header value.
pub fn strip_bearer(header_value: &str) -> Option<&str> {
    header_value.strip_prefix("Bearer ").map(str::trim)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bearer_token_matches() {
        assert!(bearer_token_matches("s3cret", "s3cret"));
        assert!(!bearer_token_matches("s3cret", "other1"));
        assert!(!bearer_token_matches("short", "longer-secret"));
    }

    #[test]
    fn test_strip_bearer() {
        assert_eq!(strip_bearer("Bearer abc"), Some("abc"));
        assert_eq!(strip_bearer("Basic abc"), None);
    }
}
