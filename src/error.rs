//! Error taxonomy for the session core.
//!
//! Every public operation on the session facade fails with one of these
//! kinds; raw transport or serialization errors never escape.

use thiserror::Error;

/// Maximum length for error response bodies carried in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

/// Errors surfaced by session operations.
///
/// `Clone` is required: the refresh coordinator fans a single settled
/// outcome out to every concurrent waiter through a shared future.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Login rejected by the server. Recoverable; no state change.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// No refresh token available locally. Forces logout.
    #[error("no refresh token available")]
    NoRefreshToken,

    /// The server invalidated the refresh token. Forces logout.
    #[error("session expired - refresh token rejected")]
    RefreshRejected,

    /// Transport failure or a response of unexpected shape.
    #[error("network error: {0}")]
    NetworkFailure(String),

    /// Persisted session snapshot was partial or unparseable.
    /// Treated identically to an absent snapshot.
    #[error("stored session unreadable: {0}")]
    StorageCorrupt(String),

    /// Operation requires an authenticated session.
    #[error("not authenticated")]
    NotAuthenticated,
}

impl AuthError {
    /// Wrap a transport-level error.
    pub(crate) fn network(err: impl std::fmt::Display) -> Self {
        AuthError::NetworkFailure(err.to_string())
    }

    /// Truncate a response body to avoid carrying excessive data in errors
    pub(crate) fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            // Back the cut down to a char boundary; byte 500 may land inside
            // a multi-byte character.
            let mut cut = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(cut) {
                cut -= 1;
            }
            format!("{}... (truncated, {} total bytes)", &body[..cut], body.len())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_body() {
        assert_eq!(AuthError::truncate_body("short"), "short");

        let long = "x".repeat(600);
        let truncated = AuthError::truncate_body(&long);
        assert!(truncated.starts_with(&"x".repeat(500)));
        assert!(truncated.contains("600 total bytes"));
    }

    #[test]
    fn test_truncate_body_respects_char_boundaries() {
        // 200 euro signs = 600 bytes; byte 500 falls mid-character.
        let body = "\u{20ac}".repeat(200);
        let truncated = AuthError::truncate_body(&body);
        assert!(truncated.contains("600 total bytes"));
        // The kept prefix ends on a whole character (166 * 3 = 498 bytes).
        assert!(truncated.starts_with(&"\u{20ac}".repeat(166)));
        assert!(!truncated.starts_with(&"\u{20ac}".repeat(167)));
    }
}
