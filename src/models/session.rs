//! The canonical in-memory identity record and its lifecycle states.

use chrono::{DateTime, Duration, Utc};

use super::account::{Account, Role};

/// Token type attached to outgoing Authorization headers.
pub const TOKEN_TYPE_BEARER: &str = "Bearer";

/// Buffer time before expiry to trigger a proactive refresh (5 minutes)
const TOKEN_REFRESH_BUFFER_MINUTES: i64 = 5;

/// States of the session lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Initial and terminal state; no identity.
    Anonymous,
    /// Transient, during login or a forced refresh.
    Authenticating,
    /// Token valid (or being silently renewed).
    Authenticated,
    /// Token past its expiry, not yet renewed.
    Expired,
}

/// The canonical identity record.
///
/// Invariant: when `is_authenticated` is true, `access_token`,
/// `refresh_token`, `expires_at`, `role`, and `account` are all present and
/// the account shape matches the role. Mutated only by the session manager.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub is_authenticated: bool,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub token_type: String,
    pub email: Option<String>,
    pub username: Option<String>,
    pub role: Role,
    pub account: Option<Account>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Session {
    /// The anonymous default every logout and reset returns to.
    pub fn anonymous() -> Self {
        Self {
            is_authenticated: false,
            access_token: None,
            refresh_token: None,
            expires_at: None,
            token_type: TOKEN_TYPE_BEARER.to_string(),
            email: None,
            username: None,
            role: Role::Unassigned,
            account: None,
            created_at: None,
            updated_at: None,
        }
    }

    /// Whether the access token is past its expiry.
    /// A session with no expiry on record counts as expired.
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(expiry) => Utc::now() >= expiry,
            None => true,
        }
    }

    /// Whether the token will expire soon and should be renewed proactively.
    pub fn needs_refresh(&self) -> bool {
        match self.expires_at {
            Some(expiry) => Utc::now() >= expiry - Duration::minutes(TOKEN_REFRESH_BUFFER_MINUTES),
            None => true,
        }
    }

    /// Seconds remaining until expiry (for display), clamped at zero.
    pub fn seconds_until_expiry(&self) -> i64 {
        match self.expires_at {
            Some(expiry) => (expiry - Utc::now()).num_seconds().max(0),
            None => 0,
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::anonymous()
    }
}
