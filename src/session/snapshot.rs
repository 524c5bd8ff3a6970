//! Persisted session snapshot: a flattened, string-keyed mirror of the
//! `Session` in the credential store.
//!
//! The snapshot is all-or-nothing. It is written in one batch on every
//! transition into `Authenticated` and fully erased on every transition into
//! `Anonymous`. On read, anything short of a complete, parseable set of keys
//! is `StorageCorrupt`, which callers treat the same as an absent snapshot.

use anyhow::Context;
use chrono::{DateTime, Utc};

use crate::error::AuthError;
use crate::models::{Account, Role, Session, TOKEN_TYPE_BEARER};
use crate::store::CredentialStore;

pub const KEY_AUTH_TOKEN: &str = "authToken";
pub const KEY_REFRESH_TOKEN: &str = "refreshToken";
pub const KEY_EXPIRES_AT: &str = "expiresAt";
pub const KEY_IS_AUTHENTICATED: &str = "isAuthenticated";
pub const KEY_EMAIL: &str = "email";
pub const KEY_USERNAME: &str = "username";
pub const KEY_ROLE: &str = "role";
pub const KEY_ACCOUNT: &str = "account";
pub const KEY_CREATED_AT: &str = "createdAt";
pub const KEY_UPDATED_AT: &str = "updatedAt";

/// Every key the snapshot consists of; written together, cleared together.
pub const SNAPSHOT_KEYS: [&str; 10] = [
    KEY_AUTH_TOKEN,
    KEY_REFRESH_TOKEN,
    KEY_EXPIRES_AT,
    KEY_IS_AUTHENTICATED,
    KEY_EMAIL,
    KEY_USERNAME,
    KEY_ROLE,
    KEY_ACCOUNT,
    KEY_CREATED_AT,
    KEY_UPDATED_AT,
];

/// Write the full snapshot in one batch.
///
/// The session must be authenticated with all identity fields present;
/// the session manager is the only caller and upholds that.
pub fn write(store: &dyn CredentialStore, session: &Session) -> anyhow::Result<()> {
    let access_token = session.access_token.as_deref().context("snapshot requires an access token")?;
    let refresh_token =
        session.refresh_token.as_deref().context("snapshot requires a refresh token")?;
    let expires_at = session.expires_at.context("snapshot requires an expiry")?;
    let email = session.email.as_deref().context("snapshot requires an email")?;
    let username = session.username.as_deref().context("snapshot requires a username")?;
    let account = session.account.as_ref().context("snapshot requires an account")?;
    let created_at = session.created_at.context("snapshot requires createdAt")?;
    let updated_at = session.updated_at.context("snapshot requires updatedAt")?;

    let entries = vec![
        (KEY_AUTH_TOKEN.to_string(), access_token.to_string()),
        (KEY_REFRESH_TOKEN.to_string(), refresh_token.to_string()),
        (KEY_EXPIRES_AT.to_string(), expires_at.to_rfc3339()),
        (KEY_IS_AUTHENTICATED.to_string(), "true".to_string()),
        (KEY_EMAIL.to_string(), email.to_string()),
        (KEY_USERNAME.to_string(), username.to_string()),
        (KEY_ROLE.to_string(), session.role.as_str().to_string()),
        (KEY_ACCOUNT.to_string(), account.to_json().to_string()),
        (KEY_CREATED_AT.to_string(), created_at.to_rfc3339()),
        (KEY_UPDATED_AT.to_string(), updated_at.to_rfc3339()),
    ];
    store.set_many(&entries)
}

/// Erase the snapshot entirely.
pub fn clear(store: &dyn CredentialStore) -> anyhow::Result<()> {
    store.clear()
}

/// Read the snapshot back.
///
/// `Ok(None)` when no key is present at all; `StorageCorrupt` when the
/// snapshot is partial or any value fails to parse. A corrupt snapshot is
/// never partially trusted.
pub fn read(store: &dyn CredentialStore) -> Result<Option<Session>, AuthError> {
    let mut values = Vec::with_capacity(SNAPSHOT_KEYS.len());
    for key in SNAPSHOT_KEYS {
        let value = store
            .get(key)
            .map_err(|e| AuthError::StorageCorrupt(format!("reading {key}: {e}")))?;
        values.push((key, value));
    }

    if values.iter().all(|(_, v)| v.is_none()) {
        return Ok(None);
    }

    let require = |key: &str| -> Result<String, AuthError> {
        values
            .iter()
            .find(|(k, _)| *k == key)
            .and_then(|(_, v)| v.clone())
            .ok_or_else(|| AuthError::StorageCorrupt(format!("missing key {key}")))
    };

    let access_token = require(KEY_AUTH_TOKEN)?;
    let refresh_token = require(KEY_REFRESH_TOKEN)?;
    let expires_at = parse_timestamp(KEY_EXPIRES_AT, &require(KEY_EXPIRES_AT)?)?;
    let is_authenticated = require(KEY_IS_AUTHENTICATED)?;
    let email = require(KEY_EMAIL)?;
    let username = require(KEY_USERNAME)?;
    let role_str = require(KEY_ROLE)?;
    let account_json = require(KEY_ACCOUNT)?;
    let created_at = parse_timestamp(KEY_CREATED_AT, &require(KEY_CREATED_AT)?)?;
    let updated_at = parse_timestamp(KEY_UPDATED_AT, &require(KEY_UPDATED_AT)?)?;

    // A snapshot only ever exists for an authenticated session.
    if is_authenticated != "true" {
        return Err(AuthError::StorageCorrupt(format!(
            "unexpected {KEY_IS_AUTHENTICATED} value: {is_authenticated}"
        )));
    }

    let role = Role::parse(&role_str)
        .ok_or_else(|| AuthError::StorageCorrupt(format!("unknown role: {role_str}")))?;
    let account_value: serde_json::Value = serde_json::from_str(&account_json)
        .map_err(|e| AuthError::StorageCorrupt(format!("account not valid JSON: {e}")))?;
    let account = Account::from_role_json(role, &account_value)
        .map_err(|e| AuthError::StorageCorrupt(format!("{e:#}")))?;

    Ok(Some(Session {
        is_authenticated: true,
        access_token: Some(access_token),
        refresh_token: Some(refresh_token),
        expires_at: Some(expires_at),
        token_type: TOKEN_TYPE_BEARER.to_string(),
        email: Some(email),
        username: Some(username),
        role,
        account: Some(account),
        created_at: Some(created_at),
        updated_at: Some(updated_at),
    }))
}

fn parse_timestamp(key: &str, value: &str) -> Result<DateTime<Utc>, AuthError> {
    DateTime::parse_from_rfc3339(value)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| AuthError::StorageCorrupt(format!("{key} not a timestamp: {e}")))
}
