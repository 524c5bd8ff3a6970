//! HTTP client for the authentication endpoints.
//!
//! `HttpAuthApi` speaks the four wire contracts and translates every
//! transport or protocol failure into the `AuthError` taxonomy; raw
//! reqwest/serde errors never cross this boundary.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::Config;
use crate::error::AuthError;
use crate::models::{Account, Role};

// ============================================================================
// Constants
// ============================================================================

/// Login endpoint path (credentials in, full session payload out)
const LOGIN_PATH: &str = "/auth/login";

/// Token renewal endpoint path
const REFRESH_PATH: &str = "/auth/refresh";

/// Best-effort remote invalidation endpoint path
const LOGOUT_PATH: &str = "/auth/logout";

/// Current-profile endpoint path
const PROFILE_PATH: &str = "/auth/me";

// ============================================================================
// Payloads
// ============================================================================

/// A fresh credential triple from login or renewal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenSet {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
}

/// Everything a successful login returns: tokens plus identity.
#[derive(Debug, Clone, PartialEq)]
pub struct LoginPayload {
    pub tokens: TokenSet,
    pub email: String,
    pub username: String,
    pub role: Role,
    pub account: Account,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Identity and account payload for refreshing non-token fields.
#[derive(Debug, Clone, PartialEq)]
pub struct ProfilePayload {
    pub email: String,
    pub username: String,
    pub role: Role,
    pub account: Account,
    pub updated_at: DateTime<Utc>,
}

/// The four endpoint contracts the session core consumes.
///
/// Behind a trait so tests (and alternative transports) can inject a
/// scripted backend.
#[async_trait]
pub trait AuthApi: Send + Sync {
    async fn login(&self, email: &str, password: &str) -> Result<LoginPayload, AuthError>;

    /// Exchange the refresh token for a fresh token triple.
    /// Any response shape other than `{token, refresh_token, expiresAt}`
    /// is a protocol error.
    async fn refresh(&self, refresh_token: &str) -> Result<TokenSet, AuthError>;

    async fn fetch_profile(&self, access_token: &str) -> Result<ProfilePayload, AuthError>;

    /// Best-effort remote invalidation; the caller ignores failures.
    async fn logout(&self, access_token: &str) -> Result<(), AuthError>;
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    token: String,
    refresh_token: String,
    #[serde(rename = "expiresAt")]
    expires_at: DateTime<Utc>,
    email: String,
    username: String,
    role: Role,
    account: serde_json::Value,
    #[serde(rename = "createdAt")]
    created_at: DateTime<Utc>,
    #[serde(rename = "updatedAt")]
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    token: String,
    refresh_token: String,
    #[serde(rename = "expiresAt")]
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct ProfileResponse {
    email: String,
    username: String,
    role: Role,
    account: serde_json::Value,
    #[serde(rename = "updatedAt")]
    updated_at: DateTime<Utc>,
}

/// Reqwest-backed `AuthApi`.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct HttpAuthApi {
    client: Client,
    base_url: String,
}

impl HttpAuthApi {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self::from_parts(client, config.base_url.clone()))
    }

    /// Build from an existing client (shares its connection pool).
    pub fn from_parts(client: Client, base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self { client, base_url }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Read a non-success response body into an error message.
    async fn error_body(response: reqwest::Response) -> String {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        format!("status {}: {}", status, AuthError::truncate_body(&body))
    }
}

#[async_trait]
impl AuthApi for HttpAuthApi {
    async fn login(&self, email: &str, password: &str) -> Result<LoginPayload, AuthError> {
        let response = self
            .client
            .post(self.url(LOGIN_PATH))
            .json(&LoginRequest { email, password })
            .send()
            .await
            .map_err(AuthError::network)?;

        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(AuthError::InvalidCredentials)
            }
            status if !status.is_success() => {
                return Err(AuthError::NetworkFailure(Self::error_body(response).await))
            }
            _ => {}
        }

        let body: LoginResponse = response.json().await.map_err(AuthError::network)?;
        let account = Account::from_role_json(body.role, &body.account)
            .map_err(|e| AuthError::network(format!("login payload: {e:#}")))?;
        debug!(email = %body.email, role = %body.role, "login accepted");

        Ok(LoginPayload {
            tokens: TokenSet {
                access_token: body.token,
                refresh_token: body.refresh_token,
                expires_at: body.expires_at,
            },
            email: body.email,
            username: body.username,
            role: body.role,
            account,
            created_at: body.created_at,
            updated_at: body.updated_at,
        })
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenSet, AuthError> {
        let response = self
            .client
            .post(self.url(REFRESH_PATH))
            .json(&RefreshRequest { refresh_token })
            .send()
            .await
            .map_err(AuthError::network)?;

        let status = response.status();
        if status.is_client_error() {
            // The server no longer honors this refresh token.
            let body = Self::error_body(response).await;
            debug!(%body, "refresh token rejected");
            return Err(AuthError::RefreshRejected);
        }
        if !status.is_success() {
            return Err(AuthError::NetworkFailure(Self::error_body(response).await));
        }

        let body: RefreshResponse = response
            .json()
            .await
            .map_err(|e| AuthError::network(format!("renewal response had unexpected shape: {e}")))?;

        Ok(TokenSet {
            access_token: body.token,
            refresh_token: body.refresh_token,
            expires_at: body.expires_at,
        })
    }

    async fn fetch_profile(&self, access_token: &str) -> Result<ProfilePayload, AuthError> {
        let response = self
            .client
            .get(self.url(PROFILE_PATH))
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(AuthError::network)?;

        match response.status() {
            StatusCode::UNAUTHORIZED => return Err(AuthError::NotAuthenticated),
            status if !status.is_success() => {
                return Err(AuthError::NetworkFailure(Self::error_body(response).await))
            }
            _ => {}
        }

        let body: ProfileResponse = response.json().await.map_err(AuthError::network)?;
        let account = Account::from_role_json(body.role, &body.account)
            .map_err(|e| AuthError::network(format!("profile payload: {e:#}")))?;

        Ok(ProfilePayload {
            email: body.email,
            username: body.username,
            role: body.role,
            account,
            updated_at: body.updated_at,
        })
    }

    async fn logout(&self, access_token: &str) -> Result<(), AuthError> {
        let response = self
            .client
            .post(self.url(LOGOUT_PATH))
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(AuthError::network)?;

        // The response body is not required for local logout to complete.
        if !response.status().is_success() {
            return Err(AuthError::NetworkFailure(Self::error_body(response).await));
        }
        Ok(())
    }
}
