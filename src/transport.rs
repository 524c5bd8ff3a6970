//! Authenticated HTTP transport.
//!
//! Wraps a `reqwest::Client` and a `SessionManager`: every request carries
//! the current bearer token, a near-expiry token is renewed before the
//! request goes out, and a 401 triggers exactly one renew-and-replay. The
//! retry is tracked in an explicit per-attempt flag, so a second 401 on the
//! replayed request is final.

use std::sync::Arc;

use reqwest::header::AUTHORIZATION;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::AuthError;
use crate::models::SessionState;
use crate::session::SessionManager;

/// One send of a request, with its retry budget.
struct RequestAttempt {
    builder: RequestBuilder,
    already_retried: bool,
}

pub struct Transport {
    client: Client,
    manager: Arc<SessionManager>,
}

impl Transport {
    pub fn new(client: Client, manager: Arc<SessionManager>) -> Self {
        Self { client, manager }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Send a request with the session's bearer token attached.
    ///
    /// On 401 the token is renewed once and the request replayed; if the
    /// replay also returns 401, or renewal fails, the original 401 response
    /// is returned as-is for the caller to inspect. Requests whose body
    /// cannot be cloned are sent once and never replayed.
    pub async fn execute(&self, builder: RequestBuilder) -> Result<Response, AuthError> {
        // Renew proactively when the token is inside the expiry buffer, so
        // the common case never sees a 401. A failed renewal has already
        // forced logout; the request proceeds without a token.
        if self.manager.state() == SessionState::Authenticated
            && self.manager.snapshot().needs_refresh()
        {
            if let Err(e) = self.manager.ensure_fresh_token().await {
                debug!(error = %e, "proactive token renewal failed");
            }
        }

        let mut attempt = RequestAttempt { builder, already_retried: false };
        loop {
            let replay = attempt.builder.try_clone();

            let mut request = attempt.builder;
            if let Some(header) = self.manager.authorization_header() {
                request = request.header(AUTHORIZATION, header);
            }
            let response = request.send().await.map_err(AuthError::network)?;

            if response.status() != StatusCode::UNAUTHORIZED || attempt.already_retried {
                return Ok(response);
            }

            let Some(replay) = replay else {
                debug!("401 on a non-replayable request");
                return Ok(response);
            };

            match self.manager.ensure_fresh_token().await {
                Ok(_) => {
                    debug!("retrying request with renewed token");
                    attempt = RequestAttempt { builder: replay, already_retried: true };
                }
                Err(e) => {
                    warn!(error = %e, "token renewal after 401 failed");
                    return Ok(response);
                }
            }
        }
    }

    /// Map a response status into the error taxonomy.
    pub fn check(response: &Response) -> Result<(), AuthError> {
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else if status == StatusCode::UNAUTHORIZED {
            Err(AuthError::NotAuthenticated)
        } else {
            Err(AuthError::NetworkFailure(format!("status {status}")))
        }
    }

    /// GET `url` and decode the JSON body.
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, AuthError> {
        let response = self.execute(self.client.get(url)).await?;
        Self::check(&response)?;
        response.json().await.map_err(AuthError::network)
    }

    /// POST `body` as JSON to `url` and decode the JSON response.
    pub async fn post_json<T: DeserializeOwned, B: Serialize>(
        &self,
        url: &str,
        body: &B,
    ) -> Result<T, AuthError> {
        let response = self.execute(self.client.post(url).json(body)).await?;
        Self::check(&response)?;
        response.json().await.map_err(AuthError::network)
    }
}
