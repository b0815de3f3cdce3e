// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Refresh transport: the network exchange of a refresh token for a new pair.
//!
//! Transports report outcomes to their caller only; persistence and logout
//! are the session manager's job.

use std::time::Duration;

use reqwest::StatusCode;

use crate::config::WardenConfig;
use crate::session::{AuthResponse, UserRecord};

/// Failure of a backend call, split by whether retrying can help.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// Network failure, timeout, overload or an undecodable body.
    #[error("backend unavailable: {0}")]
    Unavailable(String),
    /// The backend refused the credential itself.
    #[error("rejected by backend ({status}): {message}")]
    Rejected { status: u16, message: String },
}

impl TransportError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Rejected { status: 401, .. })
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        Self::Unavailable(err.to_string())
    }
}

/// Backend endpoints the session lifecycle depends on.
#[async_trait::async_trait]
pub trait AuthBackend: Send + Sync {
    /// Exchange a refresh token for a rotated token pair and user record.
    async fn refresh(&self, refresh_token: &str) -> Result<AuthResponse, TransportError>;

    /// Fetch the current user record with an access token.
    async fn fetch_user(&self, access_token: &str) -> Result<UserRecord, TransportError>;
}

/// Classify a non-success status from the backend.
///
/// Client errors mean the credential is bad, except timeouts and rate
/// limiting, which are worth retrying later like server errors.
pub fn classify_status(status: StatusCode, body: String) -> TransportError {
    if status.is_client_error()
        && status != StatusCode::REQUEST_TIMEOUT
        && status != StatusCode::TOO_MANY_REQUESTS
    {
        TransportError::Rejected { status: status.as_u16(), message: body }
    } else {
        TransportError::Unavailable(format!("{status}: {body}"))
    }
}

/// JSON-over-HTTP backend.
pub struct HttpAuthBackend {
    refresh_url: String,
    user_url: String,
    client: reqwest::Client,
}

impl HttpAuthBackend {
    pub fn new(refresh_url: String, user_url: String, timeout: Duration) -> Self {
        crate::ensure_crypto();
        let client = reqwest::Client::builder().timeout(timeout).build().unwrap_or_default();
        Self { refresh_url, user_url, client }
    }

    pub fn from_config(config: &WardenConfig) -> Self {
        Self::new(config.refresh_url(), config.user_url(), config.request_timeout())
    }
}

#[async_trait::async_trait]
impl AuthBackend for HttpAuthBackend {
    async fn refresh(&self, refresh_token: &str) -> Result<AuthResponse, TransportError> {
        let resp = self
            .client
            .post(&self.refresh_url)
            .json(&serde_json::json!({ "refreshToken": refresh_token }))
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(classify_status(status, text));
        }

        let body: AuthResponse = resp.json().await?;
        if body.token.is_empty() {
            return Err(TransportError::Unavailable("refresh response without token".to_owned()));
        }
        Ok(body)
    }

    async fn fetch_user(&self, access_token: &str) -> Result<UserRecord, TransportError> {
        let resp = self.client.get(&self.user_url).bearer_auth(access_token).send().await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(classify_status(status, text));
        }

        Ok(resp.json().await?)
    }
}
