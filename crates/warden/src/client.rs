// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Outbound auth middleware.
//!
//! Every request carries the current bearer token. An unauthorized answer
//! gets exactly one retry with a refreshed token; a second one ends the
//! session.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::{BoxFuture, FutureExt};
use reqwest::header::{HeaderValue, AUTHORIZATION};
use reqwest::{Method, Request, RequestBuilder, Response, StatusCode};

use crate::session::manager::SessionManager;
use crate::session::refresher::RefreshError;
use crate::session::LogoutReason;

/// Retries allowed after an unauthorized response.
const MAX_RETRIES: u32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error("not authenticated")]
    NotAuthenticated,
    #[error(transparent)]
    Refresh(RefreshError),
    #[error("unauthorized")]
    Unauthorized,
    #[error("access token is not a valid header value")]
    InvalidToken,
    #[error("http: {0}")]
    Http(#[from] reqwest::Error),
}

impl From<RefreshError> for RequestError {
    fn from(e: RefreshError) -> Self {
        match e {
            RefreshError::NoSession | RefreshError::Superseded => Self::NotAuthenticated,
            e => Self::Refresh(e),
        }
    }
}

/// HTTP client that authenticates requests through the session manager.
#[derive(Clone)]
pub struct AuthedClient {
    http: reqwest::Client,
    manager: Arc<SessionManager>,
}

impl AuthedClient {
    pub fn new(manager: Arc<SessionManager>, timeout: Duration) -> Self {
        crate::ensure_crypto();
        let http = reqwest::Client::builder().timeout(timeout).build().unwrap_or_default();
        Self { http, manager }
    }

    /// Start building a request; send it with [`AuthedClient::execute`].
    pub fn request(&self, method: Method, url: &str) -> RequestBuilder {
        self.http.request(method, url)
    }

    /// Send `request` with the current access token, refreshing first if it
    /// is expiring soon.
    pub async fn execute(&self, request: Request) -> Result<Response, RequestError> {
        let token = self.manager.valid_access_token().await?;
        self.attempt(request, token, 0).await
    }

    fn attempt(
        &self,
        mut request: Request,
        token: String,
        retries: u32,
    ) -> BoxFuture<'_, Result<Response, RequestError>> {
        async move {
            // Streaming bodies cannot be replayed.
            let replay = request.try_clone();
            let bearer =
                HeaderValue::from_str(&format!("Bearer {token}")).map_err(|_| RequestError::InvalidToken)?;
            request.headers_mut().insert(AUTHORIZATION, bearer);

            let resp = self.http.execute(request).await?;
            if resp.status() != StatusCode::UNAUTHORIZED {
                return Ok(resp);
            }

            if retries >= MAX_RETRIES {
                tracing::warn!(retries, "still unauthorized after retry, logging out");
                self.manager.logout_if_token(&token, LogoutReason::Unauthorized).await;
                return Err(RequestError::Unauthorized);
            }

            // A concurrent caller may already have rotated the token.
            let next = match self.manager.current().await {
                Some(s) if s.access_token != token => s.access_token,
                Some(_) => self.manager.acquire_refreshed_session().await?.access_token,
                None => return Err(RequestError::NotAuthenticated),
            };
            let Some(replay) = replay else {
                tracing::debug!("unauthorized request has a streaming body, not retried");
                return Err(RequestError::Unauthorized);
            };
            tracing::debug!(retries, "unauthorized, retrying with refreshed token");
            self.attempt(replay, next, retries + 1).await
        }
        .boxed()
    }
}
