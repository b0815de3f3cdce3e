// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP handlers for the local agent API.

use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::session::callback::{parse_callback, CallbackOutcome};
use crate::session::refresher::RefreshError;
use crate::session::{epoch_secs, AuthResponse, LogoutReason, UserRecord};
use crate::state::WardenState;

// -- Request/Response types ---------------------------------------------------

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub authenticated: bool,
}

#[derive(Debug, Serialize)]
pub struct EstablishResponse {
    pub user: UserRecord,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub is_new_user: bool,
}

#[derive(Debug, Deserialize)]
pub struct CallbackRequest {
    pub url: String,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in_secs: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct LogoutResponse {
    pub logged_out: bool,
}

// -- Handlers -----------------------------------------------------------------

/// `GET /api/v1/health`
pub async fn health(State(s): State<Arc<WardenState>>) -> impl IntoResponse {
    let authenticated = s.manager.auth_state().await.is_authenticated();
    Json(HealthResponse { status: "running".to_owned(), authenticated })
}

/// `GET /api/v1/session`
pub async fn session_status(State(s): State<Arc<WardenState>>) -> impl IntoResponse {
    Json(s.manager.status().await)
}

/// `POST /api/v1/session`: install a session from a login response.
pub async fn establish_session(
    State(s): State<Arc<WardenState>>,
    Json(resp): Json<AuthResponse>,
) -> impl IntoResponse {
    match s.manager.establish(&resp).await {
        Ok(session) => {
            Json(EstablishResponse { user: session.user, is_new_user: false }).into_response()
        }
        Err(e) => ApiError::BadRequest.to_http_response(e.to_string()).into_response(),
    }
}

/// `POST /api/v1/session/callback`: complete an OAuth redirect.
pub async fn oauth_callback(
    State(s): State<Arc<WardenState>>,
    Json(req): Json<CallbackRequest>,
) -> impl IntoResponse {
    let outcome = match parse_callback(&req.url) {
        Ok(o) => o,
        Err(e) => return ApiError::BadRequest.to_http_response(format!("{e:#}")).into_response(),
    };
    match outcome {
        CallbackOutcome::Failed { error } => {
            tracing::warn!(%error, "oauth callback reported failure");
            ApiError::BadRequest
                .to_http_response(format!("authentication failed: {error}"))
                .into_response()
        }
        CallbackOutcome::Success { response, is_new_user } => {
            match s.manager.establish(&response).await {
                Ok(session) => {
                    Json(EstablishResponse { user: session.user, is_new_user }).into_response()
                }
                Err(e) => ApiError::BadRequest.to_http_response(e.to_string()).into_response(),
            }
        }
    }
}

/// `GET /api/v1/session/token`: a usable access token, refreshed if needed.
pub async fn access_token(State(s): State<Arc<WardenState>>) -> impl IntoResponse {
    match s.manager.valid_access_token().await {
        Ok(token) => token_response(&s, token).into_response(),
        Err(e) => refresh_error(&e).into_response(),
    }
}

/// `POST /api/v1/session/refresh`: force a refresh (joins one in flight).
pub async fn force_refresh(State(s): State<Arc<WardenState>>) -> impl IntoResponse {
    match s.manager.acquire_refreshed_session().await {
        Ok(session) => token_response(&s, session.access_token).into_response(),
        Err(e) => refresh_error(&e).into_response(),
    }
}

/// `POST /api/v1/session/foreground`: the client came back to the foreground.
pub async fn foreground(State(s): State<Arc<WardenState>>) -> impl IntoResponse {
    Json(s.manager.revalidate_on_foreground().await)
}

/// `DELETE /api/v1/session`
pub async fn logout(State(s): State<Arc<WardenState>>) -> impl IntoResponse {
    let logged_out = s.manager.logout(LogoutReason::Requested).await;
    Json(LogoutResponse { logged_out })
}

fn token_response(s: &WardenState, access_token: String) -> Json<TokenResponse> {
    let expires_in_secs =
        s.manager.clock().remaining(&access_token, epoch_secs()).map(|d| d.as_secs());
    Json(TokenResponse { access_token, expires_in_secs })
}

fn refresh_error(e: &RefreshError) -> impl IntoResponse {
    ApiError::from(e).to_http_response(e.to_string())
}
