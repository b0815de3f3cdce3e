// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Local agent API: lets sibling processes borrow the session's credentials.

pub mod auth;
pub mod http;

use std::sync::Arc;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::state::WardenState;

/// Build the axum `Router` with all agent routes.
pub fn build_router(state: Arc<WardenState>) -> Router {
    Router::new()
        // Health (no auth)
        .route("/api/v1/health", get(http::health))
        // Session lifecycle
        .route(
            "/api/v1/session",
            get(http::session_status).post(http::establish_session).delete(http::logout),
        )
        .route("/api/v1/session/callback", post(http::oauth_callback))
        // Tokens
        .route("/api/v1/session/token", get(http::access_token))
        .route("/api/v1/session/refresh", post(http::force_refresh))
        .route("/api/v1/session/foreground", post(http::foreground))
        // Middleware
        .layer(middleware::from_fn_with_state(state.clone(), auth::auth_layer))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
