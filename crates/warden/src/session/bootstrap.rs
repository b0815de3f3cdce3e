// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Startup: decide the initial auth state from what was persisted.
//!
//! Authenticated is only published with a token that is not known to be
//! unusable. A persisted access token inside the refresh margin is
//! refreshed before the state is announced.

use std::sync::Arc;

use crate::session::manager::SessionManager;
use crate::session::refresher::RefreshError;
use crate::session::{epoch_secs, AuthState, LogoutReason, Session, SessionEvent};

impl SessionManager {
    /// Restore the persisted session, if it is still usable. Runs once at startup.
    pub async fn bootstrap(self: &Arc<Self>) -> AuthState {
        let persisted = match self.store.load_persisted() {
            Ok(Some(p)) => p,
            Ok(None) => {
                tracing::info!("no persisted session");
                return AuthState::Unauthenticated;
            }
            Err(e) => {
                tracing::warn!(err = %e, "persisted session unreadable, discarding");
                self.store.clear().await;
                return AuthState::Unauthenticated;
            }
        };

        let Some(access_token) = persisted.access_token().map(str::to_owned) else {
            tracing::info!("no persisted access token");
            return AuthState::Unauthenticated;
        };
        let Some(user) = persisted.user.clone() else {
            tracing::warn!("persisted session has no user record, discarding");
            self.store.clear().await;
            return AuthState::Unauthenticated;
        };
        let session = Session {
            access_token,
            refresh_token: persisted.refresh_token().map(str::to_owned),
            user,
        };

        let now = epoch_secs();
        if !self.clock.is_expiring_soon(&session.access_token, now) {
            let generation = self.store.install(session.clone()).await;
            self.restored(&session);
            self.arm(generation, &session.access_token).await;
            self.spawn_reconcile(generation, session.access_token.clone());
            return AuthState::Authenticated { user: session.user };
        }

        let refresh_usable =
            session.refresh_token.as_deref().is_some_and(|t| !self.clock.is_expired(t, now));
        if !refresh_usable {
            tracing::info!("persisted tokens expired, starting unauthenticated");
            self.store.clear().await;
            return AuthState::Unauthenticated;
        }

        // Installed without announcing, so the refresher has a session to work on.
        let generation = self.store.install(session.clone()).await;
        match self.acquire_refreshed_session().await {
            Ok(fresh) => {
                self.restored(&fresh);
                AuthState::Authenticated { user: fresh.user }
            }
            Err(RefreshError::Unavailable(e)) if !self.clock.is_expired(&session.access_token, now) => {
                // Still valid for a little while; keep it and try again shortly.
                tracing::warn!(err = %e, "startup refresh unavailable, keeping current token");
                self.restored(&session);
                self.schedule(generation, self.retry_backoff).await;
                AuthState::Authenticated { user: session.user }
            }
            Err(e) => {
                tracing::info!(err = %e, "startup refresh failed, starting unauthenticated");
                self.store.clear_if(generation).await;
                AuthState::Unauthenticated
            }
        }
    }

    fn restored(&self, session: &Session) {
        tracing::info!(user_id = %session.user.user_id, "session restored");
        self.emit(SessionEvent::Restored { user_id: session.user.user_id.clone() });
    }

    /// Re-fetch the user record in the background.
    pub(super) fn spawn_reconcile(self: &Arc<Self>, generation: u64, access_token: String) {
        let manager = Arc::clone(self);
        tokio::spawn(async move { manager.reconcile_user(generation, &access_token).await });
    }

    /// Replace the stored user record with the backend's view.
    ///
    /// Failures are non-fatal, except an unauthorized answer for the token
    /// that is still current, which ends the session.
    pub(super) async fn reconcile_user(&self, generation: u64, access_token: &str) {
        match self.backend.fetch_user(access_token).await {
            Ok(user) => {
                if self.store.update_user(generation, user).await {
                    tracing::debug!("user record reconciled");
                }
            }
            Err(e) if e.is_unauthorized() => {
                if self.logout_if_token(access_token, LogoutReason::Unauthorized).await {
                    tracing::warn!(err = %e, "user reconciliation unauthorized, logged out");
                }
            }
            Err(e) => {
                tracing::warn!(err = %e, "user reconciliation failed");
            }
        }
    }
}

#[cfg(test)]
#[path = "bootstrap_tests.rs"]
mod tests;
