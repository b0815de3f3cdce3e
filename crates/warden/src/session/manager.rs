// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session manager: the one owner of session state, refresh handle and timer.
//!
//! Construct once per process and share the `Arc` with every consumer
//! (outbound client, local API, foreground listener).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{broadcast, Mutex};

use crate::config::WardenConfig;
use crate::session::clock::TokenClock;
use crate::session::persist::{FileBackend, SessionBackend};
use crate::session::refresher::Flight;
use crate::session::scheduler::ArmedTimer;
use crate::session::store::SessionStore;
use crate::session::transport::{AuthBackend, HttpAuthBackend};
use crate::session::{
    epoch_secs, AuthResponse, AuthState, LogoutReason, Session, SessionEvent, UserRecord,
};

pub struct SessionManager {
    pub(super) store: SessionStore,
    pub(super) backend: Arc<dyn AuthBackend>,
    pub(super) clock: TokenClock,
    /// Delay before retrying after a recoverable refresh failure.
    pub(super) retry_backoff: Duration,
    /// The single outstanding refresh, if any.
    pub(super) flight: Mutex<Option<Flight>>,
    /// The single armed refresh timer, if any.
    pub(super) timer: Mutex<Option<ArmedTimer>>,
    /// Id source for flights and timers.
    pub(super) seq: AtomicU64,
    event_tx: broadcast::Sender<SessionEvent>,
}

impl SessionManager {
    pub fn new(
        backend: Arc<dyn AuthBackend>,
        persistence: Arc<dyn SessionBackend>,
        clock: TokenClock,
        retry_backoff: Duration,
    ) -> Arc<Self> {
        let (event_tx, _) = broadcast::channel(64);
        Arc::new(Self {
            store: SessionStore::new(persistence),
            backend,
            clock,
            retry_backoff,
            flight: Mutex::new(None),
            timer: Mutex::new(None),
            seq: AtomicU64::new(0),
            event_tx,
        })
    }

    /// Manager backed by the HTTP backend and the session file from `config`.
    pub fn from_config(config: &WardenConfig) -> Arc<Self> {
        Self::new(
            Arc::new(HttpAuthBackend::from_config(config)),
            Arc::new(FileBackend::new(config.session_file())),
            TokenClock::new(config.refresh_margin()),
            config.retry_backoff(),
        )
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.event_tx.subscribe()
    }

    pub fn clock(&self) -> &TokenClock {
        &self.clock
    }

    pub(super) fn emit(&self, event: SessionEvent) {
        let _ = self.event_tx.send(event);
    }

    pub(super) fn next_id(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub async fn current(&self) -> Option<Session> {
        self.store.snapshot().await
    }

    pub async fn auth_state(&self) -> AuthState {
        match self.store.snapshot().await {
            Some(session) => AuthState::Authenticated { user: session.user },
            None => AuthState::Unauthenticated,
        }
    }

    /// Install a session from a login, registration or OAuth callback response.
    pub async fn establish(self: &Arc<Self>, resp: &AuthResponse) -> anyhow::Result<Session> {
        let session = Session::from_login(resp)
            .ok_or_else(|| anyhow::anyhow!("auth response is missing token or user identity"))?;

        // Anything still in flight belongs to the previous session. The slot
        // stays locked until the new generation is in place, so no refresh
        // can start against the old session in between.
        let mut flight = self.flight.lock().await;
        flight.take();
        let generation = self.store.install(session.clone()).await;
        drop(flight);
        self.emit(SessionEvent::Established { user_id: session.user.user_id.clone() });
        tracing::info!(user_id = %session.user.user_id, "session established");

        self.arm(generation, &session.access_token).await;
        Ok(session)
    }

    /// End the session: clear the store, disarm the timer, drop any
    /// outstanding refresh. A refresh that settles later is discarded.
    ///
    /// Returns false if there was no session to end.
    pub async fn logout(&self, reason: LogoutReason) -> bool {
        let had_session = self.store.clear().await;
        self.finish_logout(had_session, reason).await
    }

    /// Log out only if the session of `generation` is still the live one.
    ///
    /// Failure paths use this so that a late failure from an old session
    /// never ends a newer one.
    pub(super) async fn logout_if_current(&self, generation: u64, reason: LogoutReason) -> bool {
        match self.store.clear_if(generation).await {
            Some(had_session) => self.finish_logout(had_session, reason).await,
            None => false,
        }
    }

    /// Log out only if `access_token` is still the live access token.
    ///
    /// An unauthorized answer for a token that has since been rotated says
    /// nothing about the current session.
    pub async fn logout_if_token(&self, access_token: &str, reason: LogoutReason) -> bool {
        let (session, generation) = self.store.snapshot_with_generation().await;
        if !session.is_some_and(|s| s.access_token == access_token) {
            return false;
        }
        self.logout_if_current(generation, reason).await
    }

    async fn finish_logout(&self, had_session: bool, reason: LogoutReason) -> bool {
        self.disarm().await;
        self.flight.lock().await.take();
        if had_session {
            self.emit(SessionEvent::LoggedOut { reason });
            tracing::info!(%reason, "logged out");
        }
        had_session
    }

    /// Point-in-time view of the session for status endpoints.
    pub async fn status(&self) -> SessionStatus {
        let session = self.store.snapshot().await;
        let now = epoch_secs();
        let next_refresh_in = self.next_refresh_in().await;
        let refresh_in_flight = self.flight.lock().await.is_some();
        match session {
            Some(s) => SessionStatus {
                authenticated: true,
                access_expires_in_secs: self
                    .clock
                    .remaining(&s.access_token, now)
                    .map(|d| d.as_secs()),
                refresh_expires_in_secs: s
                    .refresh_token
                    .as_deref()
                    .and_then(|t| self.clock.remaining(t, now))
                    .map(|d| d.as_secs()),
                has_refresh_token: s.refresh_token.is_some(),
                next_refresh_in_secs: next_refresh_in.map(|d| d.as_secs()),
                refresh_in_flight,
                user: Some(s.user),
            },
            None => SessionStatus {
                authenticated: false,
                user: None,
                access_expires_in_secs: None,
                refresh_expires_in_secs: None,
                has_refresh_token: false,
                next_refresh_in_secs: None,
                refresh_in_flight,
            },
        }
    }
}

/// Session status returned by the local API.
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub authenticated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<UserRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_expires_in_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_expires_in_secs: Option<u64>,
    pub has_refresh_token: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_refresh_in_secs: Option<u64>,
    pub refresh_in_flight: bool,
}
