// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Single-flight refresher.
//!
//! At most one refresh runs at a time. The first caller spawns it and parks
//! a shared future in the manager's flight slot; every later caller clones
//! that future, so all of them observe the same outcome and the backend
//! sees exactly one exchange per cycle.

use std::sync::Arc;

use futures_util::future::{BoxFuture, FutureExt, Shared};

use crate::session::manager::SessionManager;
use crate::session::transport::TransportError;
use crate::session::{epoch_secs, LogoutReason, Session, SessionEvent};

/// Why a refresh did not produce a session.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RefreshError {
    #[error("no session")]
    NoSession,
    /// The refresh token is missing, unparseable or expired; nothing was sent.
    #[error("session unrecoverable: {0}")]
    Unrecoverable(String),
    #[error("refresh rejected ({status}): {message}")]
    Rejected { status: u16, message: String },
    /// Transport failure; the session is untouched and a later trigger retries.
    #[error("refresh unavailable: {0}")]
    Unavailable(String),
    /// The session was logged out or replaced while the refresh was in flight.
    #[error("session ended during refresh")]
    Superseded,
    #[error("refresh task failed: {0}")]
    Aborted(String),
}

impl RefreshError {
    /// True when the session this refresh was for is gone for good.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::NoSession | Self::Unrecoverable(_) | Self::Rejected { .. } | Self::Superseded
        )
    }

    /// Logout reason for failures that end the session.
    pub fn logout_reason(&self) -> Option<LogoutReason> {
        match self {
            Self::Unrecoverable(_) => Some(LogoutReason::Unrecoverable),
            Self::Rejected { .. } => Some(LogoutReason::Rejected),
            _ => None,
        }
    }
}

pub(super) type SharedRefresh = Shared<BoxFuture<'static, Result<Session, RefreshError>>>;

/// The outstanding refresh operation.
pub(crate) struct Flight {
    id: u64,
    result: SharedRefresh,
}

impl SessionManager {
    /// Return a freshly refreshed session, joining the in-flight refresh if
    /// there is one.
    pub async fn acquire_refreshed_session(self: &Arc<Self>) -> Result<Session, RefreshError> {
        let pending = self.join_or_start().await?;
        pending.await
    }

    /// The current access token, refreshed first if it is expiring soon.
    ///
    /// A recoverable refresh failure falls back to the current token; the
    /// backend is the judge of whether it still works.
    pub async fn valid_access_token(self: &Arc<Self>) -> Result<String, RefreshError> {
        let session = self.store.snapshot().await.ok_or(RefreshError::NoSession)?;
        if !self.clock.is_expiring_soon(&session.access_token, epoch_secs()) {
            return Ok(session.access_token);
        }
        match self.acquire_refreshed_session().await {
            Ok(fresh) => Ok(fresh.access_token),
            Err(e) if !e.is_fatal() => {
                tracing::warn!(err = %e, "refresh failed, using current access token");
                Ok(session.access_token)
            }
            Err(e) => Err(e),
        }
    }

    /// Whether a refresh is currently outstanding.
    pub async fn refresh_in_flight(&self) -> bool {
        self.flight.lock().await.is_some()
    }

    async fn join_or_start(self: &Arc<Self>) -> Result<SharedRefresh, RefreshError> {
        let mut slot = self.flight.lock().await;
        if let Some(ref flight) = *slot {
            tracing::debug!(flight = flight.id, "joining in-flight refresh");
            return Ok(flight.result.clone());
        }

        let (session, generation) = self.store.snapshot_with_generation().await;
        let session = session.ok_or(RefreshError::NoSession)?;
        let refresh_token = match session.refresh_token {
            Some(t) if !self.clock.is_expired(&t, epoch_secs()) => t,
            Some(_) => {
                drop(slot);
                return Err(self.unrecoverable(generation, "refresh token expired").await);
            }
            None => {
                drop(slot);
                return Err(self.unrecoverable(generation, "no refresh token").await);
            }
        };

        let id = self.next_id();
        let manager = Arc::clone(self);
        let task = tokio::spawn(manager.run_refresh(id, generation, refresh_token));
        let result = async move {
            match task.await {
                Ok(outcome) => outcome,
                Err(e) => Err(RefreshError::Aborted(e.to_string())),
            }
        }
        .boxed()
        .shared();

        tracing::debug!(flight = id, "starting refresh");
        *slot = Some(Flight { id, result: result.clone() });
        Ok(result)
    }

    async fn unrecoverable(&self, generation: u64, why: &str) -> RefreshError {
        tracing::warn!(reason = why, "session cannot be refreshed");
        let err = RefreshError::Unrecoverable(why.to_owned());
        self.emit(SessionEvent::RefreshFailed { error: err.to_string(), fatal: true });
        self.logout_if_current(generation, LogoutReason::Unrecoverable).await;
        err
    }

    /// Body of the spawned refresh task. Settles the flight: writes the
    /// store, re-arms the scheduler, then clears the handle.
    ///
    /// Boxed: the settlement re-arms the timer, whose task starts refreshes.
    fn run_refresh(
        self: Arc<Self>,
        id: u64,
        generation: u64,
        refresh_token: String,
    ) -> BoxFuture<'static, Result<Session, RefreshError>> {
        async move {
            let outcome = match self.backend.refresh(&refresh_token).await {
                Ok(resp) => match self.store.apply_refresh(generation, &resp).await {
                    Some(next) => {
                        tracing::info!(flight = id, "session refreshed");
                        self.emit(SessionEvent::Refreshed { access_token: next.access_token.clone() });
                        self.arm_after_refresh(generation, &next.access_token).await;
                        Ok(next)
                    }
                    None => {
                        tracing::info!(flight = id, "refresh settled after session ended, discarded");
                        Err(RefreshError::Superseded)
                    }
                },
                Err(TransportError::Rejected { status, message }) => {
                    tracing::warn!(flight = id, status, "refresh token rejected");
                    let err = RefreshError::Rejected { status, message };
                    self.emit(SessionEvent::RefreshFailed { error: err.to_string(), fatal: true });
                    self.logout_if_current(generation, LogoutReason::Rejected).await;
                    Err(err)
                }
                Err(TransportError::Unavailable(message)) => {
                    tracing::warn!(flight = id, err = %message, "refresh unavailable, session kept");
                    let err = RefreshError::Unavailable(message);
                    self.emit(SessionEvent::RefreshFailed { error: err.to_string(), fatal: false });
                    Err(err)
                }
            };

            let mut slot = self.flight.lock().await;
            if slot.as_ref().is_some_and(|f| f.id == id) {
                *slot = None;
            }
            outcome
        }
        .boxed()
    }
}

#[cfg(test)]
#[path = "refresher_tests.rs"]
mod tests;
