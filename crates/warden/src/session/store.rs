// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session store: the in-memory session plus its durable copy.
//!
//! Readers only ever see a whole [`Session`] or nothing. Every install or
//! clear bumps a generation counter; writers that started under an older
//! generation (a refresh that settles after logout) are refused.

use std::sync::Arc;

use tokio::sync::RwLock;

use crate::session::persist::{PersistedSession, SessionBackend};
use crate::session::{AuthResponse, Session, UserRecord};

struct Inner {
    session: Option<Session>,
    generation: u64,
}

pub struct SessionStore {
    inner: RwLock<Inner>,
    backend: Arc<dyn SessionBackend>,
}

impl SessionStore {
    pub fn new(backend: Arc<dyn SessionBackend>) -> Self {
        Self { inner: RwLock::new(Inner { session: None, generation: 0 }), backend }
    }

    /// Raw persisted layout, read once at bootstrap.
    pub fn load_persisted(&self) -> anyhow::Result<Option<PersistedSession>> {
        self.backend.load()
    }

    pub async fn snapshot(&self) -> Option<Session> {
        self.inner.read().await.session.clone()
    }

    /// Current session together with the generation it belongs to.
    pub async fn snapshot_with_generation(&self) -> (Option<Session>, u64) {
        let inner = self.inner.read().await;
        (inner.session.clone(), inner.generation)
    }

    pub async fn generation(&self) -> u64 {
        self.inner.read().await.generation
    }

    /// Install a new session (login, callback, bootstrap restore).
    ///
    /// Starts a new generation so that any refresh still in flight for the
    /// previous session cannot overwrite this one.
    pub async fn install(&self, session: Session) -> u64 {
        let mut inner = self.inner.write().await;
        inner.generation += 1;
        self.persist(&session);
        inner.session = Some(session);
        inner.generation
    }

    /// Apply a refresh response to the live session if `generation` is still
    /// current. Returns the session as written.
    pub async fn apply_refresh(&self, generation: u64, resp: &AuthResponse) -> Option<Session> {
        let mut inner = self.inner.write().await;
        if inner.generation != generation {
            return None;
        }
        let next = inner.session.as_ref()?.refreshed(resp);
        self.persist(&next);
        inner.session = Some(next.clone());
        Some(next)
    }

    /// Replace the user record if `generation` is still current.
    pub async fn update_user(&self, generation: u64, user: UserRecord) -> bool {
        let mut inner = self.inner.write().await;
        if inner.generation != generation {
            return false;
        }
        let Some(ref current) = inner.session else {
            return false;
        };
        let session = Session { user, ..current.clone() };
        self.persist(&session);
        inner.session = Some(session);
        true
    }

    /// Drop the session from memory and disk. Returns whether one existed.
    pub async fn clear(&self) -> bool {
        let mut inner = self.inner.write().await;
        self.clear_locked(&mut inner)
    }

    /// Clear only if `generation` is still current; `None` when stale.
    pub async fn clear_if(&self, generation: u64) -> Option<bool> {
        let mut inner = self.inner.write().await;
        if inner.generation != generation {
            return None;
        }
        Some(self.clear_locked(&mut inner))
    }

    fn clear_locked(&self, inner: &mut Inner) -> bool {
        inner.generation += 1;
        let had_session = inner.session.take().is_some();
        if let Err(e) = self.backend.clear() {
            tracing::warn!(err = %e, "failed to clear persisted session");
        }
        had_session
    }

    fn persist(&self, session: &Session) {
        if let Err(e) = self.backend.save(&PersistedSession::from(session)) {
            tracing::warn!(err = %e, "failed to persist session");
        }
    }
}
