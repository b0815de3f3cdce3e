// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fixtures for session unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use tokio::sync::{Mutex, Semaphore};

use super::clock::TokenClock;
use super::manager::SessionManager;
use super::persist::MemoryBackend;
use super::transport::{AuthBackend, TransportError};
use super::{epoch_secs, AuthResponse, Session, UserRecord};

/// Build an unsigned JWT-shaped token expiring at `exp` (epoch seconds).
pub fn jwt(sub: &str, exp: u64) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD
        .encode(format!(r#"{{"sub":"{sub}","iat":{},"exp":{exp}}}"#, exp.saturating_sub(3600)));
    format!("{header}.{payload}.sig")
}

/// Token expiring `secs` from now.
pub fn jwt_in(sub: &str, secs: u64) -> String {
    jwt(sub, epoch_secs() + secs)
}

/// Token that expired `secs` ago.
pub fn jwt_ago(sub: &str, secs: u64) -> String {
    jwt(sub, epoch_secs().saturating_sub(secs))
}

pub fn user() -> UserRecord {
    UserRecord {
        user_id: "u-1".to_owned(),
        email: "ada@example.com".to_owned(),
        name: "Ada".to_owned(),
        role: "MEMBER".to_owned(),
        profile_pic_url: Some("https://cdn.example.com/ada.png".to_owned()),
        extra: serde_json::Map::new(),
    }
}

/// A session whose access token expires in `access_secs` and refresh token in a week.
pub fn session(access_secs: u64) -> Session {
    Session {
        access_token: jwt_in("access", access_secs),
        refresh_token: Some(jwt_in("refresh", 7 * 24 * 3600)),
        user: user(),
    }
}

/// A refresh response for `user()` with fresh tokens.
pub fn grant(n: u32) -> AuthResponse {
    AuthResponse {
        token: jwt_in(&format!("access-{n}"), 3600),
        refresh_token: Some(jwt_in(&format!("refresh-{n}"), 7 * 24 * 3600)),
        user_id: Some("u-1".to_owned()),
        email: Some("ada@example.com".to_owned()),
        name: Some("Ada Lovelace".to_owned()),
        role: Some("MEMBER".to_owned()),
        profile_pic_url: None,
    }
}

/// Scripted backend: counts calls, replays queued outcomes, and can hold
/// every refresh until the test releases it.
pub struct FakeBackend {
    pub refresh_calls: AtomicU32,
    pub user_calls: AtomicU32,
    refresh_outcomes: Mutex<VecDeque<Result<AuthResponse, TransportError>>>,
    user_outcome: Mutex<Option<Result<UserRecord, TransportError>>>,
    gate: Option<Semaphore>,
}

impl FakeBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::build(None))
    }

    /// Refreshes block until [`FakeBackend::release`] is called.
    pub fn gated() -> Arc<Self> {
        Arc::new(Self::build(Some(Semaphore::new(0))))
    }

    fn build(gate: Option<Semaphore>) -> Self {
        Self {
            refresh_calls: AtomicU32::new(0),
            user_calls: AtomicU32::new(0),
            refresh_outcomes: Mutex::new(VecDeque::new()),
            user_outcome: Mutex::new(None),
            gate,
        }
    }

    pub async fn push_refresh(&self, outcome: Result<AuthResponse, TransportError>) {
        self.refresh_outcomes.lock().await.push_back(outcome);
    }

    pub async fn set_user(&self, outcome: Result<UserRecord, TransportError>) {
        *self.user_outcome.lock().await = Some(outcome);
    }

    pub fn release(&self) {
        if let Some(ref gate) = self.gate {
            gate.add_permits(64);
        }
    }

    pub fn refresh_count(&self) -> u32 {
        self.refresh_calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl AuthBackend for FakeBackend {
    async fn refresh(&self, _refresh_token: &str) -> Result<AuthResponse, TransportError> {
        let n = self.refresh_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(ref gate) = self.gate {
            let _permit = gate.acquire().await;
        }
        self.refresh_outcomes.lock().await.pop_front().unwrap_or_else(|| Ok(grant(n)))
    }

    async fn fetch_user(&self, _access_token: &str) -> Result<UserRecord, TransportError> {
        self.user_calls.fetch_add(1, Ordering::SeqCst);
        self.user_outcome.lock().await.clone().unwrap_or_else(|| Ok(user()))
    }
}

/// Manager over an in-memory store and the given backend.
pub fn manager(backend: Arc<FakeBackend>, persisted: Option<&MemoryBackend>) -> Arc<SessionManager> {
    let store = match persisted {
        Some(mem) => Arc::new(mem.clone()),
        None => Arc::new(MemoryBackend::default()),
    };
    SessionManager::new(backend, store, TokenClock::default(), Duration::from_secs(30))
}

/// Let spawned tasks run to completion.
pub async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}
