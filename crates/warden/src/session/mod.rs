// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session and token lifecycle.
//!
//! A [`manager::SessionManager`] owns the persisted session, the single
//! in-flight refresh and the proactive refresh timer. Every trigger that
//! wants a fresh token (timer, outbound 401, foreground signal, bootstrap)
//! funnels through [`manager::SessionManager::acquire_refreshed_session`].

pub mod bootstrap;
pub mod callback;
pub mod clock;
pub mod manager;
pub mod persist;
pub mod refresher;
pub mod revalidate;
pub mod scheduler;
pub mod store;
pub mod transport;

#[cfg(test)]
pub(crate) mod test_support;

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Identity and profile of the signed-in user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub user_id: String,
    pub email: String,
    pub name: String,
    #[serde(default)]
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_pic_url: Option<String>,
    /// Fields the backend sent that this client does not interpret.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl UserRecord {
    /// Merge the user fields of an auth response over this record.
    ///
    /// Identity fields are only taken when the response carries a complete
    /// identity (`userId`, `email`, `name`). Fields absent from the response
    /// keep their previous value.
    pub fn merged_with(&self, resp: &AuthResponse) -> UserRecord {
        let mut merged = self.clone();
        if let (Some(user_id), Some(email), Some(name)) =
            (&resp.user_id, &resp.email, &resp.name)
        {
            merged.user_id = user_id.clone();
            merged.email = email.clone();
            merged.name = name.clone();
            if let Some(ref role) = resp.role {
                merged.role = role.clone();
            }
            if resp.profile_pic_url.is_some() {
                merged.profile_pic_url = resp.profile_pic_url.clone();
            }
        }
        merged
    }
}

/// Body returned by login, registration and refresh endpoints.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_pic_url: Option<String>,
}

impl AuthResponse {
    /// Build a fresh user record, if the response carries a complete identity.
    pub fn user_record(&self) -> Option<UserRecord> {
        Some(UserRecord {
            user_id: self.user_id.clone()?,
            email: self.email.clone()?,
            name: self.name.clone()?,
            role: self.role.clone().unwrap_or_default(),
            profile_pic_url: self.profile_pic_url.clone(),
            extra: serde_json::Map::new(),
        })
    }

    /// The rotated refresh token, with empty strings treated as absent.
    pub fn rotated_refresh_token(&self) -> Option<String> {
        self.refresh_token.clone().filter(|t| !t.is_empty())
    }
}

/// An authenticated session. Only ever replaced as a whole.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub user: UserRecord,
}

impl Session {
    /// Build a session from a login, registration or OAuth callback response.
    pub fn from_login(resp: &AuthResponse) -> Option<Session> {
        if resp.token.is_empty() {
            return None;
        }
        Some(Session {
            access_token: resp.token.clone(),
            refresh_token: resp.rotated_refresh_token(),
            user: resp.user_record()?,
        })
    }

    /// The session that results from applying a refresh response.
    ///
    /// A response without a refresh token keeps the current one.
    pub fn refreshed(&self, resp: &AuthResponse) -> Session {
        Session {
            access_token: resp.token.clone(),
            refresh_token: resp.rotated_refresh_token().or_else(|| self.refresh_token.clone()),
            user: self.user.merged_with(resp),
        }
    }
}

/// Published authentication state.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum AuthState {
    Unauthenticated,
    Authenticated { user: UserRecord },
}

impl AuthState {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated { .. })
    }
}

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogoutReason {
    /// Explicit logout by the user or an API caller.
    Requested,
    /// The refresh endpoint rejected the refresh token.
    Rejected,
    /// The refresh token was missing, unparseable or expired locally.
    Unrecoverable,
    /// A request stayed unauthorized after its one retry.
    Unauthorized,
}

impl std::fmt::Display for LogoutReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Requested => "requested",
            Self::Rejected => "rejected",
            Self::Unrecoverable => "unrecoverable",
            Self::Unauthorized => "unauthorized",
        })
    }
}

/// Events emitted by the session manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    /// A new session was installed from a login response.
    Established { user_id: String },
    /// A persisted session was accepted at startup.
    Restored { user_id: String },
    /// Tokens were rotated; dependants should switch to `access_token`.
    Refreshed { access_token: String },
    /// A refresh attempt failed.
    #[serde(rename = "refresh:failed")]
    RefreshFailed { error: String, fatal: bool },
    /// The session was destroyed.
    LoggedOut { reason: LogoutReason },
}

/// Return current epoch seconds.
pub fn epoch_secs() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs()
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
