// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;
use std::time::Duration;

/// Configuration for the warden session agent.
#[derive(Debug, Clone, clap::Args)]
pub struct WardenConfig {
    /// Base URL of the backend API (refresh and user endpoints hang off it).
    #[arg(long, default_value = "http://localhost:8080/api", env = "WARDEN_API_URL")]
    pub api_url: String,

    /// Path of the token refresh endpoint, relative to `--api-url`.
    #[arg(long, default_value = "/auth/refresh", env = "WARDEN_REFRESH_PATH")]
    pub refresh_path: String,

    /// Path of the current-user endpoint used for background reconciliation.
    #[arg(long, default_value = "/auth/me", env = "WARDEN_USER_PATH")]
    pub user_path: String,

    /// Refresh this many seconds before the access token expires.
    #[arg(long, default_value_t = 300, env = "WARDEN_REFRESH_MARGIN_SECS")]
    pub refresh_margin_secs: u64,

    /// Delay before the scheduler retries after a transport failure.
    #[arg(long, default_value_t = 30, env = "WARDEN_RETRY_BACKOFF_SECS")]
    pub retry_backoff_secs: u64,

    /// Timeout for outbound HTTP requests in seconds.
    #[arg(long, default_value_t = 30, env = "WARDEN_REQUEST_TIMEOUT_SECS")]
    pub request_timeout_secs: u64,

    /// Directory holding the persisted session file.
    #[arg(long, env = "WARDEN_STATE_DIR")]
    pub state_dir: Option<PathBuf>,

    /// Host for the local agent API.
    #[arg(long, default_value = "127.0.0.1", env = "WARDEN_HOST")]
    pub host: String,

    /// Port for the local agent API.
    #[arg(long, default_value_t = 9850, env = "WARDEN_PORT")]
    pub port: u16,

    /// Bearer token for the local agent API. If unset, auth is disabled.
    #[arg(long, env = "WARDEN_AUTH_TOKEN")]
    pub auth_token: Option<String>,
}

impl Default for WardenConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:8080/api".to_owned(),
            refresh_path: "/auth/refresh".to_owned(),
            user_path: "/auth/me".to_owned(),
            refresh_margin_secs: 300,
            retry_backoff_secs: 30,
            request_timeout_secs: 30,
            state_dir: None,
            host: "127.0.0.1".to_owned(),
            port: 9850,
            auth_token: None,
        }
    }
}

impl WardenConfig {
    pub fn refresh_margin(&self) -> Duration {
        Duration::from_secs(self.refresh_margin_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_secs(self.retry_backoff_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn refresh_url(&self) -> String {
        join_url(&self.api_url, &self.refresh_path)
    }

    pub fn user_url(&self) -> String {
        join_url(&self.api_url, &self.user_path)
    }

    /// Resolve the state directory.
    ///
    /// Checks `--state-dir`, then `$XDG_STATE_HOME/warden`,
    /// then `$HOME/.local/state/warden`.
    pub fn state_dir(&self) -> PathBuf {
        if let Some(ref dir) = self.state_dir {
            return dir.clone();
        }
        if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
            return PathBuf::from(xdg).join("warden");
        }
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(".local/state/warden");
        }
        PathBuf::from(".warden")
    }

    pub fn session_file(&self) -> PathBuf {
        self.state_dir().join("session.json")
    }
}

fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}
