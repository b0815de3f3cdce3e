// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session persistence: three logical keys written and cleared together.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::session::{Session, UserRecord};

/// On-disk layout. Fields are optional so that files written by older
/// clients (or edited by hand) still load; the bootstrapper decides what a
/// partial layout means.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedSession {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<UserRecord>,
}

impl From<&Session> for PersistedSession {
    fn from(session: &Session) -> Self {
        Self {
            auth_token: Some(session.access_token.clone()),
            refresh_token: session.refresh_token.clone(),
            user: Some(session.user.clone()),
        }
    }
}

impl PersistedSession {
    /// Empty strings are treated like missing keys.
    pub fn access_token(&self) -> Option<&str> {
        self.auth_token.as_deref().filter(|t| !t.is_empty())
    }

    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_deref().filter(|t| !t.is_empty())
    }
}

/// Durable storage for the session. Every write replaces all three keys.
pub trait SessionBackend: Send + Sync {
    fn load(&self) -> anyhow::Result<Option<PersistedSession>>;
    fn save(&self, session: &PersistedSession) -> anyhow::Result<()>;
    fn clear(&self) -> anyhow::Result<()>;
}

/// JSON file backend with atomic writes (write tmp + rename).
pub struct FileBackend {
    path: PathBuf,
}

impl FileBackend {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SessionBackend for FileBackend {
    fn load(&self) -> anyhow::Result<Option<PersistedSession>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&self.path)?;
        let session: PersistedSession = serde_json::from_str(&contents)?;
        Ok(Some(session))
    }

    /// Uses a unique temp filename (PID + counter) so concurrent saves never
    /// share a `.tmp` file; a shorter write could otherwise leave trailing
    /// bytes from a longer one.
    fn save(&self, session: &PersistedSession) -> anyhow::Result<()> {
        use std::sync::atomic::{AtomicU32, Ordering};
        static COUNTER: AtomicU32 = AtomicU32::new(0);

        if let Some(dir) = self.path.parent() {
            if !dir.as_os_str().is_empty() && !dir.exists() {
                std::fs::create_dir_all(dir)?;
            }
        }
        let json = serde_json::to_string_pretty(session)?;
        let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
        let tmp_name = format!(
            "{}.{}.{}.tmp",
            self.path.file_name().unwrap_or_default().to_string_lossy(),
            std::process::id(),
            seq,
        );
        let tmp_path = self.path.with_file_name(tmp_name);
        std::fs::write(&tmp_path, json)?;
        std::fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }

    fn clear(&self) -> anyhow::Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-memory backend. Clones share the same slot.
#[derive(Debug, Default, Clone)]
pub struct MemoryBackend {
    slot: Arc<Mutex<Option<PersistedSession>>>,
}

impl MemoryBackend {
    pub fn with(session: PersistedSession) -> Self {
        Self { slot: Arc::new(Mutex::new(Some(session))) }
    }

    /// Current contents, for inspection.
    pub fn snapshot(&self) -> Option<PersistedSession> {
        self.slot.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl SessionBackend for MemoryBackend {
    fn load(&self) -> anyhow::Result<Option<PersistedSession>> {
        Ok(self.snapshot())
    }

    fn save(&self, session: &PersistedSession) -> anyhow::Result<()> {
        *self.slot.lock().unwrap_or_else(|e| e.into_inner()) = Some(session.clone());
        Ok(())
    }

    fn clear(&self) -> anyhow::Result<()> {
        *self.slot.lock().unwrap_or_else(|e| e.into_inner()) = None;
        Ok(())
    }
}

#[cfg(test)]
#[path = "persist_tests.rs"]
mod tests;
