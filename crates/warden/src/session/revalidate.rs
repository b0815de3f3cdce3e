// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Foreground revalidation.
//!
//! Timers do not run while the process is stopped, so a resumed process
//! may hold a token that expired in the meantime. This is a backstop for
//! the scheduler, not a primary refresh path.

use std::sync::Arc;

use nix::sys::signal::Signal;
use serde::Serialize;
use tokio::signal::unix::{signal, SignalKind};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::session::epoch_secs;
use crate::session::manager::SessionManager;

/// Outcome of a foreground check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Revalidation {
    NoSession,
    /// Token outside the margin; nothing to do.
    Fresh,
    Refreshed,
    /// `fatal` means the session was ended.
    Failed { error: String, fatal: bool },
}

impl SessionManager {
    /// Refresh if the current access token is expiring soon.
    pub async fn revalidate_on_foreground(self: &Arc<Self>) -> Revalidation {
        let Some(session) = self.store.snapshot().await else {
            return Revalidation::NoSession;
        };
        if !self.clock.is_expiring_soon(&session.access_token, epoch_secs()) {
            return Revalidation::Fresh;
        }

        tracing::info!("foreground with expiring token, refreshing");
        match self.acquire_refreshed_session().await {
            Ok(_) => Revalidation::Refreshed,
            Err(e) => Revalidation::Failed { error: e.to_string(), fatal: e.is_fatal() },
        }
    }
}

/// Revalidate whenever the process is resumed (`SIGCONT`) until `shutdown`.
pub fn spawn_foreground_listener(
    manager: Arc<SessionManager>,
    shutdown: CancellationToken,
) -> anyhow::Result<JoinHandle<()>> {
    let mut resumed = signal(SignalKind::from_raw(Signal::SIGCONT as i32))?;
    Ok(tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                received = resumed.recv() => {
                    if received.is_none() {
                        break;
                    }
                    let outcome = manager.revalidate_on_foreground().await;
                    tracing::debug!(?outcome, "received SIGCONT");
                }
            }
        }
    }))
}

#[cfg(test)]
#[path = "revalidate_tests.rs"]
mod tests;
