// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Proactive refresh timer.
//!
//! One timer per manager, armed for `expiry - margin` of the current access
//! token. Re-arming cancels the previous timer. Cancellation goes through a
//! token rather than aborting the task, so a logout that runs inside the
//! timer's own refresh cannot cut it off halfway.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::{BoxFuture, FutureExt};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::session::epoch_secs;
use crate::session::manager::SessionManager;
use crate::session::refresher::RefreshError;

/// The armed refresh timer.
pub(crate) struct ArmedTimer {
    id: u64,
    cancel: CancellationToken,
    fires_at: Instant,
}

impl SessionManager {
    /// Arm the timer for a newly installed session.
    ///
    /// A token already inside the margin (or without a readable expiry)
    /// refreshes immediately.
    pub(super) async fn arm(self: &Arc<Self>, generation: u64, access_token: &str) {
        let delay = self.clock.refresh_delay(access_token, epoch_secs()).unwrap_or_else(|| {
            tracing::debug!("access token has no readable expiry, refreshing now");
            Duration::ZERO
        });
        self.schedule(generation, delay).await;
    }

    /// Re-arm after a successful refresh.
    ///
    /// Waits at least the retry backoff, so a backend that hands out tokens
    /// already inside the margin cannot drive a refresh loop. A token that
    /// lives for less than the backoff is therefore refreshed after it has
    /// expired; requests in between refresh on demand.
    pub(super) async fn arm_after_refresh(self: &Arc<Self>, generation: u64, access_token: &str) {
        let delay = self
            .clock
            .refresh_delay(access_token, epoch_secs())
            .unwrap_or(Duration::ZERO)
            .max(self.retry_backoff);
        self.schedule(generation, delay).await;
    }

    /// Replace the armed timer with one firing after `delay`, unless the
    /// session of `generation` has already ended.
    pub(super) async fn schedule(self: &Arc<Self>, generation: u64, delay: Duration) {
        let mut slot = self.timer.lock().await;
        if let Some(prev) = slot.take() {
            prev.cancel.cancel();
        }
        if self.store.generation().await != generation {
            tracing::debug!("session ended, timer not armed");
            return;
        }

        let id = self.next_id();
        let cancel = CancellationToken::new();
        let fires_at = Instant::now() + delay;
        let manager = Arc::clone(self);
        let token = cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep_until(fires_at) => manager.on_timer_fired(id, generation).await,
            }
        });

        tracing::debug!(timer = id, delay_secs = delay.as_secs(), "refresh timer armed");
        *slot = Some(ArmedTimer { id, cancel, fires_at });
    }

    /// Cancel the armed timer, if any.
    pub async fn disarm(&self) {
        if let Some(timer) = self.timer.lock().await.take() {
            timer.cancel.cancel();
            tracing::debug!(timer = timer.id, "refresh timer disarmed");
        }
    }

    /// Time until the armed timer fires.
    pub async fn next_refresh_in(&self) -> Option<Duration> {
        self.timer
            .lock()
            .await
            .as_ref()
            .map(|t| t.fires_at.saturating_duration_since(Instant::now()))
    }

    /// Boxed: a recoverable failure reschedules, which spawns this again.
    fn on_timer_fired(self: Arc<Self>, id: u64, generation: u64) -> BoxFuture<'static, ()> {
        async move {
            {
                let mut slot = self.timer.lock().await;
                if !slot.as_ref().is_some_and(|t| t.id == id) {
                    // Replaced while firing.
                    return;
                }
                *slot = None;
            }
            if self.store.generation().await != generation {
                return;
            }

            tracing::debug!(timer = id, "proactive refresh due");
            let outcome = self.acquire_refreshed_session().await;
            let still_current = self.store.generation().await == generation;
            match outcome {
                // The settling refresh has re-armed the timer.
                Ok(_) => {}
                // Joined a refresh for an older session; this one still needs its own.
                Err(RefreshError::Superseded) if still_current => {
                    tracing::debug!(timer = id, "joined a stale refresh, retrying");
                    self.schedule(generation, Duration::ZERO).await;
                }
                // Fatal outcomes already logged out in the refresher.
                Err(e) if e.is_fatal() => {
                    tracing::debug!(timer = id, err = %e, "timer refresh ended the session");
                }
                Err(e) => {
                    tracing::warn!(
                        timer = id,
                        err = %e,
                        retry_secs = self.retry_backoff.as_secs(),
                        "timer refresh failed, retrying"
                    );
                    self.schedule(generation, self.retry_backoff).await;
                }
            }
        }
        .boxed()
    }
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
