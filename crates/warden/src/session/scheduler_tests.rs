// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;
use std::time::Duration;

use crate::session::refresher::RefreshError;
use crate::session::test_support::{grant, jwt_in, manager, session, FakeBackend};
use crate::session::transport::TransportError;
use crate::session::{AuthResponse, LogoutReason};

fn login(access_secs: u64) -> AuthResponse {
    AuthResponse { token: jwt_in("access", access_secs), ..grant(0) }
}

/// With the clock paused, a short sleep returns only once every other task is idle.
async fn quiesce() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

fn secs(d: Option<Duration>) -> u64 {
    d.map(|d| d.as_secs()).unwrap_or(u64::MAX)
}

#[tokio::test(start_paused = true)]
async fn timer_fires_margin_before_expiry() -> anyhow::Result<()> {
    let backend = FakeBackend::new();
    let manager = manager(Arc::clone(&backend), None);

    manager.establish(&login(3600)).await?;
    let due = secs(manager.next_refresh_in().await);
    assert!((3290..=3300).contains(&due), "due in {due}s");

    tokio::time::sleep(Duration::from_secs(3280)).await;
    assert_eq!(backend.refresh_count(), 0);

    tokio::time::sleep(Duration::from_secs(30)).await;
    quiesce().await;
    assert_eq!(backend.refresh_count(), 1);

    // Re-armed for the rotated token.
    assert!(secs(manager.next_refresh_in().await) > 3000);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn token_inside_margin_refreshes_immediately() -> anyhow::Result<()> {
    let backend = FakeBackend::new();
    let manager = manager(Arc::clone(&backend), None);

    let original = manager.establish(&login(60)).await?;
    quiesce().await;

    assert_eq!(backend.refresh_count(), 1);
    let current = manager.current().await.ok_or_else(|| anyhow::anyhow!("no session"))?;
    assert_ne!(current.access_token, original.access_token);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn transport_failure_retries_after_backoff() -> anyhow::Result<()> {
    let backend = FakeBackend::new();
    backend.push_refresh(Err(TransportError::Unavailable("offline".to_owned()))).await;
    let manager = manager(Arc::clone(&backend), None);

    manager.establish(&login(60)).await?;
    quiesce().await;
    assert_eq!(backend.refresh_count(), 1);
    assert!(manager.current().await.is_some());
    let due = secs(manager.next_refresh_in().await);
    assert!((29..=30).contains(&due), "due in {due}s");

    tokio::time::sleep(Duration::from_secs(31)).await;
    quiesce().await;
    assert_eq!(backend.refresh_count(), 2);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn rejection_on_timer_logs_out_and_disarms() -> anyhow::Result<()> {
    let backend = FakeBackend::new();
    backend
        .push_refresh(Err(TransportError::Rejected { status: 403, message: "revoked".to_owned() }))
        .await;
    let manager = manager(Arc::clone(&backend), None);

    manager.establish(&login(60)).await?;
    quiesce().await;

    assert!(manager.current().await.is_none());
    assert!(manager.next_refresh_in().await.is_none());

    tokio::time::sleep(Duration::from_secs(3600)).await;
    assert_eq!(backend.refresh_count(), 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn logout_disarms_timer() -> anyhow::Result<()> {
    let backend = FakeBackend::new();
    let manager = manager(Arc::clone(&backend), None);

    manager.establish(&login(3600)).await?;
    assert!(manager.next_refresh_in().await.is_some());
    manager.logout(LogoutReason::Requested).await;
    assert!(manager.next_refresh_in().await.is_none());

    tokio::time::sleep(Duration::from_secs(7200)).await;
    assert_eq!(backend.refresh_count(), 0);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn short_lived_grant_waits_for_backoff() -> anyhow::Result<()> {
    let backend = FakeBackend::new();
    backend.push_refresh(Ok(AuthResponse { token: jwt_in("short", 10), ..grant(1) })).await;
    let manager = manager(Arc::clone(&backend), None);

    manager.establish(&login(60)).await?;
    quiesce().await;

    assert_eq!(backend.refresh_count(), 1);
    let due = secs(manager.next_refresh_in().await);
    assert!((29..=30).contains(&due), "due in {due}s");
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn establishing_again_replaces_timer() -> anyhow::Result<()> {
    let backend = FakeBackend::new();
    let manager = manager(Arc::clone(&backend), None);

    manager.establish(&login(3600)).await?;
    manager.establish(&login(1200)).await?;
    let due = secs(manager.next_refresh_in().await);
    assert!((890..=900).contains(&due), "due in {due}s");

    tokio::time::sleep(Duration::from_secs(901)).await;
    quiesce().await;
    assert_eq!(backend.refresh_count(), 1);

    // The first timer was cancelled, not merely shadowed.
    tokio::time::sleep(Duration::from_secs(2500)).await;
    quiesce().await;
    assert_eq!(backend.refresh_count(), 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn establish_during_refresh_arms_new_session() -> anyhow::Result<()> {
    let backend = FakeBackend::gated();
    let manager = manager(Arc::clone(&backend), None);
    manager.establish(&login(3600)).await?;

    let old_flight = {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move { manager.acquire_refreshed_session().await })
    };
    quiesce().await;
    assert!(manager.refresh_in_flight().await);

    let replacement = manager.establish(&login(60)).await?;
    quiesce().await;
    backend.release();
    quiesce().await;
    quiesce().await;

    assert_eq!(old_flight.await?, Err(RefreshError::Superseded));
    assert_eq!(backend.refresh_count(), 2);
    let current = manager.current().await.ok_or_else(|| anyhow::anyhow!("no session"))?;
    assert_ne!(current.access_token, replacement.access_token);
    assert!(secs(manager.next_refresh_in().await) > 3000);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn timer_joining_stale_refresh_retries() -> anyhow::Result<()> {
    let backend = FakeBackend::gated();
    let manager = manager(Arc::clone(&backend), None);
    manager.establish(&login(3600)).await?;

    let stale = {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move { manager.acquire_refreshed_session().await })
    };
    quiesce().await;

    // A new session lands while the old refresh still holds the slot.
    let replacement = session(60);
    let generation = manager.store.install(replacement.clone()).await;
    manager.arm(generation, &replacement.access_token).await;
    quiesce().await;
    assert_eq!(backend.refresh_count(), 1);

    backend.release();
    quiesce().await;
    quiesce().await;

    assert_eq!(stale.await?, Err(RefreshError::Superseded));
    assert_eq!(backend.refresh_count(), 2);
    let current = manager.current().await.ok_or_else(|| anyhow::anyhow!("no session"))?;
    assert_ne!(current.access_token, replacement.access_token);
    assert!(secs(manager.next_refresh_in().await) > 3000);
    Ok(())
}
