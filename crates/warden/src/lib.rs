// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Warden: client-side session and token lifecycle manager.

pub mod client;
pub mod config;
pub mod error;
pub mod session;
pub mod state;
pub mod transport;

use std::sync::{Arc, Once};

use tokio::net::TcpListener;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::config::WardenConfig;
use crate::session::manager::SessionManager;
use crate::session::revalidate::spawn_foreground_listener;
use crate::state::WardenState;
use crate::transport::build_router;

static CRYPTO_INIT: Once = Once::new();

/// Install the ring crypto provider for reqwest/rustls.
/// Only the first call has effect.
pub fn ensure_crypto() {
    CRYPTO_INIT.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

/// Run the session agent until SIGINT or SIGTERM.
pub async fn run(config: WardenConfig) -> anyhow::Result<()> {
    ensure_crypto();
    let addr = format!("{}:{}", config.host, config.port);
    let shutdown = CancellationToken::new();

    let manager = SessionManager::from_config(&config);
    spawn_event_log(manager.subscribe(), shutdown.clone());

    let state = manager.bootstrap().await;
    tracing::info!(
        authenticated = state.is_authenticated(),
        file = %config.session_file().display(),
        "bootstrap complete"
    );

    let foreground = spawn_foreground_listener(Arc::clone(&manager), shutdown.clone())?;
    spawn_signal_handler(shutdown.clone());

    let state = Arc::new(WardenState::new(Arc::clone(&manager), config, shutdown.clone()));
    let router = build_router(state);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("warden listening on {addr}");
    axum::serve(listener, router).with_graceful_shutdown(shutdown.clone().cancelled_owned()).await?;

    shutdown.cancel();
    manager.disarm().await;
    let _ = foreground.await;
    Ok(())
}

fn spawn_signal_handler(shutdown: CancellationToken) {
    tokio::spawn(async move {
        let mut sigterm = signal(SignalKind::terminate()).ok();
        let mut sigint = signal(SignalKind::interrupt()).ok();

        tokio::select! {
            _ = async {
                if let Some(ref mut s) = sigterm { s.recv().await } else { std::future::pending().await }
            } => {
                tracing::info!("received SIGTERM");
            }
            _ = async {
                if let Some(ref mut s) = sigint { s.recv().await } else { std::future::pending().await }
            } => {
                tracing::info!("received SIGINT");
            }
            _ = shutdown.cancelled() => return,
        }
        shutdown.cancel();
    });
}

/// Log session events so operators can follow the lifecycle.
fn spawn_event_log(mut rx: broadcast::Receiver<session::SessionEvent>, shutdown: CancellationToken) {
    tokio::spawn(async move {
        loop {
            let event = tokio::select! {
                _ = shutdown.cancelled() => break,
                event = rx.recv() => event,
            };
            match event {
                Ok(session::SessionEvent::Refreshed { .. }) => {
                    tracing::debug!("session event: refreshed");
                }
                Ok(event) => tracing::debug!(?event, "session event"),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::debug!(skipped = n, "session event log lagged");
                }
                Err(_) => break,
            }
        }
    });
}
