// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::WardenConfig;
use crate::session::manager::SessionManager;

/// Shared state for the local agent API.
pub struct WardenState {
    pub manager: Arc<SessionManager>,
    pub config: WardenConfig,
    pub shutdown: CancellationToken,
}

impl WardenState {
    pub fn new(
        manager: Arc<SessionManager>,
        config: WardenConfig,
        shutdown: CancellationToken,
    ) -> Self {
        Self { manager, config, shutdown }
    }
}
