// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Token clock: unverified expiry decoding and "expiring soon" checks.
//!
//! Signatures are not verified here; the backend does that. The client
//! only needs the `exp` claim to decide when to refresh.

use std::time::Duration;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::Deserialize;

/// Default refresh margin: refresh five minutes before expiry.
pub const DEFAULT_MARGIN: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Deserialize)]
struct Claims {
    #[serde(default)]
    exp: Option<serde_json::Number>,
}

/// A NumericDate may carry a fraction; floor it to whole seconds.
fn numeric_date(n: &serde_json::Number) -> Option<u64> {
    if let Some(secs) = n.as_u64() {
        return Some(secs);
    }
    let secs = n.as_f64()?;
    (secs.is_finite() && secs >= 0.0).then(|| secs.floor() as u64)
}

/// Decode the `exp` claim (epoch seconds) from a JWT-shaped token.
///
/// Returns `None` for anything that is not `header.payload.signature` with
/// a base64url JSON payload carrying a numeric `exp`.
pub fn token_expiry(token: &str) -> Option<u64> {
    let mut parts = token.split('.');
    let (_header, payload, _sig) = (parts.next()?, parts.next()?, parts.next()?);
    if parts.next().is_some() {
        return None;
    }
    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    let claims: Claims = serde_json::from_slice(&bytes).ok()?;
    claims.exp.as_ref().and_then(numeric_date)
}

/// Expiry arithmetic with a fixed safety margin.
#[derive(Debug, Clone, Copy)]
pub struct TokenClock {
    margin: Duration,
}

impl Default for TokenClock {
    fn default() -> Self {
        Self::new(DEFAULT_MARGIN)
    }
}

impl TokenClock {
    pub fn new(margin: Duration) -> Self {
        Self { margin }
    }

    /// True when `now >= expiry - margin`, or when the token is unparseable.
    pub fn is_expiring_soon(&self, token: &str, now: u64) -> bool {
        match token_expiry(token) {
            Some(exp) => now >= exp.saturating_sub(self.margin.as_secs()),
            None => true,
        }
    }

    /// True when the token is past its expiry, or unparseable.
    ///
    /// Used for refresh tokens, which stay usable right up to expiry.
    pub fn is_expired(&self, token: &str, now: u64) -> bool {
        match token_expiry(token) {
            Some(exp) => now >= exp,
            None => true,
        }
    }

    /// Time left before the token expires (zero when already past).
    pub fn remaining(&self, token: &str, now: u64) -> Option<Duration> {
        token_expiry(token).map(|exp| Duration::from_secs(exp.saturating_sub(now)))
    }

    /// Delay until a proactive refresh is due: `remaining - margin`.
    ///
    /// `Duration::ZERO` means refresh now; `None` means the token is
    /// unparseable (callers treat that as expired).
    pub fn refresh_delay(&self, token: &str, now: u64) -> Option<Duration> {
        self.remaining(token, now).map(|r| r.saturating_sub(self.margin))
    }
}

#[cfg(test)]
#[path = "clock_tests.rs"]
mod tests;
