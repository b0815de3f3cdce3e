// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! OAuth callback: the backend redirects to the client with the session in
//! the query string.

use std::collections::HashMap;

use anyhow::Context;
use reqwest::Url;

use crate::session::AuthResponse;

#[derive(Debug, Clone, PartialEq)]
pub enum CallbackOutcome {
    Success { response: AuthResponse, is_new_user: bool },
    /// The provider or backend reported an error.
    Failed { error: String },
}

/// Parse a callback redirect URL.
///
/// Requires `token`, `userId`, `email`, `name` and `role`; an `error`
/// parameter takes precedence over everything else.
pub fn parse_callback(url: &str) -> anyhow::Result<CallbackOutcome> {
    let url = Url::parse(url).context("invalid callback url")?;
    let params: HashMap<String, String> = url
        .query_pairs()
        .filter(|(_, v)| !v.is_empty())
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    if let Some(error) = params.get("error") {
        return Ok(CallbackOutcome::Failed { error: error.clone() });
    }

    let get = |key: &str| params.get(key).cloned();
    let (Some(token), Some(user_id), Some(email), Some(name), Some(role)) =
        (get("token"), get("userId"), get("email"), get("name"), get("role"))
    else {
        anyhow::bail!("authentication data incomplete");
    };

    Ok(CallbackOutcome::Success {
        response: AuthResponse {
            token,
            refresh_token: get("refreshToken"),
            user_id: Some(user_id),
            email: Some(email),
            name: Some(name),
            role: Some(role),
            profile_pic_url: get("profilePicUrl"),
        },
        is_new_user: params.get("isNewUser").is_some_and(|v| v == "true"),
    })
}
