// src/utils/http.rs

//! HTTP client utilities.

use std::time::Duration;

use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue};

use crate::error::{AppError, Result};
use crate::models::GitHubConfig;

/// API version pinned on every request.
pub const API_VERSION: &str = "2022-11-28";

/// Create a configured asynchronous HTTP client for the code host.
///
/// The bearer token, when configured, is attached as a default header so
/// individual requests never handle credentials.
pub fn create_async_client(config: &GitHubConfig) -> Result<reqwest::Client> {
    let mut headers = HeaderMap::new();
    headers.insert(
        ACCEPT,
        HeaderValue::from_static("application/vnd.github+json"),
    );
    headers.insert("X-GitHub-Api-Version", HeaderValue::from_static(API_VERSION));

    if let Some(token) = config.token.as_deref().filter(|t| !t.is_empty()) {
        let mut value = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|_| AppError::config("github token contains invalid characters"))?;
        value.set_sensitive(true);
        headers.insert(AUTHORIZATION, value);
    }

    let client = reqwest::Client::builder()
        .user_agent(&config.user_agent)
        .timeout(Duration::from_secs(config.timeout_secs))
        .default_headers(headers)
        .build()?;
    Ok(client)
}

/// Create a plain client for outbound webhooks.
pub fn create_webhook_client(timeout_secs: u64) -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()?;
    Ok(client)
}
