// src/error.rs

//! Unified error handling for the tracker.
//!
//! Retry decisions are made on the variant, never on the message text:
//! `RateLimited` triggers back-off at the calling layer, transient `Api`
//! errors skip the current unit of work, and everything else during the
//! search phase fails the refresh job.

use std::fmt;

use thiserror::Error;

/// Result type alias for tracker operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// The code host signalled its rate limit (HTTP 403/429)
    #[error("Rate limited on {endpoint}: {message}")]
    RateLimited { endpoint: String, message: String },

    /// Non-success response other than a rate limit
    #[error("API error {status} on {endpoint}: {message}")]
    Api {
        status: u16,
        endpoint: String,
        message: String,
    },

    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Input or subscriber payload validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// A notification provider could not be constructed
    #[error("Invalid {channel} provider: {message}")]
    Provider { channel: String, message: String },

    /// A notification provider failed to deliver
    #[error("{channel} delivery failed: {message}")]
    Delivery { channel: String, message: String },

    /// Record store failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Lookup by id found nothing
    #[error("Not found: {0}")]
    NotFound(String),

    /// An operation exceeded its deadline
    #[error("Timed out: {0}")]
    Timeout(String),
}

impl AppError {
    /// Create a rate-limit error for an endpoint.
    pub fn rate_limited(endpoint: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::RateLimited {
            endpoint: endpoint.into(),
            message: message.to_string(),
        }
    }

    /// Create an API error from a status code.
    pub fn api(status: u16, endpoint: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Api {
            status,
            endpoint: endpoint.into(),
            message: message.to_string(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a provider construction error.
    pub fn provider(channel: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Provider {
            channel: channel.into(),
            message: message.to_string(),
        }
    }

    /// Create a delivery error.
    pub fn delivery(channel: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Delivery {
            channel: channel.into(),
            message: message.to_string(),
        }
    }

    /// Create a storage error.
    pub fn storage(message: impl fmt::Display) -> Self {
        Self::Storage(message.to_string())
    }

    /// Create a not-found error.
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    /// Create a deadline error.
    pub fn timeout(what: impl fmt::Display) -> Self {
        Self::Timeout(what.to_string())
    }

    /// Whether this error is the code host's rate-limit signal.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }

    /// Whether retrying the same unit of work later could succeed.
    ///
    /// Server errors and transport failures are transient; client errors
    /// (bad query, missing repository) are not.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::RateLimited { .. } | Self::Timeout(_) => true,
            Self::Api { status, .. } => *status >= 500,
            Self::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            _ => false,
        }
    }
}
