//! Application configuration structures.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Code host connection settings
    #[serde(default)]
    pub github: GitHubConfig,

    /// Code search crawl behavior
    #[serde(default)]
    pub search: SearchConfig,

    /// Repository detail lookups
    #[serde(default)]
    pub details: LookupConfig,

    /// First-commit (adoption date) lookups
    #[serde(default = "defaults::adoption_lookup")]
    pub adoption: LookupConfig,

    /// Refresh job behavior
    #[serde(default)]
    pub refresh: RefreshConfig,

    /// Record store location
    #[serde(default)]
    pub storage: StorageConfig,

    /// SMTP relay used by email subscribers
    #[serde(default)]
    pub smtp: SmtpConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            github: GitHubConfig::default(),
            search: SearchConfig::default(),
            details: LookupConfig::default(),
            adoption: defaults::adoption_lookup(),
            refresh: RefreshConfig::default(),
            storage: StorageConfig::default(),
            smtp: SmtpConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Apply environment overrides for secrets and deployment paths.
    ///
    /// - `GITHUB_TOKEN`: code host token
    /// - `DATA_DIR`: storage directory
    /// - `SMTP_PASSWORD`: SMTP relay password (API key)
    pub fn apply_env(mut self) -> Self {
        if let Ok(token) = std::env::var("GITHUB_TOKEN") {
            if !token.is_empty() {
                self.github.token = Some(token);
            }
        }
        if let Ok(dir) = std::env::var("DATA_DIR") {
            if !dir.is_empty() {
                self.storage.dir = PathBuf::from(dir);
            }
        }
        if let Ok(password) = std::env::var("SMTP_PASSWORD") {
            if !password.is_empty() {
                self.smtp.password = Some(password);
            }
        }
        self
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.github.user_agent.trim().is_empty() {
            return Err(AppError::validation("github.user_agent is empty"));
        }
        if self.github.timeout_secs == 0 {
            return Err(AppError::validation("github.timeout_secs must be > 0"));
        }
        if !(1..=100).contains(&self.search.per_page) {
            return Err(AppError::validation("search.per_page must be within 1..=100"));
        }
        if self.search.max_pages == 0 {
            return Err(AppError::validation("search.max_pages must be > 0"));
        }
        if self.search.query.trim().is_empty() {
            return Err(AppError::validation("search.query is empty"));
        }
        if self.refresh.timeout_secs == 0 {
            return Err(AppError::validation("refresh.timeout_secs must be > 0"));
        }
        for (key, hours) in [
            ("refresh.stale_after_hours", self.refresh.stale_after_hours),
            ("refresh.interval_hours", self.refresh.interval_hours),
        ] {
            if hours > MAX_SCHEDULE_HOURS {
                return Err(AppError::validation(format!(
                    "{key} must be at most {MAX_SCHEDULE_HOURS}"
                )));
            }
        }
        Ok(())
    }
}

/// Code host connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubConfig {
    /// API base URL
    #[serde(default = "defaults::api_url")]
    pub api_url: String,

    /// Bearer token (prefer the `GITHUB_TOKEN` environment variable)
    #[serde(default, skip_serializing)]
    pub token: Option<String>,

    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Per-request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            api_url: defaults::api_url(),
            token: None,
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
        }
    }
}

/// Code search crawl behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Code search query
    #[serde(default = "defaults::query")]
    pub query: String,

    /// Results per page (the API caps this at 100)
    #[serde(default = "defaults::per_page")]
    pub per_page: u32,

    /// Hard page ceiling; the API stops returning results past 1000 hits
    #[serde(default = "defaults::max_pages")]
    pub max_pages: u32,

    /// Delay between successful pages in milliseconds
    #[serde(default = "defaults::page_delay")]
    pub page_delay_ms: u64,

    /// Back-off before retrying a rate-limited page
    #[serde(default = "defaults::backoff")]
    pub rate_limit_backoff_secs: u64,
}

impl SearchConfig {
    pub fn page_delay(&self) -> Duration {
        Duration::from_millis(self.page_delay_ms)
    }

    pub fn backoff(&self) -> Duration {
        Duration::from_secs(self.rate_limit_backoff_secs)
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            query: defaults::query(),
            per_page: defaults::per_page(),
            max_pages: defaults::max_pages(),
            page_delay_ms: defaults::page_delay(),
            rate_limit_backoff_secs: defaults::backoff(),
        }
    }
}

/// Pacing for per-repository lookups.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LookupConfig {
    /// Delay after every lookup in milliseconds
    #[serde(default = "defaults::detail_delay")]
    pub delay_ms: u64,

    /// Back-off before the single retry of a rate-limited lookup
    #[serde(default = "defaults::backoff")]
    pub rate_limit_backoff_secs: u64,
}

impl LookupConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    pub fn backoff(&self) -> Duration {
        Duration::from_secs(self.rate_limit_backoff_secs)
    }
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self {
            delay_ms: defaults::detail_delay(),
            rate_limit_backoff_secs: defaults::backoff(),
        }
    }
}

/// Refresh job behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshConfig {
    /// Overall deadline for one refresh run
    #[serde(default = "defaults::refresh_timeout")]
    pub timeout_secs: u64,

    /// Classification tag stamped on records found through code search
    #[serde(default = "defaults::source_type")]
    pub source_type: String,

    /// Age after which stored data counts as stale at startup
    #[serde(default = "defaults::stale_after")]
    pub stale_after_hours: u64,

    /// Interval of the built-in scheduler (0 disables it)
    #[serde(default = "defaults::interval")]
    pub interval_hours: u64,
}

/// Upper bound for the staleness threshold and the scheduler interval.
pub const MAX_SCHEDULE_HOURS: u64 = 24 * 366 * 100;

impl RefreshConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// `None` above [`MAX_SCHEDULE_HOURS`].
    pub fn stale_after(&self) -> Option<chrono::Duration> {
        schedule_hours(self.stale_after_hours)
    }

    /// `None` above [`MAX_SCHEDULE_HOURS`].
    pub fn interval(&self) -> Option<chrono::Duration> {
        schedule_hours(self.interval_hours)
    }
}

fn schedule_hours(hours: u64) -> Option<chrono::Duration> {
    if hours > MAX_SCHEDULE_HOURS {
        return None;
    }
    i64::try_from(hours).ok().and_then(chrono::Duration::try_hours)
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            timeout_secs: defaults::refresh_timeout(),
            source_type: defaults::source_type(),
            stale_after_hours: defaults::stale_after(),
            interval_hours: defaults::interval(),
        }
    }
}

/// Record store location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "defaults::storage_dir")]
    pub dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            dir: defaults::storage_dir(),
        }
    }
}

/// SMTP relay used by email subscribers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    #[serde(default = "defaults::smtp_host")]
    pub host: String,

    #[serde(default = "defaults::smtp_port")]
    pub port: u16,

    #[serde(default = "defaults::smtp_username")]
    pub username: String,

    /// Relay password (prefer the `SMTP_PASSWORD` environment variable)
    #[serde(default, skip_serializing)]
    pub password: Option<String>,

    /// Default sender; a subscriber's `from` overrides it
    #[serde(default = "defaults::smtp_from")]
    pub from: String,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: defaults::smtp_host(),
            port: defaults::smtp_port(),
            username: defaults::smtp_username(),
            password: None,
            from: defaults::smtp_from(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "defaults::log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::log_level(),
        }
    }
}

mod defaults {
    use std::path::PathBuf;

    use super::LookupConfig;

    // GitHub defaults
    pub fn api_url() -> String {
        "https://api.github.com".into()
    }
    pub fn user_agent() -> String {
        "dhi-tracker/0.1".into()
    }
    pub fn timeout() -> u64 {
        30
    }

    // Search defaults
    pub fn query() -> String {
        r#""dhi.io" language:Dockerfile"#.into()
    }
    pub fn per_page() -> u32 {
        100
    }
    pub fn max_pages() -> u32 {
        10
    }
    pub fn page_delay() -> u64 {
        // Code search allows roughly 10 requests per minute
        6_000
    }
    pub fn backoff() -> u64 {
        60
    }

    // Lookup defaults
    pub fn detail_delay() -> u64 {
        1_000
    }
    pub fn adoption_lookup() -> LookupConfig {
        LookupConfig {
            delay_ms: 500,
            rate_limit_backoff_secs: backoff(),
        }
    }

    // Refresh defaults
    pub fn refresh_timeout() -> u64 {
        600
    }
    pub fn source_type() -> String {
        "dockerfile".into()
    }
    pub fn stale_after() -> u64 {
        24
    }
    pub fn interval() -> u64 {
        24
    }

    pub fn storage_dir() -> PathBuf {
        PathBuf::from("storage")
    }

    // SMTP defaults
    pub fn smtp_host() -> String {
        "smtp.sendgrid.net".into()
    }
    pub fn smtp_port() -> u16 {
        587
    }
    pub fn smtp_username() -> String {
        "apikey".into()
    }
    pub fn smtp_from() -> String {
        "noreply@dhi-tracker.local".into()
    }

    pub fn log_level() -> String {
        "info".into()
    }
}
