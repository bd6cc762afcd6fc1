//! Code host API abstraction.
//!
//! The pipeline only talks to [`CodeHost`]; [`GitHubClient`] is the
//! production implementation and tests substitute in-process fakes.

pub mod client;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::error::Result;

pub use client::GitHubClient;

/// One page of code search results.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchPage {
    pub total_count: u64,
    #[serde(default)]
    pub incomplete_results: bool,
    #[serde(default)]
    pub items: Vec<SearchHit>,
}

/// A single file matching the search query.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchHit {
    pub path: String,
    pub repository: HitRepository,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HitRepository {
    pub full_name: String,
    #[serde(default)]
    pub html_url: String,
}

/// Repository metadata from the detail endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct RepoDetails {
    pub full_name: String,
    pub html_url: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub stargazers_count: u64,
    #[serde(default)]
    pub language: Option<String>,
}

/// Earliest commit touching a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Adoption {
    pub date: DateTime<Utc>,
    pub commit_url: String,
}

/// Operations the refresh pipeline needs from the code host.
///
/// Implementations report the host's rate-limit signal as
/// [`AppError::RateLimited`](crate::error::AppError::RateLimited) and leave
/// back-off to the caller.
#[async_trait]
pub trait CodeHost: Send + Sync {
    /// Fetch one page (1-based) of code search results.
    async fn search_code(&self, query: &str, page: u32, per_page: u32) -> Result<SearchPage>;

    /// Fetch metadata for `owner/name`.
    async fn repository(&self, full_name: &str) -> Result<RepoDetails>;

    /// Locate the earliest commit in `full_name` that touched `path`.
    async fn first_commit(&self, full_name: &str, path: &str) -> Result<Adoption>;
}
