//! In-process code host fake shared by pipeline tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::{AppError, Result};
use crate::github::{Adoption, CodeHost, HitRepository, RepoDetails, SearchHit, SearchPage};

/// Scripted [`CodeHost`] recording every call it receives.
#[derive(Default)]
pub struct FakeHost {
    /// Page `n` is served from `pages[n - 1]`; later pages are empty
    pub pages: Vec<SearchPage>,
    /// Number of rate-limit responses to serve before search succeeds
    pub search_rate_limits: AtomicUsize,
    /// Non-rate-limit status that makes every search call fail
    pub search_failure: Option<u16>,
    /// Missing entries answer with a 404
    pub details: HashMap<String, RepoDetails>,
    /// Repositories whose detail lookups are rate limited this many times
    pub detail_rate_limits: Mutex<HashMap<String, usize>>,
    /// Missing entries answer with a 404
    pub adoptions: HashMap<String, Adoption>,
    /// Repositories whose commit lookups are rate limited this many times
    pub adoption_rate_limits: Mutex<HashMap<String, usize>>,

    pub requested_pages: Mutex<Vec<u32>>,
    pub detail_calls: Mutex<Vec<String>>,
    pub adoption_calls: Mutex<Vec<String>>,
}

pub fn hit(full_name: &str, path: &str) -> SearchHit {
    SearchHit {
        path: path.to_string(),
        repository: HitRepository {
            full_name: full_name.to_string(),
            html_url: format!("https://github.com/{full_name}"),
        },
    }
}

pub fn page(total_count: u64, items: Vec<SearchHit>) -> SearchPage {
    SearchPage {
        total_count,
        incomplete_results: false,
        items,
    }
}

pub fn details(full_name: &str, stars: u64) -> RepoDetails {
    RepoDetails {
        full_name: full_name.to_string(),
        html_url: format!("https://github.com/{full_name}"),
        description: Some(format!("{full_name} service")),
        stargazers_count: stars,
        language: Some("Go".to_string()),
    }
}

pub fn adoption(full_name: &str, date: DateTime<Utc>) -> Adoption {
    Adoption {
        date,
        commit_url: format!("https://github.com/{full_name}/commit/abc123"),
    }
}

impl FakeHost {
    /// A single search page listing `repos`, each with details.
    pub fn with_repos(repos: &[(&str, u64)]) -> Self {
        let items = repos.iter().map(|(name, _)| hit(name, "Dockerfile")).collect();
        Self {
            pages: vec![page(repos.len() as u64, items)],
            details: repos
                .iter()
                .map(|(name, stars)| (name.to_string(), details(name, *stars)))
                .collect(),
            ..Self::default()
        }
    }

    pub fn requested_pages(&self) -> Vec<u32> {
        self.requested_pages.lock().unwrap().clone()
    }

    pub fn detail_calls(&self) -> Vec<String> {
        self.detail_calls.lock().unwrap().clone()
    }

    pub fn adoption_calls(&self) -> Vec<String> {
        self.adoption_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl CodeHost for FakeHost {
    async fn search_code(&self, _query: &str, page: u32, _per_page: u32) -> Result<SearchPage> {
        self.requested_pages.lock().unwrap().push(page);

        if let Some(status) = self.search_failure {
            return Err(AppError::api(status, "/search/code", "scripted failure"));
        }
        let limited = self
            .search_rate_limits
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if limited {
            return Err(AppError::rate_limited("/search/code", "scripted rate limit"));
        }

        Ok(self
            .pages
            .get(page as usize - 1)
            .cloned()
            .unwrap_or_default())
    }

    async fn repository(&self, full_name: &str) -> Result<RepoDetails> {
        self.detail_calls.lock().unwrap().push(full_name.to_string());

        {
            let mut limits = self.detail_rate_limits.lock().unwrap();
            if let Some(remaining) = limits.get_mut(full_name).filter(|n| **n > 0) {
                *remaining -= 1;
                return Err(AppError::rate_limited(
                    format!("/repos/{full_name}"),
                    "scripted rate limit",
                ));
            }
        }

        self.details
            .get(full_name)
            .cloned()
            .ok_or_else(|| AppError::api(404, format!("/repos/{full_name}"), "Not Found"))
    }

    async fn first_commit(&self, full_name: &str, _path: &str) -> Result<Adoption> {
        self.adoption_calls
            .lock()
            .unwrap()
            .push(full_name.to_string());

        {
            let mut limits = self.adoption_rate_limits.lock().unwrap();
            if let Some(remaining) = limits.get_mut(full_name).filter(|n| **n > 0) {
                *remaining -= 1;
                return Err(AppError::rate_limited(
                    format!("/repos/{full_name}/commits"),
                    "scripted rate limit",
                ));
            }
        }

        self.adoptions
            .get(full_name)
            .cloned()
            .ok_or_else(|| {
                AppError::api(404, format!("/repos/{full_name}/commits"), "no commits")
            })
    }
}
