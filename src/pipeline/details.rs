// src/pipeline/details.rs

//! Repository detail fetching and merge into the record store.

use crate::error::Result;
use crate::github::{CodeHost, RepoDetails};
use crate::models::{LookupConfig, RecordUpsert};
use crate::pipeline::retry::with_single_retry;
use crate::pipeline::search::Discovered;
use crate::storage::Store;

/// Progress of the detail phase.
///
/// Updated in place so the caller still sees partial counts when the phase
/// is cut short by a deadline.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DetailOutcome {
    pub total: usize,
    pub merged: usize,
    pub fetch_failures: usize,
    pub store_failures: usize,
}

/// Fetch repository metadata, retrying once after a rate limit.
pub async fn fetch_details(
    host: &dyn CodeHost,
    full_name: &str,
    config: &LookupConfig,
) -> Result<RepoDetails> {
    with_single_retry(full_name, config.backoff(), || host.repository(full_name)).await
}

/// Fetch details for every discovered repository and upsert the results.
///
/// A failed lookup or upsert skips that repository only. The configured
/// delay is applied after every lookup, successful or not.
pub async fn merge_discovered(
    host: &dyn CodeHost,
    store: &dyn Store,
    discovered: &Discovered,
    config: &LookupConfig,
    source_type: &str,
    outcome: &mut DetailOutcome,
) {
    outcome.total = discovered.len();

    for (i, (full_name, path)) in discovered.iter().enumerate() {
        log::info!("Fetching details for {} ({}/{})", full_name, i + 1, outcome.total);

        match fetch_details(host, full_name, config).await {
            Ok(details) => {
                let scan = RecordUpsert {
                    repo_full_name: details.full_name,
                    github_url: details.html_url,
                    stars: details.stargazers_count,
                    description: details.description.unwrap_or_default(),
                    primary_language: details.language.unwrap_or_default(),
                    dockerfile_path: path.clone(),
                    source_type: source_type.to_string(),
                    adopted_at: None,
                };
                match store.upsert_record(scan).await {
                    Ok(_) => outcome.merged += 1,
                    Err(e) => {
                        log::error!("Failed to store {full_name}: {e}");
                        outcome.store_failures += 1;
                    }
                }
            }
            Err(e) => {
                if e.is_transient() {
                    log::warn!("Skipping {full_name} after transient error: {e}");
                } else {
                    log::warn!("Skipping {full_name}: {e}");
                }
                outcome.fetch_failures += 1;
            }
        }

        tokio::time::sleep(config.delay()).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RecordFilter;
    use crate::pipeline::testing::FakeHost;
    use crate::storage::LocalStore;
    use std::collections::HashMap;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::time::Instant;

    fn discovered(names: &[&str]) -> Discovered {
        names
            .iter()
            .map(|n| (n.to_string(), "Dockerfile".to_string()))
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_lookup_skips_only_that_repository() {
        let tmp = TempDir::new().unwrap();
        let store = LocalStore::open(tmp.path()).await.unwrap();
        let mut host = FakeHost::with_repos(&[("acme/a", 10), ("acme/b", 20), ("acme/c", 30)]);
        host.details.remove("acme/b");

        let mut outcome = DetailOutcome::default();
        merge_discovered(
            &host,
            &store,
            &discovered(&["acme/a", "acme/b", "acme/c"]),
            &LookupConfig::default(),
            "dockerfile",
            &mut outcome,
        )
        .await;

        assert_eq!(outcome.merged, 2);
        assert_eq!(outcome.fetch_failures, 1);

        let names: Vec<_> = store
            .list_records(&RecordFilter::default())
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.repo_full_name)
            .collect();
        assert_eq!(names, vec!["acme/c", "acme/a"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limited_lookup_retries_once() {
        let host = FakeHost {
            detail_rate_limits: std::sync::Mutex::new(HashMap::from([(
                "acme/a".to_string(),
                1,
            )])),
            ..FakeHost::with_repos(&[("acme/a", 10)])
        };
        let config = LookupConfig {
            delay_ms: 1_000,
            rate_limit_backoff_secs: 60,
        };

        let start = Instant::now();
        let details = fetch_details(&host, "acme/a", &config).await.unwrap();

        assert_eq!(details.stargazers_count, 10);
        assert_eq!(host.detail_calls().len(), 2);
        assert!(start.elapsed() >= Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_rate_limit_is_a_skip() {
        let host = FakeHost {
            detail_rate_limits: std::sync::Mutex::new(HashMap::from([(
                "acme/a".to_string(),
                2,
            )])),
            ..FakeHost::with_repos(&[("acme/a", 10)])
        };

        let err = fetch_details(&host, "acme/a", &LookupConfig::default())
            .await
            .unwrap_err();
        assert!(err.is_rate_limited());
        assert_eq!(host.detail_calls().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_applies_after_every_lookup() {
        let tmp = TempDir::new().unwrap();
        let store = LocalStore::open(tmp.path()).await.unwrap();
        let host = FakeHost::with_repos(&[("acme/a", 1)]);
        let config = LookupConfig {
            delay_ms: 1_000,
            rate_limit_backoff_secs: 60,
        };

        let start = Instant::now();
        let mut outcome = DetailOutcome::default();
        merge_discovered(
            &host,
            &store,
            &discovered(&["acme/a", "acme/missing"]),
            &config,
            "dockerfile",
            &mut outcome,
        )
        .await;

        assert_eq!(outcome.total, 2);
        assert!(start.elapsed() >= Duration::from_secs(2));
    }
}
