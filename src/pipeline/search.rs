// src/pipeline/search.rs

//! Code search crawler.
//!
//! Pages through search results and collects one file path per repository.
//! Rate limits are waited out and the same page is retried with no retry
//! ceiling; callers bound the crawl by dropping the future (for example via
//! `tokio::time::timeout`).

use std::collections::BTreeMap;

use crate::error::Result;
use crate::github::CodeHost;
use crate::models::SearchConfig;

/// Repository full name to the first matching file path seen for it.
pub type Discovered = BTreeMap<String, String>;

/// Crawl every search result page.
///
/// Stops after a partial page, once the reported total is covered, or at
/// `max_pages` (the code host truncates results past that point, so this
/// is not an error). Fails only on a non-rate-limit API error.
pub async fn crawl(host: &dyn CodeHost, config: &SearchConfig) -> Result<Discovered> {
    let per_page = config.per_page;
    let mut repos = Discovered::new();
    let mut page: u32 = 1;

    loop {
        log::info!("Searching page {page}...");
        let results = match host.search_code(&config.query, page, per_page).await {
            Ok(results) => results,
            Err(e) if e.is_rate_limited() => {
                log::warn!(
                    "Search rate limited on page {page}, waiting {}s...",
                    config.backoff().as_secs()
                );
                tokio::time::sleep(config.backoff()).await;
                continue;
            }
            Err(e) => return Err(e),
        };

        if results.incomplete_results {
            log::debug!("Page {page} reported incomplete results");
        }

        let item_count = results.items.len();
        for item in results.items {
            repos
                .entry(item.repository.full_name)
                .or_insert(item.path);
        }

        log::info!(
            "Page {page}: {item_count} items, {} unique repositories so far",
            repos.len()
        );

        let covered = u64::from(page) * u64::from(per_page);
        if item_count < per_page as usize || covered >= results.total_count {
            break;
        }
        if page >= config.max_pages {
            log::info!("Reached the search result ceiling at page {page}");
            break;
        }

        page += 1;
        tokio::time::sleep(config.page_delay()).await;
    }

    Ok(repos)
}
