// src/pipeline/adoption.rs

//! Adoption date lookup and backfill.
//!
//! The adoption date of a record is the date of the earliest commit that
//! touched its matched file. Records without one are retried on every
//! refresh until a lookup succeeds.

use crate::error::Result;
use crate::github::{Adoption, CodeHost};
use crate::models::LookupConfig;
use crate::pipeline::retry::with_single_retry;
use crate::storage::Store;

/// Progress of the backfill phase.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BackfillOutcome {
    pub pending: usize,
    pub updated: usize,
    pub failures: usize,
}

/// Locate the adoption commit, retrying once after a rate limit.
pub async fn locate_adoption(
    host: &dyn CodeHost,
    full_name: &str,
    path: &str,
    config: &LookupConfig,
) -> Result<Adoption> {
    with_single_retry(full_name, config.backoff(), || {
        host.first_commit(full_name, path)
    })
    .await
}

/// Fill in adoption dates for every record that lacks one.
///
/// Best-effort: lookup failures (including a rate limit that outlasts the
/// retry) skip the record. The configured delay follows every record.
pub async fn backfill_adoptions(
    host: &dyn CodeHost,
    store: &dyn Store,
    config: &LookupConfig,
    outcome: &mut BackfillOutcome,
) -> Result<()> {
    let pending = store.records_without_adoption().await?;
    outcome.pending = pending.len();

    if pending.is_empty() {
        log::info!("All records have adoption dates");
        return Ok(());
    }
    log::info!("Fetching adoption dates for {} records...", pending.len());

    for (i, record) in pending.iter().enumerate() {
        log::debug!(
            "Fetching adoption info for {} ({}/{})",
            record.repo_full_name,
            i + 1,
            pending.len()
        );

        match locate_adoption(host, &record.repo_full_name, &record.dockerfile_path, config).await
        {
            Ok(adoption) => {
                match store
                    .set_adoption(record.id, adoption.date, &adoption.commit_url)
                    .await
                {
                    Ok(()) => {
                        log::info!(
                            "Set adoption for {}: {} ({})",
                            record.repo_full_name,
                            adoption.date.format("%Y-%m-%d"),
                            adoption.commit_url
                        );
                        outcome.updated += 1;
                    }
                    Err(e) => {
                        log::error!("Failed to store adoption for {}: {e}", record.repo_full_name);
                        outcome.failures += 1;
                    }
                }
            }
            Err(e) if e.is_rate_limited() => {
                log::warn!(
                    "Still rate limited after retry for {}, skipping: {e}",
                    record.repo_full_name
                );
                outcome.failures += 1;
            }
            Err(e) => {
                log::warn!("No adoption info for {}: {e}", record.repo_full_name);
                outcome.failures += 1;
            }
        }

        tokio::time::sleep(config.delay()).await;
    }

    log::info!(
        "Finished fetching adoption dates: {} updated, {} skipped",
        outcome.updated,
        outcome.failures
    );
    Ok(())
}
