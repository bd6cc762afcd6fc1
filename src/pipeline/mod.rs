//! Refresh pipeline: search, details, adoption backfill and orchestration.
//!
//! - `search`: crawl code search into a repository -> path map
//! - `details`: fetch metadata and merge into the record store
//! - `adoption`: backfill first-commit adoption dates
//! - `refresh`: run the phases as one guarded background job

pub mod adoption;
pub mod details;
pub mod guard;
pub mod refresh;
pub mod retry;
pub mod search;

#[cfg(test)]
pub(crate) mod testing;

pub use refresh::{
    NextRunFn, RefreshOrchestrator, RefreshStatus, RunReport, StartOutcome, TriggerSource,
};
