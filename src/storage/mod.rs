//! Storage abstractions for tracker persistence.
//!
//! Four logical collections are kept: records, refresh jobs, snapshots and
//! notification configs with their delivery logs. Every mutation is a
//! single-row insert or an update keyed by a unique id or repository name,
//! so no multi-row transactions are required.
//!
//! ## Directory Structure
//!
//! ```text
//! storage/
//! ├── records.json          # Tracked repositories
//! ├── jobs.json             # Refresh job history
//! ├── snapshots.json        # Append-only aggregate stats
//! └── notifications.json    # Subscriber configs + delivery logs
//! ```

pub mod local;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use crate::error::Result;
use crate::models::{
    AdoptionByDate, NewNotificationConfig, NewNotificationLog, NotificationConfig,
    NotificationLog, Record, RecordFilter, RecordUpsert, RefreshJob, Snapshot, Stats,
};

// Re-export for convenience
pub use local::LocalStore;

/// Trait for record store backends.
#[async_trait]
pub trait Store: Send + Sync {
    // Records

    /// Insert or merge a record keyed by repository name.
    ///
    /// Scan fields are last-write-wins; an existing adoption date is kept.
    async fn upsert_record(&self, scan: RecordUpsert) -> Result<Record>;

    async fn list_records(&self, filter: &RecordFilter) -> Result<Vec<Record>>;

    /// Distinct non-empty source types, sorted.
    async fn source_types(&self) -> Result<Vec<String>>;

    async fn stats(&self) -> Result<Stats>;

    async fn records_without_adoption(&self) -> Result<Vec<Record>>;

    async fn set_adoption(&self, record_id: i64, at: DateTime<Utc>, commit_url: &str)
    -> Result<()>;

    /// Records adopted at or after `since`, most recent first.
    async fn records_adopted_since(&self, since: DateTime<Utc>) -> Result<Vec<Record>>;

    async fn count_adopted_since(&self, since: DateTime<Utc>) -> Result<usize>;

    /// Per-day adoption counts from `since` with running totals.
    async fn adoption_history(&self, since: NaiveDate) -> Result<Vec<AdoptionByDate>>;

    // Refresh jobs

    /// Create a job in `pending`.
    async fn create_job(&self) -> Result<RefreshJob>;
    async fn start_job(&self, id: i64) -> Result<()>;
    async fn complete_job(&self, id: i64, records_found: usize) -> Result<()>;
    async fn fail_job(&self, id: i64, message: &str) -> Result<()>;
    async fn latest_job(&self) -> Result<Option<RefreshJob>>;
    async fn last_completed_job(&self) -> Result<Option<RefreshJob>>;

    // Snapshots

    async fn record_snapshot(&self, stats: Stats) -> Result<Snapshot>;

    /// Most recent first; `0` means no limit.
    async fn snapshots(&self, limit: usize) -> Result<Vec<Snapshot>>;

    // Notification configs

    async fn create_config(&self, config: NewNotificationConfig) -> Result<NotificationConfig>;
    async fn update_config(
        &self,
        id: i64,
        config: NewNotificationConfig,
    ) -> Result<NotificationConfig>;
    async fn delete_config(&self, id: i64) -> Result<()>;
    async fn get_config(&self, id: i64) -> Result<Option<NotificationConfig>>;
    async fn list_configs(&self) -> Result<Vec<NotificationConfig>>;
    async fn enabled_configs(&self) -> Result<Vec<NotificationConfig>>;
    async fn touch_config_triggered(&self, id: i64) -> Result<()>;

    // Notification logs

    async fn append_log(&self, entry: NewNotificationLog) -> Result<NotificationLog>;

    /// Newest first; `0` means no limit.
    async fn logs_for_config(&self, config_id: i64, limit: usize) -> Result<Vec<NotificationLog>>;
}
