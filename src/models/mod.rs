// src/models/mod.rs

//! Domain models for the tracker.
//!
//! This module contains all data structures used throughout the application,
//! organized by their primary purpose.

mod config;
mod job;
mod notification;
mod record;
mod window;

// Re-export all public types
pub use config::{
    Config, GitHubConfig, LoggingConfig, LookupConfig, RefreshConfig, SearchConfig, SmtpConfig,
    StorageConfig,
};
pub use job::{AdoptionByDate, JobStatus, RefreshJob, Snapshot, Stats};
pub use notification::{
    ChannelType, DeliveryStatus, NewNotificationConfig, NewNotificationLog, NotificationConfig,
    NotificationLog,
};
pub use record::{
    NOTABLE_STARS, POPULAR_STARS, Record, RecordFilter, RecordUpsert, SortField, SortOrder,
};
pub use window::{Window, start_of_week};
