// src/tracker.rs

//! Operations exposed to the outer surfaces (CLI, HTTP layer).
//!
//! `Tracker` wires the record store, code host and notification providers
//! together and is the only type a front end needs to hold.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::error::{AppError, Result};
use crate::github::{CodeHost, GitHubClient};
use crate::models::{
    AdoptionByDate, Config, NewNotificationConfig, NotificationConfig, NotificationLog, Record,
    RecordFilter, Snapshot, Stats, Window, start_of_week,
};
use crate::notify::{ChannelProviders, Notifier, ProviderFactory, validate_settings};
use crate::pipeline::{
    NextRunFn, RefreshOrchestrator, RefreshStatus, RunReport, StartOutcome, TriggerSource,
};
use crate::storage::{LocalStore, Store};

/// Default span of the adoption history, in days.
pub const DEFAULT_HISTORY_DAYS: u32 = 14;

/// Store aggregates plus the adoptions of the current week.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct TrackerStats {
    #[serde(flatten)]
    pub totals: Stats,
    pub new_this_week: usize,
}

pub struct Tracker {
    config: Arc<Config>,
    store: Arc<dyn Store>,
    notifier: Arc<Notifier>,
    orchestrator: Arc<RefreshOrchestrator>,
}

impl Tracker {
    /// Open the local store and build the GitHub client and providers.
    pub async fn open(config: Config) -> Result<Self> {
        config.validate()?;
        let store = Arc::new(LocalStore::open(&config.storage.dir).await?);
        log::info!("Record store at {}", store.root_dir().display());
        let host = Arc::new(GitHubClient::new(&config.github)?);
        let providers = Arc::new(ChannelProviders::new(config.smtp.clone())?);
        if config.github.token.is_none() {
            log::warn!("GITHUB_TOKEN is not set; code search requires authentication");
        }
        Ok(Self::with_parts(config, store, host, providers))
    }

    pub fn with_parts(
        config: Config,
        store: Arc<dyn Store>,
        host: Arc<dyn CodeHost>,
        providers: Arc<dyn ProviderFactory>,
    ) -> Self {
        let config = Arc::new(config);
        let notifier = Arc::new(Notifier::new(Arc::clone(&store), providers));
        let orchestrator = Arc::new(RefreshOrchestrator::new(
            Arc::clone(&store),
            host,
            Arc::clone(&notifier),
            Arc::clone(&config),
        ));
        Self {
            config,
            store,
            notifier,
            orchestrator,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    // ------------------------------------------------------------------
    // Refresh
    // ------------------------------------------------------------------

    pub async fn start_refresh(&self) -> Result<StartOutcome> {
        self.trigger_refresh(TriggerSource::Manual).await
    }

    pub async fn trigger_refresh(&self, source: TriggerSource) -> Result<StartOutcome> {
        self.orchestrator.start_refresh(source).await
    }

    /// Wait for the refresh started last, if any.
    pub async fn wait_for_refresh(&self) -> Option<RunReport> {
        self.orchestrator.wait_for_completion().await
    }

    pub async fn refresh_status(&self) -> Result<RefreshStatus> {
        self.orchestrator.refresh_status().await
    }

    pub fn set_next_refresh_fn(&self, next: NextRunFn) {
        self.orchestrator.set_next_refresh_fn(next);
    }

    /// Completion time of the last completed refresh.
    pub async fn last_refresh_time(&self) -> Result<Option<DateTime<Utc>>> {
        Ok(self
            .store
            .last_completed_job()
            .await?
            .and_then(|job| job.completed_at))
    }

    /// Start a refresh when no refresh completed within `max_age`.
    ///
    /// Returns `None` when the data is fresh enough.
    pub async fn refresh_if_stale(&self, max_age: Duration) -> Result<Option<StartOutcome>> {
        match self.last_refresh_time().await? {
            Some(last) if Utc::now() - last <= max_age => {
                log::info!("Data is fresh (last refresh {}), skipping startup refresh", last);
                Ok(None)
            }
            last => {
                match last {
                    Some(last) => log::info!("Data is stale (last refresh {last}), refreshing"),
                    None => log::info!("No completed refresh found, refreshing"),
                }
                self.trigger_refresh(TriggerSource::Startup).await.map(Some)
            }
        }
    }

    // ------------------------------------------------------------------
    // Records
    // ------------------------------------------------------------------

    pub async fn list_records(&self, filter: &RecordFilter) -> Result<Vec<Record>> {
        self.store.list_records(filter).await
    }

    /// Records adopted within a lookback window such as `7d` or `thisweek`.
    pub async fn new_records_since(&self, window: &str) -> Result<Vec<Record>> {
        let window: Window = window.parse()?;
        self.new_records_since_at(window, Utc::now()).await
    }

    pub async fn new_records_since_at(
        &self,
        window: Window,
        now: DateTime<Utc>,
    ) -> Result<Vec<Record>> {
        self.store.records_adopted_since(window.since(now)?).await
    }

    pub async fn stats(&self) -> Result<TrackerStats> {
        let totals = self.store.stats().await?;
        let new_this_week = self
            .store
            .count_adopted_since(start_of_week(Utc::now()))
            .await
            .unwrap_or_else(|e| {
                log::warn!("Counting this week's adoptions failed: {e}");
                0
            });
        Ok(TrackerStats {
            totals,
            new_this_week,
        })
    }

    /// Adoptions per day over the last `days` days (default 14).
    pub async fn history(&self, days: Option<u32>) -> Result<Vec<AdoptionByDate>> {
        let days = days.filter(|d| *d > 0).unwrap_or(DEFAULT_HISTORY_DAYS);
        let since = Window::Days(days).since(Utc::now())?.date_naive();
        self.store.adoption_history(since).await
    }

    pub async fn snapshots(&self, limit: usize) -> Result<Vec<Snapshot>> {
        self.store.snapshots(limit).await
    }

    pub async fn source_types(&self) -> Result<Vec<String>> {
        self.store.source_types().await
    }

    // ------------------------------------------------------------------
    // Notification configs
    // ------------------------------------------------------------------

    pub async fn notification_configs(&self) -> Result<Vec<NotificationConfig>> {
        self.store.list_configs().await
    }

    pub async fn notification_config(&self, id: i64) -> Result<NotificationConfig> {
        self.store
            .get_config(id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("notification config {id}")))
    }

    pub async fn create_notification_config(
        &self,
        config: NewNotificationConfig,
    ) -> Result<NotificationConfig> {
        validate_config(&config)?;
        let created = self.store.create_config(config).await?;
        log::info!("Created notification config {} ({})", created.id, created.name);
        Ok(created)
    }

    pub async fn update_notification_config(
        &self,
        id: i64,
        config: NewNotificationConfig,
    ) -> Result<NotificationConfig> {
        validate_config(&config)?;
        self.store.update_config(id, config).await
    }

    pub async fn delete_notification_config(&self, id: i64) -> Result<()> {
        self.store.delete_config(id).await
    }

    pub async fn send_test(&self, config_id: i64) -> Result<()> {
        self.notifier.send_test(config_id).await
    }

    pub async fn notification_logs(
        &self,
        config_id: i64,
        limit: usize,
    ) -> Result<Vec<NotificationLog>> {
        self.store.logs_for_config(config_id, limit).await
    }
}

fn validate_config(config: &NewNotificationConfig) -> Result<()> {
    let channel = config.validate()?;
    validate_settings(channel, &config.settings)
}
