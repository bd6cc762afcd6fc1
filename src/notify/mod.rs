// src/notify/mod.rs

//! Notification dispatch to subscriber channels.
//!
//! Providers are resolved per config by channel tag through a
//! [`ProviderFactory`]. A provider that cannot be built, or a send that
//! fails, is recorded in the notification log and never stops the fan-out.

pub mod chat;
pub mod email;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::{AppError, Result};
use crate::models::{
    ChannelType, NewNotificationLog, NotificationConfig, Record, SmtpConfig,
};
use crate::storage::Store;
use crate::utils::http::create_webhook_client;

pub use chat::{ChatProvider, ChatSettings};
pub use email::{EmailProvider, EmailSettings};

/// Subject line of operator test sends.
pub const TEST_SUBJECT: &str = "DHI OSS Tracker - Test Notification";

/// Webhook request timeout.
const WEBHOOK_TIMEOUT_SECS: u64 = 30;

/// Channel-agnostic notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub subject: String,
    pub body: String,
    /// `None` for test sends
    pub record: Option<Record>,
}

impl Message {
    /// Announce a newly adopted record.
    pub fn for_record(record: &Record) -> Self {
        let mut body = format!(
            "New DHI Adoption Detected!\n\n\
             Repository: {}\n\
             Stars: {} ⭐\n\
             Description: {}\n\
             Language: {}\n\
             File: {}\n\
             GitHub: {}\n\
             Source: {}\n",
            record.repo_full_name,
            record.stars,
            record.description,
            record.primary_language,
            record.dockerfile_path,
            record.github_url,
            record.source_type,
        );
        if let Some(adopted) = record.adopted_at {
            body.push_str(&format!("Adopted: {}\n", adopted.format("%Y-%m-%d")));
        }
        if let Some(commit) = record.adoption_commit.as_deref().filter(|c| !c.is_empty()) {
            body.push_str(&format!("Commit: {commit}\n"));
        }

        Self {
            subject: format!(
                "New DHI Adoption: {} ({}⭐)",
                record.repo_full_name, record.stars
            ),
            body,
            record: Some(record.clone()),
        }
    }

    /// Describe a config so an operator can verify its channel.
    pub fn test_for(config: &NotificationConfig, now: DateTime<Utc>) -> Self {
        Self {
            subject: TEST_SUBJECT.to_string(),
            body: format!(
                "This is a test notification from DHI OSS Tracker.\n\n\
                 Notification: {}\n\
                 Type: {}\n\
                 Time: {}",
                config.name,
                config.channel,
                now.to_rfc2822()
            ),
            record: None,
        }
    }
}

/// A delivery channel.
#[async_trait]
pub trait Provider: Send + Sync {
    fn channel(&self) -> ChannelType;

    async fn send(&self, message: &Message) -> Result<()>;
}

/// Builds the provider for a stored config.
pub trait ProviderFactory: Send + Sync {
    /// Fails with a `Provider` or `Validation` error when the config cannot
    /// be turned into a working provider.
    fn build(&self, config: &NotificationConfig) -> Result<Box<dyn Provider>>;
}

/// Default factory for the chat and email channels.
pub struct ChannelProviders {
    http: reqwest::Client,
    smtp: SmtpConfig,
}

impl ChannelProviders {
    pub fn new(smtp: SmtpConfig) -> Result<Self> {
        Ok(Self {
            http: create_webhook_client(WEBHOOK_TIMEOUT_SECS)?,
            smtp,
        })
    }
}

impl ProviderFactory for ChannelProviders {
    fn build(&self, config: &NotificationConfig) -> Result<Box<dyn Provider>> {
        match config.channel_type()? {
            ChannelType::Chat => Ok(Box::new(ChatProvider::new(
                self.http.clone(),
                &config.settings,
            )?)),
            ChannelType::Email => Ok(Box::new(EmailProvider::new(&config.settings, &self.smtp)?)),
        }
    }
}

/// Check a channel payload without building a provider.
///
/// Environment-level requirements (SMTP credentials) are not checked here.
pub fn validate_settings(channel: ChannelType, settings: &serde_json::Value) -> Result<()> {
    match channel {
        ChannelType::Chat => ChatSettings::parse(settings).map(drop),
        ChannelType::Email => EmailSettings::parse(settings).map(drop),
    }
}

/// Counts from one fan-out pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchSummary {
    pub configs: usize,
    pub sent: usize,
    pub failed: usize,
}

/// Fans new records out to every enabled subscriber.
pub struct Notifier {
    store: Arc<dyn Store>,
    providers: Arc<dyn ProviderFactory>,
}

impl Notifier {
    pub fn new(store: Arc<dyn Store>, providers: Arc<dyn ProviderFactory>) -> Self {
        Self { store, providers }
    }

    /// Notify every enabled config about every record.
    ///
    /// One log row is written per (config, record) attempt. A config whose
    /// provider cannot be built gets a single failed row with no record.
    /// `last_triggered_at` is updated for each config whose records were
    /// processed, whether or not the sends succeeded.
    pub async fn notify_new_records(&self, records: &[Record]) -> Result<DispatchSummary> {
        let mut summary = DispatchSummary::default();
        if records.is_empty() {
            return Ok(summary);
        }

        let configs = self.store.enabled_configs().await?;
        log::info!(
            "Sending notifications for {} new records to {} subscribers",
            records.len(),
            configs.len()
        );

        for config in configs {
            summary.configs += 1;

            let provider = match self.providers.build(&config) {
                Ok(provider) => provider,
                Err(e) => {
                    log::warn!("Notification config {} ({}): {e}", config.id, config.name);
                    self.log_attempt(NewNotificationLog::failed(
                        config.id,
                        None,
                        format!("failed to create provider: {e}"),
                    ))
                    .await;
                    summary.failed += 1;
                    continue;
                }
            };

            for record in records {
                let message = Message::for_record(record);
                let entry = match provider.send(&message).await {
                    Ok(()) => {
                        summary.sent += 1;
                        NewNotificationLog::sent(config.id, Some(record.id))
                    }
                    Err(e) => {
                        log::warn!(
                            "Notification to {} about {} failed: {e}",
                            config.name,
                            record.repo_full_name
                        );
                        summary.failed += 1;
                        NewNotificationLog::failed(config.id, Some(record.id), e)
                    }
                };
                self.log_attempt(entry).await;
            }

            if let Err(e) = self.store.touch_config_triggered(config.id).await {
                log::error!("Failed to update trigger time of config {}: {e}", config.id);
            }
        }

        Ok(summary)
    }

    /// Send a test message through one config and log the outcome.
    pub async fn send_test(&self, config_id: i64) -> Result<()> {
        let config = self
            .store
            .get_config(config_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("notification config {config_id}")))?;

        let provider = self.providers.build(&config)?;
        let message = Message::test_for(&config, Utc::now());

        match provider.send(&message).await {
            Ok(()) => {
                self.log_attempt(NewNotificationLog::sent(config_id, None))
                    .await;
                log::info!("Test notification sent through {}", config.name);
                Ok(())
            }
            Err(e) => {
                self.log_attempt(NewNotificationLog::failed(config_id, None, &e))
                    .await;
                Err(e)
            }
        }
    }

    async fn log_attempt(&self, entry: NewNotificationLog) {
        if let Err(e) = self.store.append_log(entry).await {
            log::error!("Failed to write notification log: {e}");
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Recording providers for dispatcher tests.

    use std::sync::Mutex;

    use super::*;

    /// Records every message; fails sends when `fail` is set.
    pub struct RecordingProvider {
        pub channel: ChannelType,
        pub fail: bool,
        pub sent: Arc<Mutex<Vec<Message>>>,
    }

    #[async_trait]
    impl Provider for RecordingProvider {
        fn channel(&self) -> ChannelType {
            self.channel
        }

        async fn send(&self, message: &Message) -> Result<()> {
            if self.fail {
                return Err(AppError::delivery(self.channel.as_str(), "scripted failure"));
            }
            self.sent.lock().unwrap().push(message.clone());
            Ok(())
        }
    }

    /// Chat configs get a recording provider; email configs fail to build.
    #[derive(Default)]
    pub struct RecordingFactory {
        pub sent: Arc<Mutex<Vec<Message>>>,
        pub failing_sends: bool,
    }

    impl RecordingFactory {
        pub fn sent(&self) -> Vec<Message> {
            self.sent.lock().unwrap().clone()
        }
    }

    impl ProviderFactory for RecordingFactory {
        fn build(&self, config: &NotificationConfig) -> Result<Box<dyn Provider>> {
            match config.channel_type()? {
                ChannelType::Chat => Ok(Box::new(RecordingProvider {
                    channel: ChannelType::Chat,
                    fail: self.failing_sends,
                    sent: Arc::clone(&self.sent),
                })),
                ChannelType::Email => Err(AppError::provider("email", "to is required")),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::RecordingFactory;
    use super::*;
    use crate::models::{DeliveryStatus, NewNotificationConfig, RecordUpsert};
    use crate::storage::LocalStore;
    use chrono::TimeZone;
    use serde_json::json;
    use tempfile::TempDir;

    async fn setup() -> (TempDir, Arc<LocalStore>) {
        let tmp = TempDir::new().unwrap();
        let store = Arc::new(LocalStore::open(tmp.path()).await.unwrap());
        (tmp, store)
    }

    async fn add_config(store: &LocalStore, name: &str, channel: &str) -> NotificationConfig {
        store
            .create_config(NewNotificationConfig {
                name: name.to_string(),
                channel: channel.to_string(),
                enabled: true,
                settings: json!({}),
            })
            .await
            .unwrap()
    }

    async fn add_record(store: &LocalStore, name: &str) -> Record {
        store
            .upsert_record(RecordUpsert {
                repo_full_name: name.to_string(),
                github_url: format!("https://github.com/{name}"),
                stars: 1500,
                description: "An API".to_string(),
                primary_language: "Go".to_string(),
                dockerfile_path: "Dockerfile".to_string(),
                source_type: "dockerfile".to_string(),
                adopted_at: None,
            })
            .await
            .unwrap()
    }

    #[test]
    fn test_record_message_renders_fields() {
        let now = Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap();
        let mut record = Record::create(
            1,
            RecordUpsert {
                repo_full_name: "acme/api".to_string(),
                github_url: "https://github.com/acme/api".to_string(),
                stars: 42,
                description: "Payments API".to_string(),
                primary_language: "Go".to_string(),
                dockerfile_path: "Dockerfile".to_string(),
                source_type: "dockerfile".to_string(),
                adopted_at: None,
            },
            now,
        );
        record.adopted_at = Some(now);
        record.adoption_commit = Some("https://github.com/acme/api/commit/abc".to_string());

        let message = Message::for_record(&record);
        assert_eq!(message.subject, "New DHI Adoption: acme/api (42⭐)");
        assert!(message.body.contains("Repository: acme/api\n"));
        assert!(message.body.contains("Description: Payments API\n"));
        assert!(message.body.contains("Language: Go\n"));
        assert!(message.body.contains("File: Dockerfile\n"));
        assert!(message.body.contains("Adopted: 2024-01-15\n"));
        assert!(message.body.contains("Commit: https://github.com/acme/api/commit/abc"));
    }

    #[tokio::test]
    async fn test_empty_record_set_is_a_no_op() {
        let (_tmp, store) = setup().await;
        let config = add_config(&store, "chat", "chat").await;
        let factory = Arc::new(RecordingFactory::default());
        let notifier = Notifier::new(store.clone(), factory.clone());

        let summary = notifier.notify_new_records(&[]).await.unwrap();

        assert_eq!(summary, DispatchSummary::default());
        assert!(store.logs_for_config(config.id, 0).await.unwrap().is_empty());
        let config = store.get_config(config.id).await.unwrap().unwrap();
        assert!(config.last_triggered_at.is_none());
    }

    #[tokio::test]
    async fn test_broken_config_does_not_block_others() {
        let (_tmp, store) = setup().await;
        let broken = add_config(&store, "mail", "email").await;
        let working = add_config(&store, "chat", "chat").await;
        let records = vec![
            add_record(&store, "acme/a").await,
            add_record(&store, "acme/b").await,
        ];

        let factory = Arc::new(RecordingFactory::default());
        let notifier = Notifier::new(store.clone(), factory.clone());
        let summary = notifier.notify_new_records(&records).await.unwrap();

        assert_eq!(summary.sent, 2);
        assert_eq!(factory.sent().len(), 2);

        let logs = store.logs_for_config(working.id, 0).await.unwrap();
        assert_eq!(logs.len(), 2);
        assert!(logs.iter().all(|l| l.status == DeliveryStatus::Sent));
        assert!(logs.iter().all(|l| l.record_id.is_some()));

        let logs = store.logs_for_config(broken.id, 0).await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].status, DeliveryStatus::Failed);
        assert_eq!(logs[0].record_id, None);
        assert!(
            logs[0]
                .error_message
                .as_deref()
                .unwrap()
                .starts_with("failed to create provider")
        );

        let working = store.get_config(working.id).await.unwrap().unwrap();
        assert!(working.last_triggered_at.is_some());
    }

    #[tokio::test]
    async fn test_failed_sends_still_touch_config() {
        let (_tmp, store) = setup().await;
        let config = add_config(&store, "chat", "chat").await;
        let records = vec![add_record(&store, "acme/a").await];

        let factory = Arc::new(RecordingFactory {
            failing_sends: true,
            ..RecordingFactory::default()
        });
        let notifier = Notifier::new(store.clone(), factory);
        let summary = notifier.notify_new_records(&records).await.unwrap();

        assert_eq!(summary.failed, 1);
        let logs = store.logs_for_config(config.id, 0).await.unwrap();
        assert_eq!(logs[0].status, DeliveryStatus::Failed);
        assert_eq!(logs[0].record_id, Some(records[0].id));
        let config = store.get_config(config.id).await.unwrap().unwrap();
        assert!(config.last_triggered_at.is_some());
    }

    #[tokio::test]
    async fn test_unknown_channel_is_logged_and_skipped() {
        let (_tmp, store) = setup().await;
        let pager = add_config(&store, "pager", "pager").await;
        let records = vec![add_record(&store, "acme/a").await];

        let notifier = Notifier::new(store.clone(), Arc::new(RecordingFactory::default()));
        notifier.notify_new_records(&records).await.unwrap();

        let logs = store.logs_for_config(pager.id, 0).await.unwrap();
        assert_eq!(logs.len(), 1);
        assert!(
            logs[0]
                .error_message
                .as_deref()
                .unwrap()
                .contains("unknown notification type: pager")
        );
    }

    #[tokio::test]
    async fn test_send_test_logs_without_record() {
        let (_tmp, store) = setup().await;
        let config = add_config(&store, "team chat", "chat").await;
        let factory = Arc::new(RecordingFactory::default());
        let notifier = Notifier::new(store.clone(), factory.clone());

        notifier.send_test(config.id).await.unwrap();

        let sent = factory.sent();
        assert_eq!(sent[0].subject, TEST_SUBJECT);
        assert!(sent[0].body.contains("Notification: team chat"));
        assert!(sent[0].record.is_none());

        let logs = store.logs_for_config(config.id, 0).await.unwrap();
        assert_eq!(logs[0].status, DeliveryStatus::Sent);
        assert_eq!(logs[0].record_id, None);

        assert!(matches!(
            notifier.send_test(999).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[test]
    fn test_validate_settings_per_channel() {
        assert!(
            validate_settings(
                ChannelType::Chat,
                &json!({ "webhook_url": "https://hooks.example.com/T1" })
            )
            .is_ok()
        );
        assert!(validate_settings(ChannelType::Chat, &json!({})).is_err());
        assert!(validate_settings(ChannelType::Email, &json!({ "to": "ops@example.com" })).is_ok());
        assert!(matches!(
            validate_settings(ChannelType::Email, &json!({ "from": "x@example.com" })),
            Err(AppError::Validation(_))
        ));
    }
}
