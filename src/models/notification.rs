// src/models/notification.rs

//! Notification subscriber configs and delivery audit rows.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Delivery channel of a subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelType {
    /// Webhook-style chat message (Slack-compatible blocks)
    Chat,
    /// Plaintext email through the SMTP relay
    Email,
}

impl ChannelType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelType::Chat => "chat",
            ChannelType::Email => "email",
        }
    }
}

impl fmt::Display for ChannelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChannelType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "chat" | "slack" => Ok(ChannelType::Chat),
            "email" => Ok(ChannelType::Email),
            other => Err(AppError::validation(format!(
                "unknown notification type: {other}"
            ))),
        }
    }
}

/// A stored subscriber definition.
///
/// `channel` is kept as the raw stored tag so that configs written by an
/// older or foreign management tool still load; it is resolved with
/// [`NotificationConfig::channel_type`] when a provider is needed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NotificationConfig {
    pub id: i64,
    pub name: String,
    pub channel: String,
    pub enabled: bool,
    /// Channel-specific payload, opaque to the store
    pub settings: serde_json::Value,
    pub last_triggered_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl NotificationConfig {
    pub fn channel_type(&self) -> Result<ChannelType> {
        self.channel.parse()
    }
}

/// Fields supplied when creating or replacing a config.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewNotificationConfig {
    pub name: String,
    pub channel: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub settings: serde_json::Value,
}

fn default_enabled() -> bool {
    true
}

impl NewNotificationConfig {
    /// Check the fields common to every channel.
    pub fn validate(&self) -> Result<ChannelType> {
        if self.name.trim().is_empty() {
            return Err(AppError::validation("name is required"));
        }
        if self.settings.is_null() {
            return Err(AppError::validation("settings are required"));
        }
        self.channel.parse()
    }
}

/// Outcome of one delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Sent,
    Failed,
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeliveryStatus::Sent => f.write_str("sent"),
            DeliveryStatus::Failed => f.write_str("failed"),
        }
    }
}

/// Append-only delivery audit row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NotificationLog {
    pub id: i64,
    pub config_id: i64,
    /// `None` for test sends and provider setup failures
    pub record_id: Option<i64>,
    pub status: DeliveryStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub sent_at: DateTime<Utc>,
}

/// Audit row before the store assigns id and timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewNotificationLog {
    pub config_id: i64,
    pub record_id: Option<i64>,
    pub status: DeliveryStatus,
    pub error_message: Option<String>,
}

impl NewNotificationLog {
    pub fn sent(config_id: i64, record_id: Option<i64>) -> Self {
        Self {
            config_id,
            record_id,
            status: DeliveryStatus::Sent,
            error_message: None,
        }
    }

    pub fn failed(config_id: i64, record_id: Option<i64>, error: impl fmt::Display) -> Self {
        Self {
            config_id,
            record_id,
            status: DeliveryStatus::Failed,
            error_message: Some(error.to_string()),
        }
    }
}
