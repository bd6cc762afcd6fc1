// src/notify/chat.rs

//! Chat webhook provider (Slack-compatible block messages).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use url::Url;

use crate::error::{AppError, Result};
use crate::models::ChannelType;
use crate::notify::{Message, Provider};

/// Stored payload of a chat subscriber.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatSettings {
    pub webhook_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
}

impl ChatSettings {
    pub fn parse(value: &Value) -> Result<Self> {
        let settings: Self = serde_json::from_value(value.clone())
            .map_err(|e| AppError::validation(format!("invalid chat settings: {e}")))?;
        if settings.webhook_url.trim().is_empty() {
            return Err(AppError::validation("webhook_url is required"));
        }
        Url::parse(&settings.webhook_url)
            .map_err(|e| AppError::validation(format!("webhook_url is not a valid URL: {e}")))?;
        Ok(settings)
    }
}

/// Posts block messages to an incoming webhook.
pub struct ChatProvider {
    client: reqwest::Client,
    settings: ChatSettings,
}

impl ChatProvider {
    pub fn new(client: reqwest::Client, settings: &Value) -> Result<Self> {
        let settings =
            ChatSettings::parse(settings).map_err(|e| AppError::provider("chat", e))?;
        Ok(Self { client, settings })
    }

    /// Full webhook payload for a message.
    pub fn payload(&self, message: &Message) -> Value {
        let mut payload = json!({ "blocks": render_blocks(message) });
        if let Some(channel) = &self.settings.channel {
            payload["channel"] = json!(channel);
        }
        payload
    }
}

fn mrkdwn_section(text: String) -> Value {
    json!({
        "type": "section",
        "text": { "type": "mrkdwn", "text": text }
    })
}

/// Render a message as chat blocks.
///
/// Record messages get a field layout; test messages carry their body.
pub fn render_blocks(message: &Message) -> Vec<Value> {
    let mut blocks = vec![json!({
        "type": "header",
        "text": { "type": "plain_text", "text": "🐳 New DHI Adoption" }
    })];

    let Some(record) = &message.record else {
        blocks.push(mrkdwn_section(message.body.clone()));
        return blocks;
    };

    let mut fields = vec![
        json!({
            "type": "mrkdwn",
            "text": format!("*Repository:*\n<{}|{}>", record.github_url, record.repo_full_name)
        }),
        json!({
            "type": "mrkdwn",
            "text": format!("*Stars:*\n{} ⭐", record.stars)
        }),
    ];
    if !record.source_type.is_empty() {
        fields.push(json!({
            "type": "mrkdwn",
            "text": format!("*Source:*\n{}", record.source_type)
        }));
    }
    blocks.push(json!({ "type": "section", "fields": fields }));

    if !record.description.is_empty() {
        blocks.push(mrkdwn_section(format!(
            "*Description:*\n{}",
            record.description
        )));
    }
    if let Some(commit) = record.adoption_commit.as_deref().filter(|c| !c.is_empty()) {
        blocks.push(mrkdwn_section(format!("<{commit}|View Adoption Commit>")));
    }

    blocks
}

#[async_trait]
impl Provider for ChatProvider {
    fn channel(&self) -> ChannelType {
        ChannelType::Chat
    }

    async fn send(&self, message: &Message) -> Result<()> {
        let response = self
            .client
            .post(&self.settings.webhook_url)
            .json(&self.payload(message))
            .send()
            .await
            .map_err(|e| AppError::delivery("chat", format!("sending webhook: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::delivery(
                "chat",
                format!("webhook returned status {}", status.as_u16()),
            ));
        }
        Ok(())
    }
}
