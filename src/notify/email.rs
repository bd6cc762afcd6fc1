// src/notify/email.rs

//! Email provider over an authenticated SMTP relay.

use async_trait::async_trait;
use lettre::message::{Mailbox, header::ContentType};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Tokio1Executor};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AppError, Result};
use crate::models::{ChannelType, SmtpConfig};
use crate::notify::{Message, Provider};

/// Port on which the relay expects implicit TLS instead of STARTTLS.
const IMPLICIT_TLS_PORT: u16 = 465;

/// Stored payload of an email subscriber.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailSettings {
    pub to: String,
    /// Overrides the relay's default sender
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
}

impl EmailSettings {
    pub fn parse(value: &Value) -> Result<Self> {
        let settings: Self = serde_json::from_value(value.clone())
            .map_err(|e| AppError::validation(format!("invalid email settings: {e}")))?;
        if settings.to.trim().is_empty() {
            return Err(AppError::validation("recipient email (to) is required"));
        }
        parse_mailbox("to", &settings.to)?;
        if let Some(from) = settings.from.as_deref().filter(|f| !f.is_empty()) {
            parse_mailbox("from", from)?;
        }
        Ok(settings)
    }
}

fn parse_mailbox(field: &str, address: &str) -> Result<Mailbox> {
    address
        .trim()
        .parse()
        .map_err(|e| AppError::validation(format!("{field} is not a valid address: {e}")))
}

/// Sends plaintext mail through the configured relay.
pub struct EmailProvider {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Mailbox,
}

impl EmailProvider {
    /// Build a provider from a subscriber payload and the relay settings.
    ///
    /// Fails when the payload is invalid or no relay password is configured.
    pub fn new(settings: &Value, smtp: &SmtpConfig) -> Result<Self> {
        let invalid = |e: AppError| AppError::provider("email", e);

        let settings = EmailSettings::parse(settings).map_err(invalid)?;
        let password = smtp
            .password
            .as_deref()
            .filter(|p| !p.is_empty())
            .ok_or_else(|| {
                AppError::provider("email", "SMTP password is required (set SMTP_PASSWORD)")
            })?;

        let from = settings
            .from
            .as_deref()
            .filter(|f| !f.is_empty())
            .unwrap_or(smtp.from.as_str());
        let from = parse_mailbox("from", from).map_err(invalid)?;
        let to = parse_mailbox("to", &settings.to).map_err(invalid)?;

        let builder = if smtp.port == IMPLICIT_TLS_PORT {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&smtp.host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&smtp.host)
        };
        let builder = builder
            .map_err(|e| AppError::provider("email", format!("relay {}: {e}", smtp.host)))?;

        let transport = builder
            .port(smtp.port)
            .credentials(Credentials::new(smtp.username.clone(), password.to_string()))
            .build();

        Ok(Self {
            transport,
            from,
            to,
        })
    }

    fn compose(&self, message: &Message) -> Result<lettre::Message> {
        lettre::Message::builder()
            .from(self.from.clone())
            .to(self.to.clone())
            .subject(message.subject.as_str())
            .header(ContentType::TEXT_PLAIN)
            .body(message.body.clone())
            .map_err(|e| AppError::delivery("email", format!("building message: {e}")))
    }
}

#[async_trait]
impl Provider for EmailProvider {
    fn channel(&self) -> ChannelType {
        ChannelType::Email
    }

    async fn send(&self, message: &Message) -> Result<()> {
        let email = self.compose(message)?;
        self.transport
            .send(email)
            .await
            .map_err(|e| AppError::delivery("email", format!("smtp send failed: {e}")))?;
        Ok(())
    }
}
