pub mod console;
pub mod slack;

use std::sync::Arc;

use anyhow::Result;
use chrono::FixedOffset;
use serde::Serialize;

use crate::config::SlackConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Color {
    Danger,
    Warning,
    Good,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttachmentField {
    pub value: String,
    pub short: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Attachment {
    pub text: String,
    pub color: Color,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<AttachmentField>,
}

/// Everything the bot can send, one variant per delivery mode.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Message {
        channel: String,
        text: String,
        attachments: Vec<Attachment>,
    },
    Ephemeral {
        channel: String,
        user: String,
        text: String,
    },
    Direct {
        user: String,
        text: String,
    },
}

impl Outbound {
    pub fn message(channel: impl Into<String>, text: impl Into<String>) -> Self {
        Outbound::Message {
            channel: channel.into(),
            text: text.into(),
            attachments: Vec::new(),
        }
    }

    pub fn direct(user: impl Into<String>, text: impl Into<String>) -> Self {
        Outbound::Direct {
            user: user.into(),
            text: text.into(),
        }
    }
}

#[async_trait::async_trait]
pub trait ChatClient: Send + Sync {
    fn name(&self) -> &str;
    async fn post_message(&self, channel: &str, text: &str, attachments: &[Attachment])
    -> Result<()>;
    async fn post_ephemeral(&self, channel: &str, user: &str, text: &str) -> Result<()>;
    async fn send_direct(&self, user: &str, text: &str) -> Result<()>;
    async fn add_reaction(&self, channel: &str, message_ts: &str, name: &str) -> Result<()>;
    /// UTC offset from the member's chat profile.
    async fn user_utc_offset(&self, user: &str) -> Result<FixedOffset>;

    async fn send(&self, msg: &Outbound) -> Result<()> {
        match msg {
            Outbound::Message {
                channel,
                text,
                attachments,
            } => self.post_message(channel, text, attachments).await,
            Outbound::Ephemeral {
                channel,
                user,
                text,
            } => self.post_ephemeral(channel, user, text).await,
            Outbound::Direct { user, text } => self.send_direct(user, text).await,
        }
    }
}

pub fn create_client(config: &SlackConfig) -> Result<Arc<dyn ChatClient>> {
    if config.dry_run || config.bot_token.is_empty() {
        tracing::warn!("Slack dry run: outbound messages are only logged");
        return Ok(Arc::new(console::ConsoleChat));
    }
    Ok(Arc::new(slack::SlackClient::new(config)?))
}
