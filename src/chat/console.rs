use anyhow::Result;
use chrono::{FixedOffset, Local, Offset};

use super::{Attachment, ChatClient};

/// Dry-run client: logs what would have been sent.
pub struct ConsoleChat;

#[async_trait::async_trait]
impl ChatClient for ConsoleChat {
    fn name(&self) -> &str {
        "console"
    }

    async fn post_message(
        &self,
        channel: &str,
        text: &str,
        attachments: &[Attachment],
    ) -> Result<()> {
        tracing::info!("[{channel}] {text}");
        for a in attachments {
            let fields: Vec<_> = a.fields.iter().map(|f| f.value.as_str()).collect();
            tracing::info!("[{channel}]   ({:?}) {} {}", a.color, a.text, fields.join(" "));
        }
        Ok(())
    }

    async fn post_ephemeral(&self, channel: &str, user: &str, text: &str) -> Result<()> {
        tracing::info!("[{channel}] (to {user} only) {text}");
        Ok(())
    }

    async fn send_direct(&self, user: &str, text: &str) -> Result<()> {
        tracing::info!("[dm:{user}] {text}");
        Ok(())
    }

    async fn add_reaction(&self, channel: &str, message_ts: &str, name: &str) -> Result<()> {
        tracing::info!("[{channel}] :{name}: on {message_ts}");
        Ok(())
    }

    async fn user_utc_offset(&self, _user: &str) -> Result<FixedOffset> {
        Ok(Local::now().offset().fix())
    }
}
