use anyhow::{Context, Result};
use chrono::FixedOffset;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::{Attachment, ChatClient};
use crate::config::SlackConfig;

/// Slack Web API client authenticated with a bot token.
pub struct SlackClient {
    client: Client,
    base_url: String,
    bot_token: String,
}

#[derive(Serialize)]
struct PostMessage<'a> {
    channel: &'a str,
    text: &'a str,
    #[serde(skip_serializing_if = "no_attachments")]
    attachments: &'a [Attachment],
}

fn no_attachments(attachments: &&[Attachment]) -> bool {
    attachments.is_empty()
}

#[derive(Serialize)]
struct PostEphemeral<'a> {
    channel: &'a str,
    user: &'a str,
    text: &'a str,
}

#[derive(Serialize)]
struct OpenConversation<'a> {
    users: &'a str,
}

#[derive(Serialize)]
struct AddReaction<'a> {
    channel: &'a str,
    timestamp: &'a str,
    name: &'a str,
}

#[derive(Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(flatten)]
    data: Option<T>,
}

#[derive(Deserialize)]
struct Empty {}

#[derive(Deserialize)]
struct OpenedConversation {
    channel: ConversationRef,
}

#[derive(Deserialize)]
struct ConversationRef {
    id: String,
}

#[derive(Deserialize)]
struct UserInfo {
    user: UserProfile,
}

#[derive(Deserialize)]
struct UserProfile {
    #[serde(default)]
    tz_offset: i32,
}

impl SlackClient {
    pub fn new(config: &SlackConfig) -> Result<Self> {
        Ok(Self {
            client: Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            bot_token: config.bot_token.clone(),
        })
    }

    async fn call<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        method: &str,
        body: &B,
    ) -> Result<T> {
        let url = format!("{}/{method}", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.bot_token)
            .json(body)
            .send()
            .await
            .with_context(|| format!("Failed to call Slack {method}"))?;
        Self::unwrap_response(method, response).await
    }

    async fn get<T: DeserializeOwned>(&self, method: &str, query: &[(&str, &str)]) -> Result<T> {
        let url = format!("{}/{method}", self.base_url);
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.bot_token)
            .query(query)
            .send()
            .await
            .with_context(|| format!("Failed to call Slack {method}"))?;
        Self::unwrap_response(method, response).await
    }

    async fn unwrap_response<T: DeserializeOwned>(
        method: &str,
        response: reqwest::Response,
    ) -> Result<T> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Slack {method} error ({}): {}", status, body);
        }
        let body: ApiResponse<T> = response
            .json()
            .await
            .with_context(|| format!("Failed to parse Slack {method} response"))?;
        if !body.ok {
            anyhow::bail!(
                "Slack {method} failed: {}",
                body.error.unwrap_or_else(|| "unknown_error".into())
            );
        }
        body.data
            .with_context(|| format!("Slack {method} response is missing data"))
    }
}

#[async_trait::async_trait]
impl ChatClient for SlackClient {
    fn name(&self) -> &str {
        "slack"
    }

    async fn post_message(
        &self,
        channel: &str,
        text: &str,
        attachments: &[Attachment],
    ) -> Result<()> {
        let _: Empty = self
            .call(
                "chat.postMessage",
                &PostMessage {
                    channel,
                    text,
                    attachments,
                },
            )
            .await?;
        Ok(())
    }

    async fn post_ephemeral(&self, channel: &str, user: &str, text: &str) -> Result<()> {
        let _: Empty = self
            .call("chat.postEphemeral", &PostEphemeral { channel, user, text })
            .await?;
        Ok(())
    }

    async fn send_direct(&self, user: &str, text: &str) -> Result<()> {
        let opened: OpenedConversation = self
            .call("conversations.open", &OpenConversation { users: user })
            .await?;
        self.post_message(&opened.channel.id, text, &[]).await
    }

    async fn add_reaction(&self, channel: &str, message_ts: &str, name: &str) -> Result<()> {
        let _: Empty = self
            .call(
                "reactions.add",
                &AddReaction {
                    channel,
                    timestamp: message_ts,
                    name,
                },
            )
            .await?;
        Ok(())
    }

    async fn user_utc_offset(&self, user: &str) -> Result<FixedOffset> {
        let info: UserInfo = self.get("users.info", &[("user", user)]).await?;
        FixedOffset::east_opt(info.user.tz_offset)
            .with_context(|| format!("Invalid tz_offset {} for {user}", info.user.tz_offset))
    }
}
