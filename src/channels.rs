use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::context::BotContext;
use crate::model::{Channel, Standuper, SubmissionDays};
use crate::settings;

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("Unknown channel {0}")]
    Unknown(String),
    #[error("{0}")]
    Invalid(String),
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// Per-channel settings to change. Absent fields keep their value.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ChannelUpdate {
    pub submission_days: Option<String>,
    pub timezone: Option<String>,
    pub warning_offset_minutes: Option<i64>,
    pub reports_enabled: Option<bool>,
    pub onboarding_message: Option<String>,
}

/// Applies `update` to a known channel. Nothing is saved unless every field
/// is valid.
pub async fn update(
    ctx: &BotContext,
    channel_id: &str,
    update: ChannelUpdate,
) -> Result<Channel, ChannelError> {
    let mut channel = ctx
        .store
        .get_channel(channel_id)
        .await?
        .ok_or_else(|| ChannelError::Unknown(channel_id.to_string()))?;

    if let Some(days) = update.submission_days {
        channel.submission_days = days
            .parse::<SubmissionDays>()
            .map_err(|e| ChannelError::Invalid(e.to_string()))?;
    }
    if let Some(timezone) = update.timezone {
        let timezone = timezone.trim();
        if timezone.is_empty() {
            return Err(ChannelError::Invalid("timezone cannot be empty".into()));
        }
        channel.timezone = timezone.to_string();
    }
    if let Some(minutes) = update.warning_offset_minutes {
        settings::validate_warning_offset(minutes)
            .map_err(|e| ChannelError::Invalid(e.to_string()))?;
        channel.warning_offset_minutes = minutes;
    }
    if let Some(enabled) = update.reports_enabled {
        channel.reports_enabled = enabled;
    }
    if let Some(message) = update.onboarding_message {
        channel.onboarding_message = message.trim().to_string();
    }

    ctx.store.save_channel(channel.clone()).await?;
    tracing::info!("Settings updated for {channel_id}");
    Ok(channel)
}

/// A channel, its members and a readable summary of both.
#[derive(Debug, Clone, Serialize)]
pub struct Overview {
    pub channel: Channel,
    pub members: Vec<Standuper>,
    pub text: String,
}

pub async fn show(ctx: &BotContext, channel_id: &str) -> Result<Overview, ChannelError> {
    let channel = ctx
        .store
        .get_channel(channel_id)
        .await?
        .ok_or_else(|| ChannelError::Unknown(channel_id.to_string()))?;
    let members = ctx.store.list_standupers(channel_id).await?;

    let deadline = if channel.has_deadline() {
        ctx.text("show_deadline", &[("deadline", &channel.deadline)])
    } else {
        ctx.text("show_no_deadline", &[])
    };
    let text = if members.is_empty() {
        format!("{}\n{deadline}", ctx.text("show_no_standupers", &[]))
    } else {
        let names: Vec<_> = members
            .iter()
            .map(|m| format!("{}({})", m.display_name, m.role.as_str()))
            .collect();
        let days = if channel.submission_days.is_empty() {
            ctx.text("show_no_submission_days", &[])
        } else {
            ctx.text(
                "show_submission_days",
                &[("days", &channel.submission_days.to_string())],
            )
        };
        [
            ctx.text_count(
                "show_standupers",
                members.len(),
                &[("standupers", &names.join(", "))],
            ),
            deadline,
            ctx.text("show_timezone", &[("tz", &channel.timezone)]),
            days,
        ]
        .join("\n")
    };

    Ok(Overview {
        channel,
        members,
        text,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Arrival {
    /// The channel was unknown and is now monitored with default settings.
    Created,
    /// The new member got the channel's onboarding message.
    Greeted,
    Ignored,
}

/// Someone, possibly the bot itself, joined a chat channel. Unknown channels
/// are registered; members joining a known channel get its onboarding
/// message as a direct message.
pub async fn member_joined(
    ctx: &BotContext,
    channel_id: &str,
    channel_name: &str,
    user_id: &str,
) -> anyhow::Result<Arrival> {
    let settings = ctx.settings.current();
    let Some(channel) = ctx.store.get_channel(channel_id).await? else {
        let channel = Channel::new(
            settings.workspace_id.clone(),
            channel_id,
            channel_name,
            settings.warning_offset_minutes,
        );
        ctx.store.save_channel(channel).await?;
        tracing::info!("Channel {channel_id} (#{channel_name}) registered on join");
        return Ok(Arrival::Created);
    };

    if settings.bot_user_id.as_deref() == Some(user_id) {
        return Ok(Arrival::Ignored);
    }
    let text = if channel.onboarding_message.is_empty() {
        ctx.text("onboarding_default", &[("channel", &channel.name)])
    } else {
        channel.onboarding_message.clone()
    };
    ctx.chat.send_direct(user_id, &text).await?;
    tracing::info!("Sent onboarding message for {channel_id} to {user_id}");
    Ok(Arrival::Greeted)
}
