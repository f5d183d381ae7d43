use anyhow::Result;
use chrono::Utc;

use crate::context::BotContext;
use crate::model::{Channel, Role, Standuper};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Membership {
    Joined { deadline: Option<String> },
    AlreadyMember,
    Left,
    NotMember,
}

impl Membership {
    pub fn reply(&self, ctx: &BotContext) -> String {
        match self {
            Membership::Joined {
                deadline: Some(deadline),
            } => ctx.text("welcome_with_deadline", &[("deadline", deadline)]),
            Membership::Joined { deadline: None } => ctx.text("welcome_no_deadline", &[]),
            Membership::AlreadyMember => ctx.text("already_standuper", &[]),
            Membership::Left => ctx.text("left_standupers", &[]),
            Membership::NotMember => ctx.text("not_standuper", &[]),
        }
    }
}

/// Enrolls the user in the channel's standups, creating the channel on first
/// use.
pub async fn join(
    ctx: &BotContext,
    channel_id: &str,
    channel_name: &str,
    user_id: &str,
    display_name: &str,
    role: Role,
) -> Result<Membership> {
    let enrolled = ctx.store.standupers_by_user(user_id).await?;
    if enrolled.iter().any(|s| s.channel_id == channel_id) {
        return Ok(Membership::AlreadyMember);
    }

    let settings = ctx.settings.current();
    let channel = match ctx.store.get_channel(channel_id).await? {
        Some(channel) => channel,
        None => {
            let channel = Channel::new(
                settings.workspace_id.clone(),
                channel_id,
                channel_name,
                settings.warning_offset_minutes,
            );
            ctx.store.save_channel(channel.clone()).await?;
            tracing::info!("Channel {channel_id} (#{channel_name}) created");
            channel
        }
    };

    ctx.store
        .add_standuper(Standuper {
            workspace_id: settings.workspace_id.clone(),
            channel_id: channel.channel_id.clone(),
            channel_name: channel.name.clone(),
            user_id: user_id.to_string(),
            display_name: display_name.to_string(),
            role,
            created_at: Utc::now(),
        })
        .await?;
    tracing::info!("{user_id} joined standups in {channel_id} as {}", role.as_str());

    Ok(Membership::Joined {
        deadline: channel.has_deadline().then(|| channel.deadline.clone()),
    })
}

pub async fn quit(ctx: &BotContext, channel_id: &str, user_id: &str) -> Result<Membership> {
    if ctx.store.remove_standuper(user_id, channel_id).await? {
        tracing::info!("{user_id} left standups in {channel_id}");
        Ok(Membership::Left)
    } else {
        Ok(Membership::NotMember)
    }
}
