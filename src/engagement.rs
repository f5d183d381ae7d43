use anyhow::Result;
use chrono::{DateTime, Utc, Weekday};

use crate::context::BotContext;
use crate::model::{Channel, Standuper};

/// True only when the member's latest standup in the channel was written on
/// the member's current local calendar day. Any lookup failure counts as not
/// reported.
pub async fn has_reported_today(
    ctx: &BotContext,
    user_id: &str,
    channel_id: &str,
    now: DateTime<Utc>,
) -> bool {
    let record = match ctx.store.latest_standup(user_id, channel_id).await {
        Ok(Some(record)) => record,
        Ok(None) => return false,
        Err(e) => {
            tracing::warn!("Standup lookup failed for {user_id} in {channel_id}: {e}");
            return false;
        }
    };
    let offset = match ctx.chat.user_utc_offset(user_id).await {
        Ok(offset) => offset,
        Err(e) => {
            tracing::warn!("Timezone lookup failed for {user_id}: {e}");
            return false;
        }
    };
    record.created_at.with_timezone(&offset).date_naive() == now.with_timezone(&offset).date_naive()
}

pub fn should_track(channel: &Channel, day: Weekday) -> bool {
    channel.submission_days.contains(day)
}

/// Taggable members of the channel with no standup today.
pub async fn non_reporters(
    ctx: &BotContext,
    channel_id: &str,
    now: DateTime<Utc>,
) -> Result<Vec<Standuper>> {
    let mut missing = Vec::new();
    for standuper in ctx.store.list_standupers(channel_id).await? {
        if !standuper.role.is_tagged() {
            continue;
        }
        if !has_reported_today(ctx, &standuper.user_id, channel_id, now).await {
            missing.push(standuper);
        }
    }
    Ok(missing)
}

pub fn mentions(standupers: &[Standuper]) -> Vec<String> {
    standupers
        .iter()
        .map(|s| format!("<@{}>", s.user_id))
        .collect()
}
