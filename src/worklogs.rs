use std::collections::BTreeMap;

use anyhow::Result;
use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, Timelike};

use crate::analytics;
use crate::context::BotContext;
use crate::model::Standuper;

const REMINDER_HOUR: u32 = 10;

/// 10:00 on the last day of the month.
pub fn is_reminder_time(now: DateTime<FixedOffset>) -> bool {
    let tomorrow = now.date_naive() + Duration::days(1);
    tomorrow.day() == 1 && now.hour() == REMINDER_HOUR && now.minute() == 0
}

fn hours(seconds: i64) -> String {
    format!("{:.2}", seconds as f64 / 3600.0)
}

/// Sends every enrolled member their worklog hours for the month so far, per
/// channel and in total. Returns how many members were messaged.
pub async fn remind_month_end(ctx: &BotContext, now: DateTime<FixedOffset>) -> Result<usize> {
    let settings = ctx.settings.current();
    if !settings.collector_enabled {
        tracing::debug!("Collector disabled, skipping month-end worklog reminder");
        return Ok(0);
    }

    let mut members: BTreeMap<String, Vec<Standuper>> = BTreeMap::new();
    for channel in ctx.store.list_channels(&settings.workspace_id).await? {
        for standuper in ctx.store.list_standupers(&channel.channel_id).await? {
            members
                .entry(standuper.user_id.clone())
                .or_default()
                .push(standuper);
        }
    }

    let today = now.date_naive();
    let first = NaiveDate::from_ymd_opt(today.year(), today.month(), 1).unwrap_or(today);
    let mut sent = 0;
    for (user_id, memberships) in members {
        let mut lines = vec![ctx.text("month_end_header", &[])];
        let mut total = None;
        for m in &memberships {
            match analytics::member_activity(ctx.analytics.as_ref(), m, first, today).await {
                Ok((user, in_channel)) => {
                    lines.push(ctx.text(
                        "month_end_line",
                        &[
                            ("channel", &m.channel_name),
                            ("hours", &hours(in_channel.worklog_seconds)),
                        ],
                    ));
                    total = Some(user.worklog_seconds);
                }
                Err(e) => tracing::warn!("No worklog data for {user_id} in {}: {e}", m.channel_name),
            }
        }
        let Some(total) = total else {
            continue;
        };
        lines.push(ctx.text("month_end_total", &[("hours", &hours(total))]));

        match ctx.chat.send_direct(&user_id, &lines.join("\n")).await {
            Ok(()) => sent += 1,
            Err(e) => tracing::error!("Failed to send worklog reminder to {user_id}: {e}"),
        }
    }
    tracing::info!("Sent month-end worklog reminders to {sent} members");
    Ok(sent)
}
