use anyhow::Result;
use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveTime, TimeZone, Utc};

use crate::analytics::{self, Activity};
use crate::chat::{Attachment, AttachmentField, Color, Outbound};
use crate::context::BotContext;
use crate::engagement;
use crate::model::{self, Channel, Standuper};
use crate::settings::Settings;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cadence {
    Daily,
    Weekly,
}

impl Cadence {
    /// Points needed for a green entry.
    pub fn max_points(&self) -> u32 {
        match self {
            Cadence::Daily => 3,
            Cadence::Weekly => 2,
        }
    }

    fn header_key(&self) -> &'static str {
        match self {
            Cadence::Daily => "report_header",
            Cadence::Weekly => "report_header_weekly",
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Cadence::Daily => "yesterday",
            Cadence::Weekly => "weekly",
        }
    }

    /// Inclusive date range covered by a report computed on `today`.
    pub fn range(&self, today: NaiveDate) -> (NaiveDate, NaiveDate) {
        let yesterday = today - Duration::days(1);
        match self {
            Cadence::Daily => (yesterday, yesterday),
            Cadence::Weekly => (today - Duration::days(7), yesterday),
        }
    }
}

/// A rendered entry and its ordering key (in-channel worklog seconds).
#[derive(Debug, Clone, PartialEq)]
pub struct RankedItem {
    pub attachment: Attachment,
    pub points: i64,
}

#[derive(Debug, Clone)]
pub struct ChannelReport {
    pub channel: Channel,
    pub attachments: Vec<Attachment>,
}

/// Emoji and point for a member's total worklog time.
pub fn worklog_grade(cadence: Cadence, total_seconds: i64) -> (&'static str, u32) {
    let hours = total_seconds / 3600;
    match cadence {
        Cadence::Daily => match hours {
            h if h < 3 => (":angry:", 0),
            h if h < 7 => (":disappointed:", 0),
            h if h < 9 => (":wink:", 1),
            _ => (":sunglasses:", 1),
        },
        Cadence::Weekly => match hours {
            h if h < 31 => (":disappointed:", 0),
            h if h < 35 => (":wink:", 1),
            _ => (":sunglasses:", 1),
        },
    }
}

pub fn commit_grade(project_commits: i64) -> (&'static str, u32) {
    if project_commits == 0 {
        (":shit:", 0)
    } else {
        (":wink:", 1)
    }
}

/// Formats seconds as `H:MM`.
pub fn seconds_to_human(seconds: i64) -> String {
    format!("{}:{:02}", seconds / 3600, (seconds % 3600) / 60)
}

pub fn color_for(cadence: Cadence, points: u32, after_weekend: bool) -> Color {
    if after_weekend {
        return Color::Good;
    }
    match points {
        0 => Color::Danger,
        p if p >= cadence.max_points() => Color::Good,
        _ => Color::Warning,
    }
}

/// Orders entries by descending points. Equal points keep their order.
pub fn rank(mut items: Vec<RankedItem>) -> Vec<Attachment> {
    items.sort_by(|a, b| b.points.cmp(&a.points));
    items.into_iter().map(|i| i.attachment).collect()
}

/// Builds and posts the report, then tells the manager if that failed.
pub async fn run(ctx: &BotContext, cadence: Cadence, now: DateTime<FixedOffset>) {
    match send(ctx, cadence, now).await {
        Ok(entries) => tracing::info!("Sent {} report with {entries} entries", cadence.kind()),
        Err(e) => {
            tracing::error!("Failed to send {} report: {e:#}", cadence.kind());
            notify_failure(ctx, cadence, &e).await;
        }
    }
}

async fn notify_failure(ctx: &BotContext, cadence: Cadence, error: &anyhow::Error) {
    let settings = ctx.settings.current();
    let Some(manager) = settings.manager_user_id.as_deref() else {
        return;
    };
    let text = ctx.text(
        "report_error",
        &[("kind", cadence.kind()), ("error", &format!("{error:#}"))],
    );
    if let Err(e) = ctx.chat.send(&Outbound::direct(manager, text)).await {
        tracing::error!("Failed to notify {manager} about report failure: {e}");
    }
}

/// Posts each channel's ranked entries to the channel and a digest of all of
/// them to the reporting channel. Returns the number of entries in the digest.
pub async fn send(ctx: &BotContext, cadence: Cadence, now: DateTime<FixedOffset>) -> Result<usize> {
    let settings = ctx.settings.current();
    let channels = ctx.store.list_channels(&settings.workspace_id).await?;
    let reports = build(ctx, &settings, cadence, &channels, now).await;
    let header = ctx.text(cadence.header_key(), &[]);

    let mut digest = Vec::new();
    for report in reports {
        if report.channel.reports_enabled
            && let Err(e) = ctx
                .chat
                .post_message(&report.channel.channel_id, &header, &report.attachments)
                .await
        {
            tracing::error!("Failed to post report to {}: {e}", report.channel.channel_id);
        }
        digest.extend(report.attachments);
    }
    if digest.is_empty() {
        return Ok(0);
    }

    let target = reporting_target(&settings.reporting_channel, &channels);
    if target.is_empty() {
        tracing::warn!("No reporting channel configured, skipping {} digest", cadence.kind());
        return Ok(digest.len());
    }
    if let Err(e) = ctx.chat.post_message(&target, &header, &digest).await {
        tracing::error!("Failed to post {} digest to {target}: {e}", cadence.kind());
    }
    Ok(digest.len())
}

/// Resolves the configured reporting channel by name or id among the known
/// channels, falling back to the configured value.
fn reporting_target(configured: &str, channels: &[Channel]) -> String {
    let wanted = configured.trim().trim_start_matches('#');
    channels
        .iter()
        .find(|c| c.name == wanted || c.channel_id == wanted)
        .map(|c| c.channel_id.clone())
        .unwrap_or_else(|| wanted.to_string())
}

pub async fn build(
    ctx: &BotContext,
    settings: &Settings,
    cadence: Cadence,
    channels: &[Channel],
    now: DateTime<FixedOffset>,
) -> Vec<ChannelReport> {
    let mut reports = Vec::new();
    for channel in channels {
        let standupers = match ctx.store.list_standupers(&channel.channel_id).await {
            Ok(s) => s,
            Err(e) => {
                tracing::error!("Failed to list standupers of {}: {e}", channel.name);
                continue;
            }
        };
        if standupers.is_empty() {
            continue;
        }

        let mut items = Vec::new();
        for standuper in &standupers {
            if let Some(item) = member_entry(ctx, settings, cadence, channel, standuper, now).await
            {
                items.push(item);
            }
        }
        if items.is_empty() {
            continue;
        }
        reports.push(ChannelReport {
            channel: channel.clone(),
            attachments: rank(items),
        });
    }
    reports
}

async fn member_entry(
    ctx: &BotContext,
    settings: &Settings,
    cadence: Cadence,
    channel: &Channel,
    standuper: &Standuper,
    now: DateTime<FixedOffset>,
) -> Option<RankedItem> {
    let today = now.date_naive();
    let after_weekend = model::is_after_weekend(today);
    let relaxed = cadence == Cadence::Daily && after_weekend;
    let (from, to) = cadence.range(today);

    let activity = if settings.collector_enabled {
        match analytics::member_activity(ctx.analytics.as_ref(), standuper, from, to).await {
            Ok(activity) => Some(activity),
            Err(e) => {
                tracing::warn!("No activity data for {}: {e}", standuper.user_id);
                None
            }
        }
    } else {
        None
    };

    let (worklogs, worklog_point, mut commits, mut commit_point) = match activity {
        Some((user, in_channel)) => {
            let (worklogs, wp) = worklogs_text(ctx, cadence, user, in_channel, relaxed);
            let (commits, cp) = commits_text(ctx, in_channel, relaxed);
            (worklogs, wp, commits, cp)
        }
        None => (String::new(), 1, String::new(), 1),
    };
    if standuper.role.commits_exempt() {
        commits.clear();
        commit_point = 1;
    }

    let (standup, standup_point) = match cadence {
        Cadence::Daily => standup_text(ctx, channel, standuper, from, *now.offset()).await,
        Cadence::Weekly => (String::new(), 0),
    };

    let field = format!("{worklogs}{commits}{standup}");
    if field.is_empty() {
        return None;
    }

    let points = worklog_point + commit_point + standup_point;
    let text = if points >= cadence.max_points() {
        ctx.text(
            "not_tag_standuper",
            &[("user", &standuper.display_name), ("channel", &channel.name)],
        )
    } else {
        ctx.text(
            "tag_standuper",
            &[("user", &standuper.user_id), ("channel", &channel.name)],
        )
    };

    Some(RankedItem {
        attachment: Attachment {
            text,
            color: color_for(cadence, points, after_weekend),
            fields: vec![AttachmentField {
                value: field,
                short: false,
            }],
        },
        points: activity.map(|(_, c)| c.worklog_seconds).unwrap_or(0),
    })
}

fn worklogs_text(
    ctx: &BotContext,
    cadence: Cadence,
    user: Activity,
    in_channel: Activity,
    relaxed: bool,
) -> (String, u32) {
    let (mut emoji, point) = worklog_grade(cadence, user.worklog_seconds);
    let mut time = seconds_to_human(user.worklog_seconds);
    if user.worklog_seconds != in_channel.worklog_seconds {
        time = ctx.text(
            "worklogs_time",
            &[
                ("project", &seconds_to_human(in_channel.worklog_seconds)),
                ("total", &time),
            ],
        );
    }
    if relaxed {
        emoji = "";
        if in_channel.worklog_seconds == 0 {
            return (String::new(), point);
        }
    }
    (
        ctx.text("worklogs", &[("time", &time), ("emoji", emoji)]),
        point,
    )
}

fn commits_text(ctx: &BotContext, in_channel: Activity, relaxed: bool) -> (String, u32) {
    let (mut emoji, point) = commit_grade(in_channel.commits);
    if relaxed {
        emoji = "";
        if in_channel.commits == 0 {
            return (String::new(), point);
        }
    }
    (
        ctx.text(
            "commits",
            &[("commits", &in_channel.commits.to_string()), ("emoji", emoji)],
        ),
        point,
    )
}

/// Standup presence on `day`. A standup posted on a day outside the
/// channel's submission days still shows; a missing one there scores the
/// point with no text, as does a failed lookup.
async fn standup_text(
    ctx: &BotContext,
    channel: &Channel,
    standuper: &Standuper,
    day: NaiveDate,
    offset: FixedOffset,
) -> (String, u32) {
    let Some((start, end)) = day_bounds(day, offset) else {
        return (String::new(), 1);
    };
    match ctx
        .store
        .has_standup_between(&standuper.user_id, &channel.channel_id, start, end)
        .await
    {
        Ok(true) => (ctx.text("has_standup", &[]), 1),
        Ok(false) if !engagement::should_track(channel, day.weekday()) => (String::new(), 1),
        Ok(false) => (ctx.text("no_standup", &[]), 0),
        Err(e) => {
            tracing::warn!("Standup lookup failed for {}: {e}", standuper.user_id);
            (String::new(), 1)
        }
    }
}

fn day_bounds(day: NaiveDate, offset: FixedOffset) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let start = offset
        .from_local_datetime(&day.and_time(NaiveTime::MIN))
        .single()?;
    let end = offset
        .from_local_datetime(&day.and_hms_opt(23, 59, 59)?)
        .single()?;
    Some((start.to_utc(), end.to_utc()))
}
