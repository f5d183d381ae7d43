use anyhow::{Context, Result};
use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};

use crate::chat::Outbound;
use crate::context::BotContext;
use crate::model::StandupRecord;
use crate::notifier::NotifierRegistry;
use crate::timeparse::ResolveError;

const SUBMITTED_REACTION: &str = "heavy_check_mark";

/// A part every standup has to talk about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Yesterday,
    Today,
    Problems,
}

impl Section {
    const ALL: [Section; 3] = [Section::Yesterday, Section::Today, Section::Problems];

    pub fn keywords(&self) -> &'static [&'static str] {
        match self {
            Section::Yesterday => &["yesterday", "friday", "вчера", "пятниц"],
            Section::Today => &["today", "сегодня"],
            Section::Problems => &["issue", "мешает"],
        }
    }

    fn message_key(&self) -> &'static str {
        match self {
            Section::Yesterday => "no_yesterday_mention",
            Section::Today => "no_today_mention",
            Section::Problems => "no_problems_mention",
        }
    }
}

/// Sections the text never mentions, matched by keyword regardless of case.
pub fn analyze(text: &str) -> Vec<Section> {
    let text = text.to_lowercase();
    Section::ALL
        .into_iter()
        .filter(|section| !section.keywords().iter().any(|k| text.contains(k)))
        .collect()
}

/// A chat message event in a monitored channel.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MessageEvent {
    New {
        channel: String,
        user: String,
        text: String,
        ts: String,
    },
    Edited {
        channel: String,
        user: String,
        text: String,
        ts: String,
    },
    Deleted {
        channel: String,
        ts: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Reconciled {
    Created,
    Updated,
    Deleted,
    /// Sections were missing; the author was told and nothing was saved.
    Rejected,
    Ignored,
}

fn mentions_bot(ctx: &BotContext, text: &str) -> bool {
    match &ctx.settings.current().bot_user_id {
        Some(bot) => text.contains(bot.as_str()),
        None => true,
    }
}

/// Keeps standup records in step with the messages they came from. The
/// message timestamp identifies the record.
pub async fn handle_event(
    ctx: &BotContext,
    event: MessageEvent,
    now: DateTime<Utc>,
) -> Result<Reconciled> {
    match event {
        MessageEvent::New {
            channel,
            user,
            text,
            ts,
        } => {
            if !mentions_bot(ctx, &text) {
                return Ok(Reconciled::Ignored);
            }
            if !accepted(ctx, &channel, &user, &text).await {
                return Ok(Reconciled::Rejected);
            }
            create(ctx, channel, user, text, ts, now).await?;
            Ok(Reconciled::Created)
        }
        MessageEvent::Edited {
            channel,
            user,
            text,
            ts,
        } => {
            if !mentions_bot(ctx, &text) {
                return Ok(Reconciled::Ignored);
            }
            if !accepted(ctx, &channel, &user, &text).await {
                return Ok(Reconciled::Rejected);
            }
            match ctx.store.find_standup_by_ts(&ts).await? {
                Some(mut record) => {
                    record.comment = text;
                    ctx.store.update_standup(record).await?;
                    Ok(Reconciled::Updated)
                }
                None => {
                    create(ctx, channel, user, text, ts, now).await?;
                    Ok(Reconciled::Created)
                }
            }
        }
        MessageEvent::Deleted { ts, .. } => match ctx.store.find_standup_by_ts(&ts).await? {
            Some(record) => {
                ctx.store.delete_standup(record.id).await?;
                Ok(Reconciled::Deleted)
            }
            None => Ok(Reconciled::Ignored),
        },
    }
}

/// Checks the standup's sections and privately tells the author what is
/// missing. Returns whether the standup may be saved.
async fn accepted(ctx: &BotContext, channel: &str, user: &str, text: &str) -> bool {
    let missing = analyze(text);
    if missing.is_empty() {
        return true;
    }
    let reply = missing
        .iter()
        .map(|s| ctx.text(s.message_key(), &[("keywords", &s.keywords().join(", "))]))
        .collect::<Vec<_>>()
        .join(", ");
    tracing::info!("Rejected standup from {user} in {channel}: {} sections missing", missing.len());
    let reply = Outbound::Ephemeral {
        channel: channel.to_string(),
        user: user.to_string(),
        text: reply,
    };
    if let Err(e) = ctx.chat.send(&reply).await {
        tracing::warn!("Failed to tell {user} about the rejected standup: {e}");
    }
    false
}

async fn create(
    ctx: &BotContext,
    channel: String,
    user: String,
    text: String,
    ts: String,
    now: DateTime<Utc>,
) -> Result<()> {
    let record = ctx
        .store
        .create_standup(StandupRecord {
            id: 0,
            workspace_id: ctx.settings.current().workspace_id.clone(),
            channel_id: channel,
            user_id: user,
            comment: text,
            created_at: now,
            message_ts: ts,
        })
        .await?;
    tracing::info!("Standup saved for {} in {}", record.user_id, record.channel_id);
    if let Err(e) = ctx
        .chat
        .add_reaction(&record.channel_id, &record.message_ts, SUBMITTED_REACTION)
        .await
    {
        tracing::warn!("Failed to react to standup {}: {e}", record.message_ts);
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeadlineUpdate {
    Set { deadline: String, timezone: String },
    Removed,
    Invalid(ResolveError),
}

impl DeadlineUpdate {
    /// Reply text for whoever asked for the change.
    pub fn reply(&self, ctx: &BotContext) -> String {
        match self {
            DeadlineUpdate::Set { deadline, timezone } => ctx.text(
                "deadline_set",
                &[("deadline", deadline), ("tz", timezone)],
            ),
            DeadlineUpdate::Removed => ctx.text("deadline_removed", &[]),
            DeadlineUpdate::Invalid(_) => ctx.text("wrong_deadline_format", &[]),
        }
    }
}

/// Sets or clears a channel's standup deadline. Clearing it also stops a
/// campaign running for the channel.
pub async fn set_deadline(
    ctx: &BotContext,
    registry: &NotifierRegistry,
    channel_id: &str,
    expression: &str,
    now: DateTime<FixedOffset>,
) -> Result<DeadlineUpdate> {
    let mut channel = ctx
        .store
        .get_channel(channel_id)
        .await?
        .with_context(|| format!("Unknown channel {channel_id}"))?;
    let expression = expression.trim();

    if expression.is_empty() {
        channel.deadline.clear();
        ctx.store.save_channel(channel).await?;
        if let Some(campaign) = registry.find(channel_id) {
            registry.stop(&campaign);
        }
        tracing::info!("Deadline removed for {channel_id}");
        return Ok(DeadlineUpdate::Removed);
    }

    if let Err(e) = ctx.resolver.resolve(expression, now) {
        tracing::warn!("Rejected deadline for {channel_id}: {e}");
        return Ok(DeadlineUpdate::Invalid(e));
    }
    channel.deadline = expression.to_string();
    let timezone = channel.timezone.clone();
    ctx.store.save_channel(channel).await?;
    tracing::info!("Deadline for {channel_id} set to {expression}");
    Ok(DeadlineUpdate::Set {
        deadline: expression.to_string(),
        timezone,
    })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::model::Role;
    use crate::store::Store;
    use crate::testing::{TestBot, at};

    const STANDUP: &str = "<@UBOT> yesterday: api, today: ui, issues: none";

    fn new_message(text: &str, ts: &str) -> MessageEvent {
        MessageEvent::New {
            channel: "C1".into(),
            user: "U1".into(),
            text: text.into(),
            ts: ts.into(),
        }
    }

    #[tokio::test]
    async fn test_new_standup_is_saved_and_acknowledged() {
        let bot = TestBot::new();
        let outcome = handle_event(&bot.ctx, new_message(STANDUP, "1.1"), Utc::now())
            .await
            .unwrap();

        assert_eq!(outcome, Reconciled::Created);
        let record = bot.store.find_standup_by_ts("1.1").await.unwrap().unwrap();
        assert_eq!(record.user_id, "U1");
        assert_eq!(
            bot.chat.reactions.lock().unwrap().clone(),
            vec![("C1".to_string(), "1.1".to_string(), "heavy_check_mark".to_string())]
        );
    }

    #[tokio::test]
    async fn test_message_without_mention_is_ignored() {
        let bot = TestBot::new();
        let outcome = handle_event(&bot.ctx, new_message("lunch?", "1.1"), Utc::now())
            .await
            .unwrap();
        assert_eq!(outcome, Reconciled::Ignored);
        assert!(bot.store.find_standup_by_ts("1.1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_edit_updates_or_creates() {
        let bot = TestBot::new();
        handle_event(&bot.ctx, new_message(STANDUP, "1.1"), Utc::now())
            .await
            .unwrap();

        let edit = |ts: &str| MessageEvent::Edited {
            channel: "C1".into(),
            user: "U1".into(),
            text: "<@UBOT> yesterday: api, today: release, issues: flaky CI".into(),
            ts: ts.into(),
        };
        assert_eq!(
            handle_event(&bot.ctx, edit("1.1"), Utc::now()).await.unwrap(),
            Reconciled::Updated
        );
        let record = bot.store.find_standup_by_ts("1.1").await.unwrap().unwrap();
        assert_eq!(
            record.comment,
            "<@UBOT> yesterday: api, today: release, issues: flaky CI"
        );

        assert_eq!(
            handle_event(&bot.ctx, edit("2.2"), Utc::now()).await.unwrap(),
            Reconciled::Created
        );
    }

    #[tokio::test]
    async fn test_delete_removes_record() {
        let bot = TestBot::new();
        handle_event(&bot.ctx, new_message(STANDUP, "1.1"), Utc::now())
            .await
            .unwrap();
        let delete = |ts: &str| MessageEvent::Deleted {
            channel: "C1".into(),
            ts: ts.into(),
        };

        assert_eq!(
            handle_event(&bot.ctx, delete("1.1"), Utc::now()).await.unwrap(),
            Reconciled::Deleted
        );
        assert!(bot.store.latest_standup("U1", "C1").await.unwrap().is_none());
        assert_eq!(
            handle_event(&bot.ctx, delete("1.1"), Utc::now()).await.unwrap(),
            Reconciled::Ignored
        );
    }

    #[test]
    fn test_analyze_finds_missing_sections() {
        assert!(analyze("Yesterday: api. Today: ui. Issues: none").is_empty());
        assert!(analyze("Вчера: api. Сегодня: ui. Ничего не мешает").is_empty());
        assert!(analyze("friday: deploy, today: review, no issues").is_empty());
        assert_eq!(analyze("today: ui"), vec![Section::Yesterday, Section::Problems]);
        assert_eq!(
            analyze("lunch?"),
            vec![Section::Yesterday, Section::Today, Section::Problems]
        );
    }

    #[tokio::test]
    async fn test_incomplete_standup_is_rejected_privately() {
        let bot = TestBot::new();
        let outcome = handle_event(
            &bot.ctx,
            new_message("<@UBOT> yesterday: api, today: ui", "1.1"),
            Utc::now(),
        )
        .await
        .unwrap();

        assert_eq!(outcome, Reconciled::Rejected);
        assert!(bot.store.find_standup_by_ts("1.1").await.unwrap().is_none());
        assert!(bot.chat.reactions.lock().unwrap().is_empty());
        assert_eq!(
            bot.chat.sent(),
            vec![Outbound::Ephemeral {
                channel: "C1".into(),
                user: "U1".into(),
                text: "- no 'problems' keywords detected: issue, мешает".into(),
            }]
        );
    }

    #[tokio::test]
    async fn test_incomplete_edit_keeps_saved_standup() {
        let bot = TestBot::new();
        handle_event(&bot.ctx, new_message(STANDUP, "1.1"), Utc::now())
            .await
            .unwrap();
        let edit = MessageEvent::Edited {
            channel: "C1".into(),
            user: "U1".into(),
            text: "<@UBOT> nothing".into(),
            ts: "1.1".into(),
        };

        assert_eq!(
            handle_event(&bot.ctx, edit, Utc::now()).await.unwrap(),
            Reconciled::Rejected
        );
        let record = bot.store.find_standup_by_ts("1.1").await.unwrap().unwrap();
        assert_eq!(record.comment, STANDUP);
        assert_eq!(
            bot.chat.sent(),
            vec![Outbound::Ephemeral {
                channel: "C1".into(),
                user: "U1".into(),
                text: "- no 'yesterday' keywords detected: yesterday, friday, вчера, пятниц, \
                       - no 'today' keywords detected: today, сегодня, \
                       - no 'problems' keywords detected: issue, мешает"
                    .into(),
            }]
        );
    }

    #[test]
    fn test_event_json() {
        let event: MessageEvent = serde_json::from_str(
            r#"{"kind":"deleted","channel":"C1","ts":"1.1"}"#,
        )
        .unwrap();
        assert_eq!(
            event,
            MessageEvent::Deleted {
                channel: "C1".into(),
                ts: "1.1".into()
            }
        );
    }

    #[tokio::test]
    async fn test_set_deadline_validates() {
        let bot = TestBot::new();
        bot.channel("C1", "dev", "").await;
        let registry = NotifierRegistry::new();
        let now = at("2024-03-05 09:00");

        let update = set_deadline(&bot.ctx, &registry, "C1", " 1pm ", now).await.unwrap();
        assert_eq!(
            update.reply(&bot.ctx),
            "Updated standup deadline to 1pm in UTC timezone"
        );
        assert_eq!(bot.store.get_channel("C1").await.unwrap().unwrap().deadline, "1pm");

        let update = set_deadline(&bot.ctx, &registry, "C1", "soonish", now).await.unwrap();
        assert!(matches!(update, DeadlineUpdate::Invalid(_)));
        assert_eq!(bot.store.get_channel("C1").await.unwrap().unwrap().deadline, "1pm");

        assert!(set_deadline(&bot.ctx, &registry, "C404", "10:00", now).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_removing_deadline_stops_campaign() {
        let bot = TestBot::new();
        let channel = bot.channel("C1", "dev", "10:00").await;
        bot.member(&channel, "U1", Role::Developer).await;
        let registry = NotifierRegistry::new();
        registry.start(&bot.ctx, &channel);
        tokio::time::sleep(Duration::from_secs(1)).await;

        let update = set_deadline(&bot.ctx, &registry, "C1", "", at("2024-03-05 10:01"))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(update, DeadlineUpdate::Removed);
        assert!(!registry.is_running("C1"));
        assert!(!bot.store.get_channel("C1").await.unwrap().unwrap().has_deadline());
    }
}
