//! In-memory fakes shared by unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use chrono::{DateTime, FixedOffset, NaiveDate, Utc};

use crate::analytics::{Activity, Analytics, Scope};
use crate::chat::{Attachment, ChatClient, Outbound};
use crate::context::BotContext;
use crate::i18n::Localizer;
use crate::model::{Channel, Role, StandupRecord, Standuper};
use crate::settings::{Settings, SettingsHandle};
use crate::store::Store;
use crate::store::sqlite::SqliteStore;
use crate::timeparse::ClockResolver;

/// Chat client that records everything it is asked to send.
#[derive(Default)]
pub struct RecordingChat {
    pub sent: Mutex<Vec<Outbound>>,
    pub reactions: Mutex<Vec<(String, String, String)>>,
    pub offsets: Mutex<HashMap<String, FixedOffset>>,
    pub fail_sends: Mutex<bool>,
}

impl RecordingChat {
    pub fn sent(&self) -> Vec<Outbound> {
        self.sent.lock().unwrap().clone()
    }

    pub fn texts_to(&self, target: &str) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter_map(|m| match m {
                Outbound::Message { channel, text, .. } if channel == target => Some(text),
                Outbound::Direct { user, text } if user == target => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn attachments_to(&self, target: &str) -> Vec<Vec<Attachment>> {
        self.sent()
            .into_iter()
            .filter_map(|m| match m {
                Outbound::Message {
                    channel,
                    attachments,
                    ..
                } if channel == target => Some(attachments),
                _ => None,
            })
            .collect()
    }

    pub fn set_offset(&self, user: &str, offset: FixedOffset) {
        self.offsets.lock().unwrap().insert(user.into(), offset);
    }

    fn record(&self, msg: Outbound) -> Result<()> {
        self.sent.lock().unwrap().push(msg);
        if *self.fail_sends.lock().unwrap() {
            anyhow::bail!("chat unavailable");
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl ChatClient for RecordingChat {
    fn name(&self) -> &str {
        "recording"
    }

    async fn post_message(
        &self,
        channel: &str,
        text: &str,
        attachments: &[Attachment],
    ) -> Result<()> {
        self.record(Outbound::Message {
            channel: channel.into(),
            text: text.into(),
            attachments: attachments.to_vec(),
        })
    }

    async fn post_ephemeral(&self, channel: &str, user: &str, text: &str) -> Result<()> {
        self.record(Outbound::Ephemeral {
            channel: channel.into(),
            user: user.into(),
            text: text.into(),
        })
    }

    async fn send_direct(&self, user: &str, text: &str) -> Result<()> {
        self.record(Outbound::direct(user, text))
    }

    async fn add_reaction(&self, channel: &str, message_ts: &str, name: &str) -> Result<()> {
        self.reactions
            .lock()
            .unwrap()
            .push((channel.into(), message_ts.into(), name.into()));
        Ok(())
    }

    async fn user_utc_offset(&self, user: &str) -> Result<FixedOffset> {
        match self.offsets.lock().unwrap().get(user) {
            Some(offset) => Ok(*offset),
            None => anyhow::bail!("no profile for {user}"),
        }
    }
}

/// Analytics returning canned activity per (scope, key).
#[derive(Default)]
pub struct ScriptedAnalytics {
    pub data: Mutex<HashMap<(&'static str, String), Activity>>,
    pub fail: Mutex<bool>,
}

impl ScriptedAnalytics {
    pub fn set(&self, scope: Scope, key: &str, commits: i64, worklog_seconds: i64) {
        self.data.lock().unwrap().insert(
            (scope.as_str(), key.to_string()),
            Activity {
                commits,
                worklog_seconds,
            },
        );
    }
}

#[async_trait::async_trait]
impl Analytics for ScriptedAnalytics {
    async fn activity(
        &self,
        scope: Scope,
        key: &str,
        _from: NaiveDate,
        _to: NaiveDate,
    ) -> Result<Activity> {
        if *self.fail.lock().unwrap() {
            anyhow::bail!("collector unavailable");
        }
        Ok(self
            .data
            .lock()
            .unwrap()
            .get(&(scope.as_str(), key.to_string()))
            .copied()
            .unwrap_or_default())
    }
}

/// In-memory database that can be told to fail chosen operations by name.
pub struct FaultyStore {
    inner: SqliteStore,
    failing: Mutex<HashSet<&'static str>>,
}

impl FaultyStore {
    pub fn new() -> Self {
        Self {
            inner: SqliteStore::in_memory().unwrap(),
            failing: Mutex::new(HashSet::new()),
        }
    }

    pub fn fail(&self, operation: &'static str) {
        self.failing.lock().unwrap().insert(operation);
    }

    fn check(&self, operation: &str) -> Result<()> {
        if self.failing.lock().unwrap().contains(operation) {
            anyhow::bail!("{operation}: database is locked");
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl Store for FaultyStore {
    async fn list_channels(&self, workspace_id: &str) -> Result<Vec<Channel>> {
        self.check("list_channels")?;
        self.inner.list_channels(workspace_id).await
    }

    async fn get_channel(&self, channel_id: &str) -> Result<Option<Channel>> {
        self.check("get_channel")?;
        self.inner.get_channel(channel_id).await
    }

    async fn save_channel(&self, channel: Channel) -> Result<()> {
        self.check("save_channel")?;
        self.inner.save_channel(channel).await
    }

    async fn list_standupers(&self, channel_id: &str) -> Result<Vec<Standuper>> {
        self.check("list_standupers")?;
        self.inner.list_standupers(channel_id).await
    }

    async fn standupers_by_user(&self, user_id: &str) -> Result<Vec<Standuper>> {
        self.check("standupers_by_user")?;
        self.inner.standupers_by_user(user_id).await
    }

    async fn add_standuper(&self, standuper: Standuper) -> Result<()> {
        self.check("add_standuper")?;
        self.inner.add_standuper(standuper).await
    }

    async fn remove_standuper(&self, user_id: &str, channel_id: &str) -> Result<bool> {
        self.check("remove_standuper")?;
        self.inner.remove_standuper(user_id, channel_id).await
    }

    async fn latest_standup(
        &self,
        user_id: &str,
        channel_id: &str,
    ) -> Result<Option<StandupRecord>> {
        self.check("latest_standup")?;
        self.inner.latest_standup(user_id, channel_id).await
    }

    async fn has_standup_between(
        &self,
        user_id: &str,
        channel_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<bool> {
        self.check("has_standup_between")?;
        self.inner.has_standup_between(user_id, channel_id, from, to).await
    }

    async fn find_standup_by_ts(&self, message_ts: &str) -> Result<Option<StandupRecord>> {
        self.check("find_standup_by_ts")?;
        self.inner.find_standup_by_ts(message_ts).await
    }

    async fn create_standup(&self, record: StandupRecord) -> Result<StandupRecord> {
        self.check("create_standup")?;
        self.inner.create_standup(record).await
    }

    async fn update_standup(&self, record: StandupRecord) -> Result<()> {
        self.check("update_standup")?;
        self.inner.update_standup(record).await
    }

    async fn delete_standup(&self, id: u64) -> Result<()> {
        self.check("delete_standup")?;
        self.inner.delete_standup(id).await
    }
}

pub struct TestBot {
    pub ctx: BotContext,
    pub chat: Arc<RecordingChat>,
    pub store: Arc<FaultyStore>,
    pub analytics: Arc<ScriptedAnalytics>,
}

impl TestBot {
    pub fn new() -> Self {
        Self::with_settings(crate::settings::sample())
    }

    pub fn with_settings(settings: Settings) -> Self {
        let chat = Arc::new(RecordingChat::default());
        let store = Arc::new(FaultyStore::new());
        let analytics = Arc::new(ScriptedAnalytics::default());
        let ctx = BotContext {
            chat: chat.clone(),
            store: store.clone(),
            analytics: analytics.clone(),
            resolver: Arc::new(ClockResolver),
            localizer: Arc::new(Localizer::new()),
            settings: SettingsHandle::new(settings),
        };
        Self {
            ctx,
            chat,
            store,
            analytics,
        }
    }

    pub async fn channel(&self, id: &str, name: &str, deadline: &str) -> Channel {
        let mut channel = Channel::new("T1", id, name, 15);
        channel.deadline = deadline.into();
        self.store.save_channel(channel.clone()).await.unwrap();
        channel
    }

    pub async fn member(&self, channel: &Channel, user: &str, role: Role) -> Standuper {
        let standuper = Standuper {
            workspace_id: "T1".into(),
            channel_id: channel.channel_id.clone(),
            channel_name: channel.name.clone(),
            user_id: user.into(),
            display_name: format!("{user} name"),
            role,
            created_at: Utc::now(),
        };
        self.store.add_standuper(standuper.clone()).await.unwrap();
        self.chat.set_offset(user, utc());
        standuper
    }

    pub async fn standup(&self, channel: &Channel, user: &str, at: DateTime<Utc>) {
        self.store
            .create_standup(StandupRecord {
                id: 0,
                workspace_id: "T1".into(),
                channel_id: channel.channel_id.clone(),
                user_id: user.into(),
                comment: "done".into(),
                created_at: at,
                message_ts: format!("{}.{user}", at.timestamp()),
            })
            .await
            .unwrap();
    }
}

pub fn utc() -> FixedOffset {
    FixedOffset::east_opt(0).unwrap()
}

/// A UTC instant built from `YYYY-MM-DD HH:MM`.
pub fn at(text: &str) -> DateTime<FixedOffset> {
    let naive = chrono::NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M").unwrap();
    naive.and_utc().fixed_offset()
}
