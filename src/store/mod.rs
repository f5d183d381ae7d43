pub mod sqlite;

use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::model::{Channel, StandupRecord, Standuper};

/// Persistent channels, memberships and standup records.
#[async_trait::async_trait]
pub trait Store: Send + Sync {
    async fn list_channels(&self, workspace_id: &str) -> Result<Vec<Channel>>;
    async fn get_channel(&self, channel_id: &str) -> Result<Option<Channel>>;
    async fn save_channel(&self, channel: Channel) -> Result<()>;

    async fn list_standupers(&self, channel_id: &str) -> Result<Vec<Standuper>>;
    async fn standupers_by_user(&self, user_id: &str) -> Result<Vec<Standuper>>;
    async fn add_standuper(&self, standuper: Standuper) -> Result<()>;
    /// Returns false when the user was not enrolled in the channel.
    async fn remove_standuper(&self, user_id: &str, channel_id: &str) -> Result<bool>;

    async fn latest_standup(&self, user_id: &str, channel_id: &str)
    -> Result<Option<StandupRecord>>;
    async fn has_standup_between(
        &self,
        user_id: &str,
        channel_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<bool>;
    async fn find_standup_by_ts(&self, message_ts: &str) -> Result<Option<StandupRecord>>;
    /// Inserts a record, assigning its id. Returns the stored record.
    async fn create_standup(&self, record: StandupRecord) -> Result<StandupRecord>;
    async fn update_standup(&self, record: StandupRecord) -> Result<()>;
    async fn delete_standup(&self, id: u64) -> Result<()>;
}
