use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params};

use super::Store;
use crate::model::{Channel, Role, StandupRecord, Standuper};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS channels (
    channel_id TEXT PRIMARY KEY,
    workspace_id TEXT NOT NULL,
    name TEXT NOT NULL,
    deadline TEXT NOT NULL DEFAULT '',
    warning_offset_minutes INTEGER NOT NULL DEFAULT 0,
    submission_days TEXT NOT NULL,
    reports_enabled INTEGER NOT NULL DEFAULT 1,
    timezone TEXT NOT NULL,
    onboarding_message TEXT NOT NULL DEFAULT '',
    created_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_channels_workspace ON channels(workspace_id);

CREATE TABLE IF NOT EXISTS standupers (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    workspace_id TEXT NOT NULL,
    channel_id TEXT NOT NULL,
    channel_name TEXT NOT NULL,
    user_id TEXT NOT NULL,
    display_name TEXT NOT NULL,
    role TEXT NOT NULL DEFAULT 'developer',
    created_at INTEGER NOT NULL,
    UNIQUE (user_id, channel_id)
);
CREATE INDEX IF NOT EXISTS idx_standupers_channel ON standupers(channel_id);

-- created_at columns hold microseconds since the epoch, UTC
CREATE TABLE IF NOT EXISTS standups (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    workspace_id TEXT NOT NULL,
    channel_id TEXT NOT NULL,
    user_id TEXT NOT NULL,
    comment TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    message_ts TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_standups_member ON standups(user_id, channel_id, created_at);
CREATE INDEX IF NOT EXISTS idx_standups_ts ON standups(message_ts);
";

const CHANNEL_COLUMNS: &str = "workspace_id, channel_id, name, deadline, warning_offset_minutes, \
     submission_days, reports_enabled, timezone, onboarding_message, created_at";
const STANDUPER_COLUMNS: &str =
    "workspace_id, channel_id, channel_name, user_id, display_name, role, created_at";
const STANDUP_COLUMNS: &str =
    "id, workspace_id, channel_id, user_id, comment, created_at, message_ts";

/// SQLite-backed store. Queries run on the blocking pool so a slow disk never
/// stalls the scheduler or a campaign.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Opens or creates `huddle.db` under `base_dir`.
    pub fn open(base_dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&base_dir)?;
        let path = base_dir.join("huddle.db");
        let conn = Connection::open(&path)
            .with_context(|| format!("Failed to open store: {}", path.display()))?;
        Self::with_connection(conn)
    }

    pub fn in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA).context("Failed to migrate store")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn call<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> rusqlite::Result<T> + Send + 'static,
    {
        let conn = self.conn.clone();
        let out = tokio::task::spawn_blocking(move || {
            let conn = conn.lock().expect("store lock poisoned");
            f(&conn)
        })
        .await
        .context("Store task failed")?;
        Ok(out?)
    }
}

fn timestamp(idx: usize, micros: i64) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::from_timestamp_micros(micros)
        .ok_or(rusqlite::Error::IntegralValueOutOfRange(idx, micros))
}

fn channel_from_row(row: &Row<'_>) -> rusqlite::Result<Channel> {
    let days: String = row.get(5)?;
    Ok(Channel {
        workspace_id: row.get(0)?,
        channel_id: row.get(1)?,
        name: row.get(2)?,
        deadline: row.get(3)?,
        warning_offset_minutes: row.get(4)?,
        submission_days: days.parse().map_err(|e: anyhow::Error| {
            rusqlite::Error::FromSqlConversionFailure(5, Type::Text, e.into())
        })?,
        reports_enabled: row.get(6)?,
        timezone: row.get(7)?,
        onboarding_message: row.get(8)?,
        created_at: timestamp(9, row.get(9)?)?,
    })
}

fn standuper_from_row(row: &Row<'_>) -> rusqlite::Result<Standuper> {
    let role: String = row.get(5)?;
    Ok(Standuper {
        workspace_id: row.get(0)?,
        channel_id: row.get(1)?,
        channel_name: row.get(2)?,
        user_id: row.get(3)?,
        display_name: row.get(4)?,
        role: Role::parse(&role),
        created_at: timestamp(6, row.get(6)?)?,
    })
}

fn standup_from_row(row: &Row<'_>) -> rusqlite::Result<StandupRecord> {
    Ok(StandupRecord {
        id: row.get(0)?,
        workspace_id: row.get(1)?,
        channel_id: row.get(2)?,
        user_id: row.get(3)?,
        comment: row.get(4)?,
        created_at: timestamp(5, row.get(5)?)?,
        message_ts: row.get(6)?,
    })
}

#[async_trait::async_trait]
impl Store for SqliteStore {
    async fn list_channels(&self, workspace_id: &str) -> Result<Vec<Channel>> {
        let workspace_id = workspace_id.to_string();
        self.call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {CHANNEL_COLUMNS} FROM channels WHERE workspace_id = ?1 ORDER BY rowid"
            ))?;
            let rows = stmt.query_map(params![workspace_id], channel_from_row)?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
        })
        .await
    }

    async fn get_channel(&self, channel_id: &str) -> Result<Option<Channel>> {
        let channel_id = channel_id.to_string();
        self.call(move |conn| {
            conn.query_row(
                &format!("SELECT {CHANNEL_COLUMNS} FROM channels WHERE channel_id = ?1"),
                params![channel_id],
                channel_from_row,
            )
            .optional()
        })
        .await
    }

    async fn save_channel(&self, channel: Channel) -> Result<()> {
        self.call(move |conn| {
            conn.execute(
                &format!(
                    "INSERT INTO channels ({CHANNEL_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                     ON CONFLICT(channel_id) DO UPDATE SET
                        workspace_id = excluded.workspace_id,
                        name = excluded.name,
                        deadline = excluded.deadline,
                        warning_offset_minutes = excluded.warning_offset_minutes,
                        submission_days = excluded.submission_days,
                        reports_enabled = excluded.reports_enabled,
                        timezone = excluded.timezone,
                        onboarding_message = excluded.onboarding_message"
                ),
                params![
                    channel.workspace_id,
                    channel.channel_id,
                    channel.name,
                    channel.deadline,
                    channel.warning_offset_minutes,
                    channel.submission_days.to_string(),
                    channel.reports_enabled,
                    channel.timezone,
                    channel.onboarding_message,
                    channel.created_at.timestamp_micros(),
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn list_standupers(&self, channel_id: &str) -> Result<Vec<Standuper>> {
        let channel_id = channel_id.to_string();
        self.call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {STANDUPER_COLUMNS} FROM standupers WHERE channel_id = ?1 ORDER BY id"
            ))?;
            let rows = stmt.query_map(params![channel_id], standuper_from_row)?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
        })
        .await
    }

    async fn standupers_by_user(&self, user_id: &str) -> Result<Vec<Standuper>> {
        let user_id = user_id.to_string();
        self.call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {STANDUPER_COLUMNS} FROM standupers WHERE user_id = ?1 ORDER BY id"
            ))?;
            let rows = stmt.query_map(params![user_id], standuper_from_row)?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
        })
        .await
    }

    async fn add_standuper(&self, standuper: Standuper) -> Result<()> {
        self.call(move |conn| {
            conn.execute(
                &format!(
                    "INSERT OR IGNORE INTO standupers ({STANDUPER_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"
                ),
                params![
                    standuper.workspace_id,
                    standuper.channel_id,
                    standuper.channel_name,
                    standuper.user_id,
                    standuper.display_name,
                    standuper.role.as_str(),
                    standuper.created_at.timestamp_micros(),
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn remove_standuper(&self, user_id: &str, channel_id: &str) -> Result<bool> {
        let (user_id, channel_id) = (user_id.to_string(), channel_id.to_string());
        self.call(move |conn| {
            let removed = conn.execute(
                "DELETE FROM standupers WHERE user_id = ?1 AND channel_id = ?2",
                params![user_id, channel_id],
            )?;
            Ok(removed > 0)
        })
        .await
    }

    async fn latest_standup(
        &self,
        user_id: &str,
        channel_id: &str,
    ) -> Result<Option<StandupRecord>> {
        let (user_id, channel_id) = (user_id.to_string(), channel_id.to_string());
        self.call(move |conn| {
            conn.query_row(
                &format!(
                    "SELECT {STANDUP_COLUMNS} FROM standups
                     WHERE user_id = ?1 AND channel_id = ?2
                     ORDER BY created_at DESC, id DESC LIMIT 1"
                ),
                params![user_id, channel_id],
                standup_from_row,
            )
            .optional()
        })
        .await
    }

    async fn has_standup_between(
        &self,
        user_id: &str,
        channel_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<bool> {
        let (user_id, channel_id) = (user_id.to_string(), channel_id.to_string());
        self.call(move |conn| {
            conn.query_row(
                "SELECT EXISTS(
                    SELECT 1 FROM standups
                    WHERE user_id = ?1 AND channel_id = ?2 AND created_at BETWEEN ?3 AND ?4
                 )",
                params![user_id, channel_id, from.timestamp_micros(), to.timestamp_micros()],
                |row| row.get::<_, bool>(0),
            )
        })
        .await
    }

    async fn find_standup_by_ts(&self, message_ts: &str) -> Result<Option<StandupRecord>> {
        let message_ts = message_ts.to_string();
        self.call(move |conn| {
            conn.query_row(
                &format!(
                    "SELECT {STANDUP_COLUMNS} FROM standups WHERE message_ts = ?1 ORDER BY id LIMIT 1"
                ),
                params![message_ts],
                standup_from_row,
            )
            .optional()
        })
        .await
    }

    async fn create_standup(&self, mut record: StandupRecord) -> Result<StandupRecord> {
        self.call(move |conn| {
            conn.execute(
                "INSERT INTO standups (workspace_id, channel_id, user_id, comment, created_at, message_ts)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    record.workspace_id,
                    record.channel_id,
                    record.user_id,
                    record.comment,
                    record.created_at.timestamp_micros(),
                    record.message_ts,
                ],
            )?;
            record.id = conn.last_insert_rowid() as u64;
            Ok(record)
        })
        .await
    }

    async fn update_standup(&self, record: StandupRecord) -> Result<()> {
        let id = record.id;
        let updated = self
            .call(move |conn| {
                conn.execute(
                    "UPDATE standups SET comment = ?1, created_at = ?2, message_ts = ?3 WHERE id = ?4",
                    params![
                        record.comment,
                        record.created_at.timestamp_micros(),
                        record.message_ts,
                        record.id,
                    ],
                )
            })
            .await?;
        if updated == 0 {
            anyhow::bail!("Standup {id} not found");
        }
        Ok(())
    }

    async fn delete_standup(&self, id: u64) -> Result<()> {
        self.call(move |conn| {
            conn.execute("DELETE FROM standups WHERE id = ?1", params![id])?;
            Ok(())
        })
        .await
    }
}
