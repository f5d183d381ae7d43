use anyhow::{Context, Result};
use chrono::NaiveDate;
use reqwest::Client;
use serde::Deserialize;

use crate::config::CollectorConfig;
use crate::model::Standuper;

/// Commit and worklog totals for one scope over a date range.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct Activity {
    #[serde(rename = "total_commits", default)]
    pub commits: i64,
    #[serde(rename = "worklogs", default)]
    pub worklog_seconds: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Everything the user did in the workspace.
    User,
    /// Only what the user did for one channel's project.
    UserInChannel,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::User => "users",
            Scope::UserInChannel => "user-in-project",
        }
    }

    pub fn key(&self, standuper: &Standuper) -> String {
        match self {
            Scope::User => standuper.user_id.clone(),
            Scope::UserInChannel => format!("{}/{}", standuper.user_id, standuper.channel_name),
        }
    }
}

#[async_trait::async_trait]
pub trait Analytics: Send + Sync {
    async fn activity(
        &self,
        scope: Scope,
        key: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Activity>;
}

/// Fetches both the workspace-wide and the in-channel activity of a member.
/// Either lookup failing fails the pair.
pub async fn member_activity(
    analytics: &dyn Analytics,
    standuper: &Standuper,
    from: NaiveDate,
    to: NaiveDate,
) -> Result<(Activity, Activity)> {
    let user = analytics
        .activity(Scope::User, &Scope::User.key(standuper), from, to)
        .await?;
    let in_channel = analytics
        .activity(
            Scope::UserInChannel,
            &Scope::UserInChannel.key(standuper),
            from,
            to,
        )
        .await?;
    Ok((user, in_channel))
}

/// HTTP client for the activity collector service.
pub struct CollectorClient {
    client: Client,
    base_url: String,
    token: String,
    workspace_id: String,
}

impl CollectorClient {
    pub fn new(config: &CollectorConfig, workspace_id: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: config.url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            workspace_id: workspace_id.to_string(),
        }
    }

    fn url(&self, scope: Scope, key: &str, from: NaiveDate, to: NaiveDate) -> String {
        format!(
            "{}/rest/api/v1/logger/{}/{}/{key}/{}/{}/",
            self.base_url,
            self.workspace_id,
            scope.as_str(),
            from.format("%Y-%m-%d"),
            to.format("%Y-%m-%d"),
        )
    }
}

#[async_trait::async_trait]
impl Analytics for CollectorClient {
    async fn activity(
        &self,
        scope: Scope,
        key: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Activity> {
        let url = self.url(scope, key, from, to);
        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Token {}", self.token))
            .send()
            .await
            .with_context(|| format!("Failed to reach collector for {key}"))?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!("Collector returned {status} for {url}: {body}");
            anyhow::bail!("Collector error ({status}) for {key}");
        }
        response
            .json()
            .await
            .with_context(|| format!("Failed to parse collector data for {key}"))
    }
}
