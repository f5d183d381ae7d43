use anyhow::{Context, Result};
use chrono::Weekday;
use serde::Deserialize;
use std::path::PathBuf;

use crate::settings::Settings;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub workspace: WorkspaceConfig,
    #[serde(default)]
    pub slack: SlackConfig,
    #[serde(default)]
    pub notifier: NotifierConfig,
    #[serde(default)]
    pub reporting: ReportingConfig,
    #[serde(default)]
    pub collector: CollectorConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub i18n: I18nConfig,
}

#[derive(Debug, Deserialize)]
pub struct WorkspaceConfig {
    pub id: String,
    pub name: String,
    #[serde(default = "default_language")]
    pub language: String,
    /// Standup messages must mention the bot to be recorded.
    pub bot_user_id: Option<String>,
}

fn default_language() -> String {
    "en".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct SlackConfig {
    #[serde(default)]
    pub bot_token: String,
    #[serde(default = "default_slack_base_url")]
    pub base_url: String,
    /// Log outbound messages instead of posting them.
    #[serde(default)]
    pub dry_run: bool,
}

impl Default for SlackConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            base_url: default_slack_base_url(),
            dry_run: false,
        }
    }
}

fn default_slack_base_url() -> String {
    "https://slack.com/api".to_string()
}

#[derive(Debug, Deserialize)]
pub struct NotifierConfig {
    #[serde(default = "default_interval_minutes")]
    pub interval_minutes: u64,
    #[serde(default = "default_repeats_max")]
    pub repeats_max: u32,
    /// Applied to channels created without an explicit offset.
    #[serde(default = "default_warning_offset")]
    pub warning_offset_minutes: i64,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            interval_minutes: default_interval_minutes(),
            repeats_max: default_repeats_max(),
            warning_offset_minutes: default_warning_offset(),
        }
    }
}

fn default_interval_minutes() -> u64 {
    30
}

fn default_repeats_max() -> u32 {
    3
}

fn default_warning_offset() -> i64 {
    10
}

#[derive(Debug, Deserialize)]
pub struct ReportingConfig {
    /// Free-text time of day for both daily and weekly reports. Empty disables reports.
    #[serde(default = "default_report_time")]
    pub time: String,
    /// Name or id of the channel receiving the workspace digest.
    #[serde(default)]
    pub channel: String,
    #[serde(default = "default_weekly_day")]
    pub weekly_day: Weekday,
    pub manager_user_id: Option<String>,
}

impl Default for ReportingConfig {
    fn default() -> Self {
        Self {
            time: default_report_time(),
            channel: String::new(),
            weekly_day: default_weekly_day(),
            manager_user_id: None,
        }
    }
}

fn default_report_time() -> String {
    "10:00".to_string()
}

fn default_weekly_day() -> Weekday {
    Weekday::Sun
}

#[derive(Debug, Default, Deserialize)]
pub struct CollectorConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_api_bind")]
    pub bind: String,
    pub api_key: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind: default_api_bind(),
            api_key: None,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_api_bind() -> String {
    "127.0.0.1:3000".to_string()
}

#[derive(Debug, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_base_dir")]
    pub base_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            base_dir: default_base_dir(),
        }
    }
}

fn default_base_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".huddle")
}

#[derive(Debug, Default, Deserialize)]
pub struct I18nConfig {
    /// Directory holding `<language>.toml` message bundles.
    pub messages_dir: Option<PathBuf>,
}

impl Config {
    /// The runtime-mutable part of the configuration.
    pub fn settings(&self) -> Settings {
        Settings {
            workspace_id: self.workspace.id.clone(),
            workspace_name: self.workspace.name.clone(),
            bot_user_id: self.workspace.bot_user_id.clone(),
            language: self.workspace.language.clone(),
            notifier_interval_minutes: self.notifier.interval_minutes,
            reminder_repeats_max: self.notifier.repeats_max,
            warning_offset_minutes: self.notifier.warning_offset_minutes,
            reporting_time: self.reporting.time.clone(),
            reporting_channel: self.reporting.channel.clone(),
            weekly_report_day: self.reporting.weekly_day,
            manager_user_id: self.reporting.manager_user_id.clone(),
            collector_enabled: self.collector.enabled,
        }
    }

    pub fn base_dir(&self) -> PathBuf {
        expand_tilde(&self.storage.base_dir.to_string_lossy())
    }
}

pub fn load(path: &str) -> Result<Config> {
    let path = expand_tilde(path);
    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read config: {}", path.display()))?;
    parse(&content)
}

pub fn parse(content: &str) -> Result<Config> {
    toml::from_str(content).with_context(|| "Failed to parse config.toml")
}

pub async fn init_config_dir() -> Result<PathBuf> {
    let base = default_base_dir();
    tokio::fs::create_dir_all(base.join("i18n")).await?;

    let config_path = base.join("config.toml");
    if !config_path.exists() {
        tokio::fs::write(
            &config_path,
            r#"[workspace]
id = "T00000000"
name = "my-team"
language = "en"
# bot_user_id = "U00000000"

[slack]
bot_token = "xoxb-YOUR_BOT_TOKEN"
# base_url = "https://slack.com/api"
dry_run = true

[notifier]
interval_minutes = 30
repeats_max = 3
warning_offset_minutes = 10

[reporting]
time = "10:00"
channel = "standup-reports"
weekly_day = "Sun"
# manager_user_id = "U00000000"

[collector]
enabled = false
# url = "https://collector.example.com"
# token = "YOUR_COLLECTOR_TOKEN"

[api]
enabled = true
bind = "127.0.0.1:3000"
# api_key = "change-me"

# [i18n]
# messages_dir = "~/.huddle/i18n"
"#,
        )
        .await?;
    }

    Ok(base)
}

pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/")
        && let Some(home) = dirs::home_dir()
    {
        return home.join(rest);
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let cfg = parse(
            r#"
[workspace]
id = "T1"
name = "acme"
"#,
        )
        .unwrap();
        assert_eq!(cfg.workspace.language, "en");
        assert_eq!(cfg.notifier.interval_minutes, 30);
        assert_eq!(cfg.notifier.repeats_max, 3);
        assert_eq!(cfg.reporting.weekly_day, Weekday::Sun);
        assert!(!cfg.collector.enabled);
        assert_eq!(cfg.slack.base_url, "https://slack.com/api");
    }

    #[test]
    fn test_settings_projection() {
        let cfg = parse(
            r#"
[workspace]
id = "T1"
name = "acme"
language = "ru"

[notifier]
interval_minutes = 5
repeats_max = 2
warning_offset_minutes = 15

[reporting]
time = "9am"
channel = "reports"
weekly_day = "Fri"
manager_user_id = "UBOSS"
"#,
        )
        .unwrap();
        let settings = cfg.settings();
        assert_eq!(settings.workspace_id, "T1");
        assert_eq!(settings.language, "ru");
        assert_eq!(settings.notifier_interval_minutes, 5);
        assert_eq!(settings.reminder_repeats_max, 2);
        assert_eq!(settings.warning_offset_minutes, 15);
        assert_eq!(settings.reporting_time, "9am");
        assert_eq!(settings.weekly_report_day, Weekday::Fri);
        assert_eq!(settings.manager_user_id.as_deref(), Some("UBOSS"));
    }

    #[test]
    fn test_missing_workspace_is_an_error() {
        assert!(parse("[notifier]\ninterval_minutes = 1\n").is_err());
    }

    #[test]
    fn test_expand_tilde_leaves_absolute_paths() {
        assert_eq!(expand_tilde("/etc/huddle.toml"), PathBuf::from("/etc/huddle.toml"));
    }
}
