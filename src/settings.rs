use std::sync::{Arc, RwLock};

use anyhow::Result;
use chrono::Weekday;
use serde::{Deserialize, Serialize};

/// Upper bound for every minute-valued setting: one day.
pub const MAX_MINUTES: i64 = 24 * 60;

/// Workspace settings that can change while the bot runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub workspace_id: String,
    pub workspace_name: String,
    #[serde(default)]
    pub bot_user_id: Option<String>,
    pub language: String,
    pub notifier_interval_minutes: u64,
    pub reminder_repeats_max: u32,
    pub warning_offset_minutes: i64,
    #[serde(default)]
    pub reporting_time: String,
    #[serde(default)]
    pub reporting_channel: String,
    pub weekly_report_day: Weekday,
    #[serde(default)]
    pub manager_user_id: Option<String>,
    #[serde(default)]
    pub collector_enabled: bool,
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        if self.workspace_id.trim().is_empty() {
            anyhow::bail!("workspace id cannot be empty");
        }
        if self.language.trim().is_empty() {
            anyhow::bail!("language cannot be empty");
        }
        if self.notifier_interval_minutes == 0 {
            anyhow::bail!("notifier interval must be at least one minute");
        }
        if self.notifier_interval_minutes > MAX_MINUTES as u64 {
            anyhow::bail!("notifier interval cannot exceed {MAX_MINUTES} minutes");
        }
        if self.reminder_repeats_max == 0 {
            anyhow::bail!("reminder repeats max must be positive");
        }
        validate_warning_offset(self.warning_offset_minutes)?;
        Ok(())
    }
}

pub fn validate_warning_offset(minutes: i64) -> Result<()> {
    if !(0..=MAX_MINUTES).contains(&minutes) {
        anyhow::bail!("warning offset must be between 0 and {MAX_MINUTES} minutes");
    }
    Ok(())
}

/// Shared, swappable settings. Readers take a snapshot per operation, so an
/// update never changes values under an in-flight tick or campaign.
#[derive(Clone)]
pub struct SettingsHandle {
    inner: Arc<RwLock<Arc<Settings>>>,
}

impl SettingsHandle {
    pub fn new(settings: Settings) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(settings))),
        }
    }

    pub fn current(&self) -> Arc<Settings> {
        self.inner.read().expect("settings lock poisoned").clone()
    }

    /// Validates and replaces the settings for all subsequent reads.
    pub fn update(&self, settings: Settings) -> Result<Arc<Settings>> {
        settings.validate()?;
        let settings = Arc::new(settings);
        *self.inner.write().expect("settings lock poisoned") = settings.clone();
        tracing::info!(
            "Settings updated for workspace {}",
            settings.workspace_id
        );
        Ok(settings)
    }
}

#[cfg(test)]
pub fn sample() -> Settings {
    Settings {
        workspace_id: "T1".into(),
        workspace_name: "acme".into(),
        bot_user_id: Some("UBOT".into()),
        language: "en".into(),
        notifier_interval_minutes: 5,
        reminder_repeats_max: 3,
        warning_offset_minutes: 15,
        reporting_time: "10:00".into(),
        reporting_channel: "reports".into(),
        weekly_report_day: Weekday::Sun,
        manager_user_id: None,
        collector_enabled: true,
    }
}
