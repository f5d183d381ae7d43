use std::time::Duration;

use chrono::{DateTime, Datelike, FixedOffset, Local, NaiveTime};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use crate::context::BotContext;
use crate::engagement;
use crate::model::{self, Channel};
use crate::notifier::NotifierRegistry;
use crate::report::{self, Cadence};
use crate::timeparse::same_minute;
use crate::worklogs;

const TICK: Duration = Duration::from_secs(60);

/// What a single tick decided to do.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct TickReport {
    pub warned: Vec<String>,
    pub started: Vec<String>,
    pub daily_report: bool,
    pub weekly_report: bool,
    pub month_end_reminder: bool,
}

/// Minute-granularity driver for warnings, campaigns and reports. Times are
/// compared to the minute; a tick that does not run at the matching minute is
/// not caught up later.
pub struct Scheduler {
    ctx: BotContext,
    registry: NotifierRegistry,
}

impl Scheduler {
    pub fn new(ctx: BotContext, registry: NotifierRegistry) -> Self {
        Self { ctx, registry }
    }

    /// Ticks every minute until `shutdown` flips to true, then cancels all
    /// running campaigns.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(TICK);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tracing::info!("Scheduler started");
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let report = self.tick(Local::now().fixed_offset()).await;
                    if report != TickReport::default() {
                        tracing::debug!("Tick: {report:?}");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        self.registry.stop_all();
        tracing::info!("Scheduler stopped");
    }

    pub async fn tick(&self, now: DateTime<FixedOffset>) -> TickReport {
        let mut report = TickReport::default();
        let settings = self.ctx.settings.current();

        if model::is_weekend(now.weekday()) {
            tracing::debug!("Weekend, no standup notifications");
        } else {
            match self.ctx.store.list_channels(&settings.workspace_id).await {
                Ok(channels) => {
                    for channel in &channels {
                        self.notify_channel(channel, now, &mut report).await;
                    }
                }
                Err(e) => tracing::error!("Failed to list channels: {e}"),
            }
        }

        if let Some(time) = self.resolve(&settings.reporting_time, now, "reporting time")
            && same_minute(now, time)
        {
            report.daily_report = true;
            self.spawn_report(Cadence::Daily, now);
            if now.weekday() == settings.weekly_report_day {
                report.weekly_report = true;
                self.spawn_report(Cadence::Weekly, now);
            }
        }

        if worklogs::is_reminder_time(now) {
            report.month_end_reminder = true;
            let ctx = self.ctx.clone();
            tokio::spawn(async move {
                if let Err(e) = worklogs::remind_month_end(&ctx, now).await {
                    tracing::error!("Month-end worklog reminder failed: {e}");
                }
            });
        }
        report
    }

    async fn notify_channel(
        &self,
        channel: &Channel,
        now: DateTime<FixedOffset>,
        report: &mut TickReport,
    ) {
        if !channel.has_deadline() {
            return;
        }
        let Some(deadline) = self.resolve(&channel.deadline, now, &channel.channel_id) else {
            return;
        };

        let Some(offset) = chrono::TimeDelta::try_minutes(channel.warning_offset_minutes) else {
            tracing::warn!(
                "Skipping {}: warning offset {} is out of range",
                channel.channel_id,
                channel.warning_offset_minutes
            );
            return;
        };
        if same_minute(now, deadline - offset) {
            match self.warn(channel, now).await {
                Ok(true) => report.warned.push(channel.channel_id.clone()),
                Ok(false) => {}
                Err(e) => tracing::error!("Failed to warn {}: {e}", channel.channel_id),
            }
        }

        if same_minute(now, deadline) && self.registry.start(&self.ctx, channel) {
            report.started.push(channel.channel_id.clone());
        }
    }

    /// Logs and skips on failure; the next tick tries again.
    fn resolve(&self, expression: &str, now: DateTime<FixedOffset>, what: &str) -> Option<NaiveTime> {
        if expression.trim().is_empty() {
            return None;
        }
        match self.ctx.resolver.resolve(expression, now) {
            Ok(time) => Some(time),
            Err(e) => {
                tracing::warn!("Skipping {what}: {e}");
                None
            }
        }
    }

    /// One message naming everyone who has not reported yet. Returns whether
    /// anything was sent.
    async fn warn(&self, channel: &Channel, now: DateTime<FixedOffset>) -> anyhow::Result<bool> {
        let missing = engagement::non_reporters(&self.ctx, &channel.channel_id, now.to_utc()).await?;
        if missing.is_empty() {
            return Ok(false);
        }
        let users = engagement::mentions(&missing);
        let minutes = self.ctx.text_count(
            "minutes",
            usize::try_from(channel.warning_offset_minutes).unwrap_or(0),
            &[],
        );
        let text = self.ctx.text_count(
            "warn_non_reporters",
            users.len(),
            &[
                ("user", &users[0]),
                ("users", &users.join(", ")),
                ("minutes", &minutes),
            ],
        );
        self.ctx.chat.post_message(&channel.channel_id, &text, &[]).await?;
        Ok(true)
    }

    fn spawn_report(&self, cadence: Cadence, now: DateTime<FixedOffset>) {
        let ctx = self.ctx.clone();
        tokio::spawn(async move { report::run(&ctx, cadence, now).await });
    }
}
