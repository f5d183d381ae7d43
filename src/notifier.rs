use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;

use crate::chat::Outbound;
use crate::context::BotContext;
use crate::engagement;
use crate::model::Channel;
use crate::retry::{self, Outcome, Step};

struct CampaignHandle {
    id: u64,
    cancel: watch::Sender<bool>,
    started_at: DateTime<Utc>,
}

/// A running campaign as seen from outside.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CampaignInfo {
    pub id: u64,
    pub channel_id: String,
    pub started_at: DateTime<Utc>,
}

/// At most one nag campaign per channel.
#[derive(Clone, Default)]
pub struct NotifierRegistry {
    campaigns: Arc<Mutex<HashMap<String, CampaignHandle>>>,
    next_id: Arc<AtomicU64>,
}

impl NotifierRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawns a campaign for the channel unless one is already running.
    /// Returns whether a new campaign was started.
    pub fn start(&self, ctx: &BotContext, channel: &Channel) -> bool {
        let settings = ctx.settings.current();
        let Some(seconds) = settings.notifier_interval_minutes.checked_mul(60) else {
            tracing::error!(
                "Not starting campaign for {}: interval of {} minutes is out of range",
                channel.channel_id,
                settings.notifier_interval_minutes
            );
            return false;
        };
        let (cancel, cancelled) = watch::channel(false);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        {
            let mut campaigns = self.campaigns.lock().expect("registry lock poisoned");
            if campaigns.contains_key(&channel.channel_id) {
                tracing::debug!("Campaign already running for {}", channel.channel_id);
                return false;
            }
            campaigns.insert(
                channel.channel_id.clone(),
                CampaignHandle {
                    id,
                    cancel,
                    started_at: Utc::now(),
                },
            );
        }

        let guard = EntryGuard {
            registry: self.clone(),
            channel_id: channel.channel_id.clone(),
            id,
        };
        let campaign = Campaign {
            ctx: ctx.clone(),
            channel_id: channel.channel_id.clone(),
            max_repeats: settings.reminder_repeats_max,
            repeats: AtomicU32::new(0),
        };
        let interval = Duration::from_secs(seconds);
        tracing::info!(
            "Starting campaign {id} for {} (every {}m, at most {} reminders)",
            channel.channel_id,
            settings.notifier_interval_minutes,
            settings.reminder_repeats_max
        );
        tokio::spawn(async move {
            let _guard = guard;
            campaign.run(interval, cancelled).await;
        });
        true
    }

    pub fn find(&self, channel_id: &str) -> Option<CampaignInfo> {
        let campaigns = self.campaigns.lock().expect("registry lock poisoned");
        campaigns.get(channel_id).map(|h| CampaignInfo {
            id: h.id,
            channel_id: channel_id.to_string(),
            started_at: h.started_at,
        })
    }

    /// Signals the campaign to stop. It exits at its next check and removes
    /// its own entry.
    pub fn stop(&self, campaign: &CampaignInfo) -> bool {
        let campaigns = self.campaigns.lock().expect("registry lock poisoned");
        match campaigns.get(&campaign.channel_id) {
            Some(h) if h.id == campaign.id => h.cancel.send(true).is_ok(),
            _ => false,
        }
    }

    /// Drops the channel's entry. A campaign whose entry is dropped sees its
    /// cancel signal close and exits.
    pub fn remove(&self, channel_id: &str) -> bool {
        self.campaigns
            .lock()
            .expect("registry lock poisoned")
            .remove(channel_id)
            .is_some()
    }

    pub fn is_running(&self, channel_id: &str) -> bool {
        self.campaigns
            .lock()
            .expect("registry lock poisoned")
            .contains_key(channel_id)
    }

    pub fn active(&self) -> Vec<CampaignInfo> {
        let campaigns = self.campaigns.lock().expect("registry lock poisoned");
        campaigns
            .iter()
            .map(|(channel_id, h)| CampaignInfo {
                id: h.id,
                channel_id: channel_id.clone(),
                started_at: h.started_at,
            })
            .collect()
    }

    /// Cancels every running campaign.
    pub fn stop_all(&self) {
        let campaigns = self.campaigns.lock().expect("registry lock poisoned");
        for h in campaigns.values() {
            let _ = h.cancel.send(true);
        }
    }

    fn release(&self, channel_id: &str, id: u64) {
        let mut campaigns = self.campaigns.lock().expect("registry lock poisoned");
        if campaigns.get(channel_id).is_some_and(|h| h.id == id) {
            campaigns.remove(channel_id);
        }
    }
}

/// Removes the campaign's registry entry however the campaign task ends.
struct EntryGuard {
    registry: NotifierRegistry,
    channel_id: String,
    id: u64,
}

impl Drop for EntryGuard {
    fn drop(&mut self) {
        self.registry.release(&self.channel_id, self.id);
    }
}

struct Campaign {
    ctx: BotContext,
    channel_id: String,
    max_repeats: u32,
    repeats: AtomicU32,
}

impl Campaign {
    async fn run(&self, interval: Duration, mut cancelled: watch::Receiver<bool>) {
        let outcome = retry::repeat_every(interval, &mut cancelled, || self.step()).await;
        let sent = self.repeats.load(Ordering::Relaxed);
        match outcome {
            Outcome::Finished => {
                tracing::info!("Campaign for {} finished after {sent} reminders", self.channel_id)
            }
            Outcome::Cancelled => {
                tracing::info!("Campaign for {} cancelled after {sent} reminders", self.channel_id)
            }
        }
    }

    async fn step(&self) -> Step {
        let missing = match engagement::non_reporters(&self.ctx, &self.channel_id, Utc::now()).await
        {
            Ok(missing) => missing,
            Err(e) => {
                // A failed lookup uses up one reminder.
                tracing::warn!("Could not list standupers of {}: {e}", self.channel_id);
                let attempts = self.repeats.fetch_add(1, Ordering::Relaxed) + 1;
                return if attempts >= self.max_repeats {
                    Step::Stop
                } else {
                    Step::Continue
                };
            }
        };
        if missing.is_empty() {
            return Step::Stop;
        }
        if self.repeats.load(Ordering::Relaxed) >= self.max_repeats {
            return Step::Stop;
        }

        let users = engagement::mentions(&missing);
        let text = self.ctx.text_count(
            "tag_non_reporters",
            users.len(),
            &[("user", &users[0]), ("users", &users.join(", "))],
        );
        if let Err(e) = self.ctx.chat.send(&Outbound::message(&self.channel_id, text)).await {
            tracing::error!("Failed to tag non-reporters in {}: {e}", self.channel_id);
        }
        self.repeats.fetch_add(1, Ordering::Relaxed);
        Step::Continue
    }
}
