use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Utc, Weekday};
use serde::{Deserialize, Serialize};

pub const DEFAULT_TIMEZONE: &str = "UTC";

/// A monitored chat channel. Channels are never deleted; clearing `deadline`
/// disables nagging for the channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    pub workspace_id: String,
    pub channel_id: String,
    pub name: String,
    /// Free-text deadline expression. Empty means no deadline.
    #[serde(default)]
    pub deadline: String,
    #[serde(default)]
    pub warning_offset_minutes: i64,
    #[serde(default)]
    pub submission_days: SubmissionDays,
    #[serde(default = "default_true")]
    pub reports_enabled: bool,
    #[serde(default = "default_timezone")]
    pub timezone: String,
    /// Sent to members who join the chat channel. Empty means the default
    /// greeting.
    #[serde(default)]
    pub onboarding_message: String,
    pub created_at: DateTime<Utc>,
}

fn default_true() -> bool {
    true
}

fn default_timezone() -> String {
    DEFAULT_TIMEZONE.to_string()
}

impl Channel {
    pub fn new(
        workspace_id: impl Into<String>,
        channel_id: impl Into<String>,
        name: impl Into<String>,
        warning_offset_minutes: i64,
    ) -> Self {
        Self {
            workspace_id: workspace_id.into(),
            channel_id: channel_id.into(),
            name: name.into(),
            deadline: String::new(),
            warning_offset_minutes,
            submission_days: SubmissionDays::default(),
            reports_enabled: true,
            timezone: default_timezone(),
            onboarding_message: String::new(),
            created_at: Utc::now(),
        }
    }

    pub fn has_deadline(&self) -> bool {
        !self.deadline.trim().is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Developer,
    Pm,
    Designer,
}

impl Role {
    /// Roles are free text in the join command; anything unknown is a developer.
    pub fn parse(text: &str) -> Self {
        match text.trim().to_lowercase().as_str() {
            "pm" => Role::Pm,
            "designer" => Role::Designer,
            _ => Role::Developer,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Developer => "developer",
            Role::Pm => "pm",
            Role::Designer => "designer",
        }
    }

    /// Pm members are never tagged for a missing standup.
    pub fn is_tagged(&self) -> bool {
        *self != Role::Pm
    }

    /// Pm and designer members are not expected to commit code.
    pub fn commits_exempt(&self) -> bool {
        matches!(self, Role::Pm | Role::Designer)
    }
}

/// Channel membership of a user enrolled in standups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Standuper {
    pub workspace_id: String,
    pub channel_id: String,
    pub channel_name: String,
    pub user_id: String,
    pub display_name: String,
    #[serde(default)]
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandupRecord {
    pub id: u64,
    pub workspace_id: String,
    pub channel_id: String,
    pub user_id: String,
    pub comment: String,
    pub created_at: DateTime<Utc>,
    /// Timestamp of the chat message the standup came from.
    pub message_ts: String,
}

/// Weekdays on which a channel expects standups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SubmissionDays(u8);

impl SubmissionDays {
    pub fn none() -> Self {
        Self(0)
    }

    pub fn from_days(days: &[Weekday]) -> Self {
        let mut set = Self::none();
        for day in days {
            set.insert(*day);
        }
        set
    }

    pub fn insert(&mut self, day: Weekday) {
        self.0 |= 1 << day.num_days_from_monday();
    }

    pub fn contains(&self, day: Weekday) -> bool {
        self.0 & (1 << day.num_days_from_monday()) != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = Weekday> + '_ {
        let mut day = Weekday::Mon;
        (0..7).filter_map(move |_| {
            let current = day;
            day = day.succ();
            self.contains(current).then_some(current)
        })
    }
}

impl Default for SubmissionDays {
    fn default() -> Self {
        Self::from_days(&[
            Weekday::Mon,
            Weekday::Tue,
            Weekday::Wed,
            Weekday::Thu,
            Weekday::Fri,
        ])
    }
}

impl FromStr for SubmissionDays {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut set = Self::none();
        for part in s.split([',', ' ']).map(str::trim).filter(|p| !p.is_empty()) {
            let day = part
                .parse::<Weekday>()
                .map_err(|_| anyhow::anyhow!("Unknown weekday: {part}"))?;
            set.insert(day);
        }
        Ok(set)
    }
}

impl TryFrom<String> for SubmissionDays {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SubmissionDays> for String {
    fn from(days: SubmissionDays) -> Self {
        days.to_string()
    }
}

impl fmt::Display for SubmissionDays {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<_> = self.iter().map(weekday_name).collect();
        write!(f, "{}", names.join(", "))
    }
}

pub fn weekday_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "monday",
        Weekday::Tue => "tuesday",
        Weekday::Wed => "wednesday",
        Weekday::Thu => "thursday",
        Weekday::Fri => "friday",
        Weekday::Sat => "saturday",
        Weekday::Sun => "sunday",
    }
}

/// Saturday and Sunday: no warnings and no campaigns.
pub fn is_weekend(day: Weekday) -> bool {
    matches!(day, Weekday::Sat | Weekday::Sun)
}

/// Reports computed on these days look back over a weekend and are never
/// colored as failures.
pub fn is_after_weekend(date: impl Datelike) -> bool {
    matches!(date.weekday(), Weekday::Sun | Weekday::Mon)
}
