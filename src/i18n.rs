use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

pub const DEFAULT_LANGUAGE: &str = "en";

const DEFAULT_MESSAGES: &str = r#"
minutes = { one = "{count} minute", other = "{count} minutes" }
warn_non_reporters = { one = "{user}, you have {minutes} left to submit your standup!", other = "{users}, you have {minutes} left to submit your standups!" }
tag_non_reporters = { one = "{user}, you missed the standup deadline. Please submit your standup!", other = "{users}, you missed the standup deadline. Please submit your standups!" }
report_header = "Yesterday report"
report_header_weekly = "Weekly report"
not_tag_standuper = "{user} in #{channel}"
tag_standuper = "<@{user}> in #{channel}"
worklogs_time = "{project} out of {total}"
worklogs = " worklogs: {time} {emoji} |"
commits = " commits: {commits} {emoji} |"
no_standup = " standup :x: "
has_standup = " standup :heavy_check_mark: "
report_error = "Error sending {kind} report: {error}"
month_end_header = "Today is the last day of the month. Please double-check your worklogs!"
month_end_line = "{channel}: {hours} h"
month_end_total = "Total: {hours} h"
deadline_set = "Updated standup deadline to {deadline} in {tz} timezone"
deadline_removed = "Standup deadline removed"
wrong_deadline_format = "Could not recognize deadline time. Use 1pm or 13:00 formats"
welcome_no_deadline = "Welcome to the standup team, no standup deadline has been set up yet"
welcome_with_deadline = "Welcome to the standup team, please submit your standups no later than {deadline}"
already_standuper = "You are already a part of the standup team"
not_standuper = "You do not submit standups in this channel"
left_standupers = "You no longer have to submit standups in this channel"
show_no_deadline = "Standup deadline is not set"
show_deadline = "Standup deadline is {deadline}"
show_timezone = "Channel time zone is {tz}"
show_no_submission_days = "No submission days"
show_submission_days = "Submit standups on {days}"
show_no_standupers = "No standupers in the team, join to start standuping"
show_standupers = { one = "Only {standupers} submits standups in the team", other = "{standupers} submit standups in the team" }
onboarding_default = "Hello and welcome to #{channel}"
no_yesterday_mention = "- no 'yesterday' keywords detected: {keywords}"
no_today_mention = "- no 'today' keywords detected: {keywords}"
no_problems_mention = "- no 'problems' keywords detected: {keywords}"
"#;

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum Template {
    Plain(String),
    Plural { one: Option<String>, other: String },
}

impl Template {
    fn pick(&self, count: Option<usize>) -> &str {
        match self {
            Template::Plain(text) => text,
            Template::Plural { one, other } => match (count, one) {
                (Some(1), Some(one)) => one,
                _ => other,
            },
        }
    }
}

type Bundle = HashMap<String, Template>;

/// Message bundles keyed by language. Lookups never fail: unknown languages
/// and keys fall back to the built-in English text, then to the key itself.
pub struct Localizer {
    bundles: HashMap<String, Bundle>,
}

impl Localizer {
    pub fn new() -> Self {
        let defaults: Bundle =
            toml::from_str(DEFAULT_MESSAGES).expect("built-in messages are valid TOML");
        let mut bundles = HashMap::new();
        bundles.insert(DEFAULT_LANGUAGE.to_string(), defaults);
        Self { bundles }
    }

    /// Loads every `<language>.toml` in `dir` on top of the defaults.
    pub fn load_dir(dir: &Path) -> Result<Self> {
        let mut localizer = Self::new();
        if !dir.exists() {
            return Ok(localizer);
        }
        for entry in std::fs::read_dir(dir)?.flatten() {
            let path = entry.path();
            if path.extension().is_some_and(|e| e == "toml") {
                let language = path
                    .file_stem()
                    .unwrap_or_default()
                    .to_string_lossy()
                    .to_string();
                let content = std::fs::read_to_string(&path)?;
                localizer
                    .add_bundle(&language, &content)
                    .with_context(|| format!("Failed to load messages: {}", path.display()))?;
                tracing::info!("Loaded {language} messages from {}", path.display());
            }
        }
        Ok(localizer)
    }

    pub fn add_bundle(&mut self, language: &str, content: &str) -> Result<()> {
        let bundle: Bundle = toml::from_str(content)?;
        self.bundles
            .entry(language.to_string())
            .or_default()
            .extend(bundle);
        Ok(())
    }

    pub fn localize(&self, language: &str, key: &str, args: &[(&str, &str)]) -> String {
        self.render(language, key, None, args)
    }

    pub fn localize_count(
        &self,
        language: &str,
        key: &str,
        count: usize,
        args: &[(&str, &str)],
    ) -> String {
        self.render(language, key, Some(count), args)
    }

    fn render(
        &self,
        language: &str,
        key: &str,
        count: Option<usize>,
        args: &[(&str, &str)],
    ) -> String {
        let template = self
            .bundles
            .get(language)
            .and_then(|b| b.get(key))
            .or_else(|| self.bundles.get(DEFAULT_LANGUAGE).and_then(|b| b.get(key)));
        let Some(template) = template else {
            tracing::warn!("Missing message '{key}' for language '{language}'");
            return key.to_string();
        };

        let count_text = count.map(|c| c.to_string());
        substitute(template.pick(count), count_text.as_deref(), args)
    }
}

/// Replaces `{name}` placeholders in one pass over the template, so values
/// are never scanned for placeholders themselves. Unknown names stay as
/// written.
fn substitute<'a>(template: &str, count: Option<&'a str>, args: &[(&'a str, &'a str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let found = after.find('}').and_then(|close| {
            let name = &after[..close];
            let value = match (name, count) {
                ("count", Some(count)) => Some(count),
                _ => args.iter().find(|(n, _)| *n == name).map(|(_, v)| *v),
            };
            value.map(|v| (v, close))
        });
        match found {
            Some((value, close)) => {
                out.push_str(value);
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

impl Default for Localizer {
    fn default() -> Self {
        Self::new()
    }
}
