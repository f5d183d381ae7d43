use chrono::{DateTime, FixedOffset, NaiveTime, Timelike};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResolveError {
    #[error("empty time expression")]
    Empty,
    #[error("could not resolve time expression '{0}'")]
    Unrecognized(String),
}

/// Turns a stored free-text time expression into a time of day.
pub trait TimeResolver: Send + Sync {
    fn resolve(
        &self,
        expression: &str,
        reference: DateTime<FixedOffset>,
    ) -> Result<NaiveTime, ResolveError>;
}

/// Resolves clock expressions: `10:00`, `9.30`, `13`, `1pm`, `10:15 am`,
/// `noon`, `midnight`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ClockResolver;

impl TimeResolver for ClockResolver {
    fn resolve(
        &self,
        expression: &str,
        _reference: DateTime<FixedOffset>,
    ) -> Result<NaiveTime, ResolveError> {
        parse_clock(expression)
    }
}

pub fn parse_clock(expression: &str) -> Result<NaiveTime, ResolveError> {
    let text = expression.trim().to_lowercase();
    if text.is_empty() {
        return Err(ResolveError::Empty);
    }
    let unrecognized = || ResolveError::Unrecognized(expression.trim().to_string());

    match text.as_str() {
        "noon" | "midday" => return NaiveTime::from_hms_opt(12, 0, 0).ok_or_else(unrecognized),
        "midnight" => return Ok(NaiveTime::MIN),
        _ => {}
    }

    let (clock, meridiem) = if let Some(rest) = text.strip_suffix("am") {
        (rest.trim_end(), Some(false))
    } else if let Some(rest) = text.strip_suffix("pm") {
        (rest.trim_end(), Some(true))
    } else {
        (text.as_str(), None)
    };

    let (hour, minute) = match clock.split_once([':', '.']) {
        Some((h, m)) if m.len() == 2 => (h, m),
        Some(_) => return Err(unrecognized()),
        None => (clock, "0"),
    };
    let mut hour: u32 = hour.parse().map_err(|_| unrecognized())?;
    let minute: u32 = minute.parse().map_err(|_| unrecognized())?;

    if let Some(pm) = meridiem {
        if !(1..=12).contains(&hour) {
            return Err(unrecognized());
        }
        hour = match (hour, pm) {
            (12, false) => 0,
            (12, true) => 12,
            (h, true) => h + 12,
            (h, false) => h,
        };
    }

    NaiveTime::from_hms_opt(hour, minute, 0).ok_or_else(unrecognized)
}

/// Hour and minute equality, the only comparison the scheduler makes.
pub fn same_minute(a: impl Timelike, b: impl Timelike) -> bool {
    a.hour() == b.hour() && a.minute() == b.minute()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hm(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn test_parse_24h_forms() {
        assert_eq!(parse_clock("10:00"), Ok(hm(10, 0)));
        assert_eq!(parse_clock(" 9.30 "), Ok(hm(9, 30)));
        assert_eq!(parse_clock("13"), Ok(hm(13, 0)));
        assert_eq!(parse_clock("23:59"), Ok(hm(23, 59)));
    }

    #[test]
    fn test_parse_meridiem_forms() {
        assert_eq!(parse_clock("1pm"), Ok(hm(13, 0)));
        assert_eq!(parse_clock("10:15 am"), Ok(hm(10, 15)));
        assert_eq!(parse_clock("12am"), Ok(hm(0, 0)));
        assert_eq!(parse_clock("12PM"), Ok(hm(12, 0)));
        assert_eq!(parse_clock("noon"), Ok(hm(12, 0)));
        assert_eq!(parse_clock("midnight"), Ok(hm(0, 0)));
    }

    #[test]
    fn test_parse_failures() {
        assert_eq!(parse_clock(""), Err(ResolveError::Empty));
        assert!(parse_clock("tomorrow-ish").is_err());
        assert!(parse_clock("25:00").is_err());
        assert!(parse_clock("10:5").is_err());
        assert!(parse_clock("13pm").is_err());
        assert!(parse_clock("10:60").is_err());
    }

    #[test]
    fn test_same_minute_ignores_seconds() {
        let a = NaiveTime::from_hms_opt(9, 45, 0).unwrap();
        let b = NaiveTime::from_hms_opt(9, 45, 59).unwrap();
        assert!(same_minute(a, b));
        assert!(!same_minute(a, hm(9, 46)));
    }
}
