use std::sync::OnceLock;

use chrono::{DateTime, Duration, Local, NaiveDate, NaiveDateTime, TimeZone as _, Utc};
use clap::ValueEnum;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeZone {
    #[default]
    Local,
    Utc,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DateError {
    #[error("no date given")]
    Empty,
    #[error("Invalid date {0}")]
    Invalid(String),
    #[error("date {0} does not fall after 1970-01-01 00:00:00 UTC")]
    NotAfterEpoch(String),
}

const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M:%S", "%m/%d/%Y %H:%M"];
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y"];

pub fn parse_date(input: &str, tz: TimeZone) -> Result<DateTime<Utc>, DateError> {
    parse_date_at(input, tz, Utc::now())
}

/// Same as [`parse_date`] with an explicit "now" for relative forms.
pub fn parse_date_at(input: &str, tz: TimeZone, now: DateTime<Utc>) -> Result<DateTime<Utc>, DateError> {
    let s = input.trim();
    if s.is_empty() { return Err(DateError::Empty); }
    let invalid = || DateError::Invalid(s.to_string());
    let lower = s.to_ascii_lowercase();

    let parsed = match lower.as_str() {
        "now" => Some(now),
        "today" => start_of_day(now, 0, tz),
        "yesterday" => start_of_day(now, 1, tz),
        _ => None,
    };
    let parsed = match parsed {
        Some(t) => t,
        None => parse_absolute(s, &lower, tz, now).ok_or_else(invalid)?,
    };
    if parsed.timestamp() <= 0 { return Err(DateError::NotAfterEpoch(s.to_string())); }
    Ok(parsed)
}

fn parse_absolute(s: &str, lower: &str, tz: TimeZone, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let epoch = lower.strip_prefix('@').unwrap_or(lower);
    if !epoch.is_empty() && epoch.trim_start_matches('-').chars().all(|c| c.is_ascii_digit()) {
        return epoch.parse::<i64>().ok().and_then(|n| DateTime::from_timestamp(n, 0));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) { return Some(dt.with_timezone(&Utc)); }
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) { return Some(dt.with_timezone(&Utc)); }
    if let Some(t) = parse_ago(lower, now) { return Some(t); }
    for f in DATETIME_FORMATS {
        if let Ok(n) = NaiveDateTime::parse_from_str(s, f) { return resolve(n, tz); }
    }
    for f in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(s, f) { return resolve(d.and_hms_opt(0, 0, 0)?, tz); }
    }
    None
}

fn parse_ago(lower: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    static AGO_RE: OnceLock<Regex> = OnceLock::new();
    let re = AGO_RE.get_or_init(|| Regex::new(r"^(\d+)\s+(minute|hour|day|week)s?\s+ago$").unwrap_or_else(|_| unreachable!()));
    let caps = re.captures(lower)?;
    let n: i64 = caps.get(1)?.as_str().parse().ok()?;
    let d = match caps.get(2)?.as_str() {
        "minute" => Duration::try_minutes(n)?,
        "hour" => Duration::try_hours(n)?,
        "day" => Duration::try_days(n)?,
        _ => Duration::try_weeks(n)?,
    };
    now.checked_sub_signed(d)
}

fn start_of_day(now: DateTime<Utc>, days_back: i64, tz: TimeZone) -> Option<DateTime<Utc>> {
    let date = match tz {
        TimeZone::Local => now.with_timezone(&Local).date_naive(),
        TimeZone::Utc => now.date_naive(),
    };
    let day = date.checked_sub_signed(Duration::days(days_back))?;
    resolve(day.and_hms_opt(0, 0, 0)?, tz)
}

fn resolve(n: NaiveDateTime, tz: TimeZone) -> Option<DateTime<Utc>> {
    match tz {
        TimeZone::Utc => Some(n.and_utc()),
        TimeZone::Local => Local.from_local_datetime(&n).earliest().map(|t| t.with_timezone(&Utc)),
    }
}

/// Render a timestamp for display in the chosen zone.
pub fn display(t: DateTime<Utc>, tz: TimeZone) -> String {
    match tz {
        TimeZone::Local => t.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S %Z").to_string(),
        TimeZone::Utc => t.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> { Utc.with_ymd_and_hms(2024, 5, 10, 15, 30, 0).unwrap() }

    fn utc(s: &str) -> Result<DateTime<Utc>, DateError> { parse_date_at(s, TimeZone::Utc, now()) }

    #[test]
    fn epoch_forms() {
        assert_eq!(utc("@1700000000").unwrap().timestamp(), 1_700_000_000);
        assert_eq!(utc("1700000000").unwrap().timestamp(), 1_700_000_000);
    }

    #[test]
    fn calendar_forms() {
        let want = Utc.with_ymd_and_hms(2024, 2, 8, 0, 0, 0).unwrap();
        assert_eq!(utc("2024-02-08").unwrap(), want);
        assert_eq!(utc("02/08/2024").unwrap(), want);
        assert_eq!(utc("2024-02-08 13:45").unwrap(), Utc.with_ymd_and_hms(2024, 2, 8, 13, 45, 0).unwrap());
        assert_eq!(utc("2024-02-08T13:45:10").unwrap(), Utc.with_ymd_and_hms(2024, 2, 8, 13, 45, 10).unwrap());
        assert_eq!(utc("2024-02-08T13:45:10+02:00").unwrap(), Utc.with_ymd_and_hms(2024, 2, 8, 11, 45, 10).unwrap());
        assert_eq!(utc("Thu, 08 Feb 2024 13:45:10 +0000").unwrap(), Utc.with_ymd_and_hms(2024, 2, 8, 13, 45, 10).unwrap());
    }

    #[test]
    fn relative_forms() {
        assert_eq!(utc("now").unwrap(), now());
        assert_eq!(utc("today").unwrap(), Utc.with_ymd_and_hms(2024, 5, 10, 0, 0, 0).unwrap());
        assert_eq!(utc("Yesterday").unwrap(), Utc.with_ymd_and_hms(2024, 5, 9, 0, 0, 0).unwrap());
        assert_eq!(utc("3 days ago").unwrap(), now() - Duration::days(3));
        assert_eq!(utc("1 hour ago").unwrap(), now() - Duration::hours(1));
    }

    #[test]
    fn malformed_dates_are_errors() {
        assert_eq!(utc(""), Err(DateError::Empty));
        assert_eq!(utc("   "), Err(DateError::Empty));
        assert!(matches!(utc("next tuesday-ish"), Err(DateError::Invalid(_))));
        assert!(matches!(utc("2024-13-40"), Err(DateError::Invalid(_))));
        assert!(matches!(utc("@"), Err(DateError::Invalid(_))));
    }

    #[test]
    fn epoch_zero_is_rejected() {
        assert!(matches!(utc("@0"), Err(DateError::NotAfterEpoch(_))));
        assert!(matches!(utc("1960-01-01"), Err(DateError::NotAfterEpoch(_))));
    }

    #[test]
    fn local_zone_resolves() {
        let t = parse_date_at("2024-02-08 12:00:00", TimeZone::Local, now()).unwrap();
        assert_eq!(t.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string(), "2024-02-08 12:00:00");
    }
}
