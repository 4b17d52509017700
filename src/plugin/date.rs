//! Formatted dates for Replace rules.
//!
//! Each rule in the `date` settings list names a Replace pattern and how
//! to render the point in time that fills its `%s` slot:
//!
//! | Key       | Default                  | Accepts |
//! |-----------|--------------------------|---------|
//! | `pattern` | required                 | a Replace rule pattern |
//! | `format`  | `%Y-%m-%dT%H:%M:%S%:z`   | strftime directives |
//! | `when`    | `now`                    | `now`, `today`, `tomorrow`, `yesterday`, `@<epoch>`, RFC 3339, `YYYY-MM-DD` |
//! | `zone`    | `UTC`                    | `UTC`, `Z`, `GMT`, `+HH:MM`, `-HHMM`, `+HH`, IANA names such as `Europe/Paris` |
//!
//! Named zones follow daylight saving time: the offset is the one in force
//! at the rendered instant, not at build time.

use std::fmt::Write as _;

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Days, FixedOffset, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::Deserialize;

use super::replace::{ReplaceSettings, fill_slot};
use crate::builder::BuildConfig;
use crate::{Error, Result};

const PLUGIN: &str = "Date";

/// ISO 8601 with a colon-separated offset.
pub const DEFAULT_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%:z";

/// One entry of the `date` settings list.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DateRule {
    /// Replace pattern whose slot receives the date.
    pub pattern: String,
    /// strftime format.
    #[serde(default = "default_format")]
    pub format: String,
    /// Point in time to render.
    #[serde(default = "default_when")]
    pub when: String,
    /// Time zone to render in.
    #[serde(default = "default_zone")]
    pub zone: String,
}

fn default_format() -> String {
    DEFAULT_FORMAT.to_string()
}

fn default_when() -> String {
    "now".to_string()
}

fn default_zone() -> String {
    "UTC".to_string()
}

impl DateRule {
    /// Renders this rule relative to `now`.
    pub fn render(&self, now: DateTime<Utc>) -> Result<String> {
        let zone = parse_zone(&self.zone)?;
        let when = parse_when(&self.when, now, zone)?;

        if StrftimeItems::new(&self.format).any(|item| matches!(item, Item::Error)) {
            return Err(Error::configuration(
                PLUGIN,
                format!("invalid date format '{}'", self.format),
            ));
        }
        let mut out = String::new();
        write!(out, "{}", when.format(&self.format)).map_err(|_| {
            Error::configuration(
                PLUGIN,
                format!("format '{}' cannot render {}", self.format, when),
            )
        })?;
        Ok(out)
    }
}

/// Fills Replace rules with formatted dates.
#[derive(Debug, Clone, Default)]
pub struct DatePlugin {
    now: Option<DateTime<Utc>>,
}

impl DatePlugin {
    /// Creates a plugin that reads the system clock.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a plugin with a fixed notion of "now".
    pub fn at(now: DateTime<Utc>) -> Self {
        Self { now: Some(now) }
    }

    pub(super) fn resolve(&mut self, config: &mut BuildConfig) -> Result<()> {
        let Some(mut replace) = config.settings.typed::<ReplaceSettings>("replace")? else {
            log::debug!("no replace settings, dates not needed");
            return Ok(());
        };
        let rules: Vec<DateRule> = config.settings.typed("date")?.unwrap_or_default();
        let now = self.now.unwrap_or_else(Utc::now);

        for rule in &rules {
            let value = rule.render(now)?;
            fill_slot(PLUGIN, &mut replace, &rule.pattern, &value)?;
        }
        config.settings.store("replace", &replace)
    }
}

/// A time zone as written in a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Zone {
    Fixed(FixedOffset),
    Named(Tz),
}

impl Zone {
    fn localize(self, at: DateTime<Utc>) -> DateTime<FixedOffset> {
        match self {
            Zone::Fixed(offset) => at.with_timezone(&offset),
            Zone::Named(tz) => at.with_timezone(&tz).fixed_offset(),
        }
    }

    /// Start of `day`; the earlier instant when midnight is ambiguous.
    fn midnight(self, day: NaiveDate) -> Option<DateTime<FixedOffset>> {
        let local = day.and_hms_opt(0, 0, 0)?;
        match self {
            Zone::Fixed(offset) => local.and_local_timezone(offset).single(),
            Zone::Named(tz) => local
                .and_local_timezone(tz)
                .earliest()
                .map(|at| at.fixed_offset()),
        }
    }
}

fn parse_zone(zone: &str) -> Result<Zone> {
    let invalid = || Error::configuration(PLUGIN, format!("unsupported time zone '{}'", zone));

    let trimmed = zone.trim();
    if ["UTC", "Z", "GMT"].iter().any(|z| trimmed.eq_ignore_ascii_case(z)) {
        return FixedOffset::east_opt(0).map(Zone::Fixed).ok_or_else(invalid);
    }

    let (sign, rest) = match trimmed.split_at_checked(1) {
        Some(("+", rest)) => (1, rest),
        Some(("-", rest)) => (-1, rest),
        _ => return trimmed.parse::<Tz>().map(Zone::Named).map_err(|_| invalid()),
    };
    let digits: String = rest.chars().filter(|c| *c != ':').collect();
    if !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid());
    }
    let (hours, minutes) = match digits.len() {
        2 => (&digits[..2], "0"),
        4 => (&digits[..2], &digits[2..]),
        _ => return Err(invalid()),
    };
    let hours: i32 = hours.parse().map_err(|_| invalid())?;
    let minutes: i32 = minutes.parse().map_err(|_| invalid())?;
    if hours > 23 || minutes > 59 {
        return Err(invalid());
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
        .map(Zone::Fixed)
        .ok_or_else(invalid)
}

fn parse_when(when: &str, now: DateTime<Utc>, zone: Zone) -> Result<DateTime<FixedOffset>> {
    let invalid = || Error::configuration(PLUGIN, format!("cannot interpret date '{}'", when));

    let local_now = zone.localize(now);
    let trimmed = when.trim();
    match trimmed.to_ascii_lowercase().as_str() {
        "now" => return Ok(local_now),
        "today" => return zone.midnight(local_now.date_naive()).ok_or_else(invalid),
        "tomorrow" => {
            return local_now
                .date_naive()
                .checked_add_days(Days::new(1))
                .and_then(|day| zone.midnight(day))
                .ok_or_else(invalid);
        }
        "yesterday" => {
            return local_now
                .date_naive()
                .checked_sub_days(Days::new(1))
                .and_then(|day| zone.midnight(day))
                .ok_or_else(invalid);
        }
        _ => {}
    }

    if let Some(epoch) = trimmed.strip_prefix('@') {
        let secs: i64 = epoch.parse().map_err(|_| invalid())?;
        return DateTime::from_timestamp(secs, 0)
            .map(|at| zone.localize(at))
            .ok_or_else(invalid);
    }
    if let Ok(at) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(zone.localize(at.with_timezone(&Utc)));
    }
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .and_then(|day| zone.midnight(day))
        .ok_or_else(invalid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 9, 22, 30, 15).unwrap()
    }

    fn rule(value: serde_json::Value) -> DateRule {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_defaults() {
        let rule = rule(json!({"pattern": "@date@"}));
        assert_eq!(rule.render(now()).unwrap(), "2024-03-09T22:30:15+00:00");
    }

    #[test]
    fn test_zone_shifts_calendar_day() {
        let rule = rule(json!({"pattern": "x", "format": "%Y-%m-%d", "zone": "+02:00"}));
        assert_eq!(rule.render(now()).unwrap(), "2024-03-10");
    }

    #[test]
    fn test_relative_days() {
        let render = |when: &str| {
            rule(json!({"pattern": "x", "when": when, "format": "%F %T"}))
                .render(now())
                .unwrap()
        };
        assert_eq!(render("today"), "2024-03-09 00:00:00");
        assert_eq!(render("tomorrow"), "2024-03-10 00:00:00");
        assert_eq!(render("yesterday"), "2024-03-08 00:00:00");
        assert_eq!(render("@0"), "1970-01-01 00:00:00");
        assert_eq!(render("2001-02-03"), "2001-02-03 00:00:00");
        assert_eq!(render("2001-02-03T04:05:06Z"), "2001-02-03 04:05:06");
    }

    #[test]
    fn test_zone_parsing() {
        let offset = |zone: &str| match parse_zone(zone).unwrap() {
            Zone::Fixed(offset) => offset.local_minus_utc(),
            Zone::Named(tz) => panic!("'{zone}' parsed as named zone {tz}"),
        };
        assert_eq!(offset("utc"), 0);
        assert_eq!(offset("-0530"), -(5 * 3600 + 30 * 60));
        assert_eq!(offset("+09"), 9 * 3600);
        assert_eq!(parse_zone("Europe/Paris").unwrap(), Zone::Named(Tz::Europe__Paris));
        assert!(parse_zone("Mars/Olympus").is_err());
        assert!(parse_zone("+25:00").is_err());
    }

    #[test]
    fn test_named_zone_follows_daylight_saving() {
        let render = |when: &str| {
            rule(json!({"pattern": "x", "when": when, "zone": "Europe/Paris"}))
                .render(now())
                .unwrap()
        };
        assert_eq!(render("2024-07-01T10:00:00Z"), "2024-07-01T12:00:00+02:00");
        assert_eq!(render("2024-01-15T10:00:00Z"), "2024-01-15T11:00:00+01:00");
        assert_eq!(render("2024-07-01"), "2024-07-01T00:00:00+02:00");
        assert_eq!(render("now"), "2024-03-09T23:30:15+01:00");
    }

    #[test]
    fn test_invalid_inputs() {
        assert!(rule(json!({"pattern": "x", "format": "%Q"})).render(now()).is_err());
        assert!(rule(json!({"pattern": "x", "when": "next week"})).render(now()).is_err());
    }

    #[test]
    fn test_resolve_fills_replace() {
        let mut config = BuildConfig::new(".")
            .setting("date", json!([{"pattern": "@year@", "format": "%Y"}]))
            .setting(
                "replace",
                json!({"all": [{"pattern": "@year@", "replacement": "(c) %s"}]}),
            );
        DatePlugin::at(now()).resolve(&mut config).unwrap();
        let replace: ReplaceSettings = config.settings.require("replace").unwrap();
        assert_eq!(replace.all[0].replacement, "(c) 2024");
    }
}
