//! Free-form time-expression parsing for `set_reminder`.
//!
//! Accepted shapes, tried in order:
//! - relative durations: `in 2 hours`, `90m`, `1h 30m`, `1 day 2 hours`
//! - absolute with an explicit offset: RFC 3339 and common `%z` layouts,
//!   converted to UTC
//! - absolute without an offset: literal clock values are treated as already
//!   being UTC (a documented simplification, not a guess at user intent)
//! - bare `HH:MM[:SS]`: today's UTC date
//!
//! Everything is anchored to UTC.

use std::fmt;
use std::sync::OnceLock;

use chrono::{DateTime, Duration, NaiveDateTime, NaiveTime, TimeZone, Utc};
use regex::Regex;

use crate::errors::{Error, RangeError, Result};

const ZONED_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S %z",
    "%Y-%m-%d %H:%M %z",
    "%Y-%m-%dT%H:%M:%S%z",
    "%d.%m.%Y %H:%M %z",
];

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%d.%m.%Y %H:%M",
    "%d/%m/%Y %H:%M",
];

const TIME_ONLY_FORMATS: &[&str] = &["%H:%M:%S", "%H:%M"];

fn relative_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?ix) ^ \s* (?:in\s+)?
              (?: (?P<d>\d+) \s* d(?:ays?)? )? [\s,]* (?:and\s+)?
              (?: (?P<h>\d+) \s* h(?:(?:ou)?rs?)? )? [\s,]* (?:and\s+)?
              (?: (?P<m>\d+) \s* m(?:in(?:ute)?s?)? )? [\s,]* (?:and\s+)?
              (?: (?P<s>\d+) \s* s(?:ec(?:ond)?s?)? )?
              \s* $",
        )
        .expect("valid regex")
    })
}

/// Interpret `input` as an absolute UTC instant, without range checks.
pub fn parse_time_expression(input: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
    let s = input.trim();
    if s.is_empty() {
        return Err(Error::Parse("empty time expression".to_string()));
    }

    if let Some(delta) = parse_relative(s) {
        return Ok(now + delta);
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    for fmt in ZONED_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
            return Ok(dt.with_timezone(&Utc));
        }
    }
    for fmt in NAIVE_FORMATS {
        if let Ok(ndt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(Utc.from_utc_datetime(&ndt));
        }
    }
    for fmt in TIME_ONLY_FORMATS {
        if let Ok(t) = NaiveTime::parse_from_str(s, fmt) {
            return Ok(Utc.from_utc_datetime(&now.date_naive().and_time(t)));
        }
    }

    Err(Error::Parse(format!("unrecognized time expression: {s}")))
}

/// Parse `input` and validate it is usable for scheduling: strictly in the
/// future and no further out than `max_horizon`.
pub fn parse_future_time(
    input: &str,
    now: DateTime<Utc>,
    max_horizon: Duration,
) -> Result<DateTime<Utc>> {
    let at = parse_time_expression(input, now)?;
    if at <= now {
        return Err(RangeError::PastTime.into());
    }
    if at - now > max_horizon {
        return Err(RangeError::TooFar {
            max_days: max_horizon.num_days(),
        }
        .into());
    }
    Ok(at)
}

fn parse_relative(s: &str) -> Option<Duration> {
    let caps = relative_re().captures(s)?;

    let field = |name: &str| -> Option<i64> { caps.name(name)?.as_str().parse::<i64>().ok() };
    let days = field("d");
    let hours = field("h");
    let minutes = field("m");
    let seconds = field("s");

    if days.is_none() && hours.is_none() && minutes.is_none() && seconds.is_none() {
        return None;
    }

    Some(
        Duration::days(days.unwrap_or(0))
            + Duration::hours(hours.unwrap_or(0))
            + Duration::minutes(minutes.unwrap_or(0))
            + Duration::seconds(seconds.unwrap_or(0)),
    )
}

/// Hours/minutes/seconds breakdown of a delay, for user-facing display.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DurationParts {
    pub hours: i64,
    pub minutes: i64,
    pub seconds: i64,
}

impl DurationParts {
    pub fn from_duration(d: Duration) -> Self {
        let total = d.num_seconds().max(0);
        Self {
            hours: total / 3600,
            minutes: (total % 3600) / 60,
            seconds: total % 60,
        }
    }
}

impl fmt::Display for DurationParts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.hours > 0 {
            return write!(f, "{}h {}m {}s", self.hours, self.minutes, self.seconds);
        }
        if self.minutes > 0 {
            return write!(f, "{}m {}s", self.minutes, self.seconds);
        }
        write!(f, "{}s", self.seconds)
    }
}
