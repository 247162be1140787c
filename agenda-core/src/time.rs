//! Calendar helpers and the injectable clock
//!
//! All recurrence and context logic works on local calendar dates. The
//! clock owns the timezone, so "today" is always the user's today.

use chrono::{
    DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveTime, Offset, TimeZone, Utc,
};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

static DATE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("valid regex"));
static TIME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([01]?[0-9]|2[0-3]):([0-5][0-9])$").expect("valid regex"));

// ============================================================================
// DATE / TIME PARSING
// ============================================================================

/// Parse a strict `YYYY-MM-DD` string into a real calendar date.
///
/// Shape-valid but impossible dates (`2025-02-30`) return `None`.
pub fn parse_ymd(s: &str) -> Option<NaiveDate> {
    if !DATE_RE.is_match(s) {
        return None;
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()
}

/// Format a date as `YYYY-MM-DD`.
pub fn format_ymd(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

pub fn is_ymd(s: &str) -> bool {
    parse_ymd(s).is_some()
}

pub fn is_hhmm(s: &str) -> bool {
    TIME_RE.is_match(s)
}

/// Days from `from` to `to` (negative when `to` is earlier).
pub fn days_between(from: NaiveDate, to: NaiveDate) -> i64 {
    (to - from).num_days()
}

pub fn add_days(date: NaiveDate, days: i64) -> NaiveDate {
    date + Duration::days(days)
}

/// Sunday through Saturday window containing `today`.
pub fn week_range(today: NaiveDate) -> (NaiveDate, NaiveDate) {
    let start = add_days(today, -(today.weekday().num_days_from_sunday() as i64));
    (start, add_days(start, 6))
}

// ============================================================================
// CLOCK TIME
// ============================================================================

/// Wall-clock time of day in 24-hour `HH:MM` form.
///
/// Single-digit hours (`9:30`) are accepted on input and normalized to two
/// digits on output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClockTime(NaiveTime);

impl ClockTime {
    pub fn new(hour: u32, minute: u32) -> Option<Self> {
        NaiveTime::from_hms_opt(hour, minute, 0).map(ClockTime)
    }

    pub fn parse(s: &str) -> Option<Self> {
        let caps = TIME_RE.captures(s.trim())?;
        let hour = caps.get(1)?.as_str().parse().ok()?;
        let minute = caps.get(2)?.as_str().parse().ok()?;
        Self::new(hour, minute)
    }

    pub fn time(&self) -> NaiveTime {
        self.0
    }
}

impl fmt::Display for ClockTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%H:%M"))
    }
}

impl FromStr for ClockTime {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ClockTime::parse(s).ok_or_else(|| format!("invalid time of day: {}", s))
    }
}

impl Serialize for ClockTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ClockTime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// CLOCK
// ============================================================================

/// Source of "now" for everything that depends on the current date.
pub trait Clock: Send + Sync + fmt::Debug {
    /// Current instant in the user's timezone.
    fn now(&self) -> DateTime<FixedOffset>;

    /// IANA-style zone label passed to prompts (e.g. `America/New_York`).
    fn zone_name(&self) -> &str;

    /// Today's local calendar date.
    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }
}

/// Wall clock with a fixed UTC offset.
#[derive(Debug, Clone)]
pub struct SystemClock {
    offset: FixedOffset,
    name: String,
}

impl SystemClock {
    /// Build a clock for a named zone with a fixed offset in minutes east of UTC.
    ///
    /// Returns `None` when the offset is out of range (more than ±24h).
    pub fn with_offset_minutes(minutes: i32, name: impl Into<String>) -> Option<Self> {
        Some(Self {
            offset: FixedOffset::east_opt(minutes.checked_mul(60)?)?,
            name: name.into(),
        })
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<FixedOffset> {
        Utc::now().with_timezone(&self.offset)
    }

    fn zone_name(&self) -> &str {
        &self.name
    }
}

/// Clock frozen at one instant.
#[derive(Debug, Clone)]
pub struct FixedClock {
    instant: DateTime<FixedOffset>,
    name: String,
}

impl FixedClock {
    pub fn new(instant: DateTime<FixedOffset>, name: impl Into<String>) -> Self {
        Self {
            instant,
            name: name.into(),
        }
    }

    /// Noon UTC on the given date.
    pub fn on(date: NaiveDate) -> Self {
        let noon = date.and_time(NaiveTime::MIN) + Duration::hours(12);
        Self::new(Utc.fix().from_utc_datetime(&noon), "UTC")
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<FixedOffset> {
        self.instant
    }

    fn zone_name(&self) -> &str {
        &self.name
    }
}
