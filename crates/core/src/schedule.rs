//! Daily active windows for verifiable tasks.

use std::collections::BTreeSet;

use chrono::{Datelike, NaiveDateTime, NaiveTime, Timelike};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::GraphError;

/// Weekday index, Monday = 0 through Sunday = 6.
pub type DayIndex = u8;

/// Names of the weekdays, indexed by [`DayIndex`].
pub const DAYS: [&str; 7] = [
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
    "Sunday",
];

/// Weekday index of a wall-clock timestamp (Monday = 0).
pub fn weekday_index(at: NaiveDateTime) -> DayIndex {
    at.weekday().num_days_from_monday() as DayIndex
}

/// Human-readable name for a weekday index, if it is in range.
pub fn day_name(day: DayIndex) -> Option<&'static str> {
    DAYS.get(day as usize).copied()
}

/// A wall-clock time of day with minute precision, written as `"HH:MM"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClockTime(NaiveTime);

impl ClockTime {
    /// Build from hour and minute.
    pub fn new(hour: u32, minute: u32) -> Result<Self, GraphError> {
        NaiveTime::from_hms_opt(hour, minute, 0)
            .map(Self)
            .ok_or_else(|| GraphError::InvalidClockTime(format!("{hour:02}:{minute:02}")))
    }

    /// Parse `"HH:MM"`.
    pub fn parse(s: &str) -> Result<Self, GraphError> {
        NaiveTime::parse_from_str(s.trim(), "%H:%M")
            .map(Self)
            .map_err(|_| GraphError::InvalidClockTime(s.to_string()))
    }

    /// Clock time of a timestamp, truncated to the minute.
    pub fn of(at: NaiveDateTime) -> Self {
        let t = at.time();
        // hour/minute of a valid time are always in range
        Self(NaiveTime::from_hms_opt(t.hour(), t.minute(), 0).unwrap_or(t))
    }

    /// Underlying chrono time.
    pub fn time(&self) -> NaiveTime {
        self.0
    }
}

impl std::fmt::Display for ClockTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.format("%H:%M"))
    }
}

impl std::str::FromStr for ClockTime {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for ClockTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ClockTime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// The daily window during which a task gates its dependent controls.
///
/// Both ends are inclusive and compared within a single calendar day; a
/// window whose start is after its end never matches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schedule {
    /// Window start.
    pub start_time: ClockTime,

    /// Window end.
    pub end_time: ClockTime,

    /// Weekdays the window applies on.
    #[serde(default)]
    pub days: BTreeSet<DayIndex>,
}

impl Schedule {
    /// Create a schedule.
    pub fn new(
        start_time: ClockTime,
        end_time: ClockTime,
        days: impl IntoIterator<Item = DayIndex>,
    ) -> Self {
        Self {
            start_time,
            end_time,
            days: days.into_iter().collect(),
        }
    }

    /// Whether `at` falls on a scheduled day and inside the window.
    pub fn contains(&self, at: NaiveDateTime) -> bool {
        if !self.days.contains(&weekday_index(at)) {
            return false;
        }
        let now = ClockTime::of(at);
        self.start_time <= now && now <= self.end_time
    }
}

impl std::fmt::Display for Schedule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let days: Vec<&str> = self
            .days
            .iter()
            .filter_map(|d| day_name(*d))
            .map(|name| &name[..3])
            .collect();
        write!(f, "{}-{} on {}", self.start_time, self.end_time, days.join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(day: u32, hour: u32, minute: u32) -> NaiveDateTime {
        // 2024-01-01 was a Monday
        NaiveDate::from_ymd_opt(2024, 1, day)
            .unwrap()
            .and_hms_opt(hour, minute, 0)
            .unwrap()
    }

    fn morning() -> Schedule {
        Schedule::new(
            ClockTime::parse("08:00").unwrap(),
            ClockTime::parse("09:00").unwrap(),
            [0],
        )
    }

    #[test]
    fn monday_is_day_zero() {
        assert_eq!(weekday_index(at(1, 12, 0)), 0);
        assert_eq!(weekday_index(at(7, 12, 0)), 6);
    }

    #[test]
    fn window_bounds_are_inclusive() {
        let schedule = morning();
        assert!(schedule.contains(at(1, 8, 0)));
        assert!(schedule.contains(at(1, 8, 30)));
        assert!(schedule.contains(at(1, 9, 0)));
        assert!(!schedule.contains(at(1, 7, 59)));
        assert!(!schedule.contains(at(1, 9, 1)));
    }

    #[test]
    fn seconds_inside_the_last_minute_still_match() {
        let late = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(9, 0, 45)
            .unwrap();
        assert!(morning().contains(late));
    }

    #[test]
    fn other_days_do_not_match() {
        assert!(!morning().contains(at(2, 8, 30)));
    }

    #[test]
    fn inverted_window_never_matches() {
        let overnight = Schedule::new(
            ClockTime::parse("22:00").unwrap(),
            ClockTime::parse("06:00").unwrap(),
            0..7,
        );
        assert!(!overnight.contains(at(1, 23, 0)));
        assert!(!overnight.contains(at(1, 5, 0)));
    }

    #[test]
    fn clock_time_rejects_garbage() {
        assert!(ClockTime::parse("25:00").is_err());
        assert!(ClockTime::parse("soon").is_err());
    }

    #[test]
    fn schedule_uses_wire_field_names() {
        let json = serde_json::to_value(morning()).unwrap();
        assert_eq!(json["startTime"], "08:00");
        assert_eq!(json["endTime"], "09:00");
        assert_eq!(json["days"], serde_json::json!([0]));
    }
}
