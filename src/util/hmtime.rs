//! `HH:MM` time-of-day values.

use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};

/// Time of day with minute precision, serialized as `HH:MM`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct HourMinTime {
    hour: u32,
    minute: u32,
}

impl HourMinTime {
    /// Build from components, rejecting out-of-range values.
    pub fn new(hour: u32, minute: u32) -> Result<Self, String> {
        if hour > 23 || minute > 59 {
            return Err(format!("invalid time {hour:02}:{minute:02}"));
        }
        Ok(Self { hour, minute })
    }

    /// Time of day of a timestamp, truncated to minutes.
    pub fn from_datetime(tm: &NaiveDateTime) -> Self {
        Self {
            hour: tm.hour(),
            minute: tm.minute(),
        }
    }

    /// Hour component.
    pub const fn hour(&self) -> u32 {
        self.hour
    }

    /// Minute component.
    pub const fn minute(&self) -> u32 {
        self.minute
    }

    /// This time of day on the given date.
    pub fn on(&self, date: NaiveDate) -> NaiveDateTime {
        date.and_time(NaiveTime::from_hms_opt(self.hour, self.minute, 0).unwrap_or_default())
    }
}

impl FromStr for HourMinTime {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let (h, m) = value
            .split_once(':')
            .ok_or_else(|| format!("invalid time format: {value}"))?;
        if h.len() != 2 || m.len() != 2 {
            return Err(format!("invalid time format: {value}"));
        }
        let hour = h.parse::<u32>().map_err(|_| format!("invalid hour: {value}"))?;
        let minute = m.parse::<u32>().map_err(|_| format!("invalid minute: {value}"))?;
        Self::new(hour, minute)
    }
}

impl TryFrom<String> for HourMinTime {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<HourMinTime> for String {
    fn from(value: HourMinTime) -> Self {
        value.to_string()
    }
}

impl fmt::Display for HourMinTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}
