//! Order date (`YYYYMMDD`) and relative order date values.

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Duration, Local, NaiveDate};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced while parsing order dates.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OdateError {
    /// Value is not exactly eight characters long.
    #[error("odate invalid length: {0}")]
    InvalidLength(String),
    /// Value contains non numeric characters.
    #[error("odate contains non numeric data: {0}")]
    NotNumeric(String),
    /// Digits do not form a calendar date.
    #[error("odate is not a valid calendar date: {0}")]
    InvalidDate(String),
    /// Relative odate value could not be parsed.
    #[error("invalid odate value: {0}")]
    InvalidValue(String),
}

/// Order date in `YYYYMMDD` format.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Odate(String);

impl Odate {
    /// Current order date in local time.
    pub fn today() -> Self {
        Self::from_date(Local::now().date_naive())
    }

    /// Build an odate from a calendar date.
    pub fn from_date(date: NaiveDate) -> Self {
        Self(date.format("%Y%m%d").to_string())
    }

    /// Parse a `YYYY-MM-DD` string.
    pub fn from_date_string(value: &str) -> Result<Self, OdateError> {
        NaiveDate::parse_from_str(value, "%Y-%m-%d")
            .map(Self::from_date)
            .map_err(|_| OdateError::InvalidDate(value.to_string()))
    }

    /// Calendar date of this odate.
    pub fn to_date(&self) -> NaiveDate {
        // Constructors guarantee a valid date.
        NaiveDate::parse_from_str(&self.0, "%Y%m%d").unwrap_or_default()
    }

    /// Raw `YYYYMMDD` string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short `YYMMDD` form.
    pub fn odate(&self) -> &str {
        &self.0[2..]
    }

    /// `YYYY-MM-DD` form.
    pub fn format_date(&self) -> String {
        self.to_date().format("%Y-%m-%d").to_string()
    }

    /// Year, month and day components.
    pub fn ymd(&self) -> (i32, u32, u32) {
        let d = self.to_date();
        (d.year(), d.month(), d.day())
    }

    /// Day of month.
    pub fn day(&self) -> u32 {
        self.to_date().day()
    }

    /// Month number (1..=12).
    pub fn month(&self) -> u32 {
        self.to_date().month()
    }

    /// ISO weekday, 1 = Monday .. 7 = Sunday.
    pub fn weekday(&self) -> u32 {
        self.to_date().weekday().number_from_monday()
    }

    /// ISO week number.
    pub fn iso_week(&self) -> u32 {
        self.to_date().iso_week().week()
    }

    /// Odate shifted by `days`.
    #[must_use]
    pub fn add_days(&self, days: i64) -> Self {
        let date = self.to_date();
        Self::from_date(date.checked_add_signed(Duration::days(days)).unwrap_or(date))
    }

    /// True if this odate is strictly before `other`.
    pub fn is_before(&self, other: &Self) -> bool {
        self.0 < other.0
    }
}

impl FromStr for Odate {
    type Err = OdateError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if value.len() != 8 {
            return Err(OdateError::InvalidLength(value.to_string()));
        }
        if !value.bytes().all(|b| b.is_ascii_digit()) {
            return Err(OdateError::NotNumeric(value.to_string()));
        }
        NaiveDate::parse_from_str(value, "%Y%m%d")
            .map(Self::from_date)
            .map_err(|_| OdateError::InvalidDate(value.to_string()))
    }
}

impl TryFrom<String> for Odate {
    type Error = OdateError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Odate> for String {
    fn from(value: Odate) -> Self {
        value.0
    }
}

impl fmt::Display for Odate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Odate expectation declared by a ticket in a task definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum OdateValue {
    /// Same order date as the task (`ODATE`).
    Date,
    /// Previous scheduled order date (`PREV`).
    Prev,
    /// Next scheduled order date (`NEXT`).
    Next,
    /// Order date shifted by a number of days (`+n`, `-n`).
    Relative(i32),
    /// Any order date (`*`).
    Any,
    /// Date independent ticket (empty).
    None,
}

impl FromStr for OdateValue {
    type Err = OdateError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "ODATE" => Ok(Self::Date),
            "PREV" => Ok(Self::Prev),
            "NEXT" => Ok(Self::Next),
            "*" => Ok(Self::Any),
            "" => Ok(Self::None),
            other if other.starts_with('+') || other.starts_with('-') => other
                .parse::<i32>()
                .map(Self::Relative)
                .map_err(|_| OdateError::InvalidValue(other.to_string())),
            other => Err(OdateError::InvalidValue(other.to_string())),
        }
    }
}

impl TryFrom<String> for OdateValue {
    type Error = OdateError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<OdateValue> for String {
    fn from(value: OdateValue) -> Self {
        value.to_string()
    }
}

impl fmt::Display for OdateValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Date => f.write_str("ODATE"),
            Self::Prev => f.write_str("PREV"),
            Self::Next => f.write_str("NEXT"),
            Self::Relative(days) => write!(f, "{days:+}"),
            Self::Any => f.write_str("*"),
            Self::None => Ok(()),
        }
    }
}
