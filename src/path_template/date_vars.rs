//! Calendar placeholders derived from a status creation timestamp.

use chrono::{DateTime, Datelike, Utc};

/// Names of every date placeholder, in documentation order.
pub const DATE_PLACEHOLDERS: &[&str] = &[
    "year",
    "yearmonth",
    "date",
    "month",
    "week",
    "quarter",
    "half",
    "yearweek",
    "yearquarter",
    "yearhalf",
    "datetime",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateField {
    Year,
    YearMonth,
    Date,
    Month,
    Week,
    Quarter,
    Half,
    YearWeek,
    YearQuarter,
    YearHalf,
    DateTime,
}

impl DateField {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "year" => Some(DateField::Year),
            "yearmonth" => Some(DateField::YearMonth),
            "date" => Some(DateField::Date),
            "month" => Some(DateField::Month),
            "week" => Some(DateField::Week),
            "quarter" => Some(DateField::Quarter),
            "half" => Some(DateField::Half),
            "yearweek" => Some(DateField::YearWeek),
            "yearquarter" => Some(DateField::YearQuarter),
            "yearhalf" => Some(DateField::YearHalf),
            "datetime" => Some(DateField::DateTime),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DateField::Year => "year",
            DateField::YearMonth => "yearmonth",
            DateField::Date => "date",
            DateField::Month => "month",
            DateField::Week => "week",
            DateField::Quarter => "quarter",
            DateField::Half => "half",
            DateField::YearWeek => "yearweek",
            DateField::YearQuarter => "yearquarter",
            DateField::YearHalf => "yearhalf",
            DateField::DateTime => "datetime",
        }
    }
}

/// Calendar quarter, 1..=4.
pub fn quarter_of(month: u32) -> u32 {
    (month - 1) / 3 + 1
}

/// Half-year, 1 for January..June, 2 otherwise.
pub fn half_of(month: u32) -> u32 {
    if month <= 6 {
        1
    } else {
        2
    }
}

/// Format one date field. Week numbers follow ISO 8601 and `yearweek` uses the
/// ISO week-based year, so the last days of December may belong to week 1 of
/// the following year.
pub fn format_field(field: DateField, at: &DateTime<Utc>) -> String {
    let month = at.month();
    match field {
        DateField::Year => format!("{:04}", at.year()),
        DateField::YearMonth => format!("{:04}{:02}", at.year(), month),
        DateField::Date => at.format("%Y-%m-%d").to_string(),
        DateField::Month => format!("{:02}", month),
        DateField::Week => format!("{:02}", at.iso_week().week()),
        DateField::Quarter => quarter_of(month).to_string(),
        DateField::Half => half_of(month).to_string(),
        DateField::YearWeek => {
            let iso = at.iso_week();
            format!("{:04}W{:02}", iso.year(), iso.week())
        }
        DateField::YearQuarter => format!("{:04}Q{}", at.year(), quarter_of(month)),
        DateField::YearHalf => format!("{:04}H{}", at.year(), half_of(month)),
        DateField::DateTime => at.format("%Y%m%d%H%M%S").to_string(),
    }
}
