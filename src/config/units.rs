//! Human-friendly durations and rates in the config file.
//!
//! Durations: bare numbers are seconds; strings such as `"30"`, `"5 seconds"`,
//! `"2 min"`, `"1.5 hours"` or `"7 days"`. A rate expression (`"2/minute"`) is
//! also accepted where a delay is expected and means the spacing it implies.
//!
//! Rates: `"2/minute"`, `"10 per hour"`; bare numbers are per minute.

use std::time::Duration;

use anyhow::{bail, Result};
use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;

/// Raw value as it appears in TOML.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum HumanValue {
    Flag(bool),
    Number(f64),
    Text(String),
}

impl From<&str> for HumanValue {
    fn from(s: &str) -> Self {
        HumanValue::Text(s.to_string())
    }
}

lazy_static! {
    static ref QUANTITY: Regex =
        Regex::new(r"^(?P<qty>\d+(?:\.\d+)?)?\s*(?P<unit>[a-z]*)$").expect("valid quantity regex");
    static ref RATE: Regex =
        Regex::new(r"^(?P<count>\d+(?:\.\d+)?)\s*(?:/|per\s)\s*(?P<period>.+)$")
            .expect("valid rate regex");
}

const OFF_WORDS: &[&str] = &["off", "none", "disabled", "no", "false"];

fn unit_seconds(unit: &str) -> Option<f64> {
    let secs = match unit {
        "" | "s" | "sec" | "secs" | "second" | "seconds" => 1.0,
        "m" | "min" | "mins" | "minute" | "minutes" => 60.0,
        "h" | "hr" | "hrs" | "hour" | "hours" => 3600.0,
        "d" | "day" | "days" => 86_400.0,
        "w" | "week" | "weeks" => 604_800.0,
        _ => return None,
    };
    Some(secs)
}

fn seconds(secs: f64, source: &str) -> Result<Duration> {
    if !secs.is_finite() || secs < 0.0 {
        bail!("invalid duration {:?}", source);
    }
    Ok(Duration::from_secs_f64(secs))
}

/// `"<qty> <unit>"`, with the quantity defaulting to 1 (`"minute"`).
fn parse_quantity(text: &str) -> Result<Duration> {
    let lower = text.trim().to_lowercase();
    let Some(caps) = QUANTITY.captures(&lower) else {
        bail!("cannot parse duration {:?}", text);
    };
    let qty_text = caps.name("qty").map(|m| m.as_str());
    let unit = caps.name("unit").map(|m| m.as_str()).unwrap_or_default();
    if qty_text.is_none() && unit.is_empty() {
        bail!("empty duration");
    }
    let qty: f64 = qty_text.unwrap_or("1").parse()?;
    let Some(per_unit) = unit_seconds(unit) else {
        bail!("unknown time unit {:?} in {:?}", unit, text);
    };
    seconds(qty * per_unit, text)
}

/// Spacing implied by `"N/period"`, if `text` is a rate expression.
fn rate_spacing(text: &str) -> Result<Option<Duration>> {
    let lower = text.trim().to_lowercase();
    let Some(caps) = RATE.captures(&lower) else {
        return Ok(None);
    };
    let count: f64 = caps["count"].parse()?;
    if count <= 0.0 {
        bail!("rate count must be positive in {:?}", text);
    }
    let period = parse_quantity(&caps["period"])?;
    if period.is_zero() {
        bail!("rate period must be positive in {:?}", text);
    }
    Ok(Some(period.div_f64(count)))
}

/// Parse a duration string, e.g. `"5 seconds"` or `"2/minute"`.
pub fn parse_duration(text: &str) -> Result<Duration> {
    if let Some(spacing) = rate_spacing(text)? {
        return Ok(spacing);
    }
    parse_quantity(text)
}

/// A required, non-negative duration.
pub fn duration_value(value: &HumanValue) -> Result<Duration> {
    match value {
        HumanValue::Number(n) => seconds(*n, &n.to_string()),
        HumanValue::Text(text) => parse_duration(text),
        HumanValue::Flag(b) => bail!("expected a duration, got {}", b),
    }
}

/// A duration that can be switched off with `"off"`, `0` or `false`.
/// `true` is rejected since it names no length.
pub fn optional_duration(value: &HumanValue) -> Result<Option<Duration>> {
    let duration = match value {
        HumanValue::Flag(false) => return Ok(None),
        HumanValue::Flag(true) => bail!("`true` is not a duration"),
        HumanValue::Number(n) if *n <= 0.0 => return Ok(None),
        HumanValue::Text(text) if is_off(text) => return Ok(None),
        other => duration_value(other)?,
    };
    Ok(if duration.is_zero() { None } else { Some(duration) })
}

/// Request spacing for a rate. `None` means unthrottled (`"off"`).
pub fn rate_interval(value: &HumanValue) -> Result<Option<Duration>> {
    match value {
        HumanValue::Flag(false) => Ok(None),
        HumanValue::Flag(true) => bail!("`true` is not a rate"),
        HumanValue::Number(per_minute) => per_minute_interval(*per_minute).map(Some),
        HumanValue::Text(text) if is_off(text) => Ok(None),
        HumanValue::Text(text) => {
            if let Some(spacing) = rate_spacing(text)? {
                return Ok(Some(spacing));
            }
            match text.trim().parse::<f64>() {
                Ok(per_minute) => per_minute_interval(per_minute).map(Some),
                Err(_) => bail!("cannot parse rate {:?} (expected e.g. \"2/minute\")", text),
            }
        }
    }
}

fn per_minute_interval(per_minute: f64) -> Result<Duration> {
    if !per_minute.is_finite() || per_minute <= 0.0 {
        bail!("rate must be positive, got {}", per_minute);
    }
    Ok(Duration::from_secs_f64(60.0 / per_minute))
}

fn is_off(text: &str) -> bool {
    let lower = text.trim().to_lowercase();
    lower.is_empty() || OFF_WORDS.contains(&lower.as_str())
}
