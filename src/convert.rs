//! Type coercion between field values
//!
//! Implements the unmapped half of target-value derivation:
//! 1. same-type passthrough
//! 2. stringify into locale-invariant text for string targets
//! 3. null for nullable targets when the source is absent
//! 4. otherwise parse the source's text form, with blank text into a
//!    numeric type yielding zero

use std::str::FromStr;

use chrono::{Duration, NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use thiserror::Error;

use crate::models::{DataType, FieldType, Value};

/// A value could not be coerced into the requested type
#[derive(Error, Debug, Clone, PartialEq)]
#[error("cannot convert '{value}' to {target}: {message}")]
pub struct CoercionError {
    pub target: DataType,
    pub value: String,
    pub message: String,
}

impl CoercionError {
    fn new(target: DataType, value: &str, message: impl Into<String>) -> Self {
        Self {
            target,
            value: value.to_string(),
            message: message.into(),
        }
    }
}

/// Coerce `value` into `target`
pub fn coerce(value: &Value, target: FieldType) -> Result<Value, CoercionError> {
    if value.is_null() {
        if target.nullable || target.kind == DataType::String {
            return Ok(Value::Null);
        }
        // The text form of null is empty, which numeric parsing absorbs
        return target
            .kind
            .zero()
            .ok_or_else(|| CoercionError::new(target.kind, "", "null value for non-nullable type"));
    }

    if value.data_type() == Some(target.kind) {
        return Ok(value.clone());
    }

    let text = value.to_invariant_string().unwrap_or_default();
    if target.kind == DataType::String {
        return Ok(Value::String(text));
    }

    if text.trim().is_empty() {
        if let Some(zero) = target.kind.zero() {
            return Ok(zero);
        }
        if target.nullable {
            return Ok(Value::Null);
        }
    }

    parse_value(&text, target.kind)
}

/// Parse invariant text into a value of `kind`
pub fn parse_value(text: &str, kind: DataType) -> Result<Value, CoercionError> {
    let trimmed = text.trim();
    match kind {
        DataType::String => Ok(Value::String(text.to_string())),
        DataType::Int => i32::from_str(trimmed)
            .map(Value::Int)
            .map_err(|e| CoercionError::new(kind, text, e.to_string())),
        DataType::Long => i64::from_str(trimmed)
            .map(Value::Long)
            .map_err(|e| CoercionError::new(kind, text, e.to_string())),
        DataType::Decimal => parse_decimal(trimmed)
            .map(Value::Decimal)
            .ok_or_else(|| CoercionError::new(kind, text, "not a decimal number")),
        DataType::Double => parse_double(trimmed)
            .map(Value::Double)
            .ok_or_else(|| CoercionError::new(kind, text, "not a floating point number")),
        DataType::Bool => parse_bool(trimmed)
            .map(Value::Bool)
            .ok_or_else(|| CoercionError::new(kind, text, "not a boolean")),
        DataType::DateTime => parse_date_time(trimmed)
            .map(Value::DateTime)
            .ok_or_else(|| CoercionError::new(kind, text, "not a date-time")),
        DataType::TimeSpan => parse_time_span(trimmed)
            .map(Value::TimeSpan)
            .ok_or_else(|| CoercionError::new(kind, text, "not a time span")),
    }
}

/// Parse a decimal with invariant formatting first (`1234.5`), then with
/// comma-decimal formatting (`1.234,5`) as used by the legacy sources.
pub fn parse_decimal(text: &str) -> Option<Decimal> {
    if let Ok(d) = Decimal::from_str(text) {
        return Some(d);
    }
    Decimal::from_str(&comma_to_invariant(text)?).ok()
}

/// Same culture fallback as [`parse_decimal`] for floating point numbers
pub fn parse_double(text: &str) -> Option<f64> {
    if let Ok(v) = f64::from_str(text) {
        return Some(v);
    }
    f64::from_str(&comma_to_invariant(text)?).ok()
}

fn comma_to_invariant(text: &str) -> Option<String> {
    let last_comma = text.rfind(',')?;
    match text.rfind('.') {
        // `1,234.5`: invariant text with group separators
        Some(dot) if dot > last_comma => Some(text.replace(',', "")),
        _ => Some(text.replace('.', "").replace(',', ".")),
    }
}

pub fn parse_bool(text: &str) -> Option<bool> {
    match text.to_lowercase().as_str() {
        "true" | "1" | "yes" | "j" | "y" => Some(true),
        "false" | "0" | "no" | "n" => Some(false),
        _ => None,
    }
}

/// Parse the invariant date-time form, also accepting a space separator and
/// a bare date
pub fn parse_date_time(text: &str) -> Option<NaiveDateTime> {
    const LAYOUTS: [&str; 3] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"];
    for layout in LAYOUTS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, layout) {
            return Some(dt);
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

/// Parse `[-]h:mm:ss[.fff]`
pub fn parse_time_span(text: &str) -> Option<Duration> {
    let (negative, body) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    let (clock, fraction) = match body.split_once('.') {
        Some((c, f)) => (c, Some(f)),
        None => (body, None),
    };
    let parts: Vec<&str> = clock.split(':').collect();
    if parts.len() != 3 {
        return None;
    }
    let hours: i64 = parts[0].parse().ok()?;
    let minutes: i64 = parts[1].parse().ok()?;
    let seconds: i64 = parts[2].parse().ok()?;
    if minutes >= 60 || seconds >= 60 {
        return None;
    }
    let millis = match fraction {
        Some(f) if !f.is_empty() && f.len() <= 3 && f.chars().all(|c| c.is_ascii_digit()) => {
            format!("{:0<3}", f).parse::<i64>().ok()?
        }
        Some(_) => return None,
        None => 0,
    };
    let total = hours.checked_mul(3600)?.checked_add(minutes * 60 + seconds)?;
    let span = Duration::try_seconds(total)?.checked_add(&Duration::milliseconds(millis))?;
    Some(if negative { -span } else { span })
}
