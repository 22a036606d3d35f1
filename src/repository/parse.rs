//! Parsing of fixed-width legacy field text into typed source values
//!
//! Legacy layouts differ from the invariant text forms used elsewhere:
//! dates are packed (`yyyyMMdd` or `yyyyMMddTHHmmss`) and time spans are
//! `HHMMSSF` with the last digit counting tenths of a second.

use chrono::{Duration, NaiveDate, NaiveDateTime};

use crate::convert;
use crate::error::{ArchiveError, Result};
use crate::models::{DataType, Field, Value};

const DATE_LAYOUT: &str = "%Y%m%d";
const DATE_TIME_LAYOUT: &str = "%Y%m%dT%H%M%S";

/// Parse the raw text of `field` into a value of its source type.
///
/// A nullable field with blank text yields null. Blank text in a
/// non-nullable numeric field is a parse error; the blank-to-zero rule
/// only applies when deriving target values.
pub fn parse_field(field: &Field, raw: &str) -> Result<Value> {
    let text = raw.trim();
    let kind = field.source_type.kind;
    if field.source_type.nullable && text.is_empty() {
        return Ok(Value::Null);
    }

    let parsed = match kind {
        DataType::String => Some(Value::String(text.to_string())),
        DataType::Int => text.parse::<i32>().ok().map(Value::Int),
        DataType::Long => text.parse::<i64>().ok().map(Value::Long),
        DataType::Decimal => convert::parse_decimal(text).map(Value::Decimal),
        DataType::DateTime => parse_packed_date_time(text).map(Value::DateTime),
        DataType::TimeSpan => parse_packed_time_span(text).map(Value::TimeSpan),
        DataType::Bool | DataType::Double => {
            return Err(ArchiveError::system(format!(
                "unsupported source type {} for {}.{}",
                field.source_type, field.table, field.name
            )));
        }
    };

    parsed.ok_or_else(|| {
        ArchiveError::repository(
            "parse_field",
            format!(
                "cannot parse '{}' as {} for {}.{}",
                text, kind, field.table, field.name
            ),
        )
    })
}

/// `yyyyMMddTHHmmss` when a `T` separator is present, else `yyyyMMdd`
pub fn parse_packed_date_time(text: &str) -> Option<NaiveDateTime> {
    if text.contains('T') {
        NaiveDateTime::parse_from_str(text, DATE_TIME_LAYOUT).ok()
    } else {
        NaiveDate::parse_from_str(text, DATE_LAYOUT)
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
    }
}

/// `HHMMSSF`; the tenths digit may be omitted
pub fn parse_packed_time_span(text: &str) -> Option<Duration> {
    if !(text.len() == 6 || text.len() == 7) || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let hours: i64 = text[0..2].parse().ok()?;
    let minutes: i64 = text[2..4].parse().ok()?;
    let seconds: i64 = text[4..6].parse().ok()?;
    if minutes >= 60 || seconds >= 60 {
        return None;
    }
    let tenths: i64 = match text.get(6..7) {
        Some(digit) => digit.parse().ok()?,
        None => 0,
    };
    Some(
        Duration::seconds(hours * 3600 + minutes * 60 + seconds)
            + Duration::milliseconds(tenths * 100),
    )
}
