//! Semantic types and typed values carried by fields

use std::fmt;
use std::str::FromStr;

use chrono::{Duration, NaiveDateTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Layout used for the invariant text form of date-time values
pub const DATE_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Semantic type of a field value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    String,
    Int,
    Long,
    Decimal,
    Double,
    Bool,
    DateTime,
    TimeSpan,
}

impl DataType {
    /// Whether blank text parses to zero for this type
    pub fn is_numeric(self) -> bool {
        matches!(
            self,
            DataType::Int | DataType::Long | DataType::Decimal | DataType::Double
        )
    }

    /// Zero value for numeric types
    pub fn zero(self) -> Option<Value> {
        match self {
            DataType::Int => Some(Value::Int(0)),
            DataType::Long => Some(Value::Long(0)),
            DataType::Decimal => Some(Value::Decimal(Decimal::ZERO)),
            DataType::Double => Some(Value::Double(0.0)),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            DataType::String => "string",
            DataType::Int => "int",
            DataType::Long => "long",
            DataType::Decimal => "decimal",
            DataType::Double => "double",
            DataType::Bool => "bool",
            DataType::DateTime => "datetime",
            DataType::TimeSpan => "timespan",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DataType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "string" | "text" => Ok(DataType::String),
            "int" | "integer" | "int32" => Ok(DataType::Int),
            "long" | "int64" | "bigint" => Ok(DataType::Long),
            "decimal" | "numeric" => Ok(DataType::Decimal),
            "double" | "float" => Ok(DataType::Double),
            "bool" | "boolean" => Ok(DataType::Bool),
            "datetime" | "date-time" | "timestamp" => Ok(DataType::DateTime),
            "timespan" | "time-span" | "time" => Ok(DataType::TimeSpan),
            other => Err(format!("Unknown data type: {}", other)),
        }
    }
}

/// A data type plus nullability, written `int` or `int?` in metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FieldType {
    pub kind: DataType,
    pub nullable: bool,
}

impl FieldType {
    pub fn new(kind: DataType) -> Self {
        Self {
            kind,
            nullable: false,
        }
    }

    pub fn nullable(kind: DataType) -> Self {
        Self {
            kind,
            nullable: true,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.nullable {
            write!(f, "{}?", self.kind)
        } else {
            write!(f, "{}", self.kind)
        }
    }
}

impl FromStr for FieldType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s.strip_suffix('?') {
            Some(inner) => Ok(FieldType::nullable(inner.parse()?)),
            None => Ok(FieldType::new(s.parse()?)),
        }
    }
}

impl Serialize for FieldType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for FieldType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// A typed field value.
///
/// The variant set is closed; conversions dispatch on it with `match`.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    String(String),
    Int(i32),
    Long(i64),
    Decimal(Decimal),
    Double(f64),
    Bool(bool),
    DateTime(NaiveDateTime),
    TimeSpan(Duration),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// True for null and for strings that are blank after trimming
    pub fn is_empty(&self) -> bool {
        match self {
            Value::Null => true,
            Value::String(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// Semantic type of this value, `None` for null
    pub fn data_type(&self) -> Option<DataType> {
        match self {
            Value::Null => None,
            Value::String(_) => Some(DataType::String),
            Value::Int(_) => Some(DataType::Int),
            Value::Long(_) => Some(DataType::Long),
            Value::Decimal(_) => Some(DataType::Decimal),
            Value::Double(_) => Some(DataType::Double),
            Value::Bool(_) => Some(DataType::Bool),
            Value::DateTime(_) => Some(DataType::DateTime),
            Value::TimeSpan(_) => Some(DataType::TimeSpan),
        }
    }

    /// Locale-invariant text form, `None` for null
    pub fn to_invariant_string(&self) -> Option<String> {
        match self {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            Value::Int(v) => Some(v.to_string()),
            Value::Long(v) => Some(v.to_string()),
            Value::Decimal(v) => Some(v.to_string()),
            Value::Double(v) => Some(v.to_string()),
            Value::Bool(v) => Some(v.to_string()),
            Value::DateTime(v) => Some(v.format(DATE_TIME_FORMAT).to_string()),
            Value::TimeSpan(v) => Some(format_time_span(v, true)),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_invariant_string() {
            Some(s) => f.write_str(&s),
            None => Ok(()),
        }
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Long(v)
    }
}

impl From<Decimal> for Value {
    fn from(v: Decimal) -> Self {
        Value::Decimal(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Value::DateTime(v)
    }
}

impl From<Duration> for Value {
    fn from(v: Duration) -> Self {
        Value::TimeSpan(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// Format a time span as `hh:mm:ss`, hours not wrapped at 24.
///
/// With `with_fraction`, a non-zero sub-second part is appended with
/// trailing zeros removed.
pub fn format_time_span(span: &Duration, with_fraction: bool) -> String {
    let negative = *span < Duration::zero();
    let span = if negative { -*span } else { *span };
    let total_seconds = span.num_seconds();
    let millis = span.num_milliseconds() - total_seconds * 1000;
    let mut out = format!(
        "{}{:02}:{:02}:{:02}",
        if negative { "-" } else { "" },
        total_seconds / 3600,
        (total_seconds % 3600) / 60,
        total_seconds % 60
    );
    if with_fraction && millis != 0 {
        let fraction = format!("{:03}", millis);
        out.push('.');
        out.push_str(fraction.trim_end_matches('0'));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_field_type_parse() {
        assert_eq!(
            "int?".parse::<FieldType>().unwrap(),
            FieldType::nullable(DataType::Int)
        );
        assert_eq!(
            "DateTime".parse::<FieldType>().unwrap(),
            FieldType::new(DataType::DateTime)
        );
        assert!("blob".parse::<FieldType>().is_err());
        assert_eq!(FieldType::nullable(DataType::Decimal).to_string(), "decimal?");
    }

    #[test]
    fn test_invariant_strings() {
        let dt = NaiveDate::from_ymd_opt(2001, 2, 3)
            .unwrap()
            .and_hms_opt(4, 5, 6)
            .unwrap();
        assert_eq!(
            Value::DateTime(dt).to_invariant_string().unwrap(),
            "2001-02-03T04:05:06"
        );
        assert_eq!(Value::Bool(true).to_invariant_string().unwrap(), "true");
        assert_eq!(Value::Null.to_invariant_string(), None);
        assert_eq!(
            Value::Decimal("12.50".parse().unwrap()).to_string(),
            "12.50"
        );
    }

    #[test]
    fn test_format_time_span() {
        let span = Duration::seconds(3 * 3600 + 4 * 60 + 5) + Duration::milliseconds(500);
        assert_eq!(format_time_span(&span, true), "03:04:05.5");
        assert_eq!(format_time_span(&span, false), "03:04:05");
        assert_eq!(format_time_span(&Duration::hours(30), false), "30:00:00");
    }

    #[test]
    fn test_empty_values() {
        assert!(Value::Null.is_empty());
        assert!(Value::from("   ").is_empty());
        assert!(!Value::Int(0).is_empty());
    }
}
