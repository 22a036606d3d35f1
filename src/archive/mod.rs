//! Archive package output
//!
//! Tables are written as one XSD and one XML file each under
//! `content/schema0/table<N>/`, next to the package header files
//! `header/tableIndex.xml` and `header/fileIndex.xml`.

pub mod file_index;
pub mod reader;
pub mod schema;
pub mod table_index;
pub mod writer;

pub use file_index::{FileEntry, FileIndex};
pub use reader::{TableArchiveReader, verify_archive};
pub use schema::{ColumnSchema, TableSchema};
pub use table_index::{TableIndex, TableIndexEntry};
pub use writer::{TableArchive, TableWriter};

use std::path::{Path, PathBuf};

use rust_decimal::RoundingStrategy;

use crate::error::{ArchiveError, Result};
use crate::models::{DATE_TIME_FORMAT, DataType, Field, Value, format_time_span};

/// Namespace of the XML Schema language
pub const XS_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema";
/// Namespace of the XML Schema instance attributes (`xsi:nil`)
pub const XSI_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema-instance";

const SCHEMA_FOLDER: &str = "schema0";

/// Target namespace of table `ordinal`
pub fn namespace(base: &str, ordinal: usize) -> String {
    format!(
        "http://{}/{}/table{}.xsd",
        base.trim_end_matches('/'),
        SCHEMA_FOLDER,
        ordinal
    )
}

/// Paths inside an archive package
#[derive(Debug, Clone)]
pub struct ArchiveLayout {
    root: PathBuf,
}

impl ArchiveLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn schema_dir(&self) -> PathBuf {
        self.root.join("content").join(SCHEMA_FOLDER)
    }

    pub fn table_folder(ordinal: usize) -> String {
        format!("table{}", ordinal)
    }

    pub fn table_dir(&self, ordinal: usize) -> PathBuf {
        self.schema_dir().join(Self::table_folder(ordinal))
    }

    pub fn table_xsd(&self, ordinal: usize) -> PathBuf {
        self.table_dir(ordinal).join(format!("table{}.xsd", ordinal))
    }

    pub fn table_xml(&self, ordinal: usize) -> PathBuf {
        self.table_dir(ordinal).join(format!("table{}.xml", ordinal))
    }

    pub fn header_dir(&self) -> PathBuf {
        self.root.join("header")
    }

    pub fn table_index(&self) -> PathBuf {
        self.header_dir().join("tableIndex.xml")
    }

    pub fn file_index(&self) -> PathBuf {
        self.header_dir().join("fileIndex.xml")
    }

    /// `/`-separated path of `path` relative to the package root
    pub fn relative(&self, path: &Path) -> String {
        let relative = path.strip_prefix(&self.root).unwrap_or(path);
        relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/")
    }
}

/// XML Schema type for a semantic type
pub fn xsd_type(kind: DataType) -> &'static str {
    match kind {
        DataType::String => "xs:string",
        DataType::Int => "xs:int",
        DataType::Long => "xs:long",
        DataType::Decimal => "xs:decimal",
        DataType::Double => "xs:double",
        DataType::Bool => "xs:boolean",
        DataType::DateTime => "xs:dateTime",
        DataType::TimeSpan => "xs:time",
    }
}

/// `xs:double` spells the special values `INF`, `-INF` and `NaN`
fn double_form(v: f64) -> String {
    if v.is_nan() {
        "NaN".to_string()
    } else if v.is_infinite() {
        if v > 0.0 { "INF" } else { "-INF" }.to_string()
    } else {
        format!("{:.2}", v)
    }
}

/// Lexical form of `value` in the column of `field`, `None` for nil
pub fn lexical_form(value: &Value, field: &Field) -> Result<Option<String>> {
    let expected = field.target_type.kind;
    if let Some(actual) = value.data_type()
        && actual != expected
    {
        return Err(ArchiveError::repository(
            "write_row",
            format!(
                "unsupported value type {} for column {}.{} declared {}",
                actual, field.table, field.target_name, expected
            ),
        ));
    }

    Ok(match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Int(v) => Some(v.to_string()),
        Value::Long(v) => Some(v.to_string()),
        Value::Decimal(v) => Some(format!(
            "{:.2}",
            v.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
        )),
        Value::Double(v) => Some(double_form(*v)),
        Value::Bool(v) => Some(v.to_string()),
        Value::DateTime(v) => Some(v.format(DATE_TIME_FORMAT).to_string()),
        Value::TimeSpan(v) => Some(format_time_span(v, false)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FieldType;
    use chrono::{Duration, NaiveDate};
    use rust_decimal::Decimal;

    fn field(kind: DataType) -> Field {
        Field::new("SAG", "F", FieldType::nullable(kind), 10)
    }

    #[test]
    fn test_namespace() {
        assert_eq!(
            namespace("www.sa.dk/xmlns/siard/1.0/", 3),
            "http://www.sa.dk/xmlns/siard/1.0/schema0/table3.xsd"
        );
    }

    #[test]
    fn test_lexical_forms() {
        let cases = [
            (Value::Int(-5), DataType::Int, "-5"),
            (Value::Decimal(Decimal::new(12345, 3)), DataType::Decimal, "12.35"),
            (Value::Decimal(Decimal::from(7)), DataType::Decimal, "7.00"),
            (Value::Double(0.5), DataType::Double, "0.50"),
            (Value::Double(f64::NEG_INFINITY), DataType::Double, "-INF"),
            (Value::Decimal(Decimal::new(-12345, 3)), DataType::Decimal, "-12.35"),
            (Value::Bool(false), DataType::Bool, "false"),
            (Value::TimeSpan(Duration::seconds(3725)), DataType::TimeSpan, "01:02:05"),
        ];
        for (value, kind, expected) in cases {
            assert_eq!(
                lexical_form(&value, &field(kind)).unwrap().as_deref(),
                Some(expected)
            );
        }
        let dt = NaiveDate::from_ymd_opt(1999, 12, 31)
            .unwrap()
            .and_hms_opt(23, 59, 0)
            .unwrap();
        assert_eq!(
            lexical_form(&Value::DateTime(dt), &field(DataType::DateTime))
                .unwrap()
                .unwrap(),
            "1999-12-31T23:59:00"
        );
        assert_eq!(lexical_form(&Value::Null, &field(DataType::Int)).unwrap(), None);
    }

    #[test]
    fn test_mismatched_value_type() {
        let err = lexical_form(&Value::from("x"), &field(DataType::Int)).unwrap_err();
        assert!(err.to_string().contains("unsupported value type string"));
    }

    #[test]
    fn test_relative_paths() {
        let layout = ArchiveLayout::new("/out");
        assert_eq!(
            layout.relative(&layout.table_xml(2)),
            "content/schema0/table2/table2.xml"
        );
    }
}
