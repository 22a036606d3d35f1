//! Re-reads archived table XML against its generated XSD

use std::fs::{self, File};
use std::io::BufReader;
use std::path::Path;

use once_cell::sync::Lazy;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use regex::Regex;

use crate::error::{ArchiveError, Result};

use super::schema::{ColumnSchema, TableSchema, attribute};
use super::ArchiveLayout;

static INTEGER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[+-]?\d+$").unwrap());
static DECIMAL: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[+-]?(\d+(\.\d*)?|\.\d+)$").unwrap());
static DATE_TIME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^-?\d{4,}-(0[1-9]|1[0-2])-\d{2}T\d{2}:[0-5]\d:[0-5]\d(\.\d+)?(Z|[+-]\d{2}:\d{2})?$")
        .unwrap()
});
static TIME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{2,}:[0-5]\d:[0-5]\d(\.\d+)?$").unwrap());

/// One archived row as lexical text, `None` for nil
pub type LexicalRow = Vec<Option<String>>;

/// Streams a table XML file, checking it against a [`TableSchema`]:
/// root element and namespace, column order, nil usage and lexical forms.
pub struct TableArchiveReader {
    schema: TableSchema,
}

impl TableArchiveReader {
    /// Load the schema from the table's XSD file
    pub fn open(xsd: &Path) -> Result<Self> {
        Ok(Self::from_schema(TableSchema::load(xsd)?))
    }

    pub fn from_schema(schema: TableSchema) -> Self {
        Self { schema }
    }

    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    /// Read every row into memory
    pub fn read_rows(&self, xml: &Path) -> Result<Vec<LexicalRow>> {
        let mut rows = Vec::new();
        self.for_each_row(xml, |row| {
            rows.push(row);
            Ok(())
        })?;
        Ok(rows)
    }

    /// Check the whole file, returning the number of rows
    pub fn verify(&self, xml: &Path) -> Result<u64> {
        self.for_each_row(xml, |_| Ok(()))
    }

    pub fn for_each_row<F>(&self, xml: &Path, mut on_row: F) -> Result<u64>
    where
        F: FnMut(LexicalRow) -> Result<()>,
    {
        let file = File::open(xml).map_err(|e| {
            ArchiveError::repository("read_table_xml", format!("{}: {}", xml.display(), e))
        })?;
        let mut reader = Reader::from_reader(BufReader::new(file));
        let mut buf = Vec::new();

        let mut seen_root = false;
        let mut row: Option<LexicalRow> = None;
        let mut text: Option<String> = None;
        let mut count = 0u64;

        loop {
            let event = reader.read_event_into(&mut buf).map_err(|e| {
                ArchiveError::repository(
                    "read_table_xml",
                    format!("{} at byte {}: {}", xml.display(), reader.buffer_position(), e),
                )
            })?;
            match event {
                Event::Start(e) if !seen_root => {
                    self.check_root(&e)?;
                    seen_root = true;
                }
                Event::Start(e) if row.is_none() => {
                    expect_name(&e, "row")?;
                    row = Some(Vec::with_capacity(self.schema.columns.len()));
                }
                Event::Empty(e) if row.is_none() && seen_root => {
                    expect_name(&e, "row")?;
                    count += 1;
                    self.finish_row(count, &[])?;
                    on_row(Vec::new())?;
                }
                Event::Start(e) => {
                    let values = row.as_ref().map(Vec::len).unwrap_or_default();
                    self.column(values, &e)?;
                    text = Some(String::new());
                }
                Event::Empty(e) => {
                    let Some(values) = row.as_mut() else {
                        return Err(invalid(format!("unexpected element {}", name_of(&e))));
                    };
                    let column = self.column(values.len(), &e)?;
                    let nil = attribute(&e, b"nil").is_some_and(|v| v == "true" || v == "1");
                    if nil {
                        if !column.nillable {
                            return Err(invalid(format!(
                                "column {} is not nillable",
                                column.element
                            )));
                        }
                        values.push(None);
                    } else {
                        check_lexical(column, "")?;
                        values.push(Some(String::new()));
                    }
                }
                Event::Text(t) => {
                    let content = t.unescape()?;
                    match text.as_mut() {
                        Some(text) => text.push_str(&content),
                        None if content.trim().is_empty() => {}
                        None => return Err(invalid(format!("unexpected text '{}'", content.trim()))),
                    }
                }
                Event::CData(c) => match text.as_mut() {
                    Some(text) => text.push_str(&String::from_utf8_lossy(&c)),
                    None => return Err(invalid("unexpected CDATA section")),
                },
                Event::End(e) => {
                    if let Some(value) = text.take() {
                        let values = row
                            .as_mut()
                            .ok_or_else(|| invalid("column outside of row"))?;
                        let column = &self.schema.columns[values.len()];
                        check_lexical(column, &value)?;
                        values.push(Some(value));
                    } else if e.local_name().as_ref() == b"row" {
                        count += 1;
                        let values = row.take().unwrap_or_default();
                        self.finish_row(count, &values)?;
                        on_row(values)?;
                    }
                }
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }

        if !seen_root {
            return Err(invalid(format!("{} has no root element", xml.display())));
        }
        Ok(count)
    }

    fn check_root(&self, e: &BytesStart<'_>) -> Result<()> {
        expect_name(e, "table")?;
        let namespace = e
            .attributes()
            .flatten()
            .find(|a| a.key.as_ref() == b"xmlns")
            .map(|a| String::from_utf8_lossy(&a.value).into_owned());
        if namespace.as_deref() != Some(self.schema.namespace.as_str()) {
            return Err(invalid(format!(
                "root namespace {:?} does not match {}",
                namespace, self.schema.namespace
            )));
        }
        Ok(())
    }

    fn column(&self, index: usize, e: &BytesStart<'_>) -> Result<&ColumnSchema> {
        let column = self.schema.columns.get(index).ok_or_else(|| {
            invalid(format!("unexpected element {} after last column", name_of(e)))
        })?;
        expect_name(e, &column.element)?;
        Ok(column)
    }

    fn finish_row(&self, ordinal: u64, values: &[Option<String>]) -> Result<()> {
        if values.len() != self.schema.columns.len() {
            return Err(invalid(format!(
                "row {} has {} columns, expected {}",
                ordinal,
                values.len(),
                self.schema.columns.len()
            )));
        }
        Ok(())
    }
}

/// Verify every table of an archive package, returning folder and row
/// count per table in ordinal order
pub fn verify_archive(root: &Path) -> Result<Vec<(String, u64)>> {
    let layout = ArchiveLayout::new(root);
    let schema_dir = layout.schema_dir();
    if !schema_dir.is_dir() {
        return Err(ArchiveError::PathNotFound(schema_dir));
    }

    let mut ordinals: Vec<usize> = fs::read_dir(&schema_dir)?
        .flatten()
        .filter_map(|entry| {
            entry
                .file_name()
                .to_string_lossy()
                .strip_prefix("table")
                .and_then(|n| n.parse().ok())
        })
        .collect();
    ordinals.sort_unstable();

    let mut verified = Vec::with_capacity(ordinals.len());
    for ordinal in ordinals {
        let reader = TableArchiveReader::open(&layout.table_xsd(ordinal))?;
        let rows = reader.verify(&layout.table_xml(ordinal))?;
        tracing::info!(folder = %ArchiveLayout::table_folder(ordinal), rows, "Table verified");
        verified.push((ArchiveLayout::table_folder(ordinal), rows));
    }
    Ok(verified)
}

fn check_lexical(column: &ColumnSchema, value: &str) -> Result<()> {
    let valid = match column.xsd_type.as_str() {
        "xs:int" => INTEGER.is_match(value) && value.parse::<i32>().is_ok(),
        "xs:long" => INTEGER.is_match(value) && value.parse::<i64>().is_ok(),
        "xs:decimal" => DECIMAL.is_match(value),
        "xs:double" => {
            matches!(value, "INF" | "-INF" | "NaN")
                || (value.bytes().all(|b| b.is_ascii_digit() || b"+-.eE".contains(&b))
                    && value.parse::<f64>().is_ok())
        }
        "xs:boolean" => matches!(value, "true" | "false" | "1" | "0"),
        "xs:dateTime" => DATE_TIME.is_match(value),
        "xs:time" => TIME.is_match(value),
        _ => true,
    };
    if valid {
        Ok(())
    } else {
        Err(invalid(format!(
            "'{}' is not a valid {} in column {}",
            value, column.xsd_type, column.element
        )))
    }
}

fn expect_name(e: &BytesStart<'_>, expected: &str) -> Result<()> {
    if e.local_name().as_ref() == expected.as_bytes() {
        Ok(())
    } else {
        Err(invalid(format!(
            "expected element {}, found {}",
            expected,
            name_of(e)
        )))
    }
}

fn name_of(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.local_name().as_ref()).into_owned()
}

fn invalid(message: impl Into<String>) -> ArchiveError {
    ArchiveError::repository("validate_table_xml", message)
}
