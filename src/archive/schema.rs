//! XSD generation and parsing for archived tables

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use quick_xml::Reader;
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};

use crate::error::{ArchiveError, Result};
use crate::models::Table;

use super::{XS_NAMESPACE, namespace, xsd_type};

/// One column of an archived table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSchema {
    /// Element name, `c1` to `cN`
    pub element: String,
    pub xsd_type: String,
    pub nillable: bool,
}

/// Schema of one archived table: a `table` root holding any number of
/// `row` elements of type `rowType`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    pub namespace: String,
    pub columns: Vec<ColumnSchema>,
}

impl TableSchema {
    pub fn from_table(table: &Table, ordinal: usize, namespace_base: &str) -> Self {
        let columns = table
            .fields
            .iter()
            .enumerate()
            .map(|(i, field)| ColumnSchema {
                element: format!("c{}", i + 1),
                xsd_type: xsd_type(field.target_type.kind).to_string(),
                nillable: field.nullable,
            })
            .collect();
        Self {
            namespace: namespace(namespace_base, ordinal),
            columns,
        }
    }

    /// Write the XSD document to `path`
    pub fn write(&self, path: &Path) -> Result<()> {
        let file = File::create(path).map_err(|e| {
            ArchiveError::repository("write_schema", format!("{}: {}", path.display(), e))
        })?;
        let mut out = BufWriter::new(file);
        self.write_to(&mut out)?;
        out.flush()?;
        Ok(())
    }

    pub fn write_to<W: Write>(&self, out: W) -> Result<()> {
        let mut writer = Writer::new_with_indent(out, b' ', 2);
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))?;
        writer.write_event(Event::Start(BytesStart::new("xs:schema").with_attributes([
            ("xmlns:xs", XS_NAMESPACE),
            ("xmlns", self.namespace.as_str()),
            ("targetNamespace", self.namespace.as_str()),
            ("elementFormDefault", "qualified"),
            ("attributeFormDefault", "unqualified"),
        ])))?;

        writer.write_event(Event::Start(
            BytesStart::new("xs:element").with_attributes([("name", "table")]),
        ))?;
        writer.write_event(Event::Start(BytesStart::new("xs:complexType")))?;
        writer.write_event(Event::Start(BytesStart::new("xs:sequence")))?;
        writer.write_event(Event::Empty(BytesStart::new("xs:element").with_attributes([
            ("name", "row"),
            ("type", "rowType"),
            ("minOccurs", "0"),
            ("maxOccurs", "unbounded"),
        ])))?;
        writer.write_event(Event::End(BytesEnd::new("xs:sequence")))?;
        writer.write_event(Event::End(BytesEnd::new("xs:complexType")))?;
        writer.write_event(Event::End(BytesEnd::new("xs:element")))?;

        writer.write_event(Event::Start(
            BytesStart::new("xs:complexType").with_attributes([("name", "rowType")]),
        ))?;
        writer.write_event(Event::Start(BytesStart::new("xs:sequence")))?;
        for column in &self.columns {
            let mut element = BytesStart::new("xs:element").with_attributes([
                ("name", column.element.as_str()),
                ("type", column.xsd_type.as_str()),
            ]);
            if column.nillable {
                element.push_attribute(("nillable", "true"));
            }
            writer.write_event(Event::Empty(element))?;
        }
        writer.write_event(Event::End(BytesEnd::new("xs:sequence")))?;
        writer.write_event(Event::End(BytesEnd::new("xs:complexType")))?;

        writer.write_event(Event::End(BytesEnd::new("xs:schema")))?;
        Ok(())
    }

    /// Parse a schema written by [`TableSchema::write`]
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| {
            ArchiveError::repository("load_schema", format!("{}: {}", path.display(), e))
        })?;
        let mut reader = Reader::from_reader(BufReader::new(file));
        reader.config_mut().trim_text(true);

        let mut namespace = None;
        let mut columns = Vec::new();
        let mut in_row_type = false;
        let mut buf = Vec::new();

        loop {
            match reader.read_event_into(&mut buf)? {
                Event::Start(e) | Event::Empty(e) => match e.local_name().as_ref() {
                    b"schema" => namespace = attribute(&e, b"targetNamespace"),
                    b"complexType" => {
                        in_row_type = attribute(&e, b"name").as_deref() == Some("rowType");
                    }
                    b"element" if in_row_type => {
                        let element = attribute(&e, b"name").ok_or_else(|| {
                            ArchiveError::repository("load_schema", "column element without name")
                        })?;
                        columns.push(ColumnSchema {
                            element,
                            xsd_type: attribute(&e, b"type").unwrap_or_default(),
                            nillable: attribute(&e, b"nillable").as_deref() == Some("true"),
                        });
                    }
                    _ => {}
                },
                Event::End(e) if e.local_name().as_ref() == b"complexType" => in_row_type = false,
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }

        let namespace = namespace.ok_or_else(|| {
            ArchiveError::repository(
                "load_schema",
                format!("{} has no target namespace", path.display()),
            )
        })?;
        Ok(Self { namespace, columns })
    }
}

pub(crate) fn attribute(element: &BytesStart<'_>, name: &[u8]) -> Option<String> {
    element
        .attributes()
        .flatten()
        .find(|a| a.key.local_name().as_ref() == name)
        .map(|a| String::from_utf8_lossy(&a.value).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DataType, Field, FieldType};
    use tempfile::TempDir;

    fn table() -> Table {
        Table::new(
            "SAG",
            vec![
                Field::new("SAG", "ID", FieldType::new(DataType::Int), 4),
                Field::new("SAG", "TXT", FieldType::nullable(DataType::String), 10),
                Field::new("SAG", "DATO", FieldType::nullable(DataType::DateTime), 8),
            ],
        )
    }

    #[test]
    fn test_columns_follow_fields() {
        let schema = TableSchema::from_table(&table(), 1, "www.sa.dk/xmlns/siard/1.0");
        assert_eq!(schema.columns.len(), 3);
        assert_eq!(schema.columns[0].element, "c1");
        assert_eq!(schema.columns[0].xsd_type, "xs:int");
        assert!(!schema.columns[0].nillable);
        assert!(schema.columns[2].nillable);
        assert_eq!(schema.columns[2].xsd_type, "xs:dateTime");
    }

    #[test]
    fn test_write_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("table1.xsd");
        let schema = TableSchema::from_table(&table(), 1, "example.org/archive");
        schema.write(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains(r#"targetNamespace="http://example.org/archive/schema0/table1.xsd""#));
        assert!(text.contains(r#"maxOccurs="unbounded""#));

        assert_eq!(TableSchema::load(&path).unwrap(), schema);
    }
}
