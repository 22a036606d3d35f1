//! Streaming XML writer for one archived table

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;

use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use serde::Serialize;

use crate::error::{ArchiveError, Result};
use crate::models::{DataType, Row, Table};

use super::file_index::FileIndex;
use super::schema::TableSchema;
use super::{ArchiveLayout, XSI_NAMESPACE, lexical_form};

/// A finished table in the package
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableArchive {
    pub table: String,
    pub ordinal: usize,
    pub folder: String,
    pub rows: u64,
    pub xsd: PathBuf,
    pub xml: PathBuf,
}

/// Writes the rows of one table to `table<N>.xml`.
///
/// The XSD is written and both files are registered in the file index by
/// [`TableWriter::finish`]; a writer dropped before that leaves a partial
/// XML file behind, which [`TableWriter::discard`] removes.
pub struct TableWriter {
    table: Arc<Table>,
    ordinal: usize,
    schema: TableSchema,
    xsd_path: PathBuf,
    xml_path: PathBuf,
    writer: Writer<BufWriter<File>>,
    rows: u64,
    file_index: Arc<FileIndex>,
}

impl TableWriter {
    pub fn create(
        layout: &ArchiveLayout,
        table: Arc<Table>,
        ordinal: usize,
        namespace_base: &str,
        file_index: Arc<FileIndex>,
    ) -> Result<Self> {
        let dir = layout.table_dir(ordinal);
        fs::create_dir_all(&dir).map_err(|e| {
            ArchiveError::repository("create_table_dir", format!("{}: {}", dir.display(), e))
        })?;

        let schema = TableSchema::from_table(&table, ordinal, namespace_base);
        let xml_path = layout.table_xml(ordinal);
        let file = File::create(&xml_path).map_err(|e| {
            ArchiveError::repository("create_table_xml", format!("{}: {}", xml_path.display(), e))
        })?;

        let mut writer = Writer::new_with_indent(BufWriter::new(file), b' ', 2);
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))?;
        let schema_location = format!("{} table{}.xsd", schema.namespace, ordinal);
        writer.write_event(Event::Start(BytesStart::new("table").with_attributes([
            ("xmlns", schema.namespace.as_str()),
            ("xmlns:xsi", XSI_NAMESPACE),
            ("xsi:schemaLocation", schema_location.as_str()),
        ])))?;

        tracing::debug!(table = %table.name, ordinal, path = %xml_path.display(), "Opened table writer");
        Ok(Self {
            table,
            ordinal,
            schema,
            xsd_path: layout.table_xsd(ordinal),
            xml_path,
            writer,
            rows: 0,
            file_index,
        })
    }

    pub fn rows(&self) -> u64 {
        self.rows
    }

    pub fn write_batch(&mut self, rows: &[Row]) -> Result<()> {
        for row in rows {
            self.write_row(row)?;
        }
        Ok(())
    }

    /// Write one `row` element with one child per column
    pub fn write_row(&mut self, row: &Row) -> Result<()> {
        if row.len() != self.schema.columns.len() {
            return Err(ArchiveError::system(format!(
                "row {} of table {} has {} values, expected {}",
                row.ordinal(),
                self.table.name,
                row.len(),
                self.schema.columns.len()
            )));
        }

        self.writer
            .write_event(Event::Start(BytesStart::new("row")))?;
        for (data, column) in row.iter().zip(&self.schema.columns) {
            let field = data.field();
            let value = data.target_value()?;
            match lexical_form(&value, field)? {
                Some(text) => write_text(&mut self.writer, &column.element, &text)?,
                None if column.nillable => {
                    self.writer.write_event(Event::Empty(
                        BytesStart::new(column.element.as_str())
                            .with_attributes([("xsi:nil", "true")]),
                    ))?;
                }
                None if field.target_type.kind == DataType::String => {
                    write_text(&mut self.writer, &column.element, "")?
                }
                None => {
                    return Err(ArchiveError::repository(
                        "write_row",
                        format!(
                            "null value in non-nillable column {}.{} (row {})",
                            self.table.name,
                            field.target_name,
                            row.ordinal()
                        ),
                    ));
                }
            }
        }
        self.writer.write_event(Event::End(BytesEnd::new("row")))?;
        self.rows += 1;
        Ok(())
    }

    /// Close the XML document, write the XSD and register both files
    pub fn finish(mut self) -> Result<TableArchive> {
        self.writer.write_event(Event::End(BytesEnd::new("table")))?;
        let mut out = self.writer.into_inner();
        out.flush()
            .map_err(|e| ArchiveError::repository("finish_table", e.to_string()))?;
        drop(out);

        self.schema.write(&self.xsd_path)?;
        self.file_index.register(&self.xsd_path)?;
        self.file_index.register(&self.xml_path)?;

        tracing::info!(
            table = %self.table.name,
            ordinal = self.ordinal,
            rows = self.rows,
            "Table archived"
        );
        Ok(TableArchive {
            table: self.table.name.clone(),
            ordinal: self.ordinal,
            folder: ArchiveLayout::table_folder(self.ordinal),
            rows: self.rows,
            xsd: self.xsd_path,
            xml: self.xml_path,
        })
    }

    /// Drop the partial output of this table
    pub fn discard(self) -> Result<()> {
        let Self {
            writer, xml_path, ..
        } = self;
        drop(writer);
        if let Some(dir) = xml_path.parent()
            && dir.exists()
        {
            fs::remove_dir_all(dir)?;
        }
        Ok(())
    }
}

fn write_text<W: Write>(writer: &mut Writer<W>, element: &str, text: &str) -> Result<()> {
    if text.is_empty() {
        writer.write_event(Event::Empty(BytesStart::new(element)))?;
        return Ok(());
    }
    writer.write_event(Event::Start(BytesStart::new(element)))?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    writer.write_event(Event::End(BytesEnd::new(element)))?;
    Ok(())
}
