//! Package header describing the archived tables

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use serde::Serialize;

use crate::error::{ArchiveError, Result};
use crate::models::Table;

use super::ArchiveLayout;
use super::xsd_type;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnEntry {
    pub name: String,
    pub column_id: String,
    pub xsd_type: String,
    pub nullable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ForeignKeyEntry {
    pub name: String,
    pub references: String,
    pub columns: Vec<String>,
}

/// One table of the package
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableIndexEntry {
    pub name: String,
    pub folder: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub columns: Vec<ColumnEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary_key: Option<(String, Vec<String>)>,
    pub foreign_keys: Vec<ForeignKeyEntry>,
    pub documents: Vec<String>,
    pub rows: u64,
}

impl TableIndexEntry {
    pub fn from_table(table: &Table, ordinal: usize, rows: u64) -> Self {
        let columns = table
            .fields
            .iter()
            .enumerate()
            .map(|(i, field)| ColumnEntry {
                name: field.target_name.clone(),
                column_id: format!("c{}", i + 1),
                xsd_type: xsd_type(field.target_type.kind).to_string(),
                nullable: field.nullable,
                description: field.description.clone(),
            })
            .collect();
        let target_names = |names: Vec<&str>| -> Vec<String> {
            names
                .into_iter()
                .map(|n| {
                    table
                        .field(n)
                        .map(|f| f.target_name.clone())
                        .unwrap_or_else(|| n.to_string())
                })
                .collect()
        };
        Self {
            name: table.target_name.clone(),
            folder: ArchiveLayout::table_folder(ordinal),
            description: table.description.clone(),
            columns,
            primary_key: table
                .primary_key()
                .map(|k| (k.name.clone(), target_names(k.field_names()))),
            foreign_keys: table
                .foreign_keys
                .iter()
                .map(|fk| ForeignKeyEntry {
                    name: fk.name.clone(),
                    references: fk.referenced_table.clone(),
                    columns: fk
                        .components
                        .iter()
                        .map(|c| c.field.target_name.clone())
                        .collect(),
                })
                .collect(),
            documents: table
                .documents
                .iter()
                .map(|d| d.name.clone())
                .collect(),
            rows,
        }
    }
}

/// Contents of `header/tableIndex.xml`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableIndex {
    pub package_id: String,
    pub database_name: String,
    pub tables: Vec<TableIndexEntry>,
}

impl TableIndex {
    pub fn new(package_id: impl Into<String>, database_name: impl Into<String>) -> Self {
        Self {
            package_id: package_id.into(),
            database_name: database_name.into(),
            tables: Vec::new(),
        }
    }

    /// Add a table, keeping entries ordered by folder ordinal
    pub fn push(&mut self, entry: TableIndexEntry) {
        self.tables.push(entry);
        self.tables
            .sort_by_key(|t| t.folder.trim_start_matches("table").parse::<usize>().unwrap_or(0));
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let file = File::create(path).map_err(|e| {
            ArchiveError::repository("write_table_index", format!("{}: {}", path.display(), e))
        })?;
        let mut w = Writer::new_with_indent(BufWriter::new(file), b' ', 2);
        w.write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))?;
        w.write_event(Event::Start(BytesStart::new("siardDiark")))?;
        text(&mut w, "archiveIndex", &self.package_id)?;
        text(&mut w, "dbName", &self.database_name)?;
        w.write_event(Event::Start(BytesStart::new("tables")))?;

        for table in &self.tables {
            w.write_event(Event::Start(BytesStart::new("table")))?;
            text(&mut w, "name", &table.name)?;
            text(&mut w, "folder", &table.folder)?;
            if let Some(description) = &table.description {
                text(&mut w, "description", description)?;
            }

            w.write_event(Event::Start(BytesStart::new("columns")))?;
            for column in &table.columns {
                w.write_event(Event::Start(BytesStart::new("column")))?;
                text(&mut w, "name", &column.name)?;
                text(&mut w, "columnID", &column.column_id)?;
                text(&mut w, "type", &column.xsd_type)?;
                text(&mut w, "nullable", if column.nullable { "true" } else { "false" })?;
                if let Some(description) = &column.description {
                    text(&mut w, "description", description)?;
                }
                w.write_event(Event::End(BytesEnd::new("column")))?;
            }
            w.write_event(Event::End(BytesEnd::new("columns")))?;

            if let Some((name, columns)) = &table.primary_key {
                w.write_event(Event::Start(BytesStart::new("primaryKey")))?;
                text(&mut w, "name", name)?;
                for column in columns {
                    text(&mut w, "column", column)?;
                }
                w.write_event(Event::End(BytesEnd::new("primaryKey")))?;
            }

            if !table.foreign_keys.is_empty() {
                w.write_event(Event::Start(BytesStart::new("foreignKeys")))?;
                for fk in &table.foreign_keys {
                    w.write_event(Event::Start(BytesStart::new("foreignKey")))?;
                    text(&mut w, "name", &fk.name)?;
                    text(&mut w, "referencedTable", &fk.references)?;
                    for column in &fk.columns {
                        text(&mut w, "column", column)?;
                    }
                    w.write_event(Event::End(BytesEnd::new("foreignKey")))?;
                }
                w.write_event(Event::End(BytesEnd::new("foreignKeys")))?;
            }

            for document in &table.documents {
                text(&mut w, "document", document)?;
            }
            text(&mut w, "rows", &table.rows.to_string())?;
            w.write_event(Event::End(BytesEnd::new("table")))?;
        }

        w.write_event(Event::End(BytesEnd::new("tables")))?;
        w.write_event(Event::End(BytesEnd::new("siardDiark")))?;
        w.into_inner().flush()?;
        Ok(())
    }
}

fn text<W: Write>(w: &mut Writer<W>, name: &str, value: &str) -> Result<()> {
    w.write_event(Event::Start(BytesStart::new(name)))?;
    w.write_event(Event::Text(BytesText::new(value)))?;
    w.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}
