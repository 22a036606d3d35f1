//! Fixed-width legacy record reader

use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use std::sync::Arc;

use crate::error::{ArchiveError, Result};
use crate::models::{Batch, DataObject, DocumentData, FieldData, FilterScope, Row, Table, Value};

use super::filemap::{FileMap, latin1};
use super::parse::parse_field;
use super::{DEFAULT_BATCH_SIZE, DataHandler, DataRepository, ReadSummary, dispatch};

/// End-of-file marker some legacy writers append
const SUBSTITUTE: u8 = 0x1A;

/// Reads records of a fixed byte length, skipping line breaks between them
pub struct RecordReader<R> {
    inner: R,
    record_length: usize,
}

impl<R: BufRead> RecordReader<R> {
    pub fn new(inner: R, record_length: usize) -> Self {
        Self {
            inner,
            record_length,
        }
    }

    /// Next full record, `None` at end of input.
    ///
    /// A trailing partial record is an error unless it is only padding.
    pub fn next_record(&mut self) -> Result<Option<Vec<u8>>> {
        loop {
            let buf = self.inner.fill_buf()?;
            if buf.is_empty() {
                return Ok(None);
            }
            let line_breaks = buf
                .iter()
                .take_while(|b| matches!(b, b'\r' | b'\n'))
                .count();
            if line_breaks == 0 {
                break;
            }
            self.inner.consume(line_breaks);
        }

        let mut record = Vec::with_capacity(self.record_length);
        (&mut self.inner)
            .take(self.record_length as u64)
            .read_to_end(&mut record)?;

        if record.len() < self.record_length {
            if record
                .iter()
                .all(|b| b.is_ascii_whitespace() || *b == SUBSTITUTE)
            {
                return Ok(None);
            }
            return Err(ArchiveError::repository(
                "read_record",
                format!(
                    "truncated record: expected {} bytes, found {}",
                    self.record_length,
                    record.len()
                ),
            ));
        }
        Ok(Some(record))
    }
}

/// Repository over a directory of legacy table files
///
/// The file map is built once in [`LegacyRepository::open`] and shared by
/// every clone.
#[derive(Debug, Clone)]
pub struct LegacyRepository {
    file_map: Arc<FileMap>,
    batch_size: usize,
}

impl LegacyRepository {
    /// Index the legacy archive below `root`
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::from_file_map(FileMap::scan(root.as_ref())?))
    }

    pub fn from_file_map(file_map: FileMap) -> Self {
        Self {
            file_map: Arc::new(file_map),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn file_map(&self) -> &FileMap {
        &self.file_map
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Decode one record into a row; `None` when a record filter drops it
    fn read_row(&self, table: &Table, record: &[u8], data_dir: &Path) -> Result<Option<Row>> {
        let mut values = Vec::with_capacity(table.fields.len());
        let mut offset = 0;
        for field in &table.fields {
            let end = offset + field.source_length;
            let raw = latin1(&record[offset..end]);
            offset = end;

            let data = if field.is_document() {
                let file_name = raw.trim().to_string();
                let path = Some(data_dir.join(&file_name)).filter(|p| {
                    !file_name.is_empty() && p.is_file()
                });
                if path.is_none() && !file_name.is_empty() {
                    tracing::warn!(
                        table = %table.name,
                        field = %field.name,
                        document = %file_name,
                        "Referenced document not found"
                    );
                }
                DataObject::Document(DocumentData::new(Arc::clone(field), file_name, path))
            } else {
                DataObject::Field(FieldData::new(Arc::clone(field), parse_field(field, &raw)?))
            };
            values.push(data);
        }

        for filter in table.filters.iter().filter(|f| f.scope == FilterScope::Record) {
            if filter.matches(&values[filter.field.position]) {
                return Ok(None);
            }
        }
        for filter in table.filters.iter().filter(|f| f.scope == FilterScope::Field) {
            let position = filter.field.position;
            if filter.matches(&values[position]) {
                values[position] =
                    DataObject::Field(FieldData::new(Arc::clone(&filter.field), Value::Null));
            }
        }
        Ok(Some(Row::new(values)))
    }
}

impl DataRepository for LegacyRepository {
    fn name(&self) -> &str {
        "legacy"
    }

    fn table_names(&self) -> Vec<String> {
        self.file_map.table_names().map(str::to_string).collect()
    }

    fn data_get_from_table(
        &self,
        table: &Arc<Table>,
        mut handler: Option<&mut dyn DataHandler>,
    ) -> Result<ReadSummary> {
        let record_length = table.record_length();
        if record_length == 0 {
            return Err(ArchiveError::metadata(&table.name, "table has no fields"));
        }

        let files = self.file_map.files(&table.name);
        if files.is_empty() {
            tracing::warn!(table = %table.name, "No data files for table");
        }

        let mut summary = ReadSummary::default();
        let mut rows = Vec::with_capacity(self.batch_size.min(DEFAULT_BATCH_SIZE));
        for path in files {
            tracing::debug!(table = %table.name, file = %path.display(), "Reading data file");
            let file = File::open(path).map_err(|e| {
                ArchiveError::repository("open_data_file", format!("{}: {}", path.display(), e))
            })?;
            let data_dir = path.parent().unwrap_or(self.file_map.root());
            let mut reader = RecordReader::new(BufReader::new(file), record_length);

            while let Some(record) = reader
                .next_record()
                .map_err(|e| e.with_operation("read_record"))?
            {
                summary.records += 1;
                let Some(row) = self.read_row(table, &record, data_dir)? else {
                    summary.filtered += 1;
                    continue;
                };
                rows.push(row.with_ordinal(summary.records));
                summary.rows += 1;

                if rows.len() >= self.batch_size {
                    summary.blocks += 1;
                    let batch = Batch::new(
                        Arc::clone(table),
                        summary.blocks,
                        std::mem::take(&mut rows),
                        false,
                    );
                    dispatch(&mut handler, batch)?;
                }
            }
        }

        summary.blocks += 1;
        dispatch(
            &mut handler,
            Batch::new(Arc::clone(table), summary.blocks, rows, true),
        )?;

        tracing::info!(
            table = %table.name,
            records = summary.records,
            rows = summary.rows,
            filtered = summary.filtered,
            blocks = summary.blocks,
            "Table read complete"
        );
        Ok(summary)
    }

    fn clone_repository(&self) -> Box<dyn DataRepository> {
        Box::new(self.clone())
    }
}
