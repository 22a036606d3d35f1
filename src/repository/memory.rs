//! Repository serving rows held in memory

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{ArchiveError, Result};
use crate::models::{Batch, DataObject, Row, Table, Value};

use super::{DEFAULT_BATCH_SIZE, DataHandler, DataRepository, ReadSummary, dispatch};

/// Table data as plain value lists, one per row in field order
#[derive(Debug, Clone)]
pub struct MemoryRepository {
    tables: Arc<HashMap<String, Vec<Vec<Value>>>>,
    batch_size: usize,
}

impl Default for MemoryRepository {
    fn default() -> Self {
        Self {
            tables: Arc::new(HashMap::new()),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Add rows for `table`, replacing earlier rows of the same table
    pub fn with_rows(mut self, table: &str, rows: Vec<Vec<Value>>) -> Self {
        Arc::make_mut(&mut self.tables).insert(table.to_uppercase(), rows);
        self
    }

    fn build_row(table: &Table, values: &[Value]) -> Result<Row> {
        if values.len() != table.fields.len() {
            return Err(ArchiveError::metadata(
                &table.name,
                format!(
                    "row has {} values but the table has {} fields",
                    values.len(),
                    table.fields.len()
                ),
            ));
        }
        Ok(table
            .fields
            .iter()
            .zip(values)
            .map(|(field, value)| DataObject::field_value(Arc::clone(field), value.clone()))
            .collect())
    }
}

impl DataRepository for MemoryRepository {
    fn name(&self) -> &str {
        "memory"
    }

    fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.keys().cloned().collect();
        names.sort();
        names
    }

    fn data_get_from_table(
        &self,
        table: &Arc<Table>,
        mut handler: Option<&mut dyn DataHandler>,
    ) -> Result<ReadSummary> {
        let mut summary = ReadSummary::default();
        let source = self
            .tables
            .get(&table.name.to_uppercase())
            .map(Vec::as_slice)
            .unwrap_or_default();

        for chunk in source.chunks(self.batch_size) {
            let first = summary.records;
            let rows = chunk
                .iter()
                .enumerate()
                .map(|(i, values)| {
                    Self::build_row(table, values).map(|row| row.with_ordinal(first + i as u64 + 1))
                })
                .collect::<Result<Vec<_>>>()?;
            summary.records += rows.len() as u64;
            summary.rows += rows.len() as u64;
            // A full final chunk is still followed by an empty end-of-data batch
            summary.blocks += 1;
            dispatch(
                &mut handler,
                Batch::new(Arc::clone(table), summary.blocks, rows, false),
            )?;
        }

        summary.blocks += 1;
        dispatch(
            &mut handler,
            Batch::new(Arc::clone(table), summary.blocks, Vec::new(), true),
        )?;
        Ok(summary)
    }

    fn clone_repository(&self) -> Box<dyn DataRepository> {
        Box::new(self.clone())
    }
}
