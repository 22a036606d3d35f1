//! Streaming unit passed from a repository to its handler

use std::sync::Arc;

use super::data::Row;
use super::table::Table;

/// A bounded, ordered group of rows of one table
///
/// Block numbers increase monotonically per table, starting at 1. The batch
/// with `end_of_data` set is always the last one delivered for its table and
/// may be empty.
#[derive(Debug, Clone)]
pub struct Batch {
    pub table: Arc<Table>,
    pub block: u64,
    pub rows: Vec<Row>,
    pub end_of_data: bool,
}

impl Batch {
    pub fn new(table: Arc<Table>, block: u64, rows: Vec<Row>, end_of_data: bool) -> Self {
        Self {
            table,
            block,
            rows,
            end_of_data,
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
