//! Data repositories: producers of table batches
//!
//! A [`DataRepository`] streams the rows of one table at a time to a
//! [`DataHandler`] in bounded [`Batch`]es. The legacy file reader
//! ([`LegacyRepository`]) is the production implementation;
//! [`MemoryRepository`] serves rows held in memory.

mod filemap;
mod legacy;
mod memory;
pub mod parse;

pub use filemap::{FileMap, INDEX_FILE_NAME};
pub use legacy::{LegacyRepository, RecordReader};
pub use memory::MemoryRepository;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::{Batch, Table};

/// Default number of rows per dispatched batch
pub const DEFAULT_BATCH_SIZE: usize = 1024;

/// Consumer of streamed batches
///
/// Returning an error stops the stream; the error reaches the caller of
/// [`DataRepository::data_get_from_table`] unchanged.
pub trait DataHandler {
    fn handle_data(&mut self, batch: Batch) -> Result<()>;
}

impl<F> DataHandler for F
where
    F: FnMut(Batch) -> Result<()>,
{
    fn handle_data(&mut self, batch: Batch) -> Result<()> {
        self(batch)
    }
}

/// Counters of one table read
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadSummary {
    /// Records found in the data files
    pub records: u64,
    /// Rows delivered to the handler (records minus filtered ones)
    pub rows: u64,
    /// Records dropped by record filters
    pub filtered: u64,
    /// Batches dispatched, including the final one
    pub blocks: u64,
}

/// Producer of table data
pub trait DataRepository: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// Names of the tables this repository holds data for
    fn table_names(&self) -> Vec<String>;

    /// Stream every row of `table` to `handler` in batches.
    ///
    /// Without a handler the batches are discarded as they fill up. The
    /// last dispatched batch always has `end_of_data` set.
    fn data_get_from_table(
        &self,
        table: &Arc<Table>,
        handler: Option<&mut dyn DataHandler>,
    ) -> Result<ReadSummary>;

    /// Independent instance sharing the already built index
    fn clone_repository(&self) -> Box<dyn DataRepository>;
}

/// Forward `batch` to the handler, or drop it
pub(crate) fn dispatch(handler: &mut Option<&mut dyn DataHandler>, batch: Batch) -> Result<()> {
    match handler.as_deref_mut() {
        Some(handler) => handler.handle_data(batch),
        None => {
            tracing::trace!(
                table = %batch.table.name,
                block = batch.block,
                rows = batch.len(),
                "No handler registered, discarding batch"
            );
            Ok(())
        }
    }
}
