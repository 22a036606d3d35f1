//! Foreign key referential integrity

use std::collections::HashSet;
use std::sync::Arc;

use crate::error::{ArchiveError, Result};
use crate::models::{Batch, ForeignKey, Key, Row, Schema, Table};
use crate::repository::DataRepository;

use super::cache::LruCache;
use super::{TableBatches, ValidationCommand, Validator, row_failure};

const NAME: &str = "ForeignKeyValidator";

/// Default number of referenced key sets kept in memory
pub const DEFAULT_CACHE_SIZE: usize = 10;

type KeySet = Arc<HashSet<String>>;

/// Checks that every foreign key value exists in the referenced table.
///
/// Referenced key sets are materialized by reading the referenced table
/// through the validator's own repository instance and kept in an LRU cache.
/// Rows with a null foreign key component are not checked.
pub struct ForeignKeyValidator {
    repository: Box<dyn DataRepository>,
    cache: LruCache<String, KeySet>,
    loads: u64,
}

impl ForeignKeyValidator {
    pub fn new(repository: Box<dyn DataRepository>, cache_size: usize) -> Self {
        Self {
            repository,
            cache: LruCache::new(cache_size),
            loads: 0,
        }
    }

    /// Number of referenced key sets read from the repository so far
    pub fn loads(&self) -> u64 {
        self.loads
    }

    pub fn cached_tables(&self) -> usize {
        self.cache.len()
    }

    /// Release every cached key set
    pub fn clear_cache(&mut self) {
        if !self.cache.is_empty() {
            tracing::debug!(tables = self.cache.len(), "Releasing cached foreign key sets");
        }
        self.cache.clear();
    }

    fn referenced<'a>(
        &self,
        schema: &'a Schema,
        table: &Table,
        foreign_key: &ForeignKey,
    ) -> Result<(&'a Arc<Table>, &'a Key)> {
        let referenced = schema.table(&foreign_key.referenced_table).ok_or_else(|| {
            ArchiveError::metadata(
                &table.name,
                format!(
                    "foreign key {} references unknown table {}",
                    foreign_key.name, foreign_key.referenced_table
                ),
            )
        })?;
        let key = referenced
            .referenced_key(foreign_key.referenced_key.as_deref())
            .ok_or_else(|| {
                ArchiveError::metadata(
                    &table.name,
                    format!(
                        "foreign key {} references a missing key of table {}",
                        foreign_key.name, referenced.name
                    ),
                )
            })?;
        Ok((referenced, key))
    }

    fn key_set(&mut self, referenced: &Arc<Table>, key: &Key) -> Result<KeySet> {
        let cache_key = format!("{}/{}", referenced.name.to_uppercase(), key.name.to_uppercase());
        if let Some(set) = self.cache.get(&cache_key) {
            return Ok(Arc::clone(set));
        }

        let mut values = HashSet::new();
        let mut skipped = 0u64;
        let mut collect = |batch: Batch| -> Result<()> {
            for row in &batch.rows {
                match key.value_of(row) {
                    Ok(value) if !value.has_null => {
                        values.insert(value.text);
                    }
                    Ok(_) => {}
                    Err(e) if e.is_continuable() => skipped += 1,
                    Err(e) => return Err(e),
                }
            }
            Ok(())
        };
        self.repository
            .data_get_from_table(referenced, Some(&mut collect))?;
        self.loads += 1;

        tracing::debug!(
            table = %referenced.name,
            key = %key.name,
            values = values.len(),
            skipped,
            "Loaded referenced key set"
        );
        let set = Arc::new(values);
        if let Some(evicted) = self.cache.put(cache_key, Arc::clone(&set)) {
            tracing::debug!(evicted = %evicted, "Evicted cached key set");
        }
        Ok(set)
    }

    fn check_rows(
        &mut self,
        table: &Arc<Table>,
        rows: &mut Vec<Row>,
        command: &ValidationCommand,
        failures: &mut Vec<ArchiveError>,
    ) -> Result<()> {
        let mut checks = Vec::with_capacity(table.foreign_keys.len());
        for foreign_key in &table.foreign_keys {
            let (referenced, key) = self.referenced(&command.schema, table, foreign_key)?;
            let set = self.key_set(referenced, key)?;
            checks.push((foreign_key, key, set));
        }

        let mut kept = Vec::with_capacity(rows.len());
        for row in rows.drain(..) {
            let mut missing = false;
            for (foreign_key, key, set) in &checks {
                let value = match foreign_key.value_of(&row, key) {
                    Ok(value) => value,
                    Err(e) if e.is_continuable() => {
                        failures.push(e);
                        continue;
                    }
                    Err(e) => return Err(e),
                };
                if value.has_null || set.contains(&value.text) {
                    continue;
                }
                missing = true;
                failures.push(row_failure(
                    table,
                    NAME,
                    &row,
                    Some(value.display()),
                    format!(
                        "foreign key {} value '{}' does not exist in {}",
                        foreign_key.name,
                        value.display(),
                        foreign_key.referenced_table
                    ),
                ));
            }

            if missing && command.remove_missing_relationships {
                tracing::debug!(
                    table = %table.name,
                    row = row.ordinal(),
                    "Removing row with missing relationship"
                );
            } else {
                kept.push(row);
            }
        }
        *rows = kept;
        Ok(())
    }
}

impl Validator for ForeignKeyValidator {
    fn name(&self) -> &str {
        NAME
    }

    fn validate(
        &mut self,
        table: &Arc<Table>,
        batches: &mut TableBatches,
        _end_of_data: bool,
        command: &ValidationCommand,
    ) -> Result<Vec<ArchiveError>> {
        let mut failures = Vec::new();
        for (name, rows) in batches.iter_mut() {
            let current = command.resolve(table, name)?;
            if current.foreign_keys.is_empty() || rows.is_empty() {
                continue;
            }
            self.check_rows(&current, rows, command, &mut failures)?;
        }
        Ok(failures)
    }
}

impl Drop for ForeignKeyValidator {
    fn drop(&mut self) {
        self.clear_cache();
    }
}
