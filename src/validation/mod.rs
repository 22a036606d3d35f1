//! Validation functionality
//!
//! Provides validation logic for:
//! - Primary key uniqueness across all batches of a table
//! - Foreign key referential integrity, with a bounded cache of
//!   referenced key sets
//! - Mapping rules, forcing target values before archival
//! - Metadata consistency and table processing order
//!
//! Validators return continuable failures as a list and fatal failures as
//! `Err`. Counting failures against a tolerance is the caller's job.

pub mod cache;
pub mod foreign_key;
pub mod mapping;
pub mod metadata;
pub mod primary_key;

pub use cache::LruCache;
pub use foreign_key::{DEFAULT_CACHE_SIZE, ForeignKeyValidator};
pub use mapping::MappingValidator;
pub use metadata::{MetadataReport, MetadataValidator};
pub use primary_key::PrimaryKeyValidator;

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::RunOptions;
use crate::error::{ArchiveError, Result};
use crate::models::{Row, Schema, Table};

/// Rows to validate in one pass, keyed by table name
pub type TableBatches = BTreeMap<String, Vec<Row>>;

/// Run options relevant to validators
#[derive(Debug, Clone)]
pub struct ValidationCommand {
    pub schema: Arc<Schema>,
    pub remove_missing_relationships: bool,
    pub validation_only: bool,
}

impl ValidationCommand {
    pub fn new(schema: Arc<Schema>) -> Self {
        Self {
            schema,
            remove_missing_relationships: false,
            validation_only: false,
        }
    }

    pub fn from_options(schema: Arc<Schema>, options: &RunOptions) -> Self {
        Self {
            schema,
            remove_missing_relationships: options.remove_missing_relationships_on_foreign_keys,
            validation_only: options.validation_only,
        }
    }

    pub fn with_remove_missing_relationships(mut self, remove: bool) -> Self {
        self.remove_missing_relationships = remove;
        self
    }

    /// Resolve the table a batch entry belongs to
    pub(crate) fn resolve(&self, current: &Arc<Table>, name: &str) -> Result<Arc<Table>> {
        if current.name.eq_ignore_ascii_case(name) {
            return Ok(Arc::clone(current));
        }
        self.schema
            .table(name)
            .cloned()
            .ok_or_else(|| ArchiveError::schema(format!("batch for unknown table {name}")))
    }
}

/// Observability record emitted once per validator and table per pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationEvent {
    pub validator: String,
    pub table: String,
    pub rows: usize,
    pub failures: usize,
    pub end_of_data: bool,
}

/// A row-level constraint check over streamed batches
pub trait Validator: Send {
    fn name(&self) -> &str;

    /// Validate `batches`, which may be modified (rows removed or values
    /// pinned to fallbacks). `table` is the table currently streamed.
    fn validate(
        &mut self,
        table: &Arc<Table>,
        batches: &mut TableBatches,
        end_of_data: bool,
        command: &ValidationCommand,
    ) -> Result<Vec<ArchiveError>>;
}

/// Callback receiving [`ValidationEvent`]s
pub type ValidationListener = Arc<dyn Fn(&ValidationEvent) + Send + Sync>;

/// Ordered collection of validators run against each batch
#[derive(Default)]
pub struct Validators {
    validators: Vec<Box<dyn Validator>>,
    listener: Option<ValidationListener>,
}

impl Validators {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mapping, primary key and foreign key validators, in that order
    pub fn standard(foreign_key: ForeignKeyValidator) -> Self {
        Self::new()
            .with(MappingValidator::new())
            .with(PrimaryKeyValidator::new())
            .with(foreign_key)
    }

    pub fn with(mut self, validator: impl Validator + 'static) -> Self {
        self.validators.push(Box::new(validator));
        self
    }

    pub fn with_listener(mut self, listener: ValidationListener) -> Self {
        self.listener = Some(listener);
        self
    }

    pub fn len(&self) -> usize {
        self.validators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }

    /// Run every validator in sequence.
    ///
    /// Continuable failures are collected and returned; the first fatal
    /// failure stops the pass and is returned as `Err`.
    pub fn validate(
        &mut self,
        table: &Arc<Table>,
        batches: &mut TableBatches,
        end_of_data: bool,
        command: &ValidationCommand,
    ) -> Result<Vec<ArchiveError>> {
        let mut failures = Vec::new();
        for validator in &mut self.validators {
            let found = validator.validate(table, batches, end_of_data, command)?;
            if let Some(fatal) = found.iter().position(|e| !e.is_continuable()) {
                let mut found = found;
                return Err(found.swap_remove(fatal));
            }

            if let Some(listener) = &self.listener {
                for (name, rows) in batches.iter() {
                    listener(&ValidationEvent {
                        validator: validator.name().to_string(),
                        table: name.clone(),
                        rows: rows.len(),
                        failures: found
                            .iter()
                            .filter(|e| e.table().is_some_and(|t| t.eq_ignore_ascii_case(name)))
                            .count(),
                        end_of_data,
                    });
                }
            }
            failures.extend(found);
        }
        Ok(failures)
    }
}

/// Validation failure for one row
pub(crate) fn row_failure(
    table: &Table,
    validator: &str,
    row: &Row,
    value: Option<String>,
    message: impl Into<String>,
) -> ArchiveError {
    ArchiveError::Validation {
        table: table.name.clone(),
        validator: validator.to_string(),
        row: row.ordinal(),
        value,
        message: message.into(),
    }
}
