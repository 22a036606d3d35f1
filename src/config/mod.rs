//! Run configuration types

use std::fs;
use std::path::Path;

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use crate::error::{ArchiveError, Result};

/// Default namespace base for generated table schemas
pub const DEFAULT_NAMESPACE_BASE: &str = "www.sa.dk/xmlns/siard/1.0";

/// Options for one conversion run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunOptions {
    /// Rows per batch handed from the reader to the handler
    pub batch_size: usize,
    /// Referenced key sets kept in the foreign key cache
    pub number_of_foreign_tables_to_cache: usize,
    /// Validate only, do not write archive output
    pub validation_only: bool,
    /// Only tables whose name matches (case-insensitive)
    pub table_filter: Option<String>,
    /// Maximum number of tables converted concurrently
    pub tables_handled_simultaneity: usize,
    /// Drop rows whose foreign key has no referenced row
    pub remove_missing_relationships_on_foreign_keys: bool,
    /// Package identifier, derived from the schema and table names when absent
    pub package_id: Option<String>,
    /// Warnings tolerated per table in validation-only runs
    pub max_warnings: usize,
    /// Base for `http://{base}/schema0/table{N}.xsd` namespaces
    pub namespace_base: String,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            batch_size: crate::repository::DEFAULT_BATCH_SIZE,
            number_of_foreign_tables_to_cache: crate::validation::DEFAULT_CACHE_SIZE,
            validation_only: false,
            table_filter: None,
            tables_handled_simultaneity: 1,
            remove_missing_relationships_on_foreign_keys: false,
            package_id: None,
            max_warnings: 0,
            namespace_base: DEFAULT_NAMESPACE_BASE.to_string(),
        }
    }
}

impl RunOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load options from a TOML file; missing keys keep their defaults
    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(ArchiveError::PathNotFound(path.to_path_buf()));
        }
        let content = fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let options: Self = toml::from_str(content)?;
        options.validate()?;
        Ok(options)
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_cache_size(mut self, tables: usize) -> Self {
        self.number_of_foreign_tables_to_cache = tables;
        self
    }

    pub fn with_validation_only(mut self, validation_only: bool) -> Self {
        self.validation_only = validation_only;
        self
    }

    pub fn with_table_filter(mut self, pattern: impl Into<String>) -> Self {
        self.table_filter = Some(pattern.into());
        self
    }

    pub fn with_concurrency(mut self, tables: usize) -> Self {
        self.tables_handled_simultaneity = tables;
        self
    }

    pub fn with_remove_missing_relationships(mut self, remove: bool) -> Self {
        self.remove_missing_relationships_on_foreign_keys = remove;
        self
    }

    pub fn with_package_id(mut self, package_id: impl Into<String>) -> Self {
        self.package_id = Some(package_id.into());
        self
    }

    pub fn with_max_warnings(mut self, max_warnings: usize) -> Self {
        self.max_warnings = max_warnings;
        self
    }

    pub fn with_namespace_base(mut self, base: impl Into<String>) -> Self {
        self.namespace_base = base.into();
        self
    }

    /// Compiled table filter, if one is configured
    pub fn table_filter_regex(&self) -> Result<Option<Regex>> {
        self.table_filter
            .as_deref()
            .map(|pattern| {
                RegexBuilder::new(pattern)
                    .case_insensitive(true)
                    .build()
                    .map_err(|e| {
                        ArchiveError::schema(format!("invalid table filter '{pattern}': {e}"))
                    })
            })
            .transpose()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(ArchiveError::schema("batch_size must be at least 1"));
        }
        if self.tables_handled_simultaneity == 0 {
            return Err(ArchiveError::schema(
                "tables_handled_simultaneity must be at least 1",
            ));
        }
        if self.number_of_foreign_tables_to_cache == 0 {
            return Err(ArchiveError::schema(
                "number_of_foreign_tables_to_cache must be at least 1",
            ));
        }
        if self.namespace_base.trim().is_empty() {
            return Err(ArchiveError::schema("namespace_base must not be empty"));
        }
        self.table_filter_regex()?;
        Ok(())
    }
}
