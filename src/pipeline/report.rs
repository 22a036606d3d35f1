//! Conversion run report

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::Result;

/// Outcome of one table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TableStatus {
    /// Not started yet
    Pending,
    /// Archived
    Completed,
    /// Validated without writing
    Validated,
    /// Stopped by an error or the warning tolerance
    Failed,
    /// Stopped because another table failed
    Cancelled,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableReport {
    pub table: String,
    pub ordinal: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub folder: Option<String>,
    pub status: TableStatus,
    pub rows_read: u64,
    pub rows_filtered: u64,
    pub rows_removed: u64,
    pub rows_written: u64,
    pub warnings: u64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub messages: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl TableReport {
    pub fn new(table: impl Into<String>, ordinal: usize) -> Self {
        Self {
            table: table.into(),
            ordinal,
            folder: None,
            status: TableStatus::Pending,
            rows_read: 0,
            rows_filtered: 0,
            rows_removed: 0,
            rows_written: 0,
            warnings: 0,
            messages: Vec::new(),
            error: None,
            duration_ms: 0,
        }
    }

    pub fn succeeded(&self) -> bool {
        matches!(self.status, TableStatus::Completed | TableStatus::Validated)
    }
}

/// Summary of a conversion run, serializable to JSON
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionReport {
    pub package_id: String,
    pub schema: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<PathBuf>,
    pub validation_only: bool,
    pub processing_order: Vec<String>,
    pub metadata_warnings: Vec<String>,
    pub tables: Vec<TableReport>,
    pub headers_written: bool,
    pub duration_ms: u64,
}

impl ConversionReport {
    /// Whether every selected table completed or validated
    pub fn is_success(&self) -> bool {
        self.tables.iter().all(TableReport::succeeded)
    }

    pub fn total_warnings(&self) -> u64 {
        self.tables.iter().map(|t| t.warnings).sum()
    }

    /// Report of one table, case-insensitive
    pub fn table(&self, name: &str) -> Option<&TableReport> {
        self.tables.iter().find(|t| t.table.eq_ignore_ascii_case(name))
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent()
            && !dir.as_os_str().is_empty()
        {
            fs::create_dir_all(dir)?;
        }
        fs::write(path, self.to_json()?)?;
        Ok(())
    }
}
