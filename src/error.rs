//! Error types for conversion, validation and archival
//!
//! Every failure carries an [`ErrorKind`] so callers decide how to react by
//! inspecting the kind instead of matching on concrete variants. Row level
//! errors carry the table, field and offending value.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

use crate::models::DataType;

/// Error classification, ordered by increasing severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ErrorKind {
    /// Row-level constraint violation
    Validation,
    /// A value failed to convert under a map
    Mapping,
    /// A value failed to coerce into its target type
    Conversion,
    /// Schema/table description inconsistency
    Metadata,
    /// I/O, missing files or directories, unsupported types during read/write
    Repository,
    /// Programming or invariant violation
    System,
}

impl ErrorKind {
    /// Whether processing may resume after an error of this kind
    pub fn is_continuable(self) -> bool {
        matches!(
            self,
            ErrorKind::Validation | ErrorKind::Mapping | ErrorKind::Conversion
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Validation => write!(f, "validation"),
            ErrorKind::Mapping => write!(f, "mapping"),
            ErrorKind::Conversion => write!(f, "conversion"),
            ErrorKind::Metadata => write!(f, "metadata"),
            ErrorKind::Repository => write!(f, "repository"),
            ErrorKind::System => write!(f, "system"),
        }
    }
}

/// Main error type for the archive SDK
#[derive(Error, Debug)]
pub enum ArchiveError {
    /// A row violated a primary key, foreign key or mapping constraint
    #[error("Validation failed in {validator} for table {table}, row {row}: {message}")]
    Validation {
        table: String,
        validator: String,
        row: u64,
        value: Option<String>,
        message: String,
    },

    /// No mapping rule matched the source value
    #[error("Mapping failed for {table}.{field} on value '{value}': {message}")]
    Mapping {
        table: String,
        field: String,
        value: String,
        message: String,
    },

    /// The source value could not be coerced into the requested type
    #[error("Cannot convert '{value}' to {target} for {table}.{field}: {message}")]
    Conversion {
        table: String,
        field: String,
        value: String,
        target: DataType,
        message: String,
    },

    /// The table description is inconsistent
    #[error("Metadata error{}: {message}", table.as_ref().map(|t| format!(" in table {t}")).unwrap_or_default())]
    Metadata {
        table: Option<String>,
        message: String,
    },

    /// Reading or writing archive data failed
    #[error("Repository error in {operation}: {message}")]
    Repository { operation: String, message: String },

    /// A required file or directory is missing
    #[error("Path not found: {}", .0.display())]
    PathNotFound(PathBuf),

    /// Invariant violation, always fatal
    #[error("System error: {0}")]
    System(String),

    /// Processing was stopped by the error handler or the warning tolerance
    #[error("Processing of table {table} aborted: {reason}")]
    Aborted { table: String, reason: String },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// XML writing or parsing error
    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    /// YAML metadata error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// TOML configuration error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// JSON report error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for archive operations
pub type Result<T> = std::result::Result<T, ArchiveError>;

impl ArchiveError {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            ArchiveError::Validation { .. } => ErrorKind::Validation,
            ArchiveError::Mapping { .. } => ErrorKind::Mapping,
            ArchiveError::Conversion { .. } => ErrorKind::Conversion,
            ArchiveError::Metadata { .. } | ArchiveError::Yaml(_) | ArchiveError::Toml(_) => {
                ErrorKind::Metadata
            }
            ArchiveError::Repository { .. }
            | ArchiveError::PathNotFound(_)
            | ArchiveError::Io(_)
            | ArchiveError::Xml(_)
            | ArchiveError::Json(_) => ErrorKind::Repository,
            ArchiveError::System(_) | ArchiveError::Aborted { .. } => ErrorKind::System,
        }
    }

    /// Whether processing of the current table may resume
    pub fn is_continuable(&self) -> bool {
        self.kind().is_continuable()
    }

    /// Create a metadata error scoped to a table
    pub fn metadata(table: impl Into<String>, message: impl Into<String>) -> Self {
        ArchiveError::Metadata {
            table: Some(table.into()),
            message: message.into(),
        }
    }

    /// Create a metadata error that is not tied to a table
    pub fn schema(message: impl Into<String>) -> Self {
        ArchiveError::Metadata {
            table: None,
            message: message.into(),
        }
    }

    /// Create a repository error naming the failing operation
    pub fn repository(operation: impl Into<String>, message: impl Into<String>) -> Self {
        ArchiveError::Repository {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Create a system error
    pub fn system(message: impl Into<String>) -> Self {
        ArchiveError::System(message.into())
    }

    /// Wrap an arbitrary failure with the operation it happened in.
    ///
    /// Errors that already carry a kind other than plain I/O pass through
    /// unchanged.
    pub fn with_operation(self, operation: &str) -> Self {
        match self {
            ArchiveError::Io(e) => ArchiveError::repository(operation, e.to_string()),
            ArchiveError::Xml(e) => ArchiveError::repository(operation, e.to_string()),
            other => other,
        }
    }

    /// Ordinal of the offending row, if any
    pub fn row(&self) -> Option<u64> {
        match self {
            ArchiveError::Validation { row, .. } => Some(*row),
            _ => None,
        }
    }

    /// Offending value, if any
    pub fn value(&self) -> Option<&str> {
        match self {
            ArchiveError::Validation { value, .. } => value.as_deref(),
            ArchiveError::Mapping { value, .. } | ArchiveError::Conversion { value, .. } => {
                Some(value)
            }
            _ => None,
        }
    }

    /// Table name carried by this error, if any
    pub fn table(&self) -> Option<&str> {
        match self {
            ArchiveError::Validation { table, .. }
            | ArchiveError::Mapping { table, .. }
            | ArchiveError::Conversion { table, .. }
            | ArchiveError::Aborted { table, .. } => Some(table),
            ArchiveError::Metadata { table, .. } => table.as_deref(),
            _ => None,
        }
    }

    /// Get a user-friendly error message for CLI output
    pub fn user_message(&self) -> String {
        match self {
            ArchiveError::PathNotFound(path) => format!(
                "Path not found: {}\n\nHint: Check that the legacy archive root is mounted and complete.",
                path.display()
            ),
            ArchiveError::Metadata { .. } | ArchiveError::Yaml(_) => format!(
                "{self}\n\nHint: Check the table metadata file for the named table and field."
            ),
            ArchiveError::Toml(_) => {
                format!("{self}\n\nHint: Check the run configuration file.")
            }
            ArchiveError::Aborted { .. } => format!(
                "{self}\n\nHint: Raise max_warnings or run with --validate-only to list all violations."
            ),
            _ => self.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_classification() {
        let err = ArchiveError::Mapping {
            table: "SAG".to_string(),
            field: "STATUS".to_string(),
            value: "X".to_string(),
            message: "no rule".to_string(),
        };
        assert_eq!(err.kind(), ErrorKind::Mapping);
        assert!(err.is_continuable());
        assert_eq!(err.table(), Some("SAG"));

        let err = ArchiveError::repository("read", "boom");
        assert_eq!(err.kind(), ErrorKind::Repository);
        assert!(!err.is_continuable());

        let err: ArchiveError = std::io::Error::other("disk").into();
        assert_eq!(err.kind(), ErrorKind::Repository);
    }

    #[test]
    fn test_severity_order() {
        assert!(ErrorKind::Validation < ErrorKind::Mapping);
        assert!(ErrorKind::Metadata < ErrorKind::Repository);
        assert!(ErrorKind::Repository < ErrorKind::System);
    }

    #[test]
    fn test_error_display() {
        let err = ArchiveError::metadata("SAG", "unknown field FOO");
        assert_eq!(
            err.to_string(),
            "Metadata error in table SAG: unknown field FOO"
        );
        let err = ArchiveError::schema("duplicate table");
        assert_eq!(err.to_string(), "Metadata error: duplicate table");
    }

    #[test]
    fn test_with_operation_wraps_io() {
        let err: ArchiveError = std::io::Error::other("eof").into();
        let err = err.with_operation("read_record");
        assert!(matches!(err, ArchiveError::Repository { ref operation, .. } if operation == "read_record"));

        let err = ArchiveError::system("bad").with_operation("read_record");
        assert!(matches!(err, ArchiveError::System(_)));
    }
}
