//! Error types for value mapping

use thiserror::Error;

/// Errors that can occur while applying a map
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MapError {
    /// No rule matched the source value
    #[error("No rule in map '{map}' matches value '{value}'")]
    NoMatch { map: String, value: String },

    /// A rule matched but its output does not fit the target type
    #[error("Map '{map}' produced an invalid target for '{value}': {message}")]
    InvalidTarget {
        map: String,
        value: String,
        message: String,
    },
}

impl MapError {
    /// The offending source value
    pub fn value(&self) -> &str {
        match self {
            MapError::NoMatch { value, .. } | MapError::InvalidTarget { value, .. } => value,
        }
    }
}

/// Result type for mapping operations
pub type MapResult<T> = Result<T, MapError>;
