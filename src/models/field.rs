//! Field model: one column of a legacy table

use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, OnceLock};

use crate::convert;
use crate::error::{ArchiveError, Result};
use crate::mapping::Map;

use super::types::{DataType, FieldType, Value};

/// Vendor-specific annotation attached to a field
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Functionality {
    /// The field holds the file name of an external document
    Document,
    /// Any other annotation, kept verbatim
    Tag(String),
}

impl FromStr for Functionality {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim() {
            "" => Err("Empty functionality tag".to_string()),
            t if t.eq_ignore_ascii_case("document") => Ok(Functionality::Document),
            t => Ok(Functionality::Tag(t.to_string())),
        }
    }
}

impl fmt::Display for Functionality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Functionality::Document => write!(f, "document"),
            Functionality::Tag(t) => write!(f, "{}", t),
        }
    }
}

/// Column metadata
///
/// A field describes how one fixed-width slot of a legacy record is read
/// (`source_type`, `source_length`) and how its value is archived
/// (`target_type`, `target_name`). Fields are immutable after metadata load
/// except for the map, which may be assigned once.
#[derive(Debug, Clone)]
pub struct Field {
    /// Name of the owning table (diagnostics only)
    pub table: String,
    /// Source (legacy) column name
    pub name: String,
    /// Archive column name
    pub target_name: String,
    /// Zero-based position within the table and within each row
    pub position: usize,
    pub source_type: FieldType,
    pub target_type: FieldType,
    /// Number of characters the field occupies in a legacy record
    pub source_length: usize,
    pub target_length: Option<usize>,
    /// Whether the archived column may hold nil
    pub nullable: bool,
    /// Text of the default value, coerced on demand
    pub default_value: Option<String>,
    pub description: Option<String>,
    pub functionality: Vec<Functionality>,
    map: OnceLock<Arc<Map>>,
}

impl Field {
    /// Create a field whose target type equals its source type
    pub fn new(
        table: impl Into<String>,
        name: impl Into<String>,
        source_type: FieldType,
        source_length: usize,
    ) -> Self {
        let name = name.into();
        Self {
            table: table.into(),
            target_name: name.clone(),
            name,
            position: 0,
            source_type,
            target_type: source_type,
            source_length,
            target_length: None,
            nullable: source_type.nullable,
            default_value: None,
            description: None,
            functionality: Vec::new(),
            map: OnceLock::new(),
        }
    }

    pub fn with_target(mut self, target_name: impl Into<String>, target_type: FieldType) -> Self {
        self.target_name = target_name.into();
        self.target_type = target_type;
        self.nullable = target_type.nullable;
        self
    }

    pub fn with_position(mut self, position: usize) -> Self {
        self.position = position;
        self
    }

    pub fn with_nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    pub fn with_default(mut self, default_value: impl Into<String>) -> Self {
        self.default_value = Some(default_value.into());
        self
    }

    pub fn with_functionality(mut self, functionality: Functionality) -> Self {
        self.functionality.push(functionality);
        self
    }

    pub fn with_map(self, map: Arc<Map>) -> Self {
        let _ = self.map.set(map);
        self
    }

    /// The injected map, if any
    pub fn map(&self) -> Option<&Arc<Map>> {
        self.map.get()
    }

    /// Assign the map. A field's map can only be assigned once.
    pub fn assign_map(&self, map: Arc<Map>) -> Result<()> {
        self.map.set(map).map_err(|_| {
            ArchiveError::metadata(
                &self.table,
                format!("map for field {} is already assigned", self.name),
            )
        })
    }

    /// Whether the field references an external document
    pub fn is_document(&self) -> bool {
        self.functionality.contains(&Functionality::Document)
    }

    /// Best-effort value substituted when the real target value cannot be
    /// derived: the coerced default, else nil, else the type's zero.
    pub fn fallback_value(&self) -> Value {
        if let Some(default) = &self.default_value
            && let Ok(value) = convert::coerce(&Value::String(default.clone()), self.target_type)
        {
            return value;
        }
        if self.nullable || self.target_type.nullable {
            return Value::Null;
        }
        match self.target_type.kind {
            DataType::String => Value::String(String::new()),
            DataType::Bool => Value::Bool(false),
            kind => kind.zero().unwrap_or(Value::Null),
        }
    }
}
