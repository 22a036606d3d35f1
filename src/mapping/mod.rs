//! Source-to-target value mapping rules
//!
//! A [`Map`] converts one typed value into the target type of the field it
//! is attached to. Two rule shapes exist:
//! - [`StaticMap`]: finite dictionary keyed on the exact source value
//! - [`DynamicMap`]: ordered regex rules, first match wins
//!
//! # Example
//!
//! ```rust
//! use legacy_archive_sdk::mapping::{DynamicMap, Map};
//! use legacy_archive_sdk::models::{DataType, FieldType, Value};
//!
//! let map = Map::Dynamic(DynamicMap::new("prefix").with_rule("^A.*", "Alpha").unwrap());
//! let mapped = map.map_value(&Value::from("ABC"), FieldType::new(DataType::String)).unwrap();
//! assert_eq!(mapped, Value::from("Alpha"));
//! ```

mod dynamic_map;
mod error;
mod static_map;

pub use dynamic_map::{DynamicMap, DynamicRule};
pub use error::{MapError, MapResult};
pub use static_map::StaticMap;

use crate::convert;
use crate::models::{FieldType, Value};

/// A pluggable source-to-target conversion rule
#[derive(Debug, Clone)]
pub enum Map {
    Static(StaticMap),
    Dynamic(DynamicMap),
}

impl Map {
    /// Name the map was registered under in the metadata
    pub fn name(&self) -> &str {
        match self {
            Map::Static(m) => &m.name,
            Map::Dynamic(m) => &m.name,
        }
    }

    /// Map `source` and coerce the rule's output into `target`
    pub fn map_value(&self, source: &Value, target: FieldType) -> MapResult<Value> {
        let mapped = match self {
            Map::Static(m) => m.lookup(source)?,
            Map::Dynamic(m) => m.apply(source)?,
        };
        convert::coerce(&Value::String(mapped), target).map_err(|e| MapError::InvalidTarget {
            map: self.name().to_string(),
            value: source.to_string(),
            message: e.to_string(),
        })
    }
}

impl From<StaticMap> for Map {
    fn from(m: StaticMap) -> Self {
        Map::Static(m)
    }
}

impl From<DynamicMap> for Map {
    fn from(m: DynamicMap) -> Self {
        Map::Dynamic(m)
    }
}
