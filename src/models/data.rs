//! Field values and rows
//!
//! A [`DataObject`] pairs a source value with the [`Field`] it belongs to and
//! derives the archive (target) value on demand. Derivation is deterministic
//! for a given source value and map, so re-validation and re-archival of the
//! same row produce the same output.

use std::path::PathBuf;
use std::sync::Arc;

use crate::convert;
use crate::error::{ArchiveError, Result};

use super::field::Field;
use super::types::{DataType, FieldType, Value};

/// Scalar field value
#[derive(Debug, Clone)]
pub struct FieldData {
    field: Arc<Field>,
    source: Value,
    fallback: Option<Value>,
}

impl FieldData {
    pub fn new(field: Arc<Field>, source: Value) -> Self {
        Self {
            field,
            source,
            fallback: None,
        }
    }

    pub fn field(&self) -> &Arc<Field> {
        &self.field
    }

    pub fn source_value(&self) -> &Value {
        &self.source
    }

    /// Derive the target value for the field's declared target type
    pub fn target_value(&self) -> Result<Value> {
        self.target_value_as(self.field.target_type)
    }

    /// Derive the target value as `target`, through the field's map if any
    pub fn target_value_as(&self, target: FieldType) -> Result<Value> {
        if let Some(fallback) = &self.fallback
            && target == self.field.target_type
        {
            return Ok(fallback.clone());
        }
        match self.field.map() {
            Some(map) => map
                .map_value(&self.source, target)
                .map_err(|e| ArchiveError::Mapping {
                    table: self.field.table.clone(),
                    field: self.field.name.clone(),
                    value: e.value().to_string(),
                    message: e.to_string(),
                }),
            None => convert::coerce(&self.source, target).map_err(|e| ArchiveError::Conversion {
                table: self.field.table.clone(),
                field: self.field.name.clone(),
                value: e.value,
                target: e.target,
                message: e.message,
            }),
        }
    }

    /// Overwrite the source value, coercing it into the field's source type
    pub fn update_source_value(&mut self, value: Value) -> Result<()> {
        let coerced = convert::coerce(&value, self.field.source_type).map_err(|e| {
            ArchiveError::Conversion {
                table: self.field.table.clone(),
                field: self.field.name.clone(),
                value: e.value,
                target: e.target,
                message: e.message,
            }
        })?;
        self.source = coerced;
        self.fallback = None;
        Ok(())
    }

    /// Pin the target value to `value`, bypassing derivation
    pub fn set_fallback(&mut self, value: Value) {
        self.fallback = Some(value);
    }

    pub fn has_fallback(&self) -> bool {
        self.fallback.is_some()
    }
}

/// Reference to an external document stored next to the legacy data file
#[derive(Debug, Clone)]
pub struct DocumentData {
    field: Arc<Field>,
    file_name: String,
    path: Option<PathBuf>,
}

impl DocumentData {
    pub fn new(field: Arc<Field>, file_name: impl Into<String>, path: Option<PathBuf>) -> Self {
        Self {
            field,
            file_name: file_name.into(),
            path,
        }
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Resolved location of the document, when it exists on disk
    pub fn path(&self) -> Option<&PathBuf> {
        self.path.as_ref()
    }
}

/// One value of a row
#[derive(Debug, Clone)]
pub enum DataObject {
    Field(FieldData),
    Document(DocumentData),
}

impl DataObject {
    pub fn field_value(field: Arc<Field>, source: impl Into<Value>) -> Self {
        DataObject::Field(FieldData::new(field, source.into()))
    }

    pub fn field(&self) -> &Arc<Field> {
        match self {
            DataObject::Field(d) => &d.field,
            DataObject::Document(d) => &d.field,
        }
    }

    /// The stored source value
    pub fn source_value(&self) -> Value {
        match self {
            DataObject::Field(d) => d.source.clone(),
            DataObject::Document(d) if d.file_name.is_empty() => Value::Null,
            DataObject::Document(d) => Value::String(d.file_name.clone()),
        }
    }

    /// The stored source value, failing if `kind` is not the field's
    /// declared source type
    pub fn source_value_as(&self, kind: DataType) -> Result<Value> {
        let field = self.field();
        if field.source_type.kind != kind {
            return Err(ArchiveError::system(format!(
                "type mismatch reading {}.{}: declared {}, requested {}",
                field.table, field.name, field.source_type, kind
            )));
        }
        Ok(self.source_value())
    }

    pub fn target_value(&self) -> Result<Value> {
        match self {
            DataObject::Field(d) => d.target_value(),
            DataObject::Document(d) => Ok(self.document_target(d)),
        }
    }

    pub fn target_value_as(&self, target: FieldType) -> Result<Value> {
        match self {
            DataObject::Field(d) => d.target_value_as(target),
            DataObject::Document(d) => Ok(self.document_target(d)),
        }
    }

    fn document_target(&self, d: &DocumentData) -> Value {
        if d.file_name.is_empty() {
            Value::Null
        } else {
            Value::String(d.file_name.clone())
        }
    }

    pub fn update_source_value(&mut self, value: Value) -> Result<()> {
        match self {
            DataObject::Field(d) => d.update_source_value(value),
            DataObject::Document(d) => {
                d.file_name = value.to_invariant_string().unwrap_or_default();
                d.path = None;
                Ok(())
            }
        }
    }
}

/// Ordered values, one per table field; identity is positional
#[derive(Debug, Clone, Default)]
pub struct Row {
    /// One-based position of the record in its table's stream, 0 if unknown
    ordinal: u64,
    values: Vec<DataObject>,
}

impl Row {
    pub fn new(values: Vec<DataObject>) -> Self {
        Self { ordinal: 0, values }
    }

    pub fn with_ordinal(mut self, ordinal: u64) -> Self {
        self.ordinal = ordinal;
        self
    }

    pub fn ordinal(&self) -> u64 {
        self.ordinal
    }

    pub fn values(&self) -> &[DataObject] {
        &self.values
    }

    pub fn values_mut(&mut self) -> &mut [DataObject] {
        &mut self.values
    }

    pub fn get(&self, position: usize) -> Option<&DataObject> {
        self.values.get(position)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, DataObject> {
        self.values.iter()
    }
}

impl FromIterator<DataObject> for Row {
    fn from_iter<I: IntoIterator<Item = DataObject>>(iter: I) -> Self {
        Row::new(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::{Map, StaticMap};
    use crate::models::DataType;

    fn int_field() -> Arc<Field> {
        Arc::new(Field::new("SAG", "NR", FieldType::nullable(DataType::Int), 4))
    }

    #[test]
    fn test_source_value_type_check() {
        let data = DataObject::field_value(int_field(), 5);
        assert_eq!(data.source_value_as(DataType::Int).unwrap(), Value::Int(5));
        let err = data.source_value_as(DataType::String).unwrap_err();
        assert!(err.to_string().contains("type mismatch"));
    }

    #[test]
    fn test_clone_is_independent() {
        let original = DataObject::field_value(int_field(), 5);
        let mut copy = original.clone();
        copy.update_source_value(Value::from("9")).unwrap();
        assert_eq!(original.source_value(), Value::Int(5));
        assert_eq!(copy.source_value(), Value::Int(9));
        assert_eq!(original.target_value().unwrap(), Value::Int(5));
    }

    #[test]
    fn test_mapping_error_carries_context() {
        let field = Field::new("SAG", "KODE", FieldType::new(DataType::String), 1)
            .with_map(Arc::new(Map::Static(StaticMap::new("kode").with_entry("A", "Aktiv"))));
        let data = DataObject::field_value(Arc::new(field), "X");
        match data.target_value().unwrap_err() {
            ArchiveError::Mapping {
                table,
                field,
                value,
                ..
            } => {
                assert_eq!(table, "SAG");
                assert_eq!(field, "KODE");
                assert_eq!(value, "X");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_fallback_pins_target() {
        let field = Field::new("SAG", "NR", FieldType::new(DataType::String), 4)
            .with_target("nr", FieldType::new(DataType::Int));
        let mut data = FieldData::new(Arc::new(field), Value::from("abc"));
        assert!(data.target_value().is_err());
        data.set_fallback(Value::Int(0));
        assert_eq!(data.target_value().unwrap(), Value::Int(0));
    }

    #[test]
    fn test_document_target() {
        let field = Arc::new(
            Field::new("SAG", "DOK", FieldType::nullable(DataType::String), 12)
                .with_functionality(crate::models::Functionality::Document),
        );
        let doc = DataObject::Document(DocumentData::new(field, "A0001.TIF", None));
        assert_eq!(doc.target_value().unwrap(), Value::from("A0001.TIF"));
    }
}
