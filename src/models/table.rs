//! Table model: fields, keys, filters and documents

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{ArchiveError, Result};
use crate::mapping::Map;

use super::data::{DataObject, Row};
use super::field::Field;
use super::types::{FieldType, Value};

/// Separator placed between the components of a composite key value
pub const KEY_SEPARATOR: char = '\u{1F}';

/// One field of a key, optionally routed through its own map
#[derive(Debug, Clone)]
pub struct KeyComponent {
    pub field: Arc<Field>,
    pub map: Option<Arc<Map>>,
}

impl KeyComponent {
    pub fn new(field: Arc<Field>) -> Self {
        Self { field, map: None }
    }

    pub fn with_map(mut self, map: Arc<Map>) -> Self {
        self.map = Some(map);
        self
    }

    /// Value of this component in `row`, coerced into `target`
    fn value_in(&self, row: &Row, target: FieldType) -> Result<Value> {
        let data = row.get(self.field.position).ok_or_else(|| {
            ArchiveError::system(format!(
                "row of table {} has no value at position {} for key field {}",
                self.field.table, self.field.position, self.field.name
            ))
        })?;
        match &self.map {
            Some(map) => map
                .map_value(&data.source_value(), target)
                .map_err(|e| ArchiveError::Mapping {
                    table: self.field.table.clone(),
                    field: self.field.name.clone(),
                    value: e.value().to_string(),
                    message: e.to_string(),
                }),
            None => data.target_value_as(target),
        }
    }
}

/// Composite key value of one row
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyValue {
    /// Component texts joined with [`KEY_SEPARATOR`]
    pub text: String,
    /// At least one component was null or blank
    pub has_null: bool,
}

impl KeyValue {
    fn compose(values: impl IntoIterator<Item = Value>) -> Self {
        let mut text = String::new();
        let mut has_null = false;
        for (i, value) in values.into_iter().enumerate() {
            if i > 0 {
                text.push(KEY_SEPARATOR);
            }
            if value.is_empty() {
                has_null = true;
            }
            if let Some(s) = value.to_invariant_string() {
                text.push_str(&s);
            }
        }
        Self { text, has_null }
    }

    /// Human readable form, components separated by `|`
    pub fn display(&self) -> String {
        self.text.replace(KEY_SEPARATOR, "|")
    }
}

/// Candidate or primary key
///
/// Components are kept in field order so the composite value of a row is
/// deterministic regardless of the order keys were declared in.
#[derive(Debug, Clone)]
pub struct Key {
    pub name: String,
    pub components: Vec<KeyComponent>,
    pub allow_nulls: bool,
}

impl Key {
    pub fn new(name: impl Into<String>, mut components: Vec<KeyComponent>) -> Self {
        components.sort_by_key(|c| c.field.position);
        Self {
            name: name.into(),
            components,
            allow_nulls: false,
        }
    }

    /// Let rows with a null or blank component pass the primary key check
    pub fn with_allow_nulls(mut self, allow_nulls: bool) -> Self {
        self.allow_nulls = allow_nulls;
        self
    }

    pub fn field_names(&self) -> Vec<&str> {
        self.components.iter().map(|c| c.field.name.as_str()).collect()
    }

    /// Composite target value of `row` for this key
    pub fn value_of(&self, row: &Row) -> Result<KeyValue> {
        let values = self
            .components
            .iter()
            .map(|c| c.value_in(row, c.field.target_type))
            .collect::<Result<Vec<_>>>()?;
        Ok(KeyValue::compose(values))
    }
}

/// Reference from a subset of this table's fields to another table's
/// candidate key
#[derive(Debug, Clone)]
pub struct ForeignKey {
    pub name: String,
    /// Components in declaration order, matching the referenced key's order
    pub components: Vec<KeyComponent>,
    pub referenced_table: String,
    /// Candidate key name; `None` means the primary key
    pub referenced_key: Option<String>,
}

impl ForeignKey {
    pub fn new(
        name: impl Into<String>,
        components: Vec<KeyComponent>,
        referenced_table: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            components,
            referenced_table: referenced_table.into(),
            referenced_key: None,
        }
    }

    pub fn with_referenced_key(mut self, key: impl Into<String>) -> Self {
        self.referenced_key = Some(key.into());
        self
    }

    /// Composite referencing value of `row`, each component coerced into
    /// the type of the matching referenced key field. Null components stay
    /// null so the reference is marked as not checkable.
    pub fn value_of(&self, row: &Row, referenced: &Key) -> Result<KeyValue> {
        if referenced.components.len() != self.components.len() {
            return Err(ArchiveError::metadata(
                self.table_name(),
                format!(
                    "foreign key {} has {} fields but key {} of {} has {}",
                    self.name,
                    self.components.len(),
                    referenced.name,
                    self.referenced_table,
                    referenced.components.len()
                ),
            ));
        }
        let values = self
            .components
            .iter()
            .zip(&referenced.components)
            .map(|(c, r)| {
                let target = FieldType {
                    nullable: true,
                    ..r.field.target_type
                };
                c.value_in(row, target)
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(KeyValue::compose(values))
    }

    fn table_name(&self) -> &str {
        self.components
            .first()
            .map(|c| c.field.table.as_str())
            .unwrap_or_default()
    }
}

/// Where a filter applies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FilterScope {
    /// Drop the whole record
    #[default]
    Record,
    /// Null out the matching value
    Field,
}

/// Exclusion predicate on a field's source text
#[derive(Debug, Clone)]
pub struct Filter {
    pub field: Arc<Field>,
    pub pattern: Regex,
    pub scope: FilterScope,
}

impl Filter {
    pub fn matches(&self, data: &DataObject) -> bool {
        let text = data.source_value().to_invariant_string().unwrap_or_default();
        self.pattern.is_match(&text)
    }
}

/// Document associated with a table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub name: String,
    pub file: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// An ordered, named collection of fields with its keys
#[derive(Debug, Clone)]
pub struct Table {
    pub name: String,
    pub target_name: String,
    pub description: Option<String>,
    pub fields: Vec<Arc<Field>>,
    pub candidate_keys: Vec<Key>,
    /// Index into `candidate_keys`
    pub primary_key: Option<usize>,
    pub foreign_keys: Vec<ForeignKey>,
    pub filters: Vec<Filter>,
    pub documents: Vec<Document>,
}

impl Table {
    /// Create a table, assigning field positions and owner name
    pub fn new(name: impl Into<String>, fields: Vec<Field>) -> Self {
        let name = name.into();
        let fields = fields
            .into_iter()
            .enumerate()
            .map(|(position, mut field)| {
                field.position = position;
                field.table = name.clone();
                Arc::new(field)
            })
            .collect();
        Self {
            target_name: name.clone(),
            name,
            description: None,
            fields,
            candidate_keys: Vec::new(),
            primary_key: None,
            foreign_keys: Vec::new(),
            filters: Vec::new(),
            documents: Vec::new(),
        }
    }

    pub fn with_target_name(mut self, target_name: impl Into<String>) -> Self {
        self.target_name = target_name.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Field by name, case-insensitive
    pub fn field(&self, name: &str) -> Option<&Arc<Field>> {
        self.fields.iter().find(|f| f.name.eq_ignore_ascii_case(name))
    }

    /// Build a key from field names, failing on unknown fields
    pub fn build_key(&self, name: &str, fields: &[(&str, Option<Arc<Map>>)]) -> Result<Key> {
        Ok(Key::new(name, self.build_components(name, fields)?))
    }

    /// Build foreign key components in declaration order
    pub fn build_components(
        &self,
        key: &str,
        fields: &[(&str, Option<Arc<Map>>)],
    ) -> Result<Vec<KeyComponent>> {
        if fields.is_empty() {
            return Err(ArchiveError::metadata(
                &self.name,
                format!("key {key} has no fields"),
            ));
        }
        fields
            .iter()
            .map(|(field_name, map)| {
                let field = self.field(field_name).ok_or_else(|| {
                    ArchiveError::metadata(
                        &self.name,
                        format!("key {key} references unknown field {field_name}"),
                    )
                })?;
                let component = KeyComponent::new(Arc::clone(field));
                Ok(match map {
                    Some(map) => component.with_map(Arc::clone(map)),
                    None => component,
                })
            })
            .collect()
    }

    pub fn add_candidate_key(&mut self, key: Key, primary: bool) -> Result<()> {
        if self.candidate_key(&key.name).is_some() {
            return Err(ArchiveError::metadata(
                &self.name,
                format!("duplicate candidate key {}", key.name),
            ));
        }
        if primary {
            if self.primary_key.is_some() {
                return Err(ArchiveError::metadata(
                    &self.name,
                    "more than one primary key",
                ));
            }
            self.primary_key = Some(self.candidate_keys.len());
        }
        self.candidate_keys.push(key);
        Ok(())
    }

    pub fn primary_key(&self) -> Option<&Key> {
        self.primary_key.and_then(|i| self.candidate_keys.get(i))
    }

    /// Candidate key by name, case-insensitive
    pub fn candidate_key(&self, name: &str) -> Option<&Key> {
        self.candidate_keys
            .iter()
            .find(|k| k.name.eq_ignore_ascii_case(name))
    }

    /// The key a foreign key points at: the named candidate key, else the
    /// primary key
    pub fn referenced_key(&self, name: Option<&str>) -> Option<&Key> {
        match name {
            Some(name) => self.candidate_key(name),
            None => self.primary_key(),
        }
    }

    pub fn with_foreign_key(mut self, foreign_key: ForeignKey) -> Self {
        self.foreign_keys.push(foreign_key);
        self
    }

    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn with_document(mut self, document: Document) -> Self {
        self.documents.push(document);
        self
    }

    /// Characters one legacy record occupies
    pub fn record_length(&self) -> usize {
        self.fields.iter().map(|f| f.source_length).sum()
    }
}

/// All tables of one conversion run plus the named maps they share
#[derive(Debug, Clone, Default)]
pub struct Schema {
    pub name: String,
    tables: Vec<Arc<Table>>,
    maps: HashMap<String, Arc<Map>>,
}

impl Schema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn add_map(&mut self, map: Map) -> Result<Arc<Map>> {
        let key = map.name().to_lowercase();
        if self.maps.contains_key(&key) {
            return Err(ArchiveError::schema(format!(
                "duplicate map {}",
                map.name()
            )));
        }
        let map = Arc::new(map);
        self.maps.insert(key, Arc::clone(&map));
        Ok(map)
    }

    /// Map by name, case-insensitive
    pub fn map(&self, name: &str) -> Option<&Arc<Map>> {
        self.maps.get(&name.to_lowercase())
    }

    pub fn add_table(&mut self, table: Table) -> Result<Arc<Table>> {
        if self.table(&table.name).is_some() {
            return Err(ArchiveError::metadata(&table.name, "duplicate table"));
        }
        let table = Arc::new(table);
        self.tables.push(Arc::clone(&table));
        Ok(table)
    }

    /// Table by name, case-insensitive
    pub fn table(&self, name: &str) -> Option<&Arc<Table>> {
        self.tables.iter().find(|t| t.name.eq_ignore_ascii_case(name))
    }

    /// One-based ordinal of a table in schema order, used for archive
    /// folder names
    pub fn ordinal(&self, name: &str) -> Option<usize> {
        self.tables
            .iter()
            .position(|t| t.name.eq_ignore_ascii_case(name))
            .map(|i| i + 1)
    }

    pub fn tables(&self) -> &[Arc<Table>] {
        &self.tables
    }
}
