//! Schema loading functionality
//!
//! Loads table metadata from a YAML document into a [`Schema`]. The
//! document lists shared `maps` and the `tables` with their fields, keys,
//! filters and documents:
//!
//! ```yaml
//! name: demo
//! maps:
//!   - name: status
//!     entries: { A: Active, C: Closed }
//! tables:
//!   - name: SAG
//!     fields:
//!       - { name: ID, source_type: int, source_length: 4 }
//!       - { name: STATUS, source_type: string, source_length: 1, map: status }
//!     primary_key: { name: pk_sag, fields: [ID] }
//! ```

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use regex::Regex;
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{ArchiveError, Result};
use crate::mapping::{DynamicMap, Map, StaticMap};
use crate::models::{
    Document, Field, FieldType, Filter, FilterScope, ForeignKey, Functionality, Key, Schema,
    Table,
};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SchemaDef {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    maps: Vec<MapDef>,
    #[serde(default)]
    tables: Vec<TableDef>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct MapDef {
    name: String,
    #[serde(default)]
    entries: Option<BTreeMap<String, String>>,
    #[serde(default)]
    rules: Option<Vec<RuleDef>>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RuleDef {
    pattern: String,
    replacement: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TableDef {
    name: String,
    #[serde(default)]
    target_name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    fields: Vec<FieldDef>,
    #[serde(default)]
    primary_key: Option<KeyDef>,
    #[serde(default)]
    candidate_keys: Vec<KeyDef>,
    #[serde(default)]
    foreign_keys: Vec<ForeignKeyDef>,
    #[serde(default)]
    filters: Vec<FilterDef>,
    #[serde(default)]
    documents: Vec<Document>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct FieldDef {
    name: String,
    #[serde(default)]
    target_name: Option<String>,
    source_type: FieldType,
    #[serde(default)]
    target_type: Option<FieldType>,
    source_length: usize,
    #[serde(default)]
    target_length: Option<usize>,
    #[serde(default)]
    nullable: Option<bool>,
    #[serde(default)]
    default: Option<String>,
    #[serde(default)]
    map: Option<String>,
    #[serde(default)]
    functionality: Vec<String>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct KeyDef {
    name: String,
    fields: Vec<KeyFieldDef>,
    #[serde(default)]
    allow_nulls: bool,
}

/// A key field, either a bare name or a name plus the map applied to it
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum KeyFieldDef {
    Name(String),
    Mapped {
        field: String,
        #[serde(default)]
        map: Option<String>,
    },
}

impl KeyFieldDef {
    fn parts(&self) -> (&str, Option<&str>) {
        match self {
            KeyFieldDef::Name(name) => (name, None),
            KeyFieldDef::Mapped { field, map } => (field, map.as_deref()),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ForeignKeyDef {
    name: String,
    references: String,
    #[serde(default)]
    referenced_key: Option<String>,
    fields: Vec<KeyFieldDef>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct FilterDef {
    field: String,
    pattern: String,
    #[serde(default)]
    scope: FilterScope,
}

/// Builds a [`Schema`] from YAML table metadata
pub struct SchemaLoader {
    base_dir: Option<PathBuf>,
}

impl SchemaLoader {
    /// Load a metadata file. Relative document paths resolve against the
    /// file's directory.
    pub fn load(path: &Path) -> Result<Schema> {
        if !path.is_file() {
            return Err(ArchiveError::PathNotFound(path.to_path_buf()));
        }
        let content = fs::read_to_string(path)?;
        let loader = SchemaLoader {
            base_dir: path.parent().map(Path::to_path_buf),
        };
        let fallback_name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "schema".to_string());
        let schema = loader.build(serde_yaml::from_str(&content)?, &fallback_name)?;
        info!(
            path = %path.display(),
            tables = schema.tables().len(),
            "Loaded table metadata"
        );
        Ok(schema)
    }

    pub fn from_yaml_str(content: &str) -> Result<Schema> {
        SchemaLoader { base_dir: None }.build(serde_yaml::from_str(content)?, "schema")
    }

    fn build(&self, def: SchemaDef, fallback_name: &str) -> Result<Schema> {
        let mut schema = Schema::new(def.name.unwrap_or_else(|| fallback_name.to_string()));

        for map in def.maps {
            schema.add_map(build_map(map)?)?;
        }
        for table in def.tables {
            let table = self.build_table(&schema, table)?;
            debug!(table = %table.name, fields = table.fields.len(), "Loaded table");
            schema.add_table(table)?;
        }
        Ok(schema)
    }

    fn build_table(&self, schema: &Schema, def: TableDef) -> Result<Table> {
        let mut seen = HashSet::new();
        let mut fields = Vec::with_capacity(def.fields.len());
        let mut field_maps = Vec::new();

        for (position, field) in def.fields.into_iter().enumerate() {
            if !seen.insert(field.name.to_uppercase()) {
                return Err(ArchiveError::metadata(
                    &def.name,
                    format!("duplicate field {}", field.name),
                ));
            }
            if let Some(map) = &field.map {
                field_maps.push((position, lookup_map(schema, &def.name, map)?));
            }
            fields.push(build_field(&def.name, field)?);
        }

        let mut table = Table::new(&def.name, fields);
        for (position, map) in field_maps {
            table.fields[position].assign_map(map)?;
        }
        if let Some(target_name) = def.target_name {
            table = table.with_target_name(target_name);
        }
        if let Some(description) = def.description {
            table = table.with_description(description);
        }

        if let Some(key) = &def.primary_key {
            let key = build_key(schema, &table, &def.name, key)?;
            table.add_candidate_key(key, true)?;
        }
        for key in &def.candidate_keys {
            let key = build_key(schema, &table, &def.name, key)?;
            table.add_candidate_key(key, false)?;
        }

        let mut fk_names = HashSet::new();
        for fk in def.foreign_keys {
            if !fk_names.insert(fk.name.to_uppercase()) {
                return Err(ArchiveError::metadata(
                    &def.name,
                    format!("duplicate foreign key {}", fk.name),
                ));
            }
            let components =
                table.build_components(&fk.name, &key_fields(schema, &def.name, &fk.fields)?)?;
            let mut foreign_key = ForeignKey::new(fk.name, components, fk.references);
            if let Some(key) = fk.referenced_key {
                foreign_key = foreign_key.with_referenced_key(key);
            }
            table = table.with_foreign_key(foreign_key);
        }

        for filter in def.filters {
            let field = table.field(&filter.field).cloned().ok_or_else(|| {
                ArchiveError::metadata(
                    &def.name,
                    format!("filter references unknown field {}", filter.field),
                )
            })?;
            let pattern = Regex::new(&filter.pattern).map_err(|e| {
                ArchiveError::metadata(
                    &def.name,
                    format!("invalid filter pattern on {}: {}", filter.field, e),
                )
            })?;
            table = table.with_filter(Filter {
                field,
                pattern,
                scope: filter.scope,
            });
        }

        for mut document in def.documents {
            if document.file.is_relative()
                && let Some(base) = &self.base_dir
            {
                document.file = base.join(&document.file);
            }
            table = table.with_document(document);
        }

        Ok(table)
    }
}

fn build_map(def: MapDef) -> Result<Map> {
    match (def.entries, def.rules) {
        (Some(entries), None) => {
            let mut map = StaticMap::new(def.name);
            for (source, target) in entries {
                map.insert(source, target);
            }
            Ok(map.into())
        }
        (None, Some(rules)) => {
            let mut map = DynamicMap::new(&def.name);
            for rule in rules {
                map.push_rule(&rule.pattern, rule.replacement).map_err(|e| {
                    ArchiveError::schema(format!(
                        "invalid pattern '{}' in map {}: {}",
                        rule.pattern, def.name, e
                    ))
                })?;
            }
            Ok(map.into())
        }
        _ => Err(ArchiveError::schema(format!(
            "map {} needs exactly one of entries or rules",
            def.name
        ))),
    }
}

fn build_field(table: &str, def: FieldDef) -> Result<Field> {
    let mut field = Field::new(table, &def.name, def.source_type, def.source_length);
    if def.target_name.is_some() || def.target_type.is_some() {
        let target_name = def.target_name.unwrap_or_else(|| def.name.clone());
        field = field.with_target(target_name, def.target_type.unwrap_or(def.source_type));
    }
    if let Some(nullable) = def.nullable {
        field = field.with_nullable(nullable);
    }
    if let Some(default) = def.default {
        field = field.with_default(default);
    }
    for tag in def.functionality {
        let functionality: Functionality = tag
            .parse()
            .map_err(|e: String| ArchiveError::metadata(table, e))?;
        field = field.with_functionality(functionality);
    }
    field.target_length = def.target_length;
    field.description = def.description;
    Ok(field)
}

fn lookup_map(schema: &Schema, table: &str, name: &str) -> Result<Arc<Map>> {
    schema
        .map(name)
        .cloned()
        .ok_or_else(|| ArchiveError::metadata(table, format!("unknown map {name}")))
}

fn build_key(schema: &Schema, table: &Table, table_name: &str, def: &KeyDef) -> Result<Key> {
    let fields = key_fields(schema, table_name, &def.fields)?;
    Ok(table
        .build_key(&def.name, &fields)?
        .with_allow_nulls(def.allow_nulls))
}

fn key_fields<'a>(
    schema: &Schema,
    table: &str,
    fields: &'a [KeyFieldDef],
) -> Result<Vec<(&'a str, Option<Arc<Map>>)>> {
    fields
        .iter()
        .map(|f| {
            let (name, map) = f.parts();
            let map = map.map(|m| lookup_map(schema, table, m)).transpose()?;
            Ok((name, map))
        })
        .collect()
}
