//! Primary key uniqueness

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{ArchiveError, Result};
use crate::models::Table;

use super::{TableBatches, ValidationCommand, Validator, row_failure};

const NAME: &str = "PrimaryKeyValidator";

/// Checks that every row's primary key value is unique within its table
/// and has no null components.
///
/// Seen key values are kept per table for the whole run, so results do not
/// depend on how rows are split into batches.
#[derive(Debug, Default)]
pub struct PrimaryKeyValidator {
    /// Table name to composite key text to the ordinal of the first row
    seen: HashMap<String, HashMap<String, u64>>,
}

impl PrimaryKeyValidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Distinct key values recorded for `table`
    pub fn distinct_keys(&self, table: &str) -> usize {
        self.seen.get(table).map(HashMap::len).unwrap_or(0)
    }
}

impl Validator for PrimaryKeyValidator {
    fn name(&self) -> &str {
        NAME
    }

    fn validate(
        &mut self,
        table: &Arc<Table>,
        batches: &mut TableBatches,
        end_of_data: bool,
        command: &ValidationCommand,
    ) -> Result<Vec<ArchiveError>> {
        let mut failures = Vec::new();
        let mut checked = vec![table.name.clone()];

        for (name, rows) in batches.iter() {
            let current = command.resolve(table, name)?;
            let Some(key) = current.primary_key() else {
                continue;
            };
            if !checked.contains(&current.name) {
                checked.push(current.name.clone());
            }
            let seen = self.seen.entry(current.name.clone()).or_default();

            for row in rows {
                let value = match key.value_of(row) {
                    Ok(value) => value,
                    Err(e) if e.is_continuable() => {
                        failures.push(e);
                        continue;
                    }
                    Err(e) => return Err(e),
                };

                if value.has_null && !key.allow_nulls {
                    failures.push(row_failure(
                        &current,
                        NAME,
                        row,
                        Some(value.display()),
                        format!("primary key {} has an empty component", key.name),
                    ));
                    continue;
                }

                if let Some(first) = seen.get(&value.text).copied() {
                    failures.push(row_failure(
                        &current,
                        NAME,
                        row,
                        Some(value.display()),
                        format!(
                            "duplicate primary key {} value '{}', first seen in row {}",
                            key.name,
                            value.display(),
                            first
                        ),
                    ));
                } else {
                    seen.insert(value.text, row.ordinal());
                }
            }
        }

        if end_of_data {
            for name in checked {
                if let Some(seen) = self.seen.remove(&name) {
                    tracing::debug!(
                        table = %name,
                        distinct_keys = seen.len(),
                        "Primary key check complete"
                    );
                }
            }
        }
        Ok(failures)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DataObject, DataType, Field, FieldType, Row, Schema, Value};

    fn setup() -> (Arc<Table>, ValidationCommand) {
        let mut table = Table::new(
            "SAG",
            vec![
                Field::new("SAG", "ID", FieldType::new(DataType::String), 4),
                Field::new("SAG", "TXT", FieldType::nullable(DataType::String), 10),
            ],
        );
        let key = table.build_key("pk_sag", &[("ID", None)]).unwrap();
        table.add_candidate_key(key, true).unwrap();
        let mut schema = Schema::new("t");
        let table = schema.add_table(table).unwrap();
        (table, ValidationCommand::new(Arc::new(schema)))
    }

    fn rows(table: &Table, ids: &[(u64, Value)]) -> Vec<Row> {
        ids.iter()
            .map(|(ordinal, id)| {
                Row::new(vec![
                    DataObject::field_value(Arc::clone(&table.fields[0]), id.clone()),
                    DataObject::field_value(Arc::clone(&table.fields[1]), Value::Null),
                ])
                .with_ordinal(*ordinal)
            })
            .collect()
    }

    #[test]
    fn test_null_component_fails() {
        let (table, command) = setup();
        let mut validator = PrimaryKeyValidator::new();
        let mut batches = TableBatches::new();
        batches.insert("SAG".into(), rows(&table, &[(1, Value::Null), (2, Value::from(" "))]));
        let failures = validator
            .validate(&table, &mut batches, true, &command)
            .unwrap();
        assert_eq!(failures.len(), 2);
        assert!(failures[0].to_string().contains("empty component"));
    }

    #[test]
    fn test_keys_released_at_end_of_data() {
        let (table, command) = setup();
        let mut validator = PrimaryKeyValidator::new();
        let mut batches = TableBatches::new();
        batches.insert("SAG".into(), rows(&table, &[(1, Value::from("A"))]));
        validator.validate(&table, &mut batches, false, &command).unwrap();
        assert_eq!(validator.distinct_keys("SAG"), 1);

        let mut last = TableBatches::new();
        last.insert("SAG".into(), Vec::new());
        validator.validate(&table, &mut last, true, &command).unwrap();
        assert_eq!(validator.distinct_keys("SAG"), 0);
    }

    #[test]
    fn test_keys_of_every_checked_table_released() {
        let (sag, _) = setup();
        let mut akt = Table::new(
            "AKT",
            vec![
                Field::new("AKT", "ID", FieldType::new(DataType::String), 4),
                Field::new("AKT", "TXT", FieldType::nullable(DataType::String), 10),
            ],
        );
        let key = akt.build_key("pk_akt", &[("ID", None)]).unwrap();
        akt.add_candidate_key(key, true).unwrap();
        let mut schema = Schema::new("t");
        let sag = schema.add_table((*sag).clone()).unwrap();
        let akt = schema.add_table(akt).unwrap();
        let command = ValidationCommand::new(Arc::new(schema));

        let mut validator = PrimaryKeyValidator::new();
        let mut batches = TableBatches::new();
        batches.insert("SAG".into(), rows(&sag, &[(1, Value::from("A"))]));
        batches.insert("AKT".into(), rows(&akt, &[(1, Value::from("B"))]));
        validator.validate(&sag, &mut batches, false, &command).unwrap();
        assert_eq!(validator.distinct_keys("AKT"), 1);

        validator.validate(&sag, &mut batches, true, &command).unwrap();
        assert_eq!(validator.distinct_keys("SAG"), 0);
        assert_eq!(validator.distinct_keys("AKT"), 0);
    }

    #[test]
    fn test_null_component_allowed_by_key() {
        let mut table = Table::new(
            "SAG",
            vec![
                Field::new("SAG", "ID", FieldType::nullable(DataType::String), 4),
                Field::new("SAG", "TXT", FieldType::nullable(DataType::String), 10),
            ],
        );
        let key = table
            .build_key("pk_sag", &[("ID", None)])
            .unwrap()
            .with_allow_nulls(true);
        table.add_candidate_key(key, true).unwrap();
        let mut schema = Schema::new("t");
        let table = schema.add_table(table).unwrap();
        let command = ValidationCommand::new(Arc::new(schema));

        let mut batches = TableBatches::new();
        batches.insert("SAG".into(), rows(&table, &[(1, Value::Null), (2, Value::from("A"))]));
        let failures = PrimaryKeyValidator::new()
            .validate(&table, &mut batches, true, &command)
            .unwrap();
        assert!(failures.is_empty());
    }

    #[test]
    fn test_table_without_primary_key_is_skipped() {
        let mut schema = Schema::new("t");
        let table = schema
            .add_table(Table::new(
                "LOG",
                vec![Field::new("LOG", "TXT", FieldType::new(DataType::String), 4)],
            ))
            .unwrap();
        let command = ValidationCommand::new(Arc::new(schema));
        let row = Row::new(vec![DataObject::field_value(
            Arc::clone(&table.fields[0]),
            "x",
        )]);
        let mut batches = TableBatches::new();
        batches.insert("LOG".into(), vec![row.clone(), row]);
        let failures = PrimaryKeyValidator::new()
            .validate(&table, &mut batches, true, &command)
            .unwrap();
        assert!(failures.is_empty());
    }
}
