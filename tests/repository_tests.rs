//! Legacy repository tests

use std::fs;
use std::path::Path;
use std::sync::Arc;

use legacy_archive_sdk::models::{
    Batch, DataType, Field, FieldType, Filter, FilterScope, Functionality, Table, Value,
};
use legacy_archive_sdk::repository::{DataRepository, INDEX_FILE_NAME, LegacyRepository};
use legacy_archive_sdk::{ArchiveError, ErrorKind, Result};
use regex::Regex;
use tempfile::TempDir;

fn entry(name: &str, subdir: &str) -> String {
    format!("{:<12}{:<8}", name, subdir)
}

/// Root with `ARK01/FILMAP.TAB` pointing at `DATA/ARK01/<file>`
fn legacy_root(files: &[(&str, String)]) -> TempDir {
    let root = TempDir::new().unwrap();
    let index_dir = root.path().join("ARK01");
    let data_dir = root.path().join("DATA").join("ARK01");
    fs::create_dir_all(&index_dir).unwrap();
    fs::create_dir_all(&data_dir).unwrap();

    let mut index = Vec::new();
    for (name, content) in files {
        fs::write(data_dir.join(name), content).unwrap();
        index.push(entry(name, "DATA"));
    }
    fs::write(index_dir.join(INDEX_FILE_NAME), index.join("\r\n")).unwrap();
    root
}

fn sag_table() -> Arc<Table> {
    Arc::new(Table::new(
        "SAG",
        vec![
            Field::new("SAG", "ID", FieldType::new(DataType::Int), 4),
            Field::new("SAG", "NAVN", FieldType::new(DataType::String), 10),
            Field::new("SAG", "BELOB", FieldType::nullable(DataType::Decimal), 8),
            Field::new("SAG", "DATO", FieldType::nullable(DataType::DateTime), 8),
        ],
    ))
}

fn sag_records(count: usize) -> String {
    (1..=count)
        .map(|i| format!("{:>4}{:<10}{:>8}{:<8}", i, format!("sag {i}"), "12,50", "20240131"))
        .collect::<Vec<_>>()
        .join("\r\n")
}

fn collect(repository: &dyn DataRepository, table: &Arc<Table>) -> Result<Vec<Batch>> {
    let mut batches = Vec::new();
    let mut handler = |batch: Batch| -> Result<()> {
        batches.push(batch);
        Ok(())
    };
    repository.data_get_from_table(table, Some(&mut handler))?;
    Ok(batches)
}

mod legacy_reader_tests {
    use super::*;

    #[test]
    fn test_eleven_records_give_one_final_batch() {
        let root = legacy_root(&[("SAG.001", sag_records(11))]);
        let repository = LegacyRepository::open(root.path()).unwrap();
        let table = sag_table();

        let batches = collect(&repository, &table).unwrap();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].rows.len(), 11);
        assert!(batches[0].end_of_data);
        assert_eq!(batches[0].block, 1);

        let first = &batches[0].rows[0];
        assert_eq!(first.ordinal(), 1);
        assert_eq!(first.get(0).unwrap().source_value(), Value::Int(1));
        assert_eq!(first.get(1).unwrap().source_value(), Value::from("sag 1"));
        assert_eq!(
            first.get(2).unwrap().source_value(),
            Value::Decimal("12.50".parse().unwrap())
        );
        assert_eq!(
            first.get(3).unwrap().target_value().unwrap().to_invariant_string(),
            Some("2024-01-31T00:00:00".to_string())
        );
    }

    #[test]
    fn test_batches_split_and_finish_with_end_of_data() {
        let root = legacy_root(&[
            ("SAG.001", sag_records(3)),
            ("SAG.002", sag_records(2)),
        ]);
        let repository = LegacyRepository::open(root.path())
            .unwrap()
            .with_batch_size(2);
        let table = sag_table();

        let batches = collect(&repository, &table).unwrap();
        let sizes: Vec<usize> = batches.iter().map(|b| b.rows.len()).collect();
        assert_eq!(sizes, vec![2, 2, 1]);
        assert_eq!(
            batches.iter().map(|b| b.end_of_data).collect::<Vec<_>>(),
            vec![false, false, true]
        );
        let blocks: Vec<u64> = batches.iter().map(|b| b.block).collect();
        assert_eq!(blocks, vec![1, 2, 3]);
    }

    #[test]
    fn test_exact_multiple_sends_empty_final_batch() {
        let root = legacy_root(&[("SAG.001", sag_records(4))]);
        let repository = LegacyRepository::open(root.path())
            .unwrap()
            .with_batch_size(2);
        let batches = collect(&repository, &sag_table()).unwrap();
        assert_eq!(batches.len(), 3);
        assert!(batches[2].rows.is_empty());
        assert!(batches[2].end_of_data);
    }

    #[test]
    fn test_without_handler_counts_and_discards() {
        let root = legacy_root(&[("SAG.001", sag_records(5))]);
        let repository = LegacyRepository::open(root.path())
            .unwrap()
            .with_batch_size(2);
        let summary = repository.data_get_from_table(&sag_table(), None).unwrap();
        assert_eq!(summary.records, 5);
        assert_eq!(summary.rows, 5);
        assert_eq!(summary.blocks, 3);
    }

    #[test]
    fn test_blank_nullable_fields_are_null() {
        let record = format!("{:>4}{:<10}{:8}{:8}", 7, "x", "", "");
        let root = legacy_root(&[("SAG.001", record)]);
        let repository = LegacyRepository::open(root.path()).unwrap();
        let batches = collect(&repository, &sag_table()).unwrap();
        let row = &batches[0].rows[0];
        assert!(row.get(2).unwrap().source_value().is_null());
        assert!(row.get(3).unwrap().source_value().is_null());
    }

    #[test]
    fn test_unparsable_number_is_repository_error() {
        let record = format!("{:>4}{:<10}{:>8}{:<8}", "x1", "bad", "", "");
        let root = legacy_root(&[("SAG.001", record)]);
        let repository = LegacyRepository::open(root.path()).unwrap();
        let err = collect(&repository, &sag_table()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Repository);
        assert!(err.to_string().contains("SAG.ID"));
    }

    #[test]
    fn test_missing_data_directory_fails_indexing() {
        let root = TempDir::new().unwrap();
        let index_dir = root.path().join("ARK01");
        fs::create_dir_all(&index_dir).unwrap();
        fs::write(index_dir.join(INDEX_FILE_NAME), entry("SAG.001", "NOPE")).unwrap();
        let err = LegacyRepository::open(root.path()).unwrap_err();
        assert!(matches!(err, ArchiveError::Repository { .. }));
    }

    #[test]
    fn test_missing_root() {
        let err = LegacyRepository::open(Path::new("/nonexistent/legacy")).unwrap_err();
        assert!(matches!(err, ArchiveError::PathNotFound(_)));
    }
}

mod filter_and_document_tests {
    use super::*;

    #[test]
    fn test_record_and_field_filters() {
        let base = sag_table();
        let table = Arc::new(
            (*base)
                .clone()
                .with_filter(Filter {
                    field: Arc::clone(&base.fields[0]),
                    pattern: Regex::new("^2$").unwrap(),
                    scope: FilterScope::Record,
                })
                .with_filter(Filter {
                    field: Arc::clone(&base.fields[1]),
                    pattern: Regex::new("^sag 3$").unwrap(),
                    scope: FilterScope::Field,
                }),
        );
        let root = legacy_root(&[("SAG.001", sag_records(3))]);
        let repository = LegacyRepository::open(root.path()).unwrap();

        let mut rows = Vec::new();
        let mut handler = |batch: Batch| -> Result<()> {
            rows.extend(batch.rows);
            Ok(())
        };
        let summary = repository
            .data_get_from_table(&table, Some(&mut handler))
            .unwrap();

        assert_eq!(summary.filtered, 1);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].ordinal(), 3);
        assert!(rows[1].get(1).unwrap().source_value().is_null());
    }

    #[test]
    fn test_document_field_resolves_file() {
        let table = Arc::new(Table::new(
            "DOK",
            vec![
                Field::new("DOK", "ID", FieldType::new(DataType::Int), 4),
                Field::new("DOK", "FIL", FieldType::nullable(DataType::String), 12)
                    .with_functionality(Functionality::Document),
            ],
        ));
        let root = legacy_root(&[
            ("DOK.001", format!("{:>4}{:<12}\r\n{:>4}{:<12}", 1, "A.PDF", 2, "MISSING.PDF")),
            ("A.PDF", "pdf".to_string()),
        ]);
        let repository = LegacyRepository::open(root.path()).unwrap();
        let batches = collect(&repository, &table).unwrap();
        let rows = &batches[0].rows;
        assert_eq!(rows.len(), 2);
        assert_eq!(
            rows[0].get(1).unwrap().target_value().unwrap(),
            Value::from("A.PDF")
        );
        assert_eq!(
            rows[1].get(1).unwrap().target_value().unwrap(),
            Value::from("MISSING.PDF")
        );
    }
}

mod clone_tests {
    use super::*;

    #[test]
    fn test_cloned_repository_reads_without_rescan() {
        let root = legacy_root(&[("SAG.001", sag_records(3))]);
        let repository = LegacyRepository::open(root.path()).unwrap();
        let clone = repository.clone_repository();

        // The clone keeps the index even after the index file disappears
        fs::remove_file(root.path().join("ARK01").join(INDEX_FILE_NAME)).unwrap();
        assert_eq!(clone.table_names(), vec!["SAG".to_string()]);
        let batches = collect(clone.as_ref(), &sag_table()).unwrap();
        assert_eq!(batches[0].rows.len(), 3);
    }
}
