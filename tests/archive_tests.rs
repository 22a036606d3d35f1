//! Archive package tests

use std::fs;
use std::sync::Arc;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use tempfile::TempDir;

use legacy_archive_sdk::archive::{
    ArchiveLayout, FileIndex, TableArchiveReader, TableWriter, lexical_form, verify_archive,
};
use legacy_archive_sdk::config::{DEFAULT_NAMESPACE_BASE, RunOptions};
use legacy_archive_sdk::models::{DataObject, DataType, Field, FieldType, Row, Table, Value};
use legacy_archive_sdk::repository::{INDEX_FILE_NAME, LegacyRepository};
use legacy_archive_sdk::{ArchiveError, Converter, SchemaLoader, TableStatus};

fn mixed_table() -> Arc<Table> {
    Arc::new(Table::new(
        "MIX",
        vec![
            Field::new("MIX", "ID", FieldType::new(DataType::Int), 4),
            Field::new("MIX", "NAVN", FieldType::nullable(DataType::String), 10),
            Field::new("MIX", "BELOB", FieldType::nullable(DataType::Decimal), 8),
            Field::new("MIX", "DATO", FieldType::nullable(DataType::DateTime), 8),
            Field::new("MIX", "AKTIV", FieldType::new(DataType::Bool), 1),
        ],
    ))
}

fn mixed_rows(table: &Table) -> Vec<Row> {
    let date = NaiveDate::from_ymd_opt(2024, 1, 31)
        .unwrap()
        .and_hms_opt(12, 30, 0)
        .unwrap();
    let values = [
        vec![
            Value::Int(1),
            Value::from("a & <b>"),
            Value::Decimal(Decimal::new(125, 1)),
            Value::DateTime(date),
            Value::Bool(true),
        ],
        vec![
            Value::Int(2),
            Value::Null,
            Value::Null,
            Value::Null,
            Value::Bool(false),
        ],
    ];
    values
        .into_iter()
        .enumerate()
        .map(|(i, row)| {
            Row::new(
                table
                    .fields
                    .iter()
                    .zip(row)
                    .map(|(field, value)| DataObject::field_value(Arc::clone(field), value))
                    .collect(),
            )
            .with_ordinal(i as u64 + 1)
        })
        .collect()
}

mod round_trip_tests {
    use super::*;

    #[test]
    fn test_written_table_reads_back() {
        let dir = TempDir::new().unwrap();
        let layout = ArchiveLayout::new(dir.path());
        let file_index = Arc::new(FileIndex::new(dir.path()));
        let table = mixed_table();
        let rows = mixed_rows(&table);

        let mut writer = TableWriter::create(
            &layout,
            Arc::clone(&table),
            1,
            DEFAULT_NAMESPACE_BASE,
            Arc::clone(&file_index),
        )
        .unwrap();
        writer.write_batch(&rows).unwrap();
        let archive = writer.finish().unwrap();
        assert_eq!(archive.rows, 2);
        assert_eq!(archive.folder, "table1");
        assert_eq!(file_index.len().unwrap(), 2);

        let reader = TableArchiveReader::open(&archive.xsd).unwrap();
        let read = reader.read_rows(&archive.xml).unwrap();
        assert_eq!(read.len(), rows.len());

        for (written, lexical) in rows.iter().zip(&read) {
            let expected: Vec<Option<String>> = written
                .iter()
                .map(|data| lexical_form(&data.target_value().unwrap(), data.field()).unwrap())
                .collect();
            assert_eq!(&expected, lexical);
        }
        assert_eq!(read[0][1].as_deref(), Some("a & <b>"));
        assert_eq!(read[0][2].as_deref(), Some("12.50"));
        assert_eq!(read[1][1], None);
    }

    #[test]
    fn test_discarded_table_leaves_nothing() {
        let dir = TempDir::new().unwrap();
        let layout = ArchiveLayout::new(dir.path());
        let table = mixed_table();
        let mut writer = TableWriter::create(
            &layout,
            Arc::clone(&table),
            3,
            DEFAULT_NAMESPACE_BASE,
            Arc::new(FileIndex::new(dir.path())),
        )
        .unwrap();
        writer.write_batch(&mixed_rows(&table)).unwrap();
        writer.discard().unwrap();
        assert!(!layout.table_dir(3).exists());
    }

    #[test]
    fn test_verify_detects_tampered_value() {
        let dir = TempDir::new().unwrap();
        let layout = ArchiveLayout::new(dir.path());
        let table = mixed_table();
        let mut writer = TableWriter::create(
            &layout,
            Arc::clone(&table),
            1,
            DEFAULT_NAMESPACE_BASE,
            Arc::new(FileIndex::new(dir.path())),
        )
        .unwrap();
        writer.write_batch(&mixed_rows(&table)).unwrap();
        let archive = writer.finish().unwrap();

        assert_eq!(verify_archive(dir.path()).unwrap(), vec![("table1".to_string(), 2)]);

        let xml = fs::read_to_string(&archive.xml).unwrap();
        fs::write(&archive.xml, xml.replacen("<c1>1</c1>", "<c1>one</c1>", 1)).unwrap();
        let err = verify_archive(dir.path()).unwrap_err();
        assert!(matches!(err, ArchiveError::Repository { .. }));
        assert!(err.to_string().contains("one"));
    }

    #[test]
    fn test_special_doubles_survive_verification() {
        let dir = TempDir::new().unwrap();
        let layout = ArchiveLayout::new(dir.path());
        let table = Arc::new(Table::new(
            "DBL",
            vec![Field::new("DBL", "MAALING", FieldType::new(DataType::Double), 12)],
        ));
        let rows: Vec<Row> = [f64::INFINITY, f64::NEG_INFINITY, f64::NAN, 1.005]
            .into_iter()
            .enumerate()
            .map(|(i, v)| {
                Row::new(vec![DataObject::field_value(
                    Arc::clone(&table.fields[0]),
                    Value::Double(v),
                )])
                .with_ordinal(i as u64 + 1)
            })
            .collect();

        let mut writer = TableWriter::create(
            &layout,
            Arc::clone(&table),
            1,
            DEFAULT_NAMESPACE_BASE,
            Arc::new(FileIndex::new(dir.path())),
        )
        .unwrap();
        writer.write_batch(&rows).unwrap();
        let archive = writer.finish().unwrap();

        assert_eq!(verify_archive(dir.path()).unwrap(), vec![("table1".to_string(), 4)]);
        let read = TableArchiveReader::open(&archive.xsd)
            .unwrap()
            .read_rows(&archive.xml)
            .unwrap();
        let texts: Vec<Option<&str>> = read.iter().map(|r| r[0].as_deref()).collect();
        assert_eq!(texts[..3], [Some("INF"), Some("-INF"), Some("NaN")]);
    }

    #[test]
    fn test_verify_missing_package() {
        let dir = TempDir::new().unwrap();
        let err = verify_archive(dir.path()).unwrap_err();
        assert!(matches!(err, ArchiveError::PathNotFound(_)));
    }
}

mod conversion_tests {
    use super::*;

    const METADATA: &str = r#"
name: demo
maps:
  - name: status
    entries: { A: Aktiv, L: Lukket }
tables:
  - name: SAG
    fields:
      - { name: ID, source_type: int, source_length: 4 }
      - { name: STATUS, source_type: string, source_length: 1, map: status }
    primary_key: { name: pk_sag, fields: [ID] }
  - name: AKT
    fields:
      - { name: ID, source_type: int, source_length: 4 }
      - { name: SAG_ID, source_type: "int?", source_length: 4 }
    primary_key: { name: pk_akt, fields: [ID] }
    foreign_keys:
      - name: fk_sag
        references: SAG
        fields: [SAG_ID]
"#;

    fn legacy_source(akt: &str) -> TempDir {
        let root = TempDir::new().unwrap();
        let index_dir = root.path().join("ARK01");
        let data_dir = root.path().join("DATA").join("ARK01");
        fs::create_dir_all(&index_dir).unwrap();
        fs::create_dir_all(&data_dir).unwrap();
        fs::write(data_dir.join("SAG.001"), "   1A\r\n   2L").unwrap();
        fs::write(data_dir.join("AKT.001"), akt).unwrap();
        let index = ["SAG.001", "AKT.001"].map(|name| format!("{:<12}{:<8}", name, "DATA"));
        fs::write(index_dir.join(INDEX_FILE_NAME), index.join("\r\n")).unwrap();
        root
    }

    fn converter(source: &TempDir, output: &TempDir, options: RunOptions) -> Converter {
        let schema = SchemaLoader::from_yaml_str(METADATA).unwrap();
        let repository = LegacyRepository::open(source.path())
            .unwrap()
            .with_batch_size(options.batch_size);
        Converter::new(Arc::new(schema), Box::new(repository), output.path(), options).unwrap()
    }

    #[test]
    fn test_converts_and_verifies_package() {
        let source = legacy_source("  10   1\r\n  11   2\r\n  12    ");
        let output = TempDir::new().unwrap();
        let report = converter(&source, &output, RunOptions::new().with_batch_size(2))
            .run()
            .unwrap();

        assert!(report.is_success());
        assert!(report.headers_written);
        assert_eq!(report.processing_order, vec!["SAG", "AKT"]);
        assert_eq!(report.table("akt").unwrap().rows_written, 3);

        let layout = ArchiveLayout::new(output.path());
        assert!(layout.table_index().exists());
        let file_index = fs::read_to_string(layout.file_index()).unwrap();
        assert!(file_index.contains("content/schema0/table1/table1.xml"));
        assert!(file_index.contains("header/tableIndex.xml"));

        let verified = verify_archive(output.path()).unwrap();
        assert_eq!(
            verified,
            vec![("table1".to_string(), 2), ("table2".to_string(), 3)]
        );

        let reader = TableArchiveReader::open(&layout.table_xsd(1)).unwrap();
        let rows = reader.read_rows(&layout.table_xml(1)).unwrap();
        assert_eq!(rows[1][1].as_deref(), Some("Lukket"));
    }

    #[test]
    fn test_dangling_reference_fails_without_headers() {
        let source = legacy_source("  10   1\r\n  11   9");
        let output = TempDir::new().unwrap();
        let report = converter(&source, &output, RunOptions::new()).run().unwrap();

        assert!(!report.is_success());
        assert!(!report.headers_written);
        let akt = report.table("AKT").unwrap();
        assert_eq!(akt.status, TableStatus::Failed);
        assert_eq!(akt.warnings, 1);
        assert!(!ArchiveLayout::new(output.path()).table_index().exists());
    }

    #[test]
    fn test_validation_only_writes_nothing() {
        let source = legacy_source("  10   1\r\n  11   9");
        let output = TempDir::new().unwrap();
        let options = RunOptions::new()
            .with_validation_only(true)
            .with_max_warnings(5);
        let report = converter(&source, &output, options).run().unwrap();

        assert!(report.is_success());
        assert!(report.tables.iter().all(|t| t.status == TableStatus::Validated));
        assert_eq!(report.total_warnings(), 1);
        assert!(!ArchiveLayout::new(output.path()).schema_dir().exists());
    }

    #[test]
    fn test_removal_of_dangling_references() {
        let source = legacy_source("  10   1\r\n  11   9");
        let output = TempDir::new().unwrap();
        let options = RunOptions::new()
            .with_remove_missing_relationships(true)
            .with_table_filter("^akt$");
        let report = converter(&source, &output, options).run().unwrap();

        // Removal still reports the dangling reference as a warning
        let akt = report.table("AKT").unwrap();
        assert_eq!(report.tables.len(), 1);
        assert_eq!(akt.status, TableStatus::Failed);
        assert_eq!(akt.warnings, 1);
    }
}
