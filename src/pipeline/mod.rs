//! Conversion orchestration
//!
//! [`Converter`] drives every selected table through
//! read → validate → write. Tables run on a bounded rayon pool; within a
//! table, batches are handled strictly in the order the repository
//! delivers them.
//!
//! Continuable failures (validation, mapping, conversion) are offered to
//! the [`ConversionObserver`] first. Unhandled ones count against the
//! warning tolerance: a validation-only run accepts up to
//! `max_warnings` per table, a writing run accepts none. Any other error
//! stops the table and, unless the observer handles it, the whole run.

mod report;

pub use report::{ConversionReport, TableReport, TableStatus};

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use rayon::prelude::*;
use tracing::{debug, error, info, info_span, warn};
use uuid::Uuid;

use crate::archive::{ArchiveLayout, FileIndex, TableIndex, TableIndexEntry, TableWriter};
use crate::config::RunOptions;
use crate::error::{ArchiveError, Result};
use crate::models::{Batch, Schema, Table};
use crate::repository::{DataHandler, DataRepository};
use crate::validation::{
    ForeignKeyValidator, MetadataValidator, TableBatches, ValidationCommand, ValidationEvent,
    Validators,
};

/// Warning messages kept per table in the report
const MAX_REPORTED_WARNINGS: usize = 100;

/// Callbacks raised during a conversion run
pub trait ConversionObserver: Send + Sync {
    /// A repository instance was cloned for `table`
    fn on_clone(&self, _table: &str, _repository: &dyn DataRepository) {}

    /// A validator finished a pass over a batch
    fn on_validation(&self, _event: &ValidationEvent) {}

    /// Offered every failure before the run reacts to it, together with
    /// the table and the offending data. Returning `true` continues: a
    /// continuable failure is then not counted against the tolerance, a
    /// fatal one only stops its own table.
    fn handle_error(
        &self,
        _error: &ArchiveError,
        _table: &Table,
        _data: FailedData<'_>,
    ) -> bool {
        false
    }
}

/// The data a failure was raised for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FailedData<'a> {
    /// Stream ordinal of the offending row
    pub row: Option<u64>,
    /// Offending value as text
    pub value: Option<&'a str>,
}

impl<'a> FailedData<'a> {
    pub fn of(error: &'a ArchiveError) -> Self {
        Self {
            row: error.row(),
            value: error.value(),
        }
    }
}

/// Observer that handles nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl ConversionObserver for NoopObserver {}

/// Converts the tables of a schema from a repository into an archive
/// package
pub struct Converter {
    schema: Arc<Schema>,
    repository: Box<dyn DataRepository>,
    output: PathBuf,
    options: RunOptions,
    observer: Arc<dyn ConversionObserver>,
}

impl Converter {
    /// Create a converter. The repository's own batch size applies; set it
    /// from [`RunOptions::batch_size`] when building the repository.
    pub fn new(
        schema: Arc<Schema>,
        repository: Box<dyn DataRepository>,
        output: impl Into<PathBuf>,
        options: RunOptions,
    ) -> Result<Self> {
        options.validate()?;
        Ok(Self {
            schema,
            repository,
            output: output.into(),
            options,
            observer: Arc::new(NoopObserver),
        })
    }

    pub fn with_observer(mut self, observer: Arc<dyn ConversionObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    /// Package id from the options, else a name-based UUID of the schema
    /// and its tables
    pub fn package_id(&self) -> String {
        if let Some(id) = &self.options.package_id {
            return id.clone();
        }
        let key = std::iter::once(self.schema.name.as_str())
            .chain(self.schema.tables().iter().map(|t| t.name.as_str()))
            .collect::<Vec<_>>()
            .join("/");
        Uuid::new_v5(&Uuid::NAMESPACE_URL, key.as_bytes()).to_string()
    }

    /// Run the conversion.
    ///
    /// Fails only for problems that prevent starting (metadata
    /// inconsistencies, bad options, unwritable output). Per-table outcomes
    /// are in the report; header files are written only when every table
    /// completed.
    pub fn run(&self) -> Result<ConversionReport> {
        let start = Instant::now();
        let package_id = self.package_id();
        let _span = info_span!(
            "conversion_run",
            package_id = %package_id,
            validation_only = self.options.validation_only
        )
        .entered();

        let metadata = MetadataValidator::new().validate(&self.schema).into_result()?;
        for warning in &metadata.warnings {
            warn!(warning = %warning, "Metadata warning");
        }

        let filter = self.options.table_filter_regex()?;
        let selected: Vec<(usize, Arc<Table>)> = metadata
            .processing_order
            .iter()
            .filter(|name| filter.as_ref().is_none_or(|f| f.is_match(name)))
            .filter_map(|name| {
                let ordinal = self.schema.ordinal(name)?;
                let table = self.schema.table(name)?;
                Some((ordinal, Arc::clone(table)))
            })
            .collect();

        info!(
            tables = selected.len(),
            concurrency = self.options.tables_handled_simultaneity,
            "Starting conversion"
        );

        let layout = ArchiveLayout::new(&self.output);
        let file_index = Arc::new(FileIndex::new(&self.output));
        if !self.options.validation_only {
            std::fs::create_dir_all(layout.schema_dir()).map_err(|e| {
                ArchiveError::repository(
                    "create_output",
                    format!("{}: {}", layout.schema_dir().display(), e),
                )
            })?;
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.options.tables_handled_simultaneity)
            .build()
            .map_err(|e| ArchiveError::system(format!("cannot build table pool: {e}")))?;

        let abort = AtomicBool::new(false);
        let tables: Vec<TableReport> = pool.install(|| {
            selected
                .par_iter()
                .map(|(ordinal, table)| {
                    self.convert_table(table, *ordinal, &layout, &file_index, &abort)
                })
                .collect()
        });

        let mut report = ConversionReport {
            package_id,
            schema: self.schema.name.clone(),
            output: (!self.options.validation_only).then(|| self.output.clone()),
            validation_only: self.options.validation_only,
            processing_order: metadata.processing_order,
            metadata_warnings: metadata.warnings,
            tables,
            headers_written: false,
            duration_ms: 0,
        };

        if !self.options.validation_only && report.is_success() {
            self.write_headers(&report, &layout, &file_index)?;
            report.headers_written = true;
        }
        report.duration_ms = start.elapsed().as_millis() as u64;

        info!(
            succeeded = report.is_success(),
            warnings = report.total_warnings(),
            duration_ms = report.duration_ms,
            "Conversion finished"
        );
        Ok(report)
    }

    fn convert_table(
        &self,
        table: &Arc<Table>,
        ordinal: usize,
        layout: &ArchiveLayout,
        file_index: &Arc<FileIndex>,
        abort: &AtomicBool,
    ) -> TableReport {
        let _span = info_span!("table_conversion", table = %table.name, ordinal).entered();
        let start = Instant::now();
        let mut report = TableReport::new(&table.name, ordinal);

        if abort.load(Ordering::SeqCst) {
            report.status = TableStatus::Cancelled;
            return report;
        }

        let mut run = match self.prepare(table, ordinal, layout, file_index, abort) {
            Ok(run) => run,
            Err(e) => {
                self.fail(&mut report, table, e, abort);
                return report;
            }
        };

        let result = self
            .repository_for(table)
            .data_get_from_table(table, Some(&mut run));

        report.rows_read = run.rows_read;
        report.rows_removed = run.rows_removed;
        report.warnings = run.warnings;
        report.messages = std::mem::take(&mut run.messages);

        let outcome = result.and_then(|summary| {
            report.rows_filtered = summary.filtered;
            match run.writer.take() {
                Some(writer) => {
                    let archive = writer.finish()?;
                    report.rows_written = archive.rows;
                    report.folder = Some(archive.folder);
                    Ok(TableStatus::Completed)
                }
                None => Ok(TableStatus::Validated),
            }
        });

        match outcome {
            Ok(status) => report.status = status,
            Err(e) => {
                if let Some(writer) = run.writer.take()
                    && let Err(discard) = writer.discard()
                {
                    warn!(error = %discard, "Could not remove partial table output");
                }
                if run.cancelled {
                    report.status = TableStatus::Cancelled;
                } else {
                    self.fail(&mut report, table, e, abort);
                }
            }
        }

        report.duration_ms = start.elapsed().as_millis() as u64;
        info!(
            status = ?report.status,
            rows = report.rows_read,
            written = report.rows_written,
            warnings = report.warnings,
            "Table finished"
        );
        report
    }

    fn prepare<'a>(
        &'a self,
        table: &Arc<Table>,
        ordinal: usize,
        layout: &ArchiveLayout,
        file_index: &Arc<FileIndex>,
        abort: &'a AtomicBool,
    ) -> Result<TableRun<'a>> {
        let foreign_key = ForeignKeyValidator::new(
            self.repository_for(table),
            self.options.number_of_foreign_tables_to_cache,
        );
        let observer = Arc::clone(&self.observer);
        let validators = Validators::standard(foreign_key)
            .with_listener(Arc::new(move |event: &ValidationEvent| observer.on_validation(event)));

        let writer = if self.options.validation_only {
            None
        } else {
            Some(TableWriter::create(
                layout,
                Arc::clone(table),
                ordinal,
                &self.options.namespace_base,
                Arc::clone(file_index),
            )?)
        };

        Ok(TableRun {
            table: Arc::clone(table),
            command: ValidationCommand::from_options(Arc::clone(&self.schema), &self.options),
            validators,
            writer,
            options: &self.options,
            observer: self.observer.as_ref(),
            abort,
            rows_read: 0,
            rows_removed: 0,
            warnings: 0,
            messages: Vec::new(),
            cancelled: false,
        })
    }

    /// Independent repository instance for one table's work
    fn repository_for(&self, table: &Table) -> Box<dyn DataRepository> {
        let repository = self.repository.clone_repository();
        debug!(table = %table.name, repository = repository.name(), "Cloned repository");
        self.observer.on_clone(&table.name, repository.as_ref());
        repository
    }

    fn fail(&self, report: &mut TableReport, table: &Table, e: ArchiveError, abort: &AtomicBool) {
        error!(table = %table.name, kind = %e.kind(), error = %e, "Table conversion failed");
        let handled = !matches!(e, ArchiveError::Aborted { .. })
            && e.kind() != crate::error::ErrorKind::System
            && self.observer.handle_error(&e, table, FailedData::of(&e));
        if !handled {
            abort.store(true, Ordering::SeqCst);
        }
        report.status = TableStatus::Failed;
        report.error = Some(e.to_string());
    }

    fn write_headers(
        &self,
        report: &ConversionReport,
        layout: &ArchiveLayout,
        file_index: &FileIndex,
    ) -> Result<()> {
        let mut index = TableIndex::new(&report.package_id, &self.schema.name);
        for table_report in &report.tables {
            if let Some(table) = self.schema.table(&table_report.table) {
                index.push(TableIndexEntry::from_table(
                    table,
                    table_report.ordinal,
                    table_report.rows_written,
                ));
            }
        }
        index.write(&layout.table_index())?;
        file_index.register(&layout.table_index())?;
        file_index.write(&layout.file_index())?;
        info!(
            files = file_index.len()?,
            path = %layout.header_dir().display(),
            "Wrote package headers"
        );
        Ok(())
    }
}

/// State of one table's read → validate → write pass
struct TableRun<'a> {
    table: Arc<Table>,
    command: ValidationCommand,
    validators: Validators,
    writer: Option<TableWriter>,
    options: &'a RunOptions,
    observer: &'a dyn ConversionObserver,
    abort: &'a AtomicBool,
    rows_read: u64,
    rows_removed: u64,
    warnings: u64,
    messages: Vec<String>,
    cancelled: bool,
}

impl TableRun<'_> {
    fn tolerate(&mut self, failure: ArchiveError) -> Result<()> {
        warn!(kind = %failure.kind(), error = %failure, "Validation warning");
        if self
            .observer
            .handle_error(&failure, &self.table, FailedData::of(&failure))
        {
            return Ok(());
        }
        self.warnings += 1;
        if self.messages.len() < MAX_REPORTED_WARNINGS {
            self.messages.push(failure.to_string());
        }
        if self.options.validation_only && self.warnings <= self.options.max_warnings as u64 {
            return Ok(());
        }
        let reason = if self.options.validation_only {
            format!(
                "{} warnings exceed the tolerance of {}; last: {}",
                self.warnings, self.options.max_warnings, failure
            )
        } else {
            format!("unhandled warning while writing: {failure}")
        };
        Err(ArchiveError::Aborted {
            table: self.table.name.clone(),
            reason,
        })
    }
}

impl DataHandler for TableRun<'_> {
    fn handle_data(&mut self, batch: Batch) -> Result<()> {
        if self.abort.load(Ordering::SeqCst) {
            self.cancelled = true;
            return Err(ArchiveError::Aborted {
                table: self.table.name.clone(),
                reason: "run aborted by another table".to_string(),
            });
        }

        let Batch {
            table,
            block,
            rows,
            end_of_data,
        } = batch;
        let received = rows.len() as u64;
        self.rows_read += received;

        let mut batches = TableBatches::new();
        batches.insert(table.name.clone(), rows);
        let failures = self
            .validators
            .validate(&table, &mut batches, end_of_data, &self.command)?;
        for failure in failures {
            self.tolerate(failure)?;
        }

        let rows = batches.remove(&table.name).unwrap_or_default();
        self.rows_removed += received - rows.len() as u64;
        if let Some(writer) = self.writer.as_mut() {
            writer.write_batch(&rows)?;
        }
        debug!(block, rows = rows.len(), end_of_data, "Batch handled");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DataType, Field, FieldType, ForeignKey, Value};
    use crate::repository::MemoryRepository;
    use std::sync::Mutex;
    use tempfile::TempDir;

    fn schema() -> Arc<Schema> {
        let mut schema = Schema::new("demo");
        let mut sag = Table::new(
            "SAG",
            vec![
                Field::new("SAG", "ID", FieldType::new(DataType::Int), 4),
                Field::new("SAG", "TITEL", FieldType::nullable(DataType::String), 20),
            ],
        );
        let key = sag.build_key("pk_sag", &[("ID", None)]).unwrap();
        sag.add_candidate_key(key, true).unwrap();
        schema.add_table(sag).unwrap();

        let mut akt = Table::new(
            "AKT",
            vec![
                Field::new("AKT", "ID", FieldType::new(DataType::Int), 4),
                Field::new("AKT", "SAG_ID", FieldType::nullable(DataType::Int), 4),
            ],
        );
        let key = akt.build_key("pk_akt", &[("ID", None)]).unwrap();
        akt.add_candidate_key(key, true).unwrap();
        let components = akt.build_components("fk_sag", &[("SAG_ID", None)]).unwrap();
        let akt = akt.with_foreign_key(ForeignKey::new("fk_sag", components, "SAG"));
        schema.add_table(akt).unwrap();
        Arc::new(schema)
    }

    fn repository(akt_ref: i32) -> MemoryRepository {
        MemoryRepository::new()
            .with_rows(
                "SAG",
                vec![
                    vec![Value::Int(1), Value::from("Første")],
                    vec![Value::Int(2), Value::Null],
                ],
            )
            .with_rows(
                "AKT",
                vec![
                    vec![Value::Int(10), Value::Int(1)],
                    vec![Value::Int(11), Value::Int(akt_ref)],
                ],
            )
    }

    #[test]
    fn test_converts_and_writes_headers() {
        let dir = TempDir::new().unwrap();
        let converter = Converter::new(
            schema(),
            Box::new(repository(2)),
            dir.path(),
            RunOptions::default().with_package_id("pkg"),
        )
        .unwrap();
        let report = converter.run().unwrap();

        assert!(report.is_success(), "{report:?}");
        assert!(report.headers_written);
        assert_eq!(report.processing_order, vec!["SAG", "AKT"]);
        assert_eq!(report.table("AKT").unwrap().rows_written, 2);
        let layout = ArchiveLayout::new(dir.path());
        assert!(layout.table_xml(1).is_file());
        assert!(layout.table_xsd(2).is_file());
        assert!(layout.table_index().is_file());
        let files = std::fs::read_to_string(layout.file_index()).unwrap();
        assert!(files.contains("content/schema0/table2/table2.xml"));
        assert!(files.contains("header/tableIndex.xml"));
    }

    #[test]
    fn test_warning_is_fatal_when_writing() {
        let dir = TempDir::new().unwrap();
        let converter =
            Converter::new(schema(), Box::new(repository(4)), dir.path(), RunOptions::default())
                .unwrap();
        let report = converter.run().unwrap();

        assert!(!report.is_success());
        assert!(!report.headers_written);
        let akt = report.table("AKT").unwrap();
        assert_eq!(akt.status, TableStatus::Failed);
        assert_eq!(akt.warnings, 1);
        assert!(!ArchiveLayout::new(dir.path()).table_dir(2).exists());
    }

    #[test]
    fn test_validation_only_tolerates_warnings() {
        let dir = TempDir::new().unwrap();
        let options = RunOptions::default()
            .with_validation_only(true)
            .with_max_warnings(1);
        let converter =
            Converter::new(schema(), Box::new(repository(4)), dir.path(), options).unwrap();
        let report = converter.run().unwrap();

        assert!(report.is_success());
        let akt = report.table("AKT").unwrap();
        assert_eq!(akt.status, TableStatus::Validated);
        assert_eq!(akt.warnings, 1);
        assert!(akt.messages[0].contains("does not exist in SAG"));
        assert!(!ArchiveLayout::new(dir.path()).schema_dir().exists());
    }

    #[derive(Default)]
    struct Recording {
        clones: Mutex<Vec<String>>,
        events: Mutex<usize>,
        handled: Mutex<Vec<(Option<u64>, Option<String>)>>,
    }

    impl ConversionObserver for Recording {
        fn on_clone(&self, table: &str, _repository: &dyn DataRepository) {
            self.clones.lock().unwrap().push(table.to_string());
        }

        fn on_validation(&self, _event: &ValidationEvent) {
            *self.events.lock().unwrap() += 1;
        }

        fn handle_error(
            &self,
            _error: &ArchiveError,
            _table: &Table,
            data: FailedData<'_>,
        ) -> bool {
            self.handled
                .lock()
                .unwrap()
                .push((data.row, data.value.map(str::to_string)));
            true
        }
    }

    #[test]
    fn test_observer_handles_warnings() {
        let dir = TempDir::new().unwrap();
        let observer = Arc::new(Recording::default());
        let options = RunOptions::default()
            .with_table_filter("^akt$")
            .with_remove_missing_relationships(true);
        let converter = Converter::new(schema(), Box::new(repository(4)), dir.path(), options)
            .unwrap()
            .with_observer(observer.clone());
        let report = converter.run().unwrap();

        assert_eq!(report.tables.len(), 1);
        let akt = report.table("AKT").unwrap();
        assert_eq!(akt.status, TableStatus::Completed);
        assert_eq!(akt.warnings, 0);
        assert_eq!(akt.rows_removed, 1);
        assert_eq!(akt.rows_written, 1);
        assert_eq!(observer.clones.lock().unwrap().len(), 2);
        assert!(*observer.events.lock().unwrap() > 0);
        assert_eq!(
            *observer.handled.lock().unwrap(),
            vec![(Some(2), Some("4".to_string()))]
        );
    }

    #[test]
    fn test_package_id_is_stable() {
        let a = Converter::new(
            schema(),
            Box::new(MemoryRepository::new()),
            "out",
            RunOptions::default(),
        )
        .unwrap();
        let b = Converter::new(
            schema(),
            Box::new(MemoryRepository::new()),
            "other",
            RunOptions::default(),
        )
        .unwrap();
        assert_eq!(a.package_id(), b.package_id());
    }
}
