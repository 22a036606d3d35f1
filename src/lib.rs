//! Legacy Archive SDK - migrate fixed-width legacy archive tables into
//! schema-validated XML preservation packages
//!
//! Provides:
//! - A typed field/value model with static and regex-based value maps
//! - A reader for legacy table files indexed by `FILMAP.TAB` files
//! - Primary key, foreign key and mapping validation over streamed batches
//! - XSD/XML table output with a package table index and file index
//! - A converter orchestrating all of the above per table

pub mod archive;
pub mod config;
pub mod convert;
pub mod error;
pub mod mapping;
pub mod model;
pub mod models;
pub mod pipeline;
pub mod repository;
pub mod validation;

pub use archive::{ArchiveLayout, FileIndex, TableArchiveReader, TableWriter, verify_archive};
pub use config::RunOptions;
pub use error::{ArchiveError, ErrorKind, Result};
pub use mapping::{DynamicMap, Map, MapError, StaticMap};
pub use model::SchemaLoader;
pub use models::{
    Batch, DataObject, DataType, Field, FieldType, ForeignKey, Key, Row, Schema, Table, Value,
};
pub use pipeline::{
    ConversionObserver, ConversionReport, Converter, FailedData, NoopObserver, TableReport,
    TableStatus,
};
pub use repository::{DataHandler, DataRepository, LegacyRepository, MemoryRepository};
pub use validation::{
    ForeignKeyValidator, MappingValidator, MetadataValidator, PrimaryKeyValidator, Validators,
};
