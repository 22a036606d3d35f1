//! Models module for the SDK
//!
//! Defines the in-memory description of legacy tables (fields, keys,
//! filters) and the values streamed through a conversion run.

pub mod batch;
pub mod data;
pub mod field;
pub mod table;
pub mod types;

pub use batch::Batch;
pub use data::{DataObject, DocumentData, FieldData, Row};
pub use field::{Field, Functionality};
pub use table::{
    Document, Filter, FilterScope, ForeignKey, KEY_SEPARATOR, Key, KeyComponent, KeyValue,
    Schema, Table,
};
pub use types::{DATE_TIME_FORMAT, DataType, FieldType, Value, format_time_span};
