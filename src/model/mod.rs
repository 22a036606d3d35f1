//! Table metadata loading
//!
//! Builds the [`crate::models::Schema`] a conversion run works on from a
//! YAML description of tables, fields, keys and maps.

pub mod loader;

pub use loader::SchemaLoader;
