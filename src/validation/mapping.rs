//! Surfaces mapping and conversion failures before archival

use std::sync::Arc;

use crate::error::{ArchiveError, Result};
use crate::models::{DataObject, Table};

use super::{TableBatches, ValidationCommand, Validator};

const NAME: &str = "MappingValidator";

/// Forces target-value derivation for every value.
///
/// A value whose derivation fails with a continuable error is reported and
/// pinned to its field's fallback value, so the row can still be archived
/// if the run tolerates the failure.
#[derive(Debug, Default)]
pub struct MappingValidator {
    fallbacks: u64,
}

impl MappingValidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Values replaced by a fallback so far
    pub fn fallbacks(&self) -> u64 {
        self.fallbacks
    }
}

impl Validator for MappingValidator {
    fn name(&self) -> &str {
        NAME
    }

    fn validate(
        &mut self,
        _table: &Arc<Table>,
        batches: &mut TableBatches,
        _end_of_data: bool,
        _command: &ValidationCommand,
    ) -> Result<Vec<ArchiveError>> {
        let mut failures = Vec::new();
        for row in batches.values_mut().flatten() {
            for value in row.values_mut() {
                let DataObject::Field(data) = value else {
                    continue;
                };
                if data.has_fallback() {
                    continue;
                }
                match data.target_value() {
                    Ok(_) => {}
                    Err(e) if e.is_continuable() => {
                        let fallback = data.field().fallback_value();
                        tracing::debug!(
                            table = %data.field().table,
                            field = %data.field().name,
                            fallback = %fallback,
                            "Substituting fallback value"
                        );
                        data.set_fallback(fallback);
                        self.fallbacks += 1;
                        failures.push(e);
                    }
                    Err(e) => return Err(e),
                }
            }
        }
        Ok(failures)
    }
}
