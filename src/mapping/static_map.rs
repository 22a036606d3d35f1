//! Dictionary-based mapping

use std::collections::HashMap;

use crate::models::Value;

use super::error::{MapError, MapResult};

/// Finite dictionary from source value to target text.
///
/// Keys are the invariant text form of the source value; a null source
/// looks up the empty key.
#[derive(Debug, Clone, Default)]
pub struct StaticMap {
    pub name: String,
    entries: HashMap<String, String>,
}

impl StaticMap {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: HashMap::new(),
        }
    }

    pub fn with_entry(mut self, source: impl Into<String>, target: impl Into<String>) -> Self {
        self.insert(source, target);
        self
    }

    pub fn insert(&mut self, source: impl Into<String>, target: impl Into<String>) {
        self.entries.insert(source.into(), target.into());
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up the exact source value
    pub fn lookup(&self, source: &Value) -> MapResult<String> {
        let key = source.to_invariant_string().unwrap_or_default();
        self.entries
            .get(&key)
            .cloned()
            .ok_or_else(|| MapError::NoMatch {
                map: self.name.clone(),
                value: key,
            })
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for StaticMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = StaticMap::default();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}
