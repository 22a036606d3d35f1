//! Regex-based mapping

use regex::Regex;

use crate::models::Value;

use super::error::{MapError, MapResult};

/// One pattern and its replacement template
#[derive(Debug, Clone)]
pub struct DynamicRule {
    pub pattern: Regex,
    /// Replacement template; `$1`, `${name}` expand to capture groups
    pub replacement: String,
}

/// Ordered list of regex rules evaluated against the source text.
///
/// The first matching rule wins and its expanded template is the result.
#[derive(Debug, Clone, Default)]
pub struct DynamicMap {
    pub name: String,
    rules: Vec<DynamicRule>,
}

impl DynamicMap {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rules: Vec::new(),
        }
    }

    /// Append a rule, failing if the pattern does not compile
    pub fn with_rule(
        mut self,
        pattern: &str,
        replacement: impl Into<String>,
    ) -> Result<Self, regex::Error> {
        self.push_rule(pattern, replacement)?;
        Ok(self)
    }

    pub fn push_rule(
        &mut self,
        pattern: &str,
        replacement: impl Into<String>,
    ) -> Result<(), regex::Error> {
        self.rules.push(DynamicRule {
            pattern: Regex::new(pattern)?,
            replacement: replacement.into(),
        });
        Ok(())
    }

    pub fn rules(&self) -> &[DynamicRule] {
        &self.rules
    }

    /// Apply the first matching rule to the source's text form
    pub fn apply(&self, source: &Value) -> MapResult<String> {
        let text = source.to_invariant_string().unwrap_or_default();
        for rule in &self.rules {
            if let Some(captures) = rule.pattern.captures(&text) {
                let mut out = String::new();
                captures.expand(&rule.replacement, &mut out);
                return Ok(out);
            }
        }
        Err(MapError::NoMatch {
            map: self.name.clone(),
            value: text,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_match_wins() {
        let map = DynamicMap::new("prefix")
            .with_rule("^A.*", "Alpha")
            .unwrap()
            .with_rule("^AB", "Never")
            .unwrap();
        assert_eq!(map.apply(&Value::from("ABC")).unwrap(), "Alpha");
        assert!(map.apply(&Value::from("ZZZ")).is_err());
    }

    #[test]
    fn test_back_references() {
        let map = DynamicMap::new("date")
            .with_rule(r"^(\d{2})\.(\d{2})\.(\d{4})$", "$3-$2-$1")
            .unwrap();
        assert_eq!(map.apply(&Value::from("24.12.1999")).unwrap(), "1999-12-24");
    }

    #[test]
    fn test_invalid_pattern() {
        assert!(DynamicMap::new("bad").with_rule("(", "x").is_err());
    }
}
