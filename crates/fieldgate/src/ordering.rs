//! Ordering expressions.
//!
//! Ordering is a two-state pipeline: an [`Unordered`] pipeline accepts only
//! a primary key, and the resulting [`Ordered`] pipeline accepts only
//! secondary keys. Keys are appended in call order and never removed; the
//! first key is primary and each later key breaks ties left by the earlier
//! ones.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{PolicyError, PolicyResult};
use crate::expr::{lookup, total_cmp};
use crate::validator::ValidatedField;

/// Sort direction of one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    #[serde(alias = "asc")]
    Ascending,
    #[serde(alias = "desc")]
    Descending,
}

impl SortDirection {
    pub fn parse(s: &str) -> PolicyResult<Self> {
        match s.to_ascii_lowercase().as_str() {
            "asc" | "ascending" => Ok(Self::Ascending),
            "desc" | "descending" => Ok(Self::Descending),
            other => Err(PolicyError::invalid_argument(format!(
                "unknown sort direction '{other}'; expected 'asc' or 'desc'"
            ))),
        }
    }

    /// Orient an ascending comparison result.
    pub fn apply(self, ordering: Ordering) -> Ordering {
        match self {
            Self::Ascending => ordering,
            Self::Descending => ordering.reverse(),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ascending => "asc",
            Self::Descending => "desc",
        }
    }
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One validated ordering key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SortKey {
    pub field: ValidatedField,
    pub direction: SortDirection,
}

impl SortKey {
    pub fn new(field: ValidatedField, direction: SortDirection) -> Self {
        Self { field, direction }
    }

    /// Compare two rows on this key alone. Missing members sort as `null`,
    /// which precedes every value in ascending order.
    pub fn compare(&self, a: &Value, b: &Value) -> Ordering {
        let left = lookup(a, self.field.as_str()).unwrap_or(&Value::Null);
        let right = lookup(b, self.field.as_str()).unwrap_or(&Value::Null);
        self.direction.apply(total_cmp(left, right))
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.field, self.direction)
    }
}

/// Pipeline state before any key has been applied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Unordered;

impl Unordered {
    /// Apply the primary key.
    pub fn apply_primary(self, key: SortKey) -> Ordered {
        Ordered { keys: vec![key] }
    }
}

/// Pipeline state with at least one key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Ordered {
    keys: Vec<SortKey>,
}

impl Ordered {
    /// Append a secondary key.
    #[must_use]
    pub fn apply_then(mut self, key: SortKey) -> Ordered {
        self.keys.push(key);
        self
    }

    pub fn keys(&self) -> &[SortKey] {
        &self.keys
    }

    pub fn primary(&self) -> &SortKey {
        &self.keys[0]
    }

    /// Compare two rows key by key.
    pub fn compare(&self, a: &Value, b: &Value) -> Ordering {
        self.keys
            .iter()
            .map(|key| key.compare(a, b))
            .find(|ordering| ordering.is_ne())
            .unwrap_or(Ordering::Equal)
    }

    /// Stable sort of `rows`.
    pub fn sort(&self, rows: &mut [Value]) {
        rows.sort_by(|a, b| self.compare(a, b));
    }
}

impl fmt::Display for Ordered {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keys: Vec<String> = self.keys.iter().map(ToString::to_string).collect();
        f.write_str(&keys.join(", "))
    }
}

/// Apply the primary key to an unordered pipeline.
pub fn apply_primary(pipeline: Unordered, key: SortKey) -> Ordered {
    pipeline.apply_primary(key)
}

/// Append a secondary key to an ordered pipeline.
pub fn apply_then(pipeline: Ordered, key: SortKey) -> Ordered {
    pipeline.apply_then(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn key(field: &str, direction: SortDirection) -> SortKey {
        SortKey::new(ValidatedField::new(field), direction)
    }

    #[test]
    fn test_primary_then_secondary() {
        let order = Unordered
            .apply_primary(key("A", SortDirection::Descending))
            .apply_then(key("B", SortDirection::Ascending));

        let mut rows = vec![
            json!({"A": 1, "B": 2}),
            json!({"A": 2, "B": 9}),
            json!({"A": 1, "B": 1}),
            json!({"A": 2, "B": 3}),
        ];
        order.sort(&mut rows);
        assert_eq!(
            rows,
            vec![
                json!({"A": 2, "B": 3}),
                json!({"A": 2, "B": 9}),
                json!({"A": 1, "B": 1}),
                json!({"A": 1, "B": 2}),
            ]
        );
        assert_eq!(order.to_string(), "A desc, B asc");
    }

    #[test]
    fn test_nulls_first_ascending() {
        let order = apply_primary(Unordered, key("Name", SortDirection::Ascending));
        let mut rows = vec![json!({"Name": "b"}), json!({}), json!({"Name": "a"})];
        order.sort(&mut rows);
        assert_eq!(rows, vec![json!({}), json!({"Name": "a"}), json!({"Name": "b"})]);
    }

    #[test]
    fn test_keys_accumulate() {
        let order = apply_then(
            apply_primary(Unordered, key("A", SortDirection::Ascending)),
            key("B", SortDirection::Descending),
        );
        assert_eq!(order.keys().len(), 2);
        assert_eq!(order.primary().field.as_str(), "A");
    }

    #[test]
    fn test_direction_parse() {
        assert_eq!(SortDirection::parse("DESC").unwrap(), SortDirection::Descending);
        assert_eq!(SortDirection::parse("ascending").unwrap(), SortDirection::Ascending);
        assert!(SortDirection::parse("up").unwrap_err().is_invalid_argument());

        let parsed: SortDirection = serde_json::from_str("\"desc\"").unwrap();
        assert_eq!(parsed, SortDirection::Descending);
    }
}
