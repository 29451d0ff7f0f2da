//! Predicate expressions over JSON rows.
//!
//! Predicates express nested `WhereCondition`s and compiled filter
//! requests. They are plain data: the external executor may translate them
//! to its own query language, and [`Predicate::evaluate`] gives the
//! reference semantics used by the in-memory executor.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::field::PATH_SEPARATOR;
use crate::operations::FilterOperation;

/// A boolean expression over the members of a row.
///
/// Serialized untagged so that configuration can spell conditions as
/// `{ field = "Active", op = "equals", value = true }`,
/// `{ all = [...] }`, `{ any = [...] }` or `{ not = {...} }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Predicate {
    Compare {
        field: String,
        op: FilterOperation,
        #[serde(default, skip_serializing_if = "Value::is_null")]
        value: Value,
    },
    And {
        all: Vec<Predicate>,
    },
    Or {
        any: Vec<Predicate>,
    },
    Not {
        not: Box<Predicate>,
    },
}

impl Predicate {
    pub fn compare(field: impl Into<String>, op: FilterOperation, value: impl Into<Value>) -> Self {
        Self::Compare {
            field: field.into(),
            op,
            value: value.into(),
        }
    }

    pub fn equals(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(field, FilterOperation::Equals, value)
    }

    pub fn and(all: Vec<Predicate>) -> Self {
        Self::And { all }
    }

    pub fn or(any: Vec<Predicate>) -> Self {
        Self::Or { any }
    }

    pub fn negate(predicate: Predicate) -> Self {
        Self::Not {
            not: Box::new(predicate),
        }
    }

    /// Every member path the predicate reads.
    pub fn fields(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_fields(&mut out);
        out
    }

    fn collect_fields<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Self::Compare { field, .. } => out.push(field),
            Self::And { all: children } | Self::Or { any: children } => {
                for child in children {
                    child.collect_fields(out);
                }
            }
            Self::Not { not } => not.collect_fields(out),
        }
    }

    /// Evaluate against a row. Missing members read as `null`.
    pub fn evaluate(&self, row: &Value) -> bool {
        match self {
            Self::Compare { field, op, value } => {
                let actual = lookup(row, field).unwrap_or(&Value::Null);
                compare(actual, *op, value)
            }
            Self::And { all } => all.iter().all(|p| p.evaluate(row)),
            Self::Or { any } => any.iter().any(|p| p.evaluate(row)),
            Self::Not { not } => !not.evaluate(row),
        }
    }
}

fn compare(actual: &Value, op: FilterOperation, expected: &Value) -> bool {
    match op {
        FilterOperation::Equals => values_equal(actual, expected),
        FilterOperation::NotEquals => !values_equal(actual, expected),
        FilterOperation::Contains => match (actual, expected) {
            (Value::String(a), Value::String(e)) => a.contains(e.as_str()),
            (Value::Array(items), e) => items.iter().any(|item| values_equal(item, e)),
            _ => false,
        },
        FilterOperation::StartsWith => match (actual, expected) {
            (Value::String(a), Value::String(e)) => a.starts_with(e.as_str()),
            _ => false,
        },
        FilterOperation::EndsWith => match (actual, expected) {
            (Value::String(a), Value::String(e)) => a.ends_with(e.as_str()),
            _ => false,
        },
        FilterOperation::GreaterThan => partial_cmp(actual, expected) == Some(Ordering::Greater),
        FilterOperation::GreaterThanOrEqual => matches!(
            partial_cmp(actual, expected),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        FilterOperation::LessThan => partial_cmp(actual, expected) == Some(Ordering::Less),
        FilterOperation::LessThanOrEqual => matches!(
            partial_cmp(actual, expected),
            Some(Ordering::Less | Ordering::Equal)
        ),
        FilterOperation::In => match expected {
            Value::Array(candidates) => candidates.iter().any(|c| values_equal(actual, c)),
            _ => false,
        },
        FilterOperation::IsNull => {
            let wants_null = expected.as_bool().unwrap_or(true);
            actual.is_null() == wants_null
        }
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

/// Ordering between two values of the same kind; `None` across kinds.
fn partial_cmp(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn kind_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

/// Total order over JSON values used for sorting: `null` first, then by
/// kind, then by value within a kind.
pub(crate) fn total_cmp(a: &Value, b: &Value) -> Ordering {
    match partial_cmp(a, b) {
        Some(ordering) => ordering,
        None => kind_rank(a)
            .cmp(&kind_rank(b))
            .then_with(|| a.to_string().cmp(&b.to_string())),
    }
}

/// Look up a member of an object, exact spelling first, then ignoring case.
pub(crate) fn member<'a>(object: &'a Map<String, Value>, name: &str) -> Option<&'a Value> {
    object.get(name).or_else(|| {
        object
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value)
    })
}

/// Follow a dotted path through nested objects.
pub(crate) fn lookup<'a>(row: &'a Value, path: &str) -> Option<&'a Value> {
    path.split(PATH_SEPARATOR).try_fold(row, |current, segment| match current {
        Value::Object(object) => member(object, segment),
        _ => None,
    })
}
