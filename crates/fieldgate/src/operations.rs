//! Filter comparison operations.
//!
//! `FilterOperation` is a single operator as it appears in a request;
//! `FilterOperations` is the bitset a policy grants per field.

use std::fmt;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::schema::FieldType;

/// A single comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOperation {
    Equals,
    NotEquals,
    Contains,
    StartsWith,
    EndsWith,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
    In,
    IsNull,
}

impl FilterOperation {
    /// Every operator, in declaration order.
    pub const ALL: [FilterOperation; 11] = [
        Self::Equals,
        Self::NotEquals,
        Self::Contains,
        Self::StartsWith,
        Self::EndsWith,
        Self::GreaterThan,
        Self::GreaterThanOrEqual,
        Self::LessThan,
        Self::LessThanOrEqual,
        Self::In,
        Self::IsNull,
    ];

    /// Parse an operator name. Accepts snake_case, camelCase and the short
    /// `_filter` forms (`eq`, `ne`, `co`, `sw`, `ew`, `gt`, `ge`, `lt`, `le`).
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        let normalized: String = s
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .map(|c| c.to_ascii_lowercase())
            .collect();
        match normalized.as_str() {
            "equals" | "eq" => Some(Self::Equals),
            "notequals" | "ne" => Some(Self::NotEquals),
            "contains" | "co" => Some(Self::Contains),
            "startswith" | "sw" => Some(Self::StartsWith),
            "endswith" | "ew" => Some(Self::EndsWith),
            "greaterthan" | "gt" => Some(Self::GreaterThan),
            "greaterthanorequal" | "ge" => Some(Self::GreaterThanOrEqual),
            "lessthan" | "lt" => Some(Self::LessThan),
            "lessthanorequal" | "le" => Some(Self::LessThanOrEqual),
            "in" => Some(Self::In),
            "isnull" => Some(Self::IsNull),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Equals => "equals",
            Self::NotEquals => "not_equals",
            Self::Contains => "contains",
            Self::StartsWith => "starts_with",
            Self::EndsWith => "ends_with",
            Self::GreaterThan => "greater_than",
            Self::GreaterThanOrEqual => "greater_than_or_equal",
            Self::LessThan => "less_than",
            Self::LessThanOrEqual => "less_than_or_equal",
            Self::In => "in",
            Self::IsNull => "is_null",
        }
    }

    /// The bit this operator occupies in a [`FilterOperations`] set.
    pub fn flag(self) -> FilterOperations {
        match self {
            Self::Equals => FilterOperations::EQUALS,
            Self::NotEquals => FilterOperations::NOT_EQUALS,
            Self::Contains => FilterOperations::CONTAINS,
            Self::StartsWith => FilterOperations::STARTS_WITH,
            Self::EndsWith => FilterOperations::ENDS_WITH,
            Self::GreaterThan => FilterOperations::GREATER_THAN,
            Self::GreaterThanOrEqual => FilterOperations::GREATER_THAN_OR_EQUAL,
            Self::LessThan => FilterOperations::LESS_THAN,
            Self::LessThanOrEqual => FilterOperations::LESS_THAN_OR_EQUAL,
            Self::In => FilterOperations::IN,
            Self::IsNull => FilterOperations::IS_NULL,
        }
    }

    /// Operators that take a string operand.
    pub fn is_text(self) -> bool {
        matches!(self, Self::Contains | Self::StartsWith | Self::EndsWith)
    }

    /// Operators that order their operands.
    pub fn is_range(self) -> bool {
        matches!(
            self,
            Self::GreaterThan | Self::GreaterThanOrEqual | Self::LessThan | Self::LessThanOrEqual
        )
    }
}

impl fmt::Display for FilterOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

bitflags! {
    /// Set of operators a policy allows on one field.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct FilterOperations: u16 {
        const EQUALS = 1 << 0;
        const NOT_EQUALS = 1 << 1;
        const CONTAINS = 1 << 2;
        const STARTS_WITH = 1 << 3;
        const ENDS_WITH = 1 << 4;
        const GREATER_THAN = 1 << 5;
        const GREATER_THAN_OR_EQUAL = 1 << 6;
        const LESS_THAN = 1 << 7;
        const LESS_THAN_OR_EQUAL = 1 << 8;
        const IN = 1 << 9;
        const IS_NULL = 1 << 10;

        /// Equality, membership and null checks.
        const EQUALITY = Self::EQUALS.bits()
            | Self::NOT_EQUALS.bits()
            | Self::IN.bits()
            | Self::IS_NULL.bits();

        /// Equality plus substring matching.
        const TEXT = Self::EQUALITY.bits()
            | Self::CONTAINS.bits()
            | Self::STARTS_WITH.bits()
            | Self::ENDS_WITH.bits();

        /// Equality plus range comparisons.
        const COMPARISON = Self::EQUALITY.bits()
            | Self::GREATER_THAN.bits()
            | Self::GREATER_THAN_OR_EQUAL.bits()
            | Self::LESS_THAN.bits()
            | Self::LESS_THAN_OR_EQUAL.bits();
    }
}

impl FilterOperations {
    /// Operators granted when a filter is declared without an explicit set.
    pub fn for_type(field_type: FieldType) -> Self {
        match field_type {
            FieldType::String => Self::TEXT,
            FieldType::Integer | FieldType::Decimal | FieldType::Date | FieldType::DateTime => {
                Self::COMPARISON
            }
            FieldType::Boolean | FieldType::Uuid | FieldType::Json => Self::EQUALITY,
        }
    }

    pub fn allows(&self, operation: FilterOperation) -> bool {
        self.contains(operation.flag())
    }

    /// Individual operators in the set, in declaration order.
    pub fn operations(&self) -> Vec<FilterOperation> {
        FilterOperation::ALL
            .into_iter()
            .filter(|op| self.allows(*op))
            .collect()
    }

    /// Operator names in the set, for diagnostics.
    pub fn names(&self) -> Vec<String> {
        self.operations()
            .into_iter()
            .map(|op| op.as_str().to_string())
            .collect()
    }
}

impl Default for FilterOperations {
    fn default() -> Self {
        Self::empty()
    }
}

impl FromIterator<FilterOperation> for FilterOperations {
    fn from_iter<I: IntoIterator<Item = FilterOperation>>(iter: I) -> Self {
        iter.into_iter()
            .fold(Self::empty(), |acc, op| acc | op.flag())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_aliases() {
        assert_eq!(FilterOperation::parse("equals"), Some(FilterOperation::Equals));
        assert_eq!(FilterOperation::parse("StartsWith"), Some(FilterOperation::StartsWith));
        assert_eq!(
            FilterOperation::parse("greater_than_or_equal"),
            Some(FilterOperation::GreaterThanOrEqual)
        );
        assert_eq!(FilterOperation::parse("co"), Some(FilterOperation::Contains));
        assert_eq!(FilterOperation::parse("like"), None);
    }

    #[test]
    fn test_parse_round_trips_display_names() {
        for op in FilterOperation::ALL {
            assert_eq!(FilterOperation::parse(op.as_str()), Some(op));
        }
    }

    #[test]
    fn test_composite_sets() {
        assert!(FilterOperations::TEXT.allows(FilterOperation::Contains));
        assert!(FilterOperations::TEXT.allows(FilterOperation::Equals));
        assert!(!FilterOperations::TEXT.allows(FilterOperation::GreaterThan));
        assert!(FilterOperations::COMPARISON.allows(FilterOperation::LessThanOrEqual));
        assert!(!FilterOperations::EQUALITY.allows(FilterOperation::StartsWith));
    }

    #[test]
    fn test_defaults_per_type() {
        assert_eq!(FilterOperations::for_type(FieldType::String), FilterOperations::TEXT);
        assert_eq!(
            FilterOperations::for_type(FieldType::DateTime),
            FilterOperations::COMPARISON
        );
        assert_eq!(
            FilterOperations::for_type(FieldType::Boolean),
            FilterOperations::EQUALITY
        );
    }

    #[test]
    fn test_names_and_collect() {
        let ops: FilterOperations = [FilterOperation::Contains, FilterOperation::Equals]
            .into_iter()
            .collect();
        assert_eq!(ops.names(), vec!["equals", "contains"]);
        assert!(FilterOperations::default().operations().is_empty());
    }
}
