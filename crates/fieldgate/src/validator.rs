//! Validation of caller-supplied filter and order requests.
//!
//! Request field names are untrusted. They are matched case-insensitively
//! against the resolved policy and replaced by the policy's own spelling;
//! only a [`ValidatedField`] can reach an ordering or filter expression.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AccessDenied, FieldUsage, PolicyError, PolicyResult, ensure_present};
use crate::expr::Predicate;
use crate::operations::FilterOperation;
use crate::ordering::{SortDirection, SortKey};
use crate::resolver::ResolvedPolicy;
use crate::schema::FieldType;

/// A field name that has passed policy validation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ValidatedField(String);

impl ValidatedField {
    pub(crate) fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl AsRef<str> for ValidatedField {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ValidatedField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A requested ordering key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub field: String,
    #[serde(default)]
    pub direction: SortDirection,
}

impl OrderRequest {
    pub fn new(field: impl Into<String>, direction: SortDirection) -> Self {
        Self {
            field: field.into(),
            direction,
        }
    }

    pub fn asc(field: impl Into<String>) -> Self {
        Self::new(field, SortDirection::Ascending)
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self::new(field, SortDirection::Descending)
    }

    /// Parse a comma-separated sort expression; a leading `-` sorts
    /// descending (`-Price,Name`).
    pub fn parse(expression: &str) -> PolicyResult<Vec<OrderRequest>> {
        let mut requests = Vec::new();
        for part in expression.split(',') {
            let part = part.trim();
            let request = match part.strip_prefix('-') {
                Some(field) => Self::desc(field.trim()),
                None => Self::asc(part),
            };
            ensure_present("order field", &request.field)?;
            requests.push(request);
        }
        Ok(requests)
    }
}

/// A requested filter condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterRequest {
    pub field: String,
    pub operation: FilterOperation,
    #[serde(default)]
    pub value: Value,
}

impl FilterRequest {
    pub fn new(field: impl Into<String>, operation: FilterOperation, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            operation,
            value: value.into(),
        }
    }
}

/// A filter condition that has passed policy validation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidatedFilter {
    pub field: ValidatedField,
    pub field_type: FieldType,
    pub operation: FilterOperation,
    pub value: Value,
}

impl ValidatedFilter {
    pub fn to_predicate(&self) -> Predicate {
        Predicate::compare(self.field.as_str(), self.operation, self.value.clone())
    }
}

/// Checks requests against a [`ResolvedPolicy`]. Rejects on the first
/// violation.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestValidator;

impl RequestValidator {
    pub fn new() -> Self {
        Self
    }

    /// Check a field against the projection allow-list.
    pub fn validate_field(
        &self,
        resolved: &ResolvedPolicy,
        field: &str,
    ) -> PolicyResult<ValidatedField> {
        ensure_present("field name", field)?;
        resolved.ensure_configured()?;
        let allowed = resolved.field_set();
        match allowed.get(field) {
            Some(canonical) => Ok(ValidatedField::new(canonical)),
            None => Err(field_not_allowed(
                resolved,
                FieldUsage::Projection,
                field,
                allowed.to_vec(),
            )),
        }
    }

    pub fn validate_order(
        &self,
        resolved: &ResolvedPolicy,
        request: &OrderRequest,
    ) -> PolicyResult<SortKey> {
        ensure_present("policy name", &resolved.policy_name)?;
        ensure_present("order field", &request.field)?;
        resolved.ensure_configured()?;
        match resolved.order_by.get(&request.field) {
            Some(canonical) => Ok(SortKey::new(
                ValidatedField::new(canonical),
                request.direction,
            )),
            None => Err(field_not_allowed(
                resolved,
                FieldUsage::OrderBy,
                &request.field,
                resolved.order_by.to_vec(),
            )),
        }
    }

    pub fn validate_orders(
        &self,
        resolved: &ResolvedPolicy,
        requests: &[OrderRequest],
    ) -> PolicyResult<Vec<SortKey>> {
        requests
            .iter()
            .map(|request| self.validate_order(resolved, request))
            .collect()
    }

    pub fn validate_filter(
        &self,
        resolved: &ResolvedPolicy,
        request: &FilterRequest,
    ) -> PolicyResult<ValidatedFilter> {
        ensure_present("policy name", &resolved.policy_name)?;
        ensure_present("filter field", &request.field)?;
        resolved.ensure_configured()?;

        let Some(filter) = resolved.filter(&request.field) else {
            let allowed = resolved
                .filters
                .values()
                .map(|f| f.property_name.clone())
                .collect();
            return Err(field_not_allowed(
                resolved,
                FieldUsage::Filter,
                &request.field,
                allowed,
            ));
        };

        if !filter.allowed_operations.allows(request.operation) {
            return Err(AccessDenied::OperationNotAllowed {
                policy: resolved.policy_name.clone(),
                role: resolved.role.clone(),
                field: filter.property_name.clone(),
                operation: request.operation,
                allowed_operations: filter.allowed_operations.names(),
            }
            .into());
        }

        check_value(
            &filter.property_name,
            filter.property_type,
            request.operation,
            &request.value,
        )?;

        Ok(ValidatedFilter {
            field: ValidatedField::new(filter.property_name.clone()),
            field_type: filter.property_type,
            operation: request.operation,
            value: request.value.clone(),
        })
    }

    pub fn validate_filters(
        &self,
        resolved: &ResolvedPolicy,
        requests: &[FilterRequest],
    ) -> PolicyResult<Vec<ValidatedFilter>> {
        requests
            .iter()
            .map(|request| self.validate_filter(resolved, request))
            .collect()
    }
}

fn field_not_allowed(
    resolved: &ResolvedPolicy,
    usage: FieldUsage,
    field: &str,
    allowed: Vec<String>,
) -> PolicyError {
    AccessDenied::FieldNotAllowed {
        usage,
        policy: resolved.policy_name.clone(),
        role: resolved.role.clone(),
        field: field.to_string(),
        allowed,
    }
    .into()
}

fn check_value(
    field: &str,
    field_type: FieldType,
    operation: FilterOperation,
    value: &Value,
) -> PolicyResult<()> {
    let invalid = |expected: &str| {
        Err(PolicyError::invalid_argument(format!(
            "filter '{operation}' on field '{field}' expects {expected}, got {value}"
        )))
    };

    match operation {
        // A missing operand means "is null".
        FilterOperation::IsNull => match value {
            Value::Bool(_) | Value::Null => Ok(()),
            _ => invalid("a boolean"),
        },
        FilterOperation::In => match value {
            Value::Array(items) if items.iter().all(|item| matches_type(field_type, item)) => {
                Ok(())
            }
            Value::Array(_) => invalid(&format!("an array of {} values", field_type.as_str())),
            _ => invalid("an array"),
        },
        op if op.is_text() => match value {
            Value::String(_) => Ok(()),
            _ => invalid("a string"),
        },
        op if op.is_range() && value.is_null() => invalid("a value"),
        _ if matches_type(field_type, value) => Ok(()),
        _ => invalid(&format!("a {} value", field_type.as_str())),
    }
}

/// `null` matches every type.
fn matches_type(field_type: FieldType, value: &Value) -> bool {
    match (field_type, value) {
        (_, Value::Null) | (FieldType::Json, _) => true,
        (FieldType::String | FieldType::Date | FieldType::DateTime | FieldType::Uuid, v) => {
            v.is_string()
        }
        (FieldType::Integer, v) => v.is_i64() || v.is_u64(),
        (FieldType::Decimal, v) => v.is_number(),
        (FieldType::Boolean, v) => v.is_boolean(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::FieldSet;
    use crate::operations::FilterOperations;
    use crate::policy::FilterPolicy;
    use indexmap::IndexMap;
    use serde_json::json;

    fn resolved() -> ResolvedPolicy {
        let mut filters = IndexMap::new();
        for (name, field_type) in [("Name", FieldType::String), ("Price", FieldType::Decimal)] {
            filters.insert(
                name.to_ascii_lowercase(),
                FilterPolicy {
                    property_name: name.to_string(),
                    property_type: field_type,
                    allowed_operations: FilterOperations::for_type(field_type),
                },
            );
        }
        ResolvedPolicy {
            entity_type: "Product".to_string(),
            policy_name: "Public".to_string(),
            role: "Default".to_string(),
            policy_registered: true,
            role_configured: true,
            available_roles: vec!["Default".to_string()],
            fields: ["Id", "Name"].into_iter().collect(),
            nested: Vec::new(),
            order_by: ["Name", "CreatedAt"].into_iter().collect(),
            filters,
            global_exclusions: FieldSet::new(),
            role_exclusions: FieldSet::new(),
        }
    }

    #[test]
    fn test_order_canonicalizes_and_lists_allowed() {
        let validator = RequestValidator::new();
        let resolved = resolved();

        let key = validator
            .validate_order(&resolved, &OrderRequest::desc("name"))
            .unwrap();
        assert_eq!(key.field.as_str(), "Name");
        assert_eq!(key.direction, SortDirection::Descending);

        let err = validator
            .validate_order(&resolved, &OrderRequest::asc("Price"))
            .unwrap_err();
        match err.access_denied() {
            Some(AccessDenied::FieldNotAllowed { usage, allowed, .. }) => {
                assert_eq!(*usage, FieldUsage::OrderBy);
                assert_eq!(allowed, &vec!["Name".to_string(), "CreatedAt".to_string()]);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_filter_distinguishes_field_from_operation() {
        let validator = RequestValidator::new();
        let resolved = resolved();

        let err = validator
            .validate_filter(
                &resolved,
                &FilterRequest::new("Color", FilterOperation::Equals, "Red"),
            )
            .unwrap_err();
        assert!(matches!(
            err.access_denied(),
            Some(AccessDenied::FieldNotAllowed { usage: FieldUsage::Filter, .. })
        ));

        let err = validator
            .validate_filter(
                &resolved,
                &FilterRequest::new("Name", FilterOperation::GreaterThan, "A"),
            )
            .unwrap_err();
        match err.access_denied() {
            Some(AccessDenied::OperationNotAllowed {
                field,
                allowed_operations,
                ..
            }) => {
                assert_eq!(field, "Name");
                assert!(allowed_operations.contains(&"contains".to_string()));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_filter_value_shapes() {
        let validator = RequestValidator::new();
        let resolved = resolved();

        let ok = [
            FilterRequest::new("name", FilterOperation::Contains, "wid"),
            FilterRequest::new("Price", FilterOperation::GreaterThan, 10.5),
            FilterRequest::new("Price", FilterOperation::In, json!([1, 2.5])),
            FilterRequest::new("Price", FilterOperation::IsNull, true),
        ];
        let validated = validator.validate_filters(&resolved, &ok).unwrap();
        assert_eq!(validated[0].field.as_str(), "Name");
        assert_eq!(
            validated[1].to_predicate(),
            Predicate::compare("Price", FilterOperation::GreaterThan, 10.5)
        );

        for bad in [
            FilterRequest::new("Name", FilterOperation::Contains, 3),
            FilterRequest::new("Price", FilterOperation::In, 3),
            FilterRequest::new("Price", FilterOperation::In, json!(["x"])),
            FilterRequest::new("Price", FilterOperation::IsNull, "yes"),
            FilterRequest::new("Price", FilterOperation::Equals, "ten"),
        ] {
            let err = validator.validate_filter(&resolved, &bad).unwrap_err();
            assert!(err.is_invalid_argument(), "{bad:?} gave {err}");
        }
    }

    #[test]
    fn test_unconfigured_role_is_rejected() {
        let mut resolved = resolved();
        resolved.role = "Manager".to_string();
        resolved.role_configured = false;

        let err = RequestValidator::new()
            .validate_order(&resolved, &OrderRequest::asc("Name"))
            .unwrap_err();
        assert!(matches!(
            err.access_denied(),
            Some(AccessDenied::RoleNotConfigured { available_roles, .. })
                if available_roles == &vec!["Default".to_string()]
        ));
    }

    #[test]
    fn test_empty_names_are_invalid() {
        let validator = RequestValidator::new();
        let resolved = resolved();
        assert!(
            validator
                .validate_order(&resolved, &OrderRequest::asc(" "))
                .unwrap_err()
                .is_invalid_argument()
        );
        assert!(OrderRequest::parse("Name,,Price").is_err());
    }

    #[test]
    fn test_parse_sort_expression() {
        let requests = OrderRequest::parse("-Price, Name").unwrap();
        assert_eq!(
            requests,
            vec![OrderRequest::desc("Price"), OrderRequest::asc("Name")]
        );
    }

    #[test]
    fn test_validate_field() {
        let validator = RequestValidator::new();
        let resolved = resolved();
        assert_eq!(validator.validate_field(&resolved, "id").unwrap().as_str(), "Id");
        assert!(validator.validate_field(&resolved, "Secret").unwrap_err().is_access_denied());
    }
}
