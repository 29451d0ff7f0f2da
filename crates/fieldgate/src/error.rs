//! Policy resolution and enforcement error types.
//!
//! Enforcement paths (validation, ordering and filter compilation) always
//! return these errors to the caller. Only the introspection facade swallows
//! them.

use std::fmt;

use serde::Serialize;

use crate::operations::FilterOperation;

/// Which allow-list a rejected field was checked against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldUsage {
    Projection,
    OrderBy,
    Filter,
}

impl fmt::Display for FieldUsage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Projection => "projection",
            Self::OrderBy => "ordering",
            Self::Filter => "filtering",
        })
    }
}

/// A request referenced something the resolved policy does not grant.
///
/// Every variant carries enough context to debug the rejection: the policy,
/// the role, the rejected identifier and what would have been accepted. The
/// accepted lists only echo the policy's own declarations, never data.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AccessDenied {
    /// No policy with this name is registered for the entity type.
    #[error("Access denied: policy '{policy}' is not registered for entity '{entity_type}'")]
    PolicyNotRegistered { entity_type: String, policy: String },

    /// The role has no rules in this policy.
    #[error(
        "Access denied: role '{role}' is not configured in policy '{policy}'. Available roles: [{}]",
        .available_roles.join(", ")
    )]
    RoleNotConfigured {
        policy: String,
        role: String,
        available_roles: Vec<String>,
    },

    /// The field is not in the allow-list for this usage.
    #[error(
        "Access denied: field '{field}' is not allowed for {usage} in policy '{policy}' for role '{role}'. Allowed fields: [{}]",
        .allowed.join(", ")
    )]
    FieldNotAllowed {
        usage: FieldUsage,
        policy: String,
        role: String,
        field: String,
        allowed: Vec<String>,
    },

    /// The field may be filtered on, but not with this operation.
    #[error(
        "Access denied: operation '{operation}' is not allowed on field '{field}' in policy '{policy}' for role '{role}'. Allowed operations: [{}]",
        .allowed_operations.join(", ")
    )]
    OperationNotAllowed {
        policy: String,
        role: String,
        field: String,
        operation: FilterOperation,
        allowed_operations: Vec<String>,
    },
}

/// Errors raised while registering, resolving or enforcing policies.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PolicyError {
    /// A required name was empty or a request value had the wrong shape.
    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    /// No schema is registered for the entity type.
    #[error("Unknown entity type: {entity_type}")]
    UnknownEntity { entity_type: String },

    /// A registration referenced members the schema does not declare.
    #[error("Invalid policy: {message}")]
    InvalidPolicy { message: String },

    /// The registry was sealed; no further registrations are accepted.
    #[error("Policy registry is sealed; registrations are closed")]
    RegistrySealed,

    #[error(transparent)]
    AccessDenied(#[from] AccessDenied),
}

impl PolicyError {
    /// Creates a new `InvalidArgument` error.
    #[must_use]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Creates a new `UnknownEntity` error.
    #[must_use]
    pub fn unknown_entity(entity_type: impl Into<String>) -> Self {
        Self::UnknownEntity {
            entity_type: entity_type.into(),
        }
    }

    /// Creates a new `InvalidPolicy` error.
    #[must_use]
    pub fn invalid_policy(message: impl Into<String>) -> Self {
        Self::InvalidPolicy {
            message: message.into(),
        }
    }

    /// Returns `true` for access-denied failures.
    #[must_use]
    pub fn is_access_denied(&self) -> bool {
        matches!(self, Self::AccessDenied(_))
    }

    /// Returns `true` for invalid-argument failures.
    #[must_use]
    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, Self::InvalidArgument { .. })
    }

    /// The access-denied payload, if this is an access-denied failure.
    #[must_use]
    pub fn access_denied(&self) -> Option<&AccessDenied> {
        match self {
            Self::AccessDenied(denied) => Some(denied),
            _ => None,
        }
    }
}

/// Result type for policy operations.
pub type PolicyResult<T> = Result<T, PolicyError>;

/// Failure of a policy-gated query: either the policy rejected the request
/// or the external executor failed. Executor errors are passed through
/// untouched.
#[derive(Debug, thiserror::Error)]
pub enum QueryError<E>
where
    E: std::error::Error + 'static,
{
    #[error(transparent)]
    Policy(#[from] PolicyError),

    #[error(transparent)]
    Execution(E),
}

/// Fails with `InvalidArgument` when `value` is empty or whitespace.
pub(crate) fn ensure_present(what: &str, value: &str) -> PolicyResult<()> {
    if value.trim().is_empty() {
        return Err(PolicyError::invalid_argument(format!(
            "{what} must not be empty"
        )));
    }
    Ok(())
}
