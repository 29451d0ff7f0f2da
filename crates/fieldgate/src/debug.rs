//! Policy introspection for diagnostics and tooling.
//!
//! The inspector never fails. Each part of a [`DebugSnapshot`] is computed
//! on its own, and a part that cannot be computed is reported empty.

use std::fmt;

use serde::Serialize;
use tracing::warn;

use crate::resolver::{PolicyResolver, ResolvedNested};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NestedSnapshot {
    pub navigation: String,
    pub fields: Vec<String>,
    pub has_condition: bool,
    pub max_depth: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FilterSnapshot {
    pub field: String,
    pub field_type: String,
    pub operations: Vec<String>,
}

/// Everything one role may do with one policy, for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DebugSnapshot {
    pub entity_type: String,
    pub policy: String,
    pub role: String,
    pub allowed_fields: Vec<String>,
    pub nested_fields: Vec<NestedSnapshot>,
    pub global_exclusions: Vec<String>,
    pub role_exclusions: Vec<String>,
    pub order_by_fields: Vec<String>,
    pub filters: Vec<FilterSnapshot>,
}

/// A registered policy and its roles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PolicySummary {
    pub entity_type: String,
    pub policy: String,
    pub roles: Vec<String>,
}

fn list(items: &[String]) -> String {
    if items.is_empty() {
        "(none)".to_string()
    } else {
        items.join(", ")
    }
}

impl fmt::Display for DebugSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Policy '{}' for {} (role: {})",
            self.policy, self.entity_type, self.role
        )?;
        writeln!(f, "  Allowed fields: {}", list(&self.allowed_fields))?;
        if self.nested_fields.is_empty() {
            writeln!(f, "  Nested fields: (none)")?;
        } else {
            writeln!(f, "  Nested fields:")?;
            for nested in &self.nested_fields {
                let condition = if nested.has_condition { " [conditional]" } else { "" };
                writeln!(
                    f,
                    "    {}{condition} (max depth {}): {}",
                    nested.navigation,
                    nested.max_depth,
                    list(&nested.fields)
                )?;
            }
        }
        writeln!(f, "  Order by: {}", list(&self.order_by_fields))?;
        if self.filters.is_empty() {
            writeln!(f, "  Filters: (none)")?;
        } else {
            writeln!(f, "  Filters:")?;
            for filter in &self.filters {
                writeln!(
                    f,
                    "    {} ({}): {}",
                    filter.field,
                    filter.field_type,
                    list(&filter.operations)
                )?;
            }
        }
        writeln!(f, "  Global exclusions: {}", list(&self.global_exclusions))?;
        write!(f, "  Role exclusions: {}", list(&self.role_exclusions))
    }
}

/// Read-only view over the registry for diagnostics.
#[derive(Debug, Clone)]
pub struct PolicyInspector {
    resolver: PolicyResolver,
}

impl PolicyInspector {
    pub fn new(resolver: PolicyResolver) -> Self {
        Self { resolver }
    }

    pub fn snapshot(&self, entity_type: &str, policy: &str, role: &str) -> DebugSnapshot {
        let registry_snapshot = self.resolver.registry().snapshot();
        let resolved = match self
            .resolver
            .resolve_in(&registry_snapshot, entity_type, policy, role)
        {
            Ok(resolved) => Some(resolved),
            Err(err) => {
                warn!(
                    entity_type = %entity_type,
                    policy = %policy,
                    role = %role,
                    error = %err,
                    "policy snapshot unavailable; reporting empty parts"
                );
                None
            }
        };
        let resolved = resolved.as_ref();

        let allowed_fields = resolved
            .map(|r| r.field_set().to_vec())
            .unwrap_or_default();
        let global_exclusions = self
            .resolver
            .exclusions()
            .resolve(&registry_snapshot, entity_type)
            .to_vec();
        let order_by_fields = resolved
            .map(|r| r.order_by.to_vec())
            .unwrap_or_default();
        let role_exclusions = resolved
            .map(|r| r.role_exclusions.to_vec())
            .unwrap_or_default();
        let nested_fields = resolved
            .map(|r| r.nested.iter().map(nested_snapshot).collect())
            .unwrap_or_default();
        let filters = resolved
            .map(|r| {
                r.filters
                    .values()
                    .map(|filter| FilterSnapshot {
                        field: filter.property_name.clone(),
                        field_type: filter.property_type.as_str().to_string(),
                        operations: filter.allowed_operations.names(),
                    })
                    .collect()
            })
            .unwrap_or_default();

        DebugSnapshot {
            entity_type: entity_type.to_string(),
            policy: policy.to_string(),
            role: role.to_string(),
            allowed_fields,
            nested_fields,
            global_exclusions,
            role_exclusions,
            order_by_fields,
            filters,
        }
    }

    /// Every registered policy with its roles, in registration order.
    pub fn policies(&self) -> Vec<PolicySummary> {
        self.resolver
            .registry()
            .snapshot()
            .policies()
            .map(|policy| PolicySummary {
                entity_type: policy.entity_type.clone(),
                policy: policy.name.clone(),
                roles: policy.role_names(),
            })
            .collect()
    }
}

fn nested_snapshot(nested: &ResolvedNested) -> NestedSnapshot {
    NestedSnapshot {
        navigation: nested.navigation.clone(),
        fields: nested.fields.to_vec(),
        has_condition: nested.condition.is_some(),
        max_depth: nested.max_depth,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exclusion::GlobalExclusionResolver;
    use crate::expr::Predicate;
    use crate::policy::{DEFAULT_ROLE, NestedDefinition, PolicyDefinition, RoleDefinition};
    use crate::registry::PolicyRegistry;
    use crate::schema::{Cardinality, EntitySchema, FieldType};
    use std::sync::Arc;

    fn inspector() -> PolicyInspector {
        let registry = Arc::new(PolicyRegistry::new());
        registry
            .register_entity(
                EntitySchema::new("Category")
                    .field("Name", FieldType::String)
                    .field("Active", FieldType::Boolean),
            )
            .unwrap();
        registry
            .register_entity(
                EntitySchema::new("Product")
                    .field("Name", FieldType::String)
                    .excluded_field("Cost", FieldType::Decimal)
                    .navigation("Category", "Category", Cardinality::One),
            )
            .unwrap();
        registry
            .register_policy(
                PolicyDefinition::new("Product", "Public").role(
                    RoleDefinition::new(DEFAULT_ROLE)
                        .fields(["Name", "Cost"])
                        .order_by(["Name"])
                        .filter_defaults("Name")
                        .nested(
                            NestedDefinition::new("Category")
                                .fields(["Name"])
                                .when(Predicate::equals("Active", true)),
                        ),
                ),
            )
            .unwrap();
        PolicyInspector::new(PolicyResolver::new(
            registry,
            Arc::new(GlobalExclusionResolver::new()),
        ))
    }

    #[test]
    fn test_snapshot_composes_every_part() {
        let snapshot = inspector().snapshot("Product", "Public", DEFAULT_ROLE);
        assert_eq!(snapshot.allowed_fields, vec!["Name", "Category.Name"]);
        assert_eq!(snapshot.global_exclusions, vec!["Cost"]);
        assert_eq!(snapshot.order_by_fields, vec!["Name"]);
        assert!(snapshot.nested_fields[0].has_condition);
        assert_eq!(snapshot.filters[0].field_type, "string");

        let text = snapshot.to_string();
        assert!(text.starts_with("Policy 'Public' for Product (role: Default)"));
        assert!(text.contains("Category [conditional] (max depth 1): Name"));
        assert!(text.contains("Global exclusions: Cost"));
    }

    #[test]
    fn test_snapshot_degrades_to_empty() {
        let inspector = inspector();
        let missing_role = inspector.snapshot("Product", "Public", "Manager");
        assert!(missing_role.allowed_fields.is_empty());
        assert!(missing_role.filters.is_empty());
        assert_eq!(missing_role.global_exclusions, vec!["Cost"]);

        let unknown = inspector.snapshot("Order", "", "");
        assert!(unknown.allowed_fields.is_empty());
        assert!(unknown.order_by_fields.is_empty());
        assert!(unknown.global_exclusions.is_empty());
    }

    #[test]
    fn test_unknown_entities_do_not_grow_exclusion_cache() {
        let inspector = inspector();
        for i in 0..1000 {
            let snapshot = inspector.snapshot(&format!("Bogus{i}"), "Public", DEFAULT_ROLE);
            assert!(snapshot.global_exclusions.is_empty());
        }
        assert_eq!(inspector.resolver.exclusions().cache_stats().entries, 0);
    }

    #[test]
    fn test_allowed_fields_come_from_the_resolved_snapshot() {
        let inspector = inspector();
        let registry_snapshot = inspector.resolver.registry().snapshot();
        let resolved = inspector
            .resolver
            .resolve_in(&registry_snapshot, "Product", "Public", DEFAULT_ROLE)
            .unwrap();
        let snapshot = inspector.snapshot("Product", "Public", DEFAULT_ROLE);
        assert_eq!(snapshot.allowed_fields, resolved.field_set().to_vec());
    }

    #[test]
    fn test_policies_listing() {
        let policies = inspector().policies();
        assert_eq!(
            policies,
            vec![PolicySummary {
                entity_type: "Product".to_string(),
                policy: "Public".to_string(),
                roles: vec![DEFAULT_ROLE.to_string()],
            }]
        );
    }

    #[test]
    fn test_snapshot_serializes() {
        let json = serde_json::to_value(inspector().snapshot("Product", "Public", DEFAULT_ROLE))
            .unwrap();
        assert_eq!(json["nested_fields"][0]["navigation"], "Category");
    }
}
