//! Policy resolution.
//!
//! Combines a registered policy, the caller's role and the global
//! exclusions into a [`ResolvedPolicy`]: the exact set of fields, nested
//! paths, ordering fields and filters the caller may use. Exclusions always
//! win over allow-lists.

use std::sync::Arc;

use indexmap::IndexMap;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{AccessDenied, PolicyError, PolicyResult, ensure_present};
use crate::exclusion::GlobalExclusionResolver;
use crate::expr::Predicate;
use crate::field::{FieldSet, PATH_SEPARATOR, is_path, join_path, terminal_segment};
use crate::policy::{FilterPolicy, NestedFieldPolicy};
use crate::registry::{PolicyRegistry, RegistrySnapshot};

/// Flattened allow-list: top-level scalars followed by `Navigation.Field`
/// paths grouped by navigation.
pub type ResolvedFieldSet = FieldSet;

/// Resolved rules for one navigation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedNested {
    pub navigation: String,
    pub target_entity: String,
    /// Member paths relative to the target entity.
    pub fields: FieldSet,
    pub condition: Option<Predicate>,
    pub max_depth: usize,
}

impl ResolvedNested {
    /// Member paths prefixed with the navigation name.
    pub fn paths(&self) -> impl Iterator<Item = String> + '_ {
        self.fields
            .iter()
            .map(|field| join_path(&self.navigation, field))
    }
}

/// Everything a caller in one role may do with one policy.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedPolicy {
    pub entity_type: String,
    pub policy_name: String,
    pub role: String,
    pub policy_registered: bool,
    pub role_configured: bool,
    pub available_roles: Vec<String>,
    pub fields: FieldSet,
    pub nested: Vec<ResolvedNested>,
    pub order_by: FieldSet,
    /// Keyed by lowercased field name.
    pub filters: IndexMap<String, FilterPolicy>,
    pub global_exclusions: FieldSet,
    pub role_exclusions: FieldSet,
}

impl ResolvedPolicy {
    fn unconfigured(entity_type: &str, policy_name: &str, role: &str) -> Self {
        Self {
            entity_type: entity_type.to_string(),
            policy_name: policy_name.to_string(),
            role: role.to_string(),
            policy_registered: false,
            role_configured: false,
            available_roles: Vec::new(),
            fields: FieldSet::new(),
            nested: Vec::new(),
            order_by: FieldSet::new(),
            filters: IndexMap::new(),
            global_exclusions: FieldSet::new(),
            role_exclusions: FieldSet::new(),
        }
    }

    /// The flattened allow-list.
    pub fn field_set(&self) -> ResolvedFieldSet {
        let mut set = self.fields.clone();
        for nested in &self.nested {
            set.extend(nested.paths());
        }
        set
    }

    pub fn allows_field(&self, field: &str) -> bool {
        if is_path(field) {
            self.field_set().contains(field)
        } else {
            self.fields.contains(field)
        }
    }

    pub fn allows_order(&self, field: &str) -> bool {
        self.order_by.contains(field)
    }

    pub fn filter(&self, field: &str) -> Option<&FilterPolicy> {
        self.filters.get(&field.to_ascii_lowercase())
    }

    pub fn nested_for(&self, navigation: &str) -> Option<&ResolvedNested> {
        self.nested
            .iter()
            .find(|n| n.navigation.eq_ignore_ascii_case(navigation))
    }

    /// Fails unless the policy is registered and the role is configured in it.
    pub fn ensure_configured(&self) -> PolicyResult<()> {
        if !self.policy_registered {
            return Err(AccessDenied::PolicyNotRegistered {
                entity_type: self.entity_type.clone(),
                policy: self.policy_name.clone(),
            }
            .into());
        }
        if !self.role_configured {
            return Err(AccessDenied::RoleNotConfigured {
                policy: self.policy_name.clone(),
                role: self.role.clone(),
                available_roles: self.available_roles.clone(),
            }
            .into());
        }
        Ok(())
    }
}

struct Exclusions<'a> {
    global: &'a FieldSet,
    role: &'a FieldSet,
}

impl Exclusions<'_> {
    /// Undotted names match by full name; dotted names by their terminal
    /// segment, or by full path for role exclusions.
    fn excludes(&self, name: &str) -> bool {
        let terminal = terminal_segment(name);
        self.global.contains(terminal) || self.role.contains(terminal) || self.role.contains(name)
    }
}

/// Resolves policies against the current registry snapshot.
#[derive(Debug, Clone)]
pub struct PolicyResolver {
    registry: Arc<PolicyRegistry>,
    exclusions: Arc<GlobalExclusionResolver>,
}

impl PolicyResolver {
    pub fn new(registry: Arc<PolicyRegistry>, exclusions: Arc<GlobalExclusionResolver>) -> Self {
        Self {
            registry,
            exclusions,
        }
    }

    pub fn registry(&self) -> &Arc<PolicyRegistry> {
        &self.registry
    }

    pub fn exclusions(&self) -> &Arc<GlobalExclusionResolver> {
        &self.exclusions
    }

    /// Flattened allow-list for a role.
    ///
    /// Never fails: a missing policy, a missing role or any resolution error
    /// yields an empty list.
    pub fn resolve_allowed_fields(
        &self,
        entity_type: &str,
        policy_name: &str,
        role: &str,
    ) -> Vec<String> {
        match self.resolve(entity_type, policy_name, role) {
            Ok(resolved) => resolved.field_set().to_vec(),
            Err(err) => {
                warn!(
                    entity_type = %entity_type,
                    policy = %policy_name,
                    role = %role,
                    error = %err,
                    "policy resolution failed; allowing no fields"
                );
                Vec::new()
            }
        }
    }

    /// Resolve against the current snapshot.
    pub fn resolve(
        &self,
        entity_type: &str,
        policy_name: &str,
        role: &str,
    ) -> PolicyResult<ResolvedPolicy> {
        self.resolve_in(&self.registry.snapshot(), entity_type, policy_name, role)
    }

    /// Resolve against a specific snapshot.
    pub fn resolve_in(
        &self,
        snapshot: &RegistrySnapshot,
        entity_type: &str,
        policy_name: &str,
        role: &str,
    ) -> PolicyResult<ResolvedPolicy> {
        ensure_present("entity type", entity_type)?;
        ensure_present("policy name", policy_name)?;
        ensure_present("role", role)?;
        if !snapshot.has_schema(entity_type) {
            return Err(PolicyError::unknown_entity(entity_type));
        }

        let mut resolved = ResolvedPolicy::unconfigured(entity_type, policy_name, role);
        let Some(policy) = snapshot.policy(entity_type, policy_name) else {
            debug!(entity_type = %entity_type, policy = %policy_name, "policy not registered");
            return Ok(resolved);
        };
        resolved.policy_registered = true;
        resolved.available_roles = policy.role_names();

        let Some(role_policy) = policy.role(role) else {
            debug!(
                entity_type = %entity_type,
                policy = %policy_name,
                role = %role,
                "role not configured"
            );
            return Ok(resolved);
        };
        resolved.role_configured = true;

        let global = self.exclusions.resolve(snapshot, entity_type);
        let exclusions = Exclusions {
            global: &global,
            role: &role_policy.excluded_fields,
        };

        resolved.fields = role_policy
            .allowed_fields
            .filtered(|field| !exclusions.excludes(field));
        resolved.order_by = role_policy
            .order_by_fields
            .filtered(|field| !exclusions.excludes(field));
        resolved.filters = role_policy
            .filters
            .iter()
            .filter(|(_, filter)| !exclusions.excludes(&filter.property_name))
            .map(|(key, filter)| (key.clone(), filter.clone()))
            .collect();
        resolved.nested = role_policy
            .nested
            .values()
            .filter(|nested| !exclusions.excludes(&nested.navigation))
            .map(|nested| self.resolve_nested(snapshot, nested, &exclusions))
            .collect();
        resolved.global_exclusions = global.as_ref().clone();
        resolved.role_exclusions = role_policy.excluded_fields.clone();

        debug!(
            entity_type = %entity_type,
            policy = %policy_name,
            role = %role,
            fields = resolved.fields.len(),
            nested = resolved.nested.len(),
            "resolved policy"
        );
        Ok(resolved)
    }

    fn resolve_nested(
        &self,
        snapshot: &RegistrySnapshot,
        nested: &NestedFieldPolicy,
        exclusions: &Exclusions<'_>,
    ) -> ResolvedNested {
        let fields = nested.allowed_fields.filtered(|path| {
            let full = join_path(&nested.navigation, path);
            if exclusions.excludes(&full) {
                return false;
            }
            // The owning entity's own exclusions apply as well.
            let owner = owner_entity(snapshot, &nested.target_entity, path);
            !self
                .exclusions
                .resolve(snapshot, &owner)
                .contains(terminal_segment(path))
        });
        ResolvedNested {
            navigation: nested.navigation.clone(),
            target_entity: nested.target_entity.clone(),
            fields,
            condition: nested.condition.clone(),
            max_depth: nested.max_depth,
        }
    }
}

/// Entity declaring the terminal member of `path`, relative to `entity_type`.
fn owner_entity(snapshot: &RegistrySnapshot, entity_type: &str, path: &str) -> String {
    let mut owner = entity_type.to_string();
    let Some((navigations, _)) = path.rsplit_once(PATH_SEPARATOR) else {
        return owner;
    };
    for segment in navigations.split(PATH_SEPARATOR) {
        let next = snapshot
            .schema(&owner)
            .and_then(|schema| schema.find_navigation(segment))
            .map(|navigation| navigation.target.clone());
        match next {
            Some(target) => owner = target,
            None => break,
        }
    }
    owner
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{DEFAULT_ROLE, NestedDefinition, PolicyDefinition, RoleDefinition};
    use crate::schema::{Cardinality, EntitySchema, FieldType};

    fn resolver() -> PolicyResolver {
        let registry = Arc::new(PolicyRegistry::new());
        registry
            .register_entity(
                EntitySchema::new("Category")
                    .field("Id", FieldType::Integer)
                    .field("Name", FieldType::String)
                    .excluded_field("Budget", FieldType::Decimal),
            )
            .unwrap();
        registry
            .register_entity(
                EntitySchema::new("Product")
                    .field("Id", FieldType::Integer)
                    .field("Name", FieldType::String)
                    .field("Color", FieldType::String)
                    .field("Price", FieldType::Decimal)
                    .navigation("Category", "Category", Cardinality::One),
            )
            .unwrap();
        registry
            .register_policy(
                PolicyDefinition::new("Product", "Public")
                    .role(
                        RoleDefinition::new(DEFAULT_ROLE)
                            .fields(["Id", "Name", "Color"])
                            .order_by(["Name", "Price"])
                            .filter_defaults("Name")
                            .filter_defaults("Price")
                            .nested(
                                NestedDefinition::new("Category")
                                    .fields(["Id", "Name", "Budget"]),
                            ),
                    )
                    .role(
                        RoleDefinition::new("Admin")
                            .fields(["Id", "Name", "Color", "Price"])
                            .exclude(["Color", "Category.Id"])
                            .nested(NestedDefinition::new("Category").fields(["Id", "Name"])),
                    ),
            )
            .unwrap();
        PolicyResolver::new(registry, Arc::new(GlobalExclusionResolver::new()))
    }

    #[test]
    fn test_flattened_field_set() {
        let resolver = resolver();
        let fields = resolver.resolve_allowed_fields("Product", "Public", DEFAULT_ROLE);
        assert_eq!(fields, vec!["Id", "Name", "Color", "Category.Id", "Category.Name"]);
    }

    #[test]
    fn test_target_entity_exclusions_apply_to_nested_paths() {
        let resolver = resolver();
        let resolved = resolver.resolve("Product", "Public", DEFAULT_ROLE).unwrap();
        assert!(!resolved.allows_field("Category.Budget"));
    }

    #[test]
    fn test_role_exclusions() {
        let resolver = resolver();
        let fields = resolver.resolve_allowed_fields("Product", "Public", "Admin");
        assert_eq!(fields, vec!["Id", "Name", "Price", "Category.Name"]);
    }

    #[test]
    fn test_missing_policy_and_role_yield_empty() {
        let resolver = resolver();
        assert!(resolver.resolve_allowed_fields("Product", "Internal", DEFAULT_ROLE).is_empty());
        assert!(resolver.resolve_allowed_fields("Product", "Public", "Manager").is_empty());
        assert!(resolver.resolve_allowed_fields("Order", "Public", DEFAULT_ROLE).is_empty());
        assert!(resolver.resolve_allowed_fields("Product", "", DEFAULT_ROLE).is_empty());
    }

    #[test]
    fn test_strict_resolution_errors() {
        let resolver = resolver();
        assert!(resolver.resolve("Product", "", DEFAULT_ROLE).unwrap_err().is_invalid_argument());
        assert!(matches!(
            resolver.resolve("Order", "Public", DEFAULT_ROLE),
            Err(PolicyError::UnknownEntity { .. })
        ));

        let resolved = resolver.resolve("Product", "Public", "Manager").unwrap();
        assert!(resolved.policy_registered);
        assert!(!resolved.role_configured);
        let err = resolved.ensure_configured().unwrap_err();
        assert_eq!(
            err.access_denied(),
            Some(&AccessDenied::RoleNotConfigured {
                policy: "Public".to_string(),
                role: "Manager".to_string(),
                available_roles: vec![DEFAULT_ROLE.to_string(), "Admin".to_string()],
            })
        );
    }

    #[test]
    fn test_global_exclusions_reach_every_list() {
        let resolver = resolver();
        resolver.registry().exclude_field("Product", "Name").unwrap();

        let resolved = resolver.resolve("Product", "Public", DEFAULT_ROLE).unwrap();
        assert!(!resolved.fields.contains("Name"));
        assert!(!resolved.allows_order("Name"));
        assert!(resolved.filter("Name").is_none());
        assert!(!resolved.allows_field("Category.Name"));
        assert!(resolved.allows_field("Category.Id"));
        assert!(resolved.filter("Price").is_some());
    }

    #[test]
    fn test_shared_exclusions_across_registries() {
        fn registry(secret: EntitySchema) -> Arc<PolicyRegistry> {
            let registry = Arc::new(PolicyRegistry::new());
            registry.register_entity(secret).unwrap();
            registry
                .register_policy(
                    PolicyDefinition::new("Account", "Public")
                        .role(RoleDefinition::new(DEFAULT_ROLE).fields(["Name", "Secret"])),
                )
                .unwrap();
            registry
        }

        let plain = registry(
            EntitySchema::new("Account")
                .field("Name", FieldType::String)
                .field("Secret", FieldType::String),
        );
        let marked = registry(
            EntitySchema::new("Account")
                .field("Name", FieldType::String)
                .excluded_field("Secret", FieldType::String),
        );

        let exclusions = Arc::new(GlobalExclusionResolver::new());
        let first = PolicyResolver::new(plain.clone(), exclusions.clone());
        let second = PolicyResolver::new(marked.clone(), exclusions.clone());

        assert_eq!(
            first.resolve_allowed_fields("Account", "Public", DEFAULT_ROLE),
            vec!["Name", "Secret"]
        );
        assert_eq!(
            second.resolve_allowed_fields("Account", "Public", DEFAULT_ROLE),
            vec!["Name"]
        );
        let resolved = first
            .resolve_in(&marked.snapshot(), "Account", "Public", DEFAULT_ROLE)
            .unwrap();
        assert!(!resolved.fields.contains("Secret"));
    }

    #[test]
    fn test_resolution_is_idempotent() {
        let resolver = resolver();
        let snapshot = resolver.registry().snapshot();
        let first = resolver
            .resolve_in(&snapshot, "Product", "Public", DEFAULT_ROLE)
            .unwrap();
        let second = resolver
            .resolve_in(&snapshot, "Product", "Public", DEFAULT_ROLE)
            .unwrap();
        assert_eq!(first, second);
    }
}
