//! Process-scoped policy registry.
//!
//! Readers load an immutable [`RegistrySnapshot`] through an `ArcSwap`, so
//! the read path never takes a lock. Writers serialize on a mutex, clone the
//! current snapshot, apply one registration and publish the result with a
//! single pointer swap: a concurrent reader sees a registration completely
//! or not at all.
//!
//! Registration is a startup activity. Once [`PolicyRegistry::seal`] is
//! called every mutating call fails with [`PolicyError::RegistrySealed`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use arc_swap::ArcSwap;
use indexmap::IndexMap;
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::error::{PolicyError, PolicyResult, ensure_present};
use crate::expr::Predicate;
use crate::field::{Field, FieldSet, PATH_SEPARATOR};
use crate::operations::FilterOperations;
use crate::policy::{
    EntityPolicy, FilterPolicy, NestedDefinition, NestedFieldPolicy, PolicyDefinition,
    RoleDefinition, RolePolicy,
};
use crate::schema::{self, Entity, EntitySchema, MemberKind};

/// Immutable view of every registration at one point in time.
#[derive(Debug, Clone, Default)]
pub struct RegistrySnapshot {
    registry_id: u64,
    version: u64,
    schemas: HashMap<String, Arc<EntitySchema>>,
    policies: IndexMap<(String, String), Arc<EntityPolicy>>,
    configured_exclusions: HashMap<String, FieldSet>,
}

impl RegistrySnapshot {
    /// Identifies the registry that published this snapshot. Unique within
    /// the process.
    pub fn registry_id(&self) -> u64 {
        self.registry_id
    }

    /// Incremented on every published registration.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn schema(&self, entity_type: &str) -> Option<&Arc<EntitySchema>> {
        self.schemas.get(entity_type)
    }

    pub fn has_schema(&self, entity_type: &str) -> bool {
        self.schemas.contains_key(entity_type)
    }

    /// Registered entity type names, sorted.
    pub fn entity_types(&self) -> Vec<String> {
        let mut names: Vec<String> = self.schemas.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn policy(&self, entity_type: &str, name: &str) -> Option<&Arc<EntityPolicy>> {
        self.policies
            .get(&(entity_type.to_string(), name.to_string()))
    }

    /// Every registered policy in registration order.
    pub fn policies(&self) -> impl Iterator<Item = &Arc<EntityPolicy>> {
        self.policies.values()
    }

    /// Policy names registered for one entity type.
    pub fn policy_names(&self, entity_type: &str) -> Vec<String> {
        self.policies
            .keys()
            .filter(|(entity, _)| entity == entity_type)
            .map(|(_, name)| name.clone())
            .collect()
    }

    /// Exclusions registered through configuration for one entity type.
    pub fn configured_exclusions(&self, entity_type: &str) -> Option<&FieldSet> {
        self.configured_exclusions.get(entity_type)
    }

    /// Resolve a dotted member path relative to `entity_type` to its
    /// canonical spelling. Every segment but the last must be a navigation;
    /// the last must be a scalar.
    pub fn canonical_path(&self, entity_type: &str, path: &str) -> PolicyResult<String> {
        let mut current = self.require_schema(entity_type)?;
        let mut segments = path.split(PATH_SEPARATOR).peekable();
        let mut canonical = Vec::new();
        while let Some(segment) = segments.next() {
            if segments.peek().is_none() {
                canonical.push(schema::bridge(current, segment, MemberKind::Scalar)?);
                break;
            }
            let navigation = current.find_navigation(segment).ok_or_else(|| {
                PolicyError::invalid_policy(format!(
                    "entity '{}' has no navigation named '{segment}' (in path '{path}')",
                    current.name()
                ))
            })?;
            canonical.push(navigation.name.clone());
            current = self.require_schema(&navigation.target)?;
        }
        let separator = PATH_SEPARATOR.to_string();
        Ok(canonical.join(separator.as_str()))
    }

    fn require_schema(&self, entity_type: &str) -> PolicyResult<&Arc<EntitySchema>> {
        self.schemas
            .get(entity_type)
            .ok_or_else(|| PolicyError::unknown_entity(entity_type))
    }
}

/// Store of entity schemas, policies and configured exclusions.
#[derive(Debug)]
pub struct PolicyRegistry {
    current: ArcSwap<RegistrySnapshot>,
    write_lock: Mutex<()>,
    sealed: AtomicBool,
}

impl Default for PolicyRegistry {
    fn default() -> Self {
        Self::new()
    }
}

static GLOBAL: OnceLock<Arc<PolicyRegistry>> = OnceLock::new();
static NEXT_REGISTRY_ID: AtomicU64 = AtomicU64::new(1);

impl PolicyRegistry {
    pub fn new() -> Self {
        Self {
            current: ArcSwap::from_pointee(RegistrySnapshot {
                registry_id: NEXT_REGISTRY_ID.fetch_add(1, Ordering::Relaxed),
                ..RegistrySnapshot::default()
            }),
            write_lock: Mutex::new(()),
            sealed: AtomicBool::new(false),
        }
    }

    /// The process-wide registry.
    pub fn global() -> Arc<PolicyRegistry> {
        GLOBAL
            .get_or_init(|| Arc::new(PolicyRegistry::new()))
            .clone()
    }

    /// Current registrations. Lock-free.
    pub fn snapshot(&self) -> Arc<RegistrySnapshot> {
        self.current.load_full()
    }

    /// Close the registry for further registrations.
    pub fn seal(&self) {
        let _guard = self.write_lock.lock();
        if !self.sealed.swap(true, Ordering::SeqCst) {
            let snapshot = self.current.load();
            info!(
                version = snapshot.version,
                entities = snapshot.schemas.len(),
                policies = snapshot.policies.len(),
                "policy registry sealed"
            );
        }
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed.load(Ordering::SeqCst)
    }

    /// Register (or replace) the schema of an entity type.
    pub fn register_entity(&self, schema: EntitySchema) -> PolicyResult<()> {
        schema.validate()?;
        self.publish(|snapshot| {
            debug!(
                entity_type = %schema.name(),
                fields = schema.fields().len(),
                navigations = schema.navigations().len(),
                "registered entity schema"
            );
            snapshot
                .schemas
                .insert(schema.name().to_string(), Arc::new(schema));
            Ok(())
        })
    }

    /// Register the schema of a typed entity.
    pub fn register_type<E: Entity>(&self) -> PolicyResult<()> {
        self.register_entity(E::schema())
    }

    /// Globally exclude `field` from every policy of `entity_type`.
    ///
    /// The field is not checked against the schema; excluding a name the
    /// entity does not have is a no-op at resolution time.
    pub fn exclude_field(&self, entity_type: &str, field: &str) -> PolicyResult<()> {
        ensure_present("entity type", entity_type)?;
        ensure_present("excluded field", field)?;
        self.publish(|snapshot| {
            debug!(entity_type = %entity_type, field = %field, "registered global exclusion");
            snapshot
                .configured_exclusions
                .entry(entity_type.to_string())
                .or_default()
                .insert(field);
            Ok(())
        })
    }

    /// Typed form of [`PolicyRegistry::exclude_field`].
    pub fn exclude<E: Entity>(&self, field: Field<E>) -> PolicyResult<()> {
        self.exclude_field(E::TYPE_NAME, &field.key()?)
    }

    /// Register a policy definition.
    ///
    /// Member names are checked against the schemas and stored in their
    /// canonical spelling. If a policy with the same entity type and name
    /// exists, the roles declared here replace the existing roles of the
    /// same name; other roles are kept.
    pub fn register_policy(&self, definition: PolicyDefinition) -> PolicyResult<()> {
        ensure_present("entity type", &definition.entity_type)?;
        ensure_present("policy name", &definition.name)?;
        for role in &definition.roles {
            ensure_present("role name", &role.role)?;
        }

        self.publish(|snapshot| {
            let schema = snapshot.require_schema(&definition.entity_type)?.clone();
            let key = (definition.entity_type.clone(), definition.name.clone());
            let mut policy = snapshot
                .policies
                .get(&key)
                .map(|existing| existing.as_ref().clone())
                .unwrap_or_else(|| {
                    EntityPolicy::new(definition.entity_type.clone(), definition.name.clone())
                });

            for role in &definition.roles {
                let normalized = normalize_role(snapshot, &schema, role)?;
                policy.roles.insert(role.role.clone(), normalized);
            }

            debug!(
                entity_type = %definition.entity_type,
                policy = %definition.name,
                roles = ?policy.role_names(),
                "registered policy"
            );
            snapshot.policies.insert(key, Arc::new(policy));
            Ok(())
        })
    }

    /// Apply one change to a copy of the current snapshot and publish it.
    fn publish(
        &self,
        apply: impl FnOnce(&mut RegistrySnapshot) -> PolicyResult<()>,
    ) -> PolicyResult<()> {
        let _guard = self.write_lock.lock();
        if self.sealed.load(Ordering::SeqCst) {
            return Err(PolicyError::RegistrySealed);
        }
        let mut next = self.current.load().as_ref().clone();
        apply(&mut next)?;
        next.version += 1;
        self.current.store(Arc::new(next));
        Ok(())
    }
}

fn normalize_role(
    snapshot: &RegistrySnapshot,
    schema: &EntitySchema,
    definition: &RoleDefinition,
) -> PolicyResult<RolePolicy> {
    let mut role = RolePolicy {
        role: definition.role.clone(),
        ..RolePolicy::default()
    };

    for field in &definition.fields {
        role.allowed_fields
            .insert(schema::bridge(schema, field, MemberKind::Scalar)?);
    }
    for field in &definition.order_by {
        role.order_by_fields
            .insert(schema::bridge(schema, field, MemberKind::Scalar)?);
    }
    role.excluded_fields
        .extend(definition.excluded.iter().map(String::as_str));

    for (field, operations) in &definition.filters {
        let def = schema.find_field(field).ok_or_else(|| {
            PolicyError::invalid_policy(format!(
                "entity '{}' has no field named '{field}'",
                schema.name()
            ))
        })?;
        let allowed_operations =
            operations.unwrap_or_else(|| FilterOperations::for_type(def.field_type));
        role.filters.insert(
            def.name.to_ascii_lowercase(),
            FilterPolicy {
                property_name: def.name.clone(),
                property_type: def.field_type,
                allowed_operations,
            },
        );
    }

    for nested in &definition.nested {
        let policy = normalize_nested(snapshot, schema, nested)?;
        role.nested.insert(policy.navigation.to_ascii_lowercase(), policy);
    }

    Ok(role)
}

fn normalize_nested(
    snapshot: &RegistrySnapshot,
    schema: &EntitySchema,
    definition: &NestedDefinition,
) -> PolicyResult<NestedFieldPolicy> {
    if definition.max_depth == 0 {
        return Err(PolicyError::invalid_policy(format!(
            "nested policy for '{}.{}' must allow a depth of at least 1",
            schema.name(),
            definition.navigation
        )));
    }
    let navigation = schema.find_navigation(&definition.navigation).ok_or_else(|| {
        PolicyError::invalid_policy(format!(
            "entity '{}' has no navigation named '{}'",
            schema.name(),
            definition.navigation
        ))
    })?;
    let target = &navigation.target;

    let mut allowed_fields = FieldSet::new();
    for path in &definition.fields {
        allowed_fields.insert(snapshot.canonical_path(target, path)?);
    }
    if let Some(condition) = &definition.condition {
        validate_condition(snapshot, target, condition)?;
    }

    Ok(NestedFieldPolicy {
        navigation: navigation.name.clone(),
        target_entity: target.clone(),
        allowed_fields,
        condition: definition.condition.clone(),
        max_depth: definition.max_depth,
    })
}

fn validate_condition(
    snapshot: &RegistrySnapshot,
    entity_type: &str,
    condition: &Predicate,
) -> PolicyResult<()> {
    for field in condition.fields() {
        snapshot.canonical_path(entity_type, field)?;
    }
    Ok(())
}
