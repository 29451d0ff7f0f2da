//! Policy model and definition builders.
//!
//! Definitions (`PolicyDefinition`, `RoleDefinition`, `NestedDefinition`)
//! are what policy authors write. The registry checks them against the
//! entity schemas and stores the normalized form (`EntityPolicy`,
//! `RolePolicy`, `FilterPolicy`, `NestedFieldPolicy`) with canonical member
//! spellings and field types filled in.

use std::marker::PhantomData;

use indexmap::IndexMap;
use serde::Serialize;

use crate::error::{PolicyError, PolicyResult};
use crate::expr::Predicate;
use crate::field::{Field, FieldSet, Navigation, join_path};
use crate::operations::FilterOperations;
use crate::schema::{Entity, FieldType};

/// Role used when a caller does not name one.
pub const DEFAULT_ROLE: &str = "Default";

/// Default bound on navigation hops for a nested policy.
pub const DEFAULT_NESTED_DEPTH: usize = 1;

/// Filter rule for one field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FilterPolicy {
    pub property_name: String,
    pub property_type: FieldType,
    pub allowed_operations: FilterOperations,
}

/// Traversal rule for one navigation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NestedFieldPolicy {
    pub navigation: String,
    pub target_entity: String,
    /// Members of the target entity; dotted entries reach further
    /// navigations of the target (`Parent.Name`).
    pub allowed_fields: FieldSet,
    /// Restricts which related rows are eligible.
    pub condition: Option<Predicate>,
    /// Maximum navigation hops from the owning entity.
    pub max_depth: usize,
}

/// Rules for one role within a policy.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RolePolicy {
    pub role: String,
    pub allowed_fields: FieldSet,
    /// Explicit per-role exclusions, applied after the allow-list.
    pub excluded_fields: FieldSet,
    pub order_by_fields: FieldSet,
    /// Keyed by lowercased field name.
    pub filters: IndexMap<String, FilterPolicy>,
    /// Keyed by lowercased navigation name.
    pub nested: IndexMap<String, NestedFieldPolicy>,
}

impl RolePolicy {
    pub fn filter(&self, field: &str) -> Option<&FilterPolicy> {
        self.filters.get(&field.to_ascii_lowercase())
    }

    pub fn nested_policy(&self, navigation: &str) -> Option<&NestedFieldPolicy> {
        self.nested.get(&navigation.to_ascii_lowercase())
    }
}

/// A named policy for one entity type, partitioned by role.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityPolicy {
    pub entity_type: String,
    pub name: String,
    pub roles: IndexMap<String, RolePolicy>,
}

impl EntityPolicy {
    pub fn new(entity_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            name: name.into(),
            roles: IndexMap::new(),
        }
    }

    pub fn role(&self, role: &str) -> Option<&RolePolicy> {
        self.roles.get(role)
    }

    pub fn role_names(&self) -> Vec<String> {
        self.roles.keys().cloned().collect()
    }
}

// =============================================================================
// Definitions
// =============================================================================

/// Nested traversal as declared by a policy author.
#[derive(Debug, Clone, PartialEq)]
pub struct NestedDefinition {
    pub navigation: String,
    pub fields: Vec<String>,
    pub condition: Option<Predicate>,
    pub max_depth: usize,
}

impl NestedDefinition {
    pub fn new(navigation: impl Into<String>) -> Self {
        Self {
            navigation: navigation.into(),
            fields: Vec::new(),
            condition: None,
            max_depth: DEFAULT_NESTED_DEPTH,
        }
    }

    #[must_use]
    pub fn fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields.extend(fields.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn when(mut self, condition: Predicate) -> Self {
        self.condition = Some(condition);
        self
    }

    #[must_use]
    pub fn max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }
}

/// Role rules as declared by a policy author, keyed by plain names.
#[derive(Debug, Clone, PartialEq)]
pub struct RoleDefinition {
    pub role: String,
    pub fields: Vec<String>,
    pub excluded: Vec<String>,
    pub order_by: Vec<String>,
    /// `None` grants the default operations for the field's type.
    pub filters: Vec<(String, Option<FilterOperations>)>,
    pub nested: Vec<NestedDefinition>,
}

impl RoleDefinition {
    pub fn new(role: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            fields: Vec::new(),
            excluded: Vec::new(),
            order_by: Vec::new(),
            filters: Vec::new(),
            nested: Vec::new(),
        }
    }

    #[must_use]
    pub fn fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields.extend(fields.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn exclude<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.excluded.extend(fields.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn order_by<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.order_by.extend(fields.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn filter(mut self, field: impl Into<String>, operations: FilterOperations) -> Self {
        self.filters.push((field.into(), Some(operations)));
        self
    }

    /// Allow filtering with the default operations for the field's type.
    #[must_use]
    pub fn filter_defaults(mut self, field: impl Into<String>) -> Self {
        self.filters.push((field.into(), None));
        self
    }

    #[must_use]
    pub fn nested(mut self, nested: NestedDefinition) -> Self {
        self.nested.push(nested);
        self
    }
}

/// A policy as declared: target entity, name and role rules.
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyDefinition {
    pub entity_type: String,
    pub name: String,
    pub roles: Vec<RoleDefinition>,
}

impl PolicyDefinition {
    pub fn new(entity_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            name: name.into(),
            roles: Vec::new(),
        }
    }

    #[must_use]
    pub fn role(mut self, role: RoleDefinition) -> Self {
        self.roles.push(role);
        self
    }
}

// =============================================================================
// Typed builders
// =============================================================================

/// Builds a [`PolicyDefinition`] from typed member selectors.
///
/// ```ignore
/// let policy = PolicyBuilder::<Product>::new("Public")
///     .role(DEFAULT_ROLE, |r| {
///         r.fields([Product::ID, Product::NAME])
///             .order_by([Product::NAME])
///             .filter(Product::NAME, FilterOperations::TEXT)
///             .nested(Product::CATEGORY, |n| n.fields([Category::NAME]))
///     })
///     .build()?;
/// ```
pub struct PolicyBuilder<E> {
    definition: PolicyDefinition,
    error: Option<PolicyError>,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> PolicyBuilder<E> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            definition: PolicyDefinition::new(E::TYPE_NAME, name),
            error: None,
            _entity: PhantomData,
        }
    }

    #[must_use]
    pub fn role(
        mut self,
        role: impl Into<String>,
        configure: impl FnOnce(RoleBuilder<E>) -> RoleBuilder<E>,
    ) -> Self {
        let built = configure(RoleBuilder::new(role));
        match built.error {
            Some(err) => {
                self.error.get_or_insert(err);
            }
            None => self.definition.roles.push(built.definition),
        }
        self
    }

    /// Finish the definition, reporting the first selector that failed to
    /// bridge to the schema.
    pub fn build(self) -> PolicyResult<PolicyDefinition> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.definition),
        }
    }
}

/// Typed role rules for entity `E`.
pub struct RoleBuilder<E> {
    definition: RoleDefinition,
    error: Option<PolicyError>,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> RoleBuilder<E> {
    fn new(role: impl Into<String>) -> Self {
        Self {
            definition: RoleDefinition::new(role),
            error: None,
            _entity: PhantomData,
        }
    }

    fn keys(&mut self, fields: impl IntoIterator<Item = Field<E>>) -> Vec<String> {
        let mut keys = Vec::new();
        for field in fields {
            match field.key() {
                Ok(key) => keys.push(key),
                Err(err) => {
                    self.error.get_or_insert(err);
                }
            }
        }
        keys
    }

    #[must_use]
    pub fn fields(mut self, fields: impl IntoIterator<Item = Field<E>>) -> Self {
        let keys = self.keys(fields);
        self.definition.fields.extend(keys);
        self
    }

    #[must_use]
    pub fn exclude(mut self, fields: impl IntoIterator<Item = Field<E>>) -> Self {
        let keys = self.keys(fields);
        self.definition.excluded.extend(keys);
        self
    }

    #[must_use]
    pub fn order_by(mut self, fields: impl IntoIterator<Item = Field<E>>) -> Self {
        let keys = self.keys(fields);
        self.definition.order_by.extend(keys);
        self
    }

    #[must_use]
    pub fn filter(mut self, field: Field<E>, operations: FilterOperations) -> Self {
        if let Some(key) = self.keys([field]).pop() {
            self.definition.filters.push((key, Some(operations)));
        }
        self
    }

    #[must_use]
    pub fn filter_defaults(mut self, field: Field<E>) -> Self {
        if let Some(key) = self.keys([field]).pop() {
            self.definition.filters.push((key, None));
        }
        self
    }

    #[must_use]
    pub fn nested<T: Entity>(
        mut self,
        navigation: Navigation<E, T>,
        configure: impl FnOnce(NestedBuilder<T>) -> NestedBuilder<T>,
    ) -> Self {
        let key = match navigation.key() {
            Ok(key) => key,
            Err(err) => {
                self.error.get_or_insert(err);
                return self;
            }
        };
        let built = configure(NestedBuilder::new(key));
        match built.error {
            Some(err) => {
                self.error.get_or_insert(err);
            }
            None => self.definition.nested.push(built.definition),
        }
        self
    }
}

/// Typed nested rules for related entity `T`.
pub struct NestedBuilder<T> {
    definition: NestedDefinition,
    error: Option<PolicyError>,
    _entity: PhantomData<fn() -> T>,
}

impl<T: Entity> NestedBuilder<T> {
    fn new(navigation: String) -> Self {
        Self {
            definition: NestedDefinition::new(navigation),
            error: None,
            _entity: PhantomData,
        }
    }

    fn record<V>(&mut self, result: PolicyResult<V>) -> Option<V> {
        match result {
            Ok(value) => Some(value),
            Err(err) => {
                self.error.get_or_insert(err);
                None
            }
        }
    }

    #[must_use]
    pub fn fields(mut self, fields: impl IntoIterator<Item = Field<T>>) -> Self {
        for field in fields {
            if let Some(key) = self.record(field.key()) {
                self.definition.fields.push(key);
            }
        }
        self
    }

    /// Allow members of an entity one hop further (`Parent.Name`).
    #[must_use]
    pub fn through<U: Entity>(
        mut self,
        navigation: Navigation<T, U>,
        fields: impl IntoIterator<Item = Field<U>>,
    ) -> Self {
        let Some(nav) = self.record(navigation.key()) else {
            return self;
        };
        for field in fields {
            if let Some(key) = self.record(field.key()) {
                self.definition.fields.push(join_path(&nav, &key));
            }
        }
        self
    }

    #[must_use]
    pub fn when(mut self, condition: Predicate) -> Self {
        self.definition.condition = Some(condition);
        self
    }

    #[must_use]
    pub fn max_depth(mut self, max_depth: usize) -> Self {
        self.definition.max_depth = max_depth;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Cardinality, EntitySchema};

    struct Supplier;
    impl Entity for Supplier {
        const TYPE_NAME: &'static str = "Supplier";
        fn schema() -> EntitySchema {
            EntitySchema::new("Supplier").field("Name", FieldType::String)
        }
    }

    struct Category;
    impl Category {
        const NAME: Field<Category> = Field::new("Name");
        const SUPPLIER: Navigation<Category, Supplier> = Navigation::new("Supplier");
    }
    impl Entity for Category {
        const TYPE_NAME: &'static str = "Category";
        fn schema() -> EntitySchema {
            EntitySchema::new("Category")
                .field("Name", FieldType::String)
                .navigation("Supplier", "Supplier", Cardinality::One)
        }
    }

    struct Product;
    impl Product {
        const ID: Field<Product> = Field::new("Id");
        const NAME: Field<Product> = Field::new("name");
        const BOGUS: Field<Product> = Field::new("Bogus");
        const CATEGORY: Navigation<Product, Category> = Navigation::new("Category");
    }
    impl Entity for Product {
        const TYPE_NAME: &'static str = "Product";
        fn schema() -> EntitySchema {
            EntitySchema::new("Product")
                .field("Id", FieldType::Uuid)
                .field("Name", FieldType::String)
                .navigation("Category", "Category", Cardinality::One)
        }
    }

    const SUPPLIER_NAME: Field<Supplier> = Field::new("Name");

    #[test]
    fn test_typed_builder_produces_canonical_keys() {
        let definition = PolicyBuilder::<Product>::new("Public")
            .role(DEFAULT_ROLE, |r| {
                r.fields([Product::ID, Product::NAME])
                    .order_by([Product::NAME])
                    .filter(Product::NAME, FilterOperations::TEXT)
                    .nested(Product::CATEGORY, |n| {
                        n.fields([Category::NAME])
                            .through(Category::SUPPLIER, [SUPPLIER_NAME])
                            .max_depth(2)
                    })
            })
            .build()
            .unwrap();

        assert_eq!(definition.entity_type, "Product");
        let role = &definition.roles[0];
        assert_eq!(role.fields, vec!["Id", "Name"]);
        assert_eq!(role.order_by, vec!["Name"]);
        assert_eq!(role.filters, vec![("Name".to_string(), Some(FilterOperations::TEXT))]);
        assert_eq!(role.nested[0].navigation, "Category");
        assert_eq!(role.nested[0].fields, vec!["Name", "Supplier.Name"]);
        assert_eq!(role.nested[0].max_depth, 2);
    }

    #[test]
    fn test_typed_builder_reports_unknown_member() {
        let err = PolicyBuilder::<Product>::new("Public")
            .role(DEFAULT_ROLE, |r| r.fields([Product::ID, Product::BOGUS]))
            .build()
            .unwrap_err();

        assert!(matches!(err, PolicyError::InvalidPolicy { .. }));
        assert!(err.to_string().contains("Bogus"));
    }

    #[test]
    fn test_role_policy_lookups_ignore_case() {
        let mut role = RolePolicy {
            role: DEFAULT_ROLE.to_string(),
            ..Default::default()
        };
        role.filters.insert(
            "name".to_string(),
            FilterPolicy {
                property_name: "Name".to_string(),
                property_type: FieldType::String,
                allowed_operations: FilterOperations::TEXT,
            },
        );

        assert!(role.filter("NAME").is_some());
        assert!(role.nested_policy("Category").is_none());
    }
}
