//! Entity type metadata.
//!
//! A schema lists the scalar members and navigations of one entity type.
//! Scalar members may carry a global-exclusion marker; this is one of the
//! two channels the exclusion resolver reads.

use serde::{Deserialize, Serialize};

use crate::error::{PolicyError, PolicyResult};
use crate::field::FieldSet;

/// Scalar member type, used to pick default filter operations and to check
/// request values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Integer,
    Decimal,
    Boolean,
    Date,
    DateTime,
    Uuid,
    Json,
}

impl FieldType {
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "string" | "text" => Some(Self::String),
            "integer" | "int" => Some(Self::Integer),
            "decimal" | "number" | "float" => Some(Self::Decimal),
            "boolean" | "bool" => Some(Self::Boolean),
            "date" => Some(Self::Date),
            "datetime" => Some(Self::DateTime),
            "uuid" => Some(Self::Uuid),
            "json" => Some(Self::Json),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Decimal => "decimal",
            Self::Boolean => "boolean",
            Self::Date => "date",
            Self::DateTime => "datetime",
            Self::Uuid => "uuid",
            Self::Json => "json",
        }
    }
}

/// Whether a navigation reaches one related row or a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cardinality {
    #[default]
    One,
    Many,
}

/// A scalar member of an entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    /// Globally excluded from every policy and role of the owning entity.
    #[serde(default)]
    pub excluded: bool,
}

impl FieldDef {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            excluded: false,
        }
    }

    /// Mark the field as globally excluded.
    #[must_use]
    pub fn excluded(mut self) -> Self {
        self.excluded = true;
        self
    }
}

/// A navigation from an entity to a related entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavigationDef {
    pub name: String,
    pub target: String,
    #[serde(default)]
    pub cardinality: Cardinality,
}

/// Metadata for one entity type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitySchema {
    name: String,
    #[serde(default)]
    fields: Vec<FieldDef>,
    #[serde(default)]
    navigations: Vec<NavigationDef>,
}

impl EntitySchema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
            navigations: Vec::new(),
        }
    }

    /// Schema of a typed entity.
    pub fn of<E: Entity>() -> Self {
        E::schema()
    }

    /// Add a scalar member.
    #[must_use]
    pub fn field(mut self, name: impl Into<String>, field_type: FieldType) -> Self {
        self.fields.push(FieldDef::new(name, field_type));
        self
    }

    /// Add a scalar member carrying the global-exclusion marker.
    #[must_use]
    pub fn excluded_field(mut self, name: impl Into<String>, field_type: FieldType) -> Self {
        self.fields.push(FieldDef::new(name, field_type).excluded());
        self
    }

    /// Add a fully specified scalar member.
    #[must_use]
    pub fn with_field(mut self, def: FieldDef) -> Self {
        self.fields.push(def);
        self
    }

    /// Add a navigation to a related entity.
    #[must_use]
    pub fn navigation(
        mut self,
        name: impl Into<String>,
        target: impl Into<String>,
        cardinality: Cardinality,
    ) -> Self {
        self.navigations.push(NavigationDef {
            name: name.into(),
            target: target.into(),
            cardinality,
        });
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    pub fn navigations(&self) -> &[NavigationDef] {
        &self.navigations
    }

    /// Case-insensitive scalar lookup.
    pub fn find_field(&self, name: &str) -> Option<&FieldDef> {
        self.fields
            .iter()
            .find(|f| f.name.eq_ignore_ascii_case(name))
    }

    /// Case-insensitive navigation lookup.
    pub fn find_navigation(&self, name: &str) -> Option<&NavigationDef> {
        self.navigations
            .iter()
            .find(|n| n.name.eq_ignore_ascii_case(name))
    }

    /// Fields carrying the global-exclusion marker.
    pub fn excluded_fields(&self) -> FieldSet {
        self.fields
            .iter()
            .filter(|f| f.excluded)
            .map(|f| f.name.as_str())
            .collect()
    }

    /// Check member names are unique and non-empty.
    pub fn validate(&self) -> PolicyResult<()> {
        if self.name.trim().is_empty() {
            return Err(PolicyError::invalid_policy("entity name must not be empty"));
        }
        let mut seen = FieldSet::new();
        let members = self
            .fields
            .iter()
            .map(|f| f.name.as_str())
            .chain(self.navigations.iter().map(|n| n.name.as_str()));
        for member in members {
            if member.trim().is_empty() || member.contains(crate::field::PATH_SEPARATOR) {
                return Err(PolicyError::invalid_policy(format!(
                    "entity '{}' declares an invalid member name '{member}'",
                    self.name
                )));
            }
            if !seen.insert(member) {
                return Err(PolicyError::invalid_policy(format!(
                    "entity '{}' declares member '{member}' more than once",
                    self.name
                )));
            }
        }
        Ok(())
    }
}

/// A typed entity with static metadata.
pub trait Entity {
    /// Registry key of this entity type.
    const TYPE_NAME: &'static str;

    fn schema() -> EntitySchema;
}

/// Kind of member a selector refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberKind {
    Scalar,
    Navigation,
}

/// Turn a member reference into the schema's canonical string key.
///
/// This is the single point where typed selectors and string-keyed rules
/// meet: typed `Field`/`Navigation` selectors and untyped registrations both
/// resolve their names here.
pub fn bridge(schema: &EntitySchema, member: &str, kind: MemberKind) -> PolicyResult<String> {
    let found = match kind {
        MemberKind::Scalar => schema.find_field(member).map(|f| f.name.clone()),
        MemberKind::Navigation => schema.find_navigation(member).map(|n| n.name.clone()),
    };
    found.ok_or_else(|| {
        let what = match kind {
            MemberKind::Scalar => "field",
            MemberKind::Navigation => "navigation",
        };
        PolicyError::invalid_policy(format!(
            "entity '{}' has no {what} named '{member}'",
            schema.name()
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product() -> EntitySchema {
        EntitySchema::new("Product")
            .field("Id", FieldType::Uuid)
            .field("Name", FieldType::String)
            .excluded_field("InternalCode", FieldType::String)
            .navigation("Category", "Category", Cardinality::One)
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        let schema = product();
        assert_eq!(schema.find_field("name").map(|f| f.name.as_str()), Some("Name"));
        assert!(schema.find_navigation("CATEGORY").is_some());
        assert!(schema.find_field("Category").is_none());
    }

    #[test]
    fn test_excluded_markers() {
        let excluded = product().excluded_fields();
        assert_eq!(excluded.to_vec(), vec!["InternalCode"]);
    }

    #[test]
    fn test_bridge_returns_canonical_spelling() {
        let schema = product();
        assert_eq!(bridge(&schema, "NAME", MemberKind::Scalar).unwrap(), "Name");
        assert_eq!(
            bridge(&schema, "category", MemberKind::Navigation).unwrap(),
            "Category"
        );

        let err = bridge(&schema, "Category", MemberKind::Scalar).unwrap_err();
        assert!(matches!(err, PolicyError::InvalidPolicy { .. }));
    }

    #[test]
    fn test_validate_rejects_duplicates() {
        let schema = product().field("name", FieldType::String);
        assert!(schema.validate().is_err());
        assert!(product().validate().is_ok());
    }

    #[test]
    fn test_field_type_parse() {
        assert_eq!(FieldType::parse("String"), Some(FieldType::String));
        assert_eq!(FieldType::parse("bool"), Some(FieldType::Boolean));
        assert_eq!(FieldType::parse("blob"), None);
    }
}
