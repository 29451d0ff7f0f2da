//! Projection expressions.
//!
//! A [`Projection`] is the compiled "select" shape of a resolved policy: the
//! allowed scalars of the root entity and, per allowed navigation, a nested
//! projection with its condition. Navigations deeper than the allowed depth
//! are left out of the tree entirely.

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::expr::{Predicate, member};
use crate::field::{PATH_SEPARATOR, join_path};
use crate::registry::RegistrySnapshot;
use crate::resolver::{ResolvedNested, ResolvedPolicy};
use crate::schema::Cardinality;

/// Default bound on navigation hops from the root entity.
pub const DEFAULT_MAX_DEPTH: usize = 3;

/// The members of one entity to read.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Projection {
    pub entity_type: String,
    pub fields: Vec<String>,
    pub navigations: Vec<NavigationProjection>,
}

/// One navigation inside a projection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NavigationProjection {
    pub name: String,
    pub cardinality: Cardinality,
    /// Only related rows satisfying the condition are read.
    pub condition: Option<Predicate>,
    pub projection: Projection,
}

impl Projection {
    /// A projection reading nothing.
    pub fn empty(entity_type: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            fields: Vec::new(),
            navigations: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.navigations.is_empty()
    }

    /// Dotted member paths this projection populates.
    pub fn paths(&self) -> Vec<String> {
        let mut paths = self.fields.clone();
        for navigation in &self.navigations {
            paths.extend(
                navigation
                    .projection
                    .paths()
                    .into_iter()
                    .map(|path| join_path(&navigation.name, &path)),
            );
        }
        paths
    }

    /// Deepest navigation chain in the tree.
    pub fn depth(&self) -> usize {
        self.navigations
            .iter()
            .map(|n| 1 + n.projection.depth())
            .max()
            .unwrap_or(0)
    }

    /// Build a new row holding only the projected members of `row`.
    ///
    /// Members absent from `row` are left out. A missing or `null`
    /// navigation becomes `null`; collection navigations keep only the
    /// elements satisfying the condition.
    pub fn apply(&self, row: &Value) -> Value {
        let Value::Object(source) = row else {
            return Value::Null;
        };
        let mut out = Map::new();
        for field in &self.fields {
            if let Some(value) = member(source, field) {
                out.insert(field.clone(), value.clone());
            }
        }
        for navigation in &self.navigations {
            let related = member(source, &navigation.name).unwrap_or(&Value::Null);
            out.insert(navigation.name.clone(), navigation.apply(related));
        }
        Value::Object(out)
    }
}

impl NavigationProjection {
    fn admits(&self, row: &Value) -> bool {
        self.condition
            .as_ref()
            .is_none_or(|condition| condition.evaluate(row))
    }

    fn apply(&self, related: &Value) -> Value {
        match related {
            Value::Array(items) => Value::Array(
                items
                    .iter()
                    .filter(|item| self.admits(item))
                    .map(|item| self.projection.apply(item))
                    .collect(),
            ),
            Value::Object(_) if self.admits(related) => self.projection.apply(related),
            _ => Value::Null,
        }
    }
}

/// Compiles resolved policies into projections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProjectionCompiler {
    max_depth: usize,
}

impl Default for ProjectionCompiler {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_DEPTH)
    }
}

impl ProjectionCompiler {
    pub fn new(max_depth: usize) -> Self {
        Self { max_depth }
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    pub fn compile(&self, resolved: &ResolvedPolicy, snapshot: &RegistrySnapshot) -> Projection {
        let mut projection = Projection::empty(&resolved.entity_type);
        projection.fields = resolved.fields.to_vec();
        projection.navigations = resolved
            .nested
            .iter()
            .filter_map(|nested| self.compile_nested(&resolved.entity_type, nested, snapshot))
            .collect();
        projection
    }

    fn compile_nested(
        &self,
        owner: &str,
        nested: &ResolvedNested,
        snapshot: &RegistrySnapshot,
    ) -> Option<NavigationProjection> {
        let limit = nested.max_depth.min(self.max_depth);
        let paths: Vec<&str> = nested.fields.iter().collect();
        let mut navigation = build_navigation(
            snapshot,
            owner,
            &nested.navigation,
            &nested.target_entity,
            &paths,
            1,
            limit,
        )?;
        navigation.condition = nested.condition.clone();
        Some(navigation)
    }
}

/// Build the projection of one navigation `depth` hops from the root.
/// `paths` are relative to the navigation's target.
fn build_navigation(
    snapshot: &RegistrySnapshot,
    owner: &str,
    name: &str,
    target: &str,
    paths: &[&str],
    depth: usize,
    limit: usize,
) -> Option<NavigationProjection> {
    if depth > limit {
        return None;
    }

    let mut projection = Projection::empty(target);
    let mut deeper: IndexMap<&str, Vec<&str>> = IndexMap::new();
    for path in paths {
        match path.split_once(PATH_SEPARATOR) {
            None => projection.fields.push((*path).to_string()),
            Some((navigation, rest)) => deeper.entry(navigation).or_default().push(rest),
        }
    }

    let target_schema = snapshot.schema(target);
    for (sub, rest) in deeper {
        let Some(sub_target) = target_schema
            .and_then(|schema| schema.find_navigation(sub))
            .map(|n| n.target.clone())
        else {
            continue;
        };
        if let Some(child) =
            build_navigation(snapshot, target, sub, &sub_target, &rest, depth + 1, limit)
        {
            projection.navigations.push(child);
        }
    }

    if projection.is_empty() {
        return None;
    }
    let cardinality = snapshot
        .schema(owner)
        .and_then(|schema| schema.find_navigation(name))
        .map(|n| n.cardinality)
        .unwrap_or_default();
    Some(NavigationProjection {
        name: name.to_string(),
        cardinality,
        condition: None,
        projection,
    })
}
