//! Field names, case-insensitive field sets and typed member selectors.
//!
//! Policies are written against typed selectors (`Field<E>`,
//! `Navigation<E, T>`) so a typo is a compile error, but the registry and
//! every runtime lookup work on plain string keys. The two meet in
//! [`crate::schema::bridge`], and nowhere else.

use std::fmt;
use std::marker::PhantomData;

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::PolicyResult;
use crate::schema::{self, Entity, MemberKind};

/// Separator between a navigation and the member it reaches.
pub const PATH_SEPARATOR: char = '.';

/// Returns the segment after the last `.` (the whole name when undotted).
pub fn terminal_segment(path: &str) -> &str {
    path.rsplit_once(PATH_SEPARATOR)
        .map_or(path, |(_, terminal)| terminal)
}

/// Returns `true` when `name` reaches through at least one navigation.
pub fn is_path(name: &str) -> bool {
    name.contains(PATH_SEPARATOR)
}

/// Joins a navigation and a member into a dotted path.
pub fn join_path(navigation: &str, member: &str) -> String {
    format!("{navigation}{PATH_SEPARATOR}{member}")
}

/// ASCII-only case folding, shared by every member-name comparison.
fn fold(name: &str) -> String {
    name.to_ascii_lowercase()
}

/// An insertion-ordered set of field names with case-insensitive membership.
///
/// The first spelling inserted is the one reported back. Equality is set
/// equality and ignores order.
#[derive(Clone, Default)]
pub struct FieldSet {
    entries: IndexMap<String, String>,
}

impl PartialEq for FieldSet {
    fn eq(&self, other: &Self) -> bool {
        self.entries.len() == other.entries.len()
            && self.entries.keys().all(|key| other.entries.contains_key(key))
    }
}

impl Eq for FieldSet {}

impl FieldSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a name. Returns `false` if an equal name (ignoring case) is
    /// already present; the stored spelling is left unchanged.
    pub fn insert(&mut self, name: impl Into<String>) -> bool {
        let name = name.into();
        let key = fold(&name);
        if self.entries.contains_key(&key) {
            return false;
        }
        self.entries.insert(key, name);
        true
    }

    /// Case-insensitive membership test.
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(&fold(name))
    }

    /// The stored spelling of `name`, if present.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries.get(&fold(name)).map(String::as_str)
    }

    /// Remove a name, preserving the order of the remaining entries.
    pub fn remove(&mut self, name: &str) -> bool {
        self.entries.shift_remove(&fold(name)).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate stored spellings in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.entries.values().map(String::as_str)
    }

    /// Add every member of `other` not already present.
    pub fn extend_from(&mut self, other: &FieldSet) {
        for name in other.iter() {
            self.insert(name);
        }
    }

    /// Members of `self` followed by members of `other` not in `self`.
    #[must_use]
    pub fn union(&self, other: &FieldSet) -> FieldSet {
        let mut merged = self.clone();
        merged.extend_from(other);
        merged
    }

    /// Keep only the names for which `keep` returns `true`.
    #[must_use]
    pub fn filtered(&self, mut keep: impl FnMut(&str) -> bool) -> FieldSet {
        self.iter().filter(|name| keep(name)).collect()
    }

    pub fn to_vec(&self) -> Vec<String> {
        self.entries.values().cloned().collect()
    }
}

impl fmt::Debug for FieldSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl<S: Into<String>> FromIterator<S> for FieldSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut set = FieldSet::new();
        set.extend(iter);
        set
    }
}

impl<S: Into<String>> Extend<S> for FieldSet {
    fn extend<I: IntoIterator<Item = S>>(&mut self, iter: I) {
        for name in iter {
            self.insert(name);
        }
    }
}

impl Serialize for FieldSet {
    fn serialize<Se: Serializer>(&self, serializer: Se) -> Result<Se::Ok, Se::Error> {
        serializer.collect_seq(self.iter())
    }
}

impl<'de> Deserialize<'de> for FieldSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let names = Vec::<String>::deserialize(deserializer)?;
        Ok(names.into_iter().collect())
    }
}

/// Typed reference to a scalar member of entity `E`.
///
/// Declared as associated constants next to the entity so that policy code
/// can only name members that exist on the type it is written for:
///
/// ```ignore
/// impl Product {
///     pub const NAME: Field<Product> = Field::new("Name");
/// }
/// ```
pub struct Field<E> {
    name: &'static str,
    _entity: PhantomData<fn() -> E>,
}

impl<E> Field<E> {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _entity: PhantomData,
        }
    }

    pub const fn name(&self) -> &'static str {
        self.name
    }
}

impl<E: Entity> Field<E> {
    /// The validated string key of this member.
    pub fn key(&self) -> PolicyResult<String> {
        schema::bridge(&E::schema(), self.name, MemberKind::Scalar)
    }
}

impl<E> Clone for Field<E> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<E> Copy for Field<E> {}

impl<E> fmt::Debug for Field<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Field").field(&self.name).finish()
    }
}

/// Typed reference to a navigation from `E` to related entity `T`.
pub struct Navigation<E, T> {
    name: &'static str,
    _entities: PhantomData<fn() -> (E, T)>,
}

impl<E, T> Navigation<E, T> {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _entities: PhantomData,
        }
    }

    pub const fn name(&self) -> &'static str {
        self.name
    }
}

impl<E: Entity, T> Navigation<E, T> {
    /// The validated string key of this navigation.
    pub fn key(&self) -> PolicyResult<String> {
        schema::bridge(&E::schema(), self.name, MemberKind::Navigation)
    }
}

impl<E, T> Clone for Navigation<E, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<E, T> Copy for Navigation<E, T> {}

impl<E, T> fmt::Debug for Navigation<E, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Navigation").field(&self.name).finish()
    }
}
