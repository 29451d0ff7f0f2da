//! Global field exclusions.
//!
//! A globally excluded field is removed from every policy and role of its
//! entity type. Exclusions come from independent sources that are unioned;
//! no source knows about another. Results are cached per entity type and
//! revalidated against the publishing registry and snapshot version.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tracing::debug;

use crate::field::FieldSet;
use crate::registry::RegistrySnapshot;

/// A channel through which fields can be globally excluded.
pub trait ExclusionSource: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Fields this source excludes for `entity_type`. Never fails; an
    /// unknown entity yields an empty set.
    fn excluded_fields(&self, snapshot: &RegistrySnapshot, entity_type: &str) -> FieldSet;
}

/// Fields whose schema definition carries the exclusion marker.
#[derive(Debug, Default, Clone, Copy)]
pub struct SchemaMarkerExclusions;

impl ExclusionSource for SchemaMarkerExclusions {
    fn name(&self) -> &'static str {
        "schema"
    }

    fn excluded_fields(&self, snapshot: &RegistrySnapshot, entity_type: &str) -> FieldSet {
        snapshot
            .schema(entity_type)
            .map(|schema| schema.excluded_fields())
            .unwrap_or_default()
    }
}

/// Fields excluded through registry calls or configuration files.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConfiguredExclusions;

impl ExclusionSource for ConfiguredExclusions {
    fn name(&self) -> &'static str {
        "configured"
    }

    fn excluded_fields(&self, snapshot: &RegistrySnapshot, entity_type: &str) -> FieldSet {
        snapshot
            .configured_exclusions(entity_type)
            .cloned()
            .unwrap_or_default()
    }
}

#[derive(Debug)]
struct CachedExclusions {
    registry_id: u64,
    version: u64,
    fields: Arc<FieldSet>,
}

/// Point-in-time cache counters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExclusionCacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
    pub hit_ratio: f64,
}

/// Unions every [`ExclusionSource`] into one set per entity type.
pub struct GlobalExclusionResolver {
    sources: Vec<Box<dyn ExclusionSource>>,
    cache: DashMap<String, CachedExclusions>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl Default for GlobalExclusionResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for GlobalExclusionResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GlobalExclusionResolver")
            .field(
                "sources",
                &self.sources.iter().map(|s| s.name()).collect::<Vec<_>>(),
            )
            .field("cached_entities", &self.cache.len())
            .finish()
    }
}

impl GlobalExclusionResolver {
    /// Resolver reading schema markers and configured exclusions.
    pub fn new() -> Self {
        Self::with_sources(vec![
            Box::new(SchemaMarkerExclusions),
            Box::new(ConfiguredExclusions),
        ])
    }

    pub fn with_sources(sources: Vec<Box<dyn ExclusionSource>>) -> Self {
        Self {
            sources,
            cache: DashMap::new(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Excluded fields for `entity_type` in `snapshot`.
    ///
    /// Entity types without a schema resolve to an empty set and are not
    /// cached.
    pub fn resolve(&self, snapshot: &RegistrySnapshot, entity_type: &str) -> Arc<FieldSet> {
        if !snapshot.has_schema(entity_type) {
            return Arc::new(FieldSet::new());
        }
        if let Some(cached) = self.cache.get(entity_type)
            && cached.registry_id == snapshot.registry_id()
            && cached.version == snapshot.version()
        {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return cached.fields.clone();
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let mut fields = FieldSet::new();
        for source in &self.sources {
            fields.extend_from(&source.excluded_fields(snapshot, entity_type));
        }
        debug!(
            entity_type = %entity_type,
            version = snapshot.version(),
            excluded = ?fields,
            "resolved global exclusions"
        );

        let fields = Arc::new(fields);
        self.cache.insert(
            entity_type.to_string(),
            CachedExclusions {
                registry_id: snapshot.registry_id(),
                version: snapshot.version(),
                fields: fields.clone(),
            },
        );
        fields
    }

    pub fn cache_stats(&self) -> ExclusionCacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        ExclusionCacheStats {
            hits,
            misses,
            entries: self.cache.len(),
            hit_ratio: if total == 0 {
                0.0
            } else {
                hits as f64 / total as f64
            },
        }
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }
}
