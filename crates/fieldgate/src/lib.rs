//! Role-aware access control and query shaping for entity data.
//!
//! Policies declare, per entity type and role, which fields may be read,
//! filtered (and with which operators), ordered by, and which navigations
//! may be traversed. At query time untrusted requests are validated against
//! the resolved policy before anything reaches the data-access layer.
//!
//! ```ignore
//! let registry = Arc::new(PolicyRegistry::new());
//! registry.register_type::<Product>()?;
//! registry.register_policy(
//!     PolicyBuilder::<Product>::new("Public")
//!         .role(DEFAULT_ROLE, |r| r.fields([Product::ID, Product::NAME]).order_by([Product::NAME]))
//!         .build()?,
//! )?;
//! registry.seal();
//!
//! let engine = PolicyEngine::new(registry);
//! let rows = engine
//!     .query("Product", "Public", DEFAULT_ROLE)?
//!     .order_by("Name", SortDirection::Ascending)?
//!     .take(20)
//!     .fetch(&executor)?;
//! ```

pub mod debug;
pub mod engine;
pub mod error;
pub mod exclusion;
pub mod expr;
pub mod field;
pub mod memory;
pub mod operations;
pub mod ordering;
pub mod policy;
pub mod projection;
pub mod query;
pub mod registry;
pub mod resolver;
pub mod schema;
pub mod validator;

pub use debug::{DebugSnapshot, FilterSnapshot, NestedSnapshot, PolicyInspector, PolicySummary};
pub use engine::{EngineOptions, PolicyEngine};
pub use error::{AccessDenied, FieldUsage, PolicyError, PolicyResult, QueryError};
pub use exclusion::{
    ConfiguredExclusions, ExclusionCacheStats, ExclusionSource, GlobalExclusionResolver,
    SchemaMarkerExclusions,
};
pub use expr::Predicate;
pub use field::{Field, FieldSet, Navigation};
pub use memory::{MemoryError, MemoryExecutor};
pub use operations::{FilterOperation, FilterOperations};
pub use ordering::{Ordered, SortDirection, SortKey, Unordered, apply_primary, apply_then};
pub use policy::{
    DEFAULT_ROLE, EntityPolicy, FilterPolicy, NestedBuilder, NestedDefinition,
    NestedFieldPolicy, PolicyBuilder, PolicyDefinition, RoleBuilder, RoleDefinition, RolePolicy,
};
pub use projection::{NavigationProjection, Projection, ProjectionCompiler};
pub use query::{CompiledQuery, OrderState, PolicyQuery, QueryExecutor, QueryRequest};
pub use registry::{PolicyRegistry, RegistrySnapshot};
pub use resolver::{PolicyResolver, ResolvedFieldSet, ResolvedNested, ResolvedPolicy};
pub use schema::{Cardinality, Entity, EntitySchema, FieldDef, FieldType, NavigationDef};
pub use validator::{
    FilterRequest, OrderRequest, RequestValidator, ValidatedField, ValidatedFilter,
};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
