//! Engine facade wiring registry, exclusions, resolver, validator and
//! compilers together.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::debug::PolicyInspector;
use crate::error::{PolicyResult, QueryError};
use crate::exclusion::GlobalExclusionResolver;
use crate::ordering::{Ordered, SortDirection, SortKey, Unordered};
use crate::projection::{DEFAULT_MAX_DEPTH, Projection, ProjectionCompiler};
use crate::query::{CompiledQuery, PolicyQuery, QueryExecutor, QueryRequest};
use crate::registry::PolicyRegistry;
use crate::resolver::{PolicyResolver, ResolvedPolicy};
use crate::schema::Entity;
use crate::validator::{FilterRequest, OrderRequest, RequestValidator, ValidatedFilter};

/// Tunables of a [`PolicyEngine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineOptions {
    /// Upper bound on navigation hops in any projection, whatever the
    /// nested policies allow.
    pub max_depth: usize,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PolicyEngine {
    registry: Arc<PolicyRegistry>,
    resolver: PolicyResolver,
    validator: RequestValidator,
    compiler: ProjectionCompiler,
    options: EngineOptions,
}

impl PolicyEngine {
    pub fn new(registry: Arc<PolicyRegistry>) -> Self {
        Self::with_options(registry, EngineOptions::default())
    }

    pub fn with_options(registry: Arc<PolicyRegistry>, options: EngineOptions) -> Self {
        let exclusions = Arc::new(GlobalExclusionResolver::new());
        Self {
            resolver: PolicyResolver::new(registry.clone(), exclusions),
            registry,
            validator: RequestValidator::new(),
            compiler: ProjectionCompiler::new(options.max_depth),
            options,
        }
    }

    /// Engine over the process-wide registry.
    pub fn global() -> Self {
        Self::new(PolicyRegistry::global())
    }

    pub fn registry(&self) -> &Arc<PolicyRegistry> {
        &self.registry
    }

    pub fn resolver(&self) -> &PolicyResolver {
        &self.resolver
    }

    pub fn options(&self) -> EngineOptions {
        self.options
    }

    pub fn inspector(&self) -> PolicyInspector {
        PolicyInspector::new(self.resolver.clone())
    }

    pub fn resolve(
        &self,
        entity_type: &str,
        policy: &str,
        role: &str,
    ) -> PolicyResult<ResolvedPolicy> {
        self.resolver.resolve(entity_type, policy, role)
    }

    /// Flattened allow-list; empty on any failure.
    pub fn allowed_fields(&self, entity_type: &str, policy: &str, role: &str) -> Vec<String> {
        self.resolver
            .resolve_allowed_fields(entity_type, policy, role)
    }

    /// Projection for a role. A missing policy or role compiles to an empty
    /// projection.
    pub fn projection(
        &self,
        entity_type: &str,
        policy: &str,
        role: &str,
    ) -> PolicyResult<Projection> {
        let snapshot = self.registry.snapshot();
        let resolved = self
            .resolver
            .resolve_in(&snapshot, entity_type, policy, role)?;
        Ok(self.compiler.compile(&resolved, &snapshot))
    }

    /// Start a query. The policy must be registered and the role configured.
    pub fn query(
        &self,
        entity_type: &str,
        policy: &str,
        role: &str,
    ) -> PolicyResult<PolicyQuery<Unordered>> {
        let snapshot = self.registry.snapshot();
        let resolved = self
            .resolver
            .resolve_in(&snapshot, entity_type, policy, role)?;
        resolved.ensure_configured()?;
        let projection = self.compiler.compile(&resolved, &snapshot);
        debug!(
            entity_type = %entity_type,
            policy = %policy,
            role = %role,
            paths = ?projection.paths(),
            "query started"
        );
        Ok(PolicyQuery::new(resolved, projection))
    }

    pub fn query_for<E: Entity>(
        &self,
        policy: &str,
        role: &str,
    ) -> PolicyResult<PolicyQuery<Unordered>> {
        self.query(E::TYPE_NAME, policy, role)
    }

    pub fn validate_order(
        &self,
        entity_type: &str,
        policy: &str,
        role: &str,
        request: &OrderRequest,
    ) -> PolicyResult<SortKey> {
        let resolved = self.resolve(entity_type, policy, role)?;
        self.validator.validate_order(&resolved, request)
    }

    pub fn validate_filter(
        &self,
        entity_type: &str,
        policy: &str,
        role: &str,
        request: &FilterRequest,
    ) -> PolicyResult<ValidatedFilter> {
        let resolved = self.resolve(entity_type, policy, role)?;
        self.validator.validate_filter(&resolved, request)
    }

    /// Primary ordering for a caller-supplied field.
    pub fn apply_ordering(
        &self,
        entity_type: &str,
        policy: &str,
        role: &str,
        field: &str,
        direction: SortDirection,
    ) -> PolicyResult<Ordered> {
        let key = self.validate_order(
            entity_type,
            policy,
            role,
            &OrderRequest::new(field, direction),
        )?;
        Ok(Unordered.apply_primary(key))
    }

    /// Secondary ordering for a caller-supplied field.
    pub fn then_apply_ordering(
        &self,
        ordered: Ordered,
        entity_type: &str,
        policy: &str,
        role: &str,
        field: &str,
        direction: SortDirection,
    ) -> PolicyResult<Ordered> {
        let key = self.validate_order(
            entity_type,
            policy,
            role,
            &OrderRequest::new(field, direction),
        )?;
        Ok(ordered.apply_then(key))
    }

    /// Validate a caller's request and compile it.
    pub fn plan(
        &self,
        entity_type: &str,
        policy: &str,
        role: &str,
        request: &QueryRequest,
    ) -> PolicyResult<CompiledQuery> {
        self.query(entity_type, policy, role)?
            .apply_request(request)
    }

    /// Validate, compile and run a caller's request.
    pub fn execute<X: QueryExecutor>(
        &self,
        executor: &X,
        entity_type: &str,
        policy: &str,
        role: &str,
        request: &QueryRequest,
    ) -> Result<Vec<Value>, QueryError<X::Error>> {
        let compiled = self.plan(entity_type, policy, role, request)?;
        executor.fetch(&compiled).map_err(QueryError::Execution)
    }
}
