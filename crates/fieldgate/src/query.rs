//! Policy-gated query plans.
//!
//! A [`PolicyQuery`] starts from a resolved policy and collects validated
//! filters, ordering keys and paging. Ordering is tracked in the type: an
//! `PolicyQuery<Unordered>` offers `order_by`, a `PolicyQuery<Ordered>`
//! offers `then_by`. [`PolicyQuery::compile`] produces the
//! [`CompiledQuery`] handed to a [`QueryExecutor`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{PolicyError, PolicyResult, QueryError};
use crate::expr::Predicate;
use crate::field::Field;
use crate::ordering::{Ordered, SortDirection, SortKey, Unordered};
use crate::projection::Projection;
use crate::resolver::ResolvedPolicy;
use crate::schema::Entity;
use crate::validator::{
    FilterRequest, OrderRequest, RequestValidator, ValidatedField, ValidatedFilter,
};

mod sealed {
    pub trait Sealed {}
    impl Sealed for crate::ordering::Unordered {}
    impl Sealed for crate::ordering::Ordered {}
}

/// Ordering state of a [`PolicyQuery`].
pub trait OrderState: sealed::Sealed {
    fn ordering(&self) -> Option<&Ordered>;
}

impl OrderState for Unordered {
    fn ordering(&self) -> Option<&Ordered> {
        None
    }
}

impl OrderState for Ordered {
    fn ordering(&self) -> Option<&Ordered> {
        Some(self)
    }
}

/// Everything an executor needs to run one query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompiledQuery {
    pub entity_type: String,
    pub policy: String,
    pub role: String,
    pub projection: Projection,
    pub filter: Option<Predicate>,
    pub order: Option<Ordered>,
    pub skip: Option<usize>,
    pub take: Option<usize>,
}

/// Executes compiled queries. Implemented by the data-access layer.
pub trait QueryExecutor {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Rows matching the query, projected, ordered and paged.
    fn fetch(&self, query: &CompiledQuery) -> Result<Vec<Value>, Self::Error>;

    /// Number of rows matching the query's filter, ignoring paging.
    fn count(&self, query: &CompiledQuery) -> Result<u64, Self::Error>;
}

/// Untrusted query parameters as they arrive from a caller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryRequest {
    #[serde(default)]
    pub filters: Vec<FilterRequest>,
    #[serde(default)]
    pub order_by: Vec<OrderRequest>,
    #[serde(default)]
    pub skip: Option<usize>,
    #[serde(default)]
    pub take: Option<usize>,
}

/// A query under construction against one resolved policy.
#[derive(Debug, Clone)]
pub struct PolicyQuery<S> {
    resolved: ResolvedPolicy,
    projection: Projection,
    validator: RequestValidator,
    filters: Vec<ValidatedFilter>,
    order: S,
    skip: Option<usize>,
    take: Option<usize>,
}

impl PolicyQuery<Unordered> {
    pub(crate) fn new(resolved: ResolvedPolicy, projection: Projection) -> Self {
        Self {
            resolved,
            projection,
            validator: RequestValidator::new(),
            filters: Vec::new(),
            order: Unordered,
            skip: None,
            take: None,
        }
    }

    /// Apply the primary ordering key after validating `field` against the
    /// role's order-by set.
    pub fn order_by(
        self,
        field: &str,
        direction: SortDirection,
    ) -> PolicyResult<PolicyQuery<Ordered>> {
        self.order_by_request(&OrderRequest::new(field, direction))
    }

    pub fn order_by_request(self, request: &OrderRequest) -> PolicyResult<PolicyQuery<Ordered>> {
        let key = self.validator.validate_order(&self.resolved, request)?;
        Ok(self.with_primary(key))
    }

    /// Apply the primary ordering key from a typed member of `E`.
    ///
    /// Typed members are written by policy authors, not callers, so the
    /// order-by set is not consulted; the member must still be a scalar of
    /// the query's entity.
    pub fn order_by_field<E: Entity>(
        self,
        field: Field<E>,
        direction: SortDirection,
    ) -> PolicyResult<PolicyQuery<Ordered>> {
        let key = typed_key(&self.resolved, field, direction)?;
        Ok(self.with_primary(key))
    }

    /// Apply every part of a caller's request.
    pub fn apply_request(self, request: &QueryRequest) -> PolicyResult<CompiledQuery> {
        let mut query = self.filters(&request.filters)?;
        query.skip = request.skip;
        query.take = request.take;

        let mut orders = request.order_by.iter();
        let Some(primary) = orders.next() else {
            return Ok(query.compile());
        };
        let mut ordered = query.order_by_request(primary)?;
        for request in orders {
            ordered = ordered.then_by_request(request)?;
        }
        Ok(ordered.compile())
    }

    fn with_primary(self, key: SortKey) -> PolicyQuery<Ordered> {
        PolicyQuery {
            order: self.order.apply_primary(key),
            resolved: self.resolved,
            projection: self.projection,
            validator: self.validator,
            filters: self.filters,
            skip: self.skip,
            take: self.take,
        }
    }
}

impl PolicyQuery<Ordered> {
    /// Append a secondary ordering key after validating `field`.
    pub fn then_by(self, field: &str, direction: SortDirection) -> PolicyResult<Self> {
        self.then_by_request(&OrderRequest::new(field, direction))
    }

    pub fn then_by_request(mut self, request: &OrderRequest) -> PolicyResult<Self> {
        let key = self.validator.validate_order(&self.resolved, request)?;
        self.order = self.order.apply_then(key);
        Ok(self)
    }

    /// Append a secondary ordering key from a typed member of `E`.
    pub fn then_by_field<E: Entity>(
        mut self,
        field: Field<E>,
        direction: SortDirection,
    ) -> PolicyResult<Self> {
        let key = typed_key(&self.resolved, field, direction)?;
        self.order = self.order.apply_then(key);
        Ok(self)
    }
}

impl<S: OrderState> PolicyQuery<S> {
    pub fn resolved(&self) -> &ResolvedPolicy {
        &self.resolved
    }

    pub fn projection(&self) -> &Projection {
        &self.projection
    }

    pub fn ordering(&self) -> Option<&Ordered> {
        self.order.ordering()
    }

    /// Add a validated filter condition. Conditions are combined with AND.
    pub fn filter(mut self, request: &FilterRequest) -> PolicyResult<Self> {
        let filter = self.validator.validate_filter(&self.resolved, request)?;
        self.filters.push(filter);
        Ok(self)
    }

    pub fn filters(mut self, requests: &[FilterRequest]) -> PolicyResult<Self> {
        let validated = self.validator.validate_filters(&self.resolved, requests)?;
        self.filters.extend(validated);
        Ok(self)
    }

    #[must_use]
    pub fn skip(mut self, skip: usize) -> Self {
        self.skip = Some(skip);
        self
    }

    #[must_use]
    pub fn take(mut self, take: usize) -> Self {
        self.take = Some(take);
        self
    }

    pub fn compile(&self) -> CompiledQuery {
        let mut predicates: Vec<Predicate> =
            self.filters.iter().map(ValidatedFilter::to_predicate).collect();
        let filter = match predicates.len() {
            0 => None,
            1 => predicates.pop(),
            _ => Some(Predicate::and(predicates)),
        };
        CompiledQuery {
            entity_type: self.resolved.entity_type.clone(),
            policy: self.resolved.policy_name.clone(),
            role: self.resolved.role.clone(),
            projection: self.projection.clone(),
            filter,
            order: self.order.ordering().cloned(),
            skip: self.skip,
            take: self.take,
        }
    }

    pub fn fetch<X: QueryExecutor>(&self, executor: &X) -> Result<Vec<Value>, QueryError<X::Error>> {
        executor
            .fetch(&self.compile())
            .map_err(QueryError::Execution)
    }

    pub fn count<X: QueryExecutor>(&self, executor: &X) -> Result<u64, QueryError<X::Error>> {
        executor
            .count(&self.compile())
            .map_err(QueryError::Execution)
    }
}

fn typed_key<E: Entity>(
    resolved: &ResolvedPolicy,
    field: Field<E>,
    direction: SortDirection,
) -> PolicyResult<SortKey> {
    if E::TYPE_NAME != resolved.entity_type {
        return Err(PolicyError::invalid_argument(format!(
            "field '{}' belongs to entity '{}', not '{}'",
            field.name(),
            E::TYPE_NAME,
            resolved.entity_type
        )));
    }
    Ok(SortKey::new(ValidatedField::new(field.key()?), direction))
}
