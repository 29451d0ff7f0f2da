//! In-memory [`QueryExecutor`] over JSON rows.

use serde_json::Value;

use crate::query::{CompiledQuery, QueryExecutor};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MemoryError {
    #[error("row {index} is not a JSON object")]
    NotAnObject { index: usize },
}

/// Runs compiled queries against a fixed set of rows: filter, stable sort,
/// page, then project.
#[derive(Debug, Clone, Default)]
pub struct MemoryExecutor {
    rows: Vec<Value>,
}

impl MemoryExecutor {
    pub fn new(rows: Vec<Value>) -> Self {
        Self { rows }
    }

    pub fn rows(&self) -> &[Value] {
        &self.rows
    }

    fn matching(&self, query: &CompiledQuery) -> Result<Vec<Value>, MemoryError> {
        let mut matching = Vec::new();
        for (index, row) in self.rows.iter().enumerate() {
            if !row.is_object() {
                return Err(MemoryError::NotAnObject { index });
            }
            if query.filter.as_ref().is_none_or(|filter| filter.evaluate(row)) {
                matching.push(row.clone());
            }
        }
        Ok(matching)
    }
}

impl QueryExecutor for MemoryExecutor {
    type Error = MemoryError;

    fn fetch(&self, query: &CompiledQuery) -> Result<Vec<Value>, Self::Error> {
        let mut rows = self.matching(query)?;
        if let Some(order) = &query.order {
            order.sort(&mut rows);
        }
        Ok(rows
            .iter()
            .skip(query.skip.unwrap_or(0))
            .take(query.take.unwrap_or(usize::MAX))
            .map(|row| query.projection.apply(row))
            .collect())
    }

    fn count(&self, query: &CompiledQuery) -> Result<u64, Self::Error> {
        Ok(self.matching(query)?.len() as u64)
    }
}
