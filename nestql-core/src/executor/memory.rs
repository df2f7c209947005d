//! In-memory executor.
//!
//! Serves rows kept in process, seeded from each model's `extra.memory`
//! array. Used by tests and by hosts that want to run queries without a
//! storage back end.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{Map, Value};

use super::helpers::project;
use super::{Executor, Fetched, Operation, RequestContext};
use crate::catalog::Catalog;
use crate::error::{CoreError, CoreResult};
use crate::token::{SortDirection, Token};
use crate::value::compare_values;

/// Key in a descriptor's `extra` payload holding seed rows
pub const MEMORY_EXTRA_KEY: &str = "memory";

/// Executor backed by an in-process row store
#[derive(Debug, Default)]
pub struct MemoryExecutor {
    tables: RwLock<HashMap<String, Vec<Map<String, Value>>>>,
}

impl MemoryExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed one table per model from `extra.memory`.
    pub fn from_catalog(catalog: &Catalog) -> Self {
        let executor = Self::new();
        for descriptor in catalog.models() {
            let rows: Vec<Map<String, Value>> = descriptor
                .extra
                .get(MEMORY_EXTRA_KEY)
                .and_then(Value::as_array)
                .map(|rows| rows.iter().filter_map(|r| r.as_object().cloned()).collect())
                .unwrap_or_default();
            executor.insert_rows(&descriptor.name, rows);
        }
        executor
    }

    pub fn insert_rows(&self, model: &str, rows: Vec<Map<String, Value>>) {
        self.tables
            .write()
            .entry(model.to_string())
            .or_default()
            .extend(rows);
    }

    /// Snapshot of a table.
    pub fn rows(&self, model: &str) -> Vec<Map<String, Value>> {
        self.tables.read().get(model).cloned().unwrap_or_default()
    }

    fn select(&self, token: &Token) -> Fetched {
        let tables = self.tables.read();
        let mut rows: Vec<&Map<String, Value>> = tables
            .get(&token.model)
            .map(|rows| rows.iter().filter(|r| matches_filter(r, token)).collect())
            .unwrap_or_default();

        if let Some(sort) = &token.sort {
            rows.sort_by(|a, b| {
                for key in sort {
                    let left = a.get(&key.field).unwrap_or(&Value::Null);
                    let right = b.get(&key.field).unwrap_or(&Value::Null);
                    let ordering = compare_values(left, right);
                    if ordering != std::cmp::Ordering::Equal {
                        return match key.direction {
                            SortDirection::Asc => ordering,
                            SortDirection::Desc => ordering.reverse(),
                        };
                    }
                }
                std::cmp::Ordering::Equal
            });
        }

        let fields = token.fields.as_deref();
        if !token.batch.is_batch {
            return rows
                .first()
                .map(|row| Fetched::Record(project(row, fields)))
                .unwrap_or(Fetched::Absent);
        }

        let page: Box<dyn Iterator<Item = &&Map<String, Value>>> = match token.pagination {
            Some(p) if p.enabled => Box::new(
                rows.iter()
                    .skip(p.offset as usize)
                    .take(p.limit as usize),
            ),
            _ => Box::new(rows.iter()),
        };
        Fetched::Records(page.map(|row| project(row, fields)).collect())
    }

    fn count(&self, token: &Token) -> Fetched {
        let tables = self.tables.read();
        let count = tables
            .get(&token.model)
            .map(|rows| rows.iter().filter(|r| matches_filter(r, token)).count())
            .unwrap_or(0);
        Fetched::Count(count as u64)
    }

    fn create(&self, token: &Token) -> Fetched {
        let row: Map<String, Value> = token
            .filter
            .iter()
            .flatten()
            .map(|(column, value)| (column.clone(), value.to_value()))
            .collect();

        self.tables
            .write()
            .entry(token.model.clone())
            .or_default()
            .push(row.clone());

        if token.batch.is_batch {
            Fetched::Records(vec![row])
        } else {
            Fetched::Record(row)
        }
    }

    fn delete(&self, token: &Token) -> Fetched {
        let mut tables = self.tables.write();
        let Some(rows) = tables.get_mut(&token.model) else {
            return if token.batch.is_batch {
                Fetched::Records(Vec::new())
            } else {
                Fetched::Absent
            };
        };

        if !token.batch.is_batch {
            return match rows.iter().position(|r| matches_filter(r, token)) {
                Some(index) => Fetched::Record(rows.remove(index)),
                None => Fetched::Absent,
            };
        }

        let (removed, kept): (Vec<_>, Vec<_>) =
            rows.drain(..).partition(|r| matches_filter(r, token));
        *rows = kept;
        Fetched::Records(removed)
    }
}

fn matches_filter(row: &Map<String, Value>, token: &Token) -> bool {
    token.filter.iter().flatten().all(|(column, constraint)| {
        row.get(column)
            .map(|value| constraint.matches(value))
            .unwrap_or(false)
    })
}

#[async_trait]
impl Executor for MemoryExecutor {
    async fn execute(
        &self,
        ctx: &RequestContext<'_>,
        token: &Token,
        _parsed: &Value,
    ) -> CoreResult<Fetched> {
        let fetched = match ctx.operation() {
            Operation::Query => self.select(token),
            Operation::Count => self.count(token),
            Operation::Create => self.create(token),
            Operation::Delete => self.delete(token),
            Operation::Update => {
                return Err(CoreError::NotSupported(
                    "update is not supported by the memory executor".to_string(),
                ))
            }
        };
        tracing::debug!(
            model = %token.model,
            operation = %ctx.operation(),
            records = fetched.len(),
            "memory executor"
        );
        Ok(fetched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ModelColumn, ModelDescriptor};
    use crate::executor::{Engine, Registry};
    use crate::value::ColumnType;
    use serde_json::json;
    use std::sync::Arc;

    fn catalog() -> Catalog {
        Catalog::new(vec![ModelDescriptor::new("item", "items")
            .executor("memory")
            .column(ModelColumn::new("id", ColumnType::Number).primary())
            .column(ModelColumn::new("kind", ColumnType::String))
            .extra(
                MEMORY_EXTRA_KEY,
                json!([
                    {"id": 1, "kind": "a"},
                    {"id": 2, "kind": "b"},
                    {"id": 3, "kind": "a"},
                    {"id": 4, "kind": "b"},
                ]),
            )])
        .unwrap()
    }

    fn engine() -> (Engine, Arc<MemoryExecutor>) {
        let catalog = catalog();
        let memory = Arc::new(MemoryExecutor::from_catalog(&catalog));
        let mut registry = Registry::with_defaults();
        registry.register_executor("memory", memory.clone());
        (Engine::new(Arc::new(catalog), Arc::new(registry)), memory)
    }

    async fn run(engine: &Engine, op: Operation, input: Value) -> Value {
        engine.run(op, input.as_object().unwrap()).await.data
    }

    #[test]
    fn test_seeded_from_catalog() {
        let memory = MemoryExecutor::from_catalog(&catalog());
        assert_eq!(memory.rows("item").len(), 4);
        assert!(memory.rows("other").is_empty());
    }

    #[tokio::test]
    async fn test_sort_and_pagination() {
        let (engine, _) = engine();
        let data = run(
            &engine,
            Operation::Query,
            json!({"items": {"@sort": "-id", "@pagination": {"offset": 1, "limit": 2}, "@field": "id"}}),
        )
        .await;
        assert_eq!(data, json!({"items": {"pagination": [{"id": 3}, {"id": 2}]}}));
    }

    #[tokio::test]
    async fn test_any_of_filter() {
        let (engine, _) = engine();
        let data = run(&engine, Operation::Query, json!({"items": {"id": [1, 4]}})).await;
        assert_eq!(
            data,
            json!({"items": [{"id": 1, "kind": "a"}, {"id": 4, "kind": "b"}]})
        );
    }

    #[tokio::test]
    async fn test_count() {
        let (engine, _) = engine();
        let data = run(&engine, Operation::Count, json!({"items": {"kind": "a"}})).await;
        assert_eq!(data, json!({"items": 2}));
    }

    #[tokio::test]
    async fn test_create_and_delete() {
        let (engine, memory) = engine();
        let data = run(&engine, Operation::Create, json!({"item": {"id": 9, "kind": "c"}})).await;
        assert_eq!(data, json!({"item": {"id": 9, "kind": "c"}}));
        assert_eq!(memory.rows("item").len(), 5);

        let data = run(&engine, Operation::Delete, json!({"items": {"kind": "b"}})).await;
        assert_eq!(
            data,
            json!({"items": [{"id": 2, "kind": "b"}, {"id": 4, "kind": "b"}]})
        );
        assert_eq!(memory.rows("item").len(), 3);
    }

    #[tokio::test]
    async fn test_update_not_supported() {
        let (engine, _) = engine();
        let resolution = engine
            .run(Operation::Update, json!({"item": {"id": 1}}).as_object().unwrap())
            .await;
        assert_eq!(resolution.data, json!({"item": null}));
        assert_eq!(resolution.errors.len(), 1);
        assert!(resolution.errors[0].contains("not supported"));
    }
}
