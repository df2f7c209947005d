//! Resolution engine.
//!
//! Walks a token list in order. Each token is parsed, has its join filter
//! injected from the parent's cache entry, and is executed. Its result is
//! indexed into the join cache, cleaned of temporary fields and aliased.
//!
//! Child results are not written into parent records immediately. Each
//! token's result lives in its own slot and the writes are queued. Once every
//! token has run, the queue is applied back to front: descendants always
//! follow their ancestors in the list, so a record is complete before it is
//! copied into the level above.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};

use super::helpers::{rename_field, set_in_record, set_path};
use super::{Fetched, Operation, Registry};
use crate::cache::{CacheEntry, JoinCache};
use crate::catalog::Catalog;
use crate::error::{CoreError, CoreResult};
use crate::token::{ForeignLink, Token};
use crate::tokenizer::{Tokenized, Tokenizer};
use crate::value::FilterValue;

/// State shared with parsers and executors for one request
pub struct RequestContext<'a> {
    operation: Operation,
    catalog: &'a Catalog,
    input: &'a Map<String, Value>,
    cache: JoinCache,
}

impl<'a> RequestContext<'a> {
    pub fn new(operation: Operation, catalog: &'a Catalog, input: &'a Map<String, Value>) -> Self {
        Self {
            operation,
            catalog,
            input,
            cache: JoinCache::new(),
        }
    }

    pub fn operation(&self) -> Operation {
        self.operation
    }

    pub fn catalog(&self) -> &Catalog {
        self.catalog
    }

    /// The raw request mapping.
    pub fn input(&self) -> &Map<String, Value> {
        self.input
    }

    pub fn cache(&self) -> &JoinCache {
        &self.cache
    }
}

/// Output tree and accumulated error strings
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resolution {
    pub data: Value,
    pub errors: Vec<String>,
}

/// What a queued write puts into a parent record
#[derive(Debug)]
enum Stitch {
    Absent,
    /// The child's whole result
    Whole(usize),
    /// One record of the child's result
    One(usize, usize),
    /// Several records of the child's result
    Many(usize, Vec<usize>),
}

#[derive(Debug)]
struct PendingWrite {
    target: usize,
    position: usize,
    keys: Vec<String>,
    stitch: Stitch,
}

/// Runs requests against a catalog with a fixed set of parsers and executors
#[derive(Debug, Clone)]
pub struct Engine {
    catalog: Arc<Catalog>,
    registry: Arc<Registry>,
}

impl Engine {
    pub fn new(catalog: Arc<Catalog>, registry: Arc<Registry>) -> Self {
        Self { catalog, registry }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn tokenize(&self, input: &Map<String, Value>) -> Tokenized {
        Tokenizer::new(&self.catalog).tokenize(input)
    }

    /// Tokenize and resolve one request.
    pub async fn run(&self, operation: Operation, input: &Map<String, Value>) -> Resolution {
        let tokenized = self.tokenize(input);
        self.resolve(operation, input, tokenized).await
    }

    /// Resolve an already tokenized request.
    pub async fn resolve(
        &self,
        operation: Operation,
        input: &Map<String, Value>,
        tokenized: Tokenized,
    ) -> Resolution {
        let Tokenized { tokens, mut errors } = tokenized;
        let mut ctx = RequestContext::new(operation, &self.catalog, input);

        let mut slots: Vec<Fetched> = vec![Fetched::Absent; tokens.len()];
        let mut index: HashMap<String, usize> = HashMap::new();
        let mut writes: Vec<PendingWrite> = Vec::new();

        let mut i = 0;
        while i < tokens.len() {
            let token = &tokens[i];
            let path = token.path.key();
            index.insert(path.clone(), i);
            let parent = token
                .foreign_link
                .as_ref()
                .and_then(|_| index.get(&token.path.parent_key()).copied());

            let outcome = if token.is_failed() {
                Ok(None)
            } else {
                self.resolve_token(&ctx, token).await
            };

            let mut fetched = match outcome {
                Ok(Some(fetched)) if !fetched.is_absent() => fetched,
                outcome => {
                    if let Err(err) = outcome {
                        tracing::warn!(path = %path, error = %err, "token failed");
                        errors.push(format!("{}: {}", path, err));
                    }
                    if let (Some(parent), Some(link)) = (parent, &token.foreign_link) {
                        queue_absent(&ctx, &mut writes, parent, token, link);
                    }
                    i += token.child_count + 1;
                    continue;
                }
            };

            ctx.cache.insert(path.clone(), index_columns(token, &fetched));
            let temporary: Vec<&str> = token.temporary_fields().collect();
            let aliases: Vec<(&str, &str)> = token.aliases().collect();
            for record in fetched.records_mut() {
                for field in &temporary {
                    record.shift_remove(*field);
                }
                for (field, alias) in &aliases {
                    rename_field(record, field, alias);
                }
            }

            if let (Some(parent), Some(link)) = (parent, &token.foreign_link) {
                queue_stitches(&ctx, &mut writes, parent, i, token, link);
            }

            tracing::debug!(
                model = %token.model,
                path = %path,
                records = fetched.len(),
                "resolved token"
            );
            slots[i] = fetched;
            i += 1;
        }

        for write in writes.into_iter().rev() {
            let value = match write.stitch {
                Stitch::Absent => Value::Null,
                Stitch::Whole(child) => slots[child].to_value(),
                Stitch::One(child, position) => slots[child]
                    .record(position)
                    .cloned()
                    .map(Value::Object)
                    .unwrap_or(Value::Null),
                Stitch::Many(child, positions) => Value::Array(
                    positions
                        .iter()
                        .filter_map(|p| slots[child].record(*p).cloned())
                        .map(Value::Object)
                        .collect(),
                ),
            };
            if let Some(record) = slots[write.target].record_mut(write.position) {
                set_in_record(record, &write.keys, value);
            }
        }

        let mut data = Value::Object(Map::new());
        for (i, token) in tokens.iter().enumerate() {
            if token.is_top_level() {
                let value = std::mem::replace(&mut slots[i], Fetched::Absent).into_value();
                set_path(&mut data, &token.path.keys, value);
            }
        }

        Resolution { data, errors }
    }

    /// Parse, inject the join filter and execute one token.
    ///
    /// `Ok(None)` means the parser had nothing to fetch.
    async fn resolve_token(&self, ctx: &RequestContext<'_>, token: &Token) -> CoreResult<Option<Fetched>> {
        let parser = self
            .registry
            .parser(&token.parser)
            .ok_or_else(|| CoreError::MissingParser(token.parser.clone()))?;
        let Some(parsed) = parser.parse(ctx, token).await? else {
            return Ok(None);
        };

        let mut token = token.clone();
        if let Some(link) = token.foreign_link.clone() {
            token.set_filter(&link.local_key, join_filter(ctx, &token, &link)?);
        }

        let executor = self
            .registry
            .executor(&token.executor)
            .ok_or_else(|| CoreError::MissingExecutor(token.executor.clone()))?;
        executor.execute(ctx, &token, &parsed).await.map(Some)
    }
}

/// Constraint on the child's `local_key` built from the parent's cached keys.
fn join_filter(ctx: &RequestContext<'_>, token: &Token, link: &ForeignLink) -> CoreResult<FilterValue> {
    let parent_path = token.path.parent_key();
    let entry = ctx
        .cache
        .entry(&parent_path, &link.referenced_key)
        .ok_or_else(|| CoreError::MissingJoinKey {
            path: parent_path.clone(),
            key: link.referenced_key.clone(),
        })?;

    if token.batch.is_batch_parent {
        return Ok(FilterValue::any_of_keys(entry.keys()));
    }
    Ok(entry
        .single_key()
        .and_then(FilterValue::from_key)
        .unwrap_or(FilterValue::AnyOf(Vec::new())))
}

fn index_columns(token: &Token, fetched: &Fetched) -> HashMap<String, CacheEntry> {
    let mut columns: Vec<&str> = token.join_columns.iter().map(String::as_str).collect();
    for field in token.temporary_fields() {
        if !columns.contains(&field) {
            columns.push(field);
        }
    }

    columns
        .into_iter()
        .map(|column| {
            let entry = match fetched {
                Fetched::Record(record) => CacheEntry::from_record(record, column),
                Fetched::Records(records) => CacheEntry::from_records(records, column),
                _ => CacheEntry::default(),
            };
            (column.to_string(), entry)
        })
        .collect()
}

/// Parent record positions a child writes into: one per cached parent key
/// under a batch parent, otherwise the single parent record.
fn parent_positions(ctx: &RequestContext<'_>, token: &Token, link: &ForeignLink) -> Vec<(Value, usize)> {
    if !token.batch.is_batch_parent {
        return vec![(Value::Null, 0)];
    }
    ctx.cache
        .entry(&token.path.parent_key(), &link.referenced_key)
        .map(|entry| entry.entries().to_vec())
        .unwrap_or_default()
}

fn queue_absent(
    ctx: &RequestContext<'_>,
    writes: &mut Vec<PendingWrite>,
    parent: usize,
    token: &Token,
    link: &ForeignLink,
) {
    for (_, position) in parent_positions(ctx, token, link) {
        writes.push(PendingWrite {
            target: parent,
            position,
            keys: token.path.keys.clone(),
            stitch: Stitch::Absent,
        });
    }
}

fn queue_stitches(
    ctx: &RequestContext<'_>,
    writes: &mut Vec<PendingWrite>,
    parent: usize,
    child: usize,
    token: &Token,
    link: &ForeignLink,
) {
    if !token.batch.is_batch_parent {
        writes.push(PendingWrite {
            target: parent,
            position: 0,
            keys: token.path.keys.clone(),
            stitch: Stitch::Whole(child),
        });
        return;
    }

    let own = ctx.cache.entry(&token.path.key(), &link.local_key);
    for (key, position) in parent_positions(ctx, token, link) {
        let matches = own.map(|entry| entry.positions_for(&key)).unwrap_or(&[]);
        let stitch = if token.batch.is_group {
            Stitch::Many(child, matches.to_vec())
        } else {
            match matches.first() {
                Some(first) => Stitch::One(child, *first),
                None => Stitch::Absent,
            }
        };
        writes.push(PendingWrite {
            target: parent,
            position,
            keys: token.path.keys.clone(),
            stitch,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ModelColumn, ModelDescriptor};
    use crate::executor::{MemoryExecutor, Parser};
    use crate::value::ColumnType;
    use async_trait::async_trait;
    use serde_json::json;

    fn catalog() -> Catalog {
        Catalog::new(vec![
            ModelDescriptor::new("author", "authors")
                .executor("memory")
                .column(ModelColumn::new("id", ColumnType::Number).primary())
                .column(ModelColumn::new("name", ColumnType::String))
                .extra(
                    "memory",
                    json!([
                        {"id": 1, "name": "ann"},
                        {"id": 2, "name": "bob"},
                        {"id": 3, "name": "cid"},
                    ]),
                ),
            ModelDescriptor::new("book", "books")
                .executor("memory")
                .column(ModelColumn::new("id", ColumnType::Number).primary())
                .column(ModelColumn::new("authorId", ColumnType::Number).foreign())
                .column(ModelColumn::new("title", ColumnType::String))
                .references("authorId", "author", "id")
                .extra(
                    "memory",
                    json!([
                        {"id": 10, "authorId": 1, "title": "a1"},
                        {"id": 11, "authorId": 2, "title": "b1"},
                        {"id": 12, "authorId": 1, "title": "a2"},
                    ]),
                ),
        ])
        .unwrap()
    }

    fn engine() -> Engine {
        let catalog = catalog();
        let memory = MemoryExecutor::from_catalog(&catalog);
        let registry = Registry::with_defaults().with_executor("memory", memory);
        Engine::new(Arc::new(catalog), Arc::new(registry))
    }

    async fn query(engine: &Engine, input: Value) -> Resolution {
        engine.run(Operation::Query, input.as_object().unwrap()).await
    }

    #[tokio::test]
    async fn test_group_child_fans_out_per_parent() {
        let resolution = query(
            &engine(),
            json!({"authors": {"@field": "name", "books": {"@field": "title"}}}),
        )
        .await;
        assert!(resolution.errors.is_empty());
        assert_eq!(
            resolution.data,
            json!({"authors": [
                {"name": "ann", "books": [{"title": "a1"}, {"title": "a2"}]},
                {"name": "bob", "books": [{"title": "b1"}]},
                {"name": "cid", "books": []},
            ]})
        );
    }

    #[tokio::test]
    async fn test_single_child_under_batch_parent() {
        let resolution = query(
            &engine(),
            json!({"books": {"@field": "title", "author": {"@field": "name"}}}),
        )
        .await;
        assert_eq!(
            resolution.data,
            json!({"books": [
                {"title": "a1", "author": {"name": "ann"}},
                {"title": "b1", "author": {"name": "bob"}},
                {"title": "a2", "author": {"name": "ann"}},
            ]})
        );
    }

    #[tokio::test]
    async fn test_missing_parent_skips_subtree() {
        let resolution = query(&engine(), json!({"author": {"id": 9, "books": {}}})).await;
        assert_eq!(resolution.data, json!({"author": null}));
        assert!(resolution.errors.is_empty());
    }

    #[tokio::test]
    async fn test_missing_executor_is_local() {
        let catalog = catalog();
        let registry = Registry::with_defaults();
        let engine = Engine::new(Arc::new(catalog), Arc::new(registry));
        let resolution = query(&engine, json!({"author": {"id": 1}})).await;
        assert_eq!(resolution.data, json!({"author": null}));
        assert_eq!(resolution.errors, vec!["author: Executor not registered: memory"]);
    }

    #[tokio::test]
    async fn test_large_integer_keys_stitch_to_own_parent() {
        let catalog = Catalog::new(vec![
            ModelDescriptor::new("user", "users")
                .executor("memory")
                .column(ModelColumn::new("id", ColumnType::Number).primary())
                .column(ModelColumn::new("name", ColumnType::String))
                .extra(
                    "memory",
                    json!([
                        {"id": 9007199254740992u64, "name": "a"},
                        {"id": 9007199254740993u64, "name": "b"},
                    ]),
                ),
            ModelDescriptor::new("post", "posts")
                .executor("memory")
                .column(ModelColumn::new("id", ColumnType::Number).primary())
                .column(ModelColumn::new("userId", ColumnType::Number).foreign())
                .references("userId", "user", "id")
                .extra(
                    "memory",
                    json!([
                        {"id": 1, "userId": 9007199254740992u64},
                        {"id": 2, "userId": 9007199254740993u64},
                    ]),
                ),
        ])
        .unwrap();
        let memory = MemoryExecutor::from_catalog(&catalog);
        let registry = Registry::with_defaults().with_executor("memory", memory);
        let engine = Engine::new(Arc::new(catalog), Arc::new(registry));

        let resolution = query(&engine, json!({"user": {"id": 9007199254740993u64}})).await;
        assert_eq!(
            resolution.data,
            json!({"user": {"id": 9007199254740993u64, "name": "b"}})
        );

        let resolution = query(
            &engine,
            json!({"users": {"@field": "name", "posts": {"@field": "id"}}}),
        )
        .await;
        assert_eq!(
            resolution.data,
            json!({"users": [
                {"name": "a", "posts": [{"id": 1}]},
                {"name": "b", "posts": [{"id": 2}]},
            ]})
        );
    }

    struct SkipParser;

    #[async_trait]
    impl Parser for SkipParser {
        async fn parse(&self, _ctx: &RequestContext<'_>, _token: &Token) -> CoreResult<Option<Value>> {
            Ok(None)
        }
    }

    #[tokio::test]
    async fn test_parser_returning_none_yields_null() {
        let catalog = Catalog::new(vec![ModelDescriptor::new("note", "notes")
            .parser("skip")
            .column(ModelColumn::new("id", ColumnType::Number).primary())])
        .unwrap();
        let registry = Registry::with_defaults().with_parser("skip", SkipParser);
        let engine = Engine::new(Arc::new(catalog), Arc::new(registry));
        let resolution = query(&engine, json!({"note": true, "notes": true})).await;
        assert_eq!(resolution.data, json!({"note": null, "notes": null}));
        assert!(resolution.errors.is_empty());
    }

    #[tokio::test]
    async fn test_join_cache_visible_to_request() {
        let engine = engine();
        let input = json!({"authors": {"id": [1, 2]}});
        let input = input.as_object().unwrap();
        let tokenized = engine.tokenize(input);
        let token = tokenized.tokens[0].clone();

        let mut ctx = RequestContext::new(Operation::Query, engine.catalog(), input);
        let fetched = engine.resolve_token(&ctx, &token).await.unwrap().unwrap();
        ctx.cache.insert(token.path.key(), index_columns(&token, &fetched));

        let entry = ctx.cache().entry("authors", "id").unwrap();
        assert_eq!(entry.len(), 2);
        assert_eq!(entry.record_for(&json!(2)), Some(1));
        assert_eq!(ctx.operation(), Operation::Query);
        assert!(ctx.input().contains_key("authors"));
    }
}
