//! Executor module: pluggable data access and the resolution engine.
//!
//! Data retrieval is delegated to [`Parser`] and [`Executor`] implementations
//! registered by id in a [`Registry`]. Each model descriptor names the ids it
//! uses. The engine in [`resolve`] drives them token by token.

mod helpers;
mod memory;
mod resolve;

pub use helpers::*;
pub use memory::MemoryExecutor;
pub use resolve::{Engine, RequestContext, Resolution};

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{CoreError, CoreResult};
use crate::token::Token;

/// Kind of request being resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Query,
    Create,
    Update,
    Delete,
    Count,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Query => "query",
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::Delete => "delete",
            Operation::Count => "count",
        };
        f.write_str(name)
    }
}

impl std::str::FromStr for Operation {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "query" => Ok(Operation::Query),
            "create" => Ok(Operation::Create),
            "update" => Ok(Operation::Update),
            "delete" => Ok(Operation::Delete),
            "count" => Ok(Operation::Count),
            other => Err(CoreError::NotSupported(format!("operation '{}'", other))),
        }
    }
}

/// What an executor produced for one token
#[derive(Debug, Clone, PartialEq)]
pub enum Fetched {
    Absent,
    Record(Map<String, Value>),
    Records(Vec<Map<String, Value>>),
    Count(u64),
}

impl Fetched {
    /// Interpret a plain JSON value: object, array of objects, count or null.
    pub fn from_value(value: Value) -> CoreResult<Self> {
        match value {
            Value::Null => Ok(Fetched::Absent),
            Value::Object(record) => Ok(Fetched::Record(record)),
            Value::Array(items) => items
                .into_iter()
                .map(|item| match item {
                    Value::Object(record) => Ok(record),
                    other => Err(CoreError::Execution(format!(
                        "expected a record, got {}",
                        other
                    ))),
                })
                .collect::<CoreResult<Vec<_>>>()
                .map(Fetched::Records),
            Value::Number(n) => n.as_u64().map(Fetched::Count).ok_or_else(|| {
                CoreError::Execution(format!("invalid count {}", n))
            }),
            other => Err(CoreError::Execution(format!(
                "unexpected executor result {}",
                other
            ))),
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Fetched::Absent)
    }

    /// Record at `position`; a single record sits at position 0.
    pub fn record(&self, position: usize) -> Option<&Map<String, Value>> {
        match self {
            Fetched::Record(record) if position == 0 => Some(record),
            Fetched::Records(records) => records.get(position),
            _ => None,
        }
    }

    pub fn record_mut(&mut self, position: usize) -> Option<&mut Map<String, Value>> {
        match self {
            Fetched::Record(record) if position == 0 => Some(record),
            Fetched::Records(records) => records.get_mut(position),
            _ => None,
        }
    }

    pub fn records_mut(&mut self) -> std::slice::IterMut<'_, Map<String, Value>> {
        match self {
            Fetched::Record(record) => std::slice::from_mut(record).iter_mut(),
            Fetched::Records(records) => records.iter_mut(),
            _ => Default::default(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Fetched::Absent => 0,
            Fetched::Record(_) => 1,
            Fetched::Records(records) => records.len(),
            Fetched::Count(_) => 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn to_value(&self) -> Value {
        match self {
            Fetched::Absent => Value::Null,
            Fetched::Record(record) => Value::Object(record.clone()),
            Fetched::Records(records) => {
                Value::Array(records.iter().cloned().map(Value::Object).collect())
            }
            Fetched::Count(n) => Value::from(*n),
        }
    }

    pub fn into_value(self) -> Value {
        match self {
            Fetched::Absent => Value::Null,
            Fetched::Record(record) => Value::Object(record),
            Fetched::Records(records) => {
                Value::Array(records.into_iter().map(Value::Object).collect())
            }
            Fetched::Count(n) => Value::from(n),
        }
    }
}

/// Turns a token into executor arguments.
///
/// `Ok(None)` means the token has nothing to fetch; its subtree is skipped.
#[async_trait]
pub trait Parser: Send + Sync {
    async fn parse(&self, ctx: &RequestContext<'_>, token: &Token) -> CoreResult<Option<Value>>;
}

/// Fetches (or mutates) the records a token describes.
///
/// Called after the token's join filter has been injected.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(
        &self,
        ctx: &RequestContext<'_>,
        token: &Token,
        parsed: &Value,
    ) -> CoreResult<Fetched>;
}

/// Passes the token itself through as the parsed arguments.
pub struct DefaultParser;

#[async_trait]
impl Parser for DefaultParser {
    async fn parse(&self, _ctx: &RequestContext<'_>, token: &Token) -> CoreResult<Option<Value>> {
        serde_json::to_value(token)
            .map(Some)
            .map_err(|e| CoreError::Execution(e.to_string()))
    }
}

/// Echoes the parsed arguments back as the result.
pub struct DefaultExecutor;

#[async_trait]
impl Executor for DefaultExecutor {
    async fn execute(
        &self,
        _ctx: &RequestContext<'_>,
        _token: &Token,
        parsed: &Value,
    ) -> CoreResult<Fetched> {
        Fetched::from_value(parsed.clone())
    }
}

/// Parser and executor implementations keyed by id
#[derive(Clone, Default)]
pub struct Registry {
    parsers: HashMap<String, Arc<dyn Parser>>,
    executors: HashMap<String, Arc<dyn Executor>>,
}

impl Registry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the `"default"` parser and executor.
    pub fn with_defaults() -> Self {
        Self::new()
            .with_parser("default", DefaultParser)
            .with_executor("default", DefaultExecutor)
    }

    pub fn with_parser(mut self, id: &str, parser: impl Parser + 'static) -> Self {
        self.register_parser(id, Arc::new(parser));
        self
    }

    pub fn with_executor(mut self, id: &str, executor: impl Executor + 'static) -> Self {
        self.register_executor(id, Arc::new(executor));
        self
    }

    pub fn register_parser(&mut self, id: &str, parser: Arc<dyn Parser>) {
        self.parsers.insert(id.to_string(), parser);
    }

    pub fn register_executor(&mut self, id: &str, executor: Arc<dyn Executor>) {
        self.executors.insert(id.to_string(), executor);
    }

    pub fn parser(&self, id: &str) -> Option<&Arc<dyn Parser>> {
        self.parsers.get(id)
    }

    pub fn executor(&self, id: &str) -> Option<&Arc<dyn Executor>> {
        self.executors.get(id)
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("parsers", &self.parsers.keys().collect::<Vec<_>>())
            .field("executors", &self.executors.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_fetched_from_value() {
        assert_eq!(Fetched::from_value(json!(null)).unwrap(), Fetched::Absent);
        assert_eq!(Fetched::from_value(json!(3)).unwrap(), Fetched::Count(3));
        assert!(matches!(
            Fetched::from_value(json!({"id": 1})).unwrap(),
            Fetched::Record(_)
        ));
        assert_eq!(Fetched::from_value(json!([{"id": 1}, {"id": 2}])).unwrap().len(), 2);
        assert!(Fetched::from_value(json!([1, 2])).is_err());
        assert!(Fetched::from_value(json!("x")).is_err());
    }

    #[test]
    fn test_fetched_positions() {
        let mut single = Fetched::from_value(json!({"id": 1})).unwrap();
        assert!(single.record(0).is_some());
        assert!(single.record(1).is_none());
        assert_eq!(single.records_mut().count(), 1);

        let mut count = Fetched::Count(4);
        assert!(count.record_mut(0).is_none());
        assert_eq!(count.records_mut().count(), 0);
        assert_eq!(count.into_value(), json!(4));
    }

    #[test]
    fn test_operation_parse() {
        assert_eq!("Count".parse::<Operation>().unwrap(), Operation::Count);
        assert!("merge".parse::<Operation>().is_err());
        assert_eq!(Operation::Delete.to_string(), "delete");
    }

    #[test]
    fn test_registry_defaults() {
        let registry = Registry::with_defaults();
        assert!(registry.parser("default").is_some());
        assert!(registry.executor("default").is_some());
        assert!(registry.executor("memory").is_none());
        assert!(Registry::new().parser("default").is_none());
    }
}
