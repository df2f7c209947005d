//! NestQL Core - nested declarative query compiler and resolution engine.
//!
//! A request is a nested JSON mapping whose keys name models, columns and
//! `@` directives. This crate compiles it into a flat list of tokens and
//! resolves them through pluggable parsers and executors, stitching child
//! results back into their parent records. It has no storage dependency.
//!
//! # Main Components
//!
//! - **Catalog**: registered model descriptors, their columns and relations
//! - **Tokenizer**: turns a request into pre-ordered [`Token`]s
//! - **Rules**: directive and per-column validation applied while tokenizing
//! - **Engine**: runs tokens against a [`Registry`] of parsers and executors
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use nestql_core::{Catalog, ColumnType, Engine, MemoryExecutor, ModelColumn,
//!     ModelDescriptor, Operation, Registry};
//! use serde_json::json;
//!
//! let catalog = Catalog::new(vec![ModelDescriptor::new("user", "users")
//!     .executor("memory")
//!     .column(ModelColumn::new("id", ColumnType::Number).primary())
//!     .column(ModelColumn::new("name", ColumnType::String))
//!     .extra("memory", json!([{"id": 1, "name": "Alice"}]))])
//! .unwrap();
//!
//! let memory = MemoryExecutor::from_catalog(&catalog);
//! let registry = Registry::with_defaults().with_executor("memory", memory);
//! let engine = Engine::new(Arc::new(catalog), Arc::new(registry));
//!
//! let input = json!({"user": {"id": 1}});
//! let rt = tokio::runtime::Runtime::new().unwrap();
//! let resolution = rt.block_on(engine.run(Operation::Query, input.as_object().unwrap()));
//! assert_eq!(resolution.data, json!({"user": {"id": 1, "name": "Alice"}}));
//! ```

pub mod cache;
pub mod catalog;
pub mod config;
pub mod error;
pub mod executor;
pub mod rules;
pub mod token;
pub mod tokenizer;
pub mod value;

// Re-export main types for convenience
pub use cache::{CacheEntry, JoinCache};
pub use catalog::{Catalog, ForeignKeyRelation, ModelColumn, ModelDescriptor, ResolvedModel};
pub use config::{DirectiveKeys, PaginationDefaults, QueryConfig};
pub use error::{CoreError, CoreResult};
pub use executor::{
    DefaultExecutor, DefaultParser, Engine, Executor, Fetched, MemoryExecutor, Operation, Parser,
    Registry, RequestContext, Resolution,
};
pub use rules::{Rule, RuleBook, RuleError};
pub use token::{
    BatchFlags, ForeignLink, Pagination, SortDirection, Token, TokenField, TokenKind, TokenPath,
    TokenSort,
};
pub use tokenizer::{Tokenized, Tokenizer};
pub use value::{ColumnType, FilterValue};
