//! Request entry points.
//!
//! Each entry point takes an arbitrary JSON value. Only a mapping is a valid
//! request; anything else short-circuits to a fixed input error without
//! touching the engine.

use std::sync::Arc;

use nestql_core::{Catalog, Engine, MemoryExecutor, Operation, Registry};
use serde::{Serialize, Serializer};
use serde_json::Value;

use crate::config::Config;
use crate::error::NestqlResult;

/// Id the bundled in-memory executor is registered under
pub const MEMORY_EXECUTOR: &str = "memory";

/// Fixed failure codes of the entry points
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiCode {
    InputError = 1,
}

impl Serialize for ApiCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(*self as u8)
    }
}

/// Response of every entry point
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Output {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<ApiCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub msg: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<String>>,
}

impl Output {
    pub fn input_error() -> Self {
        Self {
            code: Some(ApiCode::InputError),
            msg: Some("input error".to_string()),
            ..Default::default()
        }
    }
}

/// Facade over the resolution engine
#[derive(Debug, Clone)]
pub struct Nestql {
    engine: Engine,
}

impl Nestql {
    pub fn new(catalog: Catalog, registry: Registry) -> Self {
        Self {
            engine: Engine::new(Arc::new(catalog), Arc::new(registry)),
        }
    }

    /// Build from configuration, with the default and memory executors
    /// registered and the memory store seeded from the catalog.
    pub fn from_config(config: &Config) -> NestqlResult<Self> {
        let catalog = config.catalog()?;
        let memory = MemoryExecutor::from_catalog(&catalog);
        let registry = Registry::with_defaults().with_executor(MEMORY_EXECUTOR, memory);
        Ok(Self::new(catalog, registry))
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub async fn query(&self, input: &Value) -> Output {
        self.run(Operation::Query, input).await
    }

    pub async fn create(&self, input: &Value) -> Output {
        self.run(Operation::Create, input).await
    }

    pub async fn update(&self, input: &Value) -> Output {
        self.run(Operation::Update, input).await
    }

    pub async fn delete(&self, input: &Value) -> Output {
        self.run(Operation::Delete, input).await
    }

    pub async fn count(&self, input: &Value) -> Output {
        self.run(Operation::Count, input).await
    }

    pub async fn run(&self, operation: Operation, input: &Value) -> Output {
        let Some(input) = input.as_object() else {
            tracing::warn!(operation = %operation, "rejected non-object input");
            return Output::input_error();
        };

        let resolution = self.engine.run(operation, input).await;
        tracing::info!(
            operation = %operation,
            errors = resolution.errors.len(),
            "request resolved"
        );

        Output {
            data: Some(resolution.data),
            errors: (!resolution.errors.is_empty()).then_some(resolution.errors),
            ..Default::default()
        }
    }
}
