//! Common test utilities for nestql integration tests
//!
//! Provides a three-model catalog (`test`, `model`, `connect`) served by the
//! memory executor:
//! - `test`: 13 rows `{id, data: "testN"}`
//! - `model`: 4 rows, each pointing at a test through `testId`
//! - `connect`: 3 rows joining a test and a model

#![allow(dead_code)]

use nestql::{Config, Nestql, MEMORY_EXECUTOR};
use nestql_core::{ColumnType, ModelColumn, ModelDescriptor, QueryConfig};
use serde_json::{json, Value};

pub fn test_rows() -> Value {
    Value::Array(
        (1..=13)
            .map(|id| json!({"id": id, "data": format!("test{}", id)}))
            .collect(),
    )
}

pub fn models() -> Vec<ModelDescriptor> {
    vec![
        ModelDescriptor::new("test", "tests")
            .executor(MEMORY_EXECUTOR)
            .column(ModelColumn::new("id", ColumnType::Number).primary())
            .column(ModelColumn::new("data", ColumnType::String))
            .extra("memory", test_rows()),
        ModelDescriptor::new("model", "models")
            .executor(MEMORY_EXECUTOR)
            .column(ModelColumn::new("id", ColumnType::Number).primary())
            .column(ModelColumn::new("data", ColumnType::String))
            .column(ModelColumn::new("testId", ColumnType::Number).foreign())
            .references("testId", "test", "id")
            .extra(
                "memory",
                json!([
                    {"id": 1, "data": "model1", "testId": 2},
                    {"id": 2, "data": "model2", "testId": 1},
                    {"id": 3, "data": "model3", "testId": 3},
                    {"id": 4, "data": "model4", "testId": 4},
                ]),
            ),
        ModelDescriptor::new("connect", "connects")
            .executor(MEMORY_EXECUTOR)
            .column(ModelColumn::new("id", ColumnType::Number).primary())
            .column(ModelColumn::new("testId", ColumnType::Number).foreign())
            .column(ModelColumn::new("modelId", ColumnType::Number).foreign())
            .references("testId", "test", "id")
            .references("modelId", "model", "id")
            .extra(
                "memory",
                json!([
                    {"id": 1, "testId": 1, "modelId": 1},
                    {"id": 2, "testId": 2, "modelId": 2},
                    {"id": 3, "testId": 2, "modelId": 3},
                ]),
            ),
    ]
}

pub fn create_test_nestql() -> Nestql {
    create_nestql_with(QueryConfig::default())
}

pub fn create_nestql_with(query: QueryConfig) -> Nestql {
    let config = Config {
        query,
        models: models(),
    };
    Nestql::from_config(&config).expect("Failed to build catalog")
}

/// Run a query and return its `data`, asserting no errors were reported.
pub async fn query_data(nestql: &Nestql, input: Value) -> Value {
    let output = nestql.query(&input).await;
    assert!(output.errors.is_none(), "unexpected errors: {:?}", output.errors);
    output.data.expect("query returned no data")
}
