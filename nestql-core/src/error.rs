//! Error types for nestql-core.
//!
//! Every variant is local to one branch of a request: the engine turns them
//! into strings attached to the node path instead of aborting the request.

use thiserror::Error;

use crate::rules::RuleError;

/// Core error type
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Unknown model: {0}")]
    UnknownModel(String),

    #[error("Unknown key: {0}")]
    UnknownKey(String),

    #[error("No relation between '{child}' and '{parent}'")]
    NoRelation { child: String, parent: String },

    #[error("Null value for key: {0}")]
    NullValue(String),

    #[error("Invalid value for '{0}': expected true or an object")]
    InvalidValue(String),

    #[error("Directive error on '{key}': {source}")]
    Directive {
        key: String,
        #[source]
        source: RuleError,
    },

    #[error("Parser not registered: {0}")]
    MissingParser(String),

    #[error("Executor not registered: {0}")]
    MissingExecutor(String),

    #[error("Join key '{key}' not cached at '{path}'")]
    MissingJoinKey { path: String, key: String },

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("Operation not supported: {0}")]
    NotSupported(String),

    #[error("Invalid catalog: {0}")]
    InvalidCatalog(String),
}

/// Result type for core operations
pub type CoreResult<T> = Result<T, CoreError>;

impl serde::Serialize for CoreError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}
